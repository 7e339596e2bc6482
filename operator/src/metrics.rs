//! Prometheus instruments for reconcile passes and per-object verdicts.

use prometheus::{Histogram, HistogramOpts, IntCounterVec, Opts, Registry};

use crate::reconciler::{ObjectKind, Verdict};

#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,
    reconciles: IntCounterVec,
    verdicts: IntCounterVec,
    duration: Histogram,
}

/// Outcome label of one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassResult {
    Success,
    Terminal,
    Error,
}

impl PassResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassResult::Success => "success",
            PassResult::Terminal => "terminal",
            PassResult::Error => "error",
        }
    }
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let reconciles = IntCounterVec::new(
            Opts::new("isvc_reconcile_total", "InferenceService reconcile passes by result"),
            &["result"],
        )?;
        let verdicts = IntCounterVec::new(
            Opts::new(
                "isvc_object_verdict_total",
                "Derived object verdicts by kind and verdict",
            ),
            &["kind", "verdict"],
        )?;
        let duration = Histogram::with_opts(
            HistogramOpts::new(
                "isvc_reconcile_duration_seconds",
                "Duration of InferenceService reconcile passes",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )?;

        registry.register(Box::new(reconciles.clone()))?;
        registry.register(Box::new(verdicts.clone()))?;
        registry.register(Box::new(duration.clone()))?;

        Ok(Self {
            registry,
            reconciles,
            verdicts,
            duration,
        })
    }

    pub fn observe_pass(&self, result: PassResult, seconds: f64) {
        self.reconciles.with_label_values(&[result.as_str()]).inc();
        self.duration.observe(seconds);
    }

    pub fn observe_verdict(&self, kind: ObjectKind, verdict: Verdict) {
        self.verdicts
            .with_label_values(&[kind.as_str(), verdict.as_str()])
            .inc();
    }
}
