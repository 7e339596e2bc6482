use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use kube::runtime::events::{Event, EventType};
use kube::{Client, Resource};
use kube_runtime::events::{Recorder, Reporter};
use tracing::warn;

use crate::{
    component::ObjectVerdict, constants::FIELD_MANAGER, crd::InferenceService, error::Error,
    metrics::Metrics, reconciler::Verdict,
};

/// Shared by every reconcile pass of the controller.
#[derive(Clone)]
pub struct Ctx {
    pub client: Client,
    pub recorder: Recorder,
    /// Namespace holding the `inferenceservice-config` ConfigMap.
    pub config_namespace: String,
    pub metrics: Metrics,
    pub failures: FailureCounts,
}

/// Consecutive failed passes per `namespace/name`, driving the backoff.
#[derive(Clone, Default)]
pub struct FailureCounts(Arc<Mutex<HashMap<String, u32>>>);

impl FailureCounts {
    pub fn key(namespace: Option<&str>, name: &str) -> String {
        format!("{}/{}", namespace.unwrap_or_default(), name)
    }

    /// Bumps and returns the failure count for `key`.
    pub fn record(&self, key: &str) -> u32 {
        let Ok(mut failures) = self.0.lock() else {
            return 1;
        };
        let count = failures.entry(key.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    pub fn reset(&self, key: &str) {
        if let Ok(mut failures) = self.0.lock() {
            failures.remove(key);
        }
    }

    pub fn len(&self) -> usize {
        self.0.lock().map(|f| f.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Ctx {
    pub fn new(client: Client, config_namespace: String, metrics: Metrics) -> Self {
        let recorder = Recorder::new(client.clone(), make_reporter());
        Self {
            client,
            recorder,
            config_namespace,
            metrics,
            failures: FailureCounts::default(),
        }
    }

    pub fn record_failure(&self, key: &str) -> u32 {
        self.failures.record(key)
    }

    pub fn reset_failures(&self, key: &str) {
        self.failures.reset(key);
    }
}

pub fn make_reporter() -> Reporter {
    Reporter {
        controller: FIELD_MANAGER.into(),
        instance: std::env::var("POD_NAME").ok(),
    }
}

pub async fn emit_event<K>(
    ctx: &Ctx,
    obj: &K,
    reason: &str,
    note: &str,
    event_type: EventType,
) -> Result<(), Error>
where
    K: Resource<DynamicType = ()> + std::fmt::Debug,
{
    ctx.recorder
        .publish(
            &Event {
                type_: event_type,
                reason: reason.into(),
                note: Some(note.into()),
                action: "Reconcile".into(),
                secondary: None,
            },
            &obj.object_ref(&()),
        )
        .await?;

    Ok(())
}

fn verdict_event(verdict: &ObjectVerdict) -> Option<(&'static str, EventType)> {
    match verdict.verdict {
        Verdict::Create => Some(("Created", EventType::Normal)),
        Verdict::Update => Some(("Updated", EventType::Normal)),
        Verdict::Delete => Some(("Deleted", EventType::Normal)),
        Verdict::Unknown => Some(("ReconcileFailed", EventType::Warning)),
        Verdict::Existed | Verdict::Skipped => None,
    }
}

/// One event per write or failed check. Event delivery is best effort.
pub async fn publish_verdicts(ctx: &Ctx, isvc: &InferenceService, verdicts: &[ObjectVerdict]) {
    for verdict in verdicts {
        ctx.metrics.observe_verdict(verdict.kind, verdict.verdict);
        let Some((reason, event_type)) = verdict_event(verdict) else {
            continue;
        };
        let note = format!("{} {} {}", verdict.verdict, verdict.kind, verdict.name);
        if let Err(e) = emit_event(ctx, isvc, reason, &note, event_type).await {
            warn!(error = %e, reason, "failed to publish event");
        }
    }
}
