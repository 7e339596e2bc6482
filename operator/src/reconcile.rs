//! Service-level reconciler: the controller entry point.

use std::{sync::Arc, time::Duration, time::Instant};

use kube::{Resource, ResourceExt};
use kube_runtime::{controller::Action, events::EventType};
use tracing::{debug, info, instrument, warn};

use crate::{
    annotations::ServiceGates,
    builder::BuildContext,
    component::{
        ApplyContext, ComponentOutcome, ComponentPlan, ObjectVerdict, apply_component,
        component_status, plan_component,
    },
    config::OperatorConfig,
    crd::{ComponentType, InferenceService},
    error::{Error, ErrorClass},
    event::{Ctx, FailureCounts, emit_event, publish_verdicts},
    metrics::PassResult,
    reconciler::{self, Verdict},
    runtime,
    status::{
        ComponentResult, RoutingObserved, compute_status, invalid_status, now, write_status,
    },
};

const CONVERGED_REQUEUE: Duration = Duration::from_secs(300);
const BACKOFF_BASE: Duration = Duration::from_secs(5);
const BACKOFF_CAP: Duration = Duration::from_secs(300);

/// How a pass ended when it did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassOutcome {
    Converged,
    /// Declared state is invalid; nothing changes until the spec does.
    Terminal,
}

fn object_key(isvc: &InferenceService) -> String {
    FailureCounts::key(isvc.namespace().as_deref(), &isvc.name_any())
}

pub async fn reconcile(isvc: Arc<InferenceService>, ctx: Arc<Ctx>) -> Result<Action, Error> {
    let started = Instant::now();
    let result = reconcile_service(&isvc, &ctx).await;
    let elapsed = started.elapsed().as_secs_f64();

    match result {
        Ok(outcome) => {
            ctx.reset_failures(&object_key(&isvc));
            match outcome {
                PassOutcome::Converged => {
                    ctx.metrics.observe_pass(PassResult::Success, elapsed);
                    Ok(Action::requeue(CONVERGED_REQUEUE))
                }
                PassOutcome::Terminal => {
                    ctx.metrics.observe_pass(PassResult::Terminal, elapsed);
                    Ok(Action::await_change())
                }
            }
        }
        Err(e) => {
            ctx.metrics.observe_pass(PassResult::Error, elapsed);
            Err(e)
        }
    }
}

/// Exponential backoff per object: 5s doubling up to 5 minutes.
pub fn backoff(failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(16);
    BACKOFF_BASE
        .saturating_mul(1u32 << exponent)
        .min(BACKOFF_CAP)
}

pub fn error_policy(isvc: Arc<InferenceService>, error: &Error, ctx: Arc<Ctx>) -> Action {
    let failures = ctx.record_failure(&object_key(&isvc));
    let delay = match error.class() {
        ErrorClass::Fatal => BACKOFF_CAP,
        ErrorClass::Transient | ErrorClass::Terminal => backoff(failures),
    };
    warn!(
        isvc = %isvc.name_any(),
        error = %error,
        failures,
        requeue_secs = delay.as_secs(),
        "reconcile failed"
    );
    Action::requeue(delay)
}

/// Failures seen during a pass, split by how the controller reacts to them.
#[derive(Default)]
struct PassErrors {
    /// Returned to the controller, driving `error_policy`.
    retry: Option<Error>,
    terminal: bool,
    /// Published as Warning events on the InferenceService.
    warnings: Vec<Error>,
}

impl PassErrors {
    fn note(&mut self, error: Error) {
        match error.class() {
            ErrorClass::Terminal => {
                self.terminal = true;
                self.warnings.push(error);
            }
            ErrorClass::Transient | ErrorClass::Fatal => {
                if self.retry.is_none() {
                    self.retry = Some(error);
                } else {
                    self.warnings.push(error);
                }
            }
        }
    }
}

#[instrument(
    skip_all,
    fields(isvc = %isvc.name_any(), namespace = %isvc.namespace().unwrap_or_default())
)]
async fn reconcile_service(isvc: &InferenceService, ctx: &Ctx) -> Result<PassOutcome, Error> {
    if isvc.meta().deletion_timestamp.is_some() {
        debug!("being deleted, owner references take care of derived objects");
        ctx.reset_failures(&object_key(isvc));
        return Ok(PassOutcome::Converged);
    }
    let namespace = isvc
        .namespace()
        .ok_or_else(|| Error::Internal("InferenceService without namespace".into()))?;
    let owner_uid = isvc
        .uid()
        .ok_or_else(|| Error::Internal("InferenceService without uid".into()))?;

    let config = OperatorConfig::load(&ctx.client, &ctx.config_namespace).await?;

    let gates = match ServiceGates::from_isvc(isvc, &config) {
        Ok(gates) => gates,
        Err(invalid) => {
            let error = Error::from(invalid);
            warn!(reason = error.reason(), error = %error, "invalid service annotations");
            let now = now();
            write_status(&ctx.client, isvc, |prev| invalid_status(isvc, prev, &error, &now)).await?;
            let (reason, message) = (error.reason(), error.to_string());
            if let Err(e) = emit_event(ctx, isvc, reason, &message, EventType::Warning).await {
                warn!(error = %e, "failed to publish event");
            }
            return Ok(PassOutcome::Terminal);
        }
    };
    let bctx = BuildContext::new(isvc, &config, &gates);
    let actx = ApplyContext {
        client: &ctx.client,
        namespace: &namespace,
        owner_uid: &owner_uid,
        config: &config.reconciler,
    };

    info!(
        mode = gates.deployment_mode.as_str(),
        class = gates.autoscaler_class.as_str(),
        stopped = gates.stopped,
        "reconciling"
    );

    let mut errors = PassErrors::default();
    let mut verdicts: Vec<ObjectVerdict> = Vec::new();
    let mut results: Vec<ComponentResult> = Vec::new();
    let mut routing = RoutingObserved::default();

    for component in ComponentType::ALL {
        let declared = isvc.spec.is_declared(component);
        let planned = if declared && !gates.stopped {
            plan_declared(ctx, &bctx, &namespace, component).await
        } else {
            Ok(ComponentPlan::absent(&bctx, component))
        };

        let (status, condition) = match planned {
            Err(error) => {
                // Nothing of an inconsistent topology is written.
                warn!(%component, reason = error.reason(), error = %error, "component not planned");
                let folded = component_status(&bctx, component, ComponentOutcome::Invalid(&error));
                errors.note(error);
                folded
            }
            Ok(plan) => {
                let mut report = apply_component(&actx, plan.clone()).await;
                verdicts.append(&mut report.verdicts);
                let outcome = if !declared {
                    ComponentOutcome::NotDeclared
                } else if gates.stopped {
                    ComponentOutcome::Stopped
                } else {
                    if reconciler::httproute::applies(&bctx) {
                        let accepted = report
                            .observed
                            .route
                            .as_ref()
                            .is_some_and(reconciler::httproute::is_ready);
                        routing.routes.push((plan.name.clone(), accepted));
                    }
                    ComponentOutcome::Applied {
                        plan: &plan,
                        report: &report,
                    }
                };
                let folded = component_status(&bctx, component, outcome);
                if let Some(error) = report.error.take() {
                    warn!(
                        %component,
                        reason = error.reason(),
                        error = %error,
                        "component apply failed"
                    );
                    errors.note(error);
                }
                folded
            }
        };
        results.push(ComponentResult {
            component,
            status,
            condition,
        });
    }

    apply_top_level_routes(&bctx, &actx, &mut routing, &mut verdicts, &mut errors).await;

    let now = now();
    let written = write_status(&ctx.client, isvc, |prev| {
        compute_status(&bctx, prev, &results, &routing, &now)
    })
    .await?;

    publish_verdicts(ctx, isvc, &verdicts).await;
    for error in &errors.warnings {
        let message = error.to_string();
        if let Err(e) = emit_event(ctx, isvc, error.reason(), &message, EventType::Warning).await {
            warn!(error = %e, "failed to publish event");
        }
    }

    let writes = verdicts.iter().filter(|v| v.verdict.is_write()).count();
    info!(writes, status_written = written, "pass complete");

    if let Some(error) = errors.retry {
        return Err(error);
    }
    Ok(if errors.terminal {
        PassOutcome::Terminal
    } else {
        PassOutcome::Converged
    })
}

/// Resolves the runtime a declared component needs and plans it.
async fn plan_declared(
    ctx: &Ctx,
    bctx: &BuildContext<'_>,
    namespace: &str,
    component: ComponentType,
) -> Result<ComponentPlan, Error> {
    let runtime = match (component, &bctx.isvc.spec.predictor.model) {
        (ComponentType::Predictor, Some(model)) => {
            Some(runtime::resolve(&ctx.client, namespace, model).await?)
        }
        _ => None,
    };
    if let Some(rt) = &runtime {
        debug!(%component, runtime = %rt.name, "runtime resolved");
    }
    plan_component(bctx, component, runtime.as_ref())
}

/// The route spanning all components: an HTTPRoute or an Ingress, both named
/// after the service. The kind that does not apply is removed.
async fn apply_top_level_routes(
    bctx: &BuildContext<'_>,
    actx: &ApplyContext<'_>,
    routing: &mut RoutingObserved,
    verdicts: &mut Vec<ObjectVerdict>,
    errors: &mut PassErrors,
) {
    let name = bctx.name();
    let ApplyContext {
        client,
        namespace,
        owner_uid,
        config,
    } = actx.clone();

    let route = match reconciler::httproute::desired_top_level(bctx) {
        Ok(desired) => {
            reconciler::httproute::reconciler(client, namespace, owner_uid, config)
                .reconcile(&name, desired)
                .await
        }
        Err(e) => Err(e),
    };
    match route {
        Ok(result) => {
            routing.top_level_exists |= result.exists();
            verdicts.push(ObjectVerdict {
                kind: reconciler::ObjectKind::HttpRoute,
                name: name.clone(),
                verdict: result.verdict,
            });
            if reconciler::httproute::applies(bctx) {
                let accepted = result
                    .object
                    .as_ref()
                    .is_some_and(reconciler::httproute::is_ready);
                routing.routes.insert(0, (name.clone(), accepted));
            }
        }
        Err(error) => {
            verdicts.push(ObjectVerdict {
                kind: reconciler::ObjectKind::HttpRoute,
                name: name.clone(),
                verdict: Verdict::Unknown,
            });
            routing.error = Some((error.reason().to_string(), error.to_string()));
            errors.note(error);
        }
    }

    let ingress = match reconciler::ingress::desired(bctx) {
        Ok(desired) => {
            reconciler::ingress::reconciler(client, namespace, owner_uid, config)
                .reconcile(&name, desired)
                .await
        }
        Err(e) => Err(e),
    };
    match ingress {
        Ok(result) => {
            routing.ingress_exists = result.exists();
            routing.top_level_exists |= result.exists();
            verdicts.push(ObjectVerdict {
                kind: reconciler::ObjectKind::Ingress,
                name,
                verdict: result.verdict,
            });
        }
        Err(error) => {
            verdicts.push(ObjectVerdict {
                kind: reconciler::ObjectKind::Ingress,
                name,
                verdict: Verdict::Unknown,
            });
            if routing.error.is_none() {
                routing.error = Some((error.reason().to_string(), error.to_string()));
            }
            errors.note(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InvalidSpec;

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff(1), Duration::from_secs(5));
        assert_eq!(backoff(2), Duration::from_secs(10));
        assert_eq!(backoff(4), Duration::from_secs(40));
        assert_eq!(backoff(7), Duration::from_secs(300));
        assert_eq!(backoff(u32::MAX), Duration::from_secs(300));
    }

    #[test]
    fn first_retryable_error_wins() {
        let mut errors = PassErrors::default();
        errors.note(Error::Internal("first".into()));
        errors.note(Error::Internal("second".into()));
        assert!(matches!(&errors.retry, Some(Error::Internal(msg)) if msg == "first"));
        assert!(!errors.terminal);

        errors.note(InvalidSpec::InvalidMetric("x".into()).into());
        assert!(errors.terminal);
        let reasons: Vec<_> = errors.warnings.iter().map(Error::reason).collect();
        assert_eq!(reasons, ["InternalError", "InvalidAutoscalingMetric"]);
    }

    #[test]
    fn every_displaced_failure_is_kept_for_events() {
        // Top-level HTTPRoute and Ingress both failing after a component did.
        let mut errors = PassErrors::default();
        for what in ["predictor", "httproute", "ingress"] {
            errors.note(Error::Internal(what.into()));
        }
        assert!(matches!(&errors.retry, Some(Error::Internal(msg)) if msg == "predictor"));
        let kept: Vec<String> = errors.warnings.iter().map(|e| e.to_string()).collect();
        assert_eq!(kept, ["internal error: httproute", "internal error: ingress"]);
    }
}
