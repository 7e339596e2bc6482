//! Service-level status: condition aggregation and the optimistic status write.

use chrono::{SecondsFormat, Utc};
use kube::{
    Api, Client, ResourceExt,
    api::{Patch, PatchParams},
};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::{
    builder::{
        BuildContext,
        route::{internal_address, routes_enabled, service_url},
    },
    config::RoutingMode,
    constants::FIELD_MANAGER,
    crd::{
        Addressable, ComponentStatusSpec, ComponentType, Condition, ConditionType,
        InferenceService, InferenceServiceStatus,
    },
    error::Error,
};

const MAX_STATUS_ATTEMPTS: usize = 5;

/// What the pass learned about routing objects.
#[derive(Debug, Default, Clone)]
pub struct RoutingObserved {
    /// HTTPRoutes that should exist, with whether a gateway accepted them.
    pub routes: Vec<(String, bool)>,
    /// Ingress mode only: whether the Ingress is persisted.
    pub ingress_exists: bool,
    /// Whether the top-level HTTPRoute or Ingress is persisted; until then the
    /// URL is the internal address.
    pub top_level_exists: bool,
    /// Reason and message of a failed route reconcile.
    pub error: Option<(String, String)>,
}

/// One component's contribution to the status.
#[derive(Debug, Clone)]
pub struct ComponentResult {
    pub component: ComponentType,
    pub status: Option<ComponentStatusSpec>,
    pub condition: Option<Condition>,
}

pub fn ingress_condition(ctx: &BuildContext, routing: &RoutingObserved) -> Condition {
    let not_ready = |reason: &str, message: String| {
        Condition::new(ConditionType::IngressReady, false).with_reason(reason, message)
    };
    if ctx.gates.stopped {
        return not_ready("Stopped", "the InferenceService is stopped".into());
    }
    if let Some((reason, message)) = &routing.error {
        return not_ready(reason, message.clone());
    }
    if !routes_enabled(ctx) {
        return Condition::new(ConditionType::IngressReady, true);
    }
    match ctx.config.ingress.routing_mode() {
        RoutingMode::GatewayApi => match routing.routes.iter().find(|(_, accepted)| !accepted) {
            Some((name, _)) => not_ready(
                "HTTPRouteNotReady",
                format!("HTTPRoute {name} is not accepted by its gateway"),
            ),
            None => Condition::new(ConditionType::IngressReady, true),
        },
        RoutingMode::Ingress if routing.ingress_exists => {
            Condition::new(ConditionType::IngressReady, true)
        }
        RoutingMode::Ingress => not_ready(
            "IngressNotFound",
            format!("Ingress {} does not exist yet", ctx.name()),
        ),
    }
}

/// Ready is the conjunction of every blocking condition; Stopped forces it false.
fn ready_condition(stopped: bool, conditions: &[Condition]) -> Condition {
    if stopped {
        return Condition::new(ConditionType::Ready, false)
            .with_reason("Stopped", "the InferenceService is stopped");
    }
    match conditions
        .iter()
        .find(|c| c.severity.is_none() && !c.is_true())
    {
        Some(blocking) => Condition::new(ConditionType::Ready, false).with_reason(
            blocking.reason.clone().unwrap_or_else(|| format!("{}False", blocking.r#type)),
            blocking.message.clone().unwrap_or_default(),
        ),
        None => Condition::new(ConditionType::Ready, true),
    }
}

/// Keeps the previous transition time of conditions whose state did not change.
fn stamp(
    mut condition: Condition,
    previous: Option<&InferenceServiceStatus>,
    now: &str,
) -> Condition {
    let prior = previous.and_then(|p| p.conditions.iter().find(|c| c.r#type == condition.r#type));
    condition.last_transition_time = match prior {
        Some(prior) if prior.same_state(&condition) => prior.last_transition_time.clone(),
        _ => Some(now.to_string()),
    };
    condition
}

/// Derives the next status. Pure; `now` only lands on conditions that changed.
pub fn compute_status(
    ctx: &BuildContext,
    previous: Option<&InferenceServiceStatus>,
    components: &[ComponentResult],
    routing: &RoutingObserved,
    now: &str,
) -> InferenceServiceStatus {
    let stopped = ctx.gates.stopped;
    let mut ordered: Vec<&ComponentResult> = components.iter().collect();
    ordered.sort_by_key(|c| c.component);

    let mut conditions: Vec<Condition> = ordered
        .iter()
        .filter_map(|c| c.condition.clone())
        .collect();
    conditions.push(ingress_condition(ctx, routing));
    let stopped_condition = if stopped {
        Condition::new(ConditionType::Stopped, true)
            .with_reason("Stopped", "the InferenceService is stopped")
    } else {
        Condition::new(ConditionType::Stopped, false)
    };
    conditions.push(stopped_condition);
    let ready = ready_condition(stopped, &conditions);
    conditions.push(ready);

    let conditions = conditions
        .into_iter()
        .map(|c| stamp(c, previous, now))
        .collect();

    InferenceServiceStatus {
        observed_generation: ctx.isvc.metadata.generation,
        url: (!stopped).then(|| {
            if routing.top_level_exists {
                service_url(ctx)
            } else {
                internal_address(ctx)
            }
        }),
        address: (!stopped).then(|| Addressable {
            url: internal_address(ctx),
        }),
        conditions,
        components: ordered
            .iter()
            .filter_map(|c| c.status.clone().map(|s| (c.component, s)))
            .collect(),
        deployment_mode: Some(ctx.gates.deployment_mode.as_str().to_string()),
    }
}

/// Status for a pass that could not even parse the service's gates: every
/// previous entry is kept and Ready turns false with the error's reason.
pub fn invalid_status(
    isvc: &InferenceService,
    previous: Option<&InferenceServiceStatus>,
    error: &Error,
    now: &str,
) -> InferenceServiceStatus {
    let mut status = previous.cloned().unwrap_or_default();
    status.observed_generation = isvc.metadata.generation;
    let ready = Condition::new(ConditionType::Ready, false)
        .with_reason(error.reason(), error.to_string());
    let ready = stamp(ready, previous, now);
    status.conditions.retain(|c| c.r#type != ConditionType::Ready.as_str());
    status.conditions.push(ready);
    status
}

pub fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Sets keys present in `previous` but gone from `next` to null, so a merge
/// patch removes them instead of leaving them behind.
fn null_removed(previous: &Value, next: &mut Value) {
    let (Value::Object(prev), Value::Object(next)) = (previous, next) else {
        return;
    };
    for (key, old) in prev {
        match next.get_mut(key) {
            Some(new) => null_removed(old, new),
            None => {
                next.insert(key.clone(), Value::Null);
            }
        }
    }
}

/// Merge patch body carrying `resourceVersion` as a write precondition.
pub fn status_patch(
    previous: Option<&InferenceServiceStatus>,
    next: &InferenceServiceStatus,
    resource_version: Option<&str>,
) -> Result<Value, Error> {
    let mut body = serde_json::to_value(next)?;
    if let Some(previous) = previous {
        null_removed(&serde_json::to_value(previous)?, &mut body);
    }
    let mut patch = json!({ "status": body });
    if let Some(rv) = resource_version {
        patch["metadata"] = json!({ "resourceVersion": rv });
    }
    Ok(patch)
}

/// Read-compute-write with retry on conflict. Returns whether anything was written.
pub async fn write_status<F>(
    client: &Client,
    isvc: &InferenceService,
    compute: F,
) -> Result<bool, Error>
where
    F: Fn(Option<&InferenceServiceStatus>) -> InferenceServiceStatus,
{
    let namespace = isvc.namespace().unwrap_or_default();
    let name = isvc.name_any();
    let api: Api<InferenceService> = Api::namespaced(client.clone(), &namespace);
    let pp = PatchParams {
        field_manager: Some(FIELD_MANAGER.into()),
        ..Default::default()
    };

    let mut attempt = 0;
    loop {
        attempt += 1;
        let Some(latest) = api.get_opt(&name).await? else {
            debug!(isvc = %name, "gone before status write");
            return Ok(false);
        };
        let previous = latest.status.as_ref();
        let next = compute(previous);
        if previous == Some(&next) {
            debug!(isvc = %name, "status unchanged");
            return Ok(false);
        }

        let patch = status_patch(previous, &next, latest.metadata.resource_version.as_deref())?;
        match api.patch_status(&name, &pp, &Patch::Merge(&patch)).await {
            Ok(_) => {
                info!(
                    isvc = %name,
                    ready = next.is_condition_true(ConditionType::Ready),
                    "status updated"
                );
                return Ok(true);
            }
            Err(kube::Error::Api(ae)) if ae.code == 409 && attempt < MAX_STATUS_ATTEMPTS => {
                debug!(isvc = %name, attempt, "status conflict, retrying");
            }
            Err(e) => return Err(e.into()),
        }
    }
}
