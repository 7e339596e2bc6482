//! Deployment reconciler: one per component, plus the worker set when multi-node.

use k8s_openapi::api::apps::v1::Deployment;
use kube::{Api, Client};

use super::{ObjectKind, ObjectReconciler};
use crate::{annotations::AutoscalerClass, config::ReconcilerConfig};

pub const REPLICAS_PATH: &str = "/spec/replicas";

/// When a scaler owns `spec.replicas` the diff and the write leave it alone.
pub fn reconciler(
    client: &Client,
    namespace: &str,
    owner_uid: &str,
    config: &ReconcilerConfig,
    class: AutoscalerClass,
) -> ObjectReconciler<Deployment> {
    let api: Api<Deployment> = Api::namespaced(client.clone(), namespace);
    let reconciler = ObjectReconciler::new(api, ObjectKind::Deployment, owner_uid, config);
    if class.manages_replicas() {
        reconciler.ignore(REPLICAS_PATH)
    } else {
        reconciler
    }
}

/// Rollout has caught up with the latest spec and the Available condition holds.
pub fn is_available(deployment: &Deployment) -> bool {
    let Some(status) = &deployment.status else {
        return false;
    };
    let generation = deployment.metadata.generation.unwrap_or(0);
    if status.observed_generation.unwrap_or(0) < generation {
        return false;
    }
    status
        .conditions
        .as_ref()
        .is_some_and(|conds| conds.iter().any(|c| c.type_ == "Available" && c.status == "True"))
}

/// A rollout the Deployment controller gave up on, as (reason, message).
pub fn failure(deployment: &Deployment) -> Option<(String, String)> {
    let conditions = deployment.status.as_ref()?.conditions.as_ref()?;
    conditions
        .iter()
        .find(|c| {
            (c.type_ == "Progressing" && c.status == "False")
                || (c.type_ == "ReplicaFailure" && c.status == "True")
        })
        .map(|c| {
            (
                c.reason.clone().unwrap_or_else(|| c.type_.clone()),
                c.message.clone().unwrap_or_default(),
            )
        })
}

pub fn available_replicas(deployment: &Deployment) -> Option<i32> {
    deployment.status.as_ref()?.available_replicas
}

pub fn updated_replicas(deployment: &Deployment) -> Option<i32> {
    deployment.status.as_ref()?.updated_replicas
}
