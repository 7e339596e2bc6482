//! KEDA ScaledObject reconciler, the event-driven counterpart of [`super::hpa`].

use kube::{Api, Client};

use super::{ObjectKind, ObjectReconciler};
use crate::{
    annotations::AutoscalerClass,
    builder::{
        BuildContext,
        autoscaler::{ReplicaRange, build_scaled_object, effective_class},
    },
    config::ReconcilerConfig,
    crd::{ComponentType, ScaledObject},
    error::Error,
};

pub fn desired(
    ctx: &BuildContext,
    component: ComponentType,
    range: ReplicaRange,
) -> Result<Option<ScaledObject>, Error> {
    if ctx.gates.stopped || effective_class(ctx, component) != AutoscalerClass::Keda {
        return Ok(None);
    }
    build_scaled_object(ctx, component, range).map(Some)
}

pub fn reconciler(
    client: &Client,
    namespace: &str,
    owner_uid: &str,
    config: &ReconcilerConfig,
) -> ObjectReconciler<ScaledObject> {
    let api: Api<ScaledObject> = Api::namespaced(client.clone(), namespace);
    ObjectReconciler::new(api, ObjectKind::ScaledObject, owner_uid, config)
}
