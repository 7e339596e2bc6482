//! OpenTelemetryCollector reconciler.

use kube::{Api, Client};

use super::{ObjectKind, ObjectReconciler};
use crate::{
    annotations::AutoscalerClass,
    builder::{
        BuildContext,
        autoscaler::{effective_class, wants_otel_collector},
        otel::build_collector,
    },
    config::ReconcilerConfig,
    crd::{ComponentType, OpenTelemetryCollector},
    error::Error,
};

/// A collector is only useful when KEDA scales on pod metrics.
pub fn applies(ctx: &BuildContext, component: ComponentType) -> bool {
    !ctx.gates.stopped
        && effective_class(ctx, component) == AutoscalerClass::Keda
        && wants_otel_collector(ctx, component)
}

pub fn desired(
    ctx: &BuildContext,
    component: ComponentType,
    serving_port: i32,
) -> Result<Option<OpenTelemetryCollector>, Error> {
    if !applies(ctx, component) {
        return Ok(None);
    }
    build_collector(ctx, component, serving_port).map(Some)
}

pub fn reconciler(
    client: &Client,
    namespace: &str,
    owner_uid: &str,
    config: &ReconcilerConfig,
) -> ObjectReconciler<OpenTelemetryCollector> {
    let api: Api<OpenTelemetryCollector> = Api::namespaced(client.clone(), namespace);
    ObjectReconciler::new(api, ObjectKind::OpenTelemetryCollector, owner_uid, config)
}
