//! Legacy Ingress reconciler, used when the Gateway API is disabled.

use k8s_openapi::api::networking::v1::Ingress;
use kube::{Api, Client};

use super::{ObjectKind, ObjectReconciler};
use crate::{
    builder::{
        BuildContext,
        route::{build_ingress, routes_enabled},
    },
    config::{ReconcilerConfig, RoutingMode},
    error::Error,
};

pub fn applies(ctx: &BuildContext) -> bool {
    ctx.config.ingress.routing_mode() == RoutingMode::Ingress
        && routes_enabled(ctx)
        && !ctx.gates.stopped
}

pub fn desired(ctx: &BuildContext) -> Result<Option<Ingress>, Error> {
    if !applies(ctx) {
        return Ok(None);
    }
    build_ingress(ctx).map(Some)
}

pub fn reconciler(
    client: &Client,
    namespace: &str,
    owner_uid: &str,
    config: &ReconcilerConfig,
) -> ObjectReconciler<Ingress> {
    let api: Api<Ingress> = Api::namespaced(client.clone(), namespace);
    ObjectReconciler::new(api, ObjectKind::Ingress, owner_uid, config)
}
