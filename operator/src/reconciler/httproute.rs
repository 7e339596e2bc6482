//! Gateway API HTTPRoute reconciler: one top-level route and one per component.

use kube::{Api, Client};

use super::{ObjectKind, ObjectReconciler};
use crate::{
    builder::{
        BuildContext,
        route::{build_component_http_route, build_top_level_http_route, routes_enabled},
    },
    config::{ReconcilerConfig, RoutingMode},
    crd::{ComponentType, HttpRoute},
    error::Error,
};

pub fn applies(ctx: &BuildContext) -> bool {
    ctx.config.ingress.routing_mode() == RoutingMode::GatewayApi
        && routes_enabled(ctx)
        && !ctx.gates.stopped
}

pub fn desired_top_level(ctx: &BuildContext) -> Result<Option<HttpRoute>, Error> {
    if !applies(ctx) {
        return Ok(None);
    }
    build_top_level_http_route(ctx).map(Some)
}

pub fn desired_component(
    ctx: &BuildContext,
    component: ComponentType,
) -> Result<Option<HttpRoute>, Error> {
    if !applies(ctx) || !ctx.isvc.spec.is_declared(component) {
        return Ok(None);
    }
    build_component_http_route(ctx, component).map(Some)
}

/// Accepted by at least one parent gateway.
pub fn is_ready(route: &HttpRoute) -> bool {
    route.is_accepted()
}

pub fn reconciler(
    client: &Client,
    namespace: &str,
    owner_uid: &str,
    config: &ReconcilerConfig,
) -> ObjectReconciler<HttpRoute> {
    let api: Api<HttpRoute> = Api::namespaced(client.clone(), namespace);
    ObjectReconciler::new(api, ObjectKind::HttpRoute, owner_uid, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{builder::testing, config::OperatorConfig};

    #[test]
    fn ingress_mode_disables_http_routes() {
        let isvc = testing::isvc("sklearn");
        let mut config = OperatorConfig::default();
        let gates = testing::gates(&config, &isvc);
        let ctx = BuildContext::new(&isvc, &config, &gates);
        assert!(desired_top_level(&ctx).unwrap().is_some());
        assert!(desired_component(&ctx, ComponentType::Predictor).unwrap().is_some());
        assert!(desired_component(&ctx, ComponentType::Explainer).unwrap().is_none());

        config.ingress.enable_gateway_api = false;
        let ctx = BuildContext::new(&isvc, &config, &gates);
        assert!(desired_top_level(&ctx).unwrap().is_none());
    }

    #[test]
    fn disabled_ingress_creation_suppresses_routes() {
        let isvc = testing::isvc("sklearn");
        let mut config = OperatorConfig::default();
        config.ingress.disable_ingress_creation = true;
        let gates = testing::gates(&config, &isvc);
        let ctx = BuildContext::new(&isvc, &config, &gates);
        assert!(desired_top_level(&ctx).unwrap().is_none());
    }
}
