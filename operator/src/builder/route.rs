//! Routing: host and path rendering, Gateway API HTTPRoutes, legacy Ingress,
//! and the URL/address advertised on status.

use std::collections::BTreeMap;

use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, ServiceBackendPort,
};

use super::BuildContext;
use crate::{
    constants::{
        ISVC_NAME_HEADER, ISVC_NAMESPACE_HEADER, SERVICE_PORT, component_name, service_host,
    },
    crd::{
        ComponentType, HttpBackendRef, HttpHeader, HttpHeaderModifier, HttpPathMatch, HttpRoute,
        HttpRouteFilter, HttpRouteMatch, HttpRouteRule, HttpRouteSpec, HttpRouteTimeouts,
        InferenceService, ParentRef,
    },
    error::Error,
};

const GATEWAY_API_GROUP: &str = "gateway.networking.k8s.io";
const BACKEND_WEIGHT: i32 = 100;
const EXPLAIN_PATH: &str = r"/v1/models/[\w-]+:explain";

/// Expands `{{ .Name }}`, `{{ .Namespace }}` and `{{ .IngressDomain }}`.
/// Unknown placeholders are left as written.
pub fn render_template(template: &str, name: &str, namespace: &str, domain: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let Some(len) = rest[start..].find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let raw = &rest[start..start + len + 2];
        let key = raw[2..raw.len() - 2].trim().trim_start_matches('.');
        match key {
            "Name" => out.push_str(name),
            "Namespace" => out.push_str(namespace),
            "IngressDomain" => out.push_str(domain),
            _ => out.push_str(raw),
        }
        rest = &rest[start + len + 2..];
    }
    out.push_str(rest);
    out
}

/// Component that receives general traffic: the transformer when declared.
pub fn entry_component(isvc: &InferenceService) -> ComponentType {
    if isvc.spec.transformer.is_some() {
        ComponentType::Transformer
    } else {
        ComponentType::Predictor
    }
}

/// Whether external routes should exist at all for this service.
pub fn routes_enabled(ctx: &BuildContext) -> bool {
    !ctx.config.ingress.disable_ingress_creation && !ctx.gates.cluster_local
}

fn domains(ctx: &BuildContext) -> Vec<String> {
    let ingress = &ctx.config.ingress;
    let mut domains = vec![ingress.ingress_domain.clone()];
    for extra in &ingress.additional_ingress_domains {
        if !domains.contains(extra) {
            domains.push(extra.clone());
        }
    }
    domains
}

/// Host names for a route exposing `name`.
fn hosts_for(ctx: &BuildContext, name: &str) -> Vec<String> {
    let ns = ctx.namespace();
    let mut hosts = Vec::new();
    for domain in domains(ctx) {
        let host = render_template(&ctx.config.ingress.domain_template, name, &ns, &domain);
        if !hosts.contains(&host) {
            hosts.push(host);
        }
    }
    hosts
}

/// Rendered path prefix when path-based routing is configured, without a trailing slash.
pub fn path_prefix(ctx: &BuildContext) -> Option<String> {
    let ingress = &ctx.config.ingress;
    if !ingress.is_path_based() {
        return None;
    }
    let rendered = render_template(
        &ingress.path_template,
        &ctx.name(),
        &ctx.namespace(),
        &ingress.ingress_domain,
    );
    Some(rendered.trim_end_matches('/').to_string())
}

/// Hosts of the top-level route: bare ingress domains when path-based.
pub fn top_level_hosts(ctx: &BuildContext) -> Vec<String> {
    if ctx.config.ingress.is_path_based() {
        domains(ctx)
    } else {
        hosts_for(ctx, &ctx.name())
    }
}

pub fn component_hosts(ctx: &BuildContext, component: ComponentType) -> Vec<String> {
    hosts_for(ctx, &component_name(&ctx.name(), component))
}

/// Public URL of the service, or the internal address when no routes are exposed.
pub fn service_url(ctx: &BuildContext) -> String {
    if !routes_enabled(ctx) {
        return internal_address(ctx);
    }
    match top_level_hosts(ctx).first() {
        Some(host) => format!(
            "{}://{}{}",
            ctx.config.ingress.url_scheme,
            host,
            path_prefix(ctx).unwrap_or_default()
        ),
        None => internal_address(ctx),
    }
}

pub fn component_url(ctx: &BuildContext, component: ComponentType) -> String {
    if !routes_enabled(ctx) {
        return component_address(ctx, component);
    }
    match component_hosts(ctx, component).first() {
        Some(host) => format!("{}://{}", ctx.config.ingress.url_scheme, host),
        None => component_address(ctx, component),
    }
}

/// In-cluster address of the entry component.
pub fn internal_address(ctx: &BuildContext) -> String {
    component_address(ctx, entry_component(ctx.isvc))
}

pub fn component_address(ctx: &BuildContext, component: ComponentType) -> String {
    format!(
        "http://{}",
        service_host(&component_name(&ctx.name(), component), &ctx.namespace())
    )
}

fn timeout_seconds(ctx: &BuildContext, component: ComponentType) -> i64 {
    ctx.isvc
        .spec
        .extension(component)
        .and_then(|e| e.timeout)
        .unwrap_or(ctx.config.ingress.default_timeout_seconds)
}

// =============================================================================
// Gateway API
// =============================================================================

fn parent_ref(ctx: &BuildContext) -> ParentRef {
    let (namespace, name) = ctx.config.ingress.gateway_ref();
    ParentRef {
        group: Some(GATEWAY_API_GROUP.into()),
        kind: Some("Gateway".into()),
        name: name.to_string(),
        namespace: namespace.map(str::to_string),
    }
}

fn regex_match(pattern: String) -> HttpRouteMatch {
    HttpRouteMatch {
        path: Some(HttpPathMatch {
            type_: "RegularExpression".into(),
            value: pattern,
        }),
    }
}

fn rule_to(ctx: &BuildContext, component: ComponentType, pattern: String) -> HttpRouteRule {
    HttpRouteRule {
        matches: vec![regex_match(pattern)],
        filters: vec![HttpRouteFilter {
            type_: "RequestHeaderModifier".into(),
            request_header_modifier: Some(HttpHeaderModifier {
                set: vec![
                    HttpHeader {
                        name: ISVC_NAME_HEADER.into(),
                        value: ctx.name(),
                    },
                    HttpHeader {
                        name: ISVC_NAMESPACE_HEADER.into(),
                        value: ctx.namespace(),
                    },
                ],
            }),
        }],
        backend_refs: vec![HttpBackendRef {
            group: Some(String::new()),
            kind: Some("Service".into()),
            name: component_name(&ctx.name(), component),
            namespace: Some(ctx.namespace()),
            port: Some(SERVICE_PORT),
            weight: Some(BACKEND_WEIGHT),
        }],
        timeouts: Some(HttpRouteTimeouts {
            request: Some(format!("{}s", timeout_seconds(ctx, component))),
        }),
    }
}

/// Explain traffic first (more specific), then the fallback to the entry component.
fn top_level_rules(ctx: &BuildContext) -> Vec<HttpRouteRule> {
    let prefix = path_prefix(ctx).map(|p| regex::escape(&p)).unwrap_or_default();
    let mut rules = Vec::new();
    if ctx.isvc.spec.explainer.is_some() {
        rules.push(rule_to(
            ctx,
            ComponentType::Explainer,
            format!("^{prefix}{EXPLAIN_PATH}$"),
        ));
    }
    rules.push(rule_to(ctx, entry_component(ctx.isvc), format!("^{prefix}/.*$")));
    rules
}

pub fn build_top_level_http_route(ctx: &BuildContext) -> Result<HttpRoute, Error> {
    let name = ctx.name();
    let entry = entry_component(ctx.isvc);
    let selector = component_name(&name, entry);
    let mut route = HttpRoute::new(
        &name,
        HttpRouteSpec {
            parent_refs: vec![parent_ref(ctx)],
            hostnames: top_level_hosts(ctx),
            rules: top_level_rules(ctx),
        },
    );
    route.metadata = ctx.object_meta(&name, entry, &selector)?;
    Ok(route)
}

pub fn build_component_http_route(
    ctx: &BuildContext,
    component: ComponentType,
) -> Result<HttpRoute, Error> {
    let name = component_name(&ctx.name(), component);
    let mut route = HttpRoute::new(
        &name,
        HttpRouteSpec {
            parent_refs: vec![parent_ref(ctx)],
            hostnames: component_hosts(ctx, component),
            rules: vec![rule_to(ctx, component, "^/.*$".into())],
        },
    );
    route.metadata = ctx.object_meta(&name, component, &name)?;
    Ok(route)
}

// =============================================================================
// Ingress
// =============================================================================

fn ingress_path(
    ctx: &BuildContext,
    component: ComponentType,
    path: String,
    path_type: &str,
) -> HTTPIngressPath {
    HTTPIngressPath {
        path: Some(path),
        path_type: path_type.into(),
        backend: IngressBackend {
            service: Some(IngressServiceBackend {
                name: component_name(&ctx.name(), component),
                port: Some(ServiceBackendPort {
                    number: Some(SERVICE_PORT),
                    ..Default::default()
                }),
            }),
            ..Default::default()
        },
    }
}

fn host_rule(host: String, paths: Vec<HTTPIngressPath>) -> IngressRule {
    IngressRule {
        host: Some(host),
        http: Some(HTTPIngressRuleValue { paths }),
    }
}

/// One Ingress carrying the top-level hosts and one host rule per declared component.
pub fn build_ingress(ctx: &BuildContext) -> Result<Ingress, Error> {
    let name = ctx.name();
    let entry = entry_component(ctx.isvc);
    let prefix = path_prefix(ctx).unwrap_or_default();

    let mut top_paths = Vec::new();
    if ctx.isvc.spec.explainer.is_some() {
        top_paths.push(ingress_path(
            ctx,
            ComponentType::Explainer,
            format!("{prefix}{EXPLAIN_PATH}"),
            "ImplementationSpecific",
        ));
    }
    let fallback = if prefix.is_empty() { "/".to_string() } else { prefix.clone() };
    top_paths.push(ingress_path(ctx, entry, fallback, "Prefix"));

    let mut rules: Vec<IngressRule> = top_level_hosts(ctx)
        .into_iter()
        .map(|host| host_rule(host, top_paths.clone()))
        .collect();
    for component in ctx.isvc.spec.declared_components() {
        for host in component_hosts(ctx, component) {
            rules.push(host_rule(
                host,
                vec![ingress_path(ctx, component, "/".into(), "Prefix")],
            ));
        }
    }

    let mut annotations = BTreeMap::new();
    if ctx.isvc.spec.explainer.is_some() {
        annotations.insert("nginx.ingress.kubernetes.io/use-regex".to_string(), "true".to_string());
    }
    let mut metadata = ctx.object_meta(&name, entry, &component_name(&name, entry))?;
    metadata.annotations = (!annotations.is_empty()).then_some(annotations);

    Ok(Ingress {
        metadata,
        spec: Some(IngressSpec {
            ingress_class_name: ctx.config.ingress.ingress_class_name.clone(),
            rules: Some(rules),
            ..Default::default()
        }),
        status: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        builder::testing,
        config::OperatorConfig,
        constants::VISIBILITY_LABEL,
        crd::{ComponentExtensionSpec, ContainerComponentSpec},
    };

    fn with_explainer(isvc: &mut InferenceService, timeout: Option<i64>) {
        isvc.spec.explainer = Some(ContainerComponentSpec {
            extension: ComponentExtensionSpec {
                timeout,
                ..Default::default()
            },
            ..Default::default()
        });
    }

    #[test]
    fn templates_render_with_and_without_spaces() {
        let template = "{{ .Name }}-{{.Namespace}}.{{ .IngressDomain }}";
        assert_eq!(render_template(template, "sk", "ns", "example.com"), "sk-ns.example.com");
        assert_eq!(render_template("{{ .Other }}/x", "a", "b", "c"), "{{ .Other }}/x");
        assert_eq!(render_template("open {{ .Name", "a", "b", "c"), "open {{ .Name");
    }

    #[test]
    fn host_based_top_level_route() {
        let isvc = testing::isvc("sklearn");
        let config = OperatorConfig::default();
        let gates = testing::gates(&config, &isvc);
        let ctx = BuildContext::new(&isvc, &config, &gates);

        let route = build_top_level_http_route(&ctx).unwrap();
        assert_eq!(route.metadata.name.as_deref(), Some("sklearn"));
        assert_eq!(route.spec.hostnames, vec!["sklearn-models.example.com".to_string()]);
        assert_eq!(route.spec.parent_refs[0].name, "kserve-ingress-gateway");
        assert_eq!(route.spec.parent_refs[0].namespace.as_deref(), Some("kserve"));

        let rule = &route.spec.rules[0];
        assert_eq!(rule.matches[0].path.as_ref().unwrap().value, "^/.*$");
        assert_eq!(rule.backend_refs[0].name, "sklearn-predictor");
        assert_eq!(rule.backend_refs[0].weight, Some(100));
        assert_eq!(rule.timeouts.as_ref().unwrap().request.as_deref(), Some("30s"));
        let headers = &rule.filters[0].request_header_modifier.as_ref().unwrap().set;
        assert_eq!(headers[0].value, "sklearn");
        assert_eq!(headers[1].value, "models");

        assert_eq!(service_url(&ctx), "http://sklearn-models.example.com");
    }

    #[test]
    fn explainer_gets_its_own_rule_and_timeout() {
        let mut isvc = testing::isvc("sklearn");
        with_explainer(&mut isvc, Some(120));
        let config = OperatorConfig::default();
        let gates = testing::gates(&config, &isvc);
        let ctx = BuildContext::new(&isvc, &config, &gates);

        let route = build_top_level_http_route(&ctx).unwrap();
        assert_eq!(route.spec.rules.len(), 2);
        let explain = &route.spec.rules[0];
        assert_eq!(
            explain.matches[0].path.as_ref().unwrap().value,
            r"^/v1/models/[\w-]+:explain$"
        );
        assert_eq!(explain.backend_refs[0].name, "sklearn-explainer");
        assert_eq!(explain.timeouts.as_ref().unwrap().request.as_deref(), Some("120s"));
    }

    #[test]
    fn path_based_routing_escapes_prefix() {
        let mut isvc = testing::isvc("sklearn");
        with_explainer(&mut isvc, None);
        let mut config = OperatorConfig::default();
        config.ingress.path_template = "/serving/{{ .Namespace }}/{{ .Name }}".into();
        config.ingress.additional_ingress_domains = vec!["models.internal".into()];
        let gates = testing::gates(&config, &isvc);
        let ctx = BuildContext::new(&isvc, &config, &gates);

        let route = build_top_level_http_route(&ctx).unwrap();
        assert_eq!(
            route.spec.hostnames,
            vec!["example.com".to_string(), "models.internal".to_string()]
        );
        let values: Vec<_> = route
            .spec
            .rules
            .iter()
            .map(|r| r.matches[0].path.as_ref().unwrap().value.clone())
            .collect();
        assert_eq!(
            values,
            vec![
                r"^/serving/models/sklearn/v1/models/[\w-]+:explain$".to_string(),
                "^/serving/models/sklearn/.*$".to_string(),
            ]
        );
        assert_eq!(service_url(&ctx), "http://example.com/serving/models/sklearn");
    }

    #[test]
    fn transformer_is_the_entry_component() {
        let mut isvc = testing::isvc("sklearn");
        isvc.spec.transformer = Some(ContainerComponentSpec::default());
        let config = OperatorConfig::default();
        let gates = testing::gates(&config, &isvc);
        let ctx = BuildContext::new(&isvc, &config, &gates);

        let route = build_top_level_http_route(&ctx).unwrap();
        assert_eq!(route.spec.rules[0].backend_refs[0].name, "sklearn-transformer");
        assert_eq!(
            internal_address(&ctx),
            "http://sklearn-transformer.models.svc.cluster.local"
        );
    }

    #[test]
    fn component_route_uses_component_host() {
        let isvc = testing::isvc("sklearn");
        let config = OperatorConfig::default();
        let gates = testing::gates(&config, &isvc);
        let ctx = BuildContext::new(&isvc, &config, &gates);

        let route = build_component_http_route(&ctx, ComponentType::Predictor).unwrap();
        assert_eq!(route.metadata.name.as_deref(), Some("sklearn-predictor"));
        assert_eq!(
            route.spec.hostnames,
            vec!["sklearn-predictor-models.example.com".to_string()]
        );
        assert_eq!(
            component_url(&ctx, ComponentType::Predictor),
            "http://sklearn-predictor-models.example.com"
        );
    }

    #[test]
    fn cluster_local_falls_back_to_internal_address() {
        let mut isvc = testing::isvc("sklearn");
        isvc.metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .insert(VISIBILITY_LABEL.into(), "cluster-local".into());
        let config = OperatorConfig::default();
        let gates = testing::gates(&config, &isvc);
        let ctx = BuildContext::new(&isvc, &config, &gates);

        assert!(!routes_enabled(&ctx));
        assert_eq!(
            service_url(&ctx),
            "http://sklearn-predictor.models.svc.cluster.local"
        );
    }

    #[test]
    fn ingress_has_top_level_and_component_hosts() {
        let mut isvc = testing::isvc("sklearn");
        with_explainer(&mut isvc, None);
        let mut config = OperatorConfig::default();
        config.ingress.enable_gateway_api = false;
        config.ingress.ingress_class_name = Some("nginx".into());
        let gates = testing::gates(&config, &isvc);
        let ctx = BuildContext::new(&isvc, &config, &gates);

        let ingress = build_ingress(&ctx).unwrap();
        let spec = ingress.spec.unwrap();
        assert_eq!(spec.ingress_class_name.as_deref(), Some("nginx"));
        let rules = spec.rules.unwrap();
        let hosts: Vec<_> = rules.iter().map(|r| r.host.clone().unwrap()).collect();
        assert_eq!(
            hosts,
            vec![
                "sklearn-models.example.com".to_string(),
                "sklearn-predictor-models.example.com".to_string(),
                "sklearn-explainer-models.example.com".to_string(),
            ]
        );
        let top_paths = &rules[0].http.as_ref().unwrap().paths;
        assert_eq!(top_paths.len(), 2);
        assert_eq!(
            top_paths[1].backend.service.as_ref().unwrap().name,
            "sklearn-predictor"
        );
    }
}
