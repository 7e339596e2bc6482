//! Deployment and Service builders.

use std::collections::BTreeMap;

use k8s_openapi::{
    api::{
        apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy, RollingUpdateDeployment},
        core::v1::{PodSpec, PodTemplateSpec, Service, ServicePort, ServiceSpec},
    },
    apimachinery::pkg::{apis::meta::v1::LabelSelector, util::intstr::IntOrString},
};
use kube::api::ObjectMeta;

use super::{BuildContext, component_labels, selector_labels};
use crate::{
    constants::{
        AUTH_PROXY_PORT, AUTH_PROXY_PORT_NAME, NODE_ROLE_LABEL, SERVICE_PORT, SERVICE_PORT_NAME,
        component_name,
    },
    crd::ComponentType,
    error::Error,
    runtime::ResolvedRuntime,
};

pub const NODE_ROLE_HEAD: &str = "head";
pub const NODE_ROLE_WORKER: &str = "worker";

/// Inputs for one Deployment; the pod spec is already assembled.
#[derive(Debug, Clone)]
pub struct WorkloadInput<'a> {
    pub component: ComponentType,
    pub name: String,
    pub selector_name: String,
    pub pod: PodSpec,
    pub replicas: Option<i32>,
    pub runtime: Option<&'a ResolvedRuntime>,
    pub node_role: Option<&'static str>,
    /// Injected pod annotations, applied over user and runtime ones.
    pub pod_annotations: BTreeMap<String, String>,
}

pub fn build_deployment(ctx: &BuildContext, input: WorkloadInput) -> Result<Deployment, Error> {
    let extension = ctx.isvc.spec.extension(input.component);
    let isvc_name = ctx.name();

    let mut pod_labels = BTreeMap::new();
    let mut pod_annotations = BTreeMap::new();
    if let Some(rt) = input.runtime {
        pod_labels.extend(rt.spec.labels.clone());
        pod_annotations.extend(rt.spec.annotations.clone());
    }
    if let Some(ext) = extension {
        pod_labels.extend(ext.labels.clone());
        pod_annotations.extend(ext.annotations.clone());
    }
    pod_annotations.extend(input.pod_annotations);
    pod_labels.extend(component_labels(&isvc_name, input.component, &input.selector_name));

    // `spec.selector` is immutable, so it must not depend on the worker topology.
    // Head and worker are told apart by their `app` label.
    let selector = selector_labels(&input.selector_name);
    if let Some(role) = input.node_role {
        pod_labels.insert(NODE_ROLE_LABEL.to_string(), role.to_string());
    }

    let strategy = if input.node_role.is_some() {
        DeploymentStrategy {
            type_: Some("Recreate".into()),
            rolling_update: None,
        }
    } else {
        extension
            .and_then(|ext| ext.deployment_strategy.clone())
            .unwrap_or_else(default_strategy)
    };

    Ok(Deployment {
        metadata: ctx.object_meta(&input.name, input.component, &input.selector_name)?,
        spec: Some(DeploymentSpec {
            replicas: input.replicas,
            selector: LabelSelector {
                match_labels: Some(selector),
                ..Default::default()
            },
            strategy: Some(strategy),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels),
                    annotations: (!pod_annotations.is_empty()).then_some(pod_annotations),
                    ..Default::default()
                }),
                spec: Some(input.pod),
            },
            ..Default::default()
        }),
        status: None,
    })
}

fn default_strategy() -> DeploymentStrategy {
    DeploymentStrategy {
        type_: Some("RollingUpdate".into()),
        rolling_update: Some(RollingUpdateDeployment {
            max_surge: Some(IntOrString::String("25%".into())),
            max_unavailable: Some(IntOrString::String("25%".into())),
        }),
    }
}

/// ClusterIP Service in front of a component; port 80 to the serving port, or
/// to the auth proxy when auth is enabled.
pub fn build_service(
    ctx: &BuildContext,
    component: ComponentType,
    serving_port: i32,
) -> Result<Service, Error> {
    let name = component_name(&ctx.name(), component);
    let (target, port_name) = if ctx.gates.auth_enabled {
        (AUTH_PROXY_PORT, AUTH_PROXY_PORT_NAME)
    } else {
        (serving_port, SERVICE_PORT_NAME)
    };

    let mut selector = selector_labels(&name);
    if component == ComponentType::Predictor && ctx.isvc.spec.is_multi_node() {
        selector.insert(NODE_ROLE_LABEL.to_string(), NODE_ROLE_HEAD.to_string());
    }

    Ok(Service {
        metadata: ctx.object_meta(&name, component, &name)?,
        spec: Some(ServiceSpec {
            selector: Some(selector),
            ports: Some(vec![ServicePort {
                name: Some(port_name.into()),
                port: SERVICE_PORT,
                target_port: Some(IntOrString::Int(target)),
                protocol: Some("TCP".into()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        status: None,
    })
}

/// Headless Service workers use to discover the head pod.
pub fn build_headless_service(ctx: &BuildContext, name: &str) -> Result<Service, Error> {
    let head = component_name(&ctx.name(), ComponentType::Predictor);
    let mut selector = selector_labels(&head);
    selector.insert(NODE_ROLE_LABEL.to_string(), NODE_ROLE_HEAD.to_string());

    Ok(Service {
        metadata: ctx.object_meta(name, ComponentType::Predictor, &head)?,
        spec: Some(ServiceSpec {
            cluster_ip: Some("None".into()),
            publish_not_ready_addresses: Some(true),
            selector: Some(selector),
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
        constants::{APP_LABEL, ENABLE_AUTH_ANNOTATION},
        crd::WorkerSpec,
    };

    fn input(name: &str, role: Option<&'static str>) -> WorkloadInput<'static> {
        WorkloadInput {
            component: ComponentType::Predictor,
            name: name.into(),
            selector_name: name.into(),
            pod: PodSpec::default(),
            replicas: Some(1),
            runtime: None,
            node_role: role,
            pod_annotations: BTreeMap::new(),
        }
    }

    #[test]
    fn deployment_defaults_to_rolling_update() {
        let mut isvc = testing::isvc("sklearn");
        isvc.spec
            .predictor
            .extension
            .labels
            .insert("team".into(), "ml".into());
        let config = OperatorConfig::default();
        let gates = testing::gates(&config, &isvc);
        let ctx = BuildContext::new(&isvc, &config, &gates);

        let deploy = build_deployment(&ctx, input("sklearn-predictor", None)).unwrap();
        let spec = deploy.spec.unwrap();
        let strategy = spec.strategy.unwrap();
        assert_eq!(strategy.type_.as_deref(), Some("RollingUpdate"));
        assert_eq!(
            strategy.rolling_update.unwrap().max_surge,
            Some(IntOrString::String("25%".into()))
        );
        let labels = spec.template.metadata.unwrap().labels.unwrap();
        assert_eq!(labels["team"], "ml");
        assert_eq!(labels[APP_LABEL], "isvc.sklearn-predictor");
        assert_eq!(
            spec.selector.match_labels.unwrap()[APP_LABEL],
            "isvc.sklearn-predictor"
        );
    }

    #[test]
    fn multi_node_roles_recreate_and_label_pods_by_role() {
        let isvc = testing::isvc("llama");
        let config = OperatorConfig::default();
        let gates = testing::gates(&config, &isvc);
        let ctx = BuildContext::new(&isvc, &config, &gates);

        let worker = input("llama-predictor-worker", Some(NODE_ROLE_WORKER));
        let deploy = build_deployment(&ctx, worker).unwrap();
        let spec = deploy.spec.unwrap();
        assert_eq!(spec.strategy.unwrap().type_.as_deref(), Some("Recreate"));
        let selector = spec.selector.match_labels.unwrap();
        assert_eq!(selector[APP_LABEL], "isvc.llama-predictor-worker");
        assert!(!selector.contains_key(NODE_ROLE_LABEL));
        let labels = spec.template.metadata.unwrap().labels.unwrap();
        assert_eq!(labels[NODE_ROLE_LABEL], "worker");
    }

    #[test]
    fn service_targets_auth_proxy_when_enabled() {
        let mut isvc = testing::isvc("sklearn");
        let config = OperatorConfig::default();
        let gates = testing::gates(&config, &isvc);
        let ctx = BuildContext::new(&isvc, &config, &gates);
        let svc = build_service(&ctx, ComponentType::Predictor, 8080).unwrap();
        let port = &svc.spec.unwrap().ports.unwrap()[0];
        assert_eq!(port.port, 80);
        assert_eq!(port.target_port, Some(IntOrString::Int(8080)));

        testing::annotate(&mut isvc, ENABLE_AUTH_ANNOTATION, "true");
        let gates = testing::gates(&config, &isvc);
        let ctx = BuildContext::new(&isvc, &config, &gates);
        let svc = build_service(&ctx, ComponentType::Predictor, 8080).unwrap();
        let port = &svc.spec.unwrap().ports.unwrap()[0];
        assert_eq!(port.target_port, Some(IntOrString::Int(AUTH_PROXY_PORT)));
    }

    #[test]
    fn headless_worker_service_selects_head() {
        let mut isvc = testing::isvc("llama");
        isvc.spec.predictor.worker_spec = Some(WorkerSpec::default());
        let config = OperatorConfig::default();
        let gates = testing::gates(&config, &isvc);
        let ctx = BuildContext::new(&isvc, &config, &gates);

        let svc = build_headless_service(&ctx, "llama-predictor-worker").unwrap();
        let spec = svc.spec.unwrap();
        assert_eq!(spec.cluster_ip.as_deref(), Some("None"));
        let selector = spec.selector.unwrap();
        assert_eq!(selector[APP_LABEL], "isvc.llama-predictor");
        assert_eq!(selector[NODE_ROLE_LABEL], NODE_ROLE_HEAD);

        let predictor = build_service(&ctx, ComponentType::Predictor, 8080).unwrap();
        assert_eq!(
            predictor.spec.unwrap().selector.unwrap()[NODE_ROLE_LABEL],
            NODE_ROLE_HEAD
        );
    }
}
