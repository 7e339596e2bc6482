//! Pod spec construction.
//!
//! Precedence, low to high: runtime template container < component overrides <
//! injected fields (model location, ports, health checks, sidecars, parallelism env).

use std::collections::BTreeMap;

use k8s_openapi::{
    api::core::v1::{
        Container, ContainerPort, EmptyDirVolumeSource, EnvVar,
        PersistentVolumeClaimVolumeSource, PodSpec, Probe, ResourceRequirements,
        TCPSocketAction, Volume, VolumeMount,
    },
    apimachinery::pkg::{api::resource::Quantity, util::intstr::IntOrString},
};

use super::BuildContext;
use crate::{
    config::{AuthProxyConfig, ResourceDefaults, StorageInitializerConfig},
    constants::{
        AUTH_PROXY_CONTAINER_NAME, AUTH_PROXY_PORT, AUTH_PROXY_PORT_NAME, CONTAINER_PORT,
        CONTAINER_PORT_NAME, MAIN_CONTAINER_NAME, MODEL_MOUNT_PATH, MODEL_VOLUME_NAME,
        NAME_PLACEHOLDER, PIPELINE_PARALLEL_SIZE_ENV, PVC_SCHEME, PVC_VOLUME_NAME,
        RAY_NODE_COUNT_ENV, REQUEST_GPU_COUNT_ENV, STORAGE_INITIALIZER_NAME, STORAGE_URI_ENV,
        TENSOR_PARALLEL_SIZE_ENV, WORKER_CONTAINER_NAME, HEAD_SVC_ENV, component_name,
        service_host, worker_name,
    },
    crd::{ComponentType, ContainerOverrides},
    error::InvalidSpec,
    placement::PlacementPlan,
    runtime::ResolvedRuntime,
};

/// The serving container of a component, merged but without pod-level injection.
pub fn main_container(
    ctx: &BuildContext,
    component: ComponentType,
    runtime: Option<&ResolvedRuntime>,
) -> Result<Container, InvalidSpec> {
    let spec = &ctx.isvc.spec;
    let name = ctx.name();

    let mut container = match component {
        ComponentType::Predictor => match (&spec.predictor.model, runtime) {
            (Some(model), Some(rt)) => {
                let base = substitute_name(runtime_container(rt)?, &name);
                merge_overrides(base, &model.container)
            }
            (Some(model), None) => {
                return Err(InvalidSpec::NoRuntimeForFormat {
                    format: model.model_format.name.clone(),
                });
            }
            (None, _) => first_container(&spec.predictor.containers, component)?,
        },
        ComponentType::Transformer | ComponentType::Explainer => {
            let containers = match component {
                ComponentType::Transformer => spec.transformer.as_ref().map(|t| &t.containers),
                _ => spec.explainer.as_ref().map(|e| &e.containers),
            };
            let container = first_container(containers.map_or(&[][..], Vec::as_slice), component)?;
            with_predictor_args(container, &name, &ctx.namespace())
        }
    };

    if container.name.is_empty() {
        container.name = MAIN_CONTAINER_NAME.into();
    }
    apply_resource_defaults(&mut container, &ctx.config.resource);
    ensure_serving_port(&mut container);
    ensure_readiness_check(&mut container);
    Ok(container)
}

/// The worker container of a multi-node predictor.
pub fn worker_container(
    ctx: &BuildContext,
    runtime: Option<&ResolvedRuntime>,
) -> Result<Container, InvalidSpec> {
    let base = runtime
        .and_then(|rt| rt.spec.worker_spec.as_ref())
        .and_then(|w| w.containers.first().cloned());
    let overlay = ctx
        .isvc
        .spec
        .predictor
        .worker_spec
        .as_ref()
        .and_then(|w| w.containers.first());

    let mut container = match (base, overlay) {
        (Some(base), Some(overlay)) => merge_overrides(base, &ContainerOverrides::from(overlay)),
        (Some(base), None) => base,
        (None, Some(overlay)) => overlay.clone(),
        (None, None) => {
            return Err(InvalidSpec::NoContainer {
                component: "predictor worker".into(),
            });
        }
    };
    container = substitute_name(container, &ctx.name());
    if container.name.is_empty() {
        container.name = WORKER_CONTAINER_NAME.into();
    }
    apply_resource_defaults(&mut container, &ctx.config.resource);
    Ok(container)
}

/// Storage URI for a component: the model's, or one a custom container declares via env.
pub fn storage_uri(
    ctx: &BuildContext,
    component: ComponentType,
    main: &Container,
) -> Result<Option<String>, InvalidSpec> {
    if component == ComponentType::Predictor {
        if let Some(model) = &ctx.isvc.spec.predictor.model {
            return match &model.storage_uri {
                Some(uri) if !uri.trim().is_empty() => Ok(Some(uri.clone())),
                _ => Err(InvalidSpec::MissingStorageUri {
                    component: component.to_string(),
                }),
            };
        }
    }
    Ok(main
        .env
        .as_ref()
        .and_then(|env| env.iter().find(|e| e.name == STORAGE_URI_ENV))
        .and_then(|e| e.value.clone())
        .filter(|v| !v.trim().is_empty()))
}

/// Wraps the serving container into a pod: runtime pod fields, component
/// overrides, model storage and the optional auth proxy.
pub fn assemble_pod(
    ctx: &BuildContext,
    component: ComponentType,
    main: Container,
    runtime: Option<&ResolvedRuntime>,
    storage_uri: Option<&str>,
) -> PodSpec {
    let overrides = ctx.isvc.spec.pod_overrides(component);
    let runtime_spec = runtime.map(|rt| &rt.spec);

    let mut node_selector: BTreeMap<String, String> = runtime_spec
        .map(|rt| rt.node_selector.clone())
        .unwrap_or_default();
    let mut tolerations = runtime_spec.map(|rt| rt.tolerations.clone()).unwrap_or_default();
    let mut volumes = runtime_spec.map(|rt| rt.volumes.clone()).unwrap_or_default();
    let mut service_account_name = None;

    if let Some(overrides) = overrides {
        node_selector.extend(overrides.node_selector.clone());
        tolerations.extend(overrides.tolerations.iter().cloned());
        volumes.extend(overrides.volumes.iter().cloned());
        service_account_name = overrides.service_account_name.clone();
    }

    let mut pod = PodSpec {
        containers: vec![main],
        node_selector: (!node_selector.is_empty()).then_some(node_selector),
        tolerations: (!tolerations.is_empty()).then_some(tolerations),
        volumes: (!volumes.is_empty()).then_some(volumes),
        service_account_name,
        ..Default::default()
    };

    if let Some(uri) = storage_uri {
        inject_storage(&mut pod, uri, &ctx.config.storage_initializer);
    }
    if ctx.gates.auth_enabled {
        pod.containers.push(auth_proxy_container(&ctx.config.auth_proxy));
    }
    pod
}

/// Pod of a multi-node worker; shares model storage with the head.
pub fn assemble_worker_pod(
    ctx: &BuildContext,
    worker: Container,
    runtime: Option<&ResolvedRuntime>,
    storage_uri: Option<&str>,
) -> PodSpec {
    let overrides = ctx.isvc.spec.pod_overrides(ComponentType::Predictor);
    let mut pod = PodSpec {
        containers: vec![worker],
        volumes: runtime
            .map(|rt| rt.spec.volumes.clone())
            .filter(|v| !v.is_empty()),
        node_selector: overrides
            .map(|o| o.node_selector.clone())
            .filter(|s| !s.is_empty()),
        tolerations: overrides
            .map(|o| o.tolerations.clone())
            .filter(|t| !t.is_empty()),
        service_account_name: overrides.and_then(|o| o.service_account_name.clone()),
        ..Default::default()
    };
    if let Some(uri) = storage_uri {
        inject_storage(&mut pod, uri, &ctx.config.storage_initializer);
    }
    pod
}

/// Ensures the container requests GPUs; injects one of `default_name` when none is found.
///
/// Returns the per-pod GPU count the placement solver should use.
pub fn ensure_gpu_request(container: &mut Container, names: &[String], default_name: &str) -> u32 {
    if let Some((_, count)) = crate::placement::detect_gpus(container, names) {
        return count;
    }
    let resources = container.resources.get_or_insert_with(Default::default);
    for map in [&mut resources.requests, &mut resources.limits] {
        map.get_or_insert_with(BTreeMap::new)
            .insert(default_name.to_string(), Quantity("1".into()));
    }
    crate::placement::DEFAULT_GPUS_PER_NODE
}

/// Parallelism env shared by head and worker so both agree on the topology.
pub fn inject_parallel_env(
    container: &mut Container,
    plan: &PlacementPlan,
    gpus_per_node: u32,
    isvc_name: &str,
    namespace: &str,
) {
    upsert_env(container, PIPELINE_PARALLEL_SIZE_ENV, plan.pipeline_parallel_size.to_string());
    upsert_env(container, TENSOR_PARALLEL_SIZE_ENV, plan.tensor_parallel_size.to_string());
    upsert_env(container, RAY_NODE_COUNT_ENV, plan.total_nodes().to_string());
    upsert_env(container, REQUEST_GPU_COUNT_ENV, gpus_per_node.to_string());
    upsert_env(container, HEAD_SVC_ENV, service_host(&worker_name(isvc_name), namespace));
}

fn runtime_container(rt: &ResolvedRuntime) -> Result<Container, InvalidSpec> {
    let containers = &rt.spec.containers;
    containers
        .iter()
        .find(|c| c.name == MAIN_CONTAINER_NAME)
        .or_else(|| (containers.len() == 1).then(|| &containers[0]))
        .cloned()
        .ok_or_else(|| InvalidSpec::RuntimeContainerMissing {
            name: rt.name.clone(),
            container: MAIN_CONTAINER_NAME.into(),
        })
}

fn first_container(
    containers: &[Container],
    component: ComponentType,
) -> Result<Container, InvalidSpec> {
    containers
        .first()
        .cloned()
        .ok_or_else(|| InvalidSpec::NoContainer {
            component: component.to_string(),
        })
}

fn substitute_name(mut container: Container, name: &str) -> Container {
    let replace = |items: &mut Option<Vec<String>>| {
        if let Some(items) = items {
            for item in items.iter_mut() {
                if item.contains(NAME_PLACEHOLDER) {
                    *item = item.replace(NAME_PLACEHOLDER, name);
                }
            }
        }
    };
    replace(&mut container.args);
    replace(&mut container.command);
    container
}

fn with_predictor_args(mut container: Container, isvc_name: &str, namespace: &str) -> Container {
    let args = container.args.get_or_insert_with(Vec::new);
    if !args.iter().any(|a| a.starts_with("--model_name")) {
        args.push(format!("--model_name={isvc_name}"));
    }
    if !args.iter().any(|a| a.starts_with("--predictor_host")) {
        let predictor = component_name(isvc_name, ComponentType::Predictor);
        args.push(format!("--predictor_host={predictor}.{namespace}"));
    }
    container
}

impl From<&Container> for ContainerOverrides {
    fn from(c: &Container) -> Self {
        ContainerOverrides {
            image: c.image.clone(),
            command: c.command.clone(),
            args: c.args.clone(),
            env: c.env.clone().unwrap_or_default(),
            resources: c.resources.clone(),
            readiness_probe: c.readiness_probe.clone(),
            liveness_probe: c.liveness_probe.clone(),
        }
    }
}

/// Overrides win field by field; args append, env and resources merge by key.
pub fn merge_overrides(mut base: Container, overrides: &ContainerOverrides) -> Container {
    if let Some(image) = &overrides.image {
        base.image = Some(image.clone());
    }
    if let Some(command) = &overrides.command {
        base.command = Some(command.clone());
    }
    if let Some(args) = &overrides.args {
        base.args.get_or_insert_with(Vec::new).extend(args.iter().cloned());
    }
    for env in &overrides.env {
        upsert_env_var(&mut base, env.clone());
    }
    if let Some(resources) = &overrides.resources {
        base.resources = Some(merge_resources(base.resources.take(), resources));
    }
    if let Some(check) = &overrides.readiness_probe {
        base.readiness_probe = Some(check.clone());
    }
    if let Some(check) = &overrides.liveness_probe {
        base.liveness_probe = Some(check.clone());
    }
    base
}

fn merge_resources(
    base: Option<ResourceRequirements>,
    overlay: &ResourceRequirements,
) -> ResourceRequirements {
    let mut merged = base.unwrap_or_default();
    for (target, source) in [
        (&mut merged.requests, &overlay.requests),
        (&mut merged.limits, &overlay.limits),
    ] {
        if let Some(source) = source {
            target
                .get_or_insert_with(BTreeMap::new)
                .extend(source.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
    }
    merged
}

/// Fills missing cpu/memory from configuration. A request missing next to a
/// limit takes the limit, and vice versa, so defaults never invert the pair.
pub fn apply_resource_defaults(container: &mut Container, defaults: &ResourceDefaults) {
    let resources = container.resources.get_or_insert_with(Default::default);
    let original_requests = resources.requests.clone().unwrap_or_default();
    let original_limits = resources.limits.clone().unwrap_or_default();

    for (key, default_request, default_limit) in [
        ("cpu", &defaults.cpu_request, &defaults.cpu_limit),
        ("memory", &defaults.memory_request, &defaults.memory_limit),
    ] {
        let request = original_requests
            .get(key)
            .or_else(|| original_limits.get(key))
            .cloned()
            .unwrap_or_else(|| Quantity(default_request.clone()));
        let limit = original_limits
            .get(key)
            .or_else(|| original_requests.get(key))
            .cloned()
            .unwrap_or_else(|| Quantity(default_limit.clone()));
        resources
            .requests
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), request);
        resources
            .limits
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), limit);
    }
}

fn ensure_serving_port(container: &mut Container) {
    let ports = container.ports.get_or_insert_with(Vec::new);
    if ports.is_empty() {
        ports.push(ContainerPort {
            name: Some(CONTAINER_PORT_NAME.into()),
            container_port: CONTAINER_PORT,
            protocol: Some("TCP".into()),
            ..Default::default()
        });
    }
}

/// Port the serving container listens on, the first declared one.
pub fn serving_port(container: &Container) -> i32 {
    container
        .ports
        .as_ref()
        .and_then(|p| p.first())
        .map(|p| p.container_port)
        .unwrap_or(CONTAINER_PORT)
}

fn ensure_readiness_check(container: &mut Container) {
    if container.readiness_probe.is_some() {
        return;
    }
    container.readiness_probe = Some(Probe {
        tcp_socket: Some(TCPSocketAction {
            port: IntOrString::Int(serving_port(container)),
            ..Default::default()
        }),
        timeout_seconds: Some(1),
        period_seconds: Some(10),
        success_threshold: Some(1),
        failure_threshold: Some(3),
        ..Default::default()
    });
}

fn inject_storage(pod: &mut PodSpec, uri: &str, config: &StorageInitializerConfig) {
    let volumes = pod.volumes.get_or_insert_with(Vec::new);

    if let Some(rest) = uri.strip_prefix(PVC_SCHEME) {
        let (claim, sub_path) = rest.split_once('/').unwrap_or((rest, ""));
        volumes.push(Volume {
            name: PVC_VOLUME_NAME.into(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: claim.to_string(),
                read_only: Some(true),
            }),
            ..Default::default()
        });
        if let Some(main) = pod.containers.first_mut() {
            main.volume_mounts.get_or_insert_with(Vec::new).push(VolumeMount {
                name: PVC_VOLUME_NAME.into(),
                mount_path: MODEL_MOUNT_PATH.into(),
                sub_path: (!sub_path.is_empty()).then(|| sub_path.to_string()),
                read_only: Some(true),
                ..Default::default()
            });
            upsert_env(main, STORAGE_URI_ENV, uri.to_string());
        }
        return;
    }

    volumes.push(Volume {
        name: MODEL_VOLUME_NAME.into(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    });
    if let Some(main) = pod.containers.first_mut() {
        main.volume_mounts.get_or_insert_with(Vec::new).push(VolumeMount {
            name: MODEL_VOLUME_NAME.into(),
            mount_path: MODEL_MOUNT_PATH.into(),
            read_only: Some(true),
            ..Default::default()
        });
        upsert_env(main, STORAGE_URI_ENV, uri.to_string());
    }

    let mut requests = BTreeMap::new();
    requests.insert("cpu".to_string(), Quantity(config.cpu_request.clone()));
    requests.insert("memory".to_string(), Quantity(config.memory_request.clone()));
    let mut limits = BTreeMap::new();
    limits.insert("cpu".to_string(), Quantity(config.cpu_limit.clone()));
    limits.insert("memory".to_string(), Quantity(config.memory_limit.clone()));

    pod.init_containers.get_or_insert_with(Vec::new).push(Container {
        name: STORAGE_INITIALIZER_NAME.into(),
        image: Some(config.image.clone()),
        args: Some(vec![uri.to_string(), MODEL_MOUNT_PATH.to_string()]),
        resources: Some(ResourceRequirements {
            requests: Some(requests),
            limits: Some(limits),
            ..Default::default()
        }),
        volume_mounts: Some(vec![VolumeMount {
            name: MODEL_VOLUME_NAME.into(),
            mount_path: MODEL_MOUNT_PATH.into(),
            ..Default::default()
        }]),
        termination_message_policy: Some("FallbackToLogsOnError".into()),
        ..Default::default()
    });
}

fn auth_proxy_container(config: &AuthProxyConfig) -> Container {
    let mut requests = BTreeMap::new();
    requests.insert("cpu".to_string(), Quantity(config.cpu_request.clone()));
    requests.insert("memory".to_string(), Quantity(config.memory_request.clone()));
    Container {
        name: AUTH_PROXY_CONTAINER_NAME.into(),
        image: Some(config.image.clone()),
        args: Some(vec![
            format!("--secure-listen-address=0.0.0.0:{AUTH_PROXY_PORT}"),
            format!("--upstream=http://127.0.0.1:{CONTAINER_PORT}/"),
            "--logtostderr=true".into(),
        ]),
        ports: Some(vec![ContainerPort {
            name: Some(AUTH_PROXY_PORT_NAME.into()),
            container_port: AUTH_PROXY_PORT,
            protocol: Some("TCP".into()),
            ..Default::default()
        }]),
        resources: Some(ResourceRequirements {
            requests: Some(requests),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn upsert_env(container: &mut Container, name: &str, value: String) {
    upsert_env_var(
        container,
        EnvVar {
            name: name.to_string(),
            value: Some(value),
            ..Default::default()
        },
    );
}

fn upsert_env_var(container: &mut Container, var: EnvVar) {
    let env = container.env.get_or_insert_with(Vec::new);
    match env.iter_mut().find(|e| e.name == var.name) {
        Some(existing) => *existing = var,
        None => env.push(var),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        builder::testing,
        config::OperatorConfig,
        crd::{ContainerComponentSpec, WorkerSpec},
        placement,
    };

    fn env_value<'a>(container: &'a Container, name: &str) -> Option<&'a str> {
        container
            .env
            .as_ref()?
            .iter()
            .find(|e| e.name == name)?
            .value
            .as_deref()
    }

    #[test]
    fn runtime_container_is_merged_with_model_overrides() {
        let mut isvc = testing::isvc("sklearn");
        let model = isvc.spec.predictor.model.as_mut().unwrap();
        model.container.args = Some(vec!["--workers=2".into()]);
        model.container.env = vec![EnvVar {
            name: "LOG_LEVEL".into(),
            value: Some("debug".into()),
            ..Default::default()
        }];
        let config = OperatorConfig::default();
        let gates = testing::gates(&config, &isvc);
        let ctx = BuildContext::new(&isvc, &config, &gates);
        let rt = testing::runtime();

        let main = main_container(&ctx, ComponentType::Predictor, Some(&rt)).unwrap();

        assert_eq!(main.name, MAIN_CONTAINER_NAME);
        assert_eq!(main.image.as_deref(), Some("kserve/sklearnserver:latest"));
        assert_eq!(
            main.args.as_ref().unwrap(),
            &vec![
                "--model_name=sklearn".to_string(),
                "--model_dir=/mnt/models".to_string(),
                "--workers=2".to_string()
            ]
        );
        assert_eq!(env_value(&main, "LOG_LEVEL"), Some("debug"));
        assert_eq!(serving_port(&main), CONTAINER_PORT);
        assert!(main.readiness_probe.is_some());
    }

    #[test]
    fn resource_defaults_come_from_configuration() {
        let isvc = testing::isvc("sklearn");
        let mut config = OperatorConfig::default();
        config.resource.cpu_request = "250m".into();
        config.resource.memory_limit = "4Gi".into();
        let gates = testing::gates(&config, &isvc);
        let ctx = BuildContext::new(&isvc, &config, &gates);

        let runtime = testing::runtime();
        let main = main_container(&ctx, ComponentType::Predictor, Some(&runtime)).unwrap();
        let resources = main.resources.unwrap();
        assert_eq!(resources.requests.as_ref().unwrap()["cpu"].0, "250m");
        assert_eq!(resources.limits.as_ref().unwrap()["memory"].0, "4Gi");
    }

    #[test]
    fn declared_limit_backs_missing_request() {
        let mut limits = BTreeMap::new();
        limits.insert("cpu".to_string(), Quantity("500m".into()));
        let mut container = Container {
            name: "c".into(),
            resources: Some(ResourceRequirements {
                limits: Some(limits),
                ..Default::default()
            }),
            ..Default::default()
        };
        apply_resource_defaults(&mut container, &ResourceDefaults::default());
        let resources = container.resources.unwrap();
        assert_eq!(resources.requests.unwrap()["cpu"].0, "500m");
        assert_eq!(resources.limits.unwrap()["cpu"].0, "500m");
    }

    #[test]
    fn runtime_without_main_container_fails() {
        let isvc = testing::isvc("sklearn");
        let config = OperatorConfig::default();
        let gates = testing::gates(&config, &isvc);
        let ctx = BuildContext::new(&isvc, &config, &gates);
        let mut rt = testing::runtime();
        rt.spec.containers = vec![
            Container {
                name: "a".into(),
                ..Default::default()
            },
            Container {
                name: "b".into(),
                ..Default::default()
            },
        ];
        let err = main_container(&ctx, ComponentType::Predictor, Some(&rt)).unwrap_err();
        assert_eq!(err.reason(), "InvalidRuntimeTemplate");
    }

    #[test]
    fn model_without_storage_uri_fails() {
        let mut isvc = testing::isvc("sklearn");
        isvc.spec.predictor.model.as_mut().unwrap().storage_uri = None;
        let config = OperatorConfig::default();
        let gates = testing::gates(&config, &isvc);
        let ctx = BuildContext::new(&isvc, &config, &gates);
        let runtime = testing::runtime();
        let main = main_container(&ctx, ComponentType::Predictor, Some(&runtime)).unwrap();
        let err = storage_uri(&ctx, ComponentType::Predictor, &main).unwrap_err();
        assert_eq!(err.reason(), "MissingStorageURI");
    }

    #[test]
    fn storage_initializer_is_injected_for_remote_uris() {
        let isvc = testing::isvc("sklearn");
        let config = OperatorConfig::default();
        let gates = testing::gates(&config, &isvc);
        let ctx = BuildContext::new(&isvc, &config, &gates);
        let rt = testing::runtime();
        let main = main_container(&ctx, ComponentType::Predictor, Some(&rt)).unwrap();
        let uri = storage_uri(&ctx, ComponentType::Predictor, &main).unwrap();

        let pod = assemble_pod(&ctx, ComponentType::Predictor, main, Some(&rt), uri.as_deref());

        let init = &pod.init_containers.as_ref().unwrap()[0];
        assert_eq!(init.name, STORAGE_INITIALIZER_NAME);
        assert_eq!(
            init.args.as_ref().unwrap(),
            &vec!["gs://models/sklearn/iris".to_string(), MODEL_MOUNT_PATH.to_string()]
        );
        let main = &pod.containers[0];
        assert_eq!(env_value(main, STORAGE_URI_ENV), Some("gs://models/sklearn/iris"));
        assert_eq!(main.volume_mounts.as_ref().unwrap()[0].mount_path, MODEL_MOUNT_PATH);
    }

    #[test]
    fn pvc_uri_mounts_claim_without_initializer() {
        let mut isvc = testing::isvc("sklearn");
        isvc.spec.predictor.model.as_mut().unwrap().storage_uri =
            Some("pvc://model-store/iris/v1".into());
        let config = OperatorConfig::default();
        let gates = testing::gates(&config, &isvc);
        let ctx = BuildContext::new(&isvc, &config, &gates);
        let rt = testing::runtime();
        let main = main_container(&ctx, ComponentType::Predictor, Some(&rt)).unwrap();
        let uri = storage_uri(&ctx, ComponentType::Predictor, &main).unwrap();

        let pod = assemble_pod(&ctx, ComponentType::Predictor, main, Some(&rt), uri.as_deref());

        assert!(pod.init_containers.is_none());
        let volume = &pod.volumes.as_ref().unwrap()[0];
        assert_eq!(
            volume.persistent_volume_claim.as_ref().unwrap().claim_name,
            "model-store"
        );
        let mount = &pod.containers[0].volume_mounts.as_ref().unwrap()[0];
        assert_eq!(mount.sub_path.as_deref(), Some("iris/v1"));
    }

    #[test]
    fn transformer_gets_predictor_host() {
        let mut isvc = testing::isvc("sklearn");
        isvc.spec.transformer = Some(ContainerComponentSpec {
            containers: vec![Container {
                name: "kserve-container".into(),
                image: Some("example/transformer".into()),
                ..Default::default()
            }],
            ..Default::default()
        });
        let config = OperatorConfig::default();
        let gates = testing::gates(&config, &isvc);
        let ctx = BuildContext::new(&isvc, &config, &gates);

        let main = main_container(&ctx, ComponentType::Transformer, None).unwrap();
        let args = main.args.unwrap();
        assert!(args.contains(&"--model_name=sklearn".to_string()));
        assert!(args.contains(&"--predictor_host=sklearn-predictor.models".to_string()));
    }

    #[test]
    fn auth_proxy_sidecar_when_enabled() {
        let mut isvc = testing::isvc("sklearn");
        testing::annotate(&mut isvc, crate::constants::ENABLE_AUTH_ANNOTATION, "true");
        let config = OperatorConfig::default();
        let gates = testing::gates(&config, &isvc);
        let ctx = BuildContext::new(&isvc, &config, &gates);
        let rt = testing::runtime();
        let main = main_container(&ctx, ComponentType::Predictor, Some(&rt)).unwrap();

        let pod = assemble_pod(&ctx, ComponentType::Predictor, main, Some(&rt), None);
        assert_eq!(pod.containers.len(), 2);
        assert_eq!(pod.containers[1].name, AUTH_PROXY_CONTAINER_NAME);
    }

    #[test]
    fn worker_container_defaults_single_gpu_and_env() {
        let mut isvc = testing::isvc("llama");
        isvc.spec.predictor.worker_spec = Some(WorkerSpec {
            pipeline_parallel_size: Some(5),
            tensor_parallel_size: None,
            containers: vec![Container {
                name: "worker-container".into(),
                image: Some("kserve/huggingfaceserver".into()),
                ..Default::default()
            }],
        });
        let config = OperatorConfig::default();
        let gates = testing::gates(&config, &isvc);
        let ctx = BuildContext::new(&isvc, &config, &gates);

        let mut worker = worker_container(&ctx, None).unwrap();
        let gpus = ensure_gpu_request(
            &mut worker,
            &config.multi_node.gpu_resource_names,
            &config.multi_node.default_gpu_resource_name,
        );
        assert_eq!(gpus, 1);
        let limits = worker.resources.as_ref().unwrap().limits.as_ref().unwrap();
        assert_eq!(limits["nvidia.com/gpu"].0, "1");

        let plan = placement::solve(placement::PlacementInput {
            pipeline_parallel_size: 5,
            tensor_parallel_size: 1,
            head_gpus: 1,
            worker_gpus: gpus,
        })
        .unwrap();
        inject_parallel_env(&mut worker, &plan, gpus, "llama", "models");
        assert_eq!(env_value(&worker, RAY_NODE_COUNT_ENV), Some("5"));
        assert_eq!(env_value(&worker, PIPELINE_PARALLEL_SIZE_ENV), Some("5"));
        assert_eq!(env_value(&worker, TENSOR_PARALLEL_SIZE_ENV), Some("1"));
    }

    #[test]
    fn worker_without_any_template_fails() {
        let mut isvc = testing::isvc("llama");
        isvc.spec.predictor.worker_spec = Some(WorkerSpec::default());
        let config = OperatorConfig::default();
        let gates = testing::gates(&config, &isvc);
        let ctx = BuildContext::new(&isvc, &config, &gates);
        let err = worker_container(&ctx, Some(&testing::runtime())).unwrap_err();
        assert_eq!(err.reason(), "NoContainer");
    }
}
