//! Component orchestrator.
//!
//! Planning is pure: from the declared spec, runtime and configuration it
//! yields the desired object for every slot a component can own, `None`
//! meaning "must not exist". Applying walks the slots in dependency order and
//! stops at the first failure, so a component never ends up half-rolled.

use std::collections::BTreeMap;

use k8s_openapi::api::{
    apps::v1::Deployment, autoscaling::v2::HorizontalPodAutoscaler, core::v1::Service,
};
use kube::Client;
use tracing::{debug, instrument};

use crate::{
    annotations::AutoscalerClass,
    builder::{
        BuildContext,
        autoscaler::{ReplicaRange, effective_class, replica_range},
        pod,
        route::{component_address, component_url},
        workload::{
            NODE_ROLE_HEAD, NODE_ROLE_WORKER, WorkloadInput, build_deployment,
            build_headless_service, build_service,
        },
    },
    config::ReconcilerConfig,
    constants::{OTEL_INJECT_ANNOTATION, component_name, worker_name},
    crd::{
        ComponentState, ComponentStatusSpec, ComponentType, Condition, ConditionType, HttpRoute,
        OpenTelemetryCollector, ScaledObject,
    },
    error::{Error, ErrorClass},
    placement::{
        self, DEFAULT_MULTI_NODE_PIPELINE_PARALLEL_SIZE, DEFAULT_TENSOR_PARALLEL_SIZE,
        PlacementInput, PlacementPlan,
    },
    reconciler::{self, ObjectKind, ObjectReconciler, Reconciled, Verdict},
    runtime::ResolvedRuntime,
};

/// Desired state of every object slot of one component.
#[derive(Debug, Clone)]
pub struct ComponentPlan {
    pub component: ComponentType,
    pub name: String,
    /// Name shared by the worker Deployment and the headless head Service.
    pub worker_name: String,
    pub class: AutoscalerClass,
    pub range: ReplicaRange,
    pub placement: Option<PlacementPlan>,
    pub collector: Option<OpenTelemetryCollector>,
    pub deployment: Option<Deployment>,
    pub worker_service: Option<Service>,
    pub worker_deployment: Option<Deployment>,
    pub service: Option<Service>,
    pub hpa: Option<HorizontalPodAutoscaler>,
    pub scaled_object: Option<ScaledObject>,
    pub route: Option<HttpRoute>,
}

impl ComponentPlan {
    /// Nothing may exist: the component is undeclared or the service is stopped.
    pub fn absent(ctx: &BuildContext, component: ComponentType) -> Self {
        Self {
            component,
            name: component_name(&ctx.name(), component),
            worker_name: worker_name(&ctx.name()),
            class: AutoscalerClass::None,
            range: ReplicaRange { min: 0, max: 0 },
            placement: None,
            collector: None,
            deployment: None,
            worker_service: None,
            worker_deployment: None,
            service: None,
            hpa: None,
            scaled_object: None,
            route: None,
        }
    }

    pub fn is_multi_node(&self) -> bool {
        self.placement.is_some()
    }
}

fn parallel_sizes(ctx: &BuildContext, runtime: Option<&ResolvedRuntime>) -> (u32, u32) {
    let declared = ctx.isvc.spec.predictor.worker_spec.as_ref();
    let template = runtime.and_then(|rt| rt.spec.worker_spec.as_ref());
    let pipeline = declared
        .and_then(|w| w.pipeline_parallel_size)
        .or_else(|| template.and_then(|t| t.pipeline_parallel_size))
        .unwrap_or(DEFAULT_MULTI_NODE_PIPELINE_PARALLEL_SIZE);
    let tensor = declared
        .and_then(|w| w.tensor_parallel_size)
        .or_else(|| template.and_then(|t| t.tensor_parallel_size))
        .unwrap_or(DEFAULT_TENSOR_PARALLEL_SIZE);
    (pipeline, tensor)
}

/// Computes the desired objects of one component. Pure; fails before anything
/// is written when the declared state is inconsistent.
pub fn plan_component(
    ctx: &BuildContext,
    component: ComponentType,
    runtime: Option<&ResolvedRuntime>,
) -> Result<ComponentPlan, Error> {
    if ctx.gates.stopped || !ctx.isvc.spec.is_declared(component) {
        return Ok(ComponentPlan::absent(ctx, component));
    }

    let name = component_name(&ctx.name(), component);
    let namespace = ctx.namespace();
    let extension = ctx.isvc.spec.extension(component);
    let class = effective_class(ctx, component);
    let range = replica_range(extension, ctx.config.autoscaler.min_replicas_floor);

    let mut main = pod::main_container(ctx, component, runtime)?;
    let storage_uri = pod::storage_uri(ctx, component, &main)?;
    let serving_port = pod::serving_port(&main);
    let multi_node = component == ComponentType::Predictor && ctx.isvc.spec.is_multi_node();

    let mut worker_container_spec = None;
    let mut placement_plan = None;
    if multi_node {
        let gpu_names = &ctx.config.multi_node.gpu_resource_names;
        let default_gpu = &ctx.config.multi_node.default_gpu_resource_name;
        let mut worker_container = pod::worker_container(ctx, runtime)?;
        let head_gpus = pod::ensure_gpu_request(&mut main, gpu_names, default_gpu);
        let worker_gpus = pod::ensure_gpu_request(&mut worker_container, gpu_names, default_gpu);
        let (pipeline, tensor) = parallel_sizes(ctx, runtime);

        let plan = placement::solve(PlacementInput {
            pipeline_parallel_size: pipeline,
            tensor_parallel_size: tensor,
            head_gpus,
            worker_gpus,
        })?;
        debug!(
            isvc = %ctx.name(),
            workers = plan.worker_replicas,
            required_gpus = plan.required_gpus(),
            "placement solved"
        );
        pod::inject_parallel_env(&mut main, &plan, head_gpus, &ctx.name(), &namespace);
        pod::inject_parallel_env(
            &mut worker_container,
            &plan,
            worker_gpus,
            &ctx.name(),
            &namespace,
        );
        worker_container_spec = Some(worker_container);
        placement_plan = Some(plan);
    }

    let collector = reconciler::otel::desired(ctx, component, serving_port)?;
    let mut pod_annotations = BTreeMap::new();
    if collector.is_some() {
        pod_annotations.insert(OTEL_INJECT_ANNOTATION.to_string(), name.clone());
    }

    let head_pod = pod::assemble_pod(ctx, component, main, runtime, storage_uri.as_deref());
    let deployment = build_deployment(
        ctx,
        WorkloadInput {
            component,
            name: name.clone(),
            selector_name: name.clone(),
            pod: head_pod,
            replicas: Some(if multi_node { 1 } else { range.min }),
            runtime,
            node_role: multi_node.then_some(NODE_ROLE_HEAD),
            pod_annotations,
        },
    )?;

    let worker = worker_name(&ctx.name());
    let (worker_service, worker_deployment) = match (worker_container_spec, &placement_plan) {
        (Some(container), Some(plan)) => {
            let worker_pod =
                pod::assemble_worker_pod(ctx, container, runtime, storage_uri.as_deref());
            let deployment = build_deployment(
                ctx,
                WorkloadInput {
                    component,
                    name: worker.clone(),
                    selector_name: worker.clone(),
                    pod: worker_pod,
                    replicas: Some(plan.worker_replicas),
                    runtime,
                    node_role: Some(NODE_ROLE_WORKER),
                    pod_annotations: BTreeMap::new(),
                },
            )?;
            (
                Some(build_headless_service(ctx, &worker)?),
                Some(deployment),
            )
        }
        _ => (None, None),
    };

    Ok(ComponentPlan {
        component,
        name,
        worker_name: worker,
        class,
        range,
        placement: placement_plan,
        collector,
        deployment: Some(deployment),
        worker_service,
        worker_deployment,
        service: Some(build_service(ctx, component, serving_port)?),
        hpa: reconciler::hpa::desired(ctx, component, range)?,
        scaled_object: reconciler::keda::desired(ctx, component, range)?,
        route: reconciler::httproute::desired_component(ctx, component)?,
    })
}

/// Where and as whom objects are written.
#[derive(Clone)]
pub struct ApplyContext<'a> {
    pub client: &'a Client,
    pub namespace: &'a str,
    pub owner_uid: &'a str,
    pub config: &'a ReconcilerConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectVerdict {
    pub kind: ObjectKind,
    pub name: String,
    pub verdict: Verdict,
}

/// Objects read back after applying, used for readiness.
#[derive(Debug, Clone, Default)]
pub struct ObservedComponent {
    pub deployment: Option<Deployment>,
    pub worker_deployment: Option<Deployment>,
    pub route: Option<HttpRoute>,
}

#[derive(Debug, Default)]
pub struct ComponentReport {
    pub verdicts: Vec<ObjectVerdict>,
    pub observed: ObservedComponent,
    /// First failure; later slots were not touched.
    pub error: Option<Error>,
}

impl ComponentReport {
    fn record<K>(&mut self, kind: ObjectKind, name: &str, result: &Reconciled<K>) {
        self.verdicts.push(ObjectVerdict {
            kind,
            name: name.to_string(),
            verdict: result.verdict,
        });
    }
}

async fn apply_slot<K>(
    report: &mut ComponentReport,
    reconciler: ObjectReconciler<K>,
    name: &str,
    desired: Option<K>,
) -> Result<Option<K>, Error>
where
    K: kube::Resource<DynamicType = ()>
        + Clone
        + serde::Serialize
        + serde::de::DeserializeOwned
        + std::fmt::Debug,
{
    let kind = reconciler.kind();
    match reconciler.reconcile(name, desired).await {
        Ok(result) => {
            report.record(kind, name, &result);
            Ok(if result.exists() { result.object } else { None })
        }
        Err(e) => {
            report.verdicts.push(ObjectVerdict {
                kind,
                name: name.to_string(),
                verdict: Verdict::Unknown,
            });
            Err(e)
        }
    }
}

async fn apply_slots(
    actx: &ApplyContext<'_>,
    plan: ComponentPlan,
    report: &mut ComponentReport,
) -> Result<(), Error> {
    let ApplyContext {
        client,
        namespace,
        owner_uid,
        config,
    } = actx.clone();
    let name = plan.name.clone();

    // The collector must exist before pods are admitted for sidecar injection.
    apply_slot(
        report,
        reconciler::otel::reconciler(client, namespace, owner_uid, config),
        &name,
        plan.collector,
    )
    .await?;

    report.observed.deployment = apply_slot(
        report,
        reconciler::deployment::reconciler(client, namespace, owner_uid, config, plan.class),
        &name,
        plan.deployment,
    )
    .await?;

    if plan.component == ComponentType::Predictor {
        let worker = plan.worker_name.clone();
        apply_slot(
            report,
            reconciler::service::reconciler(client, namespace, owner_uid, config),
            &worker,
            plan.worker_service,
        )
        .await?;
        report.observed.worker_deployment = apply_slot(
            report,
            reconciler::deployment::reconciler(
                client,
                namespace,
                owner_uid,
                config,
                AutoscalerClass::None,
            ),
            &worker,
            plan.worker_deployment,
        )
        .await?;
    }

    apply_slot(
        report,
        reconciler::service::reconciler(client, namespace, owner_uid, config),
        &name,
        plan.service,
    )
    .await?;
    apply_slot(
        report,
        reconciler::hpa::reconciler(client, namespace, owner_uid, config),
        &name,
        plan.hpa,
    )
    .await?;
    apply_slot(
        report,
        reconciler::keda::reconciler(client, namespace, owner_uid, config),
        &name,
        plan.scaled_object,
    )
    .await?;
    report.observed.route = apply_slot(
        report,
        reconciler::httproute::reconciler(client, namespace, owner_uid, config),
        &name,
        plan.route,
    )
    .await?;
    Ok(())
}

/// Applies a plan slot by slot; the first error stops this component only.
#[instrument(skip_all, fields(component = %plan.component, name = %plan.name))]
pub async fn apply_component(actx: &ApplyContext<'_>, plan: ComponentPlan) -> ComponentReport {
    let mut report = ComponentReport::default();
    if let Err(e) = apply_slots(actx, plan, &mut report).await {
        report.error = Some(e);
    }
    report
}

/// What the status fold needs to know about one component after a pass.
#[derive(Debug)]
pub enum ComponentOutcome<'a> {
    NotDeclared,
    Stopped,
    /// Planning failed; nothing was written.
    Invalid(&'a Error),
    Applied {
        plan: &'a ComponentPlan,
        report: &'a ComponentReport,
    },
}

/// Folds one component's outcome into its status entry and readiness condition.
/// `None` status means the entry is dropped.
pub fn component_status(
    ctx: &BuildContext,
    component: ComponentType,
    outcome: ComponentOutcome,
) -> (Option<ComponentStatusSpec>, Option<Condition>) {
    let condition_type = ConditionType::for_component(component);
    match outcome {
        ComponentOutcome::NotDeclared => (None, None),
        ComponentOutcome::Stopped => (
            Some(ComponentStatusSpec {
                state: ComponentState::Stopped,
                ..Default::default()
            }),
            Some(Condition::new(condition_type, false).with_reason(
                "Stopped",
                "the InferenceService is stopped",
            )),
        ),
        ComponentOutcome::Invalid(error) => (
            Some(ComponentStatusSpec {
                state: failed_or_provisioning(error),
                ..Default::default()
            }),
            Some(
                Condition::new(condition_type, false)
                    .with_reason(error.reason(), error.to_string()),
            ),
        ),
        ComponentOutcome::Applied { plan, report } => {
            let observed = &report.observed;
            let mut status = ComponentStatusSpec {
                state: ComponentState::Provisioning,
                url: Some(component_url(ctx, component)),
                address: Some(component_address(ctx, component)),
                available_replicas: observed
                    .deployment
                    .as_ref()
                    .and_then(reconciler::deployment::available_replicas),
                updated_replicas: observed
                    .deployment
                    .as_ref()
                    .and_then(reconciler::deployment::updated_replicas),
                worker_replicas: plan.placement.as_ref().map(|p| p.worker_replicas),
            };

            let (ready, reason, message) = readiness(ctx, plan, report);
            status.state = if ready {
                ComponentState::Ready
            } else if let Some(error) = &report.error {
                failed_or_provisioning(error)
            } else if observed
                .deployment
                .as_ref()
                .and_then(reconciler::deployment::failure)
                .is_some()
            {
                ComponentState::Failed
            } else {
                ComponentState::Provisioning
            };

            let condition = if ready {
                Condition::new(condition_type, true)
            } else {
                Condition::new(condition_type, false).with_reason(reason, message)
            };
            (Some(status), Some(condition))
        }
    }
}

fn failed_or_provisioning(error: &Error) -> ComponentState {
    match error.class() {
        ErrorClass::Terminal | ErrorClass::Fatal => ComponentState::Failed,
        ErrorClass::Transient => ComponentState::Provisioning,
    }
}

/// (ready, reason, message); reason and message explain the first unmet requirement.
fn readiness(
    ctx: &BuildContext,
    plan: &ComponentPlan,
    report: &ComponentReport,
) -> (bool, String, String) {
    if let Some(error) = &report.error {
        return (false, error.reason().into(), error.to_string());
    }
    let observed = &report.observed;

    let Some(deployment) = &observed.deployment else {
        return (false, "DeploymentNotFound".into(), format!("Deployment {} not found", plan.name));
    };
    if let Some((reason, message)) = reconciler::deployment::failure(deployment) {
        return (false, reason, message);
    }
    if !reconciler::deployment::is_available(deployment) {
        return (
            false,
            "DeploymentUnavailable".into(),
            format!("Deployment {} has no available replicas yet", plan.name),
        );
    }

    if let Some(placement) = &plan.placement {
        if placement.worker_replicas > 0
            && !observed
                .worker_deployment
                .as_ref()
                .is_some_and(reconciler::deployment::is_available)
        {
            return (
                false,
                "WorkerUnavailable".into(),
                format!("{} worker replicas are not available yet", placement.worker_replicas),
            );
        }
    }

    if reconciler::httproute::applies(ctx)
        && !observed.route.as_ref().is_some_and(reconciler::httproute::is_ready)
    {
        return (
            false,
            "RouteNotAccepted".into(),
            format!("HTTPRoute {} is not accepted by its gateway", plan.name),
        );
    }

    (true, String::new(), String::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        builder::testing,
        config::OperatorConfig,
        constants::{AUTOSCALER_CLASS_ANNOTATION, RAY_NODE_COUNT_ENV, STOP_ANNOTATION},
        crd::WorkerSpec,
        error::InvalidSpec,
    };
    use k8s_openapi::api::{
        apps::v1::{DeploymentCondition, DeploymentStatus},
        core::v1::Container,
    };

    fn available(mut d: Deployment) -> Deployment {
        d.status = Some(DeploymentStatus {
            available_replicas: Some(1),
            conditions: Some(vec![DeploymentCondition {
                type_: "Available".into(),
                status: "True".into(),
                ..Default::default()
            }]),
            ..Default::default()
        });
        d
    }

    fn accepted(mut route: HttpRoute) -> HttpRoute {
        route.status = Some(
            serde_json::from_value(serde_json::json!({
                "parents": [{"conditions": [{"type": "Accepted", "status": "True"}]}]
            }))
            .unwrap(),
        );
        route
    }

    #[test]
    fn plan_for_hpa_predictor() {
        let isvc = testing::isvc("sklearn");
        let config = OperatorConfig::default();
        let gates = testing::gates(&config, &isvc);
        let ctx = BuildContext::new(&isvc, &config, &gates);

        let runtime = testing::runtime();
        let plan = plan_component(&ctx, ComponentType::Predictor, Some(&runtime)).unwrap();
        assert_eq!(plan.name, "sklearn-predictor");
        assert!(plan.deployment.is_some());
        assert!(plan.service.is_some());
        assert!(plan.hpa.is_some());
        assert!(plan.scaled_object.is_none());
        assert!(plan.collector.is_none());
        assert!(plan.route.is_some());
        assert!(plan.worker_deployment.is_none());
    }

    #[test]
    fn stopped_or_undeclared_plan_is_empty() {
        let mut isvc = testing::isvc("sklearn");
        let config = OperatorConfig::default();
        let gates = testing::gates(&config, &isvc);
        let ctx = BuildContext::new(&isvc, &config, &gates);
        let plan = plan_component(&ctx, ComponentType::Explainer, None).unwrap();
        assert!(plan.deployment.is_none() && plan.service.is_none() && plan.route.is_none());

        testing::annotate(&mut isvc, STOP_ANNOTATION, "true");
        let gates = testing::gates(&config, &isvc);
        let ctx = BuildContext::new(&isvc, &config, &gates);
        let runtime = testing::runtime();
        let plan = plan_component(&ctx, ComponentType::Predictor, Some(&runtime)).unwrap();
        assert!(plan.deployment.is_none());
        assert!(plan.hpa.is_none());
    }

    #[test]
    fn class_none_replicas_follow_min() {
        let mut isvc = testing::isvc("sklearn");
        isvc.spec.predictor.extension.min_replicas = Some(2);
        isvc.spec.predictor.extension.max_replicas = Some(5);
        testing::annotate(&mut isvc, AUTOSCALER_CLASS_ANNOTATION, "none");
        let config = OperatorConfig::default();
        let gates = testing::gates(&config, &isvc);
        let ctx = BuildContext::new(&isvc, &config, &gates);

        let runtime = testing::runtime();
        let plan = plan_component(&ctx, ComponentType::Predictor, Some(&runtime)).unwrap();
        assert!(plan.hpa.is_none());
        assert_eq!(plan.deployment.unwrap().spec.unwrap().replicas, Some(2));
    }

    #[test]
    fn infeasible_placement_plans_nothing() {
        let mut isvc = testing::isvc("llama");
        isvc.spec.predictor.worker_spec = Some(WorkerSpec {
            pipeline_parallel_size: Some(4),
            tensor_parallel_size: Some(1),
            containers: vec![Container {
                name: "worker-container".into(),
                resources: Some(k8s_openapi::api::core::v1::ResourceRequirements {
                    limits: Some(BTreeMap::from([(
                        "nvidia.com/gpu".to_string(),
                        k8s_openapi::apimachinery::pkg::api::resource::Quantity("0".into()),
                    )])),
                    ..Default::default()
                }),
                ..Default::default()
            }],
        });
        let config = OperatorConfig::default();
        let gates = testing::gates(&config, &isvc);
        let ctx = BuildContext::new(&isvc, &config, &gates);

        let runtime = testing::runtime();
        let err = plan_component(&ctx, ComponentType::Predictor, Some(&runtime)).unwrap_err();
        assert_eq!(err.reason(), "InvalidGPUAllocation");
        let (status, condition) =
            component_status(&ctx, ComponentType::Predictor, ComponentOutcome::Invalid(&err));
        assert_eq!(status.unwrap().state, ComponentState::Failed);
        let condition = condition.unwrap();
        assert!(!condition.is_true());
        assert_eq!(condition.reason.as_deref(), Some("InvalidGPUAllocation"));
    }

    #[test]
    fn multi_node_plan_has_head_and_workers() {
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

        let runtime = testing::runtime();
        let plan = plan_component(&ctx, ComponentType::Predictor, Some(&runtime)).unwrap();
        assert_eq!(plan.placement.as_ref().unwrap().worker_replicas, 4);
        assert!(plan.hpa.is_none());
        let head = plan.deployment.unwrap().spec.unwrap();
        assert_eq!(head.replicas, Some(1));
        let env = head.template.spec.unwrap().containers[0].env.clone().unwrap();
        assert!(
            env.iter()
                .any(|e| e.name == RAY_NODE_COUNT_ENV && e.value.as_deref() == Some("5"))
        );
        let worker = plan.worker_deployment.unwrap();
        assert_eq!(worker.metadata.name.as_deref(), Some("llama-predictor-worker"));
        assert_eq!(worker.spec.unwrap().replicas, Some(4));
        assert!(plan.worker_service.is_some());
    }

    #[test]
    fn ready_needs_available_deployment_and_accepted_route() {
        let isvc = testing::isvc("sklearn");
        let config = OperatorConfig::default();
        let gates = testing::gates(&config, &isvc);
        let ctx = BuildContext::new(&isvc, &config, &gates);
        let runtime = testing::runtime();
        let plan = plan_component(&ctx, ComponentType::Predictor, Some(&runtime)).unwrap();

        let mut report = ComponentReport {
            observed: ObservedComponent {
                deployment: plan.deployment.clone(),
                worker_deployment: None,
                route: plan.route.clone(),
            },
            ..Default::default()
        };
        let outcome = ComponentOutcome::Applied { plan: &plan, report: &report };
        let (status, condition) = component_status(&ctx, ComponentType::Predictor, outcome);
        assert_eq!(status.unwrap().state, ComponentState::Provisioning);
        assert_eq!(condition.unwrap().reason.as_deref(), Some("DeploymentUnavailable"));

        report.observed.deployment = plan.deployment.clone().map(available);
        let (_, condition) = component_status(
            &ctx,
            ComponentType::Predictor,
            ComponentOutcome::Applied { plan: &plan, report: &report },
        );
        assert_eq!(condition.unwrap().reason.as_deref(), Some("RouteNotAccepted"));

        report.observed.route = plan.route.clone().map(accepted);
        let (status, condition) = component_status(
            &ctx,
            ComponentType::Predictor,
            ComponentOutcome::Applied { plan: &plan, report: &report },
        );
        let status = status.unwrap();
        assert_eq!(status.state, ComponentState::Ready);
        assert_eq!(status.available_replicas, Some(1));
        assert!(condition.unwrap().is_true());
    }

    #[test]
    fn apply_error_marks_component() {
        let isvc = testing::isvc("sklearn");
        let config = OperatorConfig::default();
        let gates = testing::gates(&config, &isvc);
        let ctx = BuildContext::new(&isvc, &config, &gates);
        let runtime = testing::runtime();
        let plan = plan_component(&ctx, ComponentType::Predictor, Some(&runtime)).unwrap();
        let report = ComponentReport {
            error: Some(Error::from(InvalidSpec::InvalidMetric("bad".into()))),
            ..Default::default()
        };
        let (status, condition) = component_status(
            &ctx,
            ComponentType::Predictor,
            ComponentOutcome::Applied { plan: &plan, report: &report },
        );
        assert_eq!(status.unwrap().state, ComponentState::Failed);
        assert_eq!(condition.unwrap().reason.as_deref(), Some("InvalidAutoscalingMetric"));
    }
}
