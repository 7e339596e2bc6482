//! HorizontalPodAutoscaler and KEDA ScaledObject builders.

use std::collections::BTreeMap;

use k8s_openapi::{
    api::autoscaling::v2::{
        CrossVersionObjectReference, HorizontalPodAutoscaler, HorizontalPodAutoscalerSpec,
        MetricSpec, MetricTarget as HpaMetricTarget, ResourceMetricSource as HpaResourceSource,
    },
    apimachinery::pkg::api::resource::Quantity,
};

use super::BuildContext;
use crate::{
    annotations::AutoscalerClass,
    constants::component_name,
    crd::{
        ComponentExtensionSpec, ComponentType, MetricTarget, MetricTargetType, MetricsSpec,
        ResourceMetric, ResourceMetricSource, ScaleTargetRef, ScaledObject, ScaledObjectSpec,
        ScaledObjectTrigger,
    },
    error::{Error, InvalidSpec},
};

/// Realized replica bounds after the floor and clamp rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicaRange {
    pub min: i32,
    pub max: i32,
}

/// `min` never drops below `floor`; `max` never drops below `min`.
pub fn replica_range(extension: Option<&ComponentExtensionSpec>, floor: i32) -> ReplicaRange {
    let floor = floor.max(0);
    let min = extension
        .and_then(|e| e.min_replicas)
        .unwrap_or(floor)
        .max(floor);
    let max = extension
        .and_then(|e| e.max_replicas)
        .unwrap_or(min)
        .max(min);
    ReplicaRange { min, max }
}

/// Class governing a component's replicas. Multi-node predictors are never autoscaled.
pub fn effective_class(ctx: &BuildContext, component: ComponentType) -> AutoscalerClass {
    if component == ComponentType::Predictor && ctx.isvc.spec.is_multi_node() {
        AutoscalerClass::None
    } else {
        ctx.gates.autoscaler_class
    }
}

/// Metrics to scale on; cpu utilization when none are declared.
fn metrics_or_default(ctx: &BuildContext, component: ComponentType) -> Vec<MetricsSpec> {
    let declared = ctx
        .isvc
        .spec
        .extension(component)
        .map(ComponentExtensionSpec::effective_metrics)
        .unwrap_or_default();
    if !declared.is_empty() {
        return declared;
    }
    vec![MetricsSpec::Resource {
        resource: ResourceMetricSource {
            name: ResourceMetric::Cpu,
            target: MetricTarget {
                type_: MetricTargetType::Utilization,
                value: None,
                average_value: None,
                average_utilization: Some(default_cpu_utilization(ctx)),
            },
        },
    }]
}

fn default_cpu_utilization(ctx: &BuildContext) -> i32 {
    ctx.gates
        .target_utilization
        .unwrap_or(ctx.config.autoscaler.default_cpu_utilization)
}

fn missing_threshold(metric: &str) -> InvalidSpec {
    InvalidSpec::InvalidMetric(format!("{metric} metric declares no target value"))
}

pub fn build_hpa(
    ctx: &BuildContext,
    component: ComponentType,
    range: ReplicaRange,
) -> Result<HorizontalPodAutoscaler, Error> {
    let name = component_name(&ctx.name(), component);
    let metrics = metrics_or_default(ctx, component)
        .into_iter()
        .map(|metric| hpa_metric(ctx, metric))
        .collect::<Result<Vec<_>, InvalidSpec>>()?;

    Ok(HorizontalPodAutoscaler {
        metadata: ctx.object_meta(&name, component, &name)?,
        spec: Some(HorizontalPodAutoscalerSpec {
            scale_target_ref: CrossVersionObjectReference {
                api_version: Some("apps/v1".into()),
                kind: "Deployment".into(),
                name: name.clone(),
            },
            min_replicas: Some(range.min),
            max_replicas: range.max,
            metrics: Some(metrics),
            behavior: None,
        }),
        status: None,
    })
}

fn hpa_metric(ctx: &BuildContext, metric: MetricsSpec) -> Result<MetricSpec, InvalidSpec> {
    let MetricsSpec::Resource { resource } = metric else {
        return Err(InvalidSpec::InvalidMetric(
            "the hpa autoscaler class only supports Resource metrics".into(),
        ));
    };
    let target = &resource.target;
    let hpa_target = match target.type_ {
        MetricTargetType::Utilization => HpaMetricTarget {
            type_: "Utilization".into(),
            average_utilization: Some(match resource.name {
                ResourceMetric::Cpu => ctx
                    .gates
                    .target_utilization
                    .or(target.average_utilization)
                    .unwrap_or(ctx.config.autoscaler.default_cpu_utilization),
                ResourceMetric::Memory => target
                    .average_utilization
                    .ok_or_else(|| missing_threshold("memory"))?,
            }),
            ..Default::default()
        },
        MetricTargetType::AverageValue => HpaMetricTarget {
            type_: "AverageValue".into(),
            average_value: Some(Quantity(
                target
                    .average_value
                    .clone()
                    .ok_or_else(|| missing_threshold(resource.name.as_str()))?,
            )),
            ..Default::default()
        },
        MetricTargetType::Value => {
            return Err(InvalidSpec::InvalidMetric(format!(
                "resource metric {} does not support a Value target",
                resource.name.as_str()
            )));
        }
    };

    Ok(MetricSpec {
        type_: "Resource".into(),
        resource: Some(HpaResourceSource {
            name: resource.name.as_str().into(),
            target: hpa_target,
        }),
        ..Default::default()
    })
}

pub fn build_scaled_object(
    ctx: &BuildContext,
    component: ComponentType,
    range: ReplicaRange,
) -> Result<ScaledObject, Error> {
    let name = component_name(&ctx.name(), component);
    let triggers = metrics_or_default(ctx, component)
        .into_iter()
        .map(|metric| keda_trigger(ctx, metric))
        .collect::<Result<Vec<_>, InvalidSpec>>()?;

    Ok(ScaledObject {
        metadata: ctx.object_meta(&name, component, &name)?,
        spec: ScaledObjectSpec {
            scale_target_ref: ScaleTargetRef {
                api_version: Some("apps/v1".into()),
                kind: Some("Deployment".into()),
                name: name.clone(),
            },
            min_replica_count: Some(range.min),
            max_replica_count: Some(range.max),
            triggers,
        },
    })
}

fn keda_trigger(
    ctx: &BuildContext,
    metric: MetricsSpec,
) -> Result<ScaledObjectTrigger, InvalidSpec> {
    let mut metadata = BTreeMap::new();
    let trigger = match metric {
        MetricsSpec::Resource { resource } => {
            let value = match (resource.name, resource.target.type_) {
                (ResourceMetric::Cpu, MetricTargetType::Utilization) => ctx
                    .gates
                    .target_utilization
                    .or(resource.target.average_utilization)
                    .map(|u| u.to_string()),
                _ => resource.target.threshold(),
            }
            .ok_or_else(|| missing_threshold(resource.name.as_str()))?;
            metadata.insert("value".to_string(), value);
            ScaledObjectTrigger {
                type_: resource.name.as_str().into(),
                metric_type: Some(resource.target.type_.as_str().into()),
                metadata,
            }
        }
        MetricsSpec::External { external } => {
            let server = external.metric.server_address.clone().ok_or_else(|| {
                InvalidSpec::InvalidMetric("prometheus metric requires serverAddress".into())
            })?;
            metadata.insert("serverAddress".to_string(), server);
            metadata.insert("query".to_string(), external.metric.query.clone());
            metadata.insert(
                "threshold".to_string(),
                external
                    .target
                    .threshold()
                    .ok_or_else(|| missing_threshold("prometheus"))?,
            );
            if let Some(ns) = &external.metric.namespace {
                metadata.insert("namespace".to_string(), ns.clone());
            }
            ScaledObjectTrigger {
                type_: "prometheus".into(),
                metric_type: Some(external.target.type_.as_str().into()),
                metadata,
            }
        }
        MetricsSpec::PodMetric { pod_metric } => {
            metadata.insert(
                "scalerAddress".to_string(),
                ctx.config.otel_collector.metric_scaler_endpoint.clone(),
            );
            metadata.insert("metricQuery".to_string(), pod_metric.metric.query.clone());
            metadata.insert(
                "targetValue".to_string(),
                pod_metric
                    .target
                    .threshold()
                    .ok_or_else(|| missing_threshold("opentelemetry"))?,
            );
            ScaledObjectTrigger {
                type_: "external".into(),
                metric_type: Some(pod_metric.target.type_.as_str().into()),
                metadata,
            }
        }
    };
    Ok(trigger)
}

/// Whether KEDA scaling for this component reads pod metrics through a collector.
pub fn wants_otel_collector(ctx: &BuildContext, component: ComponentType) -> bool {
    ctx.isvc
        .spec
        .extension(component)
        .map(ComponentExtensionSpec::effective_metrics)
        .unwrap_or_default()
        .iter()
        .any(|m| matches!(m, MetricsSpec::PodMetric { .. }))
}
