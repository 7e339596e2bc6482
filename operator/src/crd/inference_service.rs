use std::{collections::BTreeMap, fmt::Display};

use k8s_openapi::api::{
    apps::v1::DeploymentStrategy,
    core::v1::{Container, EnvVar, Probe, ResourceRequirements, Toleration, Volume},
};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::status::InferenceServiceStatus;

#[derive(CustomResource, Serialize, Deserialize, Debug, Clone, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
#[kube(
    group = "serving.kserve.io",
    version = "v1beta1",
    kind = "InferenceService",
    plural = "inferenceservices",
    derive = "Default",
    derive = "PartialEq",
    status = "InferenceServiceStatus",
    shortname = "isvc",
    namespaced,
    printcolumn = r#"{"name":"URL","type":"string","jsonPath":".status.url"}"#,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type=='Ready')].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
pub struct InferenceServiceSpec {
    pub predictor: PredictorSpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformer: Option<ContainerComponentSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explainer: Option<ContainerComponentSpec>,
}

/// Logical serving role within one InferenceService.
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum ComponentType {
    Predictor,
    Transformer,
    Explainer,
}

impl ComponentType {
    /// Reconcile order: transformer and explainer forward to the predictor.
    pub const ALL: [ComponentType; 3] = [
        ComponentType::Predictor,
        ComponentType::Transformer,
        ComponentType::Explainer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentType::Predictor => "predictor",
            ComponentType::Transformer => "transformer",
            ComponentType::Explainer => "explainer",
        }
    }
}

impl Display for ComponentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PredictorSpec {
    /// Model served by a runtime template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelSpec>,

    /// Custom predictor containers, used instead of a runtime template.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub containers: Vec<Container>,

    /// Declaring a worker topology turns the predictor into a multi-node deployment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_spec: Option<WorkerSpec>,

    #[serde(flatten)]
    pub pod: PodOverrides,

    #[serde(flatten)]
    pub extension: ComponentExtensionSpec,
}

/// Transformer and explainer are plain container components.
#[derive(Serialize, Deserialize, Debug, Clone, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerComponentSpec {
    pub containers: Vec<Container>,

    #[serde(flatten)]
    pub pod: PodOverrides,

    #[serde(flatten)]
    pub extension: ComponentExtensionSpec,
}

#[derive(Serialize, Deserialize, Debug, Clone, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelSpec {
    pub model_format: ModelFormat,

    /// Explicit runtime name; auto-selected by model format when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_uri: Option<String>,

    #[serde(flatten)]
    pub container: ContainerOverrides,
}

#[derive(Serialize, Deserialize, Debug, Clone, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelFormat {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Container fields a model spec may override on the runtime's container.
#[derive(Serialize, Deserialize, Debug, Clone, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness_probe: Option<Probe>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liveness_probe: Option<Probe>,
}

#[derive(Serialize, Deserialize, Debug, Clone, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkerSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_parallel_size: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tensor_parallel_size: Option<u32>,

    /// Overrides for the runtime's worker container.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub containers: Vec<Container>,
}

/// Pod-level knobs shared by all components.
#[derive(Serialize, Deserialize, Debug, Clone, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
}

#[derive(Serialize, Deserialize, Debug, Clone, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentExtensionSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_replicas: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_replicas: Option<i32>,

    /// Legacy single-metric autoscaling knobs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_metric: Option<ResourceMetric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_metric_type: Option<MetricTargetType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_target: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoscaling: Option<AutoScalingSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_strategy: Option<DeploymentStrategy>,

    /// Request timeout in seconds applied to routes for this component.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i64>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AutoScalingSpec {
    #[serde(default)]
    pub metrics: Vec<MetricsSpec>,
}

/// One scaling signal. The `type` field selects the variant.
#[derive(Serialize, Deserialize, Debug, Clone, JsonSchema, PartialEq)]
#[serde(tag = "type")]
pub enum MetricsSpec {
    Resource { resource: ResourceMetricSource },
    External { external: ExternalMetricSource },
    PodMetric {
        #[serde(rename = "podmetric")]
        pod_metric: PodMetricSource,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResourceMetric {
    Cpu,
    Memory,
}

impl ResourceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceMetric::Cpu => "cpu",
            ResourceMetric::Memory => "memory",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, JsonSchema, PartialEq, Eq)]
pub enum MetricTargetType {
    Utilization,
    AverageValue,
    Value,
}

impl MetricTargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricTargetType::Utilization => "Utilization",
            MetricTargetType::AverageValue => "AverageValue",
            MetricTargetType::Value => "Value",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetricSource {
    pub name: ResourceMetric,
    pub target: MetricTarget,
}

#[derive(Serialize, Deserialize, Debug, Clone, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricTarget {
    #[serde(rename = "type")]
    pub type_: MetricTargetType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_utilization: Option<i32>,
}

impl MetricTarget {
    /// The target rendered as a single threshold string, whichever field is set.
    pub fn threshold(&self) -> Option<String> {
        match self.type_ {
            MetricTargetType::Utilization => self.average_utilization.map(|u| u.to_string()),
            MetricTargetType::AverageValue => self.average_value.clone(),
            MetricTargetType::Value => self.value.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExternalMetricSource {
    pub metric: ExternalMetric,
    pub target: MetricTarget,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MetricsBackend {
    Prometheus,
}

#[derive(Serialize, Deserialize, Debug, Clone, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExternalMetric {
    pub backend: MetricsBackend,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_address: Option<String>,
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodMetricSource {
    pub metric: PodMetric,
    pub target: MetricTarget,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PodMetricsBackend {
    Opentelemetry,
}

#[derive(Serialize, Deserialize, Debug, Clone, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodMetric {
    pub backend: PodMetricsBackend,
    #[serde(default)]
    pub metric_names: Vec<String>,
    pub query: String,
}

impl InferenceServiceSpec {
    pub fn is_declared(&self, component: ComponentType) -> bool {
        match component {
            ComponentType::Predictor => true,
            ComponentType::Transformer => self.transformer.is_some(),
            ComponentType::Explainer => self.explainer.is_some(),
        }
    }

    pub fn declared_components(&self) -> impl Iterator<Item = ComponentType> + '_ {
        ComponentType::ALL
            .into_iter()
            .filter(|c| self.is_declared(*c))
    }

    pub fn extension(&self, component: ComponentType) -> Option<&ComponentExtensionSpec> {
        match component {
            ComponentType::Predictor => Some(&self.predictor.extension),
            ComponentType::Transformer => self.transformer.as_ref().map(|t| &t.extension),
            ComponentType::Explainer => self.explainer.as_ref().map(|e| &e.extension),
        }
    }

    pub fn pod_overrides(&self, component: ComponentType) -> Option<&PodOverrides> {
        match component {
            ComponentType::Predictor => Some(&self.predictor.pod),
            ComponentType::Transformer => self.transformer.as_ref().map(|t| &t.pod),
            ComponentType::Explainer => self.explainer.as_ref().map(|e| &e.pod),
        }
    }

    pub fn is_multi_node(&self) -> bool {
        self.predictor.worker_spec.is_some()
    }
}

impl ComponentExtensionSpec {
    /// Declared metrics, with the legacy flat fields folded into one resource metric.
    pub fn effective_metrics(&self) -> Vec<MetricsSpec> {
        if let Some(autoscaling) = &self.autoscaling {
            if !autoscaling.metrics.is_empty() {
                return autoscaling.metrics.clone();
            }
        }

        let Some(metric) = self.scale_metric else {
            return Vec::new();
        };
        let type_ = self
            .scale_metric_type
            .unwrap_or(MetricTargetType::Utilization);
        let target = match type_ {
            MetricTargetType::Utilization => MetricTarget {
                type_,
                value: None,
                average_value: None,
                average_utilization: self.scale_target,
            },
            MetricTargetType::AverageValue => MetricTarget {
                type_,
                value: None,
                average_value: self.scale_target.map(|t| t.to_string()),
                average_utilization: None,
            },
            MetricTargetType::Value => MetricTarget {
                type_,
                value: self.scale_target.map(|t| t.to_string()),
                average_value: None,
                average_utilization: None,
            },
        };
        vec![MetricsSpec::Resource {
            resource: ResourceMetricSource {
                name: metric,
                target,
            },
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn metrics_spec_deserializes_by_type_tag() {
        let spec: AutoScalingSpec = serde_json::from_value(json!({
            "metrics": [
                {
                    "type": "Resource",
                    "resource": {
                        "name": "memory",
                        "target": {"type": "AverageValue", "averageValue": "10Gi"}
                    }
                },
                {
                    "type": "External",
                    "external": {
                        "metric": {"backend": "prometheus", "query": "sum(rate(x[1m]))"},
                        "target": {"type": "Value", "value": "5"}
                    }
                },
                {
                    "type": "PodMetric",
                    "podmetric": {
                        "metric": {
                            "backend": "opentelemetry",
                            "metricNames": ["queue"],
                            "query": "queue"
                        },
                        "target": {"type": "Value", "value": "2"}
                    }
                }
            ]
        }))
        .unwrap();

        assert_eq!(spec.metrics.len(), 3);
        match &spec.metrics[0] {
            MetricsSpec::Resource { resource } => {
                assert_eq!(resource.name, ResourceMetric::Memory);
                assert_eq!(resource.target.threshold().as_deref(), Some("10Gi"));
            }
            other => panic!("unexpected metric {other:?}"),
        }
        assert!(matches!(spec.metrics[1], MetricsSpec::External { .. }));
        assert!(matches!(spec.metrics[2], MetricsSpec::PodMetric { .. }));
    }

    #[test]
    fn legacy_fields_fold_into_resource_metric() {
        let ext = ComponentExtensionSpec {
            scale_metric: Some(ResourceMetric::Cpu),
            scale_target: Some(60),
            ..Default::default()
        };
        let metrics = ext.effective_metrics();
        assert_eq!(metrics.len(), 1);
        let MetricsSpec::Resource { resource } = &metrics[0] else {
            panic!("expected resource metric");
        };
        assert_eq!(resource.target.type_, MetricTargetType::Utilization);
        assert_eq!(resource.target.average_utilization, Some(60));
    }

    #[test]
    fn declared_components_follow_fixed_order() {
        let spec = InferenceServiceSpec {
            explainer: Some(ContainerComponentSpec::default()),
            transformer: Some(ContainerComponentSpec::default()),
            ..Default::default()
        };
        let order: Vec<_> = spec.declared_components().collect();
        assert_eq!(
            order,
            vec![
                ComponentType::Predictor,
                ComponentType::Transformer,
                ComponentType::Explainer
            ]
        );
    }

    #[test]
    fn predictor_deserializes_from_camel_case() {
        let spec: InferenceServiceSpec = serde_json::from_value(json!({
            "predictor": {
                "minReplicas": 1,
                "maxReplicas": 3,
                "timeout": 30,
                "model": {
                    "modelFormat": {"name": "sklearn"},
                    "storageUri": "gs://bucket/model",
                    "args": ["--workers=2"]
                },
                "workerSpec": {"pipelineParallelSize": 2}
            }
        }))
        .unwrap();

        assert_eq!(spec.predictor.extension.min_replicas, Some(1));
        assert_eq!(spec.predictor.extension.max_replicas, Some(3));
        let model = spec.predictor.model.as_ref().unwrap();
        assert_eq!(model.model_format.name, "sklearn");
        assert_eq!(model.container.args.as_ref().unwrap()[0], "--workers=2");
        assert!(spec.is_multi_node());
    }
}
