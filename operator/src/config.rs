//! Global operator configuration.
//!
//! Read once per reconcile pass from the `inferenceservice-config` ConfigMap and
//! threaded by reference through every builder and reconciler, so a pass never
//! observes a half-updated configuration.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use kube::{Api, Client};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::{annotations::AutoscalerClass, error::Error, reconciler::ObjectKind};

pub const CONFIG_MAP_NAME: &str = "inferenceservice-config";
pub const DEFAULT_NAMESPACE: &str = "kserve";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperatorConfig {
    pub ingress: IngressConfig,
    pub deploy: DeployConfig,
    pub autoscaler: AutoscalerConfig,
    pub storage_initializer: StorageInitializerConfig,
    pub resource: ResourceDefaults,
    pub otel_collector: OtelCollectorConfig,
    pub auth_proxy: AuthProxyConfig,
    pub multi_node: MultiNodeConfig,
    pub reconciler: ReconcilerConfig,
}

/// Which routing kind the cluster uses. Global, never per service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingMode {
    GatewayApi,
    Ingress,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct IngressConfig {
    pub enable_gateway_api: bool,
    /// `namespace/name` of the parent Gateway.
    pub kserve_ingress_gateway: String,
    pub ingress_class_name: Option<String>,
    pub ingress_domain: String,
    pub additional_ingress_domains: Vec<String>,
    pub domain_template: String,
    /// Non-empty switches routing from host-based to path-based.
    pub path_template: String,
    pub url_scheme: String,
    pub disable_ingress_creation: bool,
    pub default_timeout_seconds: i64,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            enable_gateway_api: true,
            kserve_ingress_gateway: "kserve/kserve-ingress-gateway".into(),
            ingress_class_name: None,
            ingress_domain: "example.com".into(),
            additional_ingress_domains: Vec::new(),
            domain_template: "{{ .Name }}-{{ .Namespace }}.{{ .IngressDomain }}".into(),
            path_template: String::new(),
            url_scheme: "http".into(),
            disable_ingress_creation: false,
            default_timeout_seconds: 30,
        }
    }
}

impl IngressConfig {
    pub fn routing_mode(&self) -> RoutingMode {
        if self.enable_gateway_api {
            RoutingMode::GatewayApi
        } else {
            RoutingMode::Ingress
        }
    }

    pub fn is_path_based(&self) -> bool {
        !self.path_template.trim().is_empty()
    }

    /// Splits `namespace/name`; a bare name lives in the operator namespace.
    pub fn gateway_ref(&self) -> (Option<&str>, &str) {
        match self.kserve_ingress_gateway.split_once('/') {
            Some((ns, name)) => (Some(ns), name),
            None => (None, self.kserve_ingress_gateway.as_str()),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DeployConfig {
    pub default_deployment_mode: String,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            default_deployment_mode: "RawDeployment".into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AutoscalerConfig {
    pub default_class: AutoscalerClass,
    pub min_replicas_floor: i32,
    pub default_cpu_utilization: i32,
}

impl Default for AutoscalerConfig {
    fn default() -> Self {
        Self {
            default_class: AutoscalerClass::Hpa,
            min_replicas_floor: 1,
            default_cpu_utilization: 80,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageInitializerConfig {
    pub image: String,
    pub cpu_request: String,
    pub cpu_limit: String,
    pub memory_request: String,
    pub memory_limit: String,
}

impl Default for StorageInitializerConfig {
    fn default() -> Self {
        Self {
            image: "kserve/storage-initializer:latest".into(),
            cpu_request: "100m".into(),
            cpu_limit: "1".into(),
            memory_request: "100Mi".into(),
            memory_limit: "1Gi".into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceDefaults {
    pub cpu_request: String,
    pub cpu_limit: String,
    pub memory_request: String,
    pub memory_limit: String,
}

impl Default for ResourceDefaults {
    fn default() -> Self {
        Self {
            cpu_request: "1".into(),
            cpu_limit: "1".into(),
            memory_request: "2Gi".into(),
            memory_limit: "2Gi".into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct OtelCollectorConfig {
    pub scrape_interval: String,
    /// OTLP endpoint the collector exports to.
    pub metric_receiver_endpoint: String,
    /// gRPC address of the KEDA external scaler fed by the collector.
    pub metric_scaler_endpoint: String,
}

impl Default for OtelCollectorConfig {
    fn default() -> Self {
        Self {
            scrape_interval: "5s".into(),
            metric_receiver_endpoint: "keda-otel-scaler.keda.svc:4317".into(),
            metric_scaler_endpoint: "keda-otel-scaler.keda.svc:4318".into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthProxyConfig {
    pub image: String,
    pub cpu_request: String,
    pub memory_request: String,
}

impl Default for AuthProxyConfig {
    fn default() -> Self {
        Self {
            image: "quay.io/brancz/kube-rbac-proxy:v0.18.0".into(),
            cpu_request: "100m".into(),
            memory_request: "64Mi".into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct MultiNodeConfig {
    /// Probed in order on head and worker containers to find the GPU request.
    pub gpu_resource_names: Vec<String>,
    /// Resource name used to inject the default single-GPU request.
    pub default_gpu_resource_name: String,
}

impl Default for MultiNodeConfig {
    fn default() -> Self {
        Self {
            gpu_resource_names: vec![
                "nvidia.com/gpu".into(),
                "amd.com/gpu".into(),
                "intel.com/gpu".into(),
                "habana.ai/gaudi".into(),
            ],
            default_gpu_resource_name: "nvidia.com/gpu".into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconcilerConfig {
    /// Extra JSON pointers ignored by the semantic diff, keyed by kind name.
    pub ignored_fields: BTreeMap<String, Vec<String>>,
}

impl ReconcilerConfig {
    pub fn ignored_for(&self, kind: ObjectKind) -> &[String] {
        self.ignored_fields
            .get(kind.as_str())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

impl OperatorConfig {
    pub fn from_data(data: &BTreeMap<String, String>) -> Result<Self, Error> {
        Ok(Self {
            ingress: parse_key(data, "ingress")?,
            deploy: parse_key(data, "deploy")?,
            autoscaler: parse_key(data, "autoscaler")?,
            storage_initializer: parse_key(data, "storageInitializer")?,
            resource: parse_key(data, "resource")?,
            otel_collector: parse_key(data, "opentelemetryCollector")?,
            auth_proxy: parse_key(data, "authProxy")?,
            multi_node: parse_key(data, "multiNode")?,
            reconciler: parse_key(data, "reconciler")?,
        })
    }

    /// Snapshot the configuration; a missing ConfigMap means defaults.
    pub async fn load(client: &Client, namespace: &str) -> Result<Self, Error> {
        let api: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);
        match api.get_opt(CONFIG_MAP_NAME).await? {
            Some(cm) => Self::from_data(&cm.data.unwrap_or_default()),
            None => {
                warn!(
                    namespace,
                    configmap = CONFIG_MAP_NAME,
                    "configuration not found, using defaults"
                );
                Ok(Self::default())
            }
        }
    }
}

fn parse_key<T: DeserializeOwned + Default>(
    data: &BTreeMap<String, String>,
    key: &str,
) -> Result<T, Error> {
    match data.get(key) {
        Some(raw) if !raw.trim().is_empty() => {
            serde_json::from_str(raw).map_err(|e| Error::Config {
                key: key.to_string(),
                message: e.to_string(),
            })
        }
        _ => {
            debug!(key, "configuration key absent, using defaults");
            Ok(T::default())
        }
    }
}
