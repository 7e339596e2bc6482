//! Well-known annotation and label keys, naming conventions and fixed ports.

use crate::crd::ComponentType;

pub const API_GROUP: &str = "serving.kserve.io";

pub const DEPLOYMENT_MODE_ANNOTATION: &str = "serving.kserve.io/deploymentMode";
pub const AUTOSCALER_CLASS_ANNOTATION: &str = "serving.kserve.io/autoscalerClass";
pub const STOP_ANNOTATION: &str = "serving.kserve.io/stop";
pub const TARGET_UTILIZATION_ANNOTATION: &str = "serving.kserve.io/targetUtilizationPercentage";
pub const ENABLE_AUTH_ANNOTATION: &str = "serving.kserve.io/enable-auth";
pub const OTEL_INJECT_ANNOTATION: &str = "sidecar.opentelemetry.io/inject";

pub const VISIBILITY_LABEL: &str = "networking.kserve.io/visibility";
pub const CLUSTER_LOCAL_VISIBILITY: &str = "cluster-local";

pub const ISVC_LABEL: &str = "serving.kserve.io/inferenceservice";
pub const COMPONENT_LABEL: &str = "component";
pub const APP_LABEL: &str = "app";
pub const NODE_ROLE_LABEL: &str = "serving.kserve.io/node-role";

pub const MAIN_CONTAINER_NAME: &str = "kserve-container";
pub const WORKER_CONTAINER_NAME: &str = "worker-container";
pub const STORAGE_INITIALIZER_NAME: &str = "storage-initializer";
pub const AUTH_PROXY_CONTAINER_NAME: &str = "kube-rbac-proxy";

pub const MODEL_MOUNT_PATH: &str = "/mnt/models";
pub const MODEL_VOLUME_NAME: &str = "kserve-provision-location";
pub const PVC_VOLUME_NAME: &str = "kserve-pvc-source";
pub const STORAGE_URI_ENV: &str = "STORAGE_URI";
pub const PVC_SCHEME: &str = "pvc://";

pub const CONTAINER_PORT: i32 = 8080;
pub const CONTAINER_PORT_NAME: &str = "http1";
pub const SERVICE_PORT: i32 = 80;
pub const SERVICE_PORT_NAME: &str = "http";
pub const AUTH_PROXY_PORT: i32 = 8443;
pub const AUTH_PROXY_PORT_NAME: &str = "https";

pub const PIPELINE_PARALLEL_SIZE_ENV: &str = "PIPELINE_PARALLEL_SIZE";
pub const TENSOR_PARALLEL_SIZE_ENV: &str = "TENSOR_PARALLEL_SIZE";
pub const RAY_NODE_COUNT_ENV: &str = "RAY_NODE_COUNT";
pub const REQUEST_GPU_COUNT_ENV: &str = "REQUEST_GPU_COUNT";
pub const HEAD_SVC_ENV: &str = "HEAD_SVC";

pub const ISVC_NAME_HEADER: &str = "KServe-Isvc-Name";
pub const ISVC_NAMESPACE_HEADER: &str = "KServe-Isvc-Namespace";

/// Placeholder runtimes may use in args/command for the InferenceService name.
pub const NAME_PLACEHOLDER: &str = "{{.Name}}";

pub const FIELD_MANAGER: &str = "inferenceservice-controller";

/// `<isvc>-predictor`, `<isvc>-transformer`, `<isvc>-explainer`
pub fn component_name(isvc: &str, component: ComponentType) -> String {
    format!("{}-{}", isvc, component)
}

/// Name shared by the worker Deployment and the headless worker Service.
pub fn worker_name(isvc: &str) -> String {
    format!("{}-worker", component_name(isvc, ComponentType::Predictor))
}

pub fn app_label_value(component_name: &str) -> String {
    format!("isvc.{}", component_name)
}

/// In-cluster DNS name of a component's Service.
pub fn service_host(component_name: &str, namespace: &str) -> String {
    format!("{}.{}.svc.cluster.local", component_name, namespace)
}
