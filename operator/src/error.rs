use kube::Error as KubeError;
use thiserror::Error;

/// How the outer control loop should treat a failed pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Conflict, throttling, connectivity: requeue with backoff.
    Transient,
    /// The declared intent cannot be realised; surfaced on status, no requeue.
    Terminal,
    /// A bug in the operator itself; the pass aborts without mutation.
    Fatal,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] KubeError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid configuration key '{key}': {message}")]
    Config { key: String, message: String },

    #[error(transparent)]
    InvalidSpec(#[from] InvalidSpec),

    #[error("metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Kube(KubeError::Api(ae)) => match ae.code {
                // Bad requests and unprocessable entities mean we built garbage.
                400 | 422 => ErrorClass::Fatal,
                _ => ErrorClass::Transient,
            },
            Error::Kube(_) => ErrorClass::Transient,
            Error::Config { .. } => ErrorClass::Transient,
            Error::InvalidSpec(_) => ErrorClass::Terminal,
            Error::Serialization(_) | Error::Metrics(_) | Error::Internal(_) => ErrorClass::Fatal,
        }
    }

    /// Short CamelCase reason for conditions and events.
    pub fn reason(&self) -> &'static str {
        match self {
            Error::Kube(_) => "ClusterAPIError",
            Error::Serialization(_) => "SerializationError",
            Error::Config { .. } => "InvalidConfiguration",
            Error::InvalidSpec(e) => e.reason(),
            Error::Metrics(_) | Error::Internal(_) => "InternalError",
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Kube(KubeError::Api(ae)) if ae.code == 409)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Kube(KubeError::Api(ae)) if ae.code == 404)
    }
}

/// Declared state that cannot be turned into a consistent topology.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidSpec {
    #[error(
        "multi-node placement infeasible: {required} GPUs required \
         (pipeline {pipeline} x tensor {tensor}), head provides {head_gpus} \
         and workers provide {worker_gpus} each"
    )]
    PlacementInfeasible {
        required: u32,
        pipeline: u32,
        tensor: u32,
        head_gpus: u32,
        worker_gpus: u32,
    },

    #[error(
        "multi-node placement too large: pipeline {pipeline} x tensor {tensor} \
         exceeds the supported GPU and replica range"
    )]
    PlacementTooLarge { pipeline: u32, tensor: u32 },

    #[error("{component} declares a model but no storageUri")]
    MissingStorageUri { component: String },

    #[error("no serving runtime supports model format '{format}'")]
    NoRuntimeForFormat { format: String },

    #[error("serving runtime '{name}' not found")]
    RuntimeNotFound { name: String },

    #[error("serving runtime '{name}' is disabled")]
    RuntimeDisabled { name: String },

    #[error("serving runtime '{name}' does not support model format '{format}'")]
    RuntimeFormatMismatch { name: String, format: String },

    #[error("serving runtime '{name}' has no container named '{container}'")]
    RuntimeContainerMissing { name: String, container: String },

    #[error("{component} declares neither a model nor a container")]
    NoContainer { component: String },

    #[error("unknown autoscaler class '{0}', expected one of hpa, keda, external, none")]
    InvalidAutoscalerClass(String),

    #[error("unsupported deployment mode '{0}'")]
    UnsupportedDeploymentMode(String),

    #[error("invalid autoscaling metric: {0}")]
    InvalidMetric(String),

    #[error("invalid value '{value}' for annotation {annotation}")]
    InvalidAnnotation { annotation: String, value: String },
}

impl InvalidSpec {
    pub fn reason(&self) -> &'static str {
        match self {
            InvalidSpec::PlacementInfeasible { .. } | InvalidSpec::PlacementTooLarge { .. } => {
                "InvalidGPUAllocation"
            }
            InvalidSpec::MissingStorageUri { .. } => "MissingStorageURI",
            InvalidSpec::NoRuntimeForFormat { .. } => "NoSupportingRuntime",
            InvalidSpec::RuntimeNotFound { .. } => "RuntimeNotRecognized",
            InvalidSpec::RuntimeDisabled { .. } => "RuntimeDisabled",
            InvalidSpec::RuntimeFormatMismatch { .. } => "NoSupportingRuntime",
            InvalidSpec::RuntimeContainerMissing { .. } => "InvalidRuntimeTemplate",
            InvalidSpec::NoContainer { .. } => "NoContainer",
            InvalidSpec::InvalidAutoscalerClass(_) => "InvalidAutoscalerClass",
            InvalidSpec::UnsupportedDeploymentMode(_) => "UnsupportedDeploymentMode",
            InvalidSpec::InvalidMetric(_) => "InvalidAutoscalingMetric",
            InvalidSpec::InvalidAnnotation { .. } => "InvalidAnnotation",
        }
    }
}
