//! Resource Builders: pure functions from the declared spec (plus runtime
//! template and configuration) to desired cluster objects.

pub mod autoscaler;
pub mod otel;
pub mod pod;
pub mod route;
pub mod workload;

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt, api::ObjectMeta};

use crate::{
    annotations::ServiceGates,
    config::OperatorConfig,
    constants::{APP_LABEL, COMPONENT_LABEL, ISVC_LABEL, app_label_value},
    crd::{ComponentType, InferenceService},
    error::Error,
};

/// Everything a builder may read. Borrowed for the duration of one pass.
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'a> {
    pub isvc: &'a InferenceService,
    pub config: &'a OperatorConfig,
    pub gates: &'a ServiceGates,
}

impl<'a> BuildContext<'a> {
    pub fn new(
        isvc: &'a InferenceService,
        config: &'a OperatorConfig,
        gates: &'a ServiceGates,
    ) -> Self {
        Self {
            isvc,
            config,
            gates,
        }
    }

    pub fn name(&self) -> String {
        self.isvc.name_any()
    }

    pub fn namespace(&self) -> String {
        self.isvc.namespace().unwrap_or_else(|| "default".into())
    }

    /// Owner reference for garbage collection; needs a persisted object.
    pub fn owner_ref(&self) -> Result<OwnerReference, Error> {
        self.isvc.controller_owner_ref(&()).ok_or_else(|| {
            Error::Internal(format!(
                "InferenceService {} has no uid, cannot own derived objects",
                self.name()
            ))
        })
    }

    /// Metadata shared by every derived object of one component.
    pub fn object_meta(
        &self,
        name: &str,
        component: ComponentType,
        selector_name: &str,
    ) -> Result<ObjectMeta, Error> {
        Ok(ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(self.namespace()),
            labels: Some(component_labels(&self.name(), component, selector_name)),
            owner_references: Some(vec![self.owner_ref()?]),
            ..Default::default()
        })
    }
}

/// Labels identifying pods and objects of one component.
pub fn component_labels(
    isvc_name: &str,
    component: ComponentType,
    selector_name: &str,
) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(ISVC_LABEL.to_string(), isvc_name.to_string());
    labels.insert(COMPONENT_LABEL.to_string(), component.to_string());
    labels.insert(APP_LABEL.to_string(), app_label_value(selector_name));
    labels
}

/// Pod selector; a subset of [`component_labels`].
pub fn selector_labels(selector_name: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(APP_LABEL.to_string(), app_label_value(selector_name));
    labels
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::BTreeMap;

    use k8s_openapi::api::core::v1::Container;
    use kube::api::ObjectMeta;

    use crate::{
        annotations::ServiceGates,
        config::OperatorConfig,
        crd::{
            InferenceService, InferenceServiceSpec, ModelFormat, ModelSpec, PredictorSpec,
            ServingRuntimeSpec, SupportedModelFormat,
        },
        runtime::ResolvedRuntime,
    };

    pub fn isvc(name: &str) -> InferenceService {
        InferenceService {
            metadata: ObjectMeta {
                name: Some(name.into()),
                namespace: Some("models".into()),
                uid: Some(format!("{name}-uid")),
                generation: Some(1),
                ..Default::default()
            },
            spec: InferenceServiceSpec {
                predictor: PredictorSpec {
                    model: Some(ModelSpec {
                        model_format: ModelFormat {
                            name: "sklearn".into(),
                            version: None,
                        },
                        runtime: None,
                        storage_uri: Some("gs://models/sklearn/iris".into()),
                        container: Default::default(),
                    }),
                    ..Default::default()
                },
                ..Default::default()
            },
            status: None,
        }
    }

    pub fn runtime() -> ResolvedRuntime {
        ResolvedRuntime {
            name: "kserve-sklearnserver".into(),
            spec: ServingRuntimeSpec {
                supported_model_formats: vec![SupportedModelFormat {
                    name: "sklearn".into(),
                    version: None,
                    auto_select: Some(true),
                    priority: Some(1),
                }],
                containers: vec![Container {
                    name: "kserve-container".into(),
                    image: Some("kserve/sklearnserver:latest".into()),
                    args: Some(vec![
                        "--model_name={{.Name}}".into(),
                        "--model_dir=/mnt/models".into(),
                    ]),
                    ..Default::default()
                }],
                ..Default::default()
            },
        }
    }

    pub fn gates(config: &OperatorConfig, isvc: &InferenceService) -> ServiceGates {
        ServiceGates::from_isvc(isvc, config).unwrap()
    }

    pub fn annotate(isvc: &mut InferenceService, key: &str, value: &str) {
        isvc.metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
    }
}
