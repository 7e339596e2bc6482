use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::inference_service::ComponentType;

#[derive(Serialize, Deserialize, Debug, Clone, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InferenceServiceStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Addressable>,

    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(default)]
    pub components: BTreeMap<ComponentType, ComponentStatusSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_mode: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Addressable {
    pub url: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatusSpec {
    pub state: ComponentState,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_replicas: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_replicas: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_replicas: Option<i32>,
}

/// Lifecycle of one component as seen by the orchestrator.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, JsonSchema, Default, PartialEq, Eq)]
pub enum ComponentState {
    NotDeclared,
    Stopped,
    #[default]
    Provisioning,
    Ready,
    Failed,
}

#[derive(Serialize, Deserialize, Debug, Clone, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub r#type: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

/// Condition types written to the InferenceService, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConditionType {
    PredictorReady,
    TransformerReady,
    ExplainerReady,
    IngressReady,
    Stopped,
    Ready,
}

impl ConditionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionType::PredictorReady => "PredictorReady",
            ConditionType::TransformerReady => "TransformerReady",
            ConditionType::ExplainerReady => "ExplainerReady",
            ConditionType::IngressReady => "IngressReady",
            ConditionType::Stopped => "Stopped",
            ConditionType::Ready => "Ready",
        }
    }

    pub fn for_component(component: ComponentType) -> Self {
        match component {
            ComponentType::Predictor => ConditionType::PredictorReady,
            ComponentType::Transformer => ConditionType::TransformerReady,
            ComponentType::Explainer => ConditionType::ExplainerReady,
        }
    }

    /// Stopped is informational; everything else blocks readiness when false.
    pub fn severity(&self) -> Option<&'static str> {
        match self {
            ConditionType::Stopped => Some("Info"),
            _ => None,
        }
    }
}

impl Condition {
    pub fn new(type_: ConditionType, status: bool) -> Self {
        Self {
            r#type: type_.as_str().into(),
            status: if status { "True".into() } else { "False".into() },
            severity: type_.severity().map(str::to_string),
            reason: None,
            message: None,
            last_transition_time: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>, message: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self.message = Some(message.into());
        self
    }

    pub fn is_true(&self) -> bool {
        self.status == "True"
    }

    /// Equal apart from the transition timestamp.
    pub fn same_state(&self, other: &Condition) -> bool {
        self.r#type == other.r#type
            && self.status == other.status
            && self.severity == other.severity
            && self.reason == other.reason
            && self.message == other.message
    }
}

impl InferenceServiceStatus {
    pub fn condition(&self, type_: ConditionType) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.r#type == type_.as_str())
    }

    pub fn is_condition_true(&self, type_: ConditionType) -> bool {
        self.condition(type_).is_some_and(Condition::is_true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_serializes_type_field() {
        let cond = Condition::new(ConditionType::Ready, true);
        let value = serde_json::to_value(&cond).unwrap();
        assert_eq!(value["type"], "Ready");
        assert_eq!(value["status"], "True");
        assert!(value.get("severity").is_none());
    }

    #[test]
    fn stopped_condition_is_informational() {
        let cond = Condition::new(ConditionType::Stopped, true);
        assert_eq!(cond.severity.as_deref(), Some("Info"));
    }

    #[test]
    fn same_state_ignores_transition_time() {
        let mut a = Condition::new(ConditionType::PredictorReady, false).with_reason("X", "y");
        let mut b = a.clone();
        a.last_transition_time = Some("2024-01-01T00:00:00Z".into());
        b.last_transition_time = Some("2025-01-01T00:00:00Z".into());
        assert!(a.same_state(&b));
    }

    #[test]
    fn components_map_uses_lowercase_keys() {
        let mut status = InferenceServiceStatus::default();
        status
            .components
            .insert(ComponentType::Predictor, ComponentStatusSpec::default());
        let value = serde_json::to_value(&status).unwrap();
        assert!(value["components"].get("predictor").is_some());
    }
}
