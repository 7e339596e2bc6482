//! Per-service switches parsed from InferenceService annotations and labels.

use std::{collections::BTreeMap, fmt::Display, str::FromStr};

use kube::ResourceExt;
use serde::{Deserialize, Serialize};

use crate::{
    config::OperatorConfig,
    constants::{
        AUTOSCALER_CLASS_ANNOTATION, CLUSTER_LOCAL_VISIBILITY, DEPLOYMENT_MODE_ANNOTATION,
        ENABLE_AUTH_ANNOTATION, STOP_ANNOTATION, TARGET_UTILIZATION_ANNOTATION, VISIBILITY_LABEL,
    },
    crd::InferenceService,
    error::InvalidSpec,
};

/// Which mechanism, if any, owns a component's replica count.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AutoscalerClass {
    Hpa,
    Keda,
    /// Scaled by something outside the operator; no autoscaler object.
    External,
    None,
}

impl AutoscalerClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutoscalerClass::Hpa => "hpa",
            AutoscalerClass::Keda => "keda",
            AutoscalerClass::External => "external",
            AutoscalerClass::None => "none",
        }
    }

    /// Whether some scaler other than the operator writes `spec.replicas`.
    pub fn manages_replicas(&self) -> bool {
        match self {
            AutoscalerClass::Hpa | AutoscalerClass::Keda | AutoscalerClass::External => true,
            AutoscalerClass::None => false,
        }
    }
}

impl FromStr for AutoscalerClass {
    type Err = InvalidSpec;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hpa" => Ok(AutoscalerClass::Hpa),
            "keda" => Ok(AutoscalerClass::Keda),
            "external" => Ok(AutoscalerClass::External),
            "none" => Ok(AutoscalerClass::None),
            _ => Err(InvalidSpec::InvalidAutoscalerClass(s.to_string())),
        }
    }
}

impl Display for AutoscalerClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentMode {
    RawDeployment,
}

impl DeploymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentMode::RawDeployment => "RawDeployment",
        }
    }
}

impl FromStr for DeploymentMode {
    type Err = InvalidSpec;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "RawDeployment" | "Standard" => Ok(DeploymentMode::RawDeployment),
            other => Err(InvalidSpec::UnsupportedDeploymentMode(other.to_string())),
        }
    }
}

/// Switches that hold for the whole InferenceService during one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceGates {
    pub deployment_mode: DeploymentMode,
    pub autoscaler_class: AutoscalerClass,
    pub stopped: bool,
    pub target_utilization: Option<i32>,
    pub auth_enabled: bool,
    pub cluster_local: bool,
}

impl ServiceGates {
    pub fn from_isvc(
        isvc: &InferenceService,
        config: &OperatorConfig,
    ) -> Result<Self, InvalidSpec> {
        Self::parse(isvc.annotations(), isvc.labels(), config)
    }

    pub fn parse(
        annotations: &BTreeMap<String, String>,
        labels: &BTreeMap<String, String>,
        config: &OperatorConfig,
    ) -> Result<Self, InvalidSpec> {
        let deployment_mode = annotations
            .get(DEPLOYMENT_MODE_ANNOTATION)
            .map(String::as_str)
            .unwrap_or(config.deploy.default_deployment_mode.as_str())
            .parse()?;

        let autoscaler_class = match annotations.get(AUTOSCALER_CLASS_ANNOTATION) {
            Some(raw) => raw.parse()?,
            None => config.autoscaler.default_class,
        };

        let target_utilization = annotations
            .get(TARGET_UTILIZATION_ANNOTATION)
            .map(|raw| {
                raw.trim()
                    .parse::<i32>()
                    .ok()
                    .filter(|v| (1..=100).contains(v))
                    .ok_or_else(|| InvalidSpec::InvalidAnnotation {
                        annotation: TARGET_UTILIZATION_ANNOTATION.to_string(),
                        value: raw.clone(),
                    })
            })
            .transpose()?;

        Ok(Self {
            deployment_mode,
            autoscaler_class,
            stopped: is_true(annotations.get(STOP_ANNOTATION)),
            target_utilization,
            auth_enabled: is_true(annotations.get(ENABLE_AUTH_ANNOTATION)),
            cluster_local: labels
                .get(VISIBILITY_LABEL)
                .is_some_and(|v| v == CLUSTER_LOCAL_VISIBILITY),
        })
    }
}

fn is_true(value: Option<&String>) -> bool {
    value.is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotations(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_come_from_configuration() {
        let gates =
            ServiceGates::parse(&BTreeMap::new(), &BTreeMap::new(), &OperatorConfig::default())
                .unwrap();
        assert_eq!(gates.deployment_mode, DeploymentMode::RawDeployment);
        assert_eq!(gates.autoscaler_class, AutoscalerClass::Hpa);
        assert!(!gates.stopped);
        assert!(!gates.cluster_local);
    }

    #[test]
    fn every_autoscaler_class_parses() {
        for (raw, class) in [
            ("hpa", AutoscalerClass::Hpa),
            ("KEDA", AutoscalerClass::Keda),
            ("external", AutoscalerClass::External),
            ("none", AutoscalerClass::None),
        ] {
            assert_eq!(raw.parse::<AutoscalerClass>().unwrap(), class);
        }
    }

    #[test]
    fn unknown_autoscaler_class_is_rejected() {
        let err = ServiceGates::parse(
            &annotations(&[(AUTOSCALER_CLASS_ANNOTATION, "kpa")]),
            &BTreeMap::new(),
            &OperatorConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err, InvalidSpec::InvalidAutoscalerClass("kpa".into()));
    }

    #[test]
    fn serverless_mode_is_unsupported() {
        let err = ServiceGates::parse(
            &annotations(&[(DEPLOYMENT_MODE_ANNOTATION, "Serverless")]),
            &BTreeMap::new(),
            &OperatorConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err.reason(), "UnsupportedDeploymentMode");
    }

    #[test]
    fn stop_and_visibility_flags() {
        let labels = annotations(&[(VISIBILITY_LABEL, CLUSTER_LOCAL_VISIBILITY)]);
        let gates = ServiceGates::parse(
            &annotations(&[(STOP_ANNOTATION, "True"), (DEPLOYMENT_MODE_ANNOTATION, "Standard")]),
            &labels,
            &OperatorConfig::default(),
        )
        .unwrap();
        assert!(gates.stopped);
        assert!(gates.cluster_local);
    }

    #[test]
    fn target_utilization_must_be_a_percentage() {
        let ok = ServiceGates::parse(
            &annotations(&[(TARGET_UTILIZATION_ANNOTATION, "60")]),
            &BTreeMap::new(),
            &OperatorConfig::default(),
        )
        .unwrap();
        assert_eq!(ok.target_utilization, Some(60));

        let err = ServiceGates::parse(
            &annotations(&[(TARGET_UTILIZATION_ANNOTATION, "250")]),
            &BTreeMap::new(),
            &OperatorConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err.reason(), "InvalidAnnotation");
    }
}
