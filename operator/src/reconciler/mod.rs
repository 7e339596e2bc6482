//! Per-kind reconcilers.
//!
//! Every managed kind goes through the same driver: fetch the observed object,
//! classify the situation into a [`Verdict`], then perform at most one write.
//! The kind modules decide *whether* an object should exist (gates) and what
//! "ready" means for it; they never touch other kinds.

pub mod deployment;
pub mod hpa;
pub mod httproute;
pub mod ingress;
pub mod keda;
pub mod otel;
pub mod semantic;
pub mod service;

use std::fmt::{Debug, Display};

use kube::{
    Api, Resource, ResourceExt,
    api::{DeleteParams, ObjectMeta, PostParams},
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{config::ReconcilerConfig, constants::FIELD_MANAGER, error::Error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    Deployment,
    Service,
    HorizontalPodAutoscaler,
    ScaledObject,
    HttpRoute,
    Ingress,
    OpenTelemetryCollector,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Deployment => "Deployment",
            ObjectKind::Service => "Service",
            ObjectKind::HorizontalPodAutoscaler => "HorizontalPodAutoscaler",
            ObjectKind::ScaledObject => "ScaledObject",
            ObjectKind::HttpRoute => "HTTPRoute",
            ObjectKind::Ingress => "Ingress",
            ObjectKind::OpenTelemetryCollector => "OpenTelemetryCollector",
        }
    }
}

impl Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    Create,
    Update,
    Delete,
    /// Desired and observed agree; nothing written.
    Existed,
    /// Not applicable and absent, or present but owned by someone else.
    Skipped,
    /// The check itself failed.
    Unknown,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Create => "Create",
            Verdict::Update => "Update",
            Verdict::Delete => "Delete",
            Verdict::Existed => "Existed",
            Verdict::Skipped => "Skipped",
            Verdict::Unknown => "Unknown",
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(self, Verdict::Create | Verdict::Update | Verdict::Delete)
    }
}

impl Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one per-kind reconcile: the verdict acted on and the resulting object.
#[derive(Debug, Clone)]
pub struct Reconciled<K> {
    pub verdict: Verdict,
    pub object: Option<K>,
}

impl<K> Reconciled<K> {
    /// Whether the object now exists in the cluster.
    pub fn exists(&self) -> bool {
        self.object.is_some() && self.verdict != Verdict::Delete
    }
}

pub fn is_owned_by(meta: &ObjectMeta, owner_uid: &str) -> bool {
    meta.owner_references
        .as_ref()
        .is_some_and(|refs| refs.iter().any(|r| r.uid == owner_uid))
}

/// Classifies desired against observed. Pure.
pub fn decide(
    desired: Option<&Value>,
    observed: Option<&Value>,
    owned: bool,
    ignored: &[&str],
) -> Verdict {
    match (desired, observed) {
        (_, Some(_)) if !owned => Verdict::Skipped,
        (Some(_), None) => Verdict::Create,
        (Some(want), Some(have)) => {
            if semantic::semantically_equal(want, have, ignored.iter().copied()) {
                Verdict::Existed
            } else {
                Verdict::Update
            }
        }
        (None, Some(_)) => Verdict::Delete,
        (None, None) => Verdict::Skipped,
    }
}

/// Builds the object to write on Update: ignored paths come from the observed
/// object and labels/annotations others added are kept.
pub fn prepare_update<K>(desired: &K, observed: &K, ignored: &[&str]) -> Result<K, Error>
where
    K: Serialize + DeserializeOwned,
{
    let mut want = serde_json::to_value(desired)?;
    let have = serde_json::to_value(observed)?;
    semantic::carry_ignored(&mut want, &have, ignored.iter().copied());

    for field in ["labels", "annotations"] {
        let Some(Value::Object(theirs)) = have.pointer(&format!("/metadata/{field}")) else {
            continue;
        };
        let pointer = format!("/metadata/{field}");
        let mut merged = theirs.clone();
        if let Some(Value::Object(ours)) = want.pointer(&pointer) {
            merged.extend(ours.clone());
        }
        semantic::set_pointer(&mut want, &pointer, Value::Object(merged));
    }

    Ok(serde_json::from_value(want)?)
}

/// Generic create/update/delete driver for one kind in one namespace.
pub struct ObjectReconciler<K>
where
    K: Resource<DynamicType = ()>,
{
    api: Api<K>,
    kind: ObjectKind,
    owner_uid: String,
    ignored: Vec<String>,
}

impl<K> ObjectReconciler<K>
where
    K: Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned + Debug,
{
    pub fn new(api: Api<K>, kind: ObjectKind, owner_uid: &str, config: &ReconcilerConfig) -> Self {
        let mut ignored: Vec<String> = semantic::DEFAULT_IGNORED
            .iter()
            .map(|p| p.to_string())
            .collect();
        ignored.extend(config.ignored_for(kind).iter().cloned());
        Self {
            api,
            kind,
            owner_uid: owner_uid.to_string(),
            ignored,
        }
    }

    /// Adds a path owned by another writer, e.g. replicas under an autoscaler.
    pub fn ignore(mut self, path: &str) -> Self {
        if !self.ignored.iter().any(|p| p == path) {
            self.ignored.push(path.to_string());
        }
        self
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    fn ignored(&self) -> Vec<&str> {
        self.ignored.iter().map(String::as_str).collect()
    }

    pub async fn check_exists(
        &self,
        name: &str,
        desired: Option<&K>,
    ) -> Result<(Verdict, Option<K>), Error> {
        let observed = self.api.get_opt(name).await?;
        let owned = observed
            .as_ref()
            .is_some_and(|o| is_owned_by(o.meta(), &self.owner_uid));
        let desired_json = desired.map(serde_json::to_value).transpose()?;
        let observed_json = observed.as_ref().map(serde_json::to_value).transpose()?;
        let verdict = decide(
            desired_json.as_ref(),
            observed_json.as_ref(),
            owned,
            &self.ignored(),
        );
        Ok((verdict, observed))
    }

    /// Performs exactly one of create, update or delete, or nothing.
    pub async fn reconcile(&self, name: &str, desired: Option<K>) -> Result<Reconciled<K>, Error> {
        let (verdict, observed) = self.check_exists(name, desired.as_ref()).await?;
        let kind = self.kind.as_str();
        let pp = PostParams {
            field_manager: Some(FIELD_MANAGER.into()),
            ..Default::default()
        };

        let object = match (verdict, desired, observed) {
            (Verdict::Create, Some(want), _) => {
                let created = self.api.create(&pp, &want).await?;
                info!(kind, name, "created");
                Some(created)
            }
            (Verdict::Update, Some(want), Some(have)) => {
                let next = prepare_update(&want, &have, &self.ignored())?;
                let updated = self.api.replace(name, &pp, &next).await?;
                info!(kind, name, "updated");
                Some(updated)
            }
            (Verdict::Delete, _, Some(_)) => {
                match self.api.delete(name, &DeleteParams::background()).await {
                    Ok(_) => info!(kind, name, "deleted"),
                    Err(kube::Error::Api(ae)) if ae.code == 404 => {
                        debug!(kind, name, "already gone")
                    }
                    Err(e) => return Err(e.into()),
                }
                None
            }
            (Verdict::Skipped, _, Some(foreign)) => {
                warn!(
                    kind,
                    name,
                    owner = ?foreign.owner_references().first().map(|r| &r.name),
                    "object exists but is not owned by this InferenceService, leaving it alone"
                );
                Some(foreign)
            }
            (Verdict::Existed, _, observed) => observed,
            (Verdict::Skipped, _, None) => None,
            (verdict, _, _) => {
                return Err(Error::Internal(format!(
                    "{kind} {name}: verdict {verdict} without the objects it needs"
                )));
            }
        };

        Ok(Reconciled { verdict, object })
    }
}
