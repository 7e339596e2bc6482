//! Serving runtime lookup.
//!
//! An explicit `runtime` name is looked up namespaced first, then cluster-scoped.
//! Otherwise a runtime is auto-selected by model format: enabled, `autoSelect`,
//! highest priority, namespaced before cluster-scoped, then by name.

use kube::{Api, Client, ResourceExt, api::ListParams};
use tracing::debug;

use crate::{
    crd::{ClusterServingRuntime, ModelFormat, ModelSpec, ServingRuntime, ServingRuntimeSpec},
    error::{Error, InvalidSpec},
};

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRuntime {
    pub name: String,
    pub spec: ServingRuntimeSpec,
}

/// A runtime template visible to one namespace.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub name: String,
    pub spec: ServingRuntimeSpec,
    pub cluster_scoped: bool,
}

impl From<ServingRuntime> for Candidate {
    fn from(rt: ServingRuntime) -> Self {
        Candidate {
            name: rt.name_any(),
            spec: rt.spec,
            cluster_scoped: false,
        }
    }
}

impl From<ClusterServingRuntime> for Candidate {
    fn from(rt: ClusterServingRuntime) -> Self {
        Candidate {
            name: rt.name_any(),
            spec: rt.spec.runtime,
            cluster_scoped: true,
        }
    }
}

/// Validates an explicitly named runtime against the model format.
pub fn check_explicit(
    candidate: Candidate,
    format: &ModelFormat,
) -> Result<ResolvedRuntime, InvalidSpec> {
    if candidate.spec.is_disabled() {
        return Err(InvalidSpec::RuntimeDisabled {
            name: candidate.name,
        });
    }
    if candidate
        .spec
        .supported_format(&format.name, format.version.as_deref())
        .is_none()
    {
        return Err(InvalidSpec::RuntimeFormatMismatch {
            name: candidate.name,
            format: format.name.clone(),
        });
    }
    Ok(ResolvedRuntime {
        name: candidate.name,
        spec: candidate.spec,
    })
}

/// Picks the best auto-selectable runtime for a model format.
pub fn select_runtime(
    candidates: Vec<Candidate>,
    format: &ModelFormat,
) -> Result<ResolvedRuntime, InvalidSpec> {
    let mut eligible: Vec<(i32, Candidate)> = candidates
        .into_iter()
        .filter(|c| !c.spec.is_disabled())
        .filter_map(|c| {
            let supported = c
                .spec
                .supported_format(&format.name, format.version.as_deref())?;
            if !supported.auto_select.unwrap_or(false) {
                return None;
            }
            let priority = supported.priority.unwrap_or(0);
            Some((priority, c))
        })
        .collect();

    eligible.sort_by(|(pa, a), (pb, b)| {
        pb.cmp(pa)
            .then(a.cluster_scoped.cmp(&b.cluster_scoped))
            .then_with(|| a.name.cmp(&b.name))
    });

    eligible
        .into_iter()
        .next()
        .map(|(_, c)| ResolvedRuntime {
            name: c.name,
            spec: c.spec,
        })
        .ok_or_else(|| InvalidSpec::NoRuntimeForFormat {
            format: format.name.clone(),
        })
}

/// Resolves the runtime for a model-based predictor.
pub async fn resolve(
    client: &Client,
    namespace: &str,
    model: &ModelSpec,
) -> Result<ResolvedRuntime, Error> {
    let namespaced: Api<ServingRuntime> = Api::namespaced(client.clone(), namespace);
    let cluster: Api<ClusterServingRuntime> = Api::all(client.clone());

    if let Some(name) = &model.runtime {
        let found = match namespaced.get_opt(name).await? {
            Some(rt) => Some(Candidate::from(rt)),
            None => optional_api(cluster.get_opt(name).await)?
                .flatten()
                .map(Candidate::from),
        };
        let candidate = found.ok_or_else(|| InvalidSpec::RuntimeNotFound { name: name.clone() })?;
        return Ok(check_explicit(candidate, &model.model_format)?);
    }

    let mut candidates: Vec<Candidate> = namespaced
        .list(&ListParams::default())
        .await?
        .into_iter()
        .map(Candidate::from)
        .collect();
    if let Some(list) = optional_api(cluster.list(&ListParams::default()).await)? {
        candidates.extend(list.into_iter().map(Candidate::from));
    }
    debug!(
        namespace,
        format = %model.model_format.name,
        candidates = candidates.len(),
        "selecting serving runtime"
    );
    Ok(select_runtime(candidates, &model.model_format)?)
}

/// A kind whose CRD is not installed answers 404; treat it as empty.
fn optional_api<T>(result: Result<T, kube::Error>) -> Result<Option<T>, Error> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
        Err(e) => Err(e.into()),
    }
}
