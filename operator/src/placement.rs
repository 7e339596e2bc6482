//! Multi-node placement: how many worker pods a pipeline x tensor parallel
//! deployment needs, given how many GPUs each head and worker pod requests.

use k8s_openapi::api::core::v1::Container;

use crate::error::InvalidSpec;

/// Default pipeline parallelism once a worker topology is declared.
pub const DEFAULT_MULTI_NODE_PIPELINE_PARALLEL_SIZE: u32 = 2;
pub const DEFAULT_TENSOR_PARALLEL_SIZE: u32 = 1;
/// GPUs assumed per pod when a container declares none.
pub const DEFAULT_GPUS_PER_NODE: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacementInput {
    pub pipeline_parallel_size: u32,
    pub tensor_parallel_size: u32,
    pub head_gpus: u32,
    pub worker_gpus: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementPlan {
    pub head_replicas: i32,
    pub worker_replicas: i32,
    pub pipeline_parallel_size: u32,
    pub tensor_parallel_size: u32,
    pub head_gpus: u32,
    pub worker_gpus: u32,
}

impl PlacementPlan {
    /// Head plus workers, exported to pods as the ray node count.
    pub fn total_nodes(&self) -> i32 {
        self.head_replicas + self.worker_replicas
    }

    pub fn required_gpus(&self) -> u32 {
        self.pipeline_parallel_size
            .saturating_mul(self.tensor_parallel_size)
    }

    pub fn provisioned_gpus(&self) -> u32 {
        let workers = u32::try_from(self.worker_replicas).unwrap_or(0);
        self.head_gpus
            .saturating_add(workers.saturating_mul(self.worker_gpus))
    }
}

/// Pure and deterministic; the same input always yields the same plan.
pub fn solve(input: PlacementInput) -> Result<PlacementPlan, InvalidSpec> {
    let pipeline = input.pipeline_parallel_size.max(1);
    let tensor = input.tensor_parallel_size.max(1);
    let too_large = || InvalidSpec::PlacementTooLarge { pipeline, tensor };
    let required = pipeline.checked_mul(tensor).ok_or_else(too_large)?;

    let worker_replicas = if input.head_gpus >= required {
        0
    } else if input.worker_gpus == 0 {
        return Err(InvalidSpec::PlacementInfeasible {
            required,
            pipeline,
            tensor,
            head_gpus: input.head_gpus,
            worker_gpus: input.worker_gpus,
        });
    } else {
        (required - input.head_gpus).div_ceil(input.worker_gpus)
    };

    // Head plus workers must still fit the node count exported to pods.
    let worker_replicas = i32::try_from(worker_replicas)
        .ok()
        .filter(|w| w.checked_add(1).is_some())
        .ok_or_else(too_large)?;

    Ok(PlacementPlan {
        head_replicas: 1,
        worker_replicas,
        pipeline_parallel_size: pipeline,
        tensor_parallel_size: tensor,
        head_gpus: input.head_gpus,
        worker_gpus: input.worker_gpus,
    })
}

/// GPU count requested by a container, checking vendor resource names in order.
///
/// Limits win over requests. Returns the matching resource name with the count.
pub fn detect_gpus(container: &Container, resource_names: &[String]) -> Option<(String, u32)> {
    let resources = container.resources.as_ref()?;
    for source in [resources.limits.as_ref(), resources.requests.as_ref()]
        .into_iter()
        .flatten()
    {
        for name in resource_names {
            if let Some(quantity) = source.get(name) {
                if let Ok(count) = quantity.0.trim().parse::<u32>() {
                    return Some((name.clone(), count));
                }
            }
        }
    }
    None
}
