//! HorizontalPodAutoscaler reconciler.
//!
//! The object exists only while the component's class is `hpa` and the service
//! runs; any other class makes the desired state empty, so an existing HPA is
//! deleted on the next pass.

use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use kube::{Api, Client};

use super::{ObjectKind, ObjectReconciler};
use crate::{
    annotations::AutoscalerClass,
    builder::{
        BuildContext,
        autoscaler::{ReplicaRange, build_hpa, effective_class},
    },
    config::ReconcilerConfig,
    crd::ComponentType,
    error::Error,
};

pub fn desired(
    ctx: &BuildContext,
    component: ComponentType,
    range: ReplicaRange,
) -> Result<Option<HorizontalPodAutoscaler>, Error> {
    if ctx.gates.stopped || effective_class(ctx, component) != AutoscalerClass::Hpa {
        return Ok(None);
    }
    build_hpa(ctx, component, range).map(Some)
}

pub fn reconciler(
    client: &Client,
    namespace: &str,
    owner_uid: &str,
    config: &ReconcilerConfig,
) -> ObjectReconciler<HorizontalPodAutoscaler> {
    let api: Api<HorizontalPodAutoscaler> = Api::namespaced(client.clone(), namespace);
    ObjectReconciler::new(api, ObjectKind::HorizontalPodAutoscaler, owner_uid, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        builder::testing,
        config::OperatorConfig,
        constants::{AUTOSCALER_CLASS_ANNOTATION, STOP_ANNOTATION},
    };

    const RANGE: ReplicaRange = ReplicaRange { min: 1, max: 3 };

    #[test]
    fn present_only_for_hpa_class() {
        let config = OperatorConfig::default();
        let classes = [("hpa", true), ("keda", false), ("external", false), ("none", false)];
        for (class, expected) in classes {
            let mut isvc = testing::isvc("sklearn");
            testing::annotate(&mut isvc, AUTOSCALER_CLASS_ANNOTATION, class);
            let gates = testing::gates(&config, &isvc);
            let ctx = BuildContext::new(&isvc, &config, &gates);
            let hpa = desired(&ctx, ComponentType::Predictor, RANGE).unwrap();
            assert_eq!(hpa.is_some(), expected, "class {class}");
        }
    }

    #[test]
    fn absent_when_stopped() {
        let config = OperatorConfig::default();
        let mut isvc = testing::isvc("sklearn");
        testing::annotate(&mut isvc, STOP_ANNOTATION, "true");
        let gates = testing::gates(&config, &isvc);
        let ctx = BuildContext::new(&isvc, &config, &gates);
        assert!(desired(&ctx, ComponentType::Predictor, RANGE).unwrap().is_none());
    }
}
