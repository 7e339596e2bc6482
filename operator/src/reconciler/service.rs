//! Service reconciler; ready as soon as it exists.

use k8s_openapi::api::core::v1::Service;
use kube::{Api, Client};

use super::{ObjectKind, ObjectReconciler};
use crate::config::ReconcilerConfig;

/// Allocated addresses are immutable and assigned by the server.
const SERVER_ASSIGNED: &[&str] = &["/spec/clusterIP", "/spec/clusterIPs"];

pub fn reconciler(
    client: &Client,
    namespace: &str,
    owner_uid: &str,
    config: &ReconcilerConfig,
) -> ObjectReconciler<Service> {
    let api: Api<Service> = Api::namespaced(client.clone(), namespace);
    SERVER_ASSIGNED.iter().fold(
        ObjectReconciler::new(api, ObjectKind::Service, owner_uid, config),
        |r, path| r.ignore(path),
    )
}
