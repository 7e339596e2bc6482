use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::{
    apps::v1::Deployment, autoscaling::v2::HorizontalPodAutoscaler, core::v1::Service,
    networking::v1::Ingress,
};
use kube::{
    Api, Client, CustomResourceExt,
    discovery::Discovery,
    runtime::{
        Controller,
        controller::Error as ControllerError,
        watcher::Config as WatcherConfig,
    },
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use inference_operator::{
    config::DEFAULT_NAMESPACE,
    crd::{
        ClusterServingRuntime, HttpRoute, InferenceService, OpenTelemetryCollector, ScaledObject,
        ServingRuntime,
    },
    error::Error,
    event::{Ctx, FailureCounts},
    metrics::Metrics,
    reconcile::{error_policy, reconcile},
};

/// Must stay under the client's 30s read timeout so idle watches are closed server-side.
const WATCH_TIMEOUT_SECS: u32 = 25;

fn print_crds() -> Result<(), serde_yaml::Error> {
    let crds = [
        InferenceService::crd(),
        ServingRuntime::crd(),
        ClusterServingRuntime::crd(),
    ];
    for crd in crds {
        println!("---\n{}", serde_yaml::to_string(&crd)?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::args().nth(1).as_deref() == Some("crd") {
        print_crds()?;
        return Ok(());
    }

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let client = Client::try_default().await?;
    run(client).await?;
    Ok(())
}

async fn run(client: Client) -> Result<(), Error> {
    let config_namespace =
        std::env::var("POD_NAMESPACE").unwrap_or_else(|_| DEFAULT_NAMESPACE.to_string());
    let ctx = Arc::new(Ctx::new(client.clone(), config_namespace, Metrics::new()?));

    let wc = || WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS);
    let mut controller = Controller::new(Api::<InferenceService>::all(client.clone()), wc())
        .owns(Api::<Deployment>::all(client.clone()), wc())
        .owns(Api::<Service>::all(client.clone()), wc())
        .owns(Api::<HorizontalPodAutoscaler>::all(client.clone()), wc())
        .owns(Api::<Ingress>::all(client.clone()), wc());

    // Third-party kinds are only watched when their CRDs are installed.
    let discovery = match Discovery::new(client.clone()).run().await {
        Ok(discovery) => Some(discovery),
        Err(e) => {
            warn!(error = %e, "API discovery failed, not watching third-party kinds");
            None
        }
    };
    let installed = |group: &str| discovery.as_ref().is_some_and(|d| d.has_group(group));
    if installed("keda.sh") {
        controller = controller.owns(Api::<ScaledObject>::all(client.clone()), wc());
    }
    if installed("gateway.networking.k8s.io") {
        controller = controller.owns(Api::<HttpRoute>::all(client.clone()), wc());
    }
    if installed("opentelemetry.io") {
        controller = controller.owns(Api::<OpenTelemetryCollector>::all(client.clone()), wc());
    }

    info!("starting InferenceService controller");
    let failures = ctx.failures.clone();
    controller
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| {
            match result {
                Ok((obj, action)) => debug!(object = %obj, ?action, "reconciled"),
                // A retry fired after the object was deleted; its backoff state goes with it.
                Err(ControllerError::ObjectNotFound(obj)) => {
                    debug!(object = %obj, "requeued object is gone");
                    failures.reset(&FailureCounts::key(obj.namespace.as_deref(), &obj.name));
                }
                Err(e) => error!(error = %e, "reconcile error"),
            }
            futures::future::ready(())
        })
        .await;
    info!("controller stopped");
    Ok(())
}
