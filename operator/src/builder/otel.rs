//! Sidecar OpenTelemetry collector feeding pod metrics to the KEDA scaler.

use serde_json::json;

use super::BuildContext;
use crate::{
    constants::{CONTAINER_PORT, component_name},
    crd::{ComponentType, MetricsSpec, OpenTelemetryCollector, OpenTelemetryCollectorSpec},
    error::Error,
};

/// Metric names declared by the component's pod metrics, deduplicated in order.
fn metric_names(ctx: &BuildContext, component: ComponentType) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let metrics = ctx
        .isvc
        .spec
        .extension(component)
        .map(|e| e.effective_metrics())
        .unwrap_or_default();
    for metric in metrics {
        if let MetricsSpec::PodMetric { pod_metric } = metric {
            for name in pod_metric.metric.metric_names {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
    }
    names
}

pub fn build_collector(
    ctx: &BuildContext,
    component: ComponentType,
    serving_port: i32,
) -> Result<OpenTelemetryCollector, Error> {
    let name = component_name(&ctx.name(), component);
    let otel = &ctx.config.otel_collector;
    let names = metric_names(ctx, component);
    let port = if serving_port > 0 { serving_port } else { CONTAINER_PORT };

    let mut processors = Vec::new();
    let mut processor_config = serde_json::Map::new();
    if !names.is_empty() {
        processors.push("filter/metrics");
        processor_config.insert(
            "filter/metrics".into(),
            json!({
                "metrics": {
                    "include": {
                        "match_type": "strict",
                        "metric_names": names,
                    }
                }
            }),
        );
    }

    let config = json!({
        "receivers": {
            "prometheus": {
                "config": {
                    "scrape_configs": [{
                        "job_name": "otel-collector",
                        "scrape_interval": otel.scrape_interval,
                        "static_configs": [{"targets": [format!("localhost:{port}")]}],
                    }]
                }
            }
        },
        "processors": processor_config,
        "exporters": {
            "otlp": {
                "endpoint": otel.metric_receiver_endpoint,
                "compression": "none",
                "tls": {"insecure": true},
            }
        },
        "service": {
            "pipelines": {
                "metrics": {
                    "receivers": ["prometheus"],
                    "processors": processors,
                    "exporters": ["otlp"],
                }
            }
        }
    });

    Ok(OpenTelemetryCollector {
        metadata: ctx.object_meta(&name, component, &name)?,
        spec: OpenTelemetryCollectorSpec {
            mode: "sidecar".into(),
            config,
        },
    })
}
