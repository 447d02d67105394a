// Copyright (c) 2025 xzzpig
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the DNS manager.
//!
//! All metrics carry the `dns_xzzpig_com_` namespace prefix and are exposed
//! via the `/metrics` endpoint.

use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::LazyLock;
use std::time::Duration;

/// Namespace prefix for all metrics (prometheus-safe form of dns.xzzpig.com)
const METRICS_NAMESPACE: &str = "dns_xzzpig_com";

/// Global Prometheus metrics registry, exposed via `/metrics`.
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Total number of reconciliations by resource type and outcome.
///
/// Labels: `resource_type` (e.g. `Record`), `status` (`success` / `error`).
pub static RECONCILIATION_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_reconciliations_total"),
        "Total number of reconciliations by resource type and status",
    );
    let counter = CounterVec::new(opts, &["resource_type", "status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of reconciliations in seconds by resource type.
pub static RECONCILIATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_reconciliation_duration_seconds"),
        "Duration of reconciliations in seconds by resource type",
    )
    .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]);
    let histogram = HistogramVec::new(opts, &["resource_type"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

/// Backend calls issued through provider adapters.
///
/// Labels: `provider_type` (`ALIYUN`, `CLOUDFLARE`, ...), `operation`
/// (`create` / `update` / `delete`), `status` (`success` / `error`).
pub static PROVIDER_OPERATIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_provider_operations_total"),
        "Total number of provider backend operations by type, operation and status",
    );
    let counter = CounterVec::new(opts, &["provider_type", "operation", "status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Record one finished reconciliation.
pub fn record_reconciliation(resource_type: &str, status: &str, duration: Duration) {
    RECONCILIATION_TOTAL
        .with_label_values(&[resource_type, status])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[resource_type])
        .observe(duration.as_secs_f64());
}

/// Record one provider backend call.
pub fn record_provider_operation(provider_type: &str, operation: &str, status: &str) {
    PROVIDER_OPERATIONS_TOTAL
        .with_label_values(&[provider_type, operation, status])
        .inc();
}

/// Render every registered metric in the Prometheus text format.
///
/// # Errors
///
/// Returns an error when encoding fails or the buffer is not valid UTF-8.
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
