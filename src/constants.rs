// Copyright (c) 2025 xzzpig
// SPDX-License-Identifier: MIT

//! Global constants for the DNS manager.
//!
//! All numeric and string constants used throughout the codebase, organized
//! by category.

// ============================================================================
// API Constants
// ============================================================================

/// API group for all DNS manager CRDs
pub const API_GROUP: &str = "dns.xzzpig.com";

/// API version for all DNS manager CRDs
pub const API_VERSION: &str = "v1";

/// Fully qualified API version (group/version)
pub const API_GROUP_VERSION: &str = "dns.xzzpig.com/v1";

/// Kind name for `Generator` resources
pub const KIND_GENERATOR: &str = "Generator";

/// Kind name for `ClusterGenerator` resources
pub const KIND_CLUSTER_GENERATOR: &str = "ClusterGenerator";

/// Kind name for `ResourceWatcher` resources
pub const KIND_RESOURCE_WATCHER: &str = "ResourceWatcher";

/// Kind name for `Record` resources
pub const KIND_RECORD: &str = "Record";

/// Kind name for `Provider` resources
pub const KIND_PROVIDER: &str = "Provider";

/// Kind name for `ClusterProvider` resources
pub const KIND_CLUSTER_PROVIDER: &str = "ClusterProvider";

/// Finalizer blocking deletion of Records and Providers until external state
/// is released
pub const FINALIZER: &str = "dns.xzzpig.com/finalizer";

/// Default generateName prefix for ResourceWatchers
pub const DEFAULT_WATCHER_GENERATE_NAME: &str = "watcher-";

// ============================================================================
// Record `extra` keys (provider-scoped hints)
// ============================================================================

/// Aliyun resolution line parameter
pub const EXTRA_KEY_ALIYUN_LINE: &str = "dns.xzzpig.com/alidns/line";

/// Cloudflare proxy flag ("true"/"false")
pub const EXTRA_KEY_CLOUDFLARE_PROXIED: &str = "dns.xzzpig.com/cloudflare/proxied";

/// Cloudflare record comment
pub const EXTRA_KEY_CLOUDFLARE_COMMENT: &str = "dns.xzzpig.com/cloudflare/comment";

/// Cloudflare record tags, comma-separated
pub const EXTRA_KEY_CLOUDFLARE_TAGS: &str = "dns.xzzpig.com/cloudflare/tags";

// ============================================================================
// Requeue / retry durations
// ============================================================================

/// Wait before re-checking a Record whose providers are not all ready (1 minute)
pub const RECORD_NOT_READY_REQUEUE_SECS: u64 = 60;

/// Wait before retrying a failed provider adapter construction (1 minute)
pub const PROVIDER_RETRY_REQUEUE_SECS: u64 = 60;

/// Wait before retrying a failed template rendering (1 minute)
pub const TEMPLATE_RETRY_REQUEUE_SECS: u64 = 60;

/// Hold interval while a deleted Provider waits for Records to release their
/// external state (1 second)
pub const PROVIDER_DELETE_HOLD_SECS: u64 = 1;

/// Requeue duration for generic controller errors (30 seconds)
pub const ERROR_REQUEUE_DURATION_SECS: u64 = 30;

// ============================================================================
// Leader Election Constants
// ============================================================================

/// Default leader election lease duration (15 seconds)
pub const DEFAULT_LEASE_DURATION_SECS: u64 = 15;

/// Default leader election retry period (2 seconds)
pub const DEFAULT_LEASE_RETRY_PERIOD_SECS: u64 = 2;

// ============================================================================
// Metrics Server Constants
// ============================================================================

/// Port for the Prometheus metrics HTTP server
pub const METRICS_SERVER_PORT: u16 = 8080;

/// Path for the Prometheus metrics endpoint
pub const METRICS_SERVER_PATH: &str = "/metrics";

/// Bind address for the metrics HTTP server
pub const METRICS_SERVER_BIND_ADDRESS: &str = "0.0.0.0";

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for the Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;
