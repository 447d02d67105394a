// Copyright (c) 2025 xzzpig
// SPDX-License-Identifier: MIT

//! Provider registry, payload contract and adapter cache.
//!
//! A provider adapter maps the abstract Record operations onto one external
//! DNS backend. Adapters are built by factories registered per
//! [`ProviderType`]; the Provider reconciler constructs them and publishes
//! them into a process-wide cache keyed by the Provider's UID, from which the
//! Record reconciler picks them up.
//!
//! # Contract
//!
//! Every operation receives a [`Payload`] whose `id` and `data` slots are
//! in-out and owned by the caller:
//!
//! - `create` establishes the record and must set `payload.id` on success.
//! - `update` changes record content; a backend "not found" must fall back to
//!   create semantics (idempotent ensure).
//! - `delete` removes the record; backend "not found" is success. On success
//!   `payload.id` and `payload.data` are cleared.
//!
//! Re-running the final operation of any sequence with the current payload
//! must be a no-op modulo transient errors.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, RwLock};

use async_trait::async_trait;
use futures::future::BoxFuture;
use kube::Client;
use thiserror::Error;

use crate::crd::{ProviderCommonSpec, ProviderType, RecordProviderStatus, RecordSpecInner};

pub mod adguard;
pub mod aliyun;
pub mod cloudflare;
pub mod job;

/// Errors surfaced by provider adapters and the registry.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// No factory registered for the requested provider type.
    #[error("provider not found: {0}")]
    NotRegistered(ProviderType),

    /// The provider spec is missing or inconsistent for its type.
    #[error("invalid provider configuration: {0}")]
    InvalidConfig(String),

    /// Non-fatal sentinel from the Job adapter: the dispatched Job has not
    /// finished yet and the caller should requeue.
    #[error("job is running")]
    JobRunning,

    /// The dispatched Job reported `Failed=True`.
    #[error("job failed, {reason}: {message}")]
    JobFailed { reason: String, message: String },

    /// A backend API rejected the request. `code` carries the vendor error
    /// code (numeric for Cloudflare, symbolic for Aliyun) when one was
    /// returned, otherwise the HTTP status.
    #[error("backend error {code}: {message}")]
    Backend {
        status: u16,
        code: String,
        message: String,
    },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Kube(#[from] kube::Error),

    #[error(transparent)]
    Template(#[from] minijinja::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl ProviderError {
    /// Whether this is the Job adapter's still-running sentinel.
    #[must_use]
    pub fn is_job_running(&self) -> bool {
        matches!(self, ProviderError::JobRunning)
    }
}

/// The in/out carrier passed to every adapter operation.
///
/// `id` holds the backend identifier of the external record, `data` opaque
/// adapter state carried across calls; both are persisted into the Record's
/// per-provider status between reconciles.
#[derive(Debug, Clone)]
pub struct Payload {
    pub id: String,
    pub data: String,
    pub record: RecordSpecInner,
}

impl Payload {
    /// Build a payload from the persisted per-provider status and the
    /// record's desired spec.
    #[must_use]
    pub fn from_status(status: &RecordProviderStatus, record: &RecordSpecInner) -> Self {
        Self {
            id: status.record_id.clone(),
            data: status.data.clone(),
            record: record.clone(),
        }
    }
}

/// One external DNS backend, keyed by provider type.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    async fn create(&self, payload: &mut Payload) -> Result<(), ProviderError>;
    async fn update(&self, payload: &mut Payload) -> Result<(), ProviderError>;
    async fn delete(&self, payload: &mut Payload) -> Result<(), ProviderError>;
}

/// Everything a factory needs to construct an adapter.
#[derive(Clone)]
pub struct FactoryInput {
    /// Cluster client, used by adapters that drive Kubernetes objects (Job).
    pub client: Client,
    /// Provider object name.
    pub name: String,
    /// Provider object namespace; `None` for ClusterProviders.
    pub namespace: Option<String>,
    pub spec: ProviderCommonSpec,
}

type FactoryFuture = BoxFuture<'static, Result<Box<dyn DnsProvider>, ProviderError>>;

/// Factory building one adapter from a Provider object's spec. Construction
/// may validate against the backend (e.g. resolve a zone id) and is async.
pub type ProviderFactory = Box<dyn Fn(FactoryInput) -> FactoryFuture + Send + Sync>;

static REGISTRY: LazyLock<RwLock<HashMap<ProviderType, ProviderFactory>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Register a factory for a provider type, replacing any previous one.
pub fn register(provider_type: ProviderType, factory: ProviderFactory) {
    REGISTRY
        .write()
        .expect("provider registry poisoned")
        .insert(provider_type, factory);
}

/// Register the built-in adapters. Called once from `main` before any
/// controller starts.
pub fn register_builtin() {
    aliyun::register();
    cloudflare::register();
    adguard::register();
    job::register();
}

/// Construct an adapter for the given provider object.
///
/// # Errors
///
/// [`ProviderError::NotRegistered`] for unknown types, or whatever the
/// factory's backend validation reports.
pub async fn new_provider(input: FactoryInput) -> Result<Box<dyn DnsProvider>, ProviderError> {
    let future = {
        let registry = REGISTRY.read().expect("provider registry poisoned");
        let factory = registry
            .get(&input.spec.r#type)
            .ok_or(ProviderError::NotRegistered(input.spec.r#type))?;
        factory(input)
    };
    future.await
}

// ============================================================================
// Provider cache
// ============================================================================

/// An adapter together with the Provider generation it was built from.
///
/// A cache entry is stale once the Provider's generation moves past it; the
/// Record reconciler then refuses to touch the backend until the Provider
/// reconciler has published a fresh entry.
pub struct CachedProvider {
    pub provider: Box<dyn DnsProvider>,
    pub generation: i64,
}

static CACHE: LazyLock<RwLock<HashMap<String, Arc<CachedProvider>>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Look up the cached adapter for a Provider UID.
#[must_use]
pub fn cache_lookup(uid: &str) -> Option<Arc<CachedProvider>> {
    CACHE
        .read()
        .expect("provider cache poisoned")
        .get(uid)
        .cloned()
}

/// Publish a freshly built adapter for a Provider UID. Entries are replaced
/// wholesale, never mutated in place.
pub fn cache_store(uid: &str, provider: Box<dyn DnsProvider>, generation: i64) {
    CACHE.write().expect("provider cache poisoned").insert(
        uid.to_string(),
        Arc::new(CachedProvider {
            provider,
            generation,
        }),
    );
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
