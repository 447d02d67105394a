// Copyright (c) 2025 xzzpig
// SPDX-License-Identifier: MIT

//! Reconciliation logic for the four control loops, plus the finalizer and
//! event helpers they share.
//!
//! The pipeline: a [`generator`] selects source resources and materializes
//! one ResourceWatcher per match; each [`resourcewatcher`] renders its
//! template into child Records; the [`record`] loop fans every Record out to
//! the matching providers; the [`provider`] loop validates backends and
//! publishes adapters into the process-wide cache the record loop reads.
//!
//! All cross-loop coordination goes through object state on the cluster API;
//! within one reconcile, a failure for one sibling provider or record never
//! aborts processing of the others.

pub mod generator;
pub mod provider;
pub mod record;
pub mod resourcewatcher;

use std::fmt::Debug;

use anyhow::Result;
use k8s_openapi::api::core::v1::Event;
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::{Api, ObjectMeta, Patch, PatchParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::constants::FINALIZER;

pub use generator::reconcile_generator;
pub use provider::reconcile_provider;
pub use record::reconcile_record;
pub use resourcewatcher::reconcile_resourcewatcher;

/// Kubernetes event type for successful operations.
pub const EVENT_TYPE_NORMAL: &str = "Normal";

/// Kubernetes event type for failures.
pub const EVENT_TYPE_WARNING: &str = "Warning";

/// Whether the object carries the DNS manager finalizer.
#[must_use]
pub fn has_finalizer<T: ResourceExt>(object: &T) -> bool {
    object
        .meta()
        .finalizers
        .as_ref()
        .is_some_and(|finalizers| finalizers.iter().any(|f| f == FINALIZER))
}

/// Add the finalizer if missing. Returns true when a patch was written, in
/// which case the caller should requeue and work with the fresh object.
///
/// # Errors
///
/// Returns an error when the patch fails.
pub async fn ensure_finalizer<T>(api: &Api<T>, object: &T) -> Result<bool>
where
    T: Resource<DynamicType = ()>
        + ResourceExt
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned,
{
    if has_finalizer(object) {
        return Ok(false);
    }

    let mut finalizers = object.meta().finalizers.clone().unwrap_or_default();
    finalizers.push(FINALIZER.to_string());

    info!(
        "Adding finalizer to {} {}/{}",
        T::kind(&()),
        object.namespace().unwrap_or_default(),
        object.name_any()
    );

    let patch = json!({ "metadata": { "finalizers": finalizers } });
    api.patch(
        &object.name_any(),
        &PatchParams::default(),
        &Patch::Merge(&patch),
    )
    .await?;
    Ok(true)
}

/// Remove the finalizer, unblocking the platform's garbage collector.
///
/// # Errors
///
/// Returns an error when the patch fails.
pub async fn remove_finalizer<T>(api: &Api<T>, object: &T) -> Result<()>
where
    T: Resource<DynamicType = ()>
        + ResourceExt
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned,
{
    if !has_finalizer(object) {
        return Ok(());
    }

    let mut finalizers = object.meta().finalizers.clone().unwrap_or_default();
    finalizers.retain(|f| f != FINALIZER);

    info!(
        "Removing finalizer from {} {}/{}",
        T::kind(&()),
        object.namespace().unwrap_or_default(),
        object.name_any()
    );

    let patch = json!({ "metadata": { "finalizers": finalizers } });
    api.patch(
        &object.name_any(),
        &PatchParams::default(),
        &Patch::Merge(&patch),
    )
    .await?;
    Ok(())
}

/// Post a core/v1 Event for the given object.
///
/// Event posting is best-effort: failures are logged, never propagated, so a
/// broken events endpoint cannot wedge reconciliation.
pub async fn emit_event<T>(client: &Client, object: &T, event_type: &str, reason: &str, message: &str)
where
    T: Resource<DynamicType = ()> + ResourceExt,
{
    let name = object.name_any();
    let namespace = object.namespace().unwrap_or_else(|| "default".to_string());
    let now = Time(chrono::Utc::now());

    let event = Event {
        metadata: ObjectMeta {
            generate_name: Some(format!("{name}-")),
            namespace: Some(namespace.clone()),
            ..Default::default()
        },
        involved_object: ObjectReference {
            api_version: Some(T::api_version(&()).to_string()),
            kind: Some(T::kind(&()).to_string()),
            name: Some(name),
            namespace: Some(namespace.clone()),
            uid: object.meta().uid.clone(),
            ..Default::default()
        },
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        type_: Some(event_type.to_string()),
        first_timestamp: Some(now.clone()),
        last_timestamp: Some(now),
        count: Some(1),
        ..Default::default()
    };

    let api: Api<Event> = Api::namespaced(client.clone(), &namespace);
    if let Err(err) = api.create(&PostParams::default(), &event).await {
        warn!("Failed to post {reason} event: {err}");
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
