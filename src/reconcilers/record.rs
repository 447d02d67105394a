// Copyright (c) 2025 xzzpig
// SPDX-License-Identifier: MIT

//! Record reconciliation: fan-out to every matching provider.
//!
//! Per pass: collect all Providers in the Record's namespace plus all
//! ClusterProviders, and for each one whose selector matches drive one
//! Create/Update/Delete step against its cached adapter, persisting the
//! returned id, opaque data and error message into the Record's per-provider
//! status. A provider without a fresh cache entry (absent, or generation
//! behind the Provider object) is skipped with "provider not ready" and no
//! backend call.
//!
//! Entries for providers that stopped matching or disappeared get a
//! best-effort Delete and are removed regardless of its outcome. An error
//! for one provider never aborts processing of its siblings; failure state is
//! durable in status and the Record requeues until everything is in sync.
//!
//! Deletion is finalizer-gated: the finalizer is released only once every
//! matching provider has dropped its external record.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Client, Resource, ResourceExt};
use serde_json::json;
use tracing::{debug, warn};

use crate::constants::RECORD_NOT_READY_REQUEUE_SECS;
use crate::context::Context;
use crate::crd::{
    ClusterProvider, NamespacedName, Provider, ProviderCommonSpec, ProviderObject, Record,
    RecordProviderStatus,
};
use crate::metrics;
use crate::provider::{self, Payload};
use crate::reconcilers::{
    emit_event, ensure_finalizer, remove_finalizer, EVENT_TYPE_NORMAL, EVENT_TYPE_WARNING,
};

/// Message recorded while a provider's adapter is not yet in cache.
const MSG_PROVIDER_NOT_READY: &str = "provider not ready";

/// A Provider or ClusterProvider, unified for the matching pass.
enum AnyProvider {
    Namespaced(Provider),
    Cluster(ClusterProvider),
}

impl AnyProvider {
    fn spec(&self) -> &ProviderCommonSpec {
        match self {
            AnyProvider::Namespaced(p) => p.provider_spec(),
            AnyProvider::Cluster(p) => p.provider_spec(),
        }
    }

    fn key(&self) -> NamespacedName {
        match self {
            AnyProvider::Namespaced(p) => p.provider_key(),
            AnyProvider::Cluster(p) => p.provider_key(),
        }
    }

    fn uid(&self) -> String {
        let meta = match self {
            AnyProvider::Namespaced(p) => p.meta(),
            AnyProvider::Cluster(p) => p.meta(),
        };
        meta.uid.clone().unwrap_or_default()
    }

    fn generation(&self) -> i64 {
        let meta = match self {
            AnyProvider::Namespaced(p) => p.meta(),
            AnyProvider::Cluster(p) => p.meta(),
        };
        meta.generation.unwrap_or_default()
    }

    fn deleting(&self) -> bool {
        let meta = match self {
            AnyProvider::Namespaced(p) => p.meta(),
            AnyProvider::Cluster(p) => p.meta(),
        };
        meta.deletion_timestamp.is_some()
    }
}

/// Reconcile one Record.
///
/// # Errors
///
/// Returns an error when provider listing or the finalizer patch fails;
/// adapter failures are persisted in status instead.
pub async fn reconcile_record(record: Arc<Record>, ctx: Arc<Context>) -> Result<Action> {
    let client = &ctx.client;
    let namespace = record.namespace().unwrap_or_default();
    let name = record.name_any();
    let api: Api<Record> = Api::namespaced(client.clone(), &namespace);

    if ensure_finalizer(&api, &*record).await? {
        return Ok(Action::requeue(Duration::ZERO));
    }

    let providers = list_providers(client, &namespace).await?;

    let record = (*record).clone();
    let record_deleting = record.meta().deletion_timestamp.is_some();
    let mut status = record.status.clone().unwrap_or_default();
    let mut checked: HashSet<NamespacedName> = HashSet::new();

    // Matching providers: one step toward convergence each.
    for provider in &providers {
        if !provider.spec().selector.matches(&record) {
            continue;
        }

        let key = provider.key();
        if status.find_provider(&key).is_none() {
            status.providers.push(RecordProviderStatus {
                provider: key.clone(),
                ..Default::default()
            });
        }
        checked.insert(key.clone());
        let Some(entry) = status.find_provider(&key) else {
            continue;
        };

        let Some(cached) =
            provider::cache_lookup(&provider.uid()).filter(|c| c.generation == provider.generation())
        else {
            entry.message = MSG_PROVIDER_NOT_READY.to_string();
            continue;
        };

        let deleting = record_deleting || provider.deleting();
        let provider_type = provider.spec().r#type;

        if deleting && entry.record_id.is_empty() {
            // Nothing at the backend; already deleted or never created.
            let (id, data) = (entry.record_id.clone(), entry.data.clone());
            entry.success(id, data);
            continue;
        }

        let (operation, reason) = if deleting {
            ("delete", "Deleted")
        } else if entry.record_id.is_empty() {
            ("create", "Created")
        } else {
            ("update", "Updated")
        };

        let mut payload = Payload::from_status(entry, &record.spec.inner);
        let result = match operation {
            "create" => cached.provider.create(&mut payload).await,
            "update" => cached.provider.update(&mut payload).await,
            _ => cached.provider.delete(&mut payload).await,
        };

        match result {
            Ok(()) => {
                entry.success(payload.id, payload.data);
                metrics::record_provider_operation(&provider_type.to_string(), operation, "success");
                emit_event(
                    client,
                    &record,
                    EVENT_TYPE_NORMAL,
                    reason,
                    &format!("Record is {}d by provider {key}", operation),
                )
                .await;
            }
            Err(err) => {
                entry.error(payload.id, payload.data, &err);
                metrics::record_provider_operation(&provider_type.to_string(), operation, "error");
                emit_event(
                    client,
                    &record,
                    EVENT_TYPE_WARNING,
                    "Failed",
                    &format!("Failed to {operation} record by provider {key}"),
                )
                .await;
            }
        }
    }

    // Entries whose provider no longer matches or no longer exists: release
    // the external record best-effort, then drop the entry either way.
    let mut retained = Vec::with_capacity(status.providers.len());
    for entry in std::mem::take(&mut status.providers) {
        if checked.contains(&entry.provider) {
            retained.push(entry);
            continue;
        }
        if !entry.record_id.is_empty() {
            cleanup_unmatched(client, &record, &record.spec.inner, &entry).await;
        }
        debug!(record = %name, provider = %entry.provider, "dropping unmatched provider entry");
    }
    status.providers = retained;

    status.aggregate();
    let all_ready = status.all_ready;

    if let Err(err) = api
        .patch_status(
            &name,
            &PatchParams::default(),
            &Patch::Merge(&json!({ "status": status })),
        )
        .await
    {
        warn!(record = %name, "failed to update record status: {err}");
        emit_event(
            client,
            &record,
            EVENT_TYPE_WARNING,
            "Failed",
            "Failed to update record status",
        )
        .await;
    }

    if !all_ready {
        return Ok(Action::requeue(Duration::from_secs(
            RECORD_NOT_READY_REQUEUE_SECS,
        )));
    }

    if record_deleting {
        remove_finalizer(&api, &record).await?;
    }

    Ok(Action::await_change())
}

/// All Providers in the record's namespace plus all ClusterProviders.
async fn list_providers(client: &Client, namespace: &str) -> Result<Vec<AnyProvider>> {
    let mut providers = Vec::new();
    let namespaced = Api::<Provider>::namespaced(client.clone(), namespace)
        .list(&ListParams::default())
        .await?;
    providers.extend(namespaced.items.into_iter().map(AnyProvider::Namespaced));
    let cluster = Api::<ClusterProvider>::all(client.clone())
        .list(&ListParams::default())
        .await?;
    providers.extend(cluster.items.into_iter().map(AnyProvider::Cluster));
    Ok(providers)
}

/// Best-effort Delete for a status entry whose provider stopped matching.
///
/// Tombstoned providers (already gone) and adapters that are not ready are
/// tolerated: the external record cannot be released through them anyway and
/// the entry is removed by the caller regardless.
async fn cleanup_unmatched(
    client: &Client,
    record: &Record,
    spec: &crate::crd::RecordSpecInner,
    entry: &RecordProviderStatus,
) {
    let provider = match get_provider(client, &entry.provider).await {
        Ok(Some(provider)) => provider,
        Ok(None) => {
            debug!(provider = %entry.provider, "unmatched provider already deleted");
            return;
        }
        Err(err) => {
            warn!(provider = %entry.provider, "failed to look up unmatched provider: {err}");
            return;
        }
    };

    let Some(cached) =
        provider::cache_lookup(&provider.uid()).filter(|c| c.generation == provider.generation())
    else {
        warn!(provider = %entry.provider, "unmatched provider has no ready adapter, skipping delete");
        return;
    };

    let mut payload = Payload::from_status(entry, spec);
    match cached.provider.delete(&mut payload).await {
        Ok(()) => {
            metrics::record_provider_operation(
                &provider.spec().r#type.to_string(),
                "delete",
                "success",
            );
            emit_event(
                client,
                record,
                EVENT_TYPE_NORMAL,
                "Deleted",
                &format!("Record is deleted by provider {}", entry.provider),
            )
            .await;
        }
        Err(err) => {
            warn!(provider = %entry.provider, "failed to delete unmatched record: {err}");
            metrics::record_provider_operation(
                &provider.spec().r#type.to_string(),
                "delete",
                "error",
            );
            emit_event(
                client,
                record,
                EVENT_TYPE_WARNING,
                "Failed",
                &format!("Failed to delete record by provider {}", entry.provider),
            )
            .await;
        }
    }
}

/// Resolve a status entry's provider reference: empty namespace means a
/// ClusterProvider.
async fn get_provider(
    client: &Client,
    key: &NamespacedName,
) -> Result<Option<AnyProvider>, kube::Error> {
    if key.namespace.is_empty() {
        let provider = Api::<ClusterProvider>::all(client.clone())
            .get_opt(&key.name)
            .await?;
        Ok(provider.map(AnyProvider::Cluster))
    } else {
        let provider = Api::<Provider>::namespaced(client.clone(), &key.namespace)
            .get_opt(&key.name)
            .await?;
        Ok(provider.map(AnyProvider::Namespaced))
    }
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod record_tests;
