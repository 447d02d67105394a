// Copyright (c) 2025 xzzpig
// SPDX-License-Identifier: MIT

//! Provider / ClusterProvider reconciliation.
//!
//! The loop validates the backend configuration by constructing an adapter
//! through the registry and publishes it into the process-wide cache under
//! the Provider's UID, tagged with the observed generation. The Record loop
//! only talks to a backend through a cache entry whose generation matches, so
//! publishing a new entry is what makes a spec change take effect.
//!
//! Deletion is held by the finalizer until no Record in the provider's scope
//! still has a non-empty external record id for it. While held, the cache
//! entry is kept fresh so the Record loops can still issue Deletes, and the
//! provider requeues every second.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::Client;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::constants::{PROVIDER_DELETE_HOLD_SECS, PROVIDER_RETRY_REQUEUE_SECS};
use crate::context::Context;
use crate::crd::{NamespacedName, ProviderObject, ProviderStatus, Record};
use crate::provider::{self, FactoryInput};
use crate::reconcilers::{ensure_finalizer, remove_finalizer};

/// Reconcile one Provider or ClusterProvider.
///
/// # Errors
///
/// Returns an error when cluster reads or the finalizer patches fail;
/// adapter construction failures land in `status.reason` and requeue.
pub async fn reconcile_provider<P>(object: Arc<P>, ctx: Arc<Context>) -> Result<Action>
where
    P: ProviderObject,
{
    let client = &ctx.client;
    let namespace = object.namespace();
    let name = object.name_any();
    let api = P::api_scoped(client.clone(), namespace.as_deref());

    if ensure_finalizer(&api, &*object).await? {
        return Ok(Action::requeue(Duration::ZERO));
    }

    let uid = object.meta().uid.clone().unwrap_or_default();
    let generation = object.meta().generation.unwrap_or_default();

    if object.meta().deletion_timestamp.is_some() {
        return hold_deletion(client, &api, &object, &uid, generation).await;
    }

    // Cache entry fresh and status already ready: a no-op event (status or
    // label change) reached us, the adapter stays as published.
    let cache_fresh = provider::cache_lookup(&uid).is_some_and(|c| c.generation == generation);
    if cache_fresh && object.provider_status().is_some_and(|s| s.ready) {
        debug!(provider = %name, "adapter cache fresh, nothing to do");
        return Ok(Action::await_change());
    }

    match build_adapter(client, &object, &uid, generation).await {
        Ok(()) => {
            info!(provider = %name, "adapter published");
            patch_status(&api, &name, true, String::new()).await?;
            Ok(Action::await_change())
        }
        Err(err) => {
            warn!(provider = %name, "adapter construction failed: {err}");
            patch_status(&api, &name, false, err.to_string()).await?;
            Ok(Action::requeue(Duration::from_secs(
                PROVIDER_RETRY_REQUEUE_SECS,
            )))
        }
    }
}

/// Deletion path: release the finalizer only when no Record in scope still
/// holds an external record id for this provider; otherwise keep the adapter
/// available for the Record loops' Deletes and check again in a second.
async fn hold_deletion<P>(
    client: &Client,
    api: &Api<P>,
    object: &Arc<P>,
    uid: &str,
    generation: i64,
) -> Result<Action>
where
    P: ProviderObject,
{
    let name = object.name_any();
    let key = object.provider_key();

    if !records_hold_provider(client, &key).await? {
        info!(provider = %name, "no record holds external state, releasing finalizer");
        remove_finalizer(api, &**object).await?;
        return Ok(Action::await_change());
    }

    let cache_fresh = provider::cache_lookup(uid).is_some_and(|c| c.generation == generation);
    if !cache_fresh {
        if let Err(err) = build_adapter(client, object, uid, generation).await {
            warn!(provider = %name, "adapter rebuild during deletion failed: {err}");
            patch_status(api, &name, false, err.to_string()).await?;
            return Ok(Action::requeue(Duration::from_secs(
                PROVIDER_DELETE_HOLD_SECS,
            )));
        }
    }

    patch_status(api, &name, false, "waiting for Records".to_string()).await?;
    Ok(Action::requeue(Duration::from_secs(PROVIDER_DELETE_HOLD_SECS)))
}

/// Whether any Record in the provider's scope still carries a non-empty
/// external record id for it.
///
/// This realizes the `.status.providers` reverse index as a live filtered
/// list so the answer reflects status writes the store has not seen yet.
async fn records_hold_provider(client: &Client, key: &NamespacedName) -> Result<bool> {
    let api: Api<Record> = if key.namespace.is_empty() {
        Api::all(client.clone())
    } else {
        Api::namespaced(client.clone(), &key.namespace)
    };

    let records = api.list(&ListParams::default()).await?;
    Ok(records.items.iter().any(|record| {
        record.status.as_ref().is_some_and(|status| {
            status
                .providers
                .iter()
                .any(|entry| entry.provider == *key && !entry.record_id.is_empty())
        })
    }))
}

/// Construct the adapter through the registry and publish it into the cache.
async fn build_adapter<P>(
    client: &Client,
    object: &Arc<P>,
    uid: &str,
    generation: i64,
) -> Result<(), provider::ProviderError>
where
    P: ProviderObject,
{
    let adapter = provider::new_provider(FactoryInput {
        client: client.clone(),
        name: object.name_any(),
        namespace: object.namespace(),
        spec: object.provider_spec().clone(),
    })
    .await?;
    provider::cache_store(uid, adapter, generation);
    Ok(())
}

async fn patch_status<P>(api: &Api<P>, name: &str, ready: bool, reason: String) -> Result<()>
where
    P: ProviderObject,
{
    let status = ProviderStatus { ready, reason };
    api.patch_status(
        name,
        &PatchParams::default(),
        &Patch::Merge(&json!({ "status": status })),
    )
    .await?;
    Ok(())
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod provider_tests;
