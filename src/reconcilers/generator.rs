// Copyright (c) 2025 xzzpig
// SPDX-License-Identifier: MIT

//! Generator / ClusterGenerator reconciliation.
//!
//! A generator tracks the set of source resources (Ingresses or Records)
//! matching its label selector in `status.resources`, stamped with the
//! `appliedGeneration` the match ran against. The loop has two regimes:
//!
//! 1. `generation != appliedGeneration`: re-enumerate the match set from a
//!    kind-scoped list, replace `status.resources`, stamp the generation and
//!    requeue.
//! 2. Steady state: per matched source, ensure an owned ResourceWatcher
//!    exists; drop sources that disappeared; force a full rematch (by
//!    resetting `appliedGeneration` to 0) when a source stopped matching or a
//!    new one started to. Owned watchers whose source fell out of the set are
//!    deleted.
//!
//! Node and Service sources are rendering-path kinds; selecting them is
//! rejected as an unknown kind.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{Api, ListParams, ObjectMeta, Patch, PatchParams, PostParams};
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use serde_json::json;
use tracing::{debug, info};

use crate::constants::DEFAULT_WATCHER_GENERATE_NAME;
use crate::context::Context;
use crate::crd::{
    GeneratorCommonSpec, GeneratorObject, GeneratorResourceKind, GeneratorStatus, NamespacedName,
    Record, ResourceWatcher, ResourceWatcherSpec,
};
use crate::selector::selector_string;

/// Reconcile one Generator or ClusterGenerator.
///
/// # Errors
///
/// Returns an error when a cluster read or write fails; the controller's
/// error policy requeues.
pub async fn reconcile_generator<G>(generator: Arc<G>, ctx: Arc<Context>) -> Result<Action>
where
    G: GeneratorObject,
{
    let client = &ctx.client;
    let namespace = generator.namespace();
    let name = generator.name_any();
    let api = G::api_scoped(client.clone(), namespace.as_deref());
    let spec = generator.generator_spec();
    let generation = generator.meta().generation.unwrap_or_default();
    let mut status = generator.generator_status().cloned().unwrap_or_default();

    // Spec changed since the last full pass: rebuild the match set.
    if generation != status.applied_generation {
        debug!(
            generator = %name,
            generation,
            applied = status.applied_generation,
            "re-matching source resources"
        );
        status.resources = list_sources(client, spec, namespace.as_deref()).await?;
        return update_applied_generation(&api, &name, status, generation).await;
    }

    // A source that started matching after the last pass forces a rematch.
    let current = list_sources(client, spec, namespace.as_deref()).await?;
    for source in &current {
        if !status.resources.contains(source) {
            info!(generator = %name, source = %source, "new matching source, forcing rematch");
            return update_applied_generation(&api, &name, status, 0).await;
        }
    }

    // Owned watchers, cluster-wide: a ClusterGenerator's watchers live in
    // their sources' namespaces.
    let uid = generator.meta().uid.clone().unwrap_or_default();
    let owned: Vec<ResourceWatcher> = Api::<ResourceWatcher>::all(client.clone())
        .list(&ListParams::default())
        .await?
        .items
        .into_iter()
        .filter(|watcher| {
            watcher
                .owner_references()
                .iter()
                .any(|owner| owner.uid == uid)
        })
        .collect();

    let mut checked: HashSet<String> = HashSet::new();

    for resource in status.resources.clone().iter() {
        let Some(labels) = get_source_labels(client, spec.resource_kind, resource).await? else {
            // Source is gone; drop it from the match set and let the status
            // change re-trigger us.
            info!(generator = %name, source = %resource, "matched source disappeared");
            status.remove_resource(resource);
            patch_status(&api, &name, &status).await?;
            return Ok(Action::await_change());
        };

        if !spec.matches(&labels) {
            info!(generator = %name, source = %resource, "source no longer matches, forcing rematch");
            return update_applied_generation(&api, &name, status, 0).await;
        }

        match owned.iter().find(|w| w.spec.resource == *resource) {
            Some(watcher) => {
                checked.insert(watcher.name_any());
            }
            None => {
                create_watcher(client, &*generator, spec, resource).await?;
            }
        }
    }

    // Watchers whose source dropped out of the match set.
    for watcher in &owned {
        if checked.contains(&watcher.name_any()) {
            continue;
        }
        let watcher_namespace = watcher.namespace().unwrap_or_default();
        info!(
            generator = %name,
            watcher = %watcher.name_any(),
            "deleting watcher for unmatched source"
        );
        Api::<ResourceWatcher>::namespaced(client.clone(), &watcher_namespace)
            .delete(&watcher.name_any(), &Default::default())
            .await?;
    }

    Ok(Action::await_change())
}

/// Stamp `appliedGeneration` and requeue immediately so the next pass runs
/// against the updated status.
async fn update_applied_generation<G>(
    api: &Api<G>,
    name: &str,
    mut status: GeneratorStatus,
    generation: i64,
) -> Result<Action>
where
    G: GeneratorObject,
{
    status.applied_generation = generation;
    patch_status(api, name, &status).await?;
    Ok(Action::requeue(Duration::ZERO))
}

async fn patch_status<G>(api: &Api<G>, name: &str, status: &GeneratorStatus) -> Result<()>
where
    G: GeneratorObject,
{
    api.patch_status(
        name,
        &PatchParams::default(),
        &Patch::Merge(&json!({ "status": status })),
    )
    .await?;
    Ok(())
}

/// Enumerate sources of the generator's kind matching its selector.
///
/// Namespaced generators list within their own namespace, cluster generators
/// across all namespaces.
async fn list_sources(
    client: &Client,
    spec: &GeneratorCommonSpec,
    namespace: Option<&str>,
) -> Result<Vec<NamespacedName>> {
    let mut params = ListParams::default();
    if let Some(labels) = selector_string(&spec.selector) {
        params = params.labels(&labels);
    }

    let sources = match spec.resource_kind {
        GeneratorResourceKind::Ingress => {
            let api: Api<Ingress> = match namespace {
                Some(ns) => Api::namespaced(client.clone(), ns),
                None => Api::all(client.clone()),
            };
            api.list(&params)
                .await?
                .items
                .iter()
                .map(|item| {
                    NamespacedName::new(item.namespace().unwrap_or_default(), item.name_any())
                })
                .collect()
        }
        GeneratorResourceKind::Record => {
            let api: Api<Record> = match namespace {
                Some(ns) => Api::namespaced(client.clone(), ns),
                None => Api::all(client.clone()),
            };
            api.list(&params)
                .await?
                .items
                .iter()
                .map(|item| {
                    NamespacedName::new(item.namespace().unwrap_or_default(), item.name_any())
                })
                .collect()
        }
        kind => bail!("unknown kind {kind}"),
    };

    Ok(sources)
}

/// Fetch one source's labels, or `None` when it no longer exists.
async fn get_source_labels(
    client: &Client,
    kind: GeneratorResourceKind,
    resource: &NamespacedName,
) -> Result<Option<BTreeMap<String, String>>> {
    let labels = match kind {
        GeneratorResourceKind::Ingress => {
            let api: Api<Ingress> = Api::namespaced(client.clone(), &resource.namespace);
            api.get_opt(&resource.name)
                .await?
                .map(|item| item.labels().clone())
        }
        GeneratorResourceKind::Record => {
            let api: Api<Record> = Api::namespaced(client.clone(), &resource.namespace);
            api.get_opt(&resource.name)
                .await?
                .map(|item| item.labels().clone())
        }
        kind => bail!("unknown kind {kind}"),
    };
    Ok(labels)
}

/// Create the ResourceWatcher for one matched source, owner-referenced to its
/// generator.
async fn create_watcher<G>(
    client: &Client,
    generator: &G,
    spec: &GeneratorCommonSpec,
    resource: &NamespacedName,
) -> Result<()>
where
    G: GeneratorObject,
{
    let generate_name = if spec.watcher_generate_name.is_empty() {
        DEFAULT_WATCHER_GENERATE_NAME
    } else {
        &spec.watcher_generate_name
    };

    let watcher = ResourceWatcher {
        metadata: ObjectMeta {
            generate_name: Some(generate_name.to_string()),
            namespace: Some(resource.namespace.clone()),
            owner_references: Some(vec![controller_owner_reference(generator)]),
            ..Default::default()
        },
        spec: ResourceWatcherSpec {
            resource: resource.clone(),
        },
        status: None,
    };

    info!(
        generator = %generator.name_any(),
        source = %resource,
        "creating resource watcher"
    );
    Api::<ResourceWatcher>::namespaced(client.clone(), &resource.namespace)
        .create(&PostParams::default(), &watcher)
        .await?;
    Ok(())
}

/// Controller owner reference pointing at the generator.
fn controller_owner_reference<G>(generator: &G) -> OwnerReference
where
    G: GeneratorObject,
{
    OwnerReference {
        api_version: G::api_version(&()).to_string(),
        kind: G::kind(&()).to_string(),
        name: generator.name_any(),
        uid: generator.meta().uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

#[cfg(test)]
#[path = "generator_tests.rs"]
mod generator_tests;
