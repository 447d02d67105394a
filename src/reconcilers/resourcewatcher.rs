// Copyright (c) 2025 xzzpig
// SPDX-License-Identifier: MIT

//! ResourceWatcher reconciliation: template rendering into child Records.
//!
//! Each pass resolves the owning generator's template (inline or via
//! Template/ClusterTemplate reference, cached by generation), builds the data
//! graph root for the source resource, renders, and parses the output into
//! zero or more Records. Parsed Records are stamped into the watcher's
//! namespace with an owner reference back to the watcher, then created or
//! updated in place; children the rendering no longer produces are deleted.
//!
//! `status.resources` is rebuilt from scratch every pass with exactly the set
//! of resources the rendering touched; the watch mappers use it to re-trigger
//! rendering when any of them changes. Rendering failures land in
//! `status.reason` and requeue after a minute.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context as _, Result};
use k8s_openapi::api::core::v1::{Node, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{Api, ListParams, Patch, PatchParams, PostParams};
use kube::runtime::controller::Action;
use kube::{Client, Resource, ResourceExt};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::constants::TEMPLATE_RETRY_REQUEUE_SECS;
use crate::context::Context;
use crate::crd::{
    ClusterGenerator, ClusterTemplate, Generator, GeneratorCommonSpec, GeneratorObject,
    GeneratorResourceKind, Record, ResourceWatcher, ResourceWatcherStatus, Template,
    WatchedResourceKind,
};
use crate::reconcilers::{emit_event, EVENT_TYPE_NORMAL, EVENT_TYPE_WARNING};
use crate::template::data::{self, TemplateData, TouchTracker};
use crate::template::{self, TEMPLATE_CACHE};

/// The owning generator, discriminated by owner-reference kind.
enum Owner {
    Namespaced(Generator),
    Cluster(ClusterGenerator),
}

impl Owner {
    fn spec(&self) -> &GeneratorCommonSpec {
        match self {
            Owner::Namespaced(g) => g.generator_spec(),
            Owner::Cluster(g) => g.generator_spec(),
        }
    }

    fn generation(&self) -> i64 {
        match self {
            Owner::Namespaced(g) => g.meta().generation.unwrap_or_default(),
            Owner::Cluster(g) => g.meta().generation.unwrap_or_default(),
        }
    }

    /// Template-cache key for an inline template.
    fn inline_template_key(&self) -> String {
        match self {
            Owner::Namespaced(g) => format!(
                "Generator/{}/{}",
                g.namespace().unwrap_or_default(),
                g.name_any()
            ),
            Owner::Cluster(g) => format!("Generator//{}", g.name_any()),
        }
    }
}

/// Reconcile one ResourceWatcher.
///
/// # Errors
///
/// Owner resolution and child listing errors propagate to the error policy;
/// rendering errors are absorbed into the watcher's status instead.
pub async fn reconcile_resourcewatcher(
    watcher: Arc<ResourceWatcher>,
    ctx: Arc<Context>,
) -> Result<Action> {
    let client = &ctx.client;
    let namespace = watcher.namespace().unwrap_or_default();
    let name = watcher.name_any();

    let owner = get_owner(client, &watcher).await?;

    // Children, matched by owner UID.
    let uid = watcher.meta().uid.clone().unwrap_or_default();
    let children: Vec<Record> = Api::<Record>::namespaced(client.clone(), &namespace)
        .list(&ListParams::default())
        .await?
        .items
        .into_iter()
        .filter(|record| record.owner_references().iter().any(|o| o.uid == uid))
        .collect();

    let tracker = Arc::new(TouchTracker::default());
    let result = render_children(client, &ctx, &watcher, &owner, &children, &tracker).await;

    let mut status = ResourceWatcherStatus {
        ready: result.is_ok(),
        reason: String::new(),
        resources: tracker.drain(),
    };

    let action = match result {
        Ok(()) => {
            emit_event(
                client,
                &*watcher,
                EVENT_TYPE_NORMAL,
                "Parsed",
                "Record parsed successfully",
            )
            .await;
            Action::await_change()
        }
        Err(err) => {
            warn!(watcher = %name, "rendering failed: {err:#}");
            status.reason = format!("{err:#}");
            emit_event(
                client,
                &*watcher,
                EVENT_TYPE_WARNING,
                "Failed",
                &status.reason,
            )
            .await;
            Action::requeue(Duration::from_secs(TEMPLATE_RETRY_REQUEUE_SECS))
        }
    };

    Api::<ResourceWatcher>::namespaced(client.clone(), &namespace)
        .patch_status(
            &name,
            &PatchParams::default(),
            &Patch::Merge(&json!({ "status": status })),
        )
        .await?;

    Ok(action)
}

/// Render the template and converge the child Records onto the output.
async fn render_children(
    client: &Client,
    ctx: &Context,
    watcher: &ResourceWatcher,
    owner: &Owner,
    children: &[Record],
    tracker: &Arc<TouchTracker>,
) -> Result<()> {
    let namespace = watcher.namespace().unwrap_or_default();

    let (env, template_key) = resolve_template(client, watcher, owner, tracker).await?;
    let root = build_root(client, ctx, watcher, owner.spec().resource_kind, tracker).await?;

    let output = template::render(&env, &template_key, root).context("failed to render template")?;
    let records = template::parse_records(&output).context("failed to parse template output")?;
    debug!(watcher = %watcher.name_any(), count = records.len(), "rendered records");

    let api: Api<Record> = Api::namespaced(client.clone(), &namespace);
    let mut checked: HashSet<String> = HashSet::new();

    for mut record in records {
        record.metadata.namespace = Some(namespace.clone());
        record.metadata.owner_references = Some(vec![watcher_owner_reference(watcher)]);
        let record_name = record.name_any();

        let (applied, old_version) = match children.iter().find(|c| c.name_any() == record_name) {
            Some(existing) => {
                let old_version = existing.resource_version().unwrap_or_default();
                let mut updated = existing.clone();
                updated.metadata.labels = record.metadata.labels.clone();
                updated.metadata.annotations = record.metadata.annotations.clone();
                updated.metadata.owner_references = record.metadata.owner_references.clone();
                updated.spec = record.spec.clone();
                let applied = api
                    .replace(&record_name, &PostParams::default(), &updated)
                    .await?;
                (applied, old_version)
            }
            None => {
                let applied = api.create(&PostParams::default(), &record).await?;
                (applied, String::new())
            }
        };
        checked.insert(record_name);

        if old_version != applied.resource_version().unwrap_or_default() {
            emit_event(
                client,
                &applied,
                EVENT_TYPE_NORMAL,
                "Modify",
                &format!("Record modified by ResourceWatcher {}", watcher.name_any()),
            )
            .await;
        }
    }

    for child in children {
        if checked.contains(&child.name_any()) {
            continue;
        }
        info!(
            watcher = %watcher.name_any(),
            record = %child.name_any(),
            "deleting record no longer rendered"
        );
        api.delete(&child.name_any(), &Default::default()).await?;
    }

    Ok(())
}

/// Resolve the template to render: inline from the generator spec, or via
/// `templateRef` against Template (namespaced owner) / ClusterTemplate
/// (cluster owner). The lookup itself is recorded as a touched resource.
async fn resolve_template(
    client: &Client,
    watcher: &ResourceWatcher,
    owner: &Owner,
    tracker: &Arc<TouchTracker>,
) -> Result<(Arc<minijinja::Environment<'static>>, String)> {
    let namespace = watcher.namespace().unwrap_or_default();
    let spec = owner.spec();

    if !spec.template.is_empty() {
        let key = owner.inline_template_key();
        let env = TEMPLATE_CACHE.get(&key, owner.generation(), &spec.template)?;
        return Ok((env, key));
    }

    if spec.template_ref.is_empty() {
        bail!("no template specified");
    }

    match owner {
        Owner::Namespaced(_) => {
            let template = Api::<Template>::namespaced(client.clone(), &namespace)
                .get(&spec.template_ref)
                .await?;
            let key = format!("Template/{}/{}", namespace, template.name_any());
            let env = TEMPLATE_CACHE.get(
                &key,
                template.meta().generation.unwrap_or_default(),
                &template.spec.template,
            )?;
            tracker.record(WatchedResourceKind::Template, &namespace, &spec.template_ref);
            Ok((env, key))
        }
        Owner::Cluster(_) => {
            let template = Api::<ClusterTemplate>::all(client.clone())
                .get(&spec.template_ref)
                .await?;
            let key = format!("ClusterTemplate/{}", template.name_any());
            let env = TEMPLATE_CACHE.get(
                &key,
                template.meta().generation.unwrap_or_default(),
                &template.spec.template,
            )?;
            tracker.record(WatchedResourceKind::ClusterTemplate, "", &spec.template_ref);
            Ok((env, key))
        }
    }
}

/// Fetch the source resource and wrap it in the typed data-graph root.
async fn build_root(
    client: &Client,
    ctx: &Context,
    watcher: &ResourceWatcher,
    kind: GeneratorResourceKind,
    tracker: &Arc<TouchTracker>,
) -> Result<minijinja::value::Value> {
    let source = &watcher.spec.resource;
    let base = TemplateData::new(
        ctx.stores.clone(),
        tracker.clone(),
        watcher.namespace().unwrap_or_default(),
    );

    let root = match kind {
        GeneratorResourceKind::Ingress => {
            let ingress = Api::<Ingress>::namespaced(client.clone(), &source.namespace)
                .get(&source.name)
                .await?;
            data::ingress_root(base, ingress)
        }
        GeneratorResourceKind::Record => {
            let record = Api::<Record>::namespaced(client.clone(), &source.namespace)
                .get(&source.name)
                .await?;
            data::record_root(base, record)
        }
        GeneratorResourceKind::Node => {
            let node = Api::<Node>::all(client.clone()).get(&source.name).await?;
            data::node_root(base, node)
        }
        GeneratorResourceKind::Service => {
            let service = Api::<Service>::namespaced(client.clone(), &source.namespace)
                .get(&source.name)
                .await?;
            data::service_root(base, service)
        }
    };
    Ok(root)
}

/// Locate the owning generator through the watcher's owner references.
async fn get_owner(client: &Client, watcher: &ResourceWatcher) -> Result<Owner> {
    let namespace = watcher.namespace().unwrap_or_default();

    for owner_ref in watcher.owner_references() {
        match owner_ref.kind.as_str() {
            "Generator" => {
                let generator = Api::<Generator>::namespaced(client.clone(), &namespace)
                    .get(&owner_ref.name)
                    .await?;
                return Ok(Owner::Namespaced(generator));
            }
            "ClusterGenerator" => {
                let generator = Api::<ClusterGenerator>::all(client.clone())
                    .get(&owner_ref.name)
                    .await?;
                return Ok(Owner::Cluster(generator));
            }
            _ => continue,
        }
    }

    Err(anyhow!(
        "resource watcher {}/{} has no generator owner",
        namespace,
        watcher.name_any()
    ))
}

/// Controller owner reference pointing at the watcher.
fn watcher_owner_reference(watcher: &ResourceWatcher) -> OwnerReference {
    OwnerReference {
        api_version: ResourceWatcher::api_version(&()).to_string(),
        kind: ResourceWatcher::kind(&()).to_string(),
        name: watcher.name_any(),
        uid: watcher.meta().uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

#[cfg(test)]
#[path = "resourcewatcher_tests.rs"]
mod resourcewatcher_tests;
