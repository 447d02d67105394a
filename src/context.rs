// Copyright (c) 2025 xzzpig
// SPDX-License-Identifier: MIT

//! Shared context for all controllers with reflector stores.
//!
//! All controllers receive an `Arc<Context>` containing the Kubernetes client
//! and reflector stores for every kind the pipeline watches. The stores give
//! watch mappers synchronous in-memory reverse lookups (generator by source
//! kind, watcher by tracked resource, record by provider selector) without
//! API queries, and back the template data graph's navigations.

use std::fmt::Debug;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::{Endpoints, Namespace, Node, Pod, Service};
use kube::api::Api;
use kube::runtime::reflector::{self, ObjectRef, Store};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;

use crate::crd::{
    ClusterGenerator, Generator, GeneratorObject, GeneratorResourceKind, ProviderSelector, Record,
    ResourceWatcher,
};

/// Shared context passed to all controllers.
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client for API operations
    pub client: Client,

    /// Reflector stores for all watched kinds
    pub stores: Stores,
}

/// Collection of reflector stores for cross-controller queries.
///
/// Each store is populated by a dedicated reflector task and provides
/// in-memory access to resources without API calls.
#[derive(Clone)]
pub struct Stores {
    // Pipeline CRDs with reverse-lookup queries
    pub generators: Store<Generator>,
    pub cluster_generators: Store<ClusterGenerator>,
    pub watchers: Store<ResourceWatcher>,
    pub records: Store<Record>,

    // Core kinds navigated by the template data graph
    pub namespaces: Store<Namespace>,
    pub services: Store<Service>,
    pub endpoints: Store<Endpoints>,
    pub nodes: Store<Node>,
    pub pods: Store<Pod>,
}

/// Start a reflector for one kind and return its read handle.
///
/// The driver task runs for the lifetime of the process; watch errors are
/// retried with the default backoff.
fn spawn_reflector<K>(api: Api<K>) -> Store<K>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    let (reader, writer) = reflector::store::<K>();
    let stream = reflector::reflector(writer, watcher(api, watcher::Config::default()));
    tokio::spawn(async move {
        stream
            .default_backoff()
            .applied_objects()
            .for_each(|_| futures::future::ready(()))
            .await;
    });
    reader
}

impl Stores {
    /// Start reflectors for every watched kind.
    pub fn spawn(client: &Client) -> Self {
        Self {
            generators: spawn_reflector(Api::all(client.clone())),
            cluster_generators: spawn_reflector(Api::all(client.clone())),
            watchers: spawn_reflector(Api::all(client.clone())),
            records: spawn_reflector(Api::all(client.clone())),
            namespaces: spawn_reflector(Api::all(client.clone())),
            services: spawn_reflector(Api::all(client.clone())),
            endpoints: spawn_reflector(Api::all(client.clone())),
            nodes: spawn_reflector(Api::all(client.clone())),
            pods: spawn_reflector(Api::all(client.clone())),
        }
    }

    /// Wait until every store has served its initial list.
    pub async fn wait_ready(&self) {
        let _ = self.generators.wait_until_ready().await;
        let _ = self.cluster_generators.wait_until_ready().await;
        let _ = self.watchers.wait_until_ready().await;
        let _ = self.records.wait_until_ready().await;
        let _ = self.namespaces.wait_until_ready().await;
        let _ = self.services.wait_until_ready().await;
        let _ = self.endpoints.wait_until_ready().await;
        let _ = self.nodes.wait_until_ready().await;
        let _ = self.pods.wait_until_ready().await;
    }

    /// Reverse lookup for the Generator controllers: all generators of type
    /// `G` selecting the given source kind, scoped to the source's namespace
    /// for namespaced generators.
    ///
    /// This is the `.spec.resourceKind` index.
    #[must_use]
    pub fn generators_selecting_kind<G>(
        &self,
        kind: GeneratorResourceKind,
        source_namespace: Option<&str>,
    ) -> Vec<ObjectRef<G>>
    where
        G: GeneratorObject + Stored,
    {
        G::store(self)
            .state()
            .iter()
            .filter(|g| g.generator_spec().resource_kind == kind)
            .filter(|g| match g.namespace() {
                Some(ns) => Some(ns.as_str()) == source_namespace,
                None => true,
            })
            .map(|g| ObjectRef::from_obj(&**g))
            .collect()
    }

    /// Reverse lookup for the ResourceWatcher controller: all watchers whose
    /// last rendering touched the resource with the given `Kind/ns/name` key.
    ///
    /// This is the `.status.resources` index.
    #[must_use]
    pub fn watchers_tracking(&self, index_key: &str) -> Vec<Arc<ResourceWatcher>> {
        self.watchers
            .state()
            .into_iter()
            .filter(|w| {
                w.status.as_ref().is_some_and(|status| {
                    status.resources.iter().any(|r| r.index_key() == index_key)
                })
            })
            .collect()
    }

    /// Reverse lookup for the Record controller: all records a provider's
    /// selector matches, scoped to the provider's namespace when namespaced.
    #[must_use]
    pub fn records_matching_provider(
        &self,
        selector: &ProviderSelector,
        provider_namespace: Option<&str>,
    ) -> Vec<ObjectRef<Record>> {
        self.records
            .state()
            .iter()
            .filter(|record| match provider_namespace {
                Some(ns) => record.namespace().as_deref() == Some(ns),
                None => true,
            })
            .filter(|record| selector.matches(record))
            .map(|record| ObjectRef::from_obj(&**record))
            .collect()
    }

    /// Fetch an arbitrary stored object by namespace/name.
    #[must_use]
    pub fn get<K>(store: &Store<K>, namespace: Option<&str>, name: &str) -> Option<Arc<K>>
    where
        K: Resource<DynamicType = ()> + Clone + 'static,
    {
        let mut key = ObjectRef::new(name);
        if let Some(ns) = namespace {
            key = key.within(ns);
        }
        store.get(&key)
    }
}

/// Access to the store holding objects of a given kind.
///
/// Lets code generic over [`Generator`]/[`ClusterGenerator`] reach the right
/// reflector store.
pub trait Stored: Resource<DynamicType = ()> + Clone + Sized + 'static {
    fn store(stores: &Stores) -> &Store<Self>;
}

impl Stored for Generator {
    fn store(stores: &Stores) -> &Store<Self> {
        &stores.generators
    }
}

impl Stored for ClusterGenerator {
    fn store(stores: &Stores) -> &Store<Self> {
        &stores.cluster_generators
    }
}
