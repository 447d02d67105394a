// Copyright (c) 2025 xzzpig
// SPDX-License-Identifier: MIT

//! The lazy resource data graph templates render against.
//!
//! Each rendering gets a typed root object for its source kind. Navigations
//! are attribute reads (`ingress`, `namespace`, `endpoints`, `nodes`, `pods`,
//! `node`, `ready`, `record`, `service`) or method calls where parameterized
//! (`service(rule_idx, path_idx)` on an ingress). Unknown attributes fall
//! through to the wrapped resource's serialized fields under their Kubernetes
//! camelCase names, so `ingress.spec.rules` works the way `kubectl get -o
//! yaml` reads.
//!
//! Every navigation records the touched (kind, namespace, name) into the
//! shared [`TouchTracker`]; the ResourceWatcher drains it into
//! `status.resources` after rendering, which is what makes re-rendering
//! reactive. The recording layer is invisible to templates.
//!
//! Graph reads are served from the reflector stores, which are fed by the
//! same watch streams that trigger re-rendering.

use std::fmt;
use std::sync::{Arc, Mutex};

use k8s_openapi::api::core::v1::{Endpoints, Node, Pod, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;
use minijinja::value::{Object, Value};
use minijinja::{Error, ErrorKind, State};

use crate::context::Stores;
use crate::crd::{Record, WatchedResource, WatchedResourceKind};

/// Graph nodes hold a `Stores` handle, which has no useful Debug output;
/// minijinja only needs the type name.
macro_rules! impl_debug_as_type_name {
    ($($ty:ty),+ $(,)?) => {
        $(impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(std::any::type_name::<Self>())
            }
        })+
    };
}

impl_debug_as_type_name!(
    TemplateData,
    IngressTemplateData,
    RecordTemplateData,
    NodeTemplateData,
    ServiceTemplateData,
    IngressData,
    ServiceData,
    EndpointsData,
    PodData,
    NodeData,
);

/// Collects every resource a rendering touches, deduplicated by
/// (kind, namespace, name).
#[derive(Default)]
pub struct TouchTracker {
    touched: Mutex<Vec<WatchedResource>>,
}

impl TouchTracker {
    pub fn record(&self, kind: WatchedResourceKind, namespace: &str, name: &str) {
        let resource = WatchedResource::new(kind, namespace, name);
        let mut touched = self.touched.lock().expect("touch tracker poisoned");
        if !touched.contains(&resource) {
            touched.push(resource);
        }
    }

    /// Take the recorded set, leaving the tracker empty.
    #[must_use]
    pub fn drain(&self) -> Vec<WatchedResource> {
        std::mem::take(&mut *self.touched.lock().expect("touch tracker poisoned"))
    }
}

/// State shared by every node of one rendering's data graph.
#[derive(Clone)]
pub struct TemplateData {
    stores: Stores,
    tracker: Arc<TouchTracker>,
    /// Namespace of the rendering ResourceWatcher.
    namespace: String,
}

impl TemplateData {
    #[must_use]
    pub fn new(stores: Stores, tracker: Arc<TouchTracker>, namespace: impl Into<String>) -> Self {
        Self {
            stores,
            tracker,
            namespace: namespace.into(),
        }
    }

    /// The watcher's Namespace object; recorded as touched.
    fn get_namespace(&self) -> Option<Value> {
        let ns = Stores::get(&self.stores.namespaces, None, &self.namespace)?;
        self.tracker
            .record(WatchedResourceKind::Namespace, "", &ns.name_any());
        Some(Value::from_serialize(&*ns))
    }
}

fn missing(kind: &str, namespace: &str, name: &str) -> Error {
    Error::new(
        ErrorKind::InvalidOperation,
        format!("{kind} {namespace}/{name} not found"),
    )
}

// ============================================================================
// Roots, one per source kind
// ============================================================================

/// Root for `resourceKind: Ingress`.
pub struct IngressTemplateData {
    data: TemplateData,
    ingress: Arc<Ingress>,
}

impl Object for IngressTemplateData {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        match key.as_str()? {
            "namespace" => self.data.get_namespace(),
            "ingress" => {
                self.data.tracker.record(
                    WatchedResourceKind::Ingress,
                    &self.ingress.namespace().unwrap_or_default(),
                    &self.ingress.name_any(),
                );
                Some(Value::from_object(IngressData::new(
                    self.data.clone(),
                    self.ingress.clone(),
                )))
            }
            _ => None,
        }
    }
}

/// Root for `resourceKind: Record`.
pub struct RecordTemplateData {
    data: TemplateData,
    record: Arc<Record>,
}

impl Object for RecordTemplateData {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        match key.as_str()? {
            "namespace" => self.data.get_namespace(),
            "record" => {
                self.data.tracker.record(
                    WatchedResourceKind::Record,
                    &self.record.namespace().unwrap_or_default(),
                    &self.record.name_any(),
                );
                Some(Value::from_serialize(&*self.record))
            }
            _ => None,
        }
    }
}

/// Root for `resourceKind: Node`.
pub struct NodeTemplateData {
    data: TemplateData,
    node: Arc<Node>,
}

impl Object for NodeTemplateData {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        match key.as_str()? {
            "namespace" => self.data.get_namespace(),
            "node" => {
                self.data
                    .tracker
                    .record(WatchedResourceKind::Node, "", &self.node.name_any());
                Some(Value::from_object(NodeData::new(
                    self.data.clone(),
                    self.node.clone(),
                )))
            }
            _ => None,
        }
    }
}

/// Root for `resourceKind: Service`.
pub struct ServiceTemplateData {
    data: TemplateData,
    service: Arc<Service>,
}

impl Object for ServiceTemplateData {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        match key.as_str()? {
            "namespace" => self.data.get_namespace(),
            "service" => {
                self.data.tracker.record(
                    WatchedResourceKind::Service,
                    &self.service.namespace().unwrap_or_default(),
                    &self.service.name_any(),
                );
                Some(Value::from_object(ServiceData::new(
                    self.data.clone(),
                    self.service.clone(),
                )))
            }
            _ => None,
        }
    }
}

#[must_use]
pub fn ingress_root(data: TemplateData, ingress: Ingress) -> Value {
    Value::from_object(IngressTemplateData {
        data,
        ingress: Arc::new(ingress),
    })
}

#[must_use]
pub fn record_root(data: TemplateData, record: Record) -> Value {
    Value::from_object(RecordTemplateData {
        data,
        record: Arc::new(record),
    })
}

#[must_use]
pub fn node_root(data: TemplateData, node: Node) -> Value {
    Value::from_object(NodeTemplateData {
        data,
        node: Arc::new(node),
    })
}

#[must_use]
pub fn service_root(data: TemplateData, service: Service) -> Value {
    Value::from_object(ServiceTemplateData {
        data,
        service: Arc::new(service),
    })
}

// ============================================================================
// Graph nodes
// ============================================================================

/// An Ingress with navigation into its backend Services.
pub struct IngressData {
    data: TemplateData,
    ingress: Arc<Ingress>,
    doc: Value,
}

impl IngressData {
    fn new(data: TemplateData, ingress: Arc<Ingress>) -> Self {
        let doc = Value::from_serialize(&*ingress);
        Self { data, ingress, doc }
    }
}

impl Object for IngressData {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        attr(&self.doc, key)
    }

    fn call_method(
        self: &Arc<Self>,
        _state: &State,
        method: &str,
        args: &[Value],
    ) -> Result<Value, Error> {
        if method != "service" {
            return Err(Error::new(
                ErrorKind::UnknownMethod,
                format!("ingress has no method {method}"),
            ));
        }
        let (rule_index, path_index): (usize, usize) = minijinja::value::from_args(args)?;

        let namespace = self.ingress.namespace().unwrap_or_default();
        let service_name = self
            .ingress
            .spec
            .as_ref()
            .and_then(|spec| spec.rules.as_ref())
            .and_then(|rules| rules.get(rule_index))
            .and_then(|rule| rule.http.as_ref())
            .and_then(|http| http.paths.get(path_index))
            .and_then(|path| path.backend.service.as_ref())
            .map(|service| service.name.clone())
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::InvalidOperation,
                    format!("ingress has no service backend at rule {rule_index} path {path_index}"),
                )
            })?;

        let service = Stores::get(&self.data.stores.services, Some(&namespace), &service_name)
            .ok_or_else(|| missing("Service", &namespace, &service_name))?;
        self.data
            .tracker
            .record(WatchedResourceKind::Service, &namespace, &service_name);
        Ok(Value::from_object(ServiceData::new(
            self.data.clone(),
            service,
        )))
    }
}

/// A Service with navigation into its Endpoints.
pub struct ServiceData {
    data: TemplateData,
    service: Arc<Service>,
    doc: Value,
}

impl ServiceData {
    fn new(data: TemplateData, service: Arc<Service>) -> Self {
        let doc = Value::from_serialize(&*service);
        Self { data, service, doc }
    }
}

impl Object for ServiceData {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        if key.as_str()? == "endpoints" {
            let namespace = self.service.namespace().unwrap_or_default();
            let name = self.service.name_any();
            let endpoints = Stores::get(&self.data.stores.endpoints, Some(&namespace), &name)?;
            self.data
                .tracker
                .record(WatchedResourceKind::Endpoints, &namespace, &name);
            return Some(Value::from_object(EndpointsData::new(
                self.data.clone(),
                endpoints,
            )));
        }
        attr(&self.doc, key)
    }
}

/// Endpoints with navigation onto the backing Nodes and Pods.
pub struct EndpointsData {
    data: TemplateData,
    endpoints: Arc<Endpoints>,
    doc: Value,
}

impl EndpointsData {
    fn new(data: TemplateData, endpoints: Arc<Endpoints>) -> Self {
        let doc = Value::from_serialize(&*endpoints);
        Self {
            data,
            endpoints,
            doc,
        }
    }

    /// Nodes referenced by any ready address, deduplicated by name.
    fn nodes(&self) -> Option<Value> {
        let mut seen = Vec::new();
        let mut nodes = Vec::new();
        for subset in self.endpoints.subsets.as_deref().unwrap_or_default() {
            for address in subset.addresses.as_deref().unwrap_or_default() {
                let Some(node_name) = address.node_name.as_deref() else {
                    continue;
                };
                if seen.contains(&node_name.to_string()) {
                    continue;
                }
                seen.push(node_name.to_string());
                let node = Stores::get(&self.data.stores.nodes, None, node_name)?;
                self.data
                    .tracker
                    .record(WatchedResourceKind::Node, "", node_name);
                nodes.push(Value::from_object(NodeData::new(self.data.clone(), node)));
            }
        }
        Some(Value::from(nodes))
    }

    /// Pods referenced by any ready address, deduplicated by target UID.
    fn pods(&self) -> Option<Value> {
        let namespace = self.endpoints.namespace().unwrap_or_default();
        let mut seen = Vec::new();
        let mut pods = Vec::new();
        for subset in self.endpoints.subsets.as_deref().unwrap_or_default() {
            for address in subset.addresses.as_deref().unwrap_or_default() {
                let Some(target) = address.target_ref.as_ref() else {
                    continue;
                };
                if target.kind.as_deref() != Some("Pod") {
                    continue;
                }
                let uid = target.uid.clone().unwrap_or_default();
                if seen.contains(&uid) {
                    continue;
                }
                seen.push(uid);
                let name = target.name.as_deref().unwrap_or_default();
                let pod = Stores::get(&self.data.stores.pods, Some(&namespace), name)?;
                self.data
                    .tracker
                    .record(WatchedResourceKind::Pod, &namespace, name);
                pods.push(Value::from_object(PodData::new(self.data.clone(), pod)));
            }
        }
        Some(Value::from(pods))
    }
}

impl Object for EndpointsData {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        match key.as_str()? {
            "nodes" => self.nodes(),
            "pods" => self.pods(),
            _ => attr(&self.doc, key),
        }
    }
}

/// A Pod with navigation onto its Node.
pub struct PodData {
    data: TemplateData,
    pod: Arc<Pod>,
    doc: Value,
}

impl PodData {
    fn new(data: TemplateData, pod: Arc<Pod>) -> Self {
        let doc = Value::from_serialize(&*pod);
        Self { data, pod, doc }
    }
}

impl Object for PodData {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        if key.as_str()? == "node" {
            let node_name = self
                .pod
                .spec
                .as_ref()
                .and_then(|spec| spec.node_name.as_deref())
                .unwrap_or_default();
            if node_name.is_empty() {
                return Some(Value::from(()));
            }
            let node = Stores::get(&self.data.stores.nodes, None, node_name)?;
            self.data
                .tracker
                .record(WatchedResourceKind::Node, "", node_name);
            return Some(Value::from_object(NodeData::new(self.data.clone(), node)));
        }
        attr(&self.doc, key)
    }
}

/// A Node with the derived `ready` flag.
pub struct NodeData {
    node: Arc<Node>,
    doc: Value,
}

impl NodeData {
    fn new(_data: TemplateData, node: Arc<Node>) -> Self {
        let doc = Value::from_serialize(&*node);
        Self { node, doc }
    }

    /// Whether the `NodeReady` condition reports True.
    fn ready(&self) -> bool {
        self.node
            .status
            .as_ref()
            .and_then(|status| status.conditions.as_ref())
            .is_some_and(|conditions| {
                conditions
                    .iter()
                    .any(|c| c.type_ == "Ready" && c.status == "True")
            })
    }
}

impl Object for NodeData {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        match key.as_str()? {
            "ready" => Some(Value::from(self.ready())),
            _ => attr(&self.doc, key),
        }
    }
}

/// Delegate an attribute read to the wrapped resource's serialized form.
fn attr(doc: &Value, key: &Value) -> Option<Value> {
    let value = doc.get_item(key).ok()?;
    if value.is_undefined() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
#[path = "data_tests.rs"]
mod data_tests;
