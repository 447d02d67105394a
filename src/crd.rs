// Copyright (c) 2025 xzzpig
// SPDX-License-Identifier: MIT

//! Custom Resource Definitions for the DNS manager.
//!
//! This module defines all Kubernetes Custom Resource Definitions used to turn
//! cluster resources into DNS records at external providers.
//!
//! # Resource Types
//!
//! ## Generation pipeline
//!
//! - [`Generator`] / [`ClusterGenerator`] - select source resources by label and
//!   materialize one [`ResourceWatcher`] per match
//! - [`ResourceWatcher`] - renders a template against its source resource and
//!   produces child [`Record`]s
//! - [`Template`] / [`ClusterTemplate`] - named, reusable template bodies
//!
//! ## Synchronization
//!
//! - [`Record`] - one desired DNS record, fanned out to every matching provider
//! - [`Provider`] / [`ClusterProvider`] - a handle to an external DNS backend
//!   (Aliyun, Cloudflare, AdGuard Home, or a user-supplied Job)
//!
//! The namespaced/cluster-scoped twins share a flattened `*CommonSpec` struct
//! and are abstracted over by the [`GeneratorObject`] and [`ProviderObject`]
//! traits so reconcilers are written once for both variants.

use std::collections::BTreeMap;
use std::fmt;

use kube::api::Api;
use kube::{Client, CustomResource, Resource, ResourceExt};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Label selector to match Kubernetes resources.
///
/// A label selector is a label query over a set of resources. The result of
/// matchLabels and matchExpressions are `ANDed`. An empty label selector
/// matches all objects.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    /// Map of {key,value} pairs. All entries must be satisfied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_labels: Option<BTreeMap<String, String>>,

    /// List of label selector requirements. All requirements must be satisfied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_expressions: Option<Vec<LabelSelectorRequirement>>,
}

impl LabelSelector {
    /// Whether the selector places no constraints at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.match_labels.as_ref().is_none_or(BTreeMap::is_empty)
            && self.match_expressions.as_ref().is_none_or(Vec::is_empty)
    }
}

/// A label selector requirement: a key, an operator and a set of values.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelectorRequirement {
    /// The label key that the selector applies to.
    pub key: String,

    /// Valid operators are In, `NotIn`, Exists and `DoesNotExist`.
    pub operator: String,

    /// Values for In / `NotIn`; must be empty for Exists / `DoesNotExist`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
}

/// A stable (namespace, name) reference to another cluster object.
///
/// Namespace is empty for cluster-scoped referents.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct NamespacedName {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
}

impl NamespacedName {
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

impl fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

// ============================================================================
// Shared enums
// ============================================================================

/// DNS record type.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum RecordType {
    A,
    AAAA,
    CNAME,
    TXT,
    MX,
    SRV,
    NS,
    CAA,
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecordType::A => "A",
            RecordType::AAAA => "AAAA",
            RecordType::CNAME => "CNAME",
            RecordType::TXT => "TXT",
            RecordType::MX => "MX",
            RecordType::SRV => "SRV",
            RecordType::NS => "NS",
            RecordType::CAA => "CAA",
        };
        f.write_str(s)
    }
}

/// Kind of source resource a Generator selects.
///
/// The Generator selection pass enumerates Ingress and Record sources only;
/// Node and Service are rendering-path kinds handled by the ResourceWatcher.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
pub enum GeneratorResourceKind {
    #[default]
    Ingress,
    Record,
    Node,
    Service,
}

impl fmt::Display for GeneratorResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GeneratorResourceKind::Ingress => "Ingress",
            GeneratorResourceKind::Record => "Record",
            GeneratorResourceKind::Node => "Node",
            GeneratorResourceKind::Service => "Service",
        };
        f.write_str(s)
    }
}

/// External DNS backend type.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderType {
    Aliyun,
    #[default]
    Cloudflare,
    Adguard,
    Job,
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProviderType::Aliyun => "ALIYUN",
            ProviderType::Cloudflare => "CLOUDFLARE",
            ProviderType::Adguard => "ADGUARD",
            ProviderType::Job => "JOB",
        };
        f.write_str(s)
    }
}

/// Kind of auxiliary resource a template rendering touched.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum WatchedResourceKind {
    Template,
    ClusterTemplate,
    Namespace,
    Ingress,
    Service,
    Endpoints,
    Node,
    Pod,
    Record,
}

impl fmt::Display for WatchedResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WatchedResourceKind::Template => "Template",
            WatchedResourceKind::ClusterTemplate => "ClusterTemplate",
            WatchedResourceKind::Namespace => "Namespace",
            WatchedResourceKind::Ingress => "Ingress",
            WatchedResourceKind::Service => "Service",
            WatchedResourceKind::Endpoints => "Endpoints",
            WatchedResourceKind::Node => "Node",
            WatchedResourceKind::Pod => "Pod",
            WatchedResourceKind::Record => "Record",
        };
        f.write_str(s)
    }
}

// ============================================================================
// Generator / ClusterGenerator
// ============================================================================

/// Configuration shared by [`Generator`] and [`ClusterGenerator`].
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorCommonSpec {
    /// Source resources matching this selector are watched by the generator.
    /// An empty selector matches everything of the configured kind.
    #[serde(default)]
    pub selector: LabelSelector,

    /// Kind of source resource to select.
    pub resource_kind: GeneratorResourceKind,

    /// Name of a Template (for Generator) or ClusterTemplate (for
    /// ClusterGenerator) holding the record template. Mutually exclusive
    /// with `template`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub template_ref: String,

    /// Inline record template. Mutually exclusive with `templateRef`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub template: String,

    /// generateName prefix for created ResourceWatchers. Defaults to `watcher-`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub watcher_generate_name: String,
}

impl GeneratorCommonSpec {
    /// Whether the given labels match this generator's selector.
    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.selector.matches(labels)
    }
}

/// Observed state shared by [`Generator`] and [`ClusterGenerator`].
///
/// When `appliedGeneration` equals the object's generation, `resources` is the
/// full set of sources matching the spec.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorStatus {
    /// Source resources currently matched by the selector. Serialized even
    /// when empty so a merge patch can clear the match set.
    #[serde(default)]
    pub resources: Vec<NamespacedName>,

    /// Generation whose match set was last fully applied.
    #[serde(default)]
    pub applied_generation: i64,
}

impl GeneratorStatus {
    /// Add a matched source. Returns true if the set changed.
    pub fn add_resource(&mut self, resource: NamespacedName) -> bool {
        if self.resources.contains(&resource) {
            return false;
        }
        self.resources.push(resource);
        true
    }

    /// Remove a matched source. Returns true if the set changed.
    pub fn remove_resource(&mut self, resource: &NamespacedName) -> bool {
        let before = self.resources.len();
        self.resources.retain(|r| r != resource);
        before != self.resources.len()
    }
}

/// `Generator` selects namespaced source resources and materializes one
/// `ResourceWatcher` per match.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "dns.xzzpig.com",
    version = "v1",
    kind = "Generator",
    namespaced,
    printcolumn = r#"{"name":"Kind","type":"string","jsonPath":".spec.resourceKind"}"#
)]
#[kube(status = "GeneratorStatus")]
#[serde(rename_all = "camelCase")]
pub struct GeneratorSpec {
    #[serde(flatten)]
    pub common: GeneratorCommonSpec,
}

/// `ClusterGenerator` is the cluster-scoped variant of [`Generator`]; it
/// selects sources across all namespaces and resolves `templateRef` against
/// `ClusterTemplate`s.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "dns.xzzpig.com",
    version = "v1",
    kind = "ClusterGenerator",
    printcolumn = r#"{"name":"Kind","type":"string","jsonPath":".spec.resourceKind"}"#
)]
#[kube(status = "GeneratorStatus")]
#[serde(rename_all = "camelCase")]
pub struct ClusterGeneratorSpec {
    #[serde(flatten)]
    pub common: GeneratorCommonSpec,
}

// ============================================================================
// Template / ClusterTemplate
// ============================================================================

/// `Template` holds a named, namespaced record template body.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(group = "dns.xzzpig.com", version = "v1", kind = "Template", namespaced)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSpec {
    /// The template body rendered against the resource data graph.
    pub template: String,
}

/// `ClusterTemplate` is the cluster-scoped variant of [`Template`].
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(group = "dns.xzzpig.com", version = "v1", kind = "ClusterTemplate")]
#[serde(rename_all = "camelCase")]
pub struct ClusterTemplateSpec {
    /// The template body rendered against the resource data graph.
    pub template: String,
}

// ============================================================================
// ResourceWatcher
// ============================================================================

/// One auxiliary resource touched during a template rendering.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct WatchedResource {
    #[serde(flatten)]
    pub reference: NamespacedName,
    pub kind: WatchedResourceKind,
}

impl WatchedResource {
    #[must_use]
    pub fn new(kind: WatchedResourceKind, namespace: &str, name: &str) -> Self {
        Self {
            reference: NamespacedName::new(namespace, name),
            kind,
        }
    }

    /// Rendering used by the `.status.resources` reverse-lookup index.
    #[must_use]
    pub fn index_key(&self) -> String {
        format!(
            "{}/{}/{}",
            self.kind, self.reference.namespace, self.reference.name
        )
    }
}

/// Observed state of a `ResourceWatcher`.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceWatcherStatus {
    /// True when the last rendering produced records without error.
    #[serde(default)]
    pub ready: bool,

    /// Human-readable failure reason when not ready.
    #[serde(default)]
    pub reason: String,

    /// Every auxiliary resource the last rendering touched, deduplicated by
    /// (kind, namespace, name). Changes to any of them re-trigger rendering.
    #[serde(default)]
    pub resources: Vec<WatchedResource>,
}

impl ResourceWatcherStatus {
    /// Record a touched resource, deduplicating by (kind, namespace, name).
    pub fn add_resource(&mut self, kind: WatchedResourceKind, namespace: &str, name: &str) {
        let resource = WatchedResource::new(kind, namespace, name);
        if !self.resources.contains(&resource) {
            self.resources.push(resource);
        }
    }
}

/// `ResourceWatcher` renders a template against one source resource and owns
/// the resulting child `Record`s. Created and destroyed by its owning
/// Generator or ClusterGenerator.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "dns.xzzpig.com",
    version = "v1",
    kind = "ResourceWatcher",
    namespaced,
    printcolumn = r#"{"name":"Resource","type":"string","jsonPath":".spec.resource.name"}"#,
    printcolumn = r#"{"name":"Ready","type":"boolean","jsonPath":".status.ready"}"#,
    printcolumn = r#"{"name":"Reason","type":"string","jsonPath":".status.reason"}"#
)]
#[kube(status = "ResourceWatcherStatus")]
#[serde(rename_all = "camelCase")]
pub struct ResourceWatcherSpec {
    /// The source resource this watcher renders records for.
    pub resource: NamespacedName,
}

// ============================================================================
// Record
// ============================================================================

/// Desired state of a DNS record.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordSpecInner {
    /// Fully qualified record name, e.g. `www.example.com`.
    pub name: String,

    /// Record type.
    pub r#type: RecordType,

    /// Record value (address, target, text).
    pub value: String,

    /// TTL in seconds; omitted means provider default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,

    /// Provider-specific hints, keyed by well-known `dns.xzzpig.com/...` keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<BTreeMap<String, String>>,
}

impl RecordSpecInner {
    /// Look up an `extra` key as a boolean ("true" is true, anything else false).
    #[must_use]
    pub fn extra_bool(&self, key: &str) -> Option<bool> {
        self.extra
            .as_ref()
            .and_then(|extra| extra.get(key))
            .map(|value| value == "true")
    }

    /// Look up an `extra` key as a string.
    #[must_use]
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra
            .as_ref()
            .and_then(|extra| extra.get(key))
            .map(String::as_str)
    }

    /// Look up an `extra` key as a comma-separated list.
    #[must_use]
    pub fn extra_strings(&self, key: &str) -> Option<Vec<String>> {
        self.extra
            .as_ref()
            .and_then(|extra| extra.get(key))
            .map(|value| value.split(',').map(str::to_string).collect())
    }
}

/// Per-provider synchronization state stored in `Record.status.providers`.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecordProviderStatus {
    /// Reference to the Provider (namespace empty for ClusterProviders).
    #[serde(flatten)]
    pub provider: NamespacedName,

    /// Backend identifier of the external record; empty until created.
    #[serde(rename = "recordID", default)]
    pub record_id: String,

    /// Opaque adapter state carried across calls (used by the Job adapter).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data: String,

    /// Last error for this provider; empty when in sync.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl RecordProviderStatus {
    /// Persist a successful adapter call.
    pub fn success(&mut self, id: String, data: String) {
        self.record_id = id;
        self.data = data;
        self.message.clear();
    }

    /// Persist a failed adapter call, keeping whatever id/data it wrote.
    pub fn error(&mut self, id: String, data: String, err: &dyn fmt::Display) {
        self.record_id = id;
        self.data = data;
        self.message = err.to_string();
    }
}

/// Observed state of a `Record`.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordStatus {
    /// One entry per matching provider. Serialized even when empty so a
    /// merge patch can drop the last entry.
    #[serde(default)]
    pub providers: Vec<RecordProviderStatus>,

    /// True iff every provider entry is in sync (empty message).
    #[serde(default)]
    pub all_ready: bool,

    /// Newline-joined concatenation of all provider messages.
    #[serde(default)]
    pub message: String,
}

impl RecordStatus {
    /// Find the status entry for the given provider reference.
    #[must_use]
    pub fn find_provider(
        &mut self,
        provider: &NamespacedName,
    ) -> Option<&mut RecordProviderStatus> {
        self.providers.iter_mut().find(|p| &p.provider == provider)
    }

    /// Recompute `allReady` and the aggregated message from provider entries.
    pub fn aggregate(&mut self) {
        self.all_ready = self.providers.iter().all(|p| p.message.is_empty());
        self.message = self
            .providers
            .iter()
            .filter(|p| !p.message.is_empty())
            .map(|p| p.message.as_str())
            .collect::<Vec<_>>()
            .join("\n");
    }
}

/// `Record` is one desired DNS record, synchronized to every matching provider.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "dns.xzzpig.com",
    version = "v1",
    kind = "Record",
    namespaced,
    printcolumn = r#"{"name":"Host","type":"string","jsonPath":".spec.name"}"#,
    printcolumn = r#"{"name":"Type","type":"string","jsonPath":".spec.type"}"#,
    printcolumn = r#"{"name":"Value","type":"string","jsonPath":".spec.value"}"#
)]
#[kube(status = "RecordStatus")]
#[serde(rename_all = "camelCase")]
pub struct RecordSpec {
    #[serde(flatten)]
    pub inner: RecordSpecInner,
}

// ============================================================================
// Provider / ClusterProvider
// ============================================================================

/// Aliyun DNS backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AliyunProviderConfig {
    /// Managed domain; falls back to `spec.selector.domain` when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub domain_name: String,

    pub access_key_id: String,
    pub access_key_secret: String,

    /// API endpoint; defaults to `dns.aliyuncs.com`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub endpoint: String,
}

/// Cloudflare backend configuration. Either `apiToken` or `key` + `email`
/// must be set.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CloudflareProviderConfig {
    /// Zone to manage; falls back to `spec.selector.domain` when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub zone_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_token: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,

    /// When creating a record that already exists at Cloudflare, adopt the
    /// existing record instead of reporting the duplicate as an error.
    #[serde(default)]
    pub match_exists_record: bool,
}

/// AdGuard Home backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdguardProviderConfig {
    /// Base URL of the AdGuard Home instance, e.g. `http://adguard:3000/`.
    pub url: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
}

/// When the Job adapter renders its `dataTemplate` into the payload.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
pub enum DataUpdateStrategy {
    /// Render when the Job is submitted.
    #[default]
    OnCreate,
    /// Render when the Job reports `Complete=True`.
    OnComplete,
    /// Render on completion and on failure.
    OnCompleteOrFailed,
}

/// Job backend configuration: record operations are dispatched as rendered
/// Kubernetes Jobs, created in the provider's own namespace (falling back to
/// the rendered manifest's namespace, then `POD_NAMESPACE`).
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobProviderConfig {
    /// Job manifest template for record creation.
    pub create_job_template: String,

    /// Job manifest template for updates; defaults to `createJobTemplate`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub update_job_template: String,

    /// Job manifest template for deletion; defaults to `createJobTemplate`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub delete_job_template: String,

    /// Template rendered into the payload's opaque `data` slot.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data_template: String,

    #[serde(default)]
    pub data_update_strategy: DataUpdateStrategy,
}

/// Selects which Records a provider manages.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSelector {
    /// Records whose name equals this domain or ends with `.<domain>` are
    /// managed by this provider. Empty matches every name. Must not start
    /// with a dot.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub domain: String,

    #[serde(flatten)]
    pub label_selector: LabelSelector,
}

impl ProviderSelector {
    /// Whether this provider manages the given record.
    ///
    /// The domain match is strict on the `.<domain>` boundary:
    /// `x.example.com` matches `example.com`, `xexample.com` does not.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        if !self.domain.is_empty() {
            let name = &record.spec.inner.name;
            if name != &self.domain && !name.ends_with(&format!(".{}", self.domain)) {
                return false;
            }
        }
        if !self.label_selector.is_empty() {
            let empty = BTreeMap::new();
            let labels = record.metadata.labels.as_ref().unwrap_or(&empty);
            if !self.label_selector.matches(labels) {
                return false;
            }
        }
        true
    }
}

/// Configuration shared by [`Provider`] and [`ClusterProvider`].
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCommonSpec {
    pub r#type: ProviderType,

    #[serde(default)]
    pub selector: ProviderSelector,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aliyun: Option<AliyunProviderConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloudflare: Option<CloudflareProviderConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adguard: Option<AdguardProviderConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job: Option<JobProviderConfig>,
}

/// Observed state shared by [`Provider`] and [`ClusterProvider`].
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    /// True when the backend adapter was constructed and validated.
    #[serde(default)]
    pub ready: bool,

    /// Human-readable failure reason when not ready. Serialized even when
    /// empty so a merge patch can clear a previous failure.
    #[serde(default)]
    pub reason: String,
}

/// `Provider` is a namespaced handle to an external DNS backend.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "dns.xzzpig.com",
    version = "v1",
    kind = "Provider",
    namespaced,
    printcolumn = r#"{"name":"Host","type":"string","jsonPath":".spec.selector.domain"}"#,
    printcolumn = r#"{"name":"Type","type":"string","jsonPath":".spec.type"}"#,
    printcolumn = r#"{"name":"Ready","type":"boolean","jsonPath":".status.ready"}"#,
    printcolumn = r#"{"name":"Reason","type":"string","jsonPath":".status.reason","priority":1}"#
)]
#[kube(status = "ProviderStatus")]
#[serde(rename_all = "camelCase")]
pub struct ProviderSpec {
    #[serde(flatten)]
    pub common: ProviderCommonSpec,
}

/// `ClusterProvider` is the cluster-scoped variant of [`Provider`]; it
/// matches Records in every namespace.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "dns.xzzpig.com",
    version = "v1",
    kind = "ClusterProvider",
    printcolumn = r#"{"name":"Host","type":"string","jsonPath":".spec.selector.domain"}"#,
    printcolumn = r#"{"name":"Type","type":"string","jsonPath":".spec.type"}"#,
    printcolumn = r#"{"name":"Ready","type":"boolean","jsonPath":".status.ready"}"#,
    printcolumn = r#"{"name":"Reason","type":"string","jsonPath":".status.reason","priority":1}"#
)]
#[kube(status = "ProviderStatus")]
#[serde(rename_all = "camelCase")]
pub struct ClusterProviderSpec {
    #[serde(flatten)]
    pub common: ProviderCommonSpec,
}

// ============================================================================
// Polymorphism over the namespaced / cluster-scoped twins
// ============================================================================

/// Capability set shared by [`Generator`] and [`ClusterGenerator`].
///
/// Reconcilers and watch wiring are generic over this trait; there are
/// exactly two implementations.
pub trait GeneratorObject:
    Resource<DynamicType = ()>
    + ResourceExt
    + Clone
    + fmt::Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    fn generator_spec(&self) -> &GeneratorCommonSpec;
    fn generator_status(&self) -> Option<&GeneratorStatus>;

    /// Api scoped the way this kind requires: namespaced for `Generator`,
    /// cluster-wide for `ClusterGenerator`.
    fn api_scoped(client: Client, namespace: Option<&str>) -> Api<Self>;
}

impl GeneratorObject for Generator {
    fn generator_spec(&self) -> &GeneratorCommonSpec {
        &self.spec.common
    }

    fn generator_status(&self) -> Option<&GeneratorStatus> {
        self.status.as_ref()
    }

    fn api_scoped(client: Client, namespace: Option<&str>) -> Api<Self> {
        match namespace {
            Some(ns) => Api::namespaced(client, ns),
            None => Api::all(client),
        }
    }
}

impl GeneratorObject for ClusterGenerator {
    fn generator_spec(&self) -> &GeneratorCommonSpec {
        &self.spec.common
    }

    fn generator_status(&self) -> Option<&GeneratorStatus> {
        self.status.as_ref()
    }

    fn api_scoped(client: Client, _namespace: Option<&str>) -> Api<Self> {
        Api::all(client)
    }
}

/// Capability set shared by [`Provider`] and [`ClusterProvider`].
pub trait ProviderObject:
    Resource<DynamicType = ()>
    + ResourceExt
    + Clone
    + fmt::Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    fn provider_spec(&self) -> &ProviderCommonSpec;
    fn provider_status(&self) -> Option<&ProviderStatus>;

    fn api_scoped(client: Client, namespace: Option<&str>) -> Api<Self>;

    /// The (namespace, name) key this provider occupies in
    /// `Record.status.providers`; namespace is empty for cluster scope.
    fn provider_key(&self) -> NamespacedName {
        NamespacedName::new(self.namespace().unwrap_or_default(), self.name_any())
    }
}

impl ProviderObject for Provider {
    fn provider_spec(&self) -> &ProviderCommonSpec {
        &self.spec.common
    }

    fn provider_status(&self) -> Option<&ProviderStatus> {
        self.status.as_ref()
    }

    fn api_scoped(client: Client, namespace: Option<&str>) -> Api<Self> {
        match namespace {
            Some(ns) => Api::namespaced(client, ns),
            None => Api::all(client),
        }
    }
}

impl ProviderObject for ClusterProvider {
    fn provider_spec(&self) -> &ProviderCommonSpec {
        &self.spec.common
    }

    fn provider_status(&self) -> Option<&ProviderStatus> {
        self.status.as_ref()
    }

    fn api_scoped(client: Client, _namespace: Option<&str>) -> Api<Self> {
        Api::all(client)
    }
}

#[cfg(test)]
#[path = "crd_tests.rs"]
mod crd_tests;
