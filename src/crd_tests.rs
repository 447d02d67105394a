// Copyright (c) 2025 xzzpig
// SPDX-License-Identifier: MIT

//! Unit tests for the CRD types and their helper impls.

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use crate::crd::*;

    fn record(name: &str, labels: &[(&str, &str)]) -> Record {
        let mut record = Record::new(
            "test",
            RecordSpec {
                inner: RecordSpecInner {
                    name: name.to_string(),
                    r#type: RecordType::A,
                    value: "1.2.3.4".to_string(),
                    ttl: None,
                    extra: None,
                },
            },
        );
        if !labels.is_empty() {
            record.metadata.labels = Some(
                labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            );
        }
        record
    }

    // ========================================================================
    // ProviderSelector matching
    // ========================================================================

    #[test]
    fn test_selector_domain_exact_match() {
        let selector = ProviderSelector {
            domain: "example.com".to_string(),
            label_selector: LabelSelector::default(),
        };
        assert!(selector.matches(&record("example.com", &[])));
    }

    #[test]
    fn test_selector_domain_suffix_match() {
        let selector = ProviderSelector {
            domain: "example.com".to_string(),
            label_selector: LabelSelector::default(),
        };
        assert!(selector.matches(&record("a.example.com", &[])));
        assert!(selector.matches(&record("x.y.example.com", &[])));
    }

    #[test]
    fn test_selector_domain_boundary_is_strict() {
        let selector = ProviderSelector {
            domain: "example.com".to_string(),
            label_selector: LabelSelector::default(),
        };
        // No dot boundary, no match.
        assert!(!selector.matches(&record("xexample.com", &[])));
        assert!(!selector.matches(&record("example.org", &[])));
    }

    #[test]
    fn test_selector_empty_matches_everything() {
        let selector = ProviderSelector::default();
        assert!(selector.matches(&record("anything.at.all", &[])));
        assert!(selector.matches(&record("anything.at.all", &[("app", "web")])));
    }

    #[test]
    fn test_selector_labels_and_domain_both_required() {
        let mut match_labels = BTreeMap::new();
        match_labels.insert("env".to_string(), "prod".to_string());
        let selector = ProviderSelector {
            domain: "example.com".to_string(),
            label_selector: LabelSelector {
                match_labels: Some(match_labels),
                match_expressions: None,
            },
        };

        assert!(selector.matches(&record("a.example.com", &[("env", "prod")])));
        assert!(!selector.matches(&record("a.example.com", &[("env", "dev")])));
        assert!(!selector.matches(&record("a.example.org", &[("env", "prod")])));
    }

    // ========================================================================
    // Record status helpers
    // ========================================================================

    #[test]
    fn test_record_status_find_provider() {
        let mut status = RecordStatus {
            providers: vec![
                RecordProviderStatus {
                    provider: NamespacedName::new("ns", "p1"),
                    ..Default::default()
                },
                RecordProviderStatus {
                    provider: NamespacedName::new("", "cluster-p"),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        assert!(status
            .find_provider(&NamespacedName::new("ns", "p1"))
            .is_some());
        assert!(status
            .find_provider(&NamespacedName::new("", "cluster-p"))
            .is_some());
        assert!(status
            .find_provider(&NamespacedName::new("other", "p1"))
            .is_none());
    }

    #[test]
    fn test_record_provider_status_success_clears_message() {
        let mut entry = RecordProviderStatus {
            provider: NamespacedName::new("ns", "p"),
            record_id: "old".to_string(),
            data: String::new(),
            message: "previous failure".to_string(),
        };
        entry.success("new-id".to_string(), "blob".to_string());
        assert_eq!(entry.record_id, "new-id");
        assert_eq!(entry.data, "blob");
        assert!(entry.message.is_empty());
    }

    #[test]
    fn test_record_provider_status_error_keeps_payload_slots() {
        let mut entry = RecordProviderStatus {
            provider: NamespacedName::new("ns", "p"),
            ..Default::default()
        };
        entry.error("partial-id".to_string(), "partial".to_string(), &"boom");
        assert_eq!(entry.record_id, "partial-id");
        assert_eq!(entry.data, "partial");
        assert_eq!(entry.message, "boom");
    }

    #[test]
    fn test_record_status_aggregate() {
        let mut status = RecordStatus {
            providers: vec![
                RecordProviderStatus {
                    provider: NamespacedName::new("ns", "ok"),
                    record_id: "1".to_string(),
                    ..Default::default()
                },
                RecordProviderStatus {
                    provider: NamespacedName::new("ns", "bad"),
                    message: "provider not ready".to_string(),
                    ..Default::default()
                },
                RecordProviderStatus {
                    provider: NamespacedName::new("ns", "worse"),
                    message: "backend error".to_string(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        status.aggregate();
        assert!(!status.all_ready);
        assert_eq!(status.message, "provider not ready\nbackend error");

        status.providers.retain(|p| p.message.is_empty());
        status.aggregate();
        assert!(status.all_ready);
        assert!(status.message.is_empty());
    }

    // ========================================================================
    // Generator status helpers
    // ========================================================================

    #[test]
    fn test_generator_status_add_resource_dedups() {
        let mut status = GeneratorStatus::default();
        assert!(status.add_resource(NamespacedName::new("ns", "a")));
        assert!(!status.add_resource(NamespacedName::new("ns", "a")));
        assert!(status.add_resource(NamespacedName::new("ns", "b")));
        assert_eq!(status.resources.len(), 2);
    }

    #[test]
    fn test_generator_status_remove_resource() {
        let mut status = GeneratorStatus::default();
        status.add_resource(NamespacedName::new("ns", "a"));
        assert!(status.remove_resource(&NamespacedName::new("ns", "a")));
        assert!(!status.remove_resource(&NamespacedName::new("ns", "a")));
        assert!(status.resources.is_empty());
    }

    // ========================================================================
    // Watched resources
    // ========================================================================

    #[test]
    fn test_watched_resource_index_key() {
        let namespaced = WatchedResource::new(WatchedResourceKind::Service, "default", "web");
        assert_eq!(namespaced.index_key(), "Service/default/web");

        let cluster = WatchedResource::new(WatchedResourceKind::Node, "", "node-1");
        assert_eq!(cluster.index_key(), "Node//node-1");
    }

    #[test]
    fn test_watcher_status_add_resource_dedups() {
        let mut status = ResourceWatcherStatus::default();
        status.add_resource(WatchedResourceKind::Pod, "ns", "pod-1");
        status.add_resource(WatchedResourceKind::Pod, "ns", "pod-1");
        status.add_resource(WatchedResourceKind::Node, "", "pod-1");
        assert_eq!(status.resources.len(), 2);
    }

    // ========================================================================
    // Record extra keys
    // ========================================================================

    #[test]
    fn test_extra_accessors() {
        let mut extra = BTreeMap::new();
        extra.insert("proxied".to_string(), "true".to_string());
        extra.insert("off".to_string(), "false".to_string());
        extra.insert("tags".to_string(), "a,b,c".to_string());
        let spec = RecordSpecInner {
            name: "a.example.com".to_string(),
            r#type: RecordType::CNAME,
            value: "b.example.com".to_string(),
            ttl: Some(300),
            extra: Some(extra),
        };

        assert_eq!(spec.extra_bool("proxied"), Some(true));
        assert_eq!(spec.extra_bool("off"), Some(false));
        assert_eq!(spec.extra_bool("missing"), None);
        assert_eq!(spec.extra_str("tags"), Some("a,b,c"));
        assert_eq!(
            spec.extra_strings("tags"),
            Some(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );
        assert_eq!(spec.extra_strings("missing"), None);
    }

    // ========================================================================
    // Wire format
    // ========================================================================

    #[test]
    fn test_record_spec_serde_shape() {
        let record = record("a.example.com", &[]);
        let value = serde_json::to_value(&record).unwrap();
        // The flattened inner spec keeps the flat wire shape.
        assert_eq!(value["spec"]["name"], "a.example.com");
        assert_eq!(value["spec"]["type"], "A");
        assert_eq!(value["spec"]["value"], "1.2.3.4");
    }

    #[test]
    fn test_record_provider_status_record_id_field_name() {
        let entry = RecordProviderStatus {
            provider: NamespacedName::new("ns", "p"),
            record_id: "abc".to_string(),
            ..Default::default()
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["recordID"], "abc");
        assert_eq!(value["namespace"], "ns");
        assert_eq!(value["name"], "p");
    }

    #[test]
    fn test_provider_type_wire_names() {
        assert_eq!(
            serde_json::to_value(ProviderType::Aliyun).unwrap(),
            "ALIYUN"
        );
        assert_eq!(
            serde_json::to_value(ProviderType::Cloudflare).unwrap(),
            "CLOUDFLARE"
        );
        assert_eq!(
            serde_json::to_value(ProviderType::Adguard).unwrap(),
            "ADGUARD"
        );
        assert_eq!(serde_json::to_value(ProviderType::Job).unwrap(), "JOB");
    }

    #[test]
    fn test_generator_spec_flattened() {
        let spec: GeneratorSpec = serde_json::from_value(serde_json::json!({
            "resourceKind": "Ingress",
            "template": "{}",
            "selector": { "matchLabels": { "env": "prod" } }
        }))
        .unwrap();
        assert_eq!(spec.common.resource_kind, GeneratorResourceKind::Ingress);
        assert_eq!(spec.common.template, "{}");
        assert!(!spec.common.selector.is_empty());
    }

    #[test]
    fn test_namespaced_name_display() {
        assert_eq!(NamespacedName::new("ns", "name").to_string(), "ns/name");
        assert_eq!(NamespacedName::new("", "cluster").to_string(), "/cluster");
    }

    #[test]
    fn test_provider_key_for_cluster_scope_has_empty_namespace() {
        let provider = ClusterProvider::new(
            "global",
            ClusterProviderSpec {
                common: ProviderCommonSpec::default(),
            },
        );
        let key = provider.provider_key();
        assert_eq!(key.namespace, "");
        assert_eq!(key.name, "global");
    }
}
