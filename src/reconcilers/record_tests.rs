// Copyright (c) 2025 xzzpig
// SPDX-License-Identifier: MIT

//! Unit tests for the Record reconciler's provider unification.

#[cfg(test)]
mod tests {
    use crate::crd::{
        ClusterProvider, ClusterProviderSpec, Provider, ProviderCommonSpec, ProviderSelector,
        ProviderSpec, ProviderType,
    };
    use crate::reconcilers::record::AnyProvider;

    fn namespaced(domain: &str) -> AnyProvider {
        let mut provider = Provider::new(
            "p",
            ProviderSpec {
                common: ProviderCommonSpec {
                    r#type: ProviderType::Cloudflare,
                    selector: ProviderSelector {
                        domain: domain.to_string(),
                        ..Default::default()
                    },
                    ..Default::default()
                },
            },
        );
        provider.metadata.namespace = Some("apps".to_string());
        provider.metadata.uid = Some("uid-p".to_string());
        provider.metadata.generation = Some(7);
        AnyProvider::Namespaced(provider)
    }

    fn cluster(domain: &str) -> AnyProvider {
        let mut provider = ClusterProvider::new(
            "cp",
            ClusterProviderSpec {
                common: ProviderCommonSpec {
                    r#type: ProviderType::Aliyun,
                    selector: ProviderSelector {
                        domain: domain.to_string(),
                        ..Default::default()
                    },
                    ..Default::default()
                },
            },
        );
        provider.metadata.uid = Some("uid-cp".to_string());
        AnyProvider::Cluster(provider)
    }

    #[test]
    fn test_key_carries_namespace_for_namespaced_providers() {
        let key = namespaced("example.com").key();
        assert_eq!(key.namespace, "apps");
        assert_eq!(key.name, "p");
    }

    #[test]
    fn test_key_namespace_empty_for_cluster_providers() {
        let key = cluster("example.com").key();
        assert_eq!(key.namespace, "");
        assert_eq!(key.name, "cp");
    }

    #[test]
    fn test_uid_and_generation() {
        let provider = namespaced("example.com");
        assert_eq!(provider.uid(), "uid-p");
        assert_eq!(provider.generation(), 7);

        // Missing generation reads as zero.
        assert_eq!(cluster("example.com").generation(), 0);
    }

    #[test]
    fn test_deleting_flag() {
        let provider = namespaced("example.com");
        assert!(!provider.deleting());
    }

    #[test]
    fn test_spec_accessor_exposes_selector() {
        let provider = cluster("example.com");
        assert_eq!(provider.spec().selector.domain, "example.com");
        assert_eq!(provider.spec().r#type, ProviderType::Aliyun);
    }
}
