// Copyright (c) 2025 xzzpig
// SPDX-License-Identifier: MIT

//! Unit tests for the ResourceWatcher reconciler's pure pieces.

#[cfg(test)]
mod tests {
    use crate::crd::{
        ClusterGenerator, ClusterGeneratorSpec, Generator, GeneratorCommonSpec,
        GeneratorResourceKind, GeneratorSpec, NamespacedName, ResourceWatcher,
        ResourceWatcherSpec,
    };
    use crate::reconcilers::resourcewatcher::{watcher_owner_reference, Owner};

    fn common() -> GeneratorCommonSpec {
        GeneratorCommonSpec {
            resource_kind: GeneratorResourceKind::Ingress,
            template: "{}".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_inline_template_key_for_generator() {
        let mut generator = Generator::new("gen", GeneratorSpec { common: common() });
        generator.metadata.namespace = Some("apps".to_string());
        let owner = Owner::Namespaced(generator);
        assert_eq!(owner.inline_template_key(), "Generator/apps/gen");
    }

    #[test]
    fn test_inline_template_key_for_cluster_generator() {
        let generator = ClusterGenerator::new("cgen", ClusterGeneratorSpec { common: common() });
        let owner = Owner::Cluster(generator);
        assert_eq!(owner.inline_template_key(), "Generator//cgen");
    }

    #[test]
    fn test_owner_generation_defaults_to_zero() {
        let generator = Generator::new("gen", GeneratorSpec { common: common() });
        let owner = Owner::Namespaced(generator);
        assert_eq!(owner.generation(), 0);
    }

    #[test]
    fn test_watcher_owner_reference() {
        let mut watcher = ResourceWatcher::new(
            "watcher-abc",
            ResourceWatcherSpec {
                resource: NamespacedName::new("apps", "web"),
            },
        );
        watcher.metadata.namespace = Some("apps".to_string());
        watcher.metadata.uid = Some("uid-w".to_string());

        let owner = watcher_owner_reference(&watcher);
        assert_eq!(owner.kind, "ResourceWatcher");
        assert_eq!(owner.api_version, "dns.xzzpig.com/v1");
        assert_eq!(owner.name, "watcher-abc");
        assert_eq!(owner.uid, "uid-w");
        assert_eq!(owner.controller, Some(true));
    }

    #[test]
    fn test_owner_spec_accessor() {
        let generator = Generator::new("gen", GeneratorSpec { common: common() });
        let owner = Owner::Namespaced(generator);
        assert_eq!(owner.spec().resource_kind, GeneratorResourceKind::Ingress);
        assert_eq!(owner.spec().template, "{}");
    }
}
