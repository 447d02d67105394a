// Copyright (c) 2025 xzzpig
// SPDX-License-Identifier: MIT

//! Unit tests for the resource data graph and its touched-resource recording.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use k8s_openapi::api::core::v1::{
        Endpoints, EndpointAddress, EndpointSubset, Namespace, Node, NodeCondition, NodeStatus,
        Pod, PodSpec, Service,
    };
    use k8s_openapi::api::networking::v1::{
        HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
        IngressServiceBackend, IngressSpec,
    };
    use k8s_openapi::api::core::v1::ObjectReference;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta as K8sObjectMeta;
    use kube::runtime::reflector::store::Writer;
    use kube::runtime::reflector::{self, Store};
    use kube::runtime::watcher;
    use kube::Resource;

    use crate::context::Stores;
    use crate::crd::{WatchedResource, WatchedResourceKind};
    use crate::template::data::{ingress_root, TemplateData, TouchTracker};

    fn apply<K>(writer: &mut Writer<K>, object: K)
    where
        K: Resource + Clone,
        K::DynamicType: std::hash::Hash + Eq + Clone + Default,
    {
        writer.apply_watcher_event(&watcher::Event::Apply(object));
    }

    fn fresh<K>() -> (Store<K>, Writer<K>)
    where
        K: Resource + Clone + 'static,
        K::DynamicType: std::hash::Hash + Eq + Clone + Default,
    {
        reflector::store::<K>()
    }

    struct SeedWriters {
        namespaces: Writer<Namespace>,
        services: Writer<Service>,
        endpoints: Writer<Endpoints>,
        nodes: Writer<Node>,
        pods: Writer<Pod>,
    }

    fn test_stores() -> (Stores, SeedWriters) {
        let (namespaces, namespaces_w) = fresh();
        let (services, services_w) = fresh();
        let (endpoints, endpoints_w) = fresh();
        let (nodes, nodes_w) = fresh();
        let (pods, pods_w) = fresh();

        let stores = Stores {
            generators: fresh().0,
            cluster_generators: fresh().0,
            watchers: fresh().0,
            records: fresh().0,
            namespaces,
            services,
            endpoints,
            nodes,
            pods,
        };

        (
            stores,
            SeedWriters {
                namespaces: namespaces_w,
                services: services_w,
                endpoints: endpoints_w,
                nodes: nodes_w,
                pods: pods_w,
            },
        )
    }

    fn meta(namespace: Option<&str>, name: &str) -> K8sObjectMeta {
        K8sObjectMeta {
            name: Some(name.to_string()),
            namespace: namespace.map(str::to_string),
            ..Default::default()
        }
    }

    fn seeded() -> (Stores, Arc<TouchTracker>, Ingress) {
        let (stores, mut writers) = test_stores();

        apply(
            &mut writers.namespaces,
            Namespace {
                metadata: meta(None, "default"),
                ..Default::default()
            },
        );
        apply(
            &mut writers.services,
            Service {
                metadata: meta(Some("default"), "web"),
                ..Default::default()
            },
        );
        apply(
            &mut writers.endpoints,
            Endpoints {
                metadata: meta(Some("default"), "web"),
                subsets: Some(vec![EndpointSubset {
                    addresses: Some(vec![
                        EndpointAddress {
                            ip: "10.0.0.1".to_string(),
                            node_name: Some("node-1".to_string()),
                            target_ref: Some(ObjectReference {
                                kind: Some("Pod".to_string()),
                                name: Some("web-1".to_string()),
                                uid: Some("pod-uid-1".to_string()),
                                ..Default::default()
                            }),
                            ..Default::default()
                        },
                        // Second address on the same node: nodes must dedup.
                        EndpointAddress {
                            ip: "10.0.0.2".to_string(),
                            node_name: Some("node-1".to_string()),
                            ..Default::default()
                        },
                    ]),
                    ..Default::default()
                }]),
            },
        );
        apply(
            &mut writers.nodes,
            Node {
                metadata: meta(None, "node-1"),
                status: Some(NodeStatus {
                    conditions: Some(vec![NodeCondition {
                        type_: "Ready".to_string(),
                        status: "True".to_string(),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
        apply(
            &mut writers.pods,
            Pod {
                metadata: meta(Some("default"), "web-1"),
                spec: Some(PodSpec {
                    node_name: Some("node-1".to_string()),
                    containers: vec![],
                    ..Default::default()
                }),
                ..Default::default()
            },
        );

        let ingress = Ingress {
            metadata: meta(Some("default"), "web-ingress"),
            spec: Some(IngressSpec {
                rules: Some(vec![IngressRule {
                    host: Some("a.example.com".to_string()),
                    http: Some(HTTPIngressRuleValue {
                        paths: vec![HTTPIngressPath {
                            backend: IngressBackend {
                                service: Some(IngressServiceBackend {
                                    name: "web".to_string(),
                                    ..Default::default()
                                }),
                                ..Default::default()
                            },
                            path_type: "Prefix".to_string(),
                            ..Default::default()
                        }],
                    }),
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };

        (stores, Arc::new(TouchTracker::default()), ingress)
    }

    fn render_with_root(root: minijinja::value::Value, template: &str) -> String {
        let mut env = crate::template::build_environment();
        env.add_template_owned("t".to_string(), template.to_string())
            .unwrap();
        env.get_template("t").unwrap().render(root).unwrap()
    }

    // ========================================================================
    // Touch tracking
    // ========================================================================

    #[test]
    fn test_touch_tracker_dedups() {
        let tracker = TouchTracker::default();
        tracker.record(WatchedResourceKind::Service, "ns", "web");
        tracker.record(WatchedResourceKind::Service, "ns", "web");
        tracker.record(WatchedResourceKind::Endpoints, "ns", "web");

        let touched = tracker.drain();
        assert_eq!(touched.len(), 2);
        assert!(touched.contains(&WatchedResource::new(
            WatchedResourceKind::Service,
            "ns",
            "web"
        )));
    }

    #[test]
    fn test_touch_tracker_drain_resets() {
        let tracker = TouchTracker::default();
        tracker.record(WatchedResourceKind::Node, "", "n");
        assert_eq!(tracker.drain().len(), 1);
        assert!(tracker.drain().is_empty());
    }

    // ========================================================================
    // Graph navigation
    // ========================================================================

    #[test]
    fn test_ingress_fields_visible_under_camel_case() {
        let (stores, tracker, ingress) = seeded();
        let data = TemplateData::new(stores, tracker.clone(), "default");
        let root = ingress_root(data, ingress);

        let host = render_with_root(root, "{{ ingress.spec.rules[0].host }}");
        assert_eq!(host, "a.example.com");

        let touched = tracker.drain();
        assert_eq!(
            touched,
            vec![WatchedResource::new(
                WatchedResourceKind::Ingress,
                "default",
                "web-ingress"
            )]
        );
    }

    #[test]
    fn test_ingress_to_node_navigation_records_path() {
        let (stores, tracker, ingress) = seeded();
        let data = TemplateData::new(stores, tracker.clone(), "default");
        let root = ingress_root(data, ingress);

        let ready = render_with_root(
            root,
            "{{ ingress.service(0, 0).endpoints.nodes[0].ready }}",
        );
        assert_eq!(ready, "true");

        let touched = tracker.drain();
        let kinds: Vec<_> = touched.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                WatchedResourceKind::Ingress,
                WatchedResourceKind::Service,
                WatchedResourceKind::Endpoints,
                WatchedResourceKind::Node,
            ]
        );
        // Two addresses on the same node recorded once.
        assert_eq!(touched.len(), 4);
    }

    #[test]
    fn test_pods_navigation_and_node_hop() {
        let (stores, tracker, ingress) = seeded();
        let data = TemplateData::new(stores, tracker.clone(), "default");
        let root = ingress_root(data, ingress);

        let node = render_with_root(
            root,
            "{{ ingress.service(0, 0).endpoints.pods[0].node.metadata.name }}",
        );
        assert_eq!(node, "node-1");

        let touched = tracker.drain();
        assert!(touched.contains(&WatchedResource::new(
            WatchedResourceKind::Pod,
            "default",
            "web-1"
        )));
        assert!(touched.contains(&WatchedResource::new(
            WatchedResourceKind::Node,
            "",
            "node-1"
        )));
    }

    #[test]
    fn test_namespace_accessor() {
        let (stores, tracker, ingress) = seeded();
        let data = TemplateData::new(stores, tracker.clone(), "default");
        let root = ingress_root(data, ingress);

        let name = render_with_root(root, "{{ namespace.metadata.name }}");
        assert_eq!(name, "default");
        assert!(tracker.drain().contains(&WatchedResource::new(
            WatchedResourceKind::Namespace,
            "",
            "default"
        )));
    }

    #[test]
    fn test_missing_service_fails_render() {
        let (stores, tracker, mut ingress) = seeded();
        // Point the backend at a service that is not in the store.
        if let Some(spec) = ingress.spec.as_mut() {
            if let Some(rules) = spec.rules.as_mut() {
                rules[0].http.as_mut().unwrap().paths[0]
                    .backend
                    .service
                    .as_mut()
                    .unwrap()
                    .name = "ghost".to_string();
            }
        }
        let data = TemplateData::new(stores, tracker, "default");
        let root = ingress_root(data, ingress);

        let mut env = crate::template::build_environment();
        env.add_template("t", "{{ ingress.service(0, 0).metadata.name }}")
            .unwrap();
        assert!(env.get_template("t").unwrap().render(root).is_err());
    }
}
