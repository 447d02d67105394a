// Copyright (c) 2025 xzzpig
// SPDX-License-Identifier: MIT

//! Unit tests for template rendering, caching and output parsing.

#[cfg(test)]
mod tests {
    use minijinja::context;

    use crate::crd::RecordType;
    use crate::template::{build_environment, parse_records, render, TEMPLATE_CACHE};

    // ========================================================================
    // Output parsing
    // ========================================================================

    #[test]
    fn test_parse_empty_output_yields_no_records() {
        assert!(parse_records("").unwrap().is_empty());
        assert!(parse_records("\n ").unwrap().is_empty());
        assert!(parse_records("   \n\t").unwrap().is_empty());
    }

    #[test]
    fn test_parse_json_object() {
        let output = r#"{
            "apiVersion": "dns.xzzpig.com/v1",
            "kind": "Record",
            "metadata": {"name": "a"},
            "spec": {"name": "a.example.com", "type": "A", "value": "1.2.3.4"}
        }"#;
        let records = parse_records(output).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].spec.inner.name, "a.example.com");
        assert_eq!(records[0].spec.inner.r#type, RecordType::A);
    }

    #[test]
    fn test_parse_json_array() {
        let output = r#"[
            {"metadata": {"name": "a"}, "spec": {"name": "a.example.com", "type": "A", "value": "1.2.3.4"}},
            {"metadata": {"name": "b"}, "spec": {"name": "b.example.com", "type": "TXT", "value": "hello"}}
        ]"#;
        let records = parse_records(output).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].spec.inner.r#type, RecordType::TXT);
    }

    #[test]
    fn test_parse_yaml_list() {
        let output = "\n- metadata:\n    name: a\n  spec:\n    name: a.example.com\n    type: A\n    value: 1.2.3.4\n- metadata:\n    name: b\n  spec:\n    name: b.example.com\n    type: CNAME\n    value: a.example.com\n";
        let records = parse_records(output).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].spec.inner.r#type, RecordType::CNAME);
    }

    #[test]
    fn test_parse_yaml_object() {
        let output = "apiVersion: dns.xzzpig.com/v1\nkind: Record\nmetadata:\n  name: a\nspec:\n  name: a.example.com\n  type: AAAA\n  value: \"2001:db8::1\"\n";
        let records = parse_records(output).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].spec.inner.r#type, RecordType::AAAA);
    }

    #[test]
    fn test_parse_rejects_garbage_json() {
        assert!(parse_records("{not json").is_err());
        assert!(parse_records("[1, 2, 3]").is_err());
    }

    #[test]
    fn test_parse_record_with_ttl_and_extra() {
        let output = r#"{
            "metadata": {"name": "a", "labels": {"env": "prod"}},
            "spec": {
                "name": "a.example.com", "type": "A", "value": "1.2.3.4",
                "ttl": 300,
                "extra": {"dns.xzzpig.com/cloudflare/proxied": "true"}
            }
        }"#;
        let records = parse_records(output).unwrap();
        assert_eq!(records[0].spec.inner.ttl, Some(300));
        assert_eq!(
            records[0]
                .spec
                .inner
                .extra_bool("dns.xzzpig.com/cloudflare/proxied"),
            Some(true)
        );
    }

    // ========================================================================
    // Filters
    // ========================================================================

    #[test]
    fn test_to_yaml_filter() {
        let mut env = build_environment();
        env.add_template("t", "{{ value | to_yaml }}").unwrap();
        let out = env
            .get_template("t")
            .unwrap()
            .render(context! { value => vec!["a", "b"] })
            .unwrap();
        assert_eq!(out.trim(), "- a\n- b");
    }

    #[test]
    fn test_base64_filters() {
        let mut env = build_environment();
        env.add_template("enc", "{{ 'hello' | b64encode }}").unwrap();
        env.add_template("dec", "{{ 'aGVsbG8=' | b64decode }}")
            .unwrap();
        assert_eq!(env.get_template("enc").unwrap().render(()).unwrap(), "aGVsbG8=");
        assert_eq!(env.get_template("dec").unwrap().render(()).unwrap(), "hello");
    }

    #[test]
    fn test_strict_undefined() {
        let mut env = build_environment();
        env.add_template("t", "{{ nope }}").unwrap();
        assert!(env.get_template("t").unwrap().render(()).is_err());
    }

    // ========================================================================
    // Template cache
    // ========================================================================

    #[test]
    fn test_cache_reuses_same_generation() {
        let key = "Template/test-cache/reuse";
        let env = TEMPLATE_CACHE.get(key, 1, "v{{ 1 }}").unwrap();
        assert_eq!(render(&env, key, context! {}).unwrap(), "v1");

        // Same generation: the old parse wins even with a new source.
        let env = TEMPLATE_CACHE.get(key, 1, "v{{ 2 }}").unwrap();
        assert_eq!(render(&env, key, context! {}).unwrap(), "v1");
    }

    #[test]
    fn test_cache_reparses_on_generation_change() {
        let key = "Template/test-cache/invalidate";
        let env = TEMPLATE_CACHE.get(key, 1, "old").unwrap();
        assert_eq!(render(&env, key, context! {}).unwrap(), "old");

        let env = TEMPLATE_CACHE.get(key, 2, "new").unwrap();
        assert_eq!(render(&env, key, context! {}).unwrap(), "new");
    }

    #[test]
    fn test_cache_rejects_invalid_template() {
        let key = "Template/test-cache/broken";
        assert!(TEMPLATE_CACHE.get(key, 1, "{{ unclosed").is_err());
    }
}
