// Copyright (c) 2025 xzzpig
// SPDX-License-Identifier: MIT

//! Unit tests for label selector evaluation.

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use crate::crd::{LabelSelector, LabelSelectorRequirement};
    use crate::selector::selector_string;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn expr(key: &str, operator: &str, values: &[&str]) -> LabelSelectorRequirement {
        LabelSelectorRequirement {
            key: key.to_string(),
            operator: operator.to_string(),
            values: if values.is_empty() {
                None
            } else {
                Some(values.iter().map(|v| v.to_string()).collect())
            },
        }
    }

    #[test]
    fn test_empty_selector_matches_everything() {
        let selector = LabelSelector::default();
        assert!(selector.matches(&labels(&[])));
        assert!(selector.matches(&labels(&[("app", "web")])));
    }

    #[test]
    fn test_match_labels_exact() {
        let selector = LabelSelector {
            match_labels: Some(labels(&[("app", "web")])),
            match_expressions: None,
        };
        assert!(selector.matches(&labels(&[("app", "web")])));
        assert!(!selector.matches(&labels(&[("app", "db")])));
        assert!(!selector.matches(&labels(&[])));
    }

    #[test]
    fn test_match_labels_all_required() {
        let selector = LabelSelector {
            match_labels: Some(labels(&[("app", "web"), ("env", "prod")])),
            match_expressions: None,
        };
        assert!(selector.matches(&labels(&[("app", "web"), ("env", "prod"), ("extra", "ok")])));
        assert!(!selector.matches(&labels(&[("app", "web")])));
    }

    #[test]
    fn test_expression_in() {
        let selector = LabelSelector {
            match_labels: None,
            match_expressions: Some(vec![expr("env", "In", &["prod", "staging"])]),
        };
        assert!(selector.matches(&labels(&[("env", "prod")])));
        assert!(!selector.matches(&labels(&[("env", "dev")])));
        assert!(!selector.matches(&labels(&[])));
    }

    #[test]
    fn test_expression_not_in() {
        let selector = LabelSelector {
            match_labels: None,
            match_expressions: Some(vec![expr("env", "NotIn", &["dev"])]),
        };
        assert!(selector.matches(&labels(&[("env", "prod")])));
        // Absent key passes NotIn.
        assert!(selector.matches(&labels(&[])));
        assert!(!selector.matches(&labels(&[("env", "dev")])));
    }

    #[test]
    fn test_expression_exists_and_does_not_exist() {
        let exists = LabelSelector {
            match_labels: None,
            match_expressions: Some(vec![expr("app", "Exists", &[])]),
        };
        assert!(exists.matches(&labels(&[("app", "anything")])));
        assert!(!exists.matches(&labels(&[])));

        let absent = LabelSelector {
            match_labels: None,
            match_expressions: Some(vec![expr("app", "DoesNotExist", &[])]),
        };
        assert!(absent.matches(&labels(&[])));
        assert!(!absent.matches(&labels(&[("app", "x")])));
    }

    #[test]
    fn test_labels_and_expressions_are_anded() {
        let selector = LabelSelector {
            match_labels: Some(labels(&[("app", "web")])),
            match_expressions: Some(vec![expr("env", "In", &["prod"])]),
        };
        assert!(selector.matches(&labels(&[("app", "web"), ("env", "prod")])));
        assert!(!selector.matches(&labels(&[("app", "web"), ("env", "dev")])));
        assert!(!selector.matches(&labels(&[("env", "prod")])));
    }

    #[test]
    fn test_unknown_operator_matches_nothing() {
        let selector = LabelSelector {
            match_labels: None,
            match_expressions: Some(vec![expr("app", "Fancy", &["x"])]),
        };
        assert!(!selector.matches(&labels(&[("app", "x")])));
    }

    #[test]
    fn test_selector_string_empty() {
        assert_eq!(selector_string(&LabelSelector::default()), None);
    }

    #[test]
    fn test_selector_string_match_labels() {
        let selector = LabelSelector {
            match_labels: Some(labels(&[("app", "web"), ("env", "prod")])),
            match_expressions: None,
        };
        // BTreeMap iteration is sorted by key.
        assert_eq!(
            selector_string(&selector),
            Some("app=web,env=prod".to_string())
        );
    }

    #[test]
    fn test_selector_string_expressions() {
        let selector = LabelSelector {
            match_labels: None,
            match_expressions: Some(vec![
                expr("env", "In", &["prod", "staging"]),
                expr("tier", "NotIn", &["debug"]),
                expr("app", "Exists", &[]),
                expr("legacy", "DoesNotExist", &[]),
            ]),
        };
        assert_eq!(
            selector_string(&selector),
            Some("env in (prod,staging),tier notin (debug),app,!legacy".to_string())
        );
    }
}
