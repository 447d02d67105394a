// Copyright (c) 2025 xzzpig
// SPDX-License-Identifier: MIT

//! Label selector evaluation and rendering.
//!
//! Provider selectors and generator source matching both evaluate
//! [`LabelSelector`]s in-process: watch mappers run against reflector stores
//! and cannot defer to a server-side query. The evaluation lives here as
//! methods on the selector types; [`selector_string`] renders a selector for
//! the list calls that *can* filter server-side.

use std::collections::BTreeMap;

use crate::crd::{LabelSelector, LabelSelectorRequirement};

impl LabelSelector {
    /// Whether the labels satisfy this selector.
    ///
    /// `matchLabels` and `matchExpressions` are ANDed; an empty selector
    /// matches everything.
    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let exact = self
            .match_labels
            .iter()
            .flatten()
            .all(|(key, value)| labels.get(key) == Some(value));

        exact
            && self
                .match_expressions
                .iter()
                .flatten()
                .all(|requirement| requirement.evaluate(labels))
    }
}

impl LabelSelectorRequirement {
    /// Evaluate one requirement against the labels.
    ///
    /// An operator outside In / `NotIn` / Exists / `DoesNotExist` matches
    /// nothing.
    fn evaluate(&self, labels: &BTreeMap<String, String>) -> bool {
        let actual = labels.get(&self.key);
        let listed =
            |value: &String| self.values.as_deref().unwrap_or_default().contains(value);

        match self.operator.as_str() {
            "In" => actual.is_some_and(listed),
            "NotIn" => !actual.is_some_and(listed),
            "Exists" => actual.is_some(),
            "DoesNotExist" => actual.is_none(),
            other => {
                tracing::warn!("Unknown label selector operator: {other}");
                false
            }
        }
    }
}

/// Render a selector as a Kubernetes list-parameter selector string, e.g.
/// `app=web,env in (prod,staging),!legacy`.
///
/// Returns `None` for an empty selector (list everything).
#[must_use]
pub fn selector_string(selector: &LabelSelector) -> Option<String> {
    let mut parts = Vec::new();

    if let Some(match_labels) = &selector.match_labels {
        for (key, value) in match_labels {
            parts.push(format!("{key}={value}"));
        }
    }

    if let Some(match_expressions) = &selector.match_expressions {
        for expr in match_expressions {
            let values = expr.values.as_deref().unwrap_or(&[]).join(",");
            match expr.operator.as_str() {
                "In" => parts.push(format!("{} in ({values})", expr.key)),
                "NotIn" => parts.push(format!("{} notin ({values})", expr.key)),
                "Exists" => parts.push(expr.key.clone()),
                "DoesNotExist" => parts.push(format!("!{}", expr.key)),
                other => {
                    tracing::warn!("Unknown label selector operator: {other}");
                }
            }
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(","))
    }
}

#[cfg(test)]
#[path = "selector_tests.rs"]
mod selector_tests;
