// Copyright (c) 2025 xzzpig
// SPDX-License-Identifier: MIT

//! Template engine, generation-keyed template cache and rendered-output
//! parsing.
//!
//! Templates are rendered with minijinja against the lazy resource data graph
//! in [`data`]; every navigation through the graph records the touched
//! resource so the ResourceWatcher can re-render when any of them changes.
//!
//! Rendered output is interpreted as, in order: a JSON Record (`{` prefix), a
//! JSON array of Records (`[`), a YAML array (`-`), or a single YAML Record.
//! Empty or whitespace-only output produces zero Records.

pub mod data;

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex};

use base64::Engine as _;
use minijinja::value::Value;
use minijinja::{Environment, ErrorKind, UndefinedBehavior};
use thiserror::Error;

use crate::crd::Record;

/// Errors from rendering or interpreting a template.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error(transparent)]
    Render(#[from] minijinja::Error),

    #[error("failed to parse rendered output as JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to parse rendered output as YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Build the engine every template is parsed into: strict undefined handling
/// plus the record-templating filters.
#[must_use]
pub fn build_environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);

    env.add_filter("to_yaml", to_yaml);
    env.add_filter("b64encode", b64encode);
    env.add_filter("b64decode", b64decode);

    env
}

/// Serialize a value as YAML. None and undefined render as the empty string.
fn to_yaml(value: Value) -> Result<String, minijinja::Error> {
    if value.is_none() || value.is_undefined() {
        return Ok(String::new());
    }
    serde_yaml::to_string(&value)
        .map_err(|err| minijinja::Error::new(ErrorKind::InvalidOperation, err.to_string()))
}

fn b64encode(value: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(value)
}

fn b64decode(value: &str) -> Result<String, minijinja::Error> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(value)
        .map_err(|err| minijinja::Error::new(ErrorKind::InvalidOperation, err.to_string()))?;
    String::from_utf8(bytes)
        .map_err(|err| minijinja::Error::new(ErrorKind::InvalidOperation, err.to_string()))
}

struct CachedTemplate {
    env: Arc<Environment<'static>>,
    generation: i64,
}

/// Process-wide template cache keyed by `Kind/ns/name`.
///
/// Each entry holds a parsed template and the generation it was parsed at;
/// a generation mismatch reparses under the mutex. The cache never evicts:
/// its size is bounded by the number of distinct Template objects.
pub struct TemplateCache {
    inner: Mutex<HashMap<String, CachedTemplate>>,
}

/// The shared cache instance; rebuilt on process restart.
pub static TEMPLATE_CACHE: LazyLock<TemplateCache> = LazyLock::new(|| TemplateCache {
    inner: Mutex::new(HashMap::new()),
});

impl TemplateCache {
    /// Fetch the parsed template for `key`, reparsing `source` when the
    /// observed generation differs from the cached one.
    ///
    /// # Errors
    ///
    /// Returns the parse error when `source` is not a valid template.
    pub fn get(
        &self,
        key: &str,
        generation: i64,
        source: &str,
    ) -> Result<Arc<Environment<'static>>, TemplateError> {
        let mut inner = self.inner.lock().expect("template cache poisoned");
        if let Some(cached) = inner.get(key) {
            if cached.generation == generation {
                return Ok(cached.env.clone());
            }
        }

        let mut env = build_environment();
        env.add_template_owned(key.to_string(), source.to_string())?;
        let env = Arc::new(env);
        inner.insert(
            key.to_string(),
            CachedTemplate {
                env: env.clone(),
                generation,
            },
        );
        Ok(env)
    }
}

/// Render the cached template `key` against the data graph root.
///
/// # Errors
///
/// Returns rendering errors, including strict-undefined failures from data
/// graph navigations that found nothing.
pub fn render(
    env: &Environment<'static>,
    key: &str,
    root: Value,
) -> Result<String, TemplateError> {
    Ok(env.get_template(key)?.render(root)?)
}

/// Interpret rendered output as zero or more Records.
///
/// # Errors
///
/// Returns the JSON/YAML error when the output is non-empty but does not
/// deserialize into Records.
pub fn parse_records(output: &str) -> Result<Vec<Record>, TemplateError> {
    let trimmed = output.trim_start();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    if trimmed.starts_with('{') {
        let record: Record = serde_json::from_str(output)?;
        Ok(vec![record])
    } else if trimmed.starts_with('[') {
        Ok(serde_json::from_str(output)?)
    } else if trimmed.starts_with('-') {
        Ok(serde_yaml::from_str(output)?)
    } else {
        let record: Record = serde_yaml::from_str(output)?;
        Ok(vec![record])
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
