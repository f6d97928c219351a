//! Compiled JSON Schema validators shared across requests.
//!
//! Schemas are keyed by their canonical JSON text, so two endpoints that
//! declare the same schema share one compiled validator. Schemas that fail
//! to compile are remembered too: the error is logged once and every later
//! lookup gets the same message back without recompiling.

use dashmap::DashMap;
use jsonschema::Validator;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info};

#[derive(Clone)]
enum Compiled {
    Ready(Arc<Validator>),
    Invalid(Arc<str>),
}

/// Thread-safe cache of compiled schema validators. Clones share storage.
#[derive(Clone)]
pub struct ValidatorCache {
    compiled: Arc<DashMap<String, Compiled>>,
    enabled: bool,
}

impl Default for ValidatorCache {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ValidatorCache {
    /// With `enabled = false` every lookup compiles afresh.
    pub fn new(enabled: bool) -> Self {
        Self {
            compiled: Arc::new(DashMap::new()),
            enabled,
        }
    }

    /// The compiled validator for `schema`, or why it does not compile.
    ///
    /// `location` (`body`, `query`, ...) only labels the log line.
    pub fn get_or_compile(&self, location: &str, schema: &Value) -> Result<Arc<Validator>, Arc<str>> {
        if !self.enabled {
            return into_result(compile(location, schema));
        }
        let key = schema.to_string();
        if let Some(entry) = self.compiled.get(&key) {
            debug!(location, "Schema validator cache hit");
            return into_result(entry.value().clone());
        }
        // the entry lock makes concurrent first lookups compile only once
        let entry = self
            .compiled
            .entry(key)
            .or_insert_with(|| compile(location, schema))
            .value()
            .clone();
        into_result(entry)
    }

    /// Number of cached schemas, including ones that failed to compile.
    pub fn size(&self) -> usize {
        self.compiled.len()
    }

    pub fn invalid_count(&self) -> usize {
        self.compiled
            .iter()
            .filter(|entry| matches!(entry.value(), Compiled::Invalid(_)))
            .count()
    }

    pub fn clear(&self) {
        let dropped = self.compiled.len();
        self.compiled.clear();
        info!(dropped, "Schema validator cache cleared");
    }
}

fn compile(location: &str, schema: &Value) -> Compiled {
    match jsonschema::validator_for(schema) {
        Ok(validator) => {
            debug!(location, "Schema validator compiled");
            Compiled::Ready(Arc::new(validator))
        }
        Err(err) => {
            error!(location, error = %err, "Failed to compile JSON Schema");
            Compiled::Invalid(err.to_string().into())
        }
    }
}

fn into_result(compiled: Compiled) -> Result<Arc<Validator>, Arc<str>> {
    match compiled {
        Compiled::Ready(validator) => Ok(validator),
        Compiled::Invalid(reason) => Err(reason),
    }
}
