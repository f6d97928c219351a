//! # Router Configuration
//!
//! Declarative settings for a [`Router`](crate::pipeline::Router): which
//! resolver strategy discovers the handlers, how the resolver cache behaves,
//! the global timeout and the validation mode.
//!
//! Settings deserialize from YAML or TOML and can be overridden from the
//! environment. Hooks, the module loader and schema validators are runtime
//! values and are supplied through
//! [`RouterBuilder`](crate::pipeline::RouterBuilder) instead.
//!
//! ## Example
//!
//! ```yaml
//! routes:
//!   strategy: pattern
//!   root: .
//!   pattern: src/api/**/*.handler.ts
//! cache_mode: static
//! cache_size: 512
//! timeout_ms: 3000
//! validation: requirements
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Overrides |
//! |---|---|
//! | `TREEROUTE_CACHE_MODE` | `cache_mode` (`all`, `static`, `dynamic`, `none`) |
//! | `TREEROUTE_CACHE_SIZE` | `cache_size` |
//! | `TREEROUTE_TIMEOUT_MS` | `timeout_ms` (`0` disables the global timeout) |
//! | `TREEROUTE_EXPOSE_ERRORS` | `expose_errors` |
//! | `TREEROUTE_VALIDATE_RESPONSE` | `validate_response` |

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Default number of resolver cache entries.
pub const DEFAULT_CACHE_SIZE: usize = 1024;

/// Which resolved routes the resolver cache is allowed to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// Cache every resolved route
    #[default]
    All,
    /// Cache only routes without templated segments
    Static,
    /// Cache only routes with templated segments
    Dynamic,
    /// Never cache
    None,
}

impl CacheMode {
    /// Parse a mode name, case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Some(Self::All),
            "static" => Some(Self::Static),
            "dynamic" => Some(Self::Dynamic),
            "none" | "off" => Some(Self::None),
            _ => None,
        }
    }

    /// Whether an entry of the given class may be stored.
    #[must_use]
    pub fn admits(self, is_dynamic: bool) -> bool {
        match self {
            CacheMode::All => true,
            CacheMode::Static => !is_dynamic,
            CacheMode::Dynamic => is_dynamic,
            CacheMode::None => false,
        }
    }
}

/// Request validation mode. Schema and requirements validation are mutually
/// exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationKind {
    /// No request validation
    Off,
    /// Delegate to the configured [`SchemaValidator`](crate::validator::SchemaValidator)
    Schema,
    /// Validate against each endpoint's declared requirements
    #[default]
    Requirements,
}

/// Where handler modules come from, and which strategy matches them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum RouteSource {
    /// Handler files mirror the URL tree one-to-one under `base`.
    Directory {
        base: PathBuf,
        #[serde(default = "default_extensions")]
        extensions: Vec<String>,
    },
    /// One glob-like pattern gives both the base directory and the file naming
    /// convention, e.g. `src/api/**/*.handler.{ts,js}`.
    Pattern {
        #[serde(default = "default_root")]
        root: PathBuf,
        pattern: String,
    },
    /// Explicit `METHOD::/route/{param}` to module path mapping.
    List { routes: BTreeMap<String, String> },
}

fn default_extensions() -> Vec<String> {
    vec!["js".to_string()]
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

impl Default for RouteSource {
    fn default() -> Self {
        RouteSource::Directory {
            base: PathBuf::from("handlers"),
            extensions: default_extensions(),
        }
    }
}

/// Declarative router settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterSettings {
    pub routes: RouteSource,
    pub cache_mode: CacheMode,
    pub cache_size: usize,
    /// Global handler timeout; a per-route timeout takes precedence
    pub timeout_ms: Option<u64>,
    pub validation: ValidationKind,
    pub validate_response: bool,
    /// Expose the real message of unclassified failures in 500 responses
    pub expose_errors: bool,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            routes: RouteSource::default(),
            cache_mode: CacheMode::All,
            cache_size: DEFAULT_CACHE_SIZE,
            timeout_ms: None,
            validation: ValidationKind::Requirements,
            validate_response: false,
            expose_errors: false,
        }
    }
}

impl RouterSettings {
    /// Settings with the given route source and defaults for everything else.
    #[must_use]
    pub fn with_routes(routes: RouteSource) -> Self {
        Self {
            routes,
            ..Self::default()
        }
    }

    pub fn from_yaml_str(s: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(s).context("invalid router settings (yaml)")
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        toml::from_str(s).context("invalid router settings (toml)")
    }

    /// Load settings from a `.yaml`/`.yml` or `.toml` file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&text),
            Some("toml") => Self::from_toml_str(&text),
            other => bail!(
                "unsupported settings format {:?} for {}",
                other.unwrap_or(""),
                path.display()
            ),
        }
    }

    /// Apply `TREEROUTE_*` environment overrides.
    #[must_use]
    pub fn apply_env(self) -> Self {
        self.apply_overrides(|key| env::var(key).ok())
    }

    fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(val) = lookup("TREEROUTE_CACHE_MODE") {
            match CacheMode::parse(&val) {
                Some(mode) => self.cache_mode = mode,
                None => warn!(value = %val, "Ignoring invalid TREEROUTE_CACHE_MODE"),
            }
        }
        if let Some(val) = lookup("TREEROUTE_CACHE_SIZE") {
            match val.trim().parse() {
                Ok(size) => self.cache_size = size,
                Err(_) => warn!(value = %val, "Ignoring invalid TREEROUTE_CACHE_SIZE"),
            }
        }
        if let Some(val) = lookup("TREEROUTE_TIMEOUT_MS") {
            match val.trim().parse::<u64>() {
                Ok(0) => self.timeout_ms = None,
                Ok(ms) => self.timeout_ms = Some(ms),
                Err(_) => warn!(value = %val, "Ignoring invalid TREEROUTE_TIMEOUT_MS"),
            }
        }
        if let Some(val) = lookup("TREEROUTE_EXPOSE_ERRORS") {
            match parse_flag(&val) {
                Some(flag) => self.expose_errors = flag,
                None => warn!(value = %val, "Ignoring invalid TREEROUTE_EXPOSE_ERRORS"),
            }
        }
        if let Some(val) = lookup("TREEROUTE_VALIDATE_RESPONSE") {
            match parse_flag(&val) {
                Some(flag) => self.validate_response = flag,
                None => warn!(value = %val, "Ignoring invalid TREEROUTE_VALIDATE_RESPONSE"),
            }
        }
        self
    }

    /// Global timeout as a `Duration`; zero disables it.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
