use dashmap::DashMap;
use http::Method;
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use super::Resolution;
use crate::error::RouteError;
use crate::handler::HandlerModule;
use crate::router::loader::{ModuleLoader, ModulePath};
use crate::router::pattern::{decode_segments, is_template, split_segments};

#[derive(Debug, Clone)]
struct ListEntry {
    method: Method,
    route: String,
    segments: Vec<String>,
    module_path: String,
    has_path_params: bool,
}

impl ListEntry {
    fn parse(key: &str, module_path: &str) -> Result<Self, RouteError> {
        let invalid = |reason: &str| RouteError::InvalidPattern {
            pattern: key.to_string(),
            reason: reason.to_string(),
        };
        let (method, route) = key
            .split_once("::")
            .ok_or_else(|| invalid("expected METHOD::/route"))?;
        let method = Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes())
            .map_err(|_| invalid("invalid HTTP method"))?;
        let segments: Vec<String> = split_segments(route.trim()).map(str::to_string).collect();
        if module_path.trim().is_empty() {
            return Err(invalid("empty module path"));
        }
        Ok(Self {
            method,
            route: format!("/{}", segments.join("/")),
            has_path_params: segments.iter().any(|s| is_template(s)),
            segments,
            module_path: module_path.trim().to_string(),
        })
    }

    fn matches(&self, request: &[&str]) -> bool {
        self.segments.len() == request.len()
            && self
                .segments
                .iter()
                .zip(request)
                .all(|(expected, actual)| is_template(expected) || expected == actual)
    }

    /// Whether some request path could match both entries.
    fn overlaps(&self, other: &ListEntry) -> bool {
        self.method == other.method
            && self.segments.len() == other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|(a, b)| is_template(a) || is_template(b) || a == b)
    }

    fn label(&self) -> String {
        format!("{}::{}", self.method, self.route)
    }
}

/// Explicit `METHOD::/route/{param}` to module path mapping.
pub struct ListStrategy {
    entries: Vec<ListEntry>,
    modules: DashMap<String, Arc<HandlerModule>>,
    loader: Arc<dyn ModuleLoader>,
}

impl ListStrategy {
    pub fn new(
        routes: &BTreeMap<String, String>,
        loader: Arc<dyn ModuleLoader>,
    ) -> Result<Self, RouteError> {
        let entries = routes
            .iter()
            .map(|(key, module)| ListEntry::parse(key, module))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            entries,
            modules: DashMap::new(),
            loader,
        })
    }

    fn module(&self, module_path: &str) -> Result<Arc<HandlerModule>, RouteError> {
        if let Some(module) = self.modules.get(module_path) {
            return Ok(Arc::clone(module.value()));
        }
        let loaded = self
            .loader
            .load(&ModulePath::new(module_path, PathBuf::from(module_path)))?;
        let module = self
            .modules
            .entry(module_path.to_string())
            .or_insert(loaded);
        Ok(Arc::clone(module.value()))
    }

    pub(crate) fn resolve(&self, method: &Method, path: &str) -> Result<Resolution, RouteError> {
        let decoded = decode_segments(path)?;
        let segments: SmallVec<[&str; 8]> = decoded.iter().map(|s| &**s).collect();

        let mut path_matched = false;
        let mut hits: SmallVec<[&ListEntry; 2]> = SmallVec::new();
        for entry in self.entries.iter().filter(|e| e.matches(&segments)) {
            path_matched = true;
            if entry.method == *method {
                hits.push(entry);
            }
        }

        match hits.as_slice() {
            [] if path_matched => Err(RouteError::MethodNotAllowed {
                method: method.to_string(),
                path: path.to_string(),
            }),
            [] => Err(RouteError::not_found(path)),
            [entry] => {
                debug!(route = %entry.route, module = %entry.module_path, "List route matched");
                Ok(Resolution {
                    module: self.module(&entry.module_path)?,
                    has_path_params: entry.has_path_params,
                    template: Some(entry.route.clone()),
                })
            }
            many => Err(RouteError::conflict(
                path,
                "more than one list route matches",
                many.iter().map(|e| e.label()),
            )),
        }
    }

    /// Reject overlapping entries, then load every module.
    pub(crate) fn auto_load(&self) -> Result<usize, RouteError> {
        for (i, a) in self.entries.iter().enumerate() {
            if let Some(b) = self.entries[i + 1..].iter().find(|b| a.overlaps(b)) {
                return Err(RouteError::conflict(
                    "routes",
                    "list routes overlap",
                    [a.label(), b.label()],
                ));
            }
        }
        for entry in &self.entries {
            self.module(&entry.module_path)?;
        }
        Ok(self.entries.len())
    }

    pub(crate) fn reset(&self) {
        self.modules.clear();
    }

    pub(crate) fn routes(&self) -> Vec<(String, String)> {
        let mut routes: Vec<(String, String)> = self
            .entries
            .iter()
            .map(|e| (format!("{} {}", e.method, e.route), e.module_path.clone()))
            .collect();
        routes.sort();
        routes
    }
}
