//! Module loading capability.
//!
//! The resolver never loads code itself; it asks a [`ModuleLoader`] to turn a
//! discovered handler file into a [`HandlerModule`]. A binary that links its
//! handlers statically registers them in a [`StaticRegistry`]; a plugin host
//! can implement the trait over `dlopen` or an embedded runtime.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::RouteError;
use crate::handler::HandlerModule;

/// A handler file to load.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModulePath {
    /// Path relative to the handler base, `/`-separated, with extension
    pub relative: String,
    /// Location on disk (or the configured module path for list routes)
    pub absolute: PathBuf,
}

impl ModulePath {
    pub fn new(relative: impl Into<String>, absolute: impl Into<PathBuf>) -> Self {
        Self {
            relative: relative.into(),
            absolute: absolute.into(),
        }
    }

    /// Relative path without its final extension.
    pub fn stem(&self) -> &str {
        let file_start = self.relative.rfind('/').map_or(0, |i| i + 1);
        match self.relative[file_start..].rfind('.') {
            Some(dot) if dot > 0 => &self.relative[..file_start + dot],
            _ => &self.relative,
        }
    }
}

pub trait ModuleLoader: Send + Sync {
    fn load(&self, path: &ModulePath) -> Result<Arc<HandlerModule>, RouteError>;
}

impl<F> ModuleLoader for F
where
    F: Fn(&ModulePath) -> Result<Arc<HandlerModule>, RouteError> + Send + Sync,
{
    fn load(&self, path: &ModulePath) -> Result<Arc<HandlerModule>, RouteError> {
        self(path)
    }
}

/// Loader over modules registered up front, keyed by relative path.
///
/// Lookups try the exact relative path first and then the path without its
/// extension, so `users/{id}/index` serves `users/{id}/index.ts` as well as
/// the compiled `users/{id}/index.js`.
#[derive(Debug, Default, Clone)]
pub struct StaticRegistry {
    modules: HashMap<String, Arc<HandlerModule>>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, path: impl Into<String>, module: Arc<HandlerModule>) {
        self.modules
            .insert(path.into().replace('\\', "/").trim_start_matches('/').to_string(), module);
    }

    #[must_use]
    pub fn with(mut self, path: impl Into<String>, module: HandlerModule) -> Self {
        self.register(path, Arc::new(module));
        self
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl ModuleLoader for StaticRegistry {
    fn load(&self, path: &ModulePath) -> Result<Arc<HandlerModule>, RouteError> {
        let relative = path.relative.trim_start_matches('/');
        self.modules
            .get(relative)
            .or_else(|| self.modules.get(path.stem().trim_start_matches('/')))
            .map(Arc::clone)
            .ok_or_else(|| RouteError::ModuleLoad {
                path: path.relative.clone(),
                reason: "no module registered for this path".to_string(),
            })
    }
}
