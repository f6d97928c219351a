//! Resolver strategies.
//!
//! Three interchangeable ways of mapping a request to a handler module, chosen
//! from [`RouteSource`] when the router starts:
//!
//! | Strategy | Source | Keyed by |
//! |---|---|---|
//! | Directory | files mirror the URL tree under a base directory | path |
//! | Pattern | one glob-like pattern (`src/api/**/*.handler.ts`) | path |
//! | List | explicit `METHOD::/route` entries | method + path |
//!
//! All three split on `/` and `\`, percent-decode segments, treat `{name}` as
//! a templated segment and compare methods case-insensitively.

mod directory;
mod files;
mod list;
mod pattern;

pub use files::FileTreeStrategy;
pub use list::ListStrategy;
pub use pattern::{compiled_extension, locate, OUTPUT_DIRS};

use http::Method;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::RouteSource;
use crate::error::RouteError;
use crate::handler::HandlerModule;
use crate::router::loader::ModuleLoader;

/// Outcome of one strategy lookup.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub module: Arc<HandlerModule>,
    /// The match consumed a templated segment
    pub has_path_params: bool,
    /// Route template the strategy matched, e.g. `/users/{id}`
    pub template: Option<String>,
}

pub enum Strategy {
    Directory(FileTreeStrategy),
    Pattern(FileTreeStrategy),
    List(ListStrategy),
}

impl Strategy {
    /// Build the strategy a route source selects.
    ///
    /// Pattern sources locate their handler directory here, so a missing
    /// build output fails at startup rather than on the first request.
    pub fn from_source(
        source: &RouteSource,
        loader: Arc<dyn ModuleLoader>,
    ) -> Result<Self, RouteError> {
        let strategy = match source {
            RouteSource::Directory { base, extensions } => {
                Strategy::Directory(directory::directory(base, extensions, loader))
            }
            RouteSource::Pattern { root, pattern } => {
                Strategy::Pattern(pattern::pattern(root, pattern, loader)?)
            }
            RouteSource::List { routes } => Strategy::List(ListStrategy::new(routes, loader)?),
        };
        info!(strategy = strategy.name(), "Resolver strategy selected");
        Ok(strategy)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Directory(_) => "directory",
            Strategy::Pattern(_) => "pattern",
            Strategy::List(_) => "list",
        }
    }

    pub fn resolve(&self, method: &Method, path: &str) -> Result<Resolution, RouteError> {
        match self {
            Strategy::Directory(files) | Strategy::Pattern(files) => files.resolve(path),
            Strategy::List(list) => list.resolve(method, path),
        }
    }

    /// Validate the whole route source and load every module up front.
    /// Returns the number of routes.
    pub fn auto_load(&self) -> Result<usize, RouteError> {
        let result = match self {
            Strategy::Directory(files) | Strategy::Pattern(files) => files.auto_load(),
            Strategy::List(list) => list.auto_load(),
        };
        match &result {
            Ok(count) => info!(strategy = self.name(), routes = count, "Routes preloaded"),
            Err(err) => error!(strategy = self.name(), error = %err, "Route preload failed"),
        }
        result
    }

    /// Drop the compiled tree and memoized modules; the next lookup rebuilds.
    pub fn reset(&self) {
        match self {
            Strategy::Directory(files) | Strategy::Pattern(files) => files.reset(),
            Strategy::List(list) => list.reset(),
        }
    }

    /// Whether a path can resolve to different modules depending on the
    /// method, so cache keys must include it.
    pub fn keys_by_method(&self) -> bool {
        matches!(self, Strategy::List(_))
    }

    /// `(route, module path)` pairs, sorted.
    pub fn routes(&self) -> Result<Vec<(String, String)>, RouteError> {
        match self {
            Strategy::Directory(files) | Strategy::Pattern(files) => files.routes(),
            Strategy::List(list) => Ok(list.routes()),
        }
    }
}
