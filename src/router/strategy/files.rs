use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use smallvec::SmallVec;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use super::Resolution;
use crate::error::RouteError;
use crate::handler::HandlerModule;
use crate::router::loader::{ModuleLoader, ModulePath};
use crate::router::pattern::{decode_segments, FilePattern};
use crate::router::tree::{scan, RouteTree};

/// Resolution over a scanned file tree, shared by the directory and pattern
/// strategies.
///
/// The tree is built on first use or by [`auto_load`](Self::auto_load) and
/// swapped atomically, so readers never observe a half-built tree. Loaded
/// modules are memoized per import path.
pub struct FileTreeStrategy {
    kind: &'static str,
    pattern: FilePattern,
    dir: PathBuf,
    index_only: bool,
    tree: ArcSwapOption<RouteTree>,
    modules: DashMap<String, Arc<HandlerModule>>,
    loader: Arc<dyn ModuleLoader>,
}

impl FileTreeStrategy {
    pub(crate) fn new(
        kind: &'static str,
        pattern: FilePattern,
        dir: PathBuf,
        index_only: bool,
        loader: Arc<dyn ModuleLoader>,
    ) -> Self {
        Self {
            kind,
            pattern,
            dir,
            index_only,
            tree: ArcSwapOption::empty(),
            modules: DashMap::new(),
            loader,
        }
    }

    /// Directory the handler files are scanned from.
    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    pub fn pattern(&self) -> &FilePattern {
        &self.pattern
    }

    fn build(&self) -> Result<RouteTree, RouteError> {
        let started = Instant::now();
        let files = scan(&self.dir, self.pattern.recursive())?;
        let tree = RouteTree::build(&self.pattern, &files, self.index_only)?;
        info!(
            strategy = self.kind,
            dir = %self.dir.display(),
            files = files.len(),
            routes = tree.len(),
            duration_us = started.elapsed().as_micros() as u64,
            "Route tree built"
        );
        Ok(tree)
    }

    pub(crate) fn tree(&self) -> Result<Arc<RouteTree>, RouteError> {
        if let Some(tree) = self.tree.load_full() {
            return Ok(tree);
        }
        let tree = Arc::new(self.build()?);
        self.tree.store(Some(Arc::clone(&tree)));
        Ok(tree)
    }

    fn module(&self, import_path: &str) -> Result<Arc<HandlerModule>, RouteError> {
        if let Some(module) = self.modules.get(import_path) {
            return Ok(Arc::clone(module.value()));
        }
        let path = ModulePath::new(import_path, self.dir.join(import_path));
        let loaded = self.loader.load(&path)?;
        debug!(strategy = self.kind, import_path = %import_path, module = %loaded.name(), "Handler module loaded");
        // first writer wins so every caller shares one module
        let module = self
            .modules
            .entry(import_path.to_string())
            .or_insert(loaded);
        Ok(Arc::clone(module.value()))
    }

    pub(crate) fn resolve(&self, path: &str) -> Result<Resolution, RouteError> {
        let decoded = decode_segments(path)?;
        let segments: SmallVec<[&str; 8]> = decoded.iter().map(|s| &**s).collect();
        let tree = self.tree()?;
        let found = tree.find(&segments)?;
        let module = self.module(&found.import_path)?;
        Ok(Resolution {
            module,
            has_path_params: found.has_path_params,
            template: Some(found.template),
        })
    }

    /// Build the tree and load every module it references.
    pub(crate) fn auto_load(&self) -> Result<usize, RouteError> {
        let tree = Arc::new(self.build()?);
        for leaf in tree.leaves() {
            self.module(&leaf.import_path)?;
        }
        let count = tree.len();
        self.tree.store(Some(tree));
        Ok(count)
    }

    pub(crate) fn reset(&self) {
        self.tree.store(None);
        self.modules.clear();
    }

    pub(crate) fn routes(&self) -> Result<Vec<(String, String)>, RouteError> {
        Ok(self.tree()?.routes())
    }
}
