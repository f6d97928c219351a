#![allow(dead_code)]

pub mod handler_tree {
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    /// Handler files laid out on disk for one test; removed on drop.
    pub struct HandlerTree {
        dir: TempDir,
    }

    impl HandlerTree {
        /// Create empty files at the given `/`-separated relative paths.
        pub fn new(files: &[&str]) -> Self {
            let dir = tempfile::tempdir().unwrap();
            for file in files {
                let path = dir.path().join(file);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).unwrap();
                }
                std::fs::write(&path, "// handler").unwrap();
            }
            Self { dir }
        }

        pub fn root(&self) -> &Path {
            self.dir.path()
        }

        pub fn join(&self, relative: &str) -> PathBuf {
            self.dir.path().join(relative)
        }
    }
}

pub mod modules {
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use treeroute::{Handler, HandlerModule, ModuleLoader, ModulePath, Request, Response, RouteError};

    /// Answers with the module name, the matched route and path params.
    pub fn echo(module: &str) -> Handler {
        let module = module.to_string();
        Handler::new(move |req: Arc<Request>, res: Response| {
            let module = module.clone();
            async move {
                Ok(res.json(json!({
                    "module": module,
                    "route": req.route,
                    "params": req.path_params,
                })))
            }
        })
    }

    /// GET and POST echo handlers named after the file they came from.
    pub fn echo_module(name: &str) -> HandlerModule {
        HandlerModule::builder(name)
            .get(echo(name))
            .post(echo(name))
            .build()
    }

    /// Loader that fabricates an echo module for any path and counts loads.
    pub struct EchoLoader {
        pub loads: AtomicUsize,
    }

    impl EchoLoader {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                loads: AtomicUsize::new(0),
            })
        }

        pub fn loads(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }
    }

    impl ModuleLoader for EchoLoader {
        fn load(&self, path: &ModulePath) -> Result<Arc<HandlerModule>, RouteError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(echo_module(path.stem())))
        }
    }
}

pub mod settings {
    use std::collections::BTreeMap;
    use std::path::Path;
    use treeroute::{RouteSource, RouterSettings};

    pub fn directory(base: &Path) -> RouterSettings {
        RouterSettings::with_routes(RouteSource::Directory {
            base: base.to_path_buf(),
            extensions: vec!["js".to_string()],
        })
    }

    pub fn pattern(root: &Path, pattern: &str) -> RouterSettings {
        RouterSettings::with_routes(RouteSource::Pattern {
            root: root.to_path_buf(),
            pattern: pattern.to_string(),
        })
    }

    pub fn list(routes: &[(&str, &str)]) -> RouterSettings {
        let routes: BTreeMap<String, String> = routes
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RouterSettings::with_routes(RouteSource::List { routes })
    }
}
