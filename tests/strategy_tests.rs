mod common;

use common::handler_tree::HandlerTree;
use common::modules::EchoLoader;
use http::Method;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use treeroute::{ModuleLoader, RouteError, RouteSource, Strategy};

fn directory(tree: &HandlerTree, loader: Arc<dyn ModuleLoader>) -> Strategy {
    Strategy::from_source(
        &RouteSource::Directory {
            base: tree.root().to_path_buf(),
            extensions: vec!["js".to_string()],
        },
        loader,
    )
    .unwrap()
}

#[test]
fn test_directory_strategy_matches_tree() {
    let tree = HandlerTree::new(&[
        "index.js",
        "users/index.js",
        "users/me/index.js",
        "users/{id}/index.js",
        "users/{id}/posts/posts.js",
        "users/{id}/helpers.js",
    ]);
    let strategy = directory(&tree, EchoLoader::new());
    assert_eq!(strategy.name(), "directory");
    assert!(!strategy.keys_by_method());

    let cases = [
        ("/", "index", false),
        ("/users", "users/index", false),
        ("/users/me", "users/me/index", false),
        ("/users/42", "users/{id}/index", true),
        ("/users/42/posts", "users/{id}/posts/posts", true),
    ];
    for (path, module, dynamic) in cases {
        let resolved = strategy.resolve(&Method::GET, path).unwrap();
        assert_eq!(resolved.module.name(), module, "path {path}");
        assert_eq!(resolved.has_path_params, dynamic, "path {path}");
    }

    // helpers are not routes; the templated directory's index answers instead
    let fallback = strategy.resolve(&Method::GET, "/users/42/helpers").unwrap();
    assert_eq!(fallback.module.name(), "users/{id}/index");
    assert_eq!(fallback.template.as_deref(), Some("/users/{id}"));
    assert!(matches!(
        strategy.resolve(&Method::GET, "/users/me/helpers"),
        Err(RouteError::NotFound { .. })
    ));
    let routes: Vec<String> = strategy.routes().unwrap().into_iter().map(|(r, _)| r).collect();
    assert!(!routes.iter().any(|r| r.ends_with("helpers")));
}

#[test]
fn test_directory_strategy_decodes_and_normalizes_separators() {
    let tree = HandlerTree::new(&["files/{name}/index.js"]);
    let strategy = directory(&tree, EchoLoader::new());
    let resolved = strategy.resolve(&Method::GET, "\\files\\my%20doc").unwrap();
    assert_eq!(resolved.template.as_deref(), Some("/files/{name}"));
}

#[test]
fn test_modules_are_memoized() {
    let tree = HandlerTree::new(&["users/index.js", "orders/index.js"]);
    let loader = EchoLoader::new();
    let strategy = directory(&tree, Arc::clone(&loader) as Arc<dyn ModuleLoader>);

    let a = strategy.resolve(&Method::GET, "/users").unwrap();
    let b = strategy.resolve(&Method::POST, "/users/").unwrap();
    assert!(Arc::ptr_eq(&a.module, &b.module));
    assert_eq!(loader.loads(), 1);

    assert_eq!(strategy.auto_load().unwrap(), 2);
    assert_eq!(loader.loads(), 2);

    strategy.reset();
    let c = strategy.resolve(&Method::GET, "/users").unwrap();
    assert!(!Arc::ptr_eq(&a.module, &c.module));
    assert_eq!(loader.loads(), 3);
}

#[test]
fn test_auto_load_rejects_conflicting_tree() {
    let tree = HandlerTree::new(&["users/{id}/index.js", "users/{slug}/index.js"]);
    let strategy = directory(&tree, EchoLoader::new());
    match strategy.auto_load() {
        Err(RouteError::Conflict { location, entries, .. }) => {
            assert_eq!(location, "/users");
            assert_eq!(entries.len(), 2);
        }
        other => panic!("expected conflict, got {other:?}"),
    }
    // lazily built trees fail the same way instead of picking one
    assert!(matches!(
        strategy.resolve(&Method::GET, "/users/1"),
        Err(RouteError::Conflict { .. })
    ));
}

#[test]
fn test_pattern_strategy_prefers_compiled_output() {
    let tree = HandlerTree::new(&[
        "src/api/users/index.handler.ts",
        "src/api/users/{id}.handler.ts",
        "dist/api/users/index.handler.js",
        "dist/api/users/{id}.handler.js",
        "dist/api/users/{id}.handler.js.map",
    ]);
    let strategy = Strategy::from_source(
        &RouteSource::Pattern {
            root: tree.root().to_path_buf(),
            pattern: "src/api/**/*.handler.ts".to_string(),
        },
        EchoLoader::new(),
    )
    .unwrap();

    let resolved = strategy.resolve(&Method::GET, "/users/9").unwrap();
    assert_eq!(resolved.module.name(), "users/{id}.handler");
    assert!(resolved.has_path_params);
    let routes = strategy.routes().unwrap();
    assert_eq!(
        routes,
        [
            ("/users".to_string(), "users/index.handler.js".to_string()),
            ("/users/{id}".to_string(), "users/{id}.handler.js".to_string()),
        ]
    );
}

#[test]
fn test_pattern_strategy_alternation_and_prefix() {
    let tree = HandlerTree::new(&["routes/get.health.js", "routes/get.status.mjs"]);
    let strategy = Strategy::from_source(
        &RouteSource::Pattern {
            root: tree.root().to_path_buf(),
            pattern: "routes/get.*.{js,mjs}".to_string(),
        },
        EchoLoader::new(),
    )
    .unwrap();
    assert_eq!(
        strategy.resolve(&Method::GET, "/health").unwrap().module.name(),
        "get.health"
    );
    assert_eq!(
        strategy.resolve(&Method::GET, "/status").unwrap().module.name(),
        "get.status"
    );
}

#[test]
fn test_pattern_strategy_missing_handlers_fails_fast() {
    let tree = HandlerTree::new(&[]);
    let result = Strategy::from_source(
        &RouteSource::Pattern {
            root: tree.root().to_path_buf(),
            pattern: "src/api/*.ts".to_string(),
        },
        EchoLoader::new(),
    );
    match result {
        Err(RouteError::HandlersNotFound { attempted, .. }) => {
            let attempted: Vec<PathBuf> = attempted
                .into_iter()
                .map(|p| p.strip_prefix(tree.root()).unwrap().to_path_buf())
                .collect();
            assert_eq!(attempted.first(), Some(&PathBuf::from("dist/src/api")));
            assert_eq!(attempted.last(), Some(&PathBuf::from("src/api")));
        }
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("expected HandlersNotFound"),
    }
}

#[test]
fn test_list_strategy() {
    let routes: BTreeMap<String, String> = [
        ("get::/users/{id}", "users/get"),
        ("PUT::/users/{id}", "users/put"),
        ("GET::/users", "users/list"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    let strategy = Strategy::from_source(&RouteSource::List { routes }, EchoLoader::new()).unwrap();
    assert!(strategy.keys_by_method());

    let get = strategy.resolve(&Method::GET, "/users/3").unwrap();
    assert_eq!(get.module.name(), "users/get");
    let put = strategy.resolve(&Method::PUT, "/users/3").unwrap();
    assert_eq!(put.module.name(), "users/put");
    assert!(matches!(
        strategy.resolve(&Method::DELETE, "/users/3"),
        Err(RouteError::MethodNotAllowed { .. })
    ));
    assert!(matches!(
        strategy.resolve(&Method::GET, "/accounts"),
        Err(RouteError::NotFound { .. })
    ));
    assert_eq!(strategy.auto_load().unwrap(), 3);
}
