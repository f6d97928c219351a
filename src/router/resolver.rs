use http::Method;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::cache::ResolverCache;
use super::loader::ModuleLoader;
use super::pattern::{decode_segments, split_segments, template_name};
use super::strategy::{Resolution, Strategy};
use crate::config::{CacheMode, RouterSettings};
use crate::endpoint::Endpoint;
use crate::error::RouteError;
use crate::handler::{HandlerModule, MetadataStore};

/// Cached part of a strategy lookup.
#[derive(Debug, Clone)]
struct CachedRoute {
    module: Arc<HandlerModule>,
    template: Option<String>,
}

/// A request resolved to a callable endpoint.
#[derive(Debug, Clone)]
pub struct ResolvedRoute {
    pub module: Arc<HandlerModule>,
    /// Effective route: the template for dynamic routes, otherwise the
    /// matched route path
    pub route: String,
    pub path_params: HashMap<String, String>,
    pub endpoint: Endpoint,
    pub from_cache: bool,
}

/// Coordinates the cache, the active strategy and path parameter extraction.
pub struct RouteResolver {
    strategy: Strategy,
    cache: ResolverCache<CachedRoute>,
    metadata: Arc<MetadataStore>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl RouteResolver {
    pub fn new(
        strategy: Strategy,
        cache_size: usize,
        cache_mode: CacheMode,
        metadata: Arc<MetadataStore>,
    ) -> Self {
        Self {
            strategy,
            cache: ResolverCache::new(cache_size, cache_mode),
            metadata,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn from_settings(
        settings: &RouterSettings,
        loader: Arc<dyn ModuleLoader>,
        metadata: Arc<MetadataStore>,
    ) -> Result<Self, RouteError> {
        let strategy = Strategy::from_source(&settings.routes, loader)?;
        Ok(Self::new(
            strategy,
            settings.cache_size,
            settings.cache_mode,
            metadata,
        ))
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn metadata(&self) -> &Arc<MetadataStore> {
        &self.metadata
    }

    fn cache_key(&self, method: &Method, path: &str) -> String {
        let mut key = String::with_capacity(path.len() + 8);
        if self.strategy.keys_by_method() {
            key.push_str(method.as_str());
            key.push(' ');
        }
        key.push('/');
        for (i, segment) in split_segments(path).enumerate() {
            if i > 0 {
                key.push('/');
            }
            key.push_str(segment);
        }
        key
    }

    fn lookup(
        &self,
        key: &str,
        method: &Method,
        path: &str,
    ) -> Result<(CachedRoute, bool, bool), RouteError> {
        if let Some(entry) = self.cache.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, is_dynamic = entry.is_dynamic, cache = "hit", "Resolver cache hit");
            return Ok((entry.value, entry.is_dynamic, true));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let Resolution {
            module,
            has_path_params,
            template,
        } = self.strategy.resolve(method, path)?;
        let cached = CachedRoute { module, template };
        let stored = self.cache.put(key, cached.clone(), has_path_params);
        debug!(key = %key, is_dynamic = has_path_params, stored, cache = "miss", "Resolver cache miss");
        Ok((cached, has_path_params, false))
    }

    /// Resolve a request to an endpoint and its path parameters.
    ///
    /// Errors keep their class: `NotFound` (404), `MethodNotAllowed` (405)
    /// and configuration errors such as `Conflict` (409).
    pub fn resolve(&self, method: &Method, path: &str) -> Result<ResolvedRoute, RouteError> {
        let started = Instant::now();
        debug!(method = %method, path = %path, strategy = self.strategy.name(), "Route match attempt");

        let result = self.resolve_inner(method, path);
        let duration_us = started.elapsed().as_micros() as u64;
        match &result {
            Ok(resolved) => info!(
                method = %method,
                path = %path,
                route = %resolved.route,
                handler = %resolved.module.name(),
                path_params = ?resolved.path_params,
                cache = if resolved.from_cache { "hit" } else { "miss" },
                duration_us,
                "Route matched"
            ),
            Err(err) if err.is_configuration_error() => error!(
                method = %method,
                path = %path,
                error = %err,
                duration_us,
                "Route configuration error"
            ),
            Err(err) => warn!(
                method = %method,
                path = %path,
                status = err.status().as_u16(),
                duration_us,
                "No route matched"
            ),
        }
        result
    }

    fn resolve_inner(&self, method: &Method, path: &str) -> Result<ResolvedRoute, RouteError> {
        let key = self.cache_key(method, path);
        let (cached, is_dynamic, from_cache) = self.lookup(&key, method, path)?;
        let CachedRoute { module, template } = cached;

        // a dynamic route with an unsupported method is still 405
        let endpoint = Endpoint::new(Arc::clone(&module), method.clone(), &self.metadata)
            .ok_or_else(|| RouteError::MethodNotAllowed {
                method: method.to_string(),
                path: path.to_string(),
            })?;

        let (route, path_params) = if is_dynamic {
            let template = endpoint
                .required_path()
                .map(str::to_string)
                .or(template)
                .ok_or_else(|| RouteError::not_found(path))?;
            let params = extract_params(&template, path)?;
            (template, params)
        } else {
            (template.unwrap_or_else(|| key.clone()), HashMap::new())
        };

        Ok(ResolvedRoute {
            module,
            route,
            path_params,
            endpoint,
            from_cache,
        })
    }

    /// Build the routing index and load every module eagerly, so conflicts
    /// and missing modules fail here rather than on a request.
    pub fn preload(&self) -> Result<usize, RouteError> {
        self.cache.clear();
        self.strategy.auto_load()
    }

    pub fn reset(&self) {
        self.strategy.reset();
        self.cache.clear();
        info!(strategy = self.strategy.name(), "Resolver reset");
    }

    pub fn cached_routes(&self) -> usize {
        self.cache.len()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// `(hits, misses)` since construction.
    pub fn cache_stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }

    pub fn routes(&self) -> Result<Vec<(String, String)>, RouteError> {
        self.strategy.routes()
    }
}

/// Bind the `{name}` segments of `template` to the matching request
/// segments. A segment count mismatch is `NotFound`.
pub fn extract_params(template: &str, path: &str) -> Result<HashMap<String, String>, RouteError> {
    let decoded = decode_segments(path)?;
    let expected: Vec<&str> = split_segments(template).collect();
    if expected.len() != decoded.len() {
        return Err(RouteError::not_found(path));
    }
    Ok(expected
        .iter()
        .zip(decoded)
        .filter_map(|(segment, value)| {
            template_name(segment).map(|name| (name.to_string(), value.into_owned()))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouteSource;
    use crate::event::{Request, Response};
    use crate::handler::{Handler, MethodConfig};
    use crate::router::loader::StaticRegistry;
    use std::collections::BTreeMap;

    fn noop() -> Handler {
        Handler::new(|_req: Arc<Request>, res: Response| async move { Ok(res) })
    }

    fn list_resolver(mode: CacheMode) -> RouteResolver {
        let registry = StaticRegistry::new()
            .with("users/get", HandlerModule::builder("users/get").get(noop()).build())
            .with(
                "users/list",
                HandlerModule::builder("users/list").get(noop()).build(),
            );
        let routes: BTreeMap<String, String> = [
            ("GET::/users/{id}", "users/get"),
            ("GET::/users", "users/list"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let strategy =
            Strategy::from_source(&RouteSource::List { routes }, Arc::new(registry)).unwrap();
        RouteResolver::new(strategy, 16, mode, Arc::new(MetadataStore::new()))
    }

    #[test]
    fn test_extract_params() {
        let params = extract_params("/users/{id}/posts/{post}", "/users/42/posts/a%20b").unwrap();
        assert_eq!(params["id"], "42");
        assert_eq!(params["post"], "a b");
        assert!(matches!(
            extract_params("/users/{id}", "/users/42/posts"),
            Err(RouteError::NotFound { .. })
        ));
    }

    #[test]
    fn test_dynamic_route_extracts_params() {
        let resolver = list_resolver(CacheMode::All);
        let resolved = resolver.resolve(&Method::GET, "/users/42").unwrap();
        assert_eq!(resolved.route, "/users/{id}");
        assert_eq!(resolved.path_params["id"], "42");
        assert!(!resolved.from_cache);

        let again = resolver.resolve(&Method::GET, "/users/42").unwrap();
        assert!(again.from_cache);
        assert!(Arc::ptr_eq(&resolved.module, &again.module));
        assert_eq!(resolver.cache_stats(), (1, 1));
    }

    #[test]
    fn test_static_mode_skips_dynamic_entries() {
        let resolver = list_resolver(CacheMode::Static);
        resolver.resolve(&Method::GET, "/users/1").unwrap();
        resolver.resolve(&Method::GET, "/users/1").unwrap();
        resolver.resolve(&Method::GET, "/users").unwrap();
        resolver.resolve(&Method::GET, "/users/").unwrap();
        // "/users" and "/users/" share one key
        assert_eq!(resolver.cache_stats(), (1, 3));
    }

    #[test]
    fn test_required_path_overrides_strategy_template() {
        let get = noop();
        let registry = StaticRegistry::new().with(
            "users",
            HandlerModule::builder("users")
                .get(get)
                .requirements(Method::GET, MethodConfig::new().required_path("/people/{person}"))
                .build(),
        );
        let routes: BTreeMap<String, String> =
            [("GET::/users/{id}".to_string(), "users".to_string())].into_iter().collect();
        let strategy =
            Strategy::from_source(&RouteSource::List { routes }, Arc::new(registry)).unwrap();
        let resolver =
            RouteResolver::new(strategy, 0, CacheMode::All, Arc::new(MetadataStore::new()));

        let resolved = resolver.resolve(&Method::GET, "/users/7").unwrap();
        assert_eq!(resolved.route, "/people/{person}");
        assert_eq!(resolved.path_params["person"], "7");
    }

    #[test]
    fn test_method_checked_before_template() {
        let registry =
            StaticRegistry::new().with("users", HandlerModule::builder("users").get(noop()).build());
        let routes: BTreeMap<String, String> = [
            ("GET::/users/{id}".to_string(), "users".to_string()),
            ("POST::/users/{id}".to_string(), "users".to_string()),
        ]
        .into_iter()
        .collect();
        let strategy =
            Strategy::from_source(&RouteSource::List { routes }, Arc::new(registry)).unwrap();
        let resolver =
            RouteResolver::new(strategy, 8, CacheMode::All, Arc::new(MetadataStore::new()));
        assert!(matches!(
            resolver.resolve(&Method::POST, "/users/1"),
            Err(RouteError::MethodNotAllowed { .. })
        ));
    }
}
