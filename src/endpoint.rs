//! Per-request view of one handler method.
//!
//! An [`Endpoint`] pairs a resolved module with the requested method and
//! merges the two configuration sources for it: the module's declarative
//! `requirements` entry and the metadata attached to the handler function.
//! Requirements win; metadata fills whatever requirements leave unset; hook
//! lists from both run, requirements first. See [`MethodConfig::merge`].

use http::Method;
use std::sync::Arc;
use std::time::Duration;

use crate::event::{Request, Response};
use crate::handler::{
    BodyTransform, Handler, HandlerFuture, HandlerModule, MetadataStore, MethodConfig,
    ValidationRequirements,
};
use crate::middleware::Hook;

#[derive(Clone)]
pub struct Endpoint {
    module: Arc<HandlerModule>,
    method: Method,
    handler: Handler,
    config: MethodConfig,
}

impl Endpoint {
    /// `None` when the module does not export `method`.
    pub fn new(module: Arc<HandlerModule>, method: Method, metadata: &MetadataStore) -> Option<Self> {
        let handler = module.handler(&method)?.clone();
        let attached = metadata.config_for(&handler);
        let config = MethodConfig::merge(module.requirements(&method), attached.as_ref());
        Some(Self {
            module,
            method,
            handler,
            config,
        })
    }

    pub fn module(&self) -> &Arc<HandlerModule> {
        &self.module
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// The merged configuration.
    pub fn config(&self) -> &MethodConfig {
        &self.config
    }

    pub fn has_auth(&self) -> bool {
        self.config.auth == Some(true)
    }

    pub fn has_before(&self) -> bool {
        !self.config.before.is_empty()
    }

    pub fn has_after(&self) -> bool {
        !self.config.after.is_empty()
    }

    pub fn has_timeout(&self) -> bool {
        self.config.timeout.is_some()
    }

    pub fn has_requirements(&self) -> bool {
        self.config
            .validation
            .as_ref()
            .is_some_and(|v| !v.is_empty())
    }

    pub fn has_body_transform(&self) -> bool {
        self.config.body.is_some()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.config.timeout
    }

    pub fn before(&self) -> &[Arc<dyn Hook>] {
        &self.config.before
    }

    pub fn after(&self) -> &[Arc<dyn Hook>] {
        &self.config.after
    }

    pub fn requirements(&self) -> Option<&ValidationRequirements> {
        self.config.validation.as_ref()
    }

    pub fn body_transform(&self) -> Option<&BodyTransform> {
        self.config.body.as_ref()
    }

    /// Route template declared for this method, if any.
    pub fn required_path(&self) -> Option<&str> {
        self.config.required_path.as_deref()
    }

    pub fn call(&self, req: Arc<Request>, res: Response) -> HandlerFuture {
        self.handler.call(req, res)
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("module", &self.module.name())
            .field("method", &self.method)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::hook;
    use serde_json::json;

    fn noop() -> Handler {
        Handler::new(|_req: Arc<Request>, res: Response| async move { Ok(res) })
    }

    #[test]
    fn test_missing_method_has_no_endpoint() {
        let module = HandlerModule::builder("users").get(noop()).shared();
        let store = MetadataStore::new();
        assert!(Endpoint::new(Arc::clone(&module), Method::GET, &store).is_some());
        assert!(Endpoint::new(module, Method::POST, &store).is_none());
    }

    #[test]
    fn test_probes_follow_merged_config() {
        let get = noop();
        let store = MetadataStore::new();
        store
            .annotate(&get)
            .auth(true)
            .after(hook(|_: &mut Request, _: &mut Response| Ok(())));

        let module = HandlerModule::builder("users")
            .get(get)
            .requirements(
                Method::GET,
                MethodConfig::new()
                    .auth(false)
                    .timeout(Duration::from_millis(10))
                    .validation(ValidationRequirements {
                        query: Some(json!({"type": "object"})),
                        ..Default::default()
                    }),
            )
            .shared();

        let endpoint = Endpoint::new(module, Method::GET, &store).unwrap();
        // requirements explicitly disable auth; metadata cannot re-enable it
        assert!(!endpoint.has_auth());
        assert!(endpoint.has_timeout());
        assert!(endpoint.has_after());
        assert!(!endpoint.has_before());
        assert!(endpoint.has_requirements());
        assert!(!endpoint.has_body_transform());
        assert_eq!(endpoint.timeout(), Some(Duration::from_millis(10)));
    }

    #[test]
    fn test_empty_requirements_are_not_requirements() {
        let module = HandlerModule::builder("x")
            .get(noop())
            .requirements(Method::GET, MethodConfig::new().validation(ValidationRequirements::default()))
            .shared();
        let endpoint = Endpoint::new(module, Method::GET, &MetadataStore::new()).unwrap();
        assert!(!endpoint.has_requirements());
    }
}
