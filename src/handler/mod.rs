//! Handler modules and the configuration attached to them.
//!
//! A [`HandlerModule`] is what a module loader produces for one handler file:
//! a set of async functions keyed by HTTP method, plus an optional
//! `requirements` map of per-method [`MethodConfig`]. The same configuration
//! can instead be attached to an individual [`Handler`] through the
//! [`MetadataStore`]; the two sources are merged by
//! [`Endpoint`](crate::endpoint::Endpoint).

mod metadata;
mod requirements;

pub use metadata::{slot, Annotate, MetadataStore};
pub use requirements::{BodyTransform, MethodConfig, ValidationRequirements};

use futures::future::BoxFuture;
use futures::FutureExt;
use http::Method;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use crate::error::Failure;
use crate::event::{Request, Response};

/// Future returned by a handler invocation.
pub type HandlerFuture = BoxFuture<'static, Result<Response, Failure>>;

type HandlerFn = dyn Fn(Arc<Request>, Response) -> HandlerFuture + Send + Sync;

/// Identity of a handler function, used as the metadata store key.
///
/// Clones of a [`Handler`] share one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(usize);

/// An async request handler: `(request, response) -> response`.
///
/// The request is shared read-only; the handler returns the response it
/// wants to send, usually the one it was given with a body set.
#[derive(Clone)]
pub struct Handler(Arc<HandlerFn>);

impl Handler {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Arc<Request>, Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response, Failure>> + Send + 'static,
    {
        Handler(Arc::new(move |req, res| f(req, res).boxed()))
    }

    pub fn call(&self, req: Arc<Request>, res: Response) -> HandlerFuture {
        (self.0)(req, res)
    }

    pub fn id(&self) -> HandlerId {
        HandlerId(Arc::as_ptr(&self.0) as *const () as usize)
    }

    /// Attach metadata to this handler in the process-wide store.
    pub fn annotate(&self) -> Annotate<'static> {
        MetadataStore::global_ref().annotate(self)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handler").field(&self.id()).finish()
    }
}

/// One loaded handler file.
#[derive(Debug, Clone, Default)]
pub struct HandlerModule {
    name: String,
    handlers: HashMap<Method, Handler>,
    requirements: HashMap<Method, MethodConfig>,
}

impl HandlerModule {
    pub fn builder(name: impl Into<String>) -> HandlerModuleBuilder {
        HandlerModuleBuilder {
            module: HandlerModule {
                name: name.into(),
                ..Self::default()
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handler(&self, method: &Method) -> Option<&Handler> {
        self.handlers.get(method)
    }

    pub fn supports(&self, method: &Method) -> bool {
        self.handlers.contains_key(method)
    }

    /// Declarative requirements for `method`, if the module exports any.
    pub fn requirements(&self, method: &Method) -> Option<&MethodConfig> {
        self.requirements.get(method)
    }

    /// Exported methods, sorted by name.
    pub fn methods(&self) -> Vec<Method> {
        let mut methods: Vec<Method> = self.handlers.keys().cloned().collect();
        methods.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        methods
    }
}

/// Builder for [`HandlerModule`].
pub struct HandlerModuleBuilder {
    module: HandlerModule,
}

impl HandlerModuleBuilder {
    #[must_use]
    pub fn method(mut self, method: Method, handler: Handler) -> Self {
        self.module.handlers.insert(method, handler);
        self
    }

    /// Register an export by name. Only lower-case HTTP method names become
    /// routes; any other export is ignored.
    #[must_use]
    pub fn function(self, name: &str, handler: Handler) -> Self {
        let method = match name {
            "get" => Method::GET,
            "post" => Method::POST,
            "put" => Method::PUT,
            "patch" => Method::PATCH,
            "delete" => Method::DELETE,
            "head" => Method::HEAD,
            "options" => Method::OPTIONS,
            "trace" => Method::TRACE,
            "connect" => Method::CONNECT,
            _ => {
                debug!(module = %self.module.name, export = %name, "Ignoring non-method export");
                return self;
            }
        };
        self.method(method, handler)
    }

    #[must_use]
    pub fn get(self, handler: Handler) -> Self {
        self.method(Method::GET, handler)
    }

    #[must_use]
    pub fn post(self, handler: Handler) -> Self {
        self.method(Method::POST, handler)
    }

    #[must_use]
    pub fn put(self, handler: Handler) -> Self {
        self.method(Method::PUT, handler)
    }

    #[must_use]
    pub fn patch(self, handler: Handler) -> Self {
        self.method(Method::PATCH, handler)
    }

    #[must_use]
    pub fn delete(self, handler: Handler) -> Self {
        self.method(Method::DELETE, handler)
    }

    #[must_use]
    pub fn requirements(mut self, method: Method, config: MethodConfig) -> Self {
        self.module.requirements.insert(method, config);
        self
    }

    pub fn build(self) -> HandlerModule {
        self.module
    }

    /// Build and wrap in an `Arc`, the form loaders return.
    pub fn shared(self) -> Arc<HandlerModule> {
        Arc::new(self.module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo() -> Handler {
        Handler::new(|req: Arc<Request>, res: Response| async move {
            Ok(res.json(json!({ "path": req.path })))
        })
    }

    #[test]
    fn test_handler_identity_is_shared_by_clones() {
        let a = echo();
        let b = a.clone();
        let c = echo();
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn test_function_exports() {
        let module = HandlerModule::builder("users")
            .function("get", echo())
            .function("options", echo())
            .function("helper", echo())
            .function("POST", echo())
            .build();
        assert!(module.supports(&Method::GET));
        assert!(module.supports(&Method::OPTIONS));
        assert!(!module.supports(&Method::POST));
        assert_eq!(module.methods().len(), 2);
    }

    #[tokio::test]
    async fn test_handler_call() {
        let handler = echo();
        let req = Arc::new(Request::new(Method::GET, "/ping"));
        let res = handler.call(req, Response::new()).await.unwrap();
        assert_eq!(res.body(), Some(&json!({"path": "/ping"})));
    }
}
