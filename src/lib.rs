//! # treeroute
//!
//! **treeroute** routes serverless HTTP events to handler modules discovered
//! from a file tree, and runs each request through a middleware pipeline
//! around its handler.
//!
//! ## Overview
//!
//! There is no central route table. Handler files are laid out the way the
//! URL space is, `{param}` directories and files bind path parameters, and a
//! pluggable [`ModuleLoader`] turns each discovered file into a
//! [`HandlerModule`] exporting one async function per HTTP method.
//!
//! ## Architecture
//!
//! - **[`router`]** - file patterns, the route tree, resolver strategies
//!   (directory, pattern, list), the LRU resolver cache and the resolver
//! - **[`handler`]** - handler modules, per-method configuration and the
//!   metadata store handlers can be annotated through
//! - **[`endpoint`]** - merges a module's `requirements` with handler
//!   metadata into one effective configuration
//! - **[`pipeline`]** - the [`Router`]: hooks, auth, validation, the timed
//!   handler call and the error funnel
//! - **[`middleware`]** - hook traits, token auth and router metrics
//! - **[`validator`]** - schema and requirements validation
//! - **[`timer`]** - the handler/timeout race
//! - **[`event`]** - inbound events, requests and response envelopes
//! - **[`config`]** - declarative router settings (YAML / TOML / env)
//! - **[`telemetry`]** - `tracing` subscriber setup
//!
//! ### Request Handling Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Host as Serverless host
//!     participant Router
//!     participant Resolver as RouteResolver
//!     participant Cache as ResolverCache
//!     participant Strategy
//!     participant Handler
//!
//!     Host->>Router: handle(InboundEvent)
//!     Router->>Router: before_all hooks
//!     Router->>Resolver: resolve(method, path)
//!     Resolver->>Cache: get(path)
//!     alt cache miss
//!         Resolver->>Strategy: resolve(method, path)
//!         Strategy-->>Resolver: module, has_path_params, template
//!         Resolver->>Cache: put(path, module, dynamic)
//!     end
//!     Resolver-->>Router: Endpoint + path params
//!     Router->>Router: auth, validation, before hooks
//!     Router->>Handler: call (raced against timeout)
//!     Handler-->>Router: Response
//!     Router->>Router: after hooks, after_all, response validation
//!     Router-->>Host: OutboundResponse
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use treeroute::{
//!     Handler, HandlerModule, Request, Response, RouteSource, Router, RouterSettings,
//!     StaticRegistry,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let get_user = Handler::new(|req: Arc<Request>, res: Response| async move {
//!     let id = req.path_param("id").unwrap_or_default().to_string();
//!     Ok(res.json(serde_json::json!({ "id": id })))
//! });
//!
//! let registry = StaticRegistry::new()
//!     .with("users/{id}/index.js", HandlerModule::builder("users/{id}").get(get_user).build());
//!
//! let settings = RouterSettings::with_routes(RouteSource::Directory {
//!     base: "handlers".into(),
//!     extensions: vec!["js".into()],
//! });
//! let router = Router::builder(settings).loader(registry).build()?;
//!
//! let event = serde_json::from_str(r#"{"httpMethod":"GET","rawPath":"/users/42"}"#)?;
//! let response = router.handle(event).await;
//! assert_eq!(response.status_code, 200);
//! # Ok(())
//! # }
//! ```
//!
//! ## Handler Configuration
//!
//! Per-method behaviour (auth, timeout, hooks, validation schemas, a body
//! transform, the route template) comes from two places: the module's
//! `requirements` map, and metadata attached to the handler function through
//! [`MetadataStore`]. Requirements win; metadata fills the gaps; hooks from
//! both run.
//!
//! ## Known Limitations
//!
//! A handler that loses the race against its timeout is detached, not
//! cancelled. See [`timer`].

pub mod config;
pub mod endpoint;
pub mod error;
pub mod event;
pub mod handler;
pub mod ids;
pub mod middleware;
pub mod pipeline;
pub mod router;
pub mod telemetry;
pub mod timer;
pub mod validator;
pub mod validator_cache;

pub use config::{CacheMode, RouteSource, RouterSettings, ValidationKind};
pub use endpoint::Endpoint;
pub use error::{AppError, Failure, RouteError};
pub use event::{ErrorEntry, InboundEvent, OutboundResponse, Request, Response};
pub use handler::{
    Handler, HandlerModule, MetadataStore, MethodConfig, ValidationRequirements,
};
pub use ids::RequestId;
pub use middleware::{Hook, RouterMetrics, TokenAuth};
pub use pipeline::{Router, RouterBuilder, ValidationMode};
pub use router::{
    ModuleLoader, ModulePath, ResolvedRoute, ResolverCache, RouteResolver, StaticRegistry,
    Strategy,
};
pub use timer::{RaceError, Timer};
pub use validator::{RequirementsValidator, SchemaValidator, ValidationIssue};
