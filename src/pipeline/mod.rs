//! # Request Pipeline
//!
//! [`Router`] drives one request through the middleware stages around its
//! handler and converts every failure into exactly one response.
//!
//! ## Stages
//!
//! 1. `before_all` hooks
//! 2. route resolution
//! 3. `auth` (only for endpoints that require it)
//! 4. request validation (schema or requirements mode)
//! 5. body transform
//! 6. per-route `before` hooks
//! 7. handler, raced against the route or global timeout
//! 8. per-route `after` hooks
//! 9. `after_all` hooks
//! 10. response validation (optional)
//!
//! Every stage after the first runs only while the response error list is
//! empty: a hook that pushes an error ends the request with that error.
//!
//! ## Error funnel
//!
//! A stage that returns a [`Failure`](crate::error::Failure) jumps straight
//! to the funnel, which classifies it:
//!
//! | Failure | Response |
//! |---|---|
//! | not found, method not allowed, conflict | its status and key (404, 405, 409) |
//! | typed application error | status, key and message copied as-is |
//! | timeout | 408 `timeout`, then the timeout hook |
//! | anything else, other routing errors included | 500 `internal_error`, logged, then the error hook |
//!
//! ## Example
//!
//! ```rust,ignore
//! use treeroute::{HandlerModule, Handler, Router, RouterSettings, StaticRegistry};
//!
//! let registry = StaticRegistry::new().with("users/index.js", users_module());
//! let router = Router::builder(RouterSettings::from_yaml_str(SETTINGS)?)
//!     .loader(registry)
//!     .build()?;
//! let response = router.handle(event).await;
//! ```

mod builder;
mod router;

pub use builder::RouterBuilder;
pub use router::{Router, ValidationMode};
