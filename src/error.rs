//! Error types shared by the resolver and the request pipeline.
//!
//! Three families of errors travel through the crate:
//!
//! - [`RouteError`] - routing and startup failures (not found, method not allowed,
//!   tree conflicts, missing compiled handlers). None of them are retryable.
//! - [`AppError`] - a typed application error carrying its own status, key and
//!   message. Handlers and hooks return it to answer with a specific status.
//! - [`Failure`] - what a pipeline stage returns on the error path. The router
//!   funnels every `Failure` through a single classification point.

use std::path::PathBuf;
use std::time::Duration;

use http::StatusCode;
use thiserror::Error;

/// Routing and resolver-startup errors.
///
/// Every variant maps to a stable machine key and an HTTP status so that the
/// pipeline can copy it onto a response without further inspection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// No handler module is reachable for the request path.
    #[error("no route matches '{path}'")]
    NotFound {
        /// The request path that failed to resolve
        path: String,
    },

    /// The handler module exists but does not export the requested method.
    #[error("method {method} is not allowed on '{path}'")]
    MethodNotAllowed {
        /// Upper-case HTTP method
        method: String,
        /// The request path
        path: String,
    },

    /// The route source is ambiguous: two templated segments at one level, a
    /// file and a directory sharing a name, or overlapping list entries.
    #[error("route conflict at '{location}': {reason} [{}]", .entries.join(", "))]
    Conflict {
        /// Directory (or list) where the conflict was found
        location: String,
        /// Human readable description of the conflict
        reason: String,
        /// The offending entries
        entries: Vec<String>,
    },

    /// Neither a compiled output directory nor the uncompiled sources exist.
    #[error("no handlers found for pattern '{pattern}'; tried {}", join_paths(.attempted))]
    HandlersNotFound {
        /// The configured pattern
        pattern: String,
        /// Every directory that was checked, in order
        attempted: Vec<PathBuf>,
    },

    /// The configured pattern or list entry cannot be parsed.
    #[error("invalid route pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The rejected pattern
        pattern: String,
        /// Why it was rejected
        reason: String,
    },

    /// The module loader could not produce a handler module.
    #[error("failed to load handler module '{path}': {reason}")]
    ModuleLoad {
        /// Import path handed to the loader
        path: String,
        /// Loader supplied reason
        reason: String,
    },

    /// Walking the handler directory failed.
    #[error("failed to scan '{path}': {reason}")]
    ScanFailed {
        /// Directory being scanned
        path: String,
        /// Underlying I/O error
        reason: String,
    },

    /// The router settings are inconsistent with the runtime configuration.
    #[error("router misconfigured: {reason}")]
    Misconfigured {
        /// What is missing or inconsistent
        reason: String,
    },
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl RouteError {
    /// Build a conflict error.
    pub fn conflict(
        location: impl Into<String>,
        reason: impl Into<String>,
        entries: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        RouteError::Conflict {
            location: location.into(),
            reason: reason.into(),
            entries: entries.into_iter().map(Into::into).collect(),
        }
    }

    /// Build a not-found error for `path`.
    pub fn not_found(path: impl Into<String>) -> Self {
        RouteError::NotFound { path: path.into() }
    }

    /// HTTP status this error answers with.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            RouteError::NotFound { .. } => StatusCode::NOT_FOUND,
            RouteError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            RouteError::Conflict { .. } => StatusCode::CONFLICT,
            RouteError::HandlersNotFound { .. }
            | RouteError::InvalidPattern { .. }
            | RouteError::ModuleLoad { .. }
            | RouteError::ScanFailed { .. }
            | RouteError::Misconfigured { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable key.
    #[must_use]
    pub fn key(&self) -> &'static str {
        match self {
            RouteError::NotFound { .. } => "not_found",
            RouteError::MethodNotAllowed { .. } => "method_not_allowed",
            RouteError::Conflict { .. } => "route_conflict",
            RouteError::HandlersNotFound { .. } => "handlers_not_found",
            RouteError::InvalidPattern { .. } => "invalid_route_pattern",
            RouteError::ModuleLoad { .. } => "module_load_failed",
            RouteError::ScanFailed { .. } => "scan_failed",
            RouteError::Misconfigured { .. } => "router_misconfigured",
        }
    }

    /// Outcomes a client may see verbatim: 404, 405 and 409. Everything else
    /// is an internal failure whose details stay in the logs.
    #[must_use]
    pub fn is_client_facing(&self) -> bool {
        matches!(
            self,
            RouteError::NotFound { .. }
                | RouteError::MethodNotAllowed { .. }
                | RouteError::Conflict { .. }
        )
    }

    /// Configuration bugs, as opposed to an ordinary miss on a healthy tree.
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        !matches!(
            self,
            RouteError::NotFound { .. } | RouteError::MethodNotAllowed { .. }
        )
    }
}

/// A typed application error.
///
/// The router copies `status`, `key` and `message` straight onto the response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{key} ({status}): {message}")]
pub struct AppError {
    /// HTTP status code
    pub status: StatusCode,
    /// Stable machine-readable key
    pub key: String,
    /// Human readable message
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn bad_request(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, key, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden", message)
    }
}

impl From<RouteError> for AppError {
    fn from(err: RouteError) -> Self {
        AppError::new(err.status(), err.key(), err.to_string())
    }
}

/// Error returned by pipeline stages, hooks and handlers.
#[derive(Debug, Error)]
pub enum Failure {
    /// Routing failed (404 / 405 / 409 / startup)
    #[error(transparent)]
    Route(#[from] RouteError),

    /// Typed application error
    #[error(transparent)]
    App(#[from] AppError),

    /// The handler lost the race against its timer
    #[error("handler did not complete within {}ms", .after.as_millis())]
    Timeout {
        /// The timeout that elapsed
        after: Duration,
    },

    /// Anything else; answered with a generic 500
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl Failure {
    /// Wrap an arbitrary message as an unclassified failure.
    pub fn internal(message: impl std::fmt::Display) -> Self {
        Failure::Internal(anyhow::anyhow!("{message}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_error_statuses() {
        assert_eq!(RouteError::not_found("/x").status(), StatusCode::NOT_FOUND);
        let err = RouteError::MethodNotAllowed {
            method: "PUT".into(),
            path: "/x".into(),
        };
        assert_eq!(err.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(err.key(), "method_not_allowed");
        assert!(!err.is_configuration_error());

        let conflict = RouteError::conflict("users", "two templated segments", ["{id}", "{slug}"]);
        assert_eq!(conflict.status(), StatusCode::CONFLICT);
        assert!(conflict.is_configuration_error());
    }

    #[test]
    fn test_conflict_message_names_offenders() {
        let conflict = RouteError::conflict("users", "two templated segments", ["{id}", "{slug}"]);
        let msg = conflict.to_string();
        assert!(msg.contains("users"));
        assert!(msg.contains("{id}"));
        assert!(msg.contains("{slug}"));
    }

    #[test]
    fn test_handlers_not_found_lists_attempts() {
        let err = RouteError::HandlersNotFound {
            pattern: "src/api/**/*.ts".into(),
            attempted: vec![PathBuf::from("dist/src/api"), PathBuf::from("src/api")],
        };
        let msg = err.to_string();
        assert!(msg.contains("dist/src/api"));
        assert!(msg.contains(", src/api"));
    }

    #[test]
    fn test_only_routing_outcomes_are_client_facing() {
        assert!(RouteError::not_found("/x").is_client_facing());
        assert!(RouteError::conflict("users", "dup", ["a"]).is_client_facing());
        let load = RouteError::ModuleLoad {
            path: "items".into(),
            reason: "missing".into(),
        };
        assert!(!load.is_client_facing());
        let scan = RouteError::ScanFailed {
            path: "/srv/handlers".into(),
            reason: "permission denied".into(),
        };
        assert!(!scan.is_client_facing());
    }

    #[test]
    fn test_app_error_from_route_error() {
        let app: AppError = RouteError::not_found("/missing").into();
        assert_eq!(app.status, StatusCode::NOT_FOUND);
        assert_eq!(app.key, "not_found");
        assert!(app.message.contains("/missing"));
    }
}
