use http::StatusCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::endpoint::Endpoint;
use crate::error::{AppError, Failure, RouteError};
use crate::event::{InboundEvent, OutboundResponse, Request, Response};
use crate::middleware::{ErrorHook, Hook, LogHook, RouterMetrics, TimeoutHook};
use crate::router::RouteResolver;
use crate::timer::{guarded, RaceError, Timer};
use crate::validator::{RequirementsValidator, SchemaValidator, ValidationIssue};

use super::builder::RouterBuilder;

const INTERNAL_ERROR_MESSAGE: &str = "Internal Server Error";

/// How requests (and optionally responses) are validated.
#[derive(Clone)]
pub enum ValidationMode {
    Off,
    /// A host-supplied validator sees every request
    Schema(Arc<dyn SchemaValidator>),
    /// Endpoints are checked against their declared schemas
    Requirements(RequirementsValidator),
}

impl ValidationMode {
    fn name(&self) -> &'static str {
        match self {
            ValidationMode::Off => "off",
            ValidationMode::Schema(_) => "schema",
            ValidationMode::Requirements(_) => "requirements",
        }
    }
}

impl std::fmt::Debug for ValidationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Top-level request pipeline.
pub struct Router {
    pub(super) resolver: RouteResolver,
    pub(super) before_all: Vec<Arc<dyn Hook>>,
    pub(super) after_all: Vec<Arc<dyn Hook>>,
    pub(super) auth: Option<Arc<dyn Hook>>,
    pub(super) on_error: Option<Arc<dyn ErrorHook>>,
    pub(super) on_timeout: Option<Arc<dyn TimeoutHook>>,
    pub(super) loggers: Vec<Arc<dyn LogHook>>,
    pub(super) validation: ValidationMode,
    pub(super) validate_response: bool,
    pub(super) timeout: Option<Duration>,
    pub(super) expose_errors: bool,
    pub(super) metrics: Arc<RouterMetrics>,
}

/// Run `hooks` in order until one fails or leaves an error on the response.
fn run_hooks(hooks: &[Arc<dyn Hook>], req: &mut Request, res: &mut Response) -> Result<(), Failure> {
    for hook in hooks {
        if res.has_errors() {
            break;
        }
        hook.call(req, res)?;
    }
    Ok(())
}

impl Router {
    pub fn builder(settings: crate::config::RouterSettings) -> RouterBuilder {
        RouterBuilder::new(settings)
    }

    pub fn resolver(&self) -> &RouteResolver {
        &self.resolver
    }

    pub fn metrics(&self) -> &Arc<RouterMetrics> {
        &self.metrics
    }

    /// Prometheus text exposition of the router counters.
    pub fn metrics_text(&self) -> String {
        let (hits, misses) = self.resolver.cache_stats();
        self.metrics.render(hits, misses)
    }

    pub fn validation_mode(&self) -> &ValidationMode {
        &self.validation
    }

    /// `(route, module path)` pairs, sorted.
    pub fn routes(&self) -> Result<Vec<(String, String)>, RouteError> {
        self.resolver.routes()
    }

    /// Log every resolvable route.
    pub fn dump_routes(&self) {
        match self.routes() {
            Ok(routes) => {
                info!(
                    strategy = self.resolver.strategy().name(),
                    count = routes.len(),
                    "Route table"
                );
                for (route, module) in routes {
                    info!(route = %route, module = %module, "Route");
                }
            }
            Err(err) => error!(error = %err, "Failed to list routes"),
        }
    }

    /// Decode a host event, run it, and serialize the response.
    pub async fn handle(&self, event: InboundEvent) -> OutboundResponse {
        match Request::from_event(event) {
            Ok(req) => {
                let id = req.id;
                self.run(req).await.into_outbound(Some(&id))
            }
            Err(err) => {
                warn!(status = err.status.as_u16(), key = %err.key, message = %err.message, "Rejected malformed event");
                let mut res = Response::new();
                res.fail(err.status, err.key, err.message);
                self.metrics.record(res.status(), Duration::ZERO);
                res.into_outbound(None)
            }
        }
    }

    /// Run one request through the pipeline. Always produces a response.
    pub async fn run(&self, req: Request) -> Response {
        let span = info_span!(
            "request",
            request_id = %req.id,
            method = %req.method,
            path = %req.path,
        );
        self.run_inner(req).instrument(span).await
    }

    async fn run_inner(&self, mut req: Request) -> Response {
        let started = Instant::now();
        let mut res = Response::new();

        if let Err(failure) = self.stages(&mut req, &mut res).await {
            self.funnel(&req, &mut res, failure);
        }

        let latency = started.elapsed();
        self.metrics.record(res.status(), latency);
        for logger in &self.loggers {
            logger.log(&req, &res, latency);
        }
        info!(
            route = req.route.as_deref().unwrap_or("-"),
            status = res.status().as_u16(),
            errors = res.errors().len(),
            duration_us = latency.as_micros() as u64,
            "Request complete"
        );
        res
    }

    async fn stages(&self, req: &mut Request, res: &mut Response) -> Result<(), Failure> {
        run_hooks(&self.before_all, req, res)?;
        if self.halted(res, "before_all") {
            return Ok(());
        }

        let resolved = self.resolver.resolve(&req.method, &req.path)?;
        req.route = Some(resolved.route);
        req.path_params.extend(resolved.path_params);
        let endpoint = resolved.endpoint;

        if endpoint.has_auth() {
            let auth = self.auth.as_ref().ok_or_else(|| {
                Failure::internal(format!(
                    "route '{}' requires auth but no auth hook is configured",
                    req.route_or_path()
                ))
            })?;
            auth.call(req, res)?;
            if self.halted(res, "auth") {
                return Ok(());
            }
        }

        self.validate_request(&endpoint, req, res)?;
        if self.halted(res, "validate_request") {
            return Ok(());
        }

        if let Some(transform) = endpoint.body_transform() {
            let body = std::mem::take(&mut req.body);
            req.body = transform(body)?;
        }

        if endpoint.has_before() {
            run_hooks(endpoint.before(), req, res)?;
            if self.halted(res, "before") {
                return Ok(());
            }
        }

        self.invoke(&endpoint, req, res).await?;
        if self.halted(res, "handler") {
            return Ok(());
        }

        if endpoint.has_after() {
            run_hooks(endpoint.after(), req, res)?;
            if self.halted(res, "after") {
                return Ok(());
            }
        }

        run_hooks(&self.after_all, req, res)?;
        if self.halted(res, "after_all") {
            return Ok(());
        }

        if self.validate_response {
            self.check_response(&endpoint, req, res)?;
        }
        Ok(())
    }

    fn halted(&self, res: &Response, stage: &'static str) -> bool {
        let halted = res.has_errors();
        if halted {
            debug!(stage, errors = res.errors().len(), "Pipeline short-circuited");
        }
        halted
    }

    /// Call the handler, raced against the effective timeout.
    async fn invoke(
        &self,
        endpoint: &Endpoint,
        req: &mut Request,
        res: &mut Response,
    ) -> Result<(), Failure> {
        let started = Instant::now();
        let shared = Arc::new(std::mem::take(req));
        let call = endpoint.call(Arc::clone(&shared), std::mem::take(res));
        // a zero route timeout disables the race, like a zero global one
        let timeout = match endpoint.timeout() {
            Some(after) if after.is_zero() => None,
            Some(after) => Some(after),
            None => self.timeout,
        };
        let outcome = match timeout {
            Some(after) => Timer::new(after).race(call).await,
            None => guarded(call).await,
        };
        // a timed-out handler still holds its copy
        *req = Arc::try_unwrap(shared).unwrap_or_else(|shared| Request::clone(&shared));

        debug!(
            handler = %endpoint.module().name(),
            method = %endpoint.method(),
            duration_us = started.elapsed().as_micros() as u64,
            "Handler execution complete"
        );
        match outcome {
            Ok(Ok(response)) => {
                *res = response;
                Ok(())
            }
            Ok(Err(failure)) => Err(failure),
            Err(RaceError::TimedOut(after)) => Err(Failure::Timeout { after }),
            Err(RaceError::Panicked(message)) => {
                Err(Failure::internal(format!("handler panicked: {message}")))
            }
        }
    }

    fn validate_request(
        &self,
        endpoint: &Endpoint,
        req: &Request,
        res: &mut Response,
    ) -> Result<(), Failure> {
        let issues = match &self.validation {
            ValidationMode::Off => return Ok(()),
            ValidationMode::Schema(validator) => validator.validate_request(req),
            ValidationMode::Requirements(validator) => match endpoint.requirements() {
                Some(requirements) if endpoint.has_requirements() => {
                    validator.validate_request(requirements, req)?
                }
                _ => return Ok(()),
            },
        };
        if !issues.is_empty() {
            warn!(
                route = req.route_or_path(),
                mode = self.validation.name(),
                issues = issues.len(),
                "Request validation failed"
            );
            record_issues(res, StatusCode::BAD_REQUEST, issues);
        }
        Ok(())
    }

    fn check_response(
        &self,
        endpoint: &Endpoint,
        req: &Request,
        res: &mut Response,
    ) -> Result<(), Failure> {
        let issues = match &self.validation {
            ValidationMode::Off => return Ok(()),
            ValidationMode::Schema(validator) => validator.validate_response(req, res),
            ValidationMode::Requirements(validator) => match endpoint.requirements() {
                Some(requirements) => validator.validate_response(requirements, res)?,
                None => return Ok(()),
            },
        };
        if !issues.is_empty() {
            error!(
                route = req.route_or_path(),
                issues = issues.len(),
                "Response validation failed"
            );
            record_issues(res, StatusCode::INTERNAL_SERVER_ERROR, issues);
        }
        Ok(())
    }

    /// The single place failures become responses.
    fn funnel(&self, req: &Request, res: &mut Response, failure: Failure) {
        match failure {
            Failure::Route(err) if err.is_client_facing() => {
                let app = AppError::from(err);
                res.fail(app.status, app.key, app.message);
            }
            Failure::Route(err) => {
                self.funnel(req, res, Failure::Internal(anyhow::Error::new(err)));
            }
            Failure::App(err) => {
                debug!(status = err.status.as_u16(), key = %err.key, "Application error");
                res.fail(err.status, err.key, err.message);
            }
            Failure::Timeout { after } => {
                self.metrics.inc_timeout();
                warn!(
                    route = req.route_or_path(),
                    timeout_ms = after.as_millis() as u64,
                    "Handler timed out"
                );
                res.fail(
                    StatusCode::REQUEST_TIMEOUT,
                    "timeout",
                    format!("request timed out after {}ms", after.as_millis()),
                );
                if let Some(hook) = &self.on_timeout {
                    hook.on_timeout(req, res, after);
                }
            }
            Failure::Internal(err) => {
                self.metrics.inc_internal_failure();
                error!(
                    request_id = %req.id,
                    method = %req.method,
                    path = %req.path,
                    route = req.route_or_path(),
                    query = ?req.query,
                    path_params = ?req.path_params,
                    error = %err,
                    backtrace = %err.backtrace(),
                    "Unhandled failure"
                );
                let message = if self.expose_errors {
                    format!("{err:#}")
                } else {
                    INTERNAL_ERROR_MESSAGE.to_string()
                };
                res.fail(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message);
                if let Some(hook) = &self.on_error {
                    hook.on_error(req, res, &Failure::Internal(err));
                }
            }
        }
    }
}

fn record_issues(res: &mut Response, status: StatusCode, issues: Vec<ValidationIssue>) {
    res.set_status(status);
    for issue in issues {
        res.push_entry(issue.into());
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("strategy", &self.resolver.strategy().name())
            .field("before_all", &self.before_all.len())
            .field("after_all", &self.after_all.len())
            .field("auth", &self.auth.is_some())
            .field("validation", &self.validation)
            .field("validate_response", &self.validate_response)
            .field("timeout", &self.timeout)
            .field("expose_errors", &self.expose_errors)
            .finish()
    }
}
