use std::sync::Arc;
use std::time::Duration;

use crate::error::Failure;
use crate::event::{Request, Response};

/// A pipeline stage run around the handler: global `before_all`/`after_all`,
/// the auth check and per-route before/after hooks all share this shape.
///
/// A hook stops the pipeline either by returning an error or by pushing an
/// entry onto the response error list.
pub trait Hook: Send + Sync {
    fn call(&self, req: &mut Request, res: &mut Response) -> Result<(), Failure>;
}

impl<F> Hook for F
where
    F: Fn(&mut Request, &mut Response) -> Result<(), Failure> + Send + Sync,
{
    fn call(&self, req: &mut Request, res: &mut Response) -> Result<(), Failure> {
        self(req, res)
    }
}

/// Offered every unclassified failure after the 500 response is prepared.
pub trait ErrorHook: Send + Sync {
    fn on_error(&self, req: &Request, res: &mut Response, err: &Failure);
}

impl<F> ErrorHook for F
where
    F: Fn(&Request, &mut Response, &Failure) + Send + Sync,
{
    fn on_error(&self, req: &Request, res: &mut Response, err: &Failure) {
        self(req, res, err)
    }
}

/// Runs once when a handler loses the race against its timeout.
pub trait TimeoutHook: Send + Sync {
    fn on_timeout(&self, req: &Request, res: &mut Response, after: Duration);
}

impl<F> TimeoutHook for F
where
    F: Fn(&Request, &mut Response, Duration) + Send + Sync,
{
    fn on_timeout(&self, req: &Request, res: &mut Response, after: Duration) {
        self(req, res, after)
    }
}

/// Called once per request with the final response and total latency.
pub trait LogHook: Send + Sync {
    fn log(&self, req: &Request, res: &Response, latency: Duration);
}

impl<F> LogHook for F
where
    F: Fn(&Request, &Response, Duration) + Send + Sync,
{
    fn log(&self, req: &Request, res: &Response, latency: Duration) {
        self(req, res, latency)
    }
}

// Closure adapters: pin down the higher-ranked signature at the call site.

pub fn hook<F>(f: F) -> Arc<dyn Hook>
where
    F: Fn(&mut Request, &mut Response) -> Result<(), Failure> + Send + Sync + 'static,
{
    Arc::new(f)
}

pub fn error_hook<F>(f: F) -> Arc<dyn ErrorHook>
where
    F: Fn(&Request, &mut Response, &Failure) + Send + Sync + 'static,
{
    Arc::new(f)
}

pub fn timeout_hook<F>(f: F) -> Arc<dyn TimeoutHook>
where
    F: Fn(&Request, &mut Response, Duration) + Send + Sync + 'static,
{
    Arc::new(f)
}

pub fn log_hook<F>(f: F) -> Arc<dyn LogHook>
where
    F: Fn(&Request, &Response, Duration) + Send + Sync + 'static,
{
    Arc::new(f)
}
