mod auth;
mod core;
mod metrics;

pub use auth::{Principal, TokenAuth};
pub use core::{error_hook, hook, log_hook, timeout_hook, ErrorHook, Hook, LogHook, TimeoutHook};
pub use metrics::RouterMetrics;
