//! `tracing` subscriber setup for hosts that do not install their own.
//!
//! Sampling is decided per request: when the `request` span opens, its
//! `request_id` picks a bucket, and every debug/info event inside that span
//! shares the outcome. A sampled request therefore logs completely and a
//! dropped one not at all. Warnings and errors always pass. Events outside
//! any request (cold start, route table dumps) pass unless only errors are
//! wanted.
//!
//! Call [`init_logging_with_config`] once during cold start and keep the
//! returned [`LogGuard`] alive for the lifetime of the process; dropping it
//! flushes buffered output.

use anyhow::{Context as _, Result};
use std::env;
use std::fmt;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::{Event, Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::ids::RequestId;

/// Name of the span the router opens around every request.
pub const REQUEST_SPAN: &str = "request";

const BUCKETS: u128 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("pretty") {
            LogFormat::Pretty
        } else {
            LogFormat::Json
        }
    }
}

/// Which requests get their debug/info events logged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sampling {
    All,
    /// Only warnings and errors
    ErrorOnly,
    /// Keep this fraction of requests, chosen by request id
    Requests(f64),
}

impl Sampling {
    /// Combine the mode and rate settings. Unknown modes log everything.
    #[must_use]
    pub fn parse(mode: &str, rate: Option<f64>) -> Self {
        match mode.to_ascii_lowercase().as_str() {
            "error-only" | "error_only" => Sampling::ErrorOnly,
            "sampled" => Sampling::Requests(rate.unwrap_or(1.0).clamp(0.0, 1.0)),
            _ => Sampling::All,
        }
    }

    fn keeps(self, id: &RequestId) -> bool {
        match self {
            Sampling::All => true,
            Sampling::ErrorOnly => false,
            Sampling::Requests(rate) => {
                let bucket = id.as_ulid().random() % BUCKETS;
                (bucket as f64) < rate * BUCKETS as f64
            }
        }
    }
}

/// Logging configuration, read from `TREEROUTE_LOG_*` by [`LogConfig::from_env`].
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default level when `RUST_LOG` is unset
    pub level: String,
    pub format: LogFormat,
    pub sampling: Sampling,
    /// Write through a background thread
    pub non_blocking: bool,
    /// Extra directives, comma-separated (`treeroute::router=debug,...`)
    pub directives: Option<String>,
    pub include_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
            sampling: Sampling::All,
            non_blocking: false,
            directives: None,
            include_location: false,
        }
    }
}

impl LogConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |key: &str| lookup(key).and_then(|v| v.trim().parse::<bool>().ok());
        let defaults = Self::default();
        let rate = lookup("TREEROUTE_LOG_SAMPLING_RATE").and_then(|v| v.trim().parse().ok());
        Self {
            level: lookup("TREEROUTE_LOG_LEVEL").unwrap_or(defaults.level),
            format: lookup("TREEROUTE_LOG_FORMAT").map_or(defaults.format, |v| LogFormat::parse(&v)),
            sampling: lookup("TREEROUTE_LOG_SAMPLING_MODE")
                .map_or(defaults.sampling, |mode| Sampling::parse(&mode, rate)),
            non_blocking: flag("TREEROUTE_LOG_ASYNC").unwrap_or(defaults.non_blocking),
            directives: lookup("TREEROUTE_LOG_TARGET_FILTER"),
            include_location: flag("TREEROUTE_LOG_INCLUDE_LOCATION")
                .unwrap_or(defaults.include_location),
        }
    }

    /// Pretty, debug-level output for local runs.
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            format: LogFormat::Pretty,
            include_location: true,
            ..Self::default()
        }
    }

    fn filter(&self) -> EnvFilter {
        let mut filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.to_ascii_lowercase()));
        let extra = self.directives.as_deref().unwrap_or_default();
        for directive in extra.split(',').map(str::trim).filter(|d| !d.is_empty()) {
            match directive.parse() {
                Ok(parsed) => filter = filter.add_directive(parsed),
                Err(err) => eprintln!("treeroute: ignoring log directive {directive:?}: {err}"),
            }
        }
        filter
    }
}

/// Sampling outcome stored on each request span.
struct Sampled(bool);

#[derive(Default)]
struct RequestIdField(Option<RequestId>);

impl Visit for RequestIdField {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "request_id" {
            self.0 = value.parse().ok();
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "request_id" {
            self.0 = format!("{value:?}").parse().ok();
        }
    }
}

/// Layer applying [`Sampling`] per request span.
pub struct RequestSampler {
    sampling: Sampling,
}

impl RequestSampler {
    #[must_use]
    pub fn new(sampling: Sampling) -> Self {
        Self { sampling }
    }
}

impl<S> Layer<S> for RequestSampler
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        if attrs.metadata().name() != REQUEST_SPAN {
            return;
        }
        let mut field = RequestIdField::default();
        attrs.record(&mut field);
        let keep = field.0.map_or(true, |request_id| self.sampling.keeps(&request_id));
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(Sampled(keep));
        }
    }

    fn event_enabled(&self, event: &Event<'_>, ctx: Context<'_, S>) -> bool {
        if matches!(*event.metadata().level(), Level::WARN | Level::ERROR) {
            return true;
        }
        match self.sampling {
            Sampling::All => return true,
            Sampling::ErrorOnly => return false,
            Sampling::Requests(_) => {}
        }
        ctx.event_scope(event)
            .and_then(|scope| {
                scope
                    .from_root()
                    .find_map(|span| span.extensions().get::<Sampled>().map(|s| s.0))
            })
            .unwrap_or(true)
    }
}

/// Keeps the non-blocking writer alive; dropping it flushes pending output.
#[must_use = "dropping the guard stops the background log writer"]
pub struct LogGuard(Option<WorkerGuard>);

impl fmt::Debug for LogGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LogGuard").field(&self.0.is_some()).finish()
    }
}

/// Install the global subscriber. Fails if one is already set.
///
/// ```no_run
/// use treeroute::telemetry::{init_logging_with_config, LogConfig};
///
/// let _guard = init_logging_with_config(&LogConfig::from_env())?;
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn init_logging_with_config(config: &LogConfig) -> Result<LogGuard> {
    let (writer, guard) = if config.non_blocking {
        let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
        (BoxMakeWriter::new(writer), Some(guard))
    } else {
        (BoxMakeWriter::new(std::io::stdout), None)
    };

    let output = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_writer(writer);
    let output = match config.format {
        LogFormat::Json => output.json().with_current_span(true).with_span_list(false).boxed(),
        LogFormat::Pretty => output.pretty().boxed(),
    };

    tracing_subscriber::registry()
        .with(config.filter())
        .with(RequestSampler::new(config.sampling))
        .with(output)
        .try_init()
        .context("failed to install the tracing subscriber")?;
    Ok(LogGuard(guard))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn request_id(random: u128) -> RequestId {
        ulid::Ulid::from_parts(1_700_000_000_000, random)
            .to_string()
            .parse()
            .unwrap()
    }

    #[derive(Clone, Default)]
    struct CountEvents(Arc<AtomicUsize>);

    impl<S: Subscriber> Layer<S> for CountEvents {
        fn on_event(&self, _event: &Event<'_>, _ctx: Context<'_, S>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn count_logged(sampling: Sampling, emit: impl FnOnce()) -> usize {
        let counter = CountEvents::default();
        let subscriber = tracing_subscriber::registry()
            .with(RequestSampler::new(sampling))
            .with(counter.clone());
        tracing::subscriber::with_default(subscriber, emit);
        counter.0.load(Ordering::SeqCst)
    }

    #[test]
    fn test_config_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("TREEROUTE_LOG_LEVEL", "debug"),
            ("TREEROUTE_LOG_FORMAT", "PRETTY"),
            ("TREEROUTE_LOG_SAMPLING_MODE", "sampled"),
            ("TREEROUTE_LOG_SAMPLING_RATE", "0.25"),
            ("TREEROUTE_LOG_ASYNC", "true"),
        ]
        .into_iter()
        .collect();
        let config = LogConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.sampling, Sampling::Requests(0.25));
        assert!(config.non_blocking);
        assert!(!config.include_location);
        assert!(config.directives.is_none());
    }

    #[test]
    fn test_sampling_parse() {
        assert_eq!(Sampling::parse("error_only", None), Sampling::ErrorOnly);
        assert_eq!(Sampling::parse("sampled", Some(3.0)), Sampling::Requests(1.0));
        assert_eq!(Sampling::parse("sampled", None), Sampling::Requests(1.0));
        assert_eq!(Sampling::parse("bogus", Some(0.1)), Sampling::All);
    }

    #[test]
    fn test_request_buckets() {
        let half = Sampling::Requests(0.5);
        assert!(half.keeps(&request_id(1_234)));
        assert!(!half.keeps(&request_id(7_500)));
        // same id, same answer
        assert_eq!(half.keeps(&request_id(42)), half.keeps(&request_id(42)));
        assert!(!Sampling::Requests(0.0).keeps(&request_id(0)));
    }

    #[test]
    fn test_dropped_request_loses_info_but_keeps_warnings() {
        let logged = count_logged(Sampling::Requests(0.5), || {
            let kept = tracing::info_span!("request", request_id = %request_id(10));
            kept.in_scope(|| {
                tracing::info!("kept");
                tracing::debug!("kept too");
            });
            let dropped = tracing::info_span!("request", request_id = %request_id(9_000));
            dropped.in_scope(|| {
                tracing::info!("dropped");
                tracing::warn!("always kept");
            });
            tracing::info!("outside any request");
        });
        assert_eq!(logged, 4);
    }

    #[test]
    fn test_error_only() {
        let logged = count_logged(Sampling::ErrorOnly, || {
            let span = tracing::info_span!("request", request_id = %request_id(1));
            span.in_scope(|| {
                tracing::info!("dropped");
                tracing::error!("kept");
            });
            tracing::info!("outside any request");
        });
        assert_eq!(logged, 1);
    }
}
