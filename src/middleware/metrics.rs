use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use http::StatusCode;

use super::LogHook;
use crate::event::{Request, Response};

/// Request counters for one router instance.
///
/// All counters are relaxed atomics: cheap to bump from concurrent requests,
/// eventually consistent when read. Resolver cache hits and misses live on
/// the resolver and are passed in when rendering.
#[derive(Debug, Default)]
pub struct RouterMetrics {
    requests: AtomicU64,
    status_2xx: AtomicU64,
    status_4xx: AtomicU64,
    status_5xx: AtomicU64,
    not_found: AtomicU64,
    method_not_allowed: AtomicU64,
    timeouts: AtomicU64,
    internal_failures: AtomicU64,
    total_latency_ns: AtomicU64,
}

impl RouterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one finished request.
    pub fn record(&self, status: StatusCode, latency: Duration) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let nanos = u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX);
        self.total_latency_ns.fetch_add(nanos, Ordering::Relaxed);
        let bucket = match status.as_u16() {
            200..=399 => &self.status_2xx,
            400..=499 => &self.status_4xx,
            _ => &self.status_5xx,
        };
        bucket.fetch_add(1, Ordering::Relaxed);
        match status {
            StatusCode::NOT_FOUND => {
                self.not_found.fetch_add(1, Ordering::Relaxed);
            }
            StatusCode::METHOD_NOT_ALLOWED => {
                self.method_not_allowed.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    pub fn inc_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_internal_failure(&self) {
        self.internal_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    pub fn internal_failures(&self) -> u64 {
        self.internal_failures.load(Ordering::Relaxed)
    }

    /// Mean latency over all recorded requests, zero before the first one.
    pub fn average_latency(&self) -> Duration {
        let count = self.requests.load(Ordering::Relaxed);
        if count == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(self.total_latency_ns.load(Ordering::Relaxed) / count)
        }
    }

    /// Prometheus text exposition.
    pub fn render(&self, cache_hits: u64, cache_misses: u64) -> String {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        let mut out = String::with_capacity(1024);

        let _ = writeln!(out, "# HELP treeroute_requests_total Requests handled by the router");
        let _ = writeln!(out, "# TYPE treeroute_requests_total counter");
        let _ = writeln!(out, "treeroute_requests_total {}", load(&self.requests));

        let _ = writeln!(out, "# HELP treeroute_responses_total Responses by status class");
        let _ = writeln!(out, "# TYPE treeroute_responses_total counter");
        for (class, counter) in [
            ("2xx", &self.status_2xx),
            ("4xx", &self.status_4xx),
            ("5xx", &self.status_5xx),
        ] {
            let _ = writeln!(
                out,
                "treeroute_responses_total{{class=\"{class}\"}} {}",
                load(counter)
            );
        }

        for (name, help, counter) in [
            ("treeroute_not_found_total", "Requests with no matching route", &self.not_found),
            (
                "treeroute_method_not_allowed_total",
                "Requests for an unsupported method",
                &self.method_not_allowed,
            ),
            ("treeroute_timeouts_total", "Handlers that lost the timeout race", &self.timeouts),
            (
                "treeroute_internal_failures_total",
                "Unclassified handler failures",
                &self.internal_failures,
            ),
        ] {
            let _ = writeln!(out, "# HELP {name} {help}");
            let _ = writeln!(out, "# TYPE {name} counter");
            let _ = writeln!(out, "{name} {}", load(counter));
        }

        let _ = writeln!(out, "# HELP treeroute_resolver_cache_total Resolver cache lookups");
        let _ = writeln!(out, "# TYPE treeroute_resolver_cache_total counter");
        let _ = writeln!(out, "treeroute_resolver_cache_total{{result=\"hit\"}} {cache_hits}");
        let _ = writeln!(out, "treeroute_resolver_cache_total{{result=\"miss\"}} {cache_misses}");

        let _ = writeln!(out, "# HELP treeroute_request_latency_seconds Average request latency");
        let _ = writeln!(out, "# TYPE treeroute_request_latency_seconds gauge");
        let _ = writeln!(
            out,
            "treeroute_request_latency_seconds {:.6}",
            self.average_latency().as_secs_f64()
        );
        out
    }
}

impl LogHook for RouterMetrics {
    fn log(&self, _req: &Request, res: &Response, latency: Duration) {
        self.record(res.status(), latency);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_buckets() {
        let metrics = RouterMetrics::new();
        metrics.record(StatusCode::OK, Duration::from_millis(2));
        metrics.record(StatusCode::NOT_FOUND, Duration::from_millis(4));
        metrics.record(StatusCode::INTERNAL_SERVER_ERROR, Duration::from_millis(6));
        assert_eq!(metrics.request_count(), 3);
        assert_eq!(metrics.average_latency(), Duration::from_millis(4));

        let text = metrics.render(5, 2);
        assert!(text.contains("treeroute_requests_total 3"));
        assert!(text.contains("treeroute_responses_total{class=\"4xx\"} 1"));
        assert!(text.contains("treeroute_not_found_total 1"));
        assert!(text.contains("treeroute_resolver_cache_total{result=\"hit\"} 5"));
    }

    #[test]
    fn test_empty_metrics() {
        let metrics = RouterMetrics::new();
        assert_eq!(metrics.average_latency(), Duration::ZERO);
        metrics.inc_timeout();
        assert_eq!(metrics.timeouts(), 1);
    }
}
