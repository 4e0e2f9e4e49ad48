//! Runtime counters for the router.
//!
//! Incremented on the request path with relaxed atomics and read on export.
//! Events tell observers *that* something changed; these counters tell a
//! dashboard *how often*.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters owned by one provider slot.
#[derive(Debug, Default)]
pub struct ProviderCounters {
    /// Adapter calls started (completion, stream or embedding).
    pub attempts: AtomicU64,
    /// Calls that returned a result.
    pub successes: AtomicU64,
    /// Calls that failed or timed out.
    pub failures: AtomicU64,
    /// Health probes run.
    pub health_checks: AtomicU64,
    /// Health probes that failed.
    pub health_failures: AtomicU64,
}

impl ProviderCounters {
    /// Snapshot for export.
    #[must_use]
    pub fn snapshot(&self, name: &str) -> ProviderCounterSnapshot {
        ProviderCounterSnapshot {
            name: name.to_string(),
            attempts: self.attempts.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            health_checks: self.health_checks.load(Ordering::Relaxed),
            health_failures: self.health_failures.load(Ordering::Relaxed),
        }
    }
}

/// Router-wide counters.
#[derive(Debug, Default)]
pub struct RouterCounters {
    /// Routed requests of any operation.
    pub requests: AtomicU64,
    /// Requests that ended in exhaustion.
    pub exhausted: AtomicU64,
    /// Fall-throughs from one candidate to the next.
    pub fallbacks: AtomicU64,
}

pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// A point-in-time copy of one provider's counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderCounterSnapshot {
    /// Provider name.
    pub name: String,
    /// Adapter calls started.
    pub attempts: u64,
    /// Successful calls.
    pub successes: u64,
    /// Failed calls.
    pub failures: u64,
    /// Health probes run.
    pub health_checks: u64,
    /// Failed health probes.
    pub health_failures: u64,
}

/// A point-in-time copy of all counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Routed requests.
    pub requests: u64,
    /// Requests that exhausted every candidate.
    pub exhausted: u64,
    /// Candidate fall-throughs.
    pub fallbacks: u64,
    /// Per-provider counters, in registration order.
    pub providers: Vec<ProviderCounterSnapshot>,
}

impl MetricsSnapshot {
    /// Collect from the live counters.
    #[must_use]
    pub fn collect(router: &RouterCounters, providers: Vec<ProviderCounterSnapshot>) -> Self {
        Self {
            requests: router.requests.load(Ordering::Relaxed),
            exhausted: router.exhausted.load(Ordering::Relaxed),
            fallbacks: router.fallbacks.load(Ordering::Relaxed),
            providers,
        }
    }

    /// Format as Prometheus-compatible text.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let mut out = format!(
            "# HELP switchyard_requests_total Routed requests\n\
             # TYPE switchyard_requests_total counter\n\
             switchyard_requests_total {}\n\
             # HELP switchyard_exhausted_total Requests where every provider failed\n\
             # TYPE switchyard_exhausted_total counter\n\
             switchyard_exhausted_total {}\n\
             # HELP switchyard_fallbacks_total Fall-throughs to the next provider\n\
             # TYPE switchyard_fallbacks_total counter\n\
             switchyard_fallbacks_total {}\n",
            self.requests, self.exhausted, self.fallbacks,
        );

        let families: [(&str, &str, fn(&ProviderCounterSnapshot) -> u64); 5] = [
            ("attempts", "Adapter calls started", |p| p.attempts),
            ("successes", "Adapter calls that succeeded", |p| p.successes),
            ("failures", "Adapter calls that failed", |p| p.failures),
            ("health_checks", "Health probes run", |p| p.health_checks),
            ("health_failures", "Health probes that failed", |p| p.health_failures),
        ];
        for (family, help, value) in families {
            let _ = writeln!(out, "# HELP switchyard_provider_{family}_total {help}");
            let _ = writeln!(out, "# TYPE switchyard_provider_{family}_total counter");
            for p in &self.providers {
                let _ = writeln!(
                    out,
                    "switchyard_provider_{family}_total{{provider=\"{}\"}} {}",
                    p.name,
                    value(p)
                );
            }
        }
        out
    }
}
