//! Periodic liveness probing.
//!
//! Probes run one provider at a time. A probe that errors or times out counts
//! as unhealthy. In-flight requests are not coordinated with the monitor: a
//! request may have already picked a provider the monitor is about to mark
//! down, and simply fails over when the call fails.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ProviderError;
use crate::events::EventBus;
use crate::metrics::bump;
use crate::registry::{ProviderEntry, ProviderRegistry, Transition};

/// Result of one probe round: provider name → healthy.
pub type HealthReport = BTreeMap<String, bool>;

/// Probes every registered provider and publishes availability transitions.
#[derive(Clone)]
pub struct HealthMonitor {
    registry: Arc<ProviderRegistry>,
    events: EventBus,
    interval: Duration,
    timeout: Duration,
}

impl HealthMonitor {
    /// Create a monitor over `registry`.
    #[must_use]
    pub fn new(registry: Arc<ProviderRegistry>, events: EventBus, interval: Duration, timeout: Duration) -> Self {
        Self {
            registry,
            events,
            interval,
            timeout,
        }
    }

    /// Probe one provider, bounded by the timeout.
    pub async fn probe(entry: &ProviderEntry, timeout: Duration) -> Result<(), ProviderError> {
        bump(&entry.counters.health_checks);
        let result = match tokio::time::timeout(timeout, entry.adapter.health()).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX))),
        };
        if result.is_err() {
            bump(&entry.counters.health_failures);
        }
        result
    }

    /// Run one probe round over every provider, in registration order.
    pub async fn check_all(&self) -> HealthReport {
        let mut report = HealthReport::new();
        for entry in self.registry.snapshot() {
            let name = entry.name().to_string();
            let result = Self::probe(&entry, self.timeout).await;
            let healthy = result.is_ok();
            let error = result.err();

            match self.registry.mark(&name, healthy, error.as_ref(), &self.events) {
                Some(Transition::BecameHealthy) => info!(provider = %name, "Provider became healthy"),
                Some(Transition::BecameUnhealthy) => {
                    let error = error.map(|e| e.to_string()).unwrap_or_default();
                    warn!(provider = %name, error = %error, "Provider became unhealthy");
                }
                None => debug!(provider = %name, healthy, "Health probe"),
            }
            report.insert(name, healthy);
        }
        report
    }

    /// Run [`check_all`](Self::check_all) every interval until `token` fires.
    ///
    /// The first round runs one interval after the call.
    #[must_use]
    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = token.cancelled() => {
                        debug!("Health monitor stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.check_all().await;
                    }
                }
            }
        })
    }
}
