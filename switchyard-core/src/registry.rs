//! Provider registry, the single owner of per-provider state.
//!
//! Both the health monitor and the request path write availability through
//! [`ProviderRegistry::mark`], which holds one write lock for the flag update
//! and the matching event. Transition events therefore reach subscribers in
//! the order the flags changed. Request paths work from
//! [`ProviderRegistry::snapshot`] copies, so no lock is ever held across an
//! adapter call.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::error::{ProviderError, Result, RouterError};
use crate::events::{EventBus, RouterEvent};
use crate::metrics::{ProviderCounterSnapshot, ProviderCounters};
use crate::provider::{TextGenerator, effective_capabilities};
use crate::selection::Ranked;
use crate::types::Capabilities;

/// Availability change caused by a [`ProviderRegistry::mark`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Unavailable → available.
    BecameHealthy,
    /// Available → unavailable.
    BecameUnhealthy,
}

/// A cloned view of one provider, safe to hold across `.await`.
#[derive(Clone)]
pub struct ProviderEntry {
    /// The adapter.
    pub adapter: Arc<dyn TextGenerator>,
    /// Lower is preferred.
    pub priority: i32,
    /// Availability at snapshot time.
    pub available: bool,
    /// Effective capabilities.
    pub capabilities: Capabilities,
    /// Live counters shared with the registry.
    pub counters: Arc<ProviderCounters>,
}

impl ProviderEntry {
    /// Provider name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.adapter.name()
    }
}

impl fmt::Debug for ProviderEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderEntry")
            .field("name", &self.adapter.name())
            .field("priority", &self.priority)
            .field("available", &self.available)
            .finish_non_exhaustive()
    }
}

impl Ranked for ProviderEntry {
    fn name(&self) -> &str {
        self.adapter.name()
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn is_available(&self) -> bool {
        self.available
    }
}

/// Monitoring view of one provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderStatus {
    /// Provider name.
    pub name: String,
    /// Configured model.
    pub model: String,
    /// Lower is preferred.
    pub priority: i32,
    /// Current availability.
    pub available: bool,
    /// Effective capabilities.
    pub capabilities: Capabilities,
    /// Failures since the last success or passed probe.
    pub consecutive_failures: u32,
    /// Most recent failure message.
    pub last_error: Option<String>,
    /// When availability was last written.
    pub last_checked: Option<DateTime<Utc>>,
}

struct Slot {
    adapter: Arc<dyn TextGenerator>,
    priority: i32,
    capabilities: Capabilities,
    counters: Arc<ProviderCounters>,
    available: bool,
    consecutive_failures: u32,
    last_error: Option<String>,
    last_checked: Option<DateTime<Utc>>,
}

impl Slot {
    fn entry(&self) -> ProviderEntry {
        ProviderEntry {
            adapter: Arc::clone(&self.adapter),
            priority: self.priority,
            available: self.available,
            capabilities: self.capabilities.clone(),
            counters: Arc::clone(&self.counters),
        }
    }
}

/// Name-unique collection of providers and their availability.
#[derive(Default)]
pub struct ProviderRegistry {
    slots: RwLock<Vec<Slot>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider.
    ///
    /// # Errors
    /// Returns `RouterError::DuplicateProvider` if the name is taken.
    pub fn register(&self, adapter: Arc<dyn TextGenerator>, priority: i32, available: bool) -> Result<()> {
        let mut slots = self.slots.write();
        if slots.iter().any(|s| s.adapter.name() == adapter.name()) {
            return Err(RouterError::DuplicateProvider(adapter.name().to_string()));
        }
        let capabilities = effective_capabilities(adapter.as_ref());
        slots.push(Slot {
            adapter,
            priority,
            capabilities,
            counters: Arc::new(ProviderCounters::default()),
            available,
            consecutive_failures: 0,
            last_error: None,
            last_checked: Some(Utc::now()),
        });
        Ok(())
    }

    /// Copies of every provider, in registration order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ProviderEntry> {
        self.slots.read().iter().map(Slot::entry).collect()
    }

    /// Record an availability observation.
    ///
    /// If the flag actually flipped, the matching `ProviderHealthy` or
    /// `ProviderUnhealthy` event goes out on `events` before the lock is
    /// released, and the transition is returned. Unknown names are ignored.
    pub fn mark(
        &self,
        name: &str,
        available: bool,
        error: Option<&ProviderError>,
        events: &EventBus,
    ) -> Option<Transition> {
        let mut slots = self.slots.write();
        let slot = slots.iter_mut().find(|s| s.adapter.name() == name)?;

        slot.last_checked = Some(Utc::now());
        if available {
            slot.consecutive_failures = 0;
        } else {
            slot.consecutive_failures = slot.consecutive_failures.saturating_add(1);
            slot.last_error = error.map(ToString::to_string);
        }

        let was = std::mem::replace(&mut slot.available, available);
        let transition = match (was, available) {
            (false, true) => Transition::BecameHealthy,
            (true, false) => Transition::BecameUnhealthy,
            _ => return None,
        };
        events.emit(match transition {
            Transition::BecameHealthy => RouterEvent::ProviderHealthy { name: name.to_string() },
            Transition::BecameUnhealthy => RouterEvent::ProviderUnhealthy {
                name: name.to_string(),
                error: slot.last_error.clone().unwrap_or_default(),
            },
        });
        Some(transition)
    }

    /// Current availability of `name`, if registered.
    #[must_use]
    pub fn is_available(&self, name: &str) -> Option<bool> {
        self.slots
            .read()
            .iter()
            .find(|s| s.adapter.name() == name)
            .map(|s| s.available)
    }

    /// Monitoring rows, in registration order.
    #[must_use]
    pub fn statuses(&self) -> Vec<ProviderStatus> {
        self.slots
            .read()
            .iter()
            .map(|s| ProviderStatus {
                name: s.adapter.name().to_string(),
                model: s.adapter.model().to_string(),
                priority: s.priority,
                available: s.available,
                capabilities: s.capabilities.clone(),
                consecutive_failures: s.consecutive_failures,
                last_error: s.last_error.clone(),
                last_checked: s.last_checked,
            })
            .collect()
    }

    /// Counter snapshots, in registration order.
    #[must_use]
    pub fn counter_snapshots(&self) -> Vec<ProviderCounterSnapshot> {
        self.slots
            .read()
            .iter()
            .map(|s| s.counters.snapshot(s.adapter.name()))
            .collect()
    }

    /// Registered names, in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.slots.read().iter().map(|s| s.adapter.name().to_string()).collect()
    }

    /// Number of registered providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    /// Whether no provider is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }
}
