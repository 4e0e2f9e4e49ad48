//! # switchyard-core
//!
//! Backend-agnostic routing for LLM requests across several providers
//! (local runtimes and hosted APIs).
//!
//! - [`provider`]: capability traits an adapter implements
//! - [`registry`]: the single owner of per-provider availability
//! - [`selection`]: priority, round-robin and random candidate ordering
//! - [`health`]: periodic probes that flip availability and publish events
//! - [`router`]: ordered failover with retry, backoff and per-call timeouts
//! - [`events`] / [`metrics`]: publish-subscribe lifecycle events and counters
//!
//! ## Failure contract
//!
//! Per-attempt failures are recovered internally. Callers only ever see
//! "nothing was available" or "everything failed", the latter carrying the
//! last underlying error.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod events;
pub mod health;
pub mod metrics;
pub mod provider;
pub mod registry;
pub mod router;
pub mod selection;
pub mod telemetry;
pub mod types;

pub use config::{LoggingConfig, ProviderConfig, RouterConfig};
pub use error::{ProviderError, RouterError};
pub use events::RouterEvent;
pub use provider::{Embedder, StreamingGenerator, TextGenerator, TextStream};
pub use router::{CompletionStream, Router, RouterBuilder, StreamChunk};
pub use types::*;
