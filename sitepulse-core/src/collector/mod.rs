//! Analytics collector
//!
//! Buffers events for one session and delivers them as batches to the
//! ingestion endpoint.
//!
//! ## Architecture
//!
//! The collector is best-effort:
//! - Tracking calls never block and never fail
//! - Nothing is recorded until consent is granted
//! - A failed delivery is requeued at the front of the buffer and retried on
//!   the next flush; the buffer is capped so an unreachable server cannot
//!   grow it without bound
//!
//! ## Usage
//!
//! Point the collector at a server in `~/.config/sitepulse/config.toml`:
//!
//! ```toml
//! [collector]
//! enabled = true
//! server_url = "http://127.0.0.1:8080"
//! batch_size = 10
//! flush_interval_secs = 30
//! ```

mod buffer;
mod client;
mod consent;
mod events;
mod publisher;
mod transport;

pub use buffer::{EventBuffer, TrackOutcome};
pub use client::{HttpTransport, ANALYTICS_PATH};
pub use consent::{ConsentStore, FileConsentStore, MemoryConsentStore};
pub use events::EventDraft;
pub use publisher::{Collector, FlushReason, PublishStats};
pub use transport::{Transport, MAX_BEACON_BYTES};
