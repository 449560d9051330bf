//! Delivery seam between the collector and the network
//!
//! Two distinct paths exist:
//! - [`Transport::send`] is the normal, awaited delivery. A failure makes the
//!   collector requeue the batch for the next flush.
//! - [`Transport::send_beacon`] is the unload-time path. It hands the batch
//!   off and returns immediately; it never reports completion and the batch
//!   is never retried.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::Batch;

/// Largest beacon body accepted, matching the common browser limit.
pub const MAX_BEACON_BYTES: usize = 64 * 1024;

/// Delivers batches to the ingestion endpoint
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver a batch; `Err` on network failure or a non-success status.
    async fn send(&self, batch: &Batch) -> Result<()>;

    /// Queue a fire-and-forget delivery.
    ///
    /// Returns whether the batch was handed off.
    fn send_beacon(&self, batch: Batch) -> bool;
}
