//! # sitepulse-core
//!
//! Core library for sitepulse - a small site analytics pipeline.
//!
//! This library provides:
//! - Domain types for events, batches and summaries
//! - The collector: a buffering client that batches events and delivers them
//! - The ingestion endpoint: validation, sanitization and batch storage
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Architecture
//!
//! Two pieces cooperate over HTTP:
//! - **Collector:** buffers events per session in memory and flushes them as a
//!   batch on a timer, on a size threshold, on lifecycle triggers, or as a
//!   best-effort beacon on unload
//! - **Ingestion endpoint:** accepts a batch, sanitizes it, appends it to a
//!   [`ingest::BatchStore`] and answers summary queries
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sitepulse_core::collector::{Collector, HttpTransport, MemoryConsentStore};
//! use sitepulse_core::{ClientContext, Config};
//!
//! # async fn run() -> sitepulse_core::Result<()> {
//! let config = Config::load()?;
//! let transport = Arc::new(HttpTransport::new(&config.collector)?);
//! let consent = Arc::new(MemoryConsentStore::granted());
//!
//! let collector = Collector::create(
//!     &config.collector,
//!     ClientContext::default(),
//!     transport,
//!     consent,
//! )?;
//! collector.track_page_view("/", Some("Home"));
//! collector.destroy().await;
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use error::{Error, Result};
pub use types::*;

// Public modules
pub mod collector;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod server;
pub mod types;
