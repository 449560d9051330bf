//! Collector service: batches events and delivers them
//!
//! A [`Collector`] owns one session. It is explicitly created with its
//! dependencies injected and explicitly destroyed; there is no global
//! instance. All buffer mutation happens on a single driver task, which plays
//! the role of an event loop: instrumentation calls, timer ticks and delivery
//! outcomes are serialized through it, so no locking is needed around the
//! buffer.
//!
//! Batches are sent when:
//! - The batch size threshold is reached (immediately)
//! - The flush interval elapses and the buffer is not empty
//! - The page is hidden, the network comes back online, or flush is called
//!
//! On unload the buffer is handed to [`Transport::send_beacon`] once and is
//! never retried. A failed [`Transport::send`] puts the batch back at the
//! front of the buffer for the next flush; failures are logged, never
//! returned to instrumentation callers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::CollectorConfig;
use crate::error::{Error, Result};
use crate::types::{Batch, ClientContext, Event};

use super::buffer::{EventBuffer, TrackOutcome};
use super::consent::ConsentStore;
use super::events::EventDraft;
use super::transport::Transport;

/// How long shutdown waits for in-flight deliveries
const SHUTDOWN_DRAIN_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Publishing statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PublishStats {
    /// Batches delivered successfully
    pub batches_sent: usize,
    /// Events in successfully delivered batches
    pub events_sent: usize,
    /// Deliveries that failed and were requeued
    pub failed_flushes: usize,
    /// Events put back into the buffer after a failure
    pub events_requeued: usize,
    /// Events dropped because the buffer was full
    pub events_dropped: usize,
    /// Beacons handed off on unload or destroy
    pub beacons_sent: usize,
    /// Deliveries currently in flight
    pub in_flight: usize,
}

/// Why a flush was started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    Threshold,
    Timer,
    PageHidden,
    Online,
    Manual,
}

impl FlushReason {
    fn as_str(&self) -> &'static str {
        match self {
            FlushReason::Threshold => "threshold",
            FlushReason::Timer => "timer",
            FlushReason::PageHidden => "page_hidden",
            FlushReason::Online => "online",
            FlushReason::Manual => "manual",
        }
    }
}

enum Command {
    Track(EventDraft),
    SetEnabled(bool),
    SetUserId(Option<String>),
    Flush {
        reason: FlushReason,
        done: Option<oneshot::Sender<Result<usize>>>,
    },
    Unload,
    Stats(oneshot::Sender<PublishStats>),
    Pending(oneshot::Sender<usize>),
    Shutdown,
}

struct FlushOutcome {
    events: Vec<Event>,
    result: Result<()>,
    done: Option<oneshot::Sender<Result<usize>>>,
}

/// Handle to a running collector
pub struct Collector {
    commands: mpsc::UnboundedSender<Command>,
    enabled: Arc<AtomicBool>,
    session_id: String,
    consent: Arc<dyn ConsentStore>,
    driver: JoinHandle<()>,
}

impl Collector {
    /// Create a collector and start its driver task.
    ///
    /// Must be called from within a tokio runtime. The initial consent comes
    /// from `consent` when a decision was stored, else from `config.enabled`.
    pub fn create(
        config: &CollectorConfig,
        context: ClientContext,
        transport: Arc<dyn Transport>,
        consent: Arc<dyn ConsentStore>,
    ) -> Result<Self> {
        config.validate_limits()?;

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Collector(format!("no tokio runtime: {}", e)))?;

        let initial = match consent.load() {
            Ok(Some(enabled)) => enabled,
            Ok(None) => config.enabled,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read stored consent, using config default");
                config.enabled
            }
        };

        let session_id = uuid::Uuid::new_v4().to_string();
        let buffer = EventBuffer::new(
            session_id.clone(),
            config.batch_size,
            config.max_buffered_events,
            initial,
        );

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();

        let driver = Driver {
            buffer,
            context,
            transport,
            outcomes: outcomes_tx,
            stats: PublishStats::default(),
        };
        let handle = runtime.spawn(driver.run(commands_rx, outcomes_rx, config.flush_interval()));

        tracing::info!(
            session_id = %session_id,
            enabled = initial,
            batch_size = config.batch_size,
            "Collector created"
        );

        Ok(Self {
            commands: commands_tx,
            enabled: Arc::new(AtomicBool::new(initial)),
            session_id,
            consent,
            driver: handle,
        })
    }

    /// Session ID stamped on every event of this collector
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Current consent state
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn track_page_view(&self, path: &str, title: Option<&str>) {
        self.track(EventDraft::page_view(path, title));
    }

    pub fn track_interaction(
        &self,
        category: &str,
        action: &str,
        label: Option<&str>,
        value: Option<f64>,
    ) {
        self.track(EventDraft::interaction(category, action, label, value));
    }

    pub fn track_custom_event(
        &self,
        name: &str,
        properties: Option<serde_json::Map<String, serde_json::Value>>,
    ) {
        self.track(EventDraft::custom(name, properties));
    }

    /// Buffer an event. A no-op while tracking is disabled.
    pub fn track(&self, draft: EventDraft) {
        if !self.is_enabled() {
            return;
        }
        self.send(Command::Track(draft));
    }

    /// Persist consent and enable or disable tracking.
    ///
    /// Revoking consent clears the buffer. The in-memory state changes even
    /// when persisting fails; the persistence error is returned.
    pub fn set_consent(&self, enabled: bool) -> Result<()> {
        self.enabled.store(enabled, Ordering::SeqCst);
        self.send(Command::SetEnabled(enabled));
        tracing::info!(session_id = %self.session_id, enabled, "Consent updated");
        self.consent.save(enabled)
    }

    /// User ID attached to events tracked from now on
    pub fn set_user_id(&self, user_id: Option<String>) {
        self.send(Command::SetUserId(user_id));
    }

    /// Start a flush without waiting for it
    pub fn flush(&self) {
        self.request_flush(FlushReason::Manual);
    }

    /// The page became hidden
    pub fn page_hidden(&self) {
        self.request_flush(FlushReason::PageHidden);
    }

    /// The network came back online
    pub fn online(&self) {
        self.request_flush(FlushReason::Online);
    }

    /// The page is being torn down: best-effort beacon, never retried
    pub fn unload(&self) {
        self.send(Command::Unload);
    }

    /// Flush and wait for the delivery outcome.
    ///
    /// Returns the number of events delivered (0 if the buffer was empty).
    /// On failure the events are already back in the buffer when this returns.
    pub async fn flush_and_wait(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Flush {
                reason: FlushReason::Manual,
                done: Some(tx),
            })
            .map_err(|_| Error::CollectorStopped)?;
        rx.await.map_err(|_| Error::CollectorStopped)?
    }

    /// Current publishing statistics
    pub async fn stats(&self) -> Result<PublishStats> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Stats(tx))
            .map_err(|_| Error::CollectorStopped)?;
        rx.await.map_err(|_| Error::CollectorStopped)
    }

    /// Number of events waiting in the buffer
    pub async fn pending_count(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Pending(tx))
            .map_err(|_| Error::CollectorStopped)?;
        rx.await.map_err(|_| Error::CollectorStopped)
    }

    /// Stop the timer, beacon whatever is buffered and end the driver task.
    pub async fn destroy(self) {
        self.send(Command::Shutdown);
        if let Err(e) = self.driver.await {
            tracing::warn!(error = %e, "Collector driver ended abnormally");
        }
        tracing::info!(session_id = %self.session_id, "Collector destroyed");
    }

    fn request_flush(&self, reason: FlushReason) {
        self.send(Command::Flush { reason, done: None });
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::debug!(session_id = %self.session_id, "Collector driver is gone");
        }
    }
}

impl CollectorConfig {
    /// Limits the collector needs regardless of whether it is enabled
    fn validate_limits(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config(
                "collector.batch_size must be at least 1".to_string(),
            ));
        }
        if self.flush_interval_secs == 0 {
            return Err(Error::Config(
                "collector.flush_interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// State owned by the driver task
struct Driver {
    buffer: EventBuffer,
    context: ClientContext,
    transport: Arc<dyn Transport>,
    outcomes: mpsc::UnboundedSender<FlushOutcome>,
    stats: PublishStats,
}

impl Driver {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut outcomes: mpsc::UnboundedReceiver<FlushOutcome>,
        interval: std::time::Duration,
    ) {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => {
                        self.drain(&mut outcomes).await;
                        self.beacon("shutdown");
                        break;
                    }
                    Some(command) => self.handle(command),
                },
                Some(outcome) = outcomes.recv() => self.complete(outcome),
                _ = ticker.tick() => {
                    if !self.buffer.is_empty() {
                        self.flush(FlushReason::Timer, None);
                    }
                }
            }
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Track(draft) => {
                let now_ms = chrono::Utc::now().timestamp_millis();
                let (outcome, dropped) = self.buffer.track(draft, now_ms);
                self.stats.events_dropped += dropped;
                if outcome == TrackOutcome::FlushDue {
                    self.flush(FlushReason::Threshold, None);
                }
            }
            Command::SetEnabled(enabled) => {
                let cleared = self.buffer.set_enabled(enabled);
                if cleared > 0 {
                    tracing::debug!(cleared, "Tracking disabled, buffer cleared");
                }
            }
            Command::SetUserId(user_id) => self.buffer.set_user_id(user_id),
            Command::Flush { reason, done } => self.flush(reason, done),
            Command::Unload => self.beacon("unload"),
            Command::Stats(reply) => {
                let _ = reply.send(self.stats.clone());
            }
            Command::Pending(reply) => {
                let _ = reply.send(self.buffer.len());
            }
            // Handled by the run loop
            Command::Shutdown => {}
        }
    }

    /// Claim the buffer and deliver it on a separate task.
    fn flush(&mut self, reason: FlushReason, done: Option<oneshot::Sender<Result<usize>>>) {
        let Some(events) = self.buffer.claim() else {
            if let Some(done) = done {
                let _ = done.send(Ok(0));
            }
            return;
        };

        tracing::debug!(
            session_id = %self.buffer.session_id(),
            reason = reason.as_str(),
            events = events.len(),
            "Flushing events"
        );

        let batch = Batch::new(events, self.context.clone());
        let transport = Arc::clone(&self.transport);
        let outcomes = self.outcomes.clone();
        self.stats.in_flight += 1;

        tokio::spawn(async move {
            let result = transport.send(&batch).await;
            let _ = outcomes.send(FlushOutcome {
                events: batch.events,
                result,
                done,
            });
        });
    }

    fn complete(&mut self, outcome: FlushOutcome) {
        self.stats.in_flight = self.stats.in_flight.saturating_sub(1);
        let count = outcome.events.len();

        let reply = match outcome.result {
            Ok(()) => {
                self.stats.batches_sent += 1;
                self.stats.events_sent += count;
                tracing::debug!(
                    session_id = %self.buffer.session_id(),
                    events = count,
                    "Delivered batch"
                );
                Ok(count)
            }
            Err(e) => {
                self.stats.failed_flushes += 1;
                self.stats.events_requeued += count;
                self.stats.events_dropped += self.buffer.requeue(outcome.events);
                tracing::warn!(
                    session_id = %self.buffer.session_id(),
                    events = count,
                    error = %e,
                    "Failed to deliver batch, requeued"
                );
                Err(e)
            }
        };

        if let Some(done) = outcome.done {
            let _ = done.send(reply);
        }
    }

    /// Wait for in-flight deliveries so failed ones are requeued before the
    /// final beacon.
    async fn drain(&mut self, outcomes: &mut mpsc::UnboundedReceiver<FlushOutcome>) {
        let deadline = Instant::now() + SHUTDOWN_DRAIN_TIMEOUT;
        while self.stats.in_flight > 0 {
            match tokio::time::timeout_at(deadline, outcomes.recv()).await {
                Ok(Some(outcome)) => self.complete(outcome),
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        session_id = %self.buffer.session_id(),
                        in_flight = self.stats.in_flight,
                        "Deliveries still in flight at shutdown, giving up on them"
                    );
                    break;
                }
            }
        }
    }

    /// Hand the buffer to the fire-and-forget path.
    fn beacon(&mut self, trigger: &str) {
        let Some(events) = self.buffer.claim() else {
            return;
        };
        let count = events.len();
        let batch = Batch::new(events, self.context.clone());

        if self.transport.send_beacon(batch) {
            self.stats.beacons_sent += 1;
            tracing::debug!(trigger, events = count, "Beacon queued");
        } else {
            tracing::warn!(trigger, events = count, "Beacon rejected, events lost");
        }
    }
}
