//! Capture orchestration for the whole process.
//!
//! This module provides [`Recorder`], the façade that ties together the
//! ingestion listener, the armed/idle state machine and the record
//! store. It is the only handle the rest of the program gets: every
//! mutation goes through the four gated operations (`start`, `stop`,
//! `clear`, `export`) and every read through `count`, `snapshot` or a
//! notification subscription. Nothing ever hands out the underlying
//! record sequence or its lock.
//!
//! Minimal usage
//! ```no_run
//! use std::net::{IpAddr, Ipv4Addr};
//! use capteur::data_capture::recorder::Recorder;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let recorder = Recorder::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 13224)?;
//! recorder.start();
//! // ... packets arrive on /commit/ ...
//! recorder.stop();
//! let mut csv = Vec::new();
//! recorder.export(&mut csv)?;
//! recorder.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::io::Write;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use log::{debug, info};
use tokio::sync::watch;

use crate::error_handling::types::{ExportError, ListenerError};
use crate::network::ingest_listener::IngestListener;

use super::capture_state::{CaptureState, CaptureStateMachine};
use super::export;
use super::record_store::{CaptureSnapshot, RecordStore};

/// Owns the capture pipeline: listener, state machine and store.
///
/// The listener worker appends records while the capture is armed; the
/// controller thread calls the operations below at arbitrary times. The
/// store's internal lock is the single exclusion mechanism between the
/// two sides.
pub struct Recorder {
    store: Arc<RecordStore>,
    state: Arc<CaptureStateMachine>,
    count_tx: Arc<watch::Sender<usize>>,
    armed_since: Mutex<Option<DateTime<Utc>>>,
    listener: IngestListener,
}

impl Recorder {
    /// Binds the ingestion endpoint on `bind_addr:port` and starts its
    /// background worker. The capture begins idle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(bind_addr: IpAddr, port: u16) -> Result<Self, ListenerError> {
        let store = Arc::new(RecordStore::new());
        let state = Arc::new(CaptureStateMachine::new());
        let (count_tx, _) = watch::channel(0usize);
        let count_tx = Arc::new(count_tx);

        let listener = IngestListener::spawn(
            bind_addr,
            port,
            Arc::clone(&store),
            Arc::clone(&state),
            Arc::clone(&count_tx),
        )?;
        debug!("recorder created, capture idle");

        Ok(Self {
            store,
            state,
            count_tx,
            armed_since: Mutex::new(None),
            listener,
        })
    }

    /// Arms the capture; inbound packets are appended from now on.
    /// No-op if already armed.
    pub fn start(&self) {
        if self.state.start() {
            *self.armed_guard() = Some(Utc::now());
            info!("capture armed");
        }
    }

    /// Disarms the capture; inbound packets are dropped from now on.
    /// No-op if already idle.
    pub fn stop(&self) {
        if self.state.stop() {
            *self.armed_guard() = None;
            info!("capture disarmed with {} record(s) held", self.count());
        }
    }

    /// Empties the capture log and resets the watermark.
    ///
    /// Silently refused while armed; callers are expected to consult
    /// [`can_clear`](Recorder::can_clear) first, but calling anyway is
    /// safe.
    pub fn clear(&self) {
        if !self.state.can_clear() {
            debug!("clear refused: capture is armed");
            return;
        }
        self.store.clear();
        self.count_tx.send_replace(0);
        info!("capture log cleared");
    }

    /// Writes the capture log to `sink` as comma-separated text and
    /// returns the number of data rows written.
    ///
    /// Silently refused (zero bytes, `Ok(0)`) while armed or when the
    /// log is empty. A sink failure is the one condition surfaced to the
    /// caller.
    pub fn export<W: Write>(&self, sink: &mut W) -> Result<usize, ExportError> {
        if !self.state.can_export() {
            debug!("export refused: capture is armed");
            return Ok(0);
        }
        export::write_snapshot(&self.store.snapshot(), sink)
    }

    /// Number of records currently held.
    pub fn count(&self) -> usize {
        self.store.count()
    }

    /// Consistent read-only copy of the log and its watermark.
    pub fn snapshot(&self) -> CaptureSnapshot {
        self.store.snapshot()
    }

    pub fn capture_state(&self) -> CaptureState {
        self.state.current()
    }

    pub fn is_armed(&self) -> bool {
        self.state.is_armed()
    }

    /// When the capture was last armed, if it currently is.
    pub fn armed_at(&self) -> Option<DateTime<Utc>> {
        *self.armed_guard()
    }

    pub fn can_start(&self) -> bool {
        self.state.can_start()
    }

    pub fn can_stop(&self) -> bool {
        self.state.can_stop()
    }

    pub fn can_clear(&self) -> bool {
        self.state.can_clear()
    }

    pub fn can_export(&self) -> bool {
        self.state.can_export()
    }

    /// Subscription to record-count changes. Fire-and-forget and
    /// coalescing: a consumer polling the latest value is the intended
    /// shape, not per-append delivery.
    pub fn subscribe_count(&self) -> watch::Receiver<usize> {
        self.count_tx.subscribe()
    }

    /// Subscription to armed-state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<CaptureState> {
        self.state.subscribe()
    }

    /// Address the ingestion endpoint actually bound.
    pub fn ingest_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    /// Stops the ingestion listener and joins its worker.
    ///
    /// Callers own this call; there is no drop-time safety net. It is
    /// idempotent, bounded, and safe after the worker already exited.
    pub async fn shutdown(&self) {
        self.listener.shutdown().await;
        info!("recorder shut down with {} record(s) held", self.count());
    }

    fn armed_guard(&self) -> std::sync::MutexGuard<'_, Option<DateTime<Utc>>> {
        self.armed_since
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
