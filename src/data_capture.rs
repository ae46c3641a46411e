//! Data capture subsystem
//!
//! Everything between a decoded packet and an exported CSV line:
//! - `record_store`: the thread-safe capture log and its watermark.
//! - `capture_state`: the armed/idle machine gating every operation.
//! - `export`: snapshot-to-CSV serialization.
//! - `recorder`: the façade owning the pipeline end to end.

pub mod capture_state;
pub mod export;
pub mod record_store;
pub mod recorder;

pub use capture_state::{CaptureState, CaptureStateMachine};
pub use record_store::{CaptureSnapshot, RecordStore};
pub use recorder::Recorder;
