//! Tracker core: progress model, wire format and reconnection policy.
//!
//! Everything here is pure; the async connection layer lives in
//! `tracker_engine`.
mod connection;
mod merge;
mod model;
mod policy;
mod view_model;
mod wire;

pub use connection::{CloseReason, ConnectionState, ConnectionStatus};
pub use merge::{apply_snapshot, check_snapshot, Rejection};
pub use model::{MessageKind, ProgressModel, QualityIssue, Step, StepStatus, Substep, TaskId};
pub use policy::{
    CloseKind, ReconnectDecision, ReconnectPolicy, ReconnectState, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_RECONNECT_INTERVAL_MS,
};
pub use view_model::{DisplayStatus, ProgressViewModel, StepRowView};
pub use wire::{encode_snapshot, parse_message, OutboundMessage, ParseError, WireMessage};
