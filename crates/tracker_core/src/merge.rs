use std::fmt;

use crate::model::ProgressModel;

/// Why an incoming snapshot was not applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    /// Sequence not newer than the last accepted one (duplicate or reordered).
    Stale { last: f64, incoming: f64 },
    /// Snapshot addressed to a different task.
    WrongTask { expected: String, actual: String },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Stale { last, incoming } => {
                write!(f, "stale sequence {incoming} (last accepted {last})")
            }
            Rejection::WrongTask { expected, actual } => {
                write!(f, "snapshot for task {actual}, expected {expected}")
            }
        }
    }
}

/// Decide whether `incoming` replaces `current`.
///
/// The first snapshot is always accepted; afterwards the sequence must
/// strictly increase.
pub fn check_snapshot(current: &ProgressModel, incoming: &ProgressModel) -> Result<(), Rejection> {
    if !current.task_id.is_empty() && current.task_id != incoming.task_id {
        return Err(Rejection::WrongTask {
            expected: current.task_id.clone(),
            actual: incoming.task_id.clone(),
        });
    }
    if !current.is_empty() && incoming.sequence <= current.sequence {
        return Err(Rejection::Stale {
            last: current.sequence,
            incoming: incoming.sequence,
        });
    }
    Ok(())
}

/// Pure update: returns the model that should be current after `incoming`.
pub fn apply_snapshot(
    current: ProgressModel,
    incoming: ProgressModel,
) -> (ProgressModel, Result<(), Rejection>) {
    match check_snapshot(&current, &incoming) {
        Ok(()) => (incoming, Ok(())),
        Err(rejection) => (current, Err(rejection)),
    }
}
