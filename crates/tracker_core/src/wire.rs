//! JSON wire format shared by every progress producer.
//!
//! The backend and the local simulator both speak this contract, so the
//! connection layer never needs to know which one is on the other end.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{MessageKind, ProgressModel, Step, TaskId};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid message: {0}")]
    Invalid(String),
}

/// Inbound progress message as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub task_id: TaskId,
    pub sequence: f64,
    pub overall_progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    pub elapsed_time_ms: f64,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Messages the client sends to the producer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Ask the producer to resend its latest snapshot.
    RequestStatus { task_id: TaskId },
}

impl OutboundMessage {
    pub fn request_status(task_id: impl Into<TaskId>) -> Self {
        OutboundMessage::RequestStatus {
            task_id: task_id.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, ParseError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, ParseError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Parse and validate one raw text frame into a snapshot.
///
/// Numbers may be fractional. Schema violations are errors: wrong types,
/// missing fields, unknown status values, negative times or sequences,
/// percentages outside 0..=100 and duplicate step ids. Status/progress
/// inconsistencies are not; see [`ProgressModel::quality_issues`].
pub fn parse_message(raw: &str) -> Result<ProgressModel, ParseError> {
    let message: WireMessage = serde_json::from_str(raw)?;
    validate(&message)?;
    Ok(message.into_model())
}

/// Serialize a snapshot back into the wire format.
pub fn encode_snapshot(model: &ProgressModel) -> Result<String, ParseError> {
    let kind = model
        .kind
        .ok_or_else(|| ParseError::Invalid("empty model has no message type".into()))?;
    let message = WireMessage {
        kind,
        task_id: model.task_id.clone(),
        sequence: model.sequence,
        overall_progress: model.overall_progress,
        current_step: model.current_step.clone(),
        elapsed_time_ms: model.elapsed_time_ms,
        steps: model.steps.clone(),
        error: model.error.clone(),
    };
    Ok(serde_json::to_string(&message)?)
}

impl WireMessage {
    fn into_model(self) -> ProgressModel {
        ProgressModel {
            task_id: self.task_id,
            kind: Some(self.kind),
            sequence: self.sequence,
            overall_progress: self.overall_progress,
            current_step: self.current_step,
            elapsed_time_ms: self.elapsed_time_ms,
            steps: self.steps,
            error: self.error,
        }
    }
}

fn validate(message: &WireMessage) -> Result<(), ParseError> {
    if message.task_id.trim().is_empty() {
        return Err(ParseError::Invalid("task_id is empty".into()));
    }
    check_non_negative("sequence", message.sequence)?;
    check_non_negative("elapsed_time_ms", message.elapsed_time_ms)?;
    check_percentage("overall_progress", message.overall_progress)?;

    let mut seen = HashSet::new();
    for step in &message.steps {
        if !seen.insert(step.id.as_str()) {
            return Err(ParseError::Invalid(format!("duplicate step id {}", step.id)));
        }
        let field = format!("steps[{}]", step.id);
        check_percentage(&format!("{field}.progress"), step.progress)?;
        check_times(&field, [step.start_time, step.end_time, step.duration_ms])?;
        for sub in &step.substeps {
            let field = format!("{field}.substeps[{}]", sub.id);
            check_percentage(&format!("{field}.progress"), sub.progress)?;
            check_times(&field, [sub.start_time, sub.end_time, sub.duration_ms])?;
        }
    }
    Ok(())
}

fn check_times(
    field: &str,
    [start, end, duration]: [Option<f64>; 3],
) -> Result<(), ParseError> {
    let named = [("start_time", start), ("end_time", end), ("duration_ms", duration)];
    for (name, value) in named {
        if let Some(value) = value {
            check_non_negative(&format!("{field}.{name}"), value)?;
        }
    }
    Ok(())
}

fn check_non_negative(field: &str, value: f64) -> Result<(), ParseError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ParseError::Invalid(format!("{field} must be a non-negative number: {value}")))
    }
}

fn check_percentage(field: &str, value: f64) -> Result<(), ParseError> {
    if value.is_finite() && (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(ParseError::Invalid(format!(
            "{field} out of range: {value}"
        )))
    }
}
