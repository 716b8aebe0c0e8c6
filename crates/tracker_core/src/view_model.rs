use std::fmt;

use crate::{ConnectionStatus, ProgressModel, StepStatus};

/// What a presentation layer should show for a tracked task.
///
/// Task outcomes win over connection trouble, so "task failed",
/// "reconnecting" and "connection lost" never overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayStatus {
    Connecting,
    Live,
    Reconnecting { attempt: u32 },
    ConnectionLost,
    TaskFailed,
    Completed,
}

impl DisplayStatus {
    pub fn derive(model: &ProgressModel, connection: &ConnectionStatus) -> Self {
        if model.is_failed() {
            return DisplayStatus::TaskFailed;
        }
        if model.is_complete() {
            return DisplayStatus::Completed;
        }
        if connection.is_terminal() {
            return DisplayStatus::ConnectionLost;
        }
        if connection.is_reconnecting() {
            return DisplayStatus::Reconnecting {
                attempt: connection.attempt,
            };
        }
        match connection.state {
            crate::ConnectionState::Open => DisplayStatus::Live,
            _ => DisplayStatus::Connecting,
        }
    }

    /// No further updates will arrive.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            DisplayStatus::ConnectionLost | DisplayStatus::TaskFailed | DisplayStatus::Completed
        )
    }
}

impl fmt::Display for DisplayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayStatus::Connecting => write!(f, "connecting"),
            DisplayStatus::Live => write!(f, "live"),
            DisplayStatus::Reconnecting { attempt } => write!(f, "reconnecting (attempt {attempt})"),
            DisplayStatus::ConnectionLost => write!(f, "connection lost"),
            DisplayStatus::TaskFailed => write!(f, "task failed"),
            DisplayStatus::Completed => write!(f, "completed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressViewModel {
    pub task_id: String,
    pub status: DisplayStatus,
    pub overall_progress: f64,
    pub elapsed_time_ms: f64,
    pub steps: Vec<StepRowView>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepRowView {
    pub id: String,
    pub name: String,
    pub status: StepStatus,
    pub progress: f64,
    pub depth: usize,
    pub is_current: bool,
}

impl ProgressViewModel {
    pub fn build(model: &ProgressModel, connection: &ConnectionStatus) -> Self {
        let mut steps = Vec::with_capacity(model.steps.len());
        for step in &model.steps {
            steps.push(StepRowView {
                id: step.id.clone(),
                name: step.name.clone(),
                status: step.status,
                progress: step.progress,
                depth: 0,
                is_current: model.current_step.as_deref() == Some(step.id.as_str()),
            });
            steps.extend(step.substeps.iter().map(|sub| StepRowView {
                id: sub.id.clone(),
                name: sub.name.clone(),
                status: sub.status,
                progress: sub.progress,
                depth: 1,
                is_current: false,
            }));
        }

        Self {
            task_id: model.task_id.clone(),
            status: DisplayStatus::derive(model, connection),
            overall_progress: model.overall_progress,
            elapsed_time_ms: model.elapsed_time_ms,
            steps,
            error: model.error.clone(),
        }
    }
}
