use std::fmt;

use serde::{Deserialize, Serialize};

pub type TaskId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Error,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Running => write!(f, "running"),
            StepStatus::Completed => write!(f, "completed"),
            StepStatus::Error => write!(f, "error"),
        }
    }
}

/// Kind tag carried by every inbound progress message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    ProgressUpdate,
    StatusUpdate,
    Error,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Substep {
    pub id: String,
    pub name: String,
    pub status: StepStatus,
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub name: String,
    pub status: StepStatus,
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub substeps: Vec<Substep>,
}

impl Step {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: StepStatus::Pending,
            progress: 0.0,
            start_time: None,
            end_time: None,
            duration_ms: None,
            substeps: Vec::new(),
        }
    }
}

/// Complete description of a task's progress at one point in time.
///
/// A model is never patched: each accepted inbound message replaces the
/// previous one. The default value is the empty model a subscriber sees
/// before the first message arrives.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProgressModel {
    pub task_id: TaskId,
    pub kind: Option<MessageKind>,
    /// Producer-assigned ordering marker: a counter or a timestamp, possibly
    /// fractional.
    pub sequence: f64,
    pub overall_progress: f64,
    pub current_step: Option<String>,
    pub elapsed_time_ms: f64,
    pub steps: Vec<Step>,
    pub error: Option<String>,
}

/// A data-quality observation about a snapshot. These are reported, never
/// corrected.
#[derive(Debug, Clone, PartialEq)]
pub enum QualityIssue {
    MultipleRunning { step_ids: Vec<String> },
    CompletedBelowFull { step_id: String, progress: f64 },
    PendingWithProgress { step_id: String, progress: f64 },
    UnknownCurrentStep { step_id: String },
}

impl fmt::Display for QualityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityIssue::MultipleRunning { step_ids } => {
                write!(f, "more than one running step: {}", step_ids.join(", "))
            }
            QualityIssue::CompletedBelowFull { step_id, progress } => {
                write!(f, "step {step_id} completed at {progress}%")
            }
            QualityIssue::PendingWithProgress { step_id, progress } => {
                write!(f, "step {step_id} pending at {progress}%")
            }
            QualityIssue::UnknownCurrentStep { step_id } => {
                write!(f, "current step {step_id} is not in the step list")
            }
        }
    }
}

impl ProgressModel {
    pub fn empty(task_id: impl Into<TaskId>) -> Self {
        Self {
            task_id: task_id.into(),
            ..Self::default()
        }
    }

    /// True until the first message has been accepted.
    pub fn is_empty(&self) -> bool {
        self.kind.is_none()
    }

    pub fn is_complete(&self) -> bool {
        self.kind == Some(MessageKind::Complete)
    }

    /// Task-level failure: an explicit error message, or a step in error.
    pub fn is_failed(&self) -> bool {
        self.kind == Some(MessageKind::Error)
            || self.steps.iter().any(|step| step.status == StepStatus::Error)
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|step| step.id == id)
    }

    pub fn running_step(&self) -> Option<&Step> {
        self.steps
            .iter()
            .find(|step| step.status == StepStatus::Running)
    }

    pub fn quality_issues(&self) -> Vec<QualityIssue> {
        let mut issues = Vec::new();

        let running: Vec<String> = self
            .steps
            .iter()
            .filter(|step| step.status == StepStatus::Running)
            .map(|step| step.id.clone())
            .collect();
        if running.len() > 1 {
            issues.push(QualityIssue::MultipleRunning { step_ids: running });
        }

        let statuses = self.steps.iter().flat_map(|step| {
            std::iter::once((&step.id, step.status, step.progress)).chain(
                step.substeps
                    .iter()
                    .map(|sub| (&sub.id, sub.status, sub.progress)),
            )
        });
        for (id, status, progress) in statuses {
            match status {
                StepStatus::Completed if progress < 100.0 => {
                    issues.push(QualityIssue::CompletedBelowFull {
                        step_id: id.clone(),
                        progress,
                    });
                }
                StepStatus::Pending if progress > 0.0 => {
                    issues.push(QualityIssue::PendingWithProgress {
                        step_id: id.clone(),
                        progress,
                    });
                }
                _ => {}
            }
        }

        if let Some(current) = &self.current_step {
            if self.step(current).is_none() {
                issues.push(QualityIssue::UnknownCurrentStep {
                    step_id: current.clone(),
                });
            }
        }

        issues
    }
}
