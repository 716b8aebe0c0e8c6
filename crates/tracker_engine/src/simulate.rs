//! Local stand-in for the progress backend.
//!
//! Produces the same wire messages as the real producer, so it can be
//! plugged into a registry for demos and tests without a server.

use std::collections::VecDeque;
use std::time::Duration;

use tracker_core::{
    encode_snapshot, CloseKind, MessageKind, OutboundMessage, ProgressModel, Step, StepStatus,
    Substep,
};
use tracker_logging::{tracker_debug, tracker_warn};

use crate::{Connection, Transport, TransportError, TransportEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedStep {
    pub id: String,
    pub name: String,
    pub substeps: Vec<(String, String)>,
}

impl SimulatedStep {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            substeps: Vec::new(),
        }
    }

    pub fn with_substep(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.substeps.push((id.into(), name.into()));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationScript {
    pub steps: Vec<SimulatedStep>,
    pub tick: Duration,
    pub ticks_per_step: u32,
    /// Fail halfway through this step (by index) instead of completing.
    pub fail_at_step: Option<usize>,
}

impl Default for SimulationScript {
    fn default() -> Self {
        Self {
            steps: vec![
                SimulatedStep::new("upload", "Upload document"),
                SimulatedStep::new("parse", "Parse content")
                    .with_substep("parse.text", "Extract text")
                    .with_substep("parse.tables", "Detect tables"),
                SimulatedStep::new("analyze", "Analyze")
                    .with_substep("analyze.entities", "Find entities")
                    .with_substep("analyze.summary", "Summarize"),
            ],
            tick: Duration::from_millis(400),
            ticks_per_step: 4,
            fail_at_step: None,
        }
    }
}

impl SimulationScript {
    /// Every snapshot the script emits for `task_id`, in order.
    pub fn frames(&self, task_id: &str) -> Vec<ProgressModel> {
        let ticks = self.ticks_per_step.max(1);
        let tick_ms = self.tick.as_secs_f64() * 1000.0;
        let step_count = self.steps.len().max(1) as f64;

        let mut steps: Vec<Step> = self
            .steps
            .iter()
            .map(|sim| {
                let mut step = Step::new(sim.id.clone(), sim.name.clone());
                step.substeps = sim
                    .substeps
                    .iter()
                    .map(|(id, name)| Substep {
                        id: id.clone(),
                        name: name.clone(),
                        status: StepStatus::Pending,
                        progress: 0.0,
                        start_time: None,
                        end_time: None,
                        duration_ms: None,
                    })
                    .collect();
                step
            })
            .collect();

        let mut frames = Vec::new();
        let mut elapsed = 0.0;
        let mut emit = |kind: MessageKind,
                        overall: f64,
                        current: Option<String>,
                        elapsed: f64,
                        steps: &[Step],
                        error: Option<String>| {
            frames.push(ProgressModel {
                task_id: task_id.to_string(),
                kind: Some(kind),
                sequence: frames.len() as f64 + 1.0,
                overall_progress: overall,
                current_step: current,
                elapsed_time_ms: elapsed,
                steps: steps.to_vec(),
                error,
            });
        };

        emit(MessageKind::StatusUpdate, 0.0, None, 0.0, &steps, None);

        for index in 0..steps.len() {
            let started = elapsed;
            steps[index].start_time = Some(started);

            for tick in 1..=ticks {
                elapsed += tick_ms;
                let fraction = f64::from(tick) / f64::from(ticks);
                let step = &mut steps[index];
                let step_id = step.id.clone();

                if self.fail_at_step == Some(index) && tick * 2 > ticks {
                    step.status = StepStatus::Error;
                    step.progress = fraction * 100.0;
                    step.end_time = Some(elapsed);
                    step.duration_ms = Some(elapsed - started);
                    let overall = (index as f64 * 100.0 + step.progress) / step_count;
                    let error = format!("{} failed", step.name);
                    emit(
                        MessageKind::Error,
                        overall,
                        Some(step_id),
                        elapsed,
                        &steps,
                        Some(error),
                    );
                    return frames;
                }

                let done = tick == ticks;
                advance_step(step, fraction, done, elapsed);
                if done {
                    step.end_time = Some(elapsed);
                    step.duration_ms = Some(elapsed - started);
                }
                let overall = (index as f64 * 100.0 + step.progress) / step_count;
                let current = (!done).then_some(step_id);
                emit(
                    MessageKind::ProgressUpdate,
                    overall,
                    current,
                    elapsed,
                    &steps,
                    None,
                );
            }
        }

        emit(MessageKind::Complete, 100.0, None, elapsed, &steps, None);
        frames
    }
}

fn advance_step(step: &mut Step, fraction: f64, done: bool, now: f64) {
    step.status = if done {
        StepStatus::Completed
    } else {
        StepStatus::Running
    };
    step.progress = if done { 100.0 } else { fraction * 100.0 };

    let share = 100.0 / step.substeps.len().max(1) as f64;
    for (position, sub) in step.substeps.iter_mut().enumerate() {
        let progress = if done {
            100.0
        } else {
            ((step.progress - position as f64 * share) / share * 100.0).clamp(0.0, 100.0)
        };
        let (status, progress) = if progress >= 100.0 - f64::EPSILON {
            (StepStatus::Completed, 100.0)
        } else if progress > 0.0 {
            (StepStatus::Running, progress)
        } else {
            (StepStatus::Pending, 0.0)
        };
        if status != StepStatus::Pending && sub.start_time.is_none() {
            sub.start_time = Some(now);
        }
        if status == StepStatus::Completed && sub.end_time.is_none() {
            sub.end_time = Some(now);
        }
        sub.status = status;
        sub.progress = progress;
    }
}

/// Transport that plays a [`SimulationScript`] on every connection.
#[derive(Debug, Clone, Default)]
pub struct SimulatedTransport {
    script: SimulationScript,
}

impl SimulatedTransport {
    pub fn new(script: SimulationScript) -> Self {
        Self { script }
    }
}

#[async_trait::async_trait]
impl Transport for SimulatedTransport {
    async fn connect(&self, task_id: &str) -> Result<Box<dyn Connection>, TransportError> {
        tracker_debug!("simulating task {}", task_id);
        Ok(Box::new(SimulatedConnection {
            frames: self.script.frames(task_id).into(),
            latest: None,
            resend: false,
            tick: self.script.tick,
        }))
    }
}

struct SimulatedConnection {
    frames: VecDeque<ProgressModel>,
    latest: Option<ProgressModel>,
    resend: bool,
    tick: Duration,
}

impl SimulatedConnection {
    fn encode(model: &ProgressModel) -> TransportEvent {
        match encode_snapshot(model) {
            Ok(text) => TransportEvent::Text(text),
            Err(err) => {
                tracker_warn!("simulator cannot encode snapshot: {}", err);
                TransportEvent::Closed(CloseKind::Abnormal)
            }
        }
    }
}

#[async_trait::async_trait]
impl Connection for SimulatedConnection {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        match OutboundMessage::from_json(&text) {
            Ok(OutboundMessage::RequestStatus { .. }) => {
                self.resend = self.latest.is_some();
            }
            Err(err) => tracker_debug!("simulator ignoring message: {}", err),
        }
        Ok(())
    }

    async fn recv(&mut self) -> TransportEvent {
        if self.resend {
            self.resend = false;
            if let Some(latest) = &self.latest {
                return Self::encode(latest);
            }
        }
        if self.frames.is_empty() {
            return TransportEvent::Closed(CloseKind::RemoteClean);
        }

        // Pop only after the delay so a cancelled recv loses nothing.
        tokio::time::sleep(self.tick).await;
        let Some(next) = self.frames.pop_front() else {
            return TransportEvent::Closed(CloseKind::RemoteClean);
        };
        let event = Self::encode(&next);
        self.latest = Some(next);
        event
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.frames.clear();
        Ok(())
    }
}
