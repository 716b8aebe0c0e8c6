use tracker_core::{ProgressViewModel, StepRowView, StepStatus};

const BAR_WIDTH: usize = 30;

/// Text lines for one frame of the progress display.
pub fn render(view: &ProgressViewModel) -> Vec<String> {
    let mut lines = Vec::with_capacity(view.steps.len() + 2);
    lines.push(format!(
        "[{task}] {status} {bar} {percent:5.1}% ({elapsed})",
        task = view.task_id,
        status = view.status,
        bar = progress_bar(view.overall_progress),
        percent = view.overall_progress,
        elapsed = format_elapsed(view.elapsed_time_ms),
    ));
    lines.extend(view.steps.iter().map(format_step_row));
    if let Some(error) = &view.error {
        lines.push(format!("error: {error}"));
    }
    lines
}

fn format_step_row(row: &StepRowView) -> String {
    let indent = "  ".repeat(row.depth + 1);
    let marker = if row.is_current { ">" } else { " " };
    format!(
        "{indent}{marker} {label:<4} {name} ({progress:.0}%)",
        label = status_label(row.status),
        name = row.name,
        progress = row.progress,
    )
}

fn status_label(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Pending => "..",
        StepStatus::Running => "RUN",
        StepStatus::Completed => "OK",
        StepStatus::Error => "ERR",
    }
}

fn progress_bar(percent: f64) -> String {
    let filled = ((percent.clamp(0.0, 100.0) / 100.0) * BAR_WIDTH as f64).round() as usize;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(BAR_WIDTH - filled))
}

fn format_elapsed(ms: f64) -> String {
    let ms = ms.max(0.0) as u64;
    let seconds = ms / 1000;
    format!("{}:{:02}.{}", seconds / 60, seconds % 60, (ms % 1000) / 100)
}
