use std::fs;
use std::path::Path;

use anyhow::{bail, Context};
use tracker_engine::TrackerSettings;
use tracker_logging::tracker_info;

/// Read settings from a RON file; fields missing from the file keep their
/// defaults. Without a path the defaults are used as-is.
pub(crate) fn load_settings(path: Option<&Path>) -> anyhow::Result<TrackerSettings> {
    let Some(path) = path else {
        return Ok(TrackerSettings::default());
    };
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read settings from {:?}", path))?;
    let settings: TrackerSettings = ron::from_str(&content)
        .with_context(|| format!("failed to parse settings from {:?}", path))?;
    tracker_info!("Loaded settings from {:?}", path);
    Ok(settings)
}

/// Command-line values win over the settings file.
pub(crate) fn apply_overrides(
    mut settings: TrackerSettings,
    url: Option<&str>,
) -> anyhow::Result<TrackerSettings> {
    if let Some(url) = url {
        settings.base_url = url.to_string();
    }
    if settings.reconnect.max_attempts > 0 && settings.reconnect.interval_ms == 0 {
        bail!("reconnect interval must be positive when retries are enabled");
    }
    Ok(settings)
}
