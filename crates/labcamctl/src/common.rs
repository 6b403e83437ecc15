use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use labcam::sim::{SimBackend, SimConfig, TriggerLine};
use labcam::{Camera, CameraDefaults, Library};
use serde::{Deserialize, Serialize};
use stage::{SimStageConfig, TriggerOutput};
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::{debug, info};

/// Consecutive poll timeouts tolerated before giving up on a frame.
pub const DEFAULT_POLL_RETRIES: u32 = 3;

/// Optional JSON configuration shared by every subcommand.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CtlConfig {
    pub camera: SimConfig,
    pub defaults: CameraDefaults,
    pub stage: SimStageConfig,
}

pub fn load_config(path: Option<&Path>) -> Result<CtlConfig> {
    let Some(path) = path else {
        return Ok(CtlConfig::default());
    };
    let text =
        fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    let config: CtlConfig = serde_json::from_str(&text)
        .with_context(|| format!("parse config {}", path.display()))?;
    debug!(file = %path.display(), ?config, "loaded configuration");
    Ok(config)
}

/// Initialise the driver library and open its first camera.
pub fn open_camera(
    config: &SimConfig,
    defaults: &CameraDefaults,
) -> Result<(Library<SimBackend>, TriggerLine, Camera<SimBackend>)> {
    let backend = SimBackend::new(config.clone());
    let line = backend.trigger_line();
    let library = Library::init(backend).context("initialise camera library")?;
    let camera = library
        .open_first(defaults)
        .context("open first camera")?;
    info!(camera = camera.name(), "camera ready");
    Ok((library, line, camera))
}

/// Feeds stage trigger pulses into the simulated camera's trigger input.
pub struct LineAdapter(pub TriggerLine);

impl TriggerOutput for LineAdapter {
    fn pulse(&self, _line: u8) {
        self.0.pulse();
    }
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("serialise JSON output")?;
    println!("{text}");
    Ok(())
}

/// `yymmdd_HHMMSS` in local time, UTC when the offset is unknown.
pub fn file_timestamp(now: OffsetDateTime) -> Result<String> {
    let format = format_description!("[year repr:last_two][month][day]_[hour][minute][second]");
    now.format(format).context("format timestamp")
}

pub fn now_local() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}
