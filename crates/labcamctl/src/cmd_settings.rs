use anyhow::{Context, Result};
use labcam::camparam::{Access, Constraint};
use labcam::sim::SimBackend;
use labcam::{CameraSettings, Library, Setting};
use serde::Serialize;
use tracing::info;

use crate::common::{self, CtlConfig};

#[derive(Serialize)]
struct SettingEntry {
    name: &'static str,
    value: String,
    unit: Option<&'static str>,
    writable: bool,
    allowed: String,
}

impl From<Setting<'_>> for SettingEntry {
    fn from(setting: Setting<'_>) -> Self {
        let desc = setting.descriptor;
        Self {
            name: setting.name(),
            value: setting.value.to_string(),
            unit: desc.unit,
            writable: desc.access == Access::ReadWrite,
            allowed: describe(&desc.constraint),
        }
    }
}

fn describe(constraint: &Constraint) -> String {
    match constraint {
        Constraint::Any => "-".to_string(),
        Constraint::Range { min, max, step } if *step > 1 => format!("{min}..={max} step {step}"),
        Constraint::Range { min, max, .. } => format!("{min}..={max}"),
        Constraint::Choices(choices) => choices
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("|"),
    }
}

/// Connect the settings list to the camera and print every setting.
pub fn run(config: &CtlConfig, json: bool) -> Result<()> {
    let library = Library::init(SimBackend::new(config.camera.clone()))
        .context("initialise camera library")?;
    let mut settings =
        CameraSettings::with_defaults(config.camera.limits, config.defaults.clone());
    settings.connect(&library).context("bind settings")?;
    let entries: Vec<SettingEntry> = settings.iter().map(SettingEntry::from).collect();
    settings.disconnect().context("release camera")?;
    info!(count = entries.len(), "read settings");

    if json {
        return common::print_json(&entries);
    }
    println!(
        "{:<22} {:<18} {:<5} {:<3} {}",
        "NAME", "VALUE", "UNIT", "RW", "ALLOWED"
    );
    for entry in &entries {
        println!(
            "{:<22} {:<18} {:<5} {:<3} {}",
            entry.name,
            entry.value,
            entry.unit.unwrap_or("-"),
            if entry.writable { "rw" } else { "ro" },
            entry.allowed,
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use labcam::camparam::{ParamId, SettingDescriptor};
    use labcam::Limits;

    #[test]
    fn constraints_render_compactly() {
        let limits = Limits::default();
        let binning = SettingDescriptor::for_param(ParamId::Binning, &limits);
        assert_eq!(describe(&binning.constraint), "1|2|4");
        let hsize = SettingDescriptor::for_param(ParamId::SubarrayHSize, &limits);
        assert!(describe(&hsize.constraint).ends_with("step 4"));
        let name = SettingDescriptor::for_param(ParamId::Name, &limits);
        assert_eq!(describe(&name.constraint), "-");
    }
}
