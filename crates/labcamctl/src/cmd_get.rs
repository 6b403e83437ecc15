use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::common::{self, CtlConfig};

#[derive(Serialize)]
struct SettingValue<'a> {
    name: &'a str,
    value: String,
}

pub fn run(config: &CtlConfig, name: &str, json: bool) -> Result<()> {
    let (_library, _line, mut camera) = common::open_camera(&config.camera, &config.defaults)?;
    info!(camera = camera.name(), setting = name, "reading setting");
    let value = camera
        .get_parameter_by_name(name)
        .with_context(|| format!("read setting {name}"))?;
    camera.disconnect().context("close camera")?;

    if json {
        let payload = SettingValue {
            name,
            value: value.to_string(),
        };
        common::print_json(&payload)?;
    } else {
        println!("{value}");
    }
    Ok(())
}
