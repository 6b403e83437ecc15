use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::common::{self, CtlConfig};

#[derive(Serialize)]
struct SetResponse<'a> {
    name: &'a str,
    value: String,
}

/// Write a setting and print the value read back from the camera.
pub fn run(config: &CtlConfig, name: &str, value: &str, json: bool) -> Result<()> {
    let (_library, _line, mut camera) = common::open_camera(&config.camera, &config.defaults)?;
    info!(camera = camera.name(), setting = name, value, "writing setting");
    let read_back = camera
        .set_parameter_by_name(name, value)
        .with_context(|| format!("write setting {name}"))?;
    camera.disconnect().context("close camera")?;

    if json {
        let payload = SetResponse {
            name,
            value: read_back.to_string(),
        };
        common::print_json(&payload)?;
    } else {
        println!("{read_back}");
    }
    Ok(())
}
