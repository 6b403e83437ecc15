use anyhow::{Context, Result};
use serde::Serialize;

use crate::common::{self, CtlConfig};

#[derive(Serialize)]
struct InfoReport {
    name: String,
    sensor_width: u32,
    sensor_height: u32,
    temperature_c: f64,
    temperature_setpoint_c: f64,
    standard_max_exposure_ms: u32,
}

pub fn run(config: &CtlConfig, json: bool) -> Result<()> {
    let (_library, _line, mut camera) = common::open_camera(&config.camera, &config.defaults)?;
    let info = camera.info().clone();
    let report = InfoReport {
        name: info.name,
        sensor_width: info.sensor_width,
        sensor_height: info.sensor_height,
        temperature_c: camera.temperature().context("read temperature")?,
        temperature_setpoint_c: camera
            .temperature_setpoint()
            .context("read temperature setpoint")?,
        standard_max_exposure_ms: camera.limits().standard_max_exposure_ms,
    };
    camera.disconnect().context("close camera")?;

    if json {
        return common::print_json(&report);
    }
    println!("Camera:        {}", report.name);
    println!(
        "Sensor:        {} x {} px",
        report.sensor_width, report.sensor_height
    );
    println!(
        "Temperature:   {:.1} °C (setpoint {:.1} °C)",
        report.temperature_c, report.temperature_setpoint_c
    );
    println!(
        "Port 0 limit:  {} ms exposure",
        report.standard_max_exposure_ms
    );
    Ok(())
}
