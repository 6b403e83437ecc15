//! Host-side settings list: edit values offline, bind them to a camera,
//! write through to hardware, then unbind again.

use std::error::Error;

use labcam_rs::camparam::{Limits, ParamId};
use labcam_rs::labcam::sim::{SimBackend, SimConfig};
use labcam_rs::labcam::{CameraSettings, Library};

fn print_settings(settings: &CameraSettings<SimBackend>) {
    for setting in settings.iter() {
        println!(
            "  {:<22} {:<18} {}",
            setting.name(),
            setting.value.to_string(),
            if setting.bound { "hw" } else { "local" }
        );
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    labcam_rs::init_tracing("warn");
    let mut settings = CameraSettings::<SimBackend>::new(Limits::default());
    settings.set_from_str("number_frames", "25")?;
    settings.set_from_str("acquisition_mode", "MultiFrame")?;
    if let Err(err) = settings.set_from_str("binning", "3") {
        println!("rejected offline: {err}");
    }
    println!("Before connect:");
    print_settings(&settings);

    let library = Library::init(SimBackend::new(SimConfig::default()))?;
    settings.connect(&library)?;
    settings.set_from_str("readout", "1")?;
    settings.set_from_str("gain", "2")?;
    settings.set(ParamId::ExposureTime, 120_000u32)?;
    settings.set_from_str("trigger_mode", "Trigger First")?;
    println!("Connected:");
    print_settings(&settings);

    let (mode, frames) = settings.acquisition_plan();
    if let Some(device) = settings.device() {
        let mut camera = device.lock().map_err(|_| "camera lock poisoned")?;
        camera.set_exposure_ms(5)?;
        camera.start_acquisition(mode, frames)?;
        let collected = labcam_rs::labcam::collect_frames(&mut *camera, frames as usize, 3)?;
        println!("{mode} acquisition delivered {} frames", collected.len());
    }
    settings.read_from_hardware()?;
    settings.disconnect()?;
    println!("After disconnect:");
    print_settings(&settings);
    Ok(())
}
