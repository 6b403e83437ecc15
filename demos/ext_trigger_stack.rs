//! Stage-triggered sequence: the stage sweeps through a trigger window, every
//! trigger position starts one exposure, and the frames land in a TIFF stack.

use std::env;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use labcam_rs::labcam::sim::{SimBackend, SimConfig};
use labcam_rs::labcam::{collect_frames, CameraDefaults, Library, TriggerMode};
use labcam_rs::labcamctl::common::{file_timestamp, now_local, LineAdapter};
use labcam_rs::labcamctl::tiff_stack;
use labcam_rs::stage::{SimStage, SimStageConfig, Stage, TriggerParams};
use tracing::info;

const MOVE_TIMEOUT: Duration = Duration::from_secs(10);

fn main() -> Result<(), Box<dyn Error>> {
    labcam_rs::init_tracing("info");
    let mut out_dir = env::temp_dir();
    let mut frame_num = 5u32;
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--out" => {
                out_dir = PathBuf::from(args.next().ok_or("--out requires a directory")?);
            }
            "--frames" => {
                frame_num = args.next().ok_or("--frames requires a count")?.parse()?;
            }
            other => return Err(format!("unknown argument: {other}").into()),
        }
    }

    let backend = SimBackend::new(SimConfig::default().line_triggered());
    let line = backend.trigger_line();
    let library = Library::init(backend)?;
    let mut camera = library.open_first(&CameraDefaults::default())?;

    let mut motor =
        SimStage::new(SimStageConfig::default()).with_output(Arc::new(LineAdapter(line)));
    motor.set_velocity(1.0)?;
    motor.move_absolute(1.5)?;
    motor.wait_on_target(MOVE_TIMEOUT)?;

    camera.set_exposure_ms(10)?;
    camera.set_binning(2)?;
    println!("Exposure time [ms] is: {}", camera.exposure_ms());
    println!("Temperature [°C] is: {:.1}", camera.temperature()?);
    println!("Binning is: {}", camera.binning());
    println!("Gain is: {}", camera.gain());
    let (width, height) = camera.geometry().sensor_size();
    println!("Sensor size is (width, height): ({width}, {height})");

    camera.set_trigger_mode(TriggerMode::EdgeTrigger)?;
    println!("Acquisition mode is: {}", camera.trigger_mode().label());
    println!("Initial position for trigger: {:.3}", motor.position()?);
    // Five pulses: 2.300, 2.325, 2.350, 2.375, 2.400 mm.
    motor.trigger(TriggerParams::position_distance(0.025, 2.3, 2.4, 1))?;

    camera.start_sequence(frame_num)?;
    motor.move_absolute(4.5)?;
    motor.wait_on_target(MOVE_TIMEOUT)?;
    println!("Final position after trigger: {:.3}", motor.position()?);

    let frames = collect_frames(&mut camera, frame_num as usize, 3)?;
    for frame in &frames {
        let first: Vec<u16> = (0..5).filter_map(|x| frame.pixel(x, 0)).collect();
        println!(
            "Count: {:2}  FPS: {:5.1}  First five pixels: {first:?}",
            frame.frame_count, frame.fps
        );
    }
    println!("Received frames: {}", frames.len());

    let sample_name = format!(
        "retiga_ext_trigger_{frame_num}frames_{}",
        file_timestamp(now_local())?
    );
    let path = out_dir.join(format!("{sample_name}.tiff"));
    tiff_stack::write_stack(&path, &frames, true)?;
    info!(file = %path.display(), "stack saved");

    camera.stop()?;
    camera.set_trigger_mode(TriggerMode::InternalTrigger)?;
    motor.close()?;
    camera.disconnect()?;
    println!("Camera closed");
    Ok(())
}
