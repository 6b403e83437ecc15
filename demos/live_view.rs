//! Live acquisition from the simulated camera with a reduced ROI, printing
//! the frame counter and frame rate of every frame.

use std::env;
use std::error::Error;
use std::time::Duration;

use labcam_rs::labcam::sim::{SimBackend, SimConfig};
use labcam_rs::labcam::{CameraDefaults, CameraError, Library, NoFrameReason, Roi};

fn main() -> Result<(), Box<dyn Error>> {
    labcam_rs::init_tracing("info");
    let frames = env::args()
        .skip(1)
        .find_map(|arg| arg.strip_prefix("--frames=").map(|v| v.to_string()))
        .unwrap_or_else(|| "50".into())
        .parse::<u32>()?;

    let library = Library::init(SimBackend::new(SimConfig::default()))?;
    let defaults = CameraDefaults {
        exposure_ms: 5,
        roi: Some(Roi::new(1200, 800, 800, 600)),
        ..CameraDefaults::default()
    };
    let mut camera = library.open_first(&defaults)?;
    camera.set_poll_timeout(Duration::from_millis(500));
    println!(
        "{} ROI {} -> {:?} px",
        camera.name(),
        camera.roi(),
        camera.image_size()
    );

    camera.start_live()?;
    let mut received = 0;
    while received < frames {
        match camera.poll_frame() {
            Ok(frame) => {
                received += 1;
                println!(
                    "Count: {:4}  FPS: {:6.1}  Bytes: {}",
                    frame.frame_count,
                    frame.fps,
                    frame.data.len()
                );
            }
            Err(CameraError::NoFrameAvailable(NoFrameReason::Timeout(after))) => {
                println!("no frame after {after:?}");
            }
            Err(err) => return Err(err.into()),
        }
    }
    camera.stop()?;
    camera.disconnect()?;
    Ok(())
}
