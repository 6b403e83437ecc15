use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use labcam::{collect_frames, TriggerMode};
use serde::Serialize;
use stage::{SimStage, Stage, TriggerOutputMode, TriggerParams};
use tracing::{info, warn};

use crate::common::{self, CtlConfig, LineAdapter};
use crate::tiff_stack;

/// Extra time granted to a move beyond its nominal duration.
const MOVE_MARGIN: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct SequenceArgs {
    pub frames: u32,
    pub exposure_ms: u32,
    pub binning: u32,
    pub trigger: String,
    pub velocity: f64,
    /// Position the stage waits at before the scan.
    pub approach: f64,
    /// Position the scan ends at.
    pub end: f64,
    pub step: f64,
    pub window_start: f64,
    pub window_stop: f64,
    pub line: u8,
    pub retries: u32,
    pub output_dir: PathBuf,
    pub prefix: String,
    pub classic_tiff: bool,
}

#[derive(Debug, Serialize)]
struct SequenceReport {
    file: PathBuf,
    frames: usize,
    width: u32,
    height: u32,
    frame_counts: Vec<u64>,
    start_position: f64,
    final_position: f64,
    elapsed_s: f64,
}

pub async fn run(config: CtlConfig, args: SequenceArgs, json: bool) -> Result<()> {
    let report = tokio::task::spawn_blocking(move || acquire(&config, &args))
        .await
        .context("sequence worker panicked")??;

    if json {
        return common::print_json(&report);
    }
    println!(
        "Stage {:.3} -> {:.3} mm, received frames {:?}",
        report.start_position, report.final_position, report.frame_counts
    );
    println!(
        "Saved {} frames of {}x{} to {} in {:.2}s",
        report.frames,
        report.width,
        report.height,
        report.file.display(),
        report.elapsed_s
    );
    Ok(())
}

/// Stage-triggered sequence: every trigger position the stage crosses starts
/// one exposure; the frames are saved as one TIFF stack.
fn acquire(config: &CtlConfig, args: &SequenceArgs) -> Result<SequenceReport> {
    let started = Instant::now();
    let trigger: TriggerMode = args.trigger.parse().map_err(|err: String| anyhow!(err))?;
    let camera_config = config.camera.clone().line_triggered();
    let (_library, line, mut camera) = common::open_camera(&camera_config, &config.defaults)?;

    let mut stage =
        SimStage::new(config.stage.clone()).with_output(Arc::new(LineAdapter(line)));
    stage.set_velocity(args.velocity).context("set stage velocity")?;
    move_and_wait(&mut stage, args.approach)?;
    let start_position = stage.position()?;
    info!(position = start_position, "stage at start position");

    camera.set_exposure_ms(args.exposure_ms).context("set exposure")?;
    camera.set_binning(args.binning).context("set binning")?;
    camera.set_trigger_mode(trigger).context("set trigger mode")?;
    info!(
        exposure_ms = camera.exposure_ms(),
        binning = camera.binning(),
        trigger = %camera.trigger_mode(),
        temperature_c = camera.temperature()?,
        "camera configured"
    );

    let params = TriggerParams {
        step: args.step,
        start: args.window_start,
        stop: args.window_stop,
        line: args.line,
        mode: TriggerOutputMode::PositionDistance,
    };
    let pulses = params.positions().len();
    if trigger.is_per_frame() && pulses < args.frames as usize {
        warn!(
            pulses,
            frames = args.frames,
            "trigger window yields fewer pulses than requested frames"
        );
    }
    stage.trigger(params).context("configure stage trigger")?;
    camera
        .start_sequence(args.frames)
        .context("start sequence acquisition")?;
    move_and_wait(&mut stage, args.end)?;
    let final_position = stage.position()?;

    let frames = collect_frames(&mut camera, args.frames as usize, args.retries)
        .context("collect frames")?;
    camera.stop().context("stop acquisition")?;
    camera
        .set_trigger_mode(TriggerMode::InternalTrigger)
        .context("restore internal trigger")?;

    let stamp = common::file_timestamp(common::now_local())?;
    let file = args
        .output_dir
        .join(format!("{}_{}frames_{stamp}.tiff", args.prefix, args.frames));
    tiff_stack::write_stack(&file, &frames, !args.classic_tiff)?;

    stage.close().context("close stage")?;
    camera.disconnect().context("close camera")?;

    let (width, height) = frames
        .first()
        .map(|f| (f.width, f.height))
        .unwrap_or_default();
    Ok(SequenceReport {
        file,
        frames: frames.len(),
        width,
        height,
        frame_counts: frames.iter().map(|f| f.frame_count).collect(),
        start_position,
        final_position,
        elapsed_s: started.elapsed().as_secs_f64(),
    })
}

fn move_and_wait(stage: &mut SimStage, target: f64) -> Result<()> {
    let from = stage.position()?;
    let nominal = Duration::from_secs_f64((target - from).abs() / stage.velocity());
    stage
        .move_absolute(target)
        .with_context(|| format!("move stage to {target}"))?;
    stage
        .wait_on_target(nominal + MOVE_MARGIN)
        .with_context(|| format!("wait for stage at {target}"))?;
    Ok(())
}
