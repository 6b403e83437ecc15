use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use labcam::{CameraError, NoFrameReason};
use serde::Serialize;
use tracing::{debug, info};

use crate::common::{self, CtlConfig};

/// Short polls keep the loop responsive to Ctrl-C.
const LIVE_POLL_TIMEOUT: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct LiveArgs {
    pub exposure_ms: Option<u32>,
    pub binning: Option<u32>,
    /// Stop after this many seconds; 0 runs until interrupted.
    pub duration_s: u64,
    /// Stop after this many delivered frames.
    pub max_frames: Option<u64>,
}

#[derive(Debug, Default, Serialize)]
struct LiveSummary {
    frames: u64,
    /// Frames overwritten in the circular buffer before they were read.
    skipped: u64,
    last_fps: f64,
    elapsed_s: f64,
    interrupted: bool,
}

pub async fn run(config: CtlConfig, args: LiveArgs, json: bool) -> Result<()> {
    let stop = Arc::new(AtomicBool::new(false));
    let mut worker = {
        let stop = Arc::clone(&stop);
        tokio::task::spawn_blocking(move || live_loop(&config, &args, &stop))
    };
    let mut summary = tokio::select! {
        joined = &mut worker => joined.context("live worker panicked")??,
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl-c; stopping live acquisition");
            stop.store(true, Ordering::Relaxed);
            worker.await.context("live worker panicked")??
        }
    };
    summary.interrupted = stop.load(Ordering::Relaxed);

    if json {
        return common::print_json(&summary);
    }
    if summary.interrupted {
        println!("Live view interrupted by user.");
    }
    println!(
        "Summary: frames={} skipped={} last_fps={:.1} elapsed={:.1}s",
        summary.frames, summary.skipped, summary.last_fps, summary.elapsed_s
    );
    Ok(())
}

fn live_loop(config: &CtlConfig, args: &LiveArgs, stop: &AtomicBool) -> Result<LiveSummary> {
    let (_library, _line, mut camera) = common::open_camera(&config.camera, &config.defaults)?;
    if let Some(exposure_ms) = args.exposure_ms {
        camera.set_exposure_ms(exposure_ms).context("set exposure")?;
    }
    if let Some(binning) = args.binning {
        camera.set_binning(binning).context("set binning")?;
    }
    camera.set_poll_timeout(LIVE_POLL_TIMEOUT);
    camera.start_live().context("start live acquisition")?;

    let started = Instant::now();
    let deadline = (args.duration_s > 0).then(|| started + Duration::from_secs(args.duration_s));
    let mut summary = LiveSummary::default();
    let mut last_report = started;
    let mut last_count = 0;
    while !stop.load(Ordering::Relaxed) {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            info!("live duration elapsed");
            break;
        }
        if args.max_frames.is_some_and(|max| summary.frames >= max) {
            break;
        }
        let frame = match camera.poll_frame() {
            Ok(frame) => frame,
            Err(CameraError::NoFrameAvailable(NoFrameReason::Timeout(after))) => {
                debug!(?after, "no frame yet");
                continue;
            }
            Err(err) => return Err(err).context("poll frame"),
        };
        summary.frames += 1;
        summary.skipped += frame.frame_count.saturating_sub(last_count + 1);
        summary.last_fps = frame.fps;
        last_count = frame.frame_count;
        if last_report.elapsed() >= Duration::from_secs(1) {
            last_report = Instant::now();
            println!(
                "[live] count={} fps={:.1} first_pixel={}",
                frame.frame_count,
                frame.fps,
                frame.pixel(0, 0).unwrap_or_default()
            );
        }
    }
    summary.elapsed_s = started.elapsed().as_secs_f64();
    camera.stop().context("stop live acquisition")?;
    camera.disconnect().context("close camera")?;
    Ok(summary)
}
