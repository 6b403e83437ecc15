use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use labcamctl::cmd_live::{self, LiveArgs};
use labcamctl::cmd_sequence::{self, SequenceArgs};
use labcamctl::common::{self, DEFAULT_POLL_RETRIES};
use labcamctl::{cmd_get, cmd_info, cmd_set, cmd_settings};

#[derive(Parser, Debug)]
#[command(name = "labcamctl", version, about = "Scientific camera CLI")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
    /// Output JSON where applicable
    #[arg(long)]
    json: bool,
    /// JSON file with camera, defaults and stage sections
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Show camera identity, sensor size and temperature
    Info,
    /// List every setting with its value and allowed range
    Settings,
    /// Read one setting by name
    Get {
        #[arg(long)]
        name: String,
    },
    /// Write one setting by name and print the value read back
    Set {
        #[arg(long)]
        name: String,
        #[arg(long)]
        value: String,
    },
    /// Continuous acquisition until Ctrl-C, a duration or a frame limit
    Live {
        #[arg(long)]
        exposure_ms: Option<u32>,
        #[arg(long)]
        binning: Option<u32>,
        #[arg(long, default_value_t = 0)]
        duration_s: u64,
        #[arg(long)]
        frames: Option<u64>,
    },
    /// Stage-triggered sequence saved as a multi-page TIFF
    Sequence {
        #[arg(long, default_value_t = 5)]
        frames: u32,
        #[arg(long, default_value_t = 10)]
        exposure_ms: u32,
        #[arg(long, default_value_t = 2)]
        binning: u32,
        #[arg(long, default_value = "EdgeTrigger")]
        trigger: String,
        #[arg(long, default_value_t = 1.0)]
        velocity: f64,
        #[arg(long, default_value_t = 1.5)]
        approach: f64,
        #[arg(long, default_value_t = 4.5)]
        end: f64,
        #[arg(long, default_value_t = 0.025)]
        step: f64,
        #[arg(long, default_value_t = 2.3)]
        window_start: f64,
        #[arg(long, default_value_t = 2.4)]
        window_stop: f64,
        #[arg(long, default_value_t = 1)]
        line: u8,
        #[arg(long, default_value_t = DEFAULT_POLL_RETRIES)]
        retries: u32,
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
        #[arg(long, default_value = "retiga_ext_trigger")]
        prefix: String,
        /// Write a classic TIFF instead of BigTIFF
        #[arg(long)]
        classic_tiff: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli {
        verbose,
        json,
        config,
        cmd,
    } = Cli::parse();

    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| level.into()),
        ))
        .with_target(false)
        .init();

    let config = common::load_config(config.as_deref())?;
    match cmd {
        Cmd::Info => cmd_info::run(&config, json)?,
        Cmd::Settings => cmd_settings::run(&config, json)?,
        Cmd::Get { name } => cmd_get::run(&config, &name, json)?,
        Cmd::Set { name, value } => cmd_set::run(&config, &name, &value, json)?,
        Cmd::Live {
            exposure_ms,
            binning,
            duration_s,
            frames,
        } => {
            let args = LiveArgs {
                exposure_ms,
                binning,
                duration_s,
                max_frames: frames,
            };
            cmd_live::run(config, args, json).await?
        }
        Cmd::Sequence {
            frames,
            exposure_ms,
            binning,
            trigger,
            velocity,
            approach,
            end,
            step,
            window_start,
            window_stop,
            line,
            retries,
            output_dir,
            prefix,
            classic_tiff,
        } => {
            let args = SequenceArgs {
                frames,
                exposure_ms,
                binning,
                trigger,
                velocity,
                approach,
                end,
                step,
                window_start,
                window_stop,
                line,
                retries,
                output_dir,
                prefix,
                classic_tiff,
            };
            cmd_sequence::run(config, args, json).await?
        }
    };

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_sequence_defaults() {
        let cli = Cli::parse_from(["labcamctl", "sequence"]);
        match cli.cmd {
            Cmd::Sequence {
                frames,
                exposure_ms,
                binning,
                trigger,
                step,
                window_start,
                window_stop,
                classic_tiff,
                ..
            } => {
                assert_eq!((frames, exposure_ms, binning), (5, 10, 2));
                assert_eq!(trigger, "EdgeTrigger");
                assert_eq!((step, window_start, window_stop), (0.025, 2.3, 2.4));
                assert!(!classic_tiff);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn parse_set_with_global_flags() {
        let cli = Cli::parse_from([
            "labcamctl",
            "-vv",
            "--json",
            "set",
            "--name",
            "trigger_mode",
            "--value",
            "Edge Trigger",
        ]);
        assert_eq!(cli.verbose, 2);
        assert!(cli.json);
        match cli.cmd {
            Cmd::Set { name, value } => {
                assert_eq!(name, "trigger_mode");
                assert_eq!(value, "Edge Trigger");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn parse_live_limits() {
        let cli = Cli::parse_from(["labcamctl", "live", "--frames", "20", "--binning", "4"]);
        match cli.cmd {
            Cmd::Live {
                frames,
                binning,
                duration_s,
                ..
            } => {
                assert_eq!(frames, Some(20));
                assert_eq!(binning, Some(4));
                assert_eq!(duration_s, 0);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
