//! Runs the streaming engine against real audio devices.
//!
//! No voice model ships with this binary, so the stream runs in monitor
//! mode: gating, optional phase-vocoder stitching and the full SOLA path
//! are exercised on the dry input.

use std::{
    fs,
    io::BufRead,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use vc_audio::{list_input_devices, list_output_devices, CpalPort, StreamEngine};
use vc_core::{ProcessingMode, StreamConfig};

#[derive(Parser)]
#[command(name = "vc-cli", about = "Realtime voice-conversion stream host")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List input and output devices
    Devices,
    /// Open a duplex stream and run until Enter or --duration
    Run(RunArgs),
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// JSON stream config; fields not given fall back to defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    input_device: Option<String>,

    #[arg(long)]
    output_device: Option<String>,

    #[arg(long)]
    sample_rate: Option<u32>,

    #[arg(long)]
    channels: Option<u16>,

    /// Block duration in seconds
    #[arg(long)]
    block_time: Option<f32>,

    /// Crossfade duration in seconds
    #[arg(long)]
    crossfade_time: Option<f32>,

    /// Extra left context in seconds
    #[arg(long)]
    extra_time: Option<f32>,

    /// Silence threshold in dB (-60 disables gating)
    #[arg(long, allow_hyphen_values = true)]
    threshold: Option<f32>,

    #[arg(long)]
    phase_vocoder: bool,

    /// Stop after this many consecutive failed callbacks
    #[arg(long, default_value_t = 50)]
    max_consecutive_failures: u64,

    /// Run for this many seconds instead of waiting for Enter
    #[arg(long)]
    duration: Option<f64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    match cli.command {
        Command::Devices => print_devices(),
        Command::Run(args) => run(args),
    }
}

fn print_devices() -> Result<()> {
    println!("input devices:");
    for name in list_input_devices().context("failed to list input devices")? {
        println!("  {name}");
    }
    println!("output devices:");
    for name in list_output_devices().context("failed to list output devices")? {
        println!("  {name}");
    }
    Ok(())
}

fn load_config(args: &RunArgs) -> Result<StreamConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str::<StreamConfig>(&text)
                .with_context(|| format!("failed to parse {}", path.display()))?
        }
        None => StreamConfig::default(),
    };
    apply_overrides(&mut config, args);
    Ok(config)
}

fn apply_overrides(config: &mut StreamConfig, args: &RunArgs) {
    if let Some(rate) = args.sample_rate {
        config.sample_rate = rate;
    }
    if let Some(channels) = args.channels {
        config.channels = channels;
    }
    if let Some(block) = args.block_time {
        config.block_time = block;
    }
    if let Some(crossfade) = args.crossfade_time {
        config.crossfade_time = crossfade;
    }
    if let Some(extra) = args.extra_time {
        config.extra_time = extra;
    }
    if let Some(threshold) = args.threshold {
        config.threshold_db = threshold;
    }
    if args.phase_vocoder {
        config.use_phase_vocoder = true;
    }
    config.model_sample_rate = config.sample_rate;
    config.mode = ProcessingMode::Monitor;
}

fn run(args: RunArgs) -> Result<()> {
    let config = load_config(&args)?;
    let port = CpalPort::new(args.input_device.clone(), args.output_device.clone());
    let mut engine = StreamEngine::new(port);
    engine.configure(config).context("invalid stream config")?;
    engine.start().context("failed to start stream")?;

    let stop_requested = Arc::new(AtomicBool::new(false));
    if args.duration.is_none() {
        let stop = Arc::clone(&stop_requested);
        thread::spawn(move || {
            let mut line = String::new();
            let _ = std::io::stdin().lock().read_line(&mut line);
            stop.store(true, Ordering::Relaxed);
        });
        log::info!("press Enter to stop");
    }

    let started = Instant::now();
    let mut last_heartbeat = Instant::now();
    let outcome = loop {
        thread::sleep(Duration::from_millis(100));
        let stats = engine.stats();
        if stats.consecutive_errors >= args.max_consecutive_failures {
            break Err(stats);
        }
        if last_heartbeat.elapsed() >= Duration::from_secs(1) {
            log::info!(
                "heartbeat callbacks={} overruns={} errors={} sola_offset={} elapsed={:.2}ms rms={:.4} peak={:.4}",
                stats.callbacks,
                stats.overruns,
                stats.errors,
                stats.last_sola_offset,
                stats.last_elapsed.as_secs_f64() * 1000.0,
                stats.output_rms,
                stats.output_peak
            );
            last_heartbeat = Instant::now();
        }
        let timed_out = args
            .duration
            .is_some_and(|secs| started.elapsed().as_secs_f64() >= secs);
        if timed_out || stop_requested.load(Ordering::Relaxed) {
            break Ok(());
        }
    };
    engine.stop();

    if let Err(stats) = outcome {
        bail!(
            "stopped after {} consecutive failed callbacks (last error: {:?})",
            stats.consecutive_errors,
            stats.last_error
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_force_monitor_mode_at_device_rate() {
        let mut config = StreamConfig::default();
        let args = RunArgs {
            sample_rate: Some(48_000),
            threshold: Some(-45.0),
            phase_vocoder: true,
            ..RunArgs::default()
        };
        apply_overrides(&mut config, &args);
        assert_eq!(config.sample_rate, 48_000);
        assert_eq!(config.model_sample_rate, 48_000);
        assert_eq!(config.threshold_db, -45.0);
        assert!(config.use_phase_vocoder);
        assert_eq!(config.mode, ProcessingMode::Monitor);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn cli_parses_run_flags() {
        let cli = Cli::try_parse_from([
            "vc-cli",
            "run",
            "--threshold",
            "-40",
            "--block-time",
            "0.1",
            "--duration",
            "2",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.threshold, Some(-40.0));
        assert_eq!(args.block_time, Some(0.1));
        assert_eq!(args.max_consecutive_failures, 50);
    }
}
