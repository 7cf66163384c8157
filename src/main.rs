use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use clap::{Parser, ValueEnum};
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chunked_encoder::chunker::{ChunkedEncoder, PipelineStatus};
use chunked_encoder::config::{load_config, ChunkerConfig};
use chunked_encoder::events::{ChunkEvent, EventBus};
use chunked_encoder::video::frame::{monotonic_ns, VideoFrame};
use chunked_encoder::video::Resolution;

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// Chunked encoder command line arguments
#[derive(Parser, Debug)]
#[command(name = "chunked-encoder")]
#[command(version, about = "Encode a synthetic frame stream into fixed-length chunk files", long_about = None)]
struct CliArgs {
    /// JSON configuration file
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output directory (overrides config)
    #[arg(short = 'o', long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Number of frames to generate
    #[arg(short = 'n', long, default_value_t = 300)]
    frames: u64,

    /// Frames per chunk (overrides duration * fps)
    #[arg(long, value_name = "N")]
    frames_per_chunk: Option<u32>,

    /// Pace frames at the configured frame rate instead of as fast as possible
    #[arg(long)]
    realtime: bool,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_level, args.verbose);

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ChunkerConfig::default(),
    };
    if let Some(dir) = &args.output {
        config.output.directory = dir.to_string_lossy().into_owned();
    }
    if let Some(frames) = args.frames_per_chunk {
        config.frames_per_chunk = Some(frames);
    }

    let resolution = config.video.resolution();
    let fps = config.fps;
    info!(
        "Encoding {} frames at {} {}fps into {}",
        args.frames, resolution, fps, config.output.directory
    );

    let events = EventBus::new();
    let event_task = tokio::spawn(print_events(events.subscribe()));

    let encoder = ChunkedEncoder::builder(config).event_bus(events).build()?;

    let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / fps.max(1) as f64));
    for index in 0..args.frames {
        if args.realtime {
            ticker.tick().await;
        }
        encoder.submit(VideoFrame::new(synthetic_nv12(resolution, index), monotonic_ns()));
    }
    encoder.request_stop();

    let status = encoder.wait_stopped().await;
    let stats = encoder.stats();
    info!("Pipeline {}: {}", status, serde_json::to_string(&stats)?);

    drop(encoder);
    if let Err(e) = event_task.await {
        warn!("Event printer exited abnormally: {}", e);
    }

    match status {
        PipelineStatus::Failed(reason) => {
            error!("Encoding failed: {}", reason);
            std::process::exit(1);
        }
        _ => Ok(()),
    }
}

/// Print chunk events until the pipeline ends
async fn print_events(mut rx: broadcast::Receiver<ChunkEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                let terminal = matches!(
                    event,
                    ChunkEvent::PipelineStopped { .. } | ChunkEvent::PipelineFailed { .. }
                );
                match serde_json::to_string(&event) {
                    Ok(json) => println!("{}", json),
                    Err(e) => warn!("Failed to serialize {}: {}", event.event_name(), e),
                }
                if terminal {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Event printer lagged, {} events skipped", n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// NV12 frame with a luma ramp that scrolls one line per frame
fn synthetic_nv12(resolution: Resolution, index: u64) -> Bytes {
    let width = resolution.width as usize;
    let height = resolution.height as usize;
    let mut data = vec![128u8; width * height * 3 / 2];
    for (row, line) in data[..width * height].chunks_mut(width).enumerate() {
        line.fill(((row as u64 + index) % 256) as u8);
    }
    Bytes::from(data)
}

fn init_logging(level: LogLevel, verbose_count: u8) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    // Build filter string based on effective level
    let filter = match effective_level {
        LogLevel::Error => "chunked_encoder=error",
        LogLevel::Warn => "chunked_encoder=warn",
        LogLevel::Info => "chunked_encoder=info",
        LogLevel::Verbose => "chunked_encoder=info,chunked_encoder::chunker=debug",
        LogLevel::Debug => "chunked_encoder=debug",
        LogLevel::Trace => "chunked_encoder=trace",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}
