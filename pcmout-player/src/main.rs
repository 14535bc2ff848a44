//! Tone player (pcmout-player) - Main entry point
//!
//! Opens an output, writes a generated sine tone in one call, ends the
//! stream and logs every lifecycle event. Exits non-zero if the session
//! ends with an error event.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use pcmout_common::config::{resolve_config_path, PlayerConfig, CONFIG_ENV_VAR};
use pcmout_common::AudioFormat;
use pcmout_player::{
    CpalSink, DeviceSink, EventStream, NullSink, PlaybackController, PlaybackEvent, SineSource,
    WavSink,
};
use tokio::signal;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for pcmout-player
#[derive(Parser, Debug)]
#[command(name = "pcmout-player")]
#[command(about = "Play a sine tone through the pcmout playback core")]
#[command(version)]
struct Args {
    /// Channel count
    #[arg(long, default_value = "2", env = "PCMOUT_CHANNELS")]
    channels: u16,

    /// Bits per sample (8, 16, 24 or 32)
    #[arg(long, default_value = "16", env = "PCMOUT_BIT_DEPTH")]
    bit_depth: u16,

    /// Frames per second
    #[arg(long, default_value = "44100", env = "PCMOUT_SAMPLE_RATE")]
    sample_rate: u32,

    /// Tone length in seconds
    #[arg(long, default_value = "2")]
    duration: f64,

    /// Tone frequency in Hz
    #[arg(long, default_value = "440")]
    frequency: f64,

    /// Volume from 0.0 to 1.0
    #[arg(long, default_value = "0.5")]
    amplitude: f64,

    /// Output device name (default device if omitted)
    #[arg(long, env = "PCMOUT_DEVICE")]
    device: Option<String>,

    /// Write the stream to a WAV file instead of a device
    #[arg(short, long, conflicts_with = "null")]
    output: Option<PathBuf>,

    /// Discard the stream instead of playing it
    #[arg(long)]
    null: bool,

    /// List output devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Print events to stdout as JSON lines
    #[arg(long)]
    events_json: bool,

    /// Configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref(), CONFIG_ENV_VAR);
    let config = PlayerConfig::load_or_default(config_path.as_deref())
        .context("Failed to load configuration")?;

    // Initialize tracing
    let level = config.logging.level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("pcmout_player={level},pcmout_common={level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match &config_path {
        Some(path) if path.exists() => info!("Configuration: {}", path.display()),
        Some(path) => info!("No config file at {}; using defaults", path.display()),
        None => info!("No config file; using defaults"),
    }

    if args.list_devices {
        for name in CpalSink::list_devices().context("Failed to enumerate output devices")? {
            println!("{}", name);
        }
        return Ok(());
    }

    let format = AudioFormat::new(args.channels, args.bit_depth, args.sample_rate)
        .context("Invalid audio format")?;
    let duration = Duration::try_from_secs_f64(args.duration)
        .map_err(|e| anyhow!("Invalid duration {}: {}", args.duration, e))?;

    let pcm = SineSource::new(format, args.frequency, args.amplitude, duration)
        .and_then(SineSource::render_all)
        .context("Failed to generate tone")?;
    info!(
        "Generated {:?} of {} Hz at {:.0}% volume ({} bytes)",
        duration,
        args.frequency,
        args.amplitude * 100.0,
        pcm.len()
    );

    let sink: Box<dyn DeviceSink> = if args.null {
        Box::new(NullSink::new())
    } else if let Some(path) = &args.output {
        Box::new(WavSink::new(path))
    } else {
        Box::new(CpalSink::with_device(
            args.device.clone().or_else(|| config.playback.device.clone()),
        ))
    };

    let controller =
        PlaybackController::new(config.playback.clone()).context("Invalid playback configuration")?;
    let session = Arc::new(
        controller
            .open(format, sink)
            .context("Failed to open playback")?,
    );
    let events = session
        .take_events()
        .context("Event stream already taken")?;
    let reporter = tokio::spawn(report_events(events, args.events_json));

    let writer = Arc::clone(&session);
    let mut playback = tokio::task::spawn_blocking(move || {
        writer.write(&pcm)?;
        writer.end()
    });

    let outcome = tokio::select! {
        result = &mut playback => result.context("Playback task panicked")?,
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, stopping playback");
            let stopper = Arc::clone(&session);
            if let Err(e) = tokio::task::spawn_blocking(move || stopper.end())
                .await
                .context("Stop task panicked")?
            {
                debug!("Stop after Ctrl+C: {}", e);
            }
            playback.await.context("Playback task panicked")?
        }
    };
    if let Err(e) = &outcome {
        debug!("Playback call returned: {}", e);
    }
    drop(session);

    match reporter.await.context("Event reporter panicked")? {
        Some(PlaybackEvent::Error { kind, message }) => {
            Err(anyhow!("Playback failed ({}): {}", kind, message))
        }
        Some(_) => {
            info!("Playback complete");
            Ok(())
        }
        None => Err(anyhow!("Event stream ended without a terminal event")),
    }
}

/// Log events until the terminal one, which is returned
async fn report_events(mut events: EventStream, json: bool) -> Option<PlaybackEvent> {
    while let Some(event) = events.recv().await {
        if json {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!("Failed to serialize event: {}", e),
            }
        }

        match &event {
            PlaybackEvent::Opened { format } => info!("open: {}", format),
            PlaybackEvent::Flush { bytes_delivered } => {
                info!("flush: {} bytes delivered", bytes_delivered)
            }
            PlaybackEvent::Closed => info!("close"),
            PlaybackEvent::Error { kind, message } => error!("error: {} ({})", message, kind),
        }

        if event.is_terminal() {
            return Some(event);
        }
    }
    None
}
