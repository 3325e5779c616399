use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use rustls::crypto::{ring, CryptoProvider};
use tokio::task::JoinHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stream_viewer::config::ViewerConfig;
use stream_viewer::events::ViewerEvent;
use stream_viewer::webrtc::MediaStream;
use stream_viewer::{ConnectionState, SessionController};

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

/// stream-viewer command line arguments
#[derive(Parser, Debug)]
#[command(name = "stream-viewer")]
#[command(version, about = "Headless WebRTC stream viewer", long_about = None)]
struct CliArgs {
    /// Path to a TOML configuration file
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Streaming endpoint host, e.g. media.example.com (overrides config)
    #[arg(long, value_name = "HOST")]
    host: Option<String>,

    /// Stream name (overrides config)
    #[arg(short = 's', long, value_name = "NAME")]
    stream: Option<String>,

    /// Client id for the token exchange (overrides config)
    #[arg(long, value_name = "ID", env = "STREAM_VIEWER_CLIENT_ID")]
    client_id: Option<String>,

    /// Client secret for the token exchange (overrides config)
    #[arg(
        long,
        value_name = "SECRET",
        env = "STREAM_VIEWER_CLIENT_SECRET",
        hide_env_values = true
    )]
    client_secret: Option<String>,

    /// Use plain http/ws instead of https/wss (local testing only)
    #[arg(long)]
    insecure: bool,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    init_logging(args.log_level, args.verbose, args.log_json);

    // Install default crypto provider (required by rustls 0.23+)
    CryptoProvider::install_default(ring::default_provider())
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    tracing::info!("Starting stream-viewer v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => {
            tracing::info!("Loading configuration from {}", path.display());
            ViewerConfig::load(path)
                .await
                .with_context(|| format!("failed to load {}", path.display()))?
        }
        None => ViewerConfig::default(),
    };

    // Apply CLI argument overrides to config (only if explicitly specified)
    if let Some(host) = args.host {
        config.signaling.host = host;
    }
    if let Some(stream) = args.stream {
        config.signaling.stream_name = stream;
    }
    if let Some(id) = args.client_id {
        config.credential.client_id = id;
    }
    if let Some(secret) = args.client_secret {
        config.credential.client_secret = secret;
    }
    if args.insecure {
        tracing::warn!("TLS disabled for signaling and token exchange");
        config.signaling.secure = false;
    }
    config.validate()?;

    tracing::info!(
        "Viewing stream '{}' on {}",
        config.signaling.stream_name,
        config.signaling.host
    );

    let controller = SessionController::new(config)?;
    let mut events = controller.events().subscribe();
    let mut handle = controller.spawn();
    let mut media = handle.media_watch();
    let mut reader: Option<JoinHandle<()>> = None;

    let shutdown_signal = tokio::signal::ctrl_c();
    tokio::pin!(shutdown_signal);

    loop {
        tokio::select! {
            result = &mut shutdown_signal => {
                if let Err(e) = result {
                    tracing::error!("Failed to listen for Ctrl-C: {}", e);
                }
                tracing::info!("Shutdown signal received");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => log_event(&event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Missed {} session events", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            changed = media.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(task) = reader.take() {
                    task.abort();
                }
                let stream = media.borrow_and_update().clone();
                reader = stream.map(|stream| tokio::spawn(count_packets(stream)));
            }
        }
    }

    if let Some(task) = reader.take() {
        task.abort();
    }
    handle.shutdown().await;

    if handle.state() == ConnectionState::Error {
        tracing::warn!("Session ended in error state");
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

fn log_event(event: &ViewerEvent) {
    match event {
        ViewerEvent::StateChanged { from, to } => {
            tracing::info!("State: {} -> {}", from, to);
        }
        ViewerEvent::RetriesExhausted { attempts } => {
            tracing::error!(
                "Reconnection gave up after {} attempts; press Ctrl-C to exit",
                attempts
            );
        }
        ViewerEvent::AuthFailed { reason } => {
            tracing::error!("Authentication failed: {}; press Ctrl-C to exit", reason);
        }
        other => tracing::debug!(event = other.event_name(), "{:?}", other),
    }
}

/// Drain RTP from the received track and report throughput
async fn count_packets(stream: MediaStream) {
    let Some(track) = stream.track().cloned() else {
        return;
    };

    let mut packets: u64 = 0;
    let mut bytes: u64 = 0;
    let mut report = tokio::time::interval(Duration::from_secs(5));
    report.tick().await;

    loop {
        tokio::select! {
            result = track.read_rtp() => match result {
                Ok((packet, _)) => {
                    packets += 1;
                    bytes += packet.payload.len() as u64;
                }
                Err(e) => {
                    tracing::info!("Track {} ended: {}", stream.track_id, e);
                    break;
                }
            },
            _ = report.tick() => {
                tracing::info!(
                    "Received {} RTP packets ({} KiB) on {}",
                    packets,
                    bytes / 1024,
                    stream.mime_type
                );
            }
        }
    }
}

fn init_logging(level: LogLevel, verbose_count: u8, json: bool) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    // webrtc-rs is chatty below warn
    let filter = match effective_level {
        LogLevel::Error => "stream_viewer=error,webrtc=error",
        LogLevel::Warn => "stream_viewer=warn,webrtc=warn",
        LogLevel::Info => "stream_viewer=info,webrtc=warn",
        LogLevel::Verbose => "stream_viewer=debug,webrtc=warn",
        LogLevel::Debug => "stream_viewer=debug,webrtc=info",
        LogLevel::Trace => "stream_viewer=trace,webrtc=debug",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    if let Err(err) = result {
        eprintln!("failed to initialize tracing: {}", err);
    }
}
