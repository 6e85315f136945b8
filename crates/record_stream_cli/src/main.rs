mod output;

use std::{path::PathBuf, process::ExitCode};

use clap::{Args, Parser, Subcommand, ValueEnum};
use record_stream::{
    ConfigError, FrameMode, HttpRecordStream, SocketStreamClient, StreamConfig, StreamError,
    TrailingFragment, TransportError,
};
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use output::PrintObserver;

#[derive(Debug, Parser)]
#[command(name = "record-stream", version)]
#[command(about = "Stream NDJSON records over chunked HTTP or WebSocket")]
struct Cli {
    /// TOML settings file; flags override its values.
    #[arg(long, global = true, env = "RECORD_STREAM_CONFIG")]
    config: Option<PathBuf>,

    /// Drop lines longer than this many bytes.
    #[arg(long, global = true)]
    max_line_bytes: Option<usize>,

    /// Fail (HTTP) or disconnect (socket) after this long without data.
    #[arg(long, global = true)]
    idle_timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Read a chunked HTTP response body until it ends.
    Http(HttpArgs),
    /// Connect to a WebSocket endpoint and stream until disconnected or interrupted.
    Socket(SocketArgs),
}

#[derive(Debug, Args)]
struct HttpArgs {
    /// Endpoint URL; defaults to the configured `http_url`.
    url: Option<String>,

    /// Keep an unterminated last line if it decodes into a complete record.
    #[arg(long)]
    decode_trailing: bool,
}

#[derive(Debug, Args)]
struct SocketArgs {
    /// Endpoint URL; defaults to the configured `socket_url`.
    url: Option<String>,

    /// Do not send the initial request payload after connecting.
    #[arg(long)]
    no_trigger: bool,

    #[arg(long, value_enum)]
    framing: Option<Framing>,

    /// Echo the connection log to stderr.
    #[arg(long)]
    console: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Framing {
    /// Each frame carries whole lines.
    Complete,
    /// Lines may continue across frames.
    Continuous,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error("stream ended with errors")]
    Failed,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "record-stream failed");
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = match &cli.config {
        Some(path) => StreamConfig::load(path)?,
        None => StreamConfig::default(),
    };
    if let Some(max) = cli.max_line_bytes {
        config.ingest = config.ingest.max_line_bytes(max);
    }
    if let Some(ms) = cli.idle_timeout_ms {
        config.idle_timeout_ms = Some(ms);
    }

    match cli.command {
        Command::Http(args) => {
            if let Some(url) = args.url {
                config.http_url = url;
            }
            if args.decode_trailing {
                config.ingest = config
                    .ingest
                    .trailing_fragment(TrailingFragment::DecodeIfComplete);
            }
            run_http(&config).await
        }
        Command::Socket(args) => {
            if let Some(url) = args.url {
                config.socket_url = url;
            }
            if args.no_trigger {
                config.send_trigger = false;
            }
            if let Some(framing) = args.framing {
                config.framing = match framing {
                    Framing::Complete => FrameMode::FrameIsComplete,
                    Framing::Continuous => FrameMode::Continuous,
                };
            }
            run_socket(&config, args.console).await
        }
    }
}

async fn run_http(config: &StreamConfig) -> Result<(), CliError> {
    let handle = HttpRecordStream::from_config(config)?.start(PrintObserver::new(false));
    let cancel = handle.cancel_flag();
    let join = handle.join();
    tokio::pin!(join);

    let summary = tokio::select! {
        result = &mut join => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted; stopping after the current read");
            cancel.cancel();
            join.await?
        }
    };
    info!(
        records = summary.records,
        line_errors = summary.line_errors,
        cancelled = summary.cancelled,
        "http stream finished"
    );
    Ok(())
}

async fn run_socket(config: &StreamConfig, console: bool) -> Result<(), CliError> {
    let observer = PrintObserver::new(console);
    let client = SocketStreamClient::websocket(config, observer.clone());
    client.connect()?;

    tokio::select! {
        _ = observer.disconnected() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted; disconnecting");
            client.disconnect()?;
            observer.disconnected().await;
        }
    }

    let summary = client.shutdown().await?;
    info!(
        records = summary.records,
        line_errors = summary.line_errors,
        "socket stream finished"
    );
    if observer.failed() {
        return Err(CliError::Failed);
    }
    Ok(())
}
