//! termsync - run a shell command behind a pseudo-terminal, mirror its
//! output, and inject externally-sourced input events.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use termsync::{channel, config, logging, sink};
use termsync_core::{
    ControlQueue, InputStyle, SequencedEventQueue, SessionOutcome, SessionSink, Supervisor,
    SupervisorConfig,
};
use tracing::{info, warn};

use channel::{FileChannel, SessionLayout};
use config::Config;
use logging::{LogConfig, LogFormat};
use sink::FileSink;

/// Exit code for an interrupt-driven shutdown (128 + SIGINT).
const INTERRUPT_EXIT_CODE: i32 = 130;

/// Supervise a command behind a PTY with externally-sourced input.
#[derive(Parser, Debug)]
#[command(name = "termsync")]
#[command(about = "Run a command behind a PTY and sync stdin from a spool channel")]
#[command(version)]
struct Cli {
    /// Shell command to execute
    #[arg(short, long)]
    command: String,

    /// Session name (spool namespace, also exported to the child)
    #[arg(short, long)]
    name: String,

    /// Do not clear previously published state before starting
    #[arg(long)]
    no_clear: bool,

    /// Mirror output lines to the external sink
    #[arg(long)]
    mirror_lines: bool,

    /// Override the spool channel root directory
    #[arg(long, value_name = "DIR")]
    channel_root: Option<PathBuf>,

    /// Path to config file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose logging (INFO level for all targets)
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace logging (everything, including output chunks)
    #[arg(long)]
    trace: bool,

    /// Quiet mode (WARN and ERROR only)
    #[arg(short, long)]
    quiet: bool,

    /// Set log level for specific targets (e.g., "supervisor=debug").
    /// Can be specified multiple times; bare targets get the "termsync::"
    /// prefix automatically.
    #[arg(long = "log", value_name = "TARGET=LEVEL")]
    log_overrides: Vec<String>,

    /// Log output format
    #[arg(long = "log-format", value_name = "FORMAT", default_value = "text")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("termsync: {:#}", e);
            std::process::exit(1);
        }
    }
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();

    let log_config = LogConfig::from_cli(
        cli.verbose,
        cli.debug,
        cli.trace,
        cli.quiet,
        cli.log_overrides,
        cli.log_format,
    );
    logging::init(&log_config);

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("loading config from {:?}", path))?,
        None => Config::load().context("loading config")?,
    };
    if let Some(root) = cli.channel_root {
        config.channel_root = root;
    }
    if cli.mirror_lines {
        config.mirror_lines = true;
    }
    let input_style: InputStyle = config
        .input_style
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    let layout = SessionLayout::new(&config.channel_root, &cli.name);
    info!(
        target: "termsync::startup",
        "Session '{}' using spool directory {:?}", cli.name, layout.dir()
    );

    let sink = Arc::new(FileSink::new(layout.clone()));
    if !cli.no_clear {
        info!(target: "termsync::startup", "Clearing previous session state");
        sink.clear_all().context("clearing previous session state")?;
    }

    let inputs = Arc::new(SequencedEventQueue::new());
    let controls = Arc::new(ControlQueue::new());
    let _channel = FileChannel::subscribe(&layout, inputs.clone(), controls.clone())?;

    let shutdown = Arc::new(AtomicBool::new(false));
    spawn_signal_listener(shutdown.clone());

    let mut supervisor_config = SupervisorConfig::new(&cli.command, &cli.name);
    supervisor_config.mirror_lines = config.mirror_lines;
    supervisor_config.input_style = input_style;
    supervisor_config.poll_interval = Duration::from_millis(config.poll_interval_ms);
    supervisor_config.settle_delay = Duration::from_millis(config.settle_delay_ms);
    supervisor_config.keystroke_delay = Duration::from_millis(config.keystroke_delay_ms);
    supervisor_config.grace = Duration::from_secs(config.grace_seconds);

    let supervisor = Supervisor::new(
        supervisor_config,
        inputs,
        controls,
        sink,
        Box::new(std::io::stdout()),
        shutdown,
    );

    // The supervisor loop owns the PTY and blocks on it; run it off the
    // async runtime.
    let outcome = tokio::task::spawn_blocking(move || supervisor.run())
        .await
        .context("supervisor task panicked")??;

    Ok(match outcome {
        SessionOutcome::Exited(code) => code,
        SessionOutcome::Interrupted => INTERRUPT_EXIT_CODE,
    })
}

/// Translate SIGINT/SIGTERM into the supervisor's shutdown flag. The
/// supervisor observes it at the next tick and performs the controlled
/// teardown itself, so no session state is shared with the signal context.
fn spawn_signal_listener(shutdown: Arc<AtomicBool>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    warn!(target: "termsync::startup", "Could not install SIGTERM handler: {}", e);
                    return;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        info!(target: "termsync::startup", "Caught interrupt, cleaning up");
        shutdown.store(true, Ordering::SeqCst);
    });
}
