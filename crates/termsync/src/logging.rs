//! Logging configuration and initialization.
//!
//! Structured logging with preset levels, per-target overrides via CLI
//! flags, optional JSON output, and RUST_LOG fallback.

use std::collections::HashMap;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Invalid log format: '{}'. Use 'text' or 'json'.", s)),
        }
    }
}

/// Logging preset levels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogPreset {
    /// Production: lifecycle events only.
    #[default]
    Production,
    /// Verbose: more operational detail.
    Verbose,
    /// Debug: per-event detail for troubleshooting.
    Debug,
    /// Trace: everything including high-frequency output chunks.
    Trace,
    /// Quiet: warnings and errors only.
    Quiet,
}

/// Logging configuration built from CLI arguments.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    pub preset: LogPreset,
    /// Per-target level overrides (e.g., "supervisor" -> DEBUG).
    pub overrides: HashMap<String, Level>,
    pub format: LogFormat,
}

impl LogConfig {
    /// Create a new LogConfig from CLI arguments.
    pub fn from_cli(
        verbose: bool,
        debug: bool,
        trace: bool,
        quiet: bool,
        log_overrides: Vec<String>,
        format: LogFormat,
    ) -> Self {
        // Last one wins if multiple flags are given.
        let preset = if quiet {
            LogPreset::Quiet
        } else if trace {
            LogPreset::Trace
        } else if debug {
            LogPreset::Debug
        } else if verbose {
            LogPreset::Verbose
        } else {
            LogPreset::Production
        };

        // Overrides come as "target=level", comma-separable; bare targets
        // are namespaced under "termsync::".
        let mut overrides = HashMap::new();
        for override_str in log_overrides {
            for part in override_str.split(',') {
                if let Some((target, level_str)) = part.split_once('=') {
                    let target = target.trim();
                    let level_str = level_str.trim();

                    let full_target = if target.starts_with("termsync::") {
                        target.to_string()
                    } else {
                        format!("termsync::{}", target)
                    };

                    if let Ok(level) = level_str.parse::<Level>() {
                        overrides.insert(full_target, level);
                    }
                }
            }
        }

        Self {
            preset,
            overrides,
            format,
        }
    }

    /// Build an EnvFilter from this configuration.
    pub fn build_filter(&self) -> EnvFilter {
        // RUST_LOG takes precedence when set.
        if let Ok(env_filter) = EnvFilter::try_from_default_env() {
            return env_filter;
        }

        let mut directives: Vec<String> = match self.preset {
            LogPreset::Production => vec![
                "termsync::startup=info".into(),
                "termsync::supervisor=info".into(),
                "termsync::pty=info".into(),
                "termsync::reporter=warn".into(),
                "termsync::channel=warn".into(),
            ],
            LogPreset::Verbose => vec!["termsync=info".into()],
            LogPreset::Debug => vec!["termsync=debug".into()],
            LogPreset::Trace => vec!["termsync=trace".into()],
            LogPreset::Quiet => vec!["termsync=warn".into()],
        };

        // Overrides take precedence over the preset. EnvFilter accepts the
        // uppercase level names Level displays as.
        for (target, level) in &self.overrides {
            directives.push(format!("{}={}", target, level));
        }

        let filter_str = directives.join(",");
        EnvFilter::try_new(&filter_str).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Initialize the tracing subscriber with the given configuration.
///
/// The child's terminal output goes to stdout; logs stay on stderr so the
/// console mirror remains clean.
pub fn init(config: &LogConfig) {
    let filter = config.build_filter();

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .with_thread_ids(false)
                        .with_file(false)
                        .with_line_number(false),
                )
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .with_span_events(FmtSpan::CLOSE),
                )
                .init();
        }
    }
}
