//! File-based logging for the lock server.
//!
//! Besides the console, events go to a root log file and to per-component log
//! files with daily rotation:
//!
//! | Log File            | Component                        | Target Prefixes                              |
//! |---------------------|----------------------------------|----------------------------------------------|
//! | lockd.log           | Root logger (all components)     | (all)                                        |
//! | remote.log          | Listener and connection handling | lockd_api, lockd_core::server, lockd_core::handler |
//! | lock-registry.log   | Slot sets and session ownership  | lockd_core::registry, lockd_core::session    |
//!
//! Log files are stored in `~/lockd/logs` unless `logging.dir` is configured.

use std::path::PathBuf;

use anyhow::Context;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

/// Root log file name
pub const ROOT_LOG_FILE: &str = "lockd.log";

struct ComponentLogDef {
    file_name: &'static str,
    targets: &'static [&'static str],
}

/// Each entry produces a separate rolling log file. Events are routed by
/// their `tracing` target; the root file always captures every event.
const COMPONENT_LOGS: &[ComponentLogDef] = &[
    ComponentLogDef {
        file_name: "remote.log",
        targets: &["lockd_api", "lockd_core::server", "lockd_core::handler"],
    },
    ComponentLogDef {
        file_name: "lock-registry.log",
        targets: &[
            "lockd_core::registry",
            "lockd_core::session",
            "lockd_core::stats",
        ],
    },
];

/// Log rotation policy
#[derive(Debug, Clone, Copy)]
pub enum LogRotation {
    Daily,
    Hourly,
    /// Single file, never rotated
    Never,
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Never => Rotation::NEVER,
        }
    }
}

/// Logging configuration for the server process.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Base log directory (default: `~/lockd/logs`)
    pub log_dir: PathBuf,
    pub console_output: bool,
    pub console_level: Level,
    pub file_logging: bool,
    pub file_level: Level,
    pub rotation: LogRotation,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            console_output: true,
            console_level: Level::INFO,
            file_logging: true,
            file_level: Level::INFO,
            rotation: LogRotation::Daily,
        }
    }
}

impl LoggingConfig {
    /// Create from the `logging` section of the configuration file.
    ///
    /// An unparseable level falls back to `INFO`.
    pub fn from_config(
        log_dir: Option<String>,
        console_output: bool,
        file_logging: bool,
        level: String,
    ) -> Self {
        let level = level.parse().unwrap_or(Level::INFO);

        Self {
            log_dir: log_dir.map(PathBuf::from).unwrap_or_else(default_log_dir),
            console_output,
            console_level: level,
            file_logging,
            file_level: level,
            rotation: LogRotation::Daily,
        }
    }
}

fn default_log_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(format!("{}/lockd/logs", home))
}

/// Keeps the non-blocking file writers alive.
///
/// Dropping it flushes buffered output, so hold it until the process exits.
pub struct LoggingGuard {
    _file_guards: Vec<WorkerGuard>,
}

/// Install the global subscriber.
///
/// `RUST_LOG`, when set, overrides the configured level for the console and
/// the root file. Component files use [`Targets`] filters and capture every
/// level from their targets.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<LoggingGuard> {
    if config.file_logging {
        std::fs::create_dir_all(&config.log_dir).with_context(|| {
            format!("failed to create log directory {}", config.log_dir.display())
        })?;
    }

    let mut guards: Vec<WorkerGuard> = Vec::new();
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if config.console_output {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.console_level.to_string()));
        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_filter(filter);
        layers.push(Box::new(console_layer));
    }

    if config.file_logging {
        let root_appender =
            RollingFileAppender::new(config.rotation.into(), &config.log_dir, ROOT_LOG_FILE);
        let (root_nb, root_guard) = tracing_appender::non_blocking(root_appender);
        guards.push(root_guard);

        let root_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.file_level.to_string()));
        let root_layer = fmt::layer()
            .with_writer(root_nb)
            .with_target(true)
            .with_thread_names(true)
            .with_ansi(false)
            .with_filter(root_filter);
        layers.push(Box::new(root_layer));

        for component in COMPONENT_LOGS {
            let appender = RollingFileAppender::new(
                config.rotation.into(),
                &config.log_dir,
                component.file_name,
            );
            let (nb, guard) = tracing_appender::non_blocking(appender);
            guards.push(guard);

            let layer = fmt::layer()
                .with_writer(nb)
                .with_target(true)
                .with_thread_names(true)
                .with_ansi(false)
                .with_filter(component_targets(component));
            layers.push(Box::new(layer));
        }
    }

    Registry::default()
        .with(layers)
        .try_init()
        .context("failed to initialize logging")?;

    if config.file_logging {
        tracing::info!(
            log_dir = %config.log_dir.display(),
            "File logging initialized: {} (root) + {} component log files",
            ROOT_LOG_FILE,
            COMPONENT_LOGS.len()
        );
    }

    Ok(LoggingGuard {
        _file_guards: guards,
    })
}

fn component_targets(component: &ComponentLogDef) -> Targets {
    component
        .targets
        .iter()
        .fold(Targets::new(), |targets, target| {
            targets.with_target(*target, LevelFilter::TRACE)
        })
}
