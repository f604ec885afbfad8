//! Tracing subscriber setup.
//!
//! Development builds print pretty, span-annotated logs to stdout. In
//! production the service writes JSON to a daily rolling file and mirrors a
//! compact, colourless stream to stdout for the journal.

use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use velolock_core::LoggingConfig;

/// Environment variable read when `RUST_LOG` is unset.
pub const LOG_LEVEL_ENV: &str = "VELOLOCK_LOG_LEVEL";

const LOG_FILE_PREFIX: &str = "velolock";

// Dropping a guard stops its writer thread, so both live for the process.
static GUARDS: OnceLock<[WorkerGuard; 2]> = OnceLock::new();

/// Where log output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    /// Pretty stdout only.
    Development,
    /// JSON rolling file plus compact stdout.
    Production,
}

impl Output {
    /// Picks the output for a logging section.
    #[must_use]
    pub const fn from_config(config: &LoggingConfig) -> Self {
        if config.production {
            Self::Production
        } else {
            Self::Development
        }
    }
}

/// Resolves the filter directive: `VELOLOCK_LOG_LEVEL`, then the configured
/// level. `RUST_LOG` still wins when set, see [`init`].
fn level_directive(config: &LoggingConfig, env_level: Option<String>) -> String {
    env_level
        .filter(|level| !level.trim().is_empty())
        .unwrap_or_else(|| config.level.clone())
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns an error if the level directive cannot be parsed or a subscriber
/// is already installed.
pub fn init(config: &LoggingConfig) -> anyhow::Result<()> {
    let directive = level_directive(config, std::env::var(LOG_LEVEL_ENV).ok());
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&directive))?;

    match Output::from_config(config) {
        Output::Development => {
            let stdout = tracing_subscriber::fmt::layer()
                .pretty()
                .with_file(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

            tracing_subscriber::registry()
                .with(filter)
                .with(stdout)
                .try_init()?;
        }
        Output::Production => {
            let dir = log_directory();
            std::fs::create_dir_all(&dir)?;

            let appender = RollingFileAppender::new(Rotation::DAILY, &dir, LOG_FILE_PREFIX);
            let (file_writer, file_guard) = tracing_appender::non_blocking(appender);
            let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

            let file = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(file_writer)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true);
            let stdout = tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(stdout_writer)
                .with_ansi(false);

            tracing_subscriber::registry()
                .with(filter)
                .with(file)
                .with(stdout)
                .try_init()?;

            let _ = GUARDS.set([file_guard, stdout_guard]);
        }
    }

    Ok(())
}

fn log_directory() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/var/log/velolock")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "velolock")
            .map(|dirs| dirs.data_dir().join("logs"))
            .unwrap_or_else(|| PathBuf::from("./logs"))
    }
}
