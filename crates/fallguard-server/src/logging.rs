//! Tracing subscriber setup for the server.
//!
//! With `logging.production` set, events go to daily JSON files and to a
//! compact stdout stream that journald picks up. Otherwise they go to stdout
//! only, pretty printed with span open/close events.

use std::path::PathBuf;
use std::sync::OnceLock;

use fallguard_core::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directives that take precedence over everything else.
pub const LOG_LEVEL_ENV: &str = "FALLGUARD_LOG_LEVEL";

/// Standard `tracing` filter variable, consulted when [`LOG_LEVEL_ENV`] is unset.
const RUST_LOG_ENV: &str = "RUST_LOG";

const LOG_FILE_PREFIX: &str = "fallguard";

// Dropping a guard stops its writer thread, so both live for the whole process.
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();
static STDOUT_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the global subscriber described by `config`.
///
/// Directives come from `FALLGUARD_LOG_LEVEL`, then `RUST_LOG`, then
/// `logging.level`.
///
/// # Errors
///
/// Fails if the directives do not parse or the log directory cannot be created.
pub fn init(config: &LoggingConfig) -> anyhow::Result<()> {
    let directives = filter_directives(
        &config.level,
        std::env::var(LOG_LEVEL_ENV).ok(),
        std::env::var(RUST_LOG_ENV).ok(),
    );
    let filter = EnvFilter::try_new(&directives)?;

    if config.production {
        let log_dir = config.log_dir.clone().unwrap_or_else(log_directory);
        init_files(filter, log_dir)?;
    } else {
        init_terminal(filter);
    }

    tracing::debug!(%directives, production = config.production, "Logging initialized");
    Ok(())
}

/// First non-blank of the server override, `RUST_LOG` and the configured level.
fn filter_directives(
    configured: &str,
    override_level: Option<String>,
    rust_log: Option<String>,
) -> String {
    [override_level, rust_log]
        .into_iter()
        .flatten()
        .find(|value| !value.trim().is_empty())
        .unwrap_or_else(|| configured.to_string())
}

fn init_files(filter: EnvFilter, log_dir: PathBuf) -> anyhow::Result<()> {
    std::fs::create_dir_all(&log_dir)?;

    let appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_PREFIX);
    let (file_writer, file_guard) = tracing_appender::non_blocking(appender);
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    let files = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(file_writer)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let journal = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(stdout_writer)
        .with_target(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(files)
        .with(journal)
        .init();

    let _ = FILE_GUARD.set(file_guard);
    let _ = STDOUT_GUARD.set(stdout_guard);
    Ok(())
}

fn init_terminal(filter: EnvFilter) {
    let terminal = tracing_subscriber::fmt::layer()
        .pretty()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

    tracing_subscriber::registry()
        .with(filter)
        .with(terminal)
        .init();
}

/// `/var/log/fallguard` on Linux, the platform data directory elsewhere.
fn log_directory() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/var/log/fallguard")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "fallguard")
            .map(|dirs| dirs.data_dir().join("logs"))
            .unwrap_or_else(|| PathBuf::from("./logs"))
    }
}
