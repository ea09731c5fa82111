//! Log output: stderr plus a daily rolling file, and os_log on macOS

use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

const LOG_FILE_PREFIX: &str = "spotlight-slideshow.log";
const LOG_DIR_ENV: &str = "SPOTLIGHT_LOG_PATH";
const LOG_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Directory the rolling log files go to
pub fn get_log_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(LOG_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }

    let dirs = ProjectDirs::from("dev", "spotlight-slideshow", "viewer")
        .context("Failed to determine project directories for log path")?;
    // state_dir only exists on Linux
    let base = dirs.state_dir().unwrap_or_else(|| dirs.data_local_dir());
    Ok(base.join("logs"))
}

/// Log to stderr and to the rolling file. The returned guard flushes the
/// file writer when dropped, so hold it until exit.
pub fn init_logging() -> Result<WorkerGuard> {
    let log_dir = get_log_dir()?;
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {:?}", log_dir))?;
    prune_old_logs(&log_dir, LOG_RETENTION);

    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX));

    let mut layers = vec![
        stderr_layer(),
        fmt::layer().with_writer(file_writer).with_ansi(false).boxed(),
    ];
    layers.extend(platform_layer());
    install(layers)?;

    tracing::debug!("Writing logs to {:?}", log_dir);
    Ok(guard)
}

/// Stderr only, for when the log directory can't be used
pub fn init_stderr_logging() {
    let _ = install(vec![stderr_layer()]);
}

fn install(layers: Vec<BoxedLayer>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("Failed to install tracing subscriber")
}

fn stderr_layer() -> BoxedLayer {
    fmt::layer().with_writer(std::io::stderr).boxed()
}

/// Console.app picks these up under the subsystem below
#[cfg(target_os = "macos")]
fn platform_layer() -> Option<BoxedLayer> {
    Some(tracing_oslog::OsLogger::new("dev.spotlight-slideshow.viewer", "default").boxed())
}

#[cfg(not(target_os = "macos"))]
fn platform_layer() -> Option<BoxedLayer> {
    None
}

/// Delete our own log files last modified more than `max_age` ago
fn prune_old_logs(log_dir: &Path, max_age: Duration) {
    let Some(cutoff) = SystemTime::now().checked_sub(max_age) else {
        return;
    };
    let Ok(entries) = fs::read_dir(log_dir) else {
        return;
    };

    let expired = entries
        .flatten()
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(LOG_FILE_PREFIX))
        .filter(|entry| {
            entry
                .metadata()
                .ok()
                .filter(|meta| meta.is_file())
                .and_then(|meta| meta.modified().ok())
                .is_some_and(|modified| modified < cutoff)
        });

    for entry in expired {
        if let Err(e) = fs::remove_file(entry.path()) {
            tracing::debug!("Could not remove old log {:?}: {}", entry.path(), e);
        }
    }
}
