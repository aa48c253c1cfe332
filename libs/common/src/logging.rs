//! Unified logging module for HAPI services
//!
//! Console output plus a daily-rolling log file per service. The file writer
//! is non-blocking; the returned [`LogGuard`] must be held for the lifetime of
//! the process or buffered lines are lost on exit.

use std::path::{Path, PathBuf};

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Environment variable that overrides the configured log directory
pub const LOG_DIR_ENV: &str = "HAPI_LOG_DIR";

/// Custom format for log level with brackets: `[INFO]`, `[WARN]`, etc.
fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

/// Event formatter producing `timestamp [LEVEL] message key=value`
///
/// Example output: `2026-06-02T00:50:44.809120Z [INFO] Scheduler is online. jobs=4`
struct BracketedLevelFormat;

impl<S, N> FormatEvent<S, N> for BracketedLevelFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = chrono::Utc::now();
        write!(writer, "{} ", now.format("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let level = *event.metadata().level();
        if writer.has_ansi_escapes() {
            let color = match level {
                Level::TRACE => "\x1b[35m",
                Level::DEBUG => "\x1b[34m",
                Level::INFO => "\x1b[32m",
                Level::WARN => "\x1b[33m",
                Level::ERROR => "\x1b[31m",
            };
            write!(writer, "{}{}\x1b[0m ", color, format_level(&level))?;
        } else {
            write!(writer, "{} ", format_level(&level))?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Logging configuration for one service process
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Service name, used as the log file prefix
    pub service_name: String,
    /// Directory that receives the rolling log files
    pub log_dir: PathBuf,
    /// Console log level
    pub console_level: Level,
    /// File log level
    pub file_level: Level,
    /// Emit JSON lines to the file instead of the bracketed format
    pub enable_json: bool,
    /// Colored console output
    pub ansi: bool,
}

impl LogConfig {
    pub fn new(service_name: impl Into<String>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            service_name: service_name.into(),
            log_dir: log_dir.into(),
            console_level: Level::INFO,
            file_level: Level::DEBUG,
            enable_json: false,
            ansi: true,
        }
    }
}

/// Keeps the non-blocking file writer alive
#[must_use = "dropping the guard stops the log file writer"]
pub struct LogGuard {
    _file: WorkerGuard,
}

/// Resolve the log root directory
///
/// Priority:
/// 1. `HAPI_LOG_DIR` environment variable
/// 2. `config_dir` (from the service configuration)
/// 3. Default `logs`
pub fn resolve_log_root(config_dir: Option<&str>) -> PathBuf {
    std::env::var(LOG_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            config_dir
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("logs"))
        })
}

/// Parse a textual level, falling back to INFO
pub fn parse_level(level: &str) -> Level {
    match level.to_ascii_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn level_filter(level: Level) -> tracing_subscriber::filter::LevelFilter {
    tracing_subscriber::filter::LevelFilter::from_level(level)
}

/// Initialize the global subscriber with console and file layers
///
/// `RUST_LOG` is respected when set; otherwise the service's own target is
/// logged at the file level and everything else at INFO.
pub fn init_with_config(config: LogConfig) -> Result<LogGuard, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(&config.log_dir)?;

    let file_appender =
        tracing_appender::rolling::daily(&config.log_dir, format!("{}.log", config.service_name));
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = match std::env::var("RUST_LOG") {
        Ok(env_str) => EnvFilter::new(env_str),
        Err(_) => EnvFilter::new(format!(
            "info,{}={}",
            config.service_name.replace('-', "_"),
            config.file_level.as_str().to_ascii_lowercase()
        )),
    };

    let console_layer = fmt::layer()
        .with_ansi(config.ansi)
        .event_format(BracketedLevelFormat)
        .with_filter(level_filter(config.console_level))
        .boxed();

    let file_layer = if config.enable_json {
        fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_level(true)
            .with_target(true)
            .with_filter(level_filter(config.file_level))
            .boxed()
    } else {
        fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .event_format(BracketedLevelFormat)
            .with_filter(level_filter(config.file_level))
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    tracing::info!("Logging: {} @ {:?}", config.service_name, config.log_dir);

    Ok(LogGuard { _file: guard })
}

/// Directory for a named service below the log root
pub fn service_log_dir(root: &Path, service_name: &str) -> PathBuf {
    root.join(service_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), Level::DEBUG);
        assert_eq!(parse_level("warning"), Level::WARN);
        assert_eq!(parse_level("nonsense"), Level::INFO);
    }

    #[test]
    fn test_format_level_brackets() {
        assert_eq!(format_level(&Level::ERROR), "[ERROR]");
        assert_eq!(format_level(&Level::TRACE), "[TRACE]");
    }

    #[test]
    fn test_service_log_dir() {
        let dir = service_log_dir(Path::new("/var/log/hapi"), "hapisrv");
        assert_eq!(dir, PathBuf::from("/var/log/hapi/hapisrv"));
    }
}
