//! Logging bootstrap shared by gasmon services
//!
//! Console output plus a daily-rolling file, both in the bracketed
//! `timestamp [LEVEL] message` layout. Files older than a week are gzipped
//! by a background task.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use flate2::write::GzEncoder;
use flate2::Compression;
use tokio::time::{interval, Duration};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{
        self,
        format::{FmtSpan, Writer},
        FmtContext, FormatEvent, FormatFields,
    },
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Uncompressed logs older than this are gzipped
const COMPRESS_AFTER: Duration = Duration::from_secs(7 * 86400);
/// Compressed logs older than this are deleted
const DELETE_AFTER: Duration = Duration::from_secs(365 * 86400);

fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

/// `2025-12-02T00:50:44.809123Z [INFO] message`
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

// Keeps the non-blocking file writer alive for the life of the process
static GUARDS: OnceLock<Mutex<Vec<WorkerGuard>>> = OnceLock::new();

/// Logger configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Service name; also the log file prefix
    pub service_name: String,
    pub log_dir: PathBuf,
    /// Filter used when `RUST_LOG` is unset, e.g. `info` or `debug`
    pub level: String,
    /// Write the file layer as JSON lines
    pub enable_json: bool,
    /// Console only when false
    pub enable_file: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".to_string(),
            log_dir: PathBuf::from("logs"),
            level: "info".to_string(),
            enable_json: false,
            enable_file: true,
        }
    }
}

impl LogConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// `RUST_LOG` wins; otherwise `<level>,<service>=debug`
    fn filter(&self) -> EnvFilter {
        match std::env::var("RUST_LOG") {
            Ok(env) if !env.is_empty() => EnvFilter::new(env),
            _ => EnvFilter::new(format!("{},{}=debug", self.level, self.service_name)),
        }
    }

    /// Daily files are named `<service>.log.YYYY-MM-DD`
    fn file_prefix(&self) -> String {
        format!("{}.log", self.service_name)
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_with_config(config: LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    let console_layer = fmt::layer()
        .with_ansi(true)
        .event_format(BracketedLevelFormat)
        .boxed();

    let file_layer = if config.enable_file {
        fs::create_dir_all(&config.log_dir)?;
        let appender = tracing_appender::rolling::daily(&config.log_dir, config.file_prefix());
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        let guards = GUARDS.get_or_init(|| Mutex::new(Vec::new()));
        match guards.lock() {
            Ok(mut guards) => guards.push(guard),
            Err(poisoned) => poisoned.into_inner().push(guard),
        }

        let layer = if config.enable_json {
            fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_level(true)
                .with_target(true)
                .with_span_events(FmtSpan::CLOSE)
                .boxed()
        } else {
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .event_format(BracketedLevelFormat)
                .boxed()
        };
        Some(layer)
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(config.filter())
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    tracing::info!("Logging: {} @ {:?}", config.service_name, config.log_dir);

    if config.enable_file {
        let prefix = config.file_prefix();
        start_log_compression_task(config.log_dir, prefix);
    }
    Ok(())
}

/// Console-only logging for one-shot commands
pub fn init_console(level: &str) -> Result<(), Box<dyn std::error::Error>> {
    init_with_config(LogConfig {
        level: level.to_string(),
        enable_file: false,
        ..Default::default()
    })
}

// ==================== Log Compression Support ====================

/// Compress old logs once a day. Needs a running tokio runtime.
pub fn start_log_compression_task(log_dir: PathBuf, prefix: String) {
    if tokio::runtime::Handle::try_current().is_err() {
        tracing::debug!("No runtime, log compression disabled");
        return;
    }
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(60)).await;
        let mut ticker = interval(Duration::from_secs(86400));
        loop {
            ticker.tick().await;
            if let Err(e) = compress_old_logs(&log_dir, &prefix).await {
                tracing::error!("Log compression error for {}: {}", prefix, e);
            }
        }
    });
}

async fn compress_old_logs(log_dir: &Path, prefix: &str) -> Result<(), Box<dyn std::error::Error>> {
    use std::time::SystemTime;

    let mut entries = tokio::fs::read_dir(log_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let file_name = match path.file_name() {
            Some(name) => name.to_string_lossy().to_string(),
            None => continue,
        };
        if !file_name.starts_with(prefix) {
            continue;
        }

        let modified = tokio::fs::metadata(&path).await?.modified()?;
        let age = SystemTime::now().duration_since(modified)?;

        if !file_name.ends_with(".gz") {
            if age > COMPRESS_AFTER {
                compress_file(&path).await?;
                tokio::fs::remove_file(&path).await?;
                tracing::debug!("Compressed: {}", file_name);
            }
        } else if age > DELETE_AFTER {
            tokio::fs::remove_file(&path).await?;
            tracing::debug!("Deleted: {}", file_name);
        }
    }
    Ok(())
}

/// Write `<path>.gz` next to `path`
async fn compress_file(path: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
    use std::io::Write;

    let buffer = tokio::fs::read(path).await?;
    let output_path = PathBuf::from(format!("{}.gz", path.display()));
    let output = fs::File::create(&output_path)?;
    let mut encoder = GzEncoder::new(output, Compression::best());
    encoder.write_all(&buffer)?;
    encoder.finish()?;
    Ok(output_path)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[test]
    fn test_format_level() {
        assert_eq!(format_level(&Level::INFO), "[INFO]");
        assert_eq!(format_level(&Level::ERROR), "[ERROR]");
    }

    #[test]
    fn test_config_defaults() {
        let config = LogConfig::new("acqsrv");
        assert_eq!(config.file_prefix(), "acqsrv.log");
        assert_eq!(config.level, "info");
        assert!(config.enable_file);
    }

    #[tokio::test]
    async fn test_compress_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("acqsrv.log.2024-03-01");
        fs::write(&path, b"2024-03-01T00:00:00Z [INFO] hello\n").unwrap();

        let gz = compress_file(&path).await.unwrap();
        let mut decoded = String::new();
        GzDecoder::new(fs::File::open(gz).unwrap())
            .read_to_string(&mut decoded)
            .unwrap();
        assert!(decoded.contains("[INFO] hello"));
    }

    #[tokio::test]
    async fn test_recent_logs_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("acqsrv.log.2024-03-01");
        fs::write(&path, b"fresh").unwrap();

        compress_old_logs(dir.path(), "acqsrv.log").await.unwrap();
        assert!(path.exists());
        assert!(!dir.path().join("acqsrv.log.2024-03-01.gz").exists());
    }

    #[tokio::test]
    async fn test_file_logging_install() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("logs");
        let config = LogConfig {
            log_dir: log_dir.clone(),
            ..LogConfig::new("acqsrv")
        };

        init_with_config(config.clone()).unwrap();
        assert!(log_dir.is_dir());

        // Only one global subscriber per process
        assert!(init_with_config(config).is_err());
    }
}
