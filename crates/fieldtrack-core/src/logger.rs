//! Process-wide logging setup.
//!
//! Both back ends take the level from `FIELDTRACK_LOG` when it is set and
//! fall back to the caller's default. Without the `tracing` feature records
//! go to a small stderr logger; with it, to a `tracing-subscriber` formatter.
//! Either way nothing is written to stdout, which carries telemetry.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable consulted by [`level_from_env`] and `init_tracing`.
pub const LOG_ENV: &str = "FIELDTRACK_LOG";

/// Level named by `FIELDTRACK_LOG` (`off`, `error`, ... `trace`), else `default`.
pub fn level_from_env(default: LevelFilter) -> LevelFilter {
    parse_level(std::env::var(LOG_ENV).ok().as_deref(), default)
}

fn parse_level(raw: Option<&str>, default: LevelFilter) -> LevelFilter {
    raw.and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

/// Writes `[elapsed LEVEL] target: message` lines to stderr.
struct StderrLogger {
    max: LevelFilter,
    epoch: Instant,
}

impl StderrLogger {
    fn line(&self, record: &Record) -> String {
        format!(
            "[{:7.3}s {:>5}] {}: {}",
            self.epoch.elapsed().as_secs_f64(),
            record.level(),
            record.target(),
            record.args()
        )
    }
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let _ = writeln!(std::io::stderr().lock(), "{}", self.line(record));
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static STDERR_LOGGER: OnceLock<StderrLogger> = OnceLock::new();

/// Install the stderr logger at `level`. Later calls keep the first level.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if STDERR_LOGGER.get().is_some() {
        return Ok(());
    }
    let logger = STDERR_LOGGER.get_or_init(|| StderrLogger {
        max: level,
        epoch: Instant::now(),
    });
    log::set_logger(logger)?;
    log::set_max_level(logger.max);
    Ok(())
}

/// Output layout of the `tracing` subscriber.
#[cfg(feature = "tracing")]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines with process uptime.
    #[default]
    Text,
    /// One flattened JSON object per event.
    Json,
}

/// `EnvFilter` directive: `FIELDTRACK_LOG`, then `RUST_LOG`, then `default`.
#[cfg(feature = "tracing")]
fn filter_directive(own: Option<&str>, rust_log: Option<&str>, default: LevelFilter) -> String {
    [own, rust_log]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|d| !d.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| default.as_str().to_ascii_lowercase())
}

/// Install a `tracing` subscriber on stderr; span closings are logged with
/// their busy/idle times.
#[cfg(feature = "tracing")]
pub fn init_tracing(default: LevelFilter, format: LogFormat) -> Result<(), TryInitError> {
    let directive = filter_directive(
        std::env::var(LOG_ENV).ok().as_deref(),
        std::env::var("RUST_LOG").ok().as_deref(),
        default,
    );
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|err| {
        eprintln!("ignoring log filter {directive:?}: {err}");
        EnvFilter::new(default.as_str().to_ascii_lowercase())
    });
    let builder = fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().flatten_event(true).finish().try_init(),
        LogFormat::Text => builder
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_level_accepts_names_and_falls_back() {
        assert_eq!(parse_level(Some("debug"), LevelFilter::Info), LevelFilter::Debug);
        assert_eq!(parse_level(Some(" WARN "), LevelFilter::Info), LevelFilter::Warn);
        assert_eq!(parse_level(Some("loud"), LevelFilter::Info), LevelFilter::Info);
        assert_eq!(parse_level(None, LevelFilter::Error), LevelFilter::Error);
    }

    #[test]
    fn stderr_logger_filters_and_formats() {
        let logger = StderrLogger {
            max: LevelFilter::Warn,
            epoch: Instant::now(),
        };
        let warn = Metadata::builder().level(log::Level::Warn).build();
        let debug = Metadata::builder().level(log::Level::Debug).build();
        assert!(logger.enabled(&warn));
        assert!(!logger.enabled(&debug));

        let line = logger.line(
            &Record::builder()
                .args(format_args!("queue full"))
                .level(log::Level::Warn)
                .target("fieldtrack")
                .build(),
        );
        assert!(line.starts_with('['));
        assert!(line.ends_with(" WARN] fieldtrack: queue full"), "{line}");
    }

    #[cfg(feature = "tracing")]
    #[test]
    fn filter_directive_prefers_own_variable_then_rust_log() {
        let d = LevelFilter::Warn;
        assert_eq!(filter_directive(Some("debug"), Some("trace"), d), "debug");
        assert_eq!(
            filter_directive(Some("  "), Some("fieldtrack=trace"), d),
            "fieldtrack=trace"
        );
        assert_eq!(filter_directive(None, None, d), "warn");
        assert_eq!(filter_directive(None, None, LevelFilter::Debug), "debug");
    }
}
