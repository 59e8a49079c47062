//! Structured logging for polybuild
//!
//! All diagnostics go to stderr through `tracing`; program output (reports,
//! artifact stdout) goes to stdout and never through this module.
//!
//! # Log Format Conventions
//!
//! - `operation`: The operation being performed (e.g., "cache.lookup", "compile")
//! - `status`: The result status ("hit", "miss", "built", "failed")
//! - `fingerprint`: Short hex prefix of the group fingerprint
//! - `language`: Language of the group
//!
//! # Examples
//!
//! ```rust,ignore
//! use polybuild::logging::{operations, status};
//!
//! tracing::info!(
//!     operation = operations::COMPILE,
//!     status = status::BUILT,
//!     language = %group.language(),
//!     fingerprint = %fp.short(),
//!     "[polybuild] Built cpp"
//! );
//! ```

use std::{fmt as std_fmt, io};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{
    fmt::{self, format::Writer},
    prelude::*,
    EnvFilter,
};

/// Formatter that tags every line with "(polybuild)" instead of the module path
struct PolybuildFormatter {
    with_ansi: bool,
}

impl<S, N> FormatEvent<S, N> for PolybuildFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std_fmt::Result {
        let meta = event.metadata();

        write!(
            writer,
            "{} ",
            chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ")
        )?;

        if self.with_ansi {
            let level_style = match *meta.level() {
                tracing::Level::ERROR => "\x1b[31m", // Red
                tracing::Level::WARN => "\x1b[33m",  // Yellow
                tracing::Level::INFO => "\x1b[32m",  // Green
                tracing::Level::DEBUG => "\x1b[34m", // Blue
                tracing::Level::TRACE => "\x1b[35m", // Magenta
            };
            write!(
                writer,
                "{}{:5}(polybuild)\x1b[0m: ",
                level_style,
                meta.level()
            )?;
        } else {
            write!(writer, "{:5}(polybuild): ", meta.level())?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format (default for development)
    Pretty,
    /// Compact format (for CI)
    Compact,
    /// JSON format (for log aggregation systems)
    Json,
}

impl LogFormat {
    /// Parse from environment variable (POLYBUILD_LOG_FORMAT)
    pub fn from_env() -> Self {
        Self::parse(
            &std::env::var("POLYBUILD_LOG_FORMAT").unwrap_or_default(),
            std::env::var("CI").is_ok(),
        )
    }

    fn parse(value: &str, ci: bool) -> Self {
        match value.to_lowercase().as_str() {
            "json" => Self::Json,
            "compact" => Self::Compact,
            "pretty" => Self::Pretty,
            _ => {
                if ci {
                    Self::Compact
                } else {
                    Self::Pretty
                }
            }
        }
    }
}

/// Initialize the global tracing subscriber
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "debug", "info", "warn")
/// - `POLYBUILD_LOG_FORMAT`: Set format ("pretty", "compact", "json")
/// - `CI`: If set, defaults to compact format
///
/// Without `RUST_LOG` the level is `info`, or `debug` when `verbose`.
/// Calling this twice is harmless; the second call is ignored.
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let result = match LogFormat::from_env() {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .event_format(PolybuildFormatter { with_ansi: true })
                    .with_writer(io::stderr),
            )
            .try_init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .event_format(PolybuildFormatter { with_ansi: false })
                    .with_writer(io::stderr),
            )
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_file(false)
                    .with_line_number(false)
                    .with_ansi(false)
                    .with_writer(io::stderr)
                    .json(),
            )
            .try_init(),
    };

    if result.is_err() {
        tracing::debug!("[polybuild] Logging already initialized");
    }
}

/// Operation names for consistent logging
pub mod operations {
    pub const CACHE_OPEN: &str = "cache.open";
    pub const CACHE_LOOKUP: &str = "cache.lookup";
    pub const CACHE_RECORD: &str = "cache.record";
    pub const CACHE_CLEAR: &str = "cache.clear";
    pub const FINGERPRINT: &str = "fingerprint";
    pub const PROBE: &str = "probe";
    pub const COMPILE: &str = "compile";
    pub const RUN: &str = "run";
    pub const SCHEDULE: &str = "schedule";
}

/// Status values for consistent logging
pub mod status {
    pub const HIT: &str = "hit";
    pub const MISS: &str = "miss";
    pub const BUILT: &str = "built";
    pub const SHARED: &str = "shared";
    pub const FAILED: &str = "failed";
    pub const DEGRADED: &str = "degraded";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("JSON", false), LogFormat::Json);
        assert_eq!(LogFormat::parse("compact", false), LogFormat::Compact);
        assert_eq!(LogFormat::parse("pretty", true), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("", false), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("", true), LogFormat::Compact);
    }
}
