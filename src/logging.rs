//! Structured logging for galaxy
//!
//! Events carry an `operation` field from [`operations`] and, where a step
//! finishes or is skipped, a `status` field from [`status`]. Logs go to
//! stderr so stdout stays free for command output.

use std::{fmt as std_fmt, io};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{
    fmt::{self, format::Writer},
    prelude::*,
    EnvFilter,
};

/// One line per event: `<utc time> <LEVEL>: <fields>`
struct GalaxyFormatter {
    with_ansi: bool,
}

fn level_color(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "\x1b[31m",
        Level::WARN => "\x1b[33m",
        Level::INFO => "\x1b[32m",
        Level::DEBUG => "\x1b[34m",
        Level::TRACE => "\x1b[35m",
    }
}

impl<S, N> FormatEvent<S, N> for GalaxyFormatter
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
        let level = event.metadata().level();
        write!(writer, "{} ", chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"))?;
        if self.with_ansi {
            write!(writer, "{}{:5}\x1b[0m: ", level_color(level), level)?;
        } else {
            write!(writer, "{:5}: ", level)?;
        }
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Colored text
    Pretty,
    /// Plain text, the default under CI
    Compact,
    Json,
}

impl LogFormat {
    /// Parse from `GALAXY_LOG_FORMAT`
    pub fn from_env() -> Self {
        match std::env::var("GALAXY_LOG_FORMAT")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "json" => Self::Json,
            "compact" => Self::Compact,
            "pretty" => Self::Pretty,
            _ if std::env::var("CI").is_ok() => Self::Compact,
            _ => Self::Pretty,
        }
    }
}

/// Initialize the global subscriber from `RUST_LOG` and `GALAXY_LOG_FORMAT`
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match LogFormat::from_env() {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(io::stderr)
                    .json(),
            )
            .init(),
        format => registry
            .with(
                fmt::layer()
                    .event_format(GalaxyFormatter {
                        with_ansi: format == LogFormat::Pretty,
                    })
                    .with_writer(io::stderr),
            )
            .init(),
    }
}

/// Values of the `operation` field
pub mod operations {
    pub const CACHE_HIT: &str = "cache.hit";
    pub const CACHE_UPLOAD: &str = "cache.upload";
    pub const STORE_PUT: &str = "store.put";
    pub const TEMPLATE_BUILD: &str = "template.build";
    pub const STEP_INSTANTIATE: &str = "step.instantiate";
    pub const WORKFLOW_ADD_STEP: &str = "workflow.add_step";
    pub const WORKFLOW_RESUME: &str = "workflow.resume";
    pub const EXECUTOR_RUN_STEP: &str = "executor.run_step";
    pub const HANDLER_INVOKE: &str = "handler.invoke";
    pub const CHECKPOINT: &str = "checkpoint";
}

/// Values of the `status` field
pub mod status {
    pub const COMPLETED: &str = "completed";
    pub const SKIPPED: &str = "skipped";
    pub const RUNNING: &str = "running";
}
