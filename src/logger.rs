use std::fmt;

use tracing::{Event, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, format};
use tracing_subscriber::registry::LookupSpan;

use crate::config::LogLevel;

/// Single-line event format: `METRONOME | <LEVEL> | <message>`.
#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let level = event.metadata().level();
        write!(writer, "METRONOME | {level} | ")?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Installs the global `tracing` subscriber.
///
/// Safe to call more than once; only the first call wins.
pub fn enable_logging_subsystem(log_level: LogLevel) {
    let env_filter = EnvFilter::try_new(log_level.env_filter_directives())
        .unwrap_or_else(|_| EnvFilter::new(LogLevel::default().as_ref()));
    let installed = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(false)
        .without_time()
        .event_format(Formatter)
        .try_init();

    // try_init also bridges `log` records through tracing-log
    if installed.is_ok() {
        log::set_max_level(log_level.as_level_filter());
        tracing::debug!("Logging subsystem enabled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn enabling_twice_keeps_first_subscriber() {
        enable_logging_subsystem(LogLevel::Debug);
        enable_logging_subsystem(LogLevel::Error);
        tracing::debug!("still logging");
    }
}
