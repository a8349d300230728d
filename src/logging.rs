use colored::*;
use std::fmt;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;

/// Tracing event formatter that colors report output by severity.
///
/// The multi-line per-operation breakdown and the summary line are emitted
/// as plain log events; this formatter colors each whole event by level and
/// prints nothing else, so reports reach the terminal without timestamps or
/// level tags interleaved in the columns.
pub struct ReportFormatter;

impl<S, N> FormatEvent<S, N> for ReportFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        // format_fields writes directly, so the event is buffered first and
        // the color applied to the whole line afterwards.
        let mut buffer = String::new();
        let mut buf_writer = Writer::new(&mut buffer);
        ctx.format_fields(buf_writer.by_ref(), event)?;

        let colored_output = match *event.metadata().level() {
            Level::ERROR => buffer.red().bold(),
            Level::WARN => buffer.yellow(),
            Level::INFO => buffer.normal(),
            Level::DEBUG => buffer.blue(),
            Level::TRACE => buffer.dimmed(),
        };

        writeln!(writer, "{}", colored_output)
    }
}
