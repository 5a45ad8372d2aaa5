use chrono::Local;
use nu_ansi_term::{Color, Style};
use std::fmt;
use tracing::{Event, Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{format::Writer, FmtContext, FormatEvent, FormatFields},
    prelude::*,
    registry::LookupSpan,
    Layer,
};

/// Target used for operator-facing progress and lifecycle events.
pub const OPERATION_TARGET: &str = "operation";

/// Installs the global subscriber: an hourly-rotated file under `log_dir` and a
/// colored console layer. The returned guard must outlive the program's
/// logging, otherwise buffered file lines are lost.
pub fn setup_logger(log_dir: &str) -> Option<WorkerGuard> {
    if std::fs::create_dir_all(log_dir).is_err() {
        eprintln!("Could not create log directory '{}', file logging disabled", log_dir);
        init_console_only();
        return None;
    }

    let file_appender = tracing_appender::rolling::hourly(log_dir, "buyer");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // File keeps everything from INFO up, including chain crate details
    let file_filter = tracing_subscriber::filter::Targets::new().with_default(Level::INFO);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .event_format(FileFormatter)
        .with_filter(file_filter);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer())
        .init();

    Some(guard)
}

fn init_console_only() {
    tracing_subscriber::registry().with(console_layer()).init();
}

fn console_layer<S>() -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    // Console: INFO for operation events, WARN for everything else
    let console_filter = tracing_subscriber::filter::Targets::new()
        .with_target(OPERATION_TARGET, Level::INFO)
        .with_default(Level::WARN);

    tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .event_format(TerminalFormatter)
        .with_filter(console_filter)
}

// --- Formatters ---

#[derive(Default)]
struct MessageVisitor {
    message: String,
    critical: bool,
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        }
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        if field.name() == "critical" {
            self.critical = value;
        }
    }
}

/// Outcome words highlighted on the console.
const OUTCOME_WORDS: &[(&str, Color)] = &[
    ("SUCCESS", Color::LightGreen),
    ("Success", Color::LightGreen),
    ("FAILED", Color::LightRed),
    ("Failed", Color::LightRed),
];

fn colorize(msg: &str) -> String {
    OUTCOME_WORDS
        .iter()
        .fold(msg.to_string(), |text, (word, color)| {
            if text.contains(word) {
                text.replace(word, &color.bold().paint(*word).to_string())
            } else {
                text
            }
        })
}

pub struct TerminalFormatter;

impl<S, N> FormatEvent<S, N> for TerminalFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let prefix = match *event.metadata().level() {
            _ if visitor.critical => Style::new().on(Color::Red).bold().paint("CRITICAL ").to_string(),
            Level::ERROR => Color::Red.bold().paint("ERROR ").to_string(),
            Level::WARN => Color::Yellow.paint("WARN ").to_string(),
            _ => String::new(),
        };

        writeln!(writer, "{}{}", prefix, colorize(&visitor.message))
    }
}

pub struct FileFormatter;

impl<S, N> FormatEvent<S, N> for FileFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let metadata = event.metadata();

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let level = if visitor.critical {
            "CRITICAL".to_string()
        } else {
            metadata.level().to_string()
        };

        writeln!(
            writer,
            "{} [{}] {}: {}",
            timestamp,
            level,
            metadata.target(),
            visitor.message
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_colorize_leaves_plain_messages() {
        assert_eq!(colorize("Phase 2: creating wallets"), "Phase 2: creating wallets");
    }

    #[test]
    fn test_colorize_marks_outcomes() {
        let ok = colorize("Swap SUCCESS for wallet 3");
        assert!(ok.contains("SUCCESS"));
        assert_ne!(ok, "Swap SUCCESS for wallet 3");

        let failed = colorize("Funding FAILED for wallet 2");
        assert_ne!(failed, "Funding FAILED for wallet 2");
    }
}
