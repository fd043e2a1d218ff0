use chrono::Local;
use colored::*;
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber: colorized compact lines, filtered by `RUST_LOG` (default: info).
///
/// Calling it again once a subscriber is installed does nothing.
/// Example: `RUST_LOG=agentrace_sdk_rs=debug cargo run --example offline_replay`
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Force colored output even if not a TTY
    colored::control::set_override(true);

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(true)
        .with_writer(std::io::stdout)
        .event_format(CustomFormatter)
        .try_init();
}

struct CustomFormatter;

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for CustomFormatter
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: tracing_subscriber::fmt::format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f").to_string();
        let metadata = event.metadata();

        let level_str = match *metadata.level() {
            tracing::Level::ERROR => "ERROR".red().bold().to_string(),
            tracing::Level::WARN => "WARN".yellow().bold().to_string(),
            tracing::Level::INFO => "INFO".green().bold().to_string(),
            tracing::Level::DEBUG => "DEBUG".blue().bold().to_string(),
            tracing::Level::TRACE => "TRACE".magenta().bold().to_string(),
        };

        write!(
            writer,
            "{} {} {} ",
            now.dimmed(),
            level_str,
            metadata.target().cyan()
        )?;

        // Message first, then key=value fields
        let mut message = String::new();
        let mut fields = String::new();
        let mut visitor = FieldVisitor {
            message: &mut message,
            fields: &mut fields,
        };
        event.record(&mut visitor);

        write!(writer, "{}", message)?;
        if !fields.is_empty() {
            write!(writer, "{}", fields.dimmed())?;
        }
        writeln!(writer)
    }
}

struct FieldVisitor<'a> {
    message: &'a mut String,
    fields: &'a mut String,
}

impl<'a> tracing::field::Visit for FieldVisitor<'a> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        use std::fmt::Write;
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        use std::fmt::Write;
        if field.name() == "message" {
            let _ = write!(self.message, "{}", value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }
}
