//! Tracing integration for the debug stream.
//!
//! With `--debug`, log events of this tool and its library are mirrored
//! into the import's [`DebugSink`] so the operator sees engine progress and
//! diagnostics in one line-flushed stream. Events of dependencies (sqlx and
//! friends) stay in the regular log output only.

use std::fmt::{self, Write as _};

use billing_migrate::DebugSink;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Target prefix shared by the library and this binary.
const TARGET: &str = "billing_migrate";

fn is_own_target(target: &str) -> bool {
    target
        .strip_prefix(TARGET)
        .map_or(false, |rest| rest.is_empty() || rest.starts_with("::"))
}

/// Forwards events of `billing_migrate` targets to a [`DebugSink`], one line each.
pub struct DebugLogLayer {
    sink: DebugSink,
}

impl DebugLogLayer {
    pub fn new(sink: DebugSink) -> Self {
        Self { sink }
    }
}

impl<S> Layer<S> for DebugLogLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if !is_own_target(event.metadata().target()) {
            return;
        }
        let mut fields = FieldCollector::default();
        event.record(&mut fields);

        let meta = event.metadata();
        self.sink.line(format_args!(
            "{} [{:5}] {}: {}",
            chrono::Local::now().format("%H:%M:%S"),
            meta.level(),
            meta.target(),
            fields.finish()
        ));
    }
}

/// Collects the `message` field and any extra `key=value` pairs of an event.
#[derive(Default)]
struct FieldCollector {
    message: String,
    extra: Vec<String>,
}

impl FieldCollector {
    fn finish(self) -> String {
        let mut line = self.message;
        for pair in self.extra {
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(&pair);
        }
        line
    }

    fn push(&mut self, field: &Field, value: impl fmt::Display) {
        if field.name() == "message" {
            let _ = write!(self.message, "{}", value);
        } else {
            self.extra.push(format!("{}={}", field.name(), value));
        }
    }
}

impl Visit for FieldCollector {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.push(field, format_args!("{:?}", value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, value);
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, value);
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, value);
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, value);
    }
}
