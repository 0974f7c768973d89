//! Debug output and timing.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Line-oriented `text/plain` debug stream.
///
/// Every line is flushed as soon as it is written so an operator can follow
/// a long import live. Clones share the underlying writer.
#[derive(Clone)]
pub struct DebugSink {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl DebugSink {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            out: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// For callers whose stdout carries machine-readable output.
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }

    /// Content type of the stream.
    pub fn content_type(&self) -> &'static str {
        "text/plain"
    }

    /// Write one line and flush. Write errors are ignored; the debug stream
    /// must never fail an import.
    pub fn line(&self, message: impl fmt::Display) {
        if let Ok(mut out) = self.out.lock() {
            let _ = writeln!(out, "{}", message);
            let _ = out.flush();
        }
    }
}

impl fmt::Debug for DebugSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugSink").finish_non_exhaustive()
    }
}

/// Wall-clock timer for a named unit of work.
#[derive(Debug, Clone)]
pub struct Stopwatch {
    label: String,
    started: Instant,
}

impl Stopwatch {
    pub fn start(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            started: Instant::now(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed().as_secs_f64()
    }
}

impl fmt::Display for Stopwatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.2}s)", self.label, self.elapsed_secs())
    }
}

/// Deadline derived from the configured maximum run duration.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    /// `0` seconds means no limit.
    pub fn from_secs(secs: u64) -> Self {
        Self {
            started: Instant::now(),
            budget: (secs > 0).then(|| Duration::from_secs(secs)),
        }
    }

    pub fn unlimited() -> Self {
        Self::from_secs(0)
    }

    /// A deadline that has already passed.
    pub fn expired_now() -> Self {
        Self {
            started: Instant::now(),
            budget: Some(Duration::ZERO),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.budget
            .map(|budget| self.started.elapsed() >= budget)
            .unwrap_or(false)
    }

    pub fn budget(&self) -> Option<Duration> {
        self.budget
    }
}
