//! Tracing setup and the in-memory log buffer tailed by the control surface.
//!
//! The buffer is written only by [`LogBufferLayer`]; readers get copies.

use std::collections::VecDeque;
use std::fmt::{self, Write as _};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use shared_types::{LogEntry, Severity};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as tracing_fmt, EnvFilter, Layer};

/// Number of entries kept by default.
pub const DEFAULT_CAPACITY: usize = 200;

/// Bounded ring of recent log lines.
#[derive(Clone)]
pub struct LogBuffer {
    inner: Arc<Mutex<Ring>>,
}

struct Ring {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    next_id: u64,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Mutex::new(Ring {
                entries: VecDeque::with_capacity(capacity),
                capacity,
                next_id: 1,
            })),
        }
    }

    /// Append a line, evicting the oldest one when full. Returns its id.
    pub fn push(&self, message: impl Into<String>, severity: Severity) -> u64 {
        let mut ring = self.inner.lock();
        let id = ring.next_id;
        ring.next_id += 1;

        if ring.entries.len() == ring.capacity {
            ring.entries.pop_front();
        }
        ring.entries.push_back(LogEntry {
            id,
            timestamp: Utc::now(),
            message: message.into(),
            severity,
        });
        id
    }

    /// The newest `limit` entries, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        let ring = self.inner.lock();
        let skip = ring.entries.len().saturating_sub(limit);
        ring.entries.iter().skip(skip).cloned().collect()
    }

    /// Entries with an id greater than `after`, oldest first, at most `limit`
    /// of the newest ones.
    pub fn since(&self, after: u64, limit: usize) -> Vec<LogEntry> {
        let ring = self.inner.lock();
        let newer: Vec<&LogEntry> = ring.entries.iter().filter(|e| e.id > after).collect();
        let skip = newer.len().saturating_sub(limit);
        newer.into_iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Tracing layer that copies events into a [`LogBuffer`].
///
/// Events carrying `outcome = "success"` are stored with `Severity::Success`.
pub struct LogBufferLayer {
    buffer: LogBuffer,
}

impl LogBufferLayer {
    pub fn new(buffer: LogBuffer) -> Self {
        Self { buffer }
    }
}

impl<S: Subscriber> Layer<S> for LogBufferLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);

        let severity = if visitor.success {
            Severity::Success
        } else {
            severity_for(*event.metadata().level())
        };
        self.buffer.push(visitor.into_line(), severity);
    }
}

fn severity_for(level: Level) -> Severity {
    match level {
        Level::ERROR => Severity::Error,
        Level::WARN => Severity::Warning,
        Level::INFO => Severity::Info,
        _ => Severity::Debug,
    }
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
    success: bool,
}

impl LineVisitor {
    fn into_line(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields.trim_start().to_string()
        } else {
            format!("{}{}", self.message, self.fields)
        }
    }
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "outcome" {
            self.success = value == "success";
            return;
        }
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else if field.name() != "outcome" {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` controls console output (default `rebooker=info`). When a
/// buffer is given, INFO and above from this crate are also copied into it
/// regardless of `RUST_LOG`.
pub fn init_tracing(json: bool, buffer: Option<LogBuffer>) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("rebooker=info,rebooker_cli=info,tower_http=info"));

    let console = if json {
        tracing_fmt::layer()
            .with_target(true)
            .json()
            .with_filter(env_filter)
            .boxed()
    } else {
        tracing_fmt::layer()
            .with_target(true)
            .with_filter(env_filter)
            .boxed()
    };

    let captured = buffer.map(|buffer| {
        LogBufferLayer::new(buffer).with_filter(
            Targets::new()
                .with_target("rebooker", Level::INFO)
                .with_target("rebooker_cli", Level::INFO),
        )
    });

    tracing_subscriber::registry()
        .with(console)
        .with(captured)
        .init();
}
