//! Engine log events and the per-session observers that receive them.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::progress::Progress;

/// Which stream a log line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LogKind {
    /// Messages produced by the session itself.
    #[serde(rename = "info")]
    Info,
    /// Engine standard output.
    #[serde(rename = "ffout")]
    StdOut,
    /// Engine standard error (where ffmpeg writes its log).
    #[serde(rename = "fferr")]
    StdErr,
}

impl LogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogKind::Info => "info",
            LogKind::StdOut => "ffout",
            LogKind::StdErr => "fferr",
        }
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of engine (or session) output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEvent {
    #[serde(rename = "type")]
    pub kind: LogKind,
    pub message: String,
}

impl LogEvent {
    pub fn new(kind: LogKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Callback receiving every log line.
pub type LoggerFn = Arc<dyn Fn(&LogEvent) + Send + Sync>;

/// Callback receiving every progress update.
pub type ProgressFn = Arc<dyn Fn(&Progress) + Send + Sync>;

/// Observers owned by one session. Cloned out of their lock before being
/// invoked so callbacks can safely call back into the session.
#[derive(Clone, Default)]
pub(crate) struct Observers {
    pub logger: Option<LoggerFn>,
    pub progress: Option<ProgressFn>,
    pub echo: bool,
}

impl Observers {
    pub fn log(&self, event: &LogEvent) {
        if let Some(ref logger) = self.logger {
            logger(event);
        }
        if self.echo {
            tracing::info!("[{}] {}", event.kind, event.message);
        } else {
            tracing::trace!("[{}] {}", event.kind, event.message);
        }
    }

    pub fn progress(&self, progress: &Progress) {
        if let Some(ref cb) = self.progress {
            cb(progress);
        }
    }
}
