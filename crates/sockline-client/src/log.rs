//! Diagnostic log sink collaborator.

use std::fmt;
use std::sync::Arc;

/// Verbosity for the [`LogSink`] collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    Off,
    Error,
    #[default]
    Info,
    Debug,
}

/// Receives free-form diagnostic strings from the engine.
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);
}

/// Writes every engine diagnostic to `tracing` and, filtered by level, to the
/// configured sink.
#[derive(Clone, Default)]
pub(crate) struct Diagnostics {
    sink: Option<Arc<dyn LogSink>>,
    level: LogLevel,
}

impl Diagnostics {
    pub(crate) fn new(sink: Option<Arc<dyn LogSink>>, level: LogLevel) -> Self {
        Self { sink, level }
    }

    pub(crate) fn error(&self, event: &'static str, message: impl fmt::Display) {
        tracing::warn!(event, "{message}");
        self.forward(LogLevel::Error, event, &message);
    }

    pub(crate) fn info(&self, event: &'static str, message: impl fmt::Display) {
        tracing::info!(event, "{message}");
        self.forward(LogLevel::Info, event, &message);
    }

    pub(crate) fn debug(&self, event: &'static str, message: impl fmt::Display) {
        tracing::debug!(event, "{message}");
        self.forward(LogLevel::Debug, event, &message);
    }

    fn forward(&self, level: LogLevel, event: &str, message: &dyn fmt::Display) {
        if level > self.level {
            return;
        }
        if let Some(sink) = &self.sink {
            sink.log(level, &format!("{event}: {message}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Capture(Mutex<Vec<(LogLevel, String)>>);

    impl LogSink for Capture {
        fn log(&self, level: LogLevel, message: &str) {
            self.0.lock().unwrap().push((level, message.to_string()));
        }
    }

    #[test]
    fn sink_receives_messages_up_to_level() {
        let capture = Arc::new(Capture::default());
        let diag = Diagnostics::new(Some(capture.clone()), LogLevel::Info);
        diag.error("open_failed", "refused");
        diag.info("open", "sid=abc");
        diag.debug("frame", "42[]");

        let seen = capture.0.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                (LogLevel::Error, "open_failed: refused".to_string()),
                (LogLevel::Info, "open: sid=abc".to_string()),
            ]
        );
    }

    #[test]
    fn off_silences_the_sink() {
        let capture = Arc::new(Capture::default());
        let diag = Diagnostics::new(Some(capture.clone()), LogLevel::Off);
        diag.error("open_failed", "refused");
        assert!(capture.0.lock().unwrap().is_empty());
    }
}
