//! The shared logger sink.
//!
//! All five cooperative contexts (GUI plus the four simulation workers)
//! produce log and progress events through cloned [`LoggerSink`] handles.
//! The sink serializes them into a single stream; timestamps are attached
//! when an event is enqueued, not when the consumer drains it. Every message
//! is additionally mirrored to `tracing` so that a subscriber installed by
//! the host binary sees the same stream.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{error, info, warn};

/// Routing tag identifying which part of the system produced an event.
///
/// The numeric values are wire tags used by the GUI for routing only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ClientKind {
    /// Network/registry layer.
    Network = 0,
    /// Simulation clients and workers.
    Simulation = 1,
    /// GUI-originated messages.
    Gui = 2,
    /// Persistence layer.
    Database = 3,
    /// Everything else.
    General = 4,
}

impl ClientKind {
    /// Numeric routing tag for this kind.
    pub fn tag(self) -> u8 {
        self as u8
    }
}

/// Severity attached to every log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Informational progress.
    Info,
    /// Recoverable problem; the operation continued or was rolled back.
    Warning,
    /// Operation failed.
    Error,
    /// Invariant violation; the GUI layer owns the termination path.
    Fatal,
}

/// One event in the merged stream.
#[derive(Debug, Clone)]
pub enum LogEvent {
    /// A log line from one of the contexts.
    Message {
        /// Enqueue time.
        timestamp: DateTime<Utc>,
        /// Producing subsystem.
        kind: ClientKind,
        /// Message severity.
        severity: Severity,
        /// Human-readable text.
        message: String,
    },
    /// Progress report for one in-flight simulation job.
    Progress {
        /// Enqueue time.
        timestamp: DateTime<Utc>,
        /// Producing subsystem.
        kind: ClientKind,
        /// Identifier of the job reporting progress.
        job: String,
        /// Completion in percent, 0..=100.
        percent: f64,
    },
}

/// Cheap clonable producer handle.
///
/// Logging never fails visibly: if the consuming [`LoggerStream`] has been
/// dropped, events still reach `tracing` and the channel send is ignored.
#[derive(Debug, Clone)]
pub struct LoggerSink {
    tx: UnboundedSender<LogEvent>,
}

/// Consuming end of the merged stream, drained by the GUI.
#[derive(Debug)]
pub struct LoggerStream {
    rx: UnboundedReceiver<LogEvent>,
}

impl LoggerSink {
    /// Create a connected sink/stream pair.
    pub fn channel() -> (LoggerSink, LoggerStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (LoggerSink { tx }, LoggerStream { rx })
    }

    /// Enqueue a log message with the given severity.
    pub fn log(&self, kind: ClientKind, severity: Severity, message: impl Into<String>) {
        let message = message.into();
        match severity {
            Severity::Info => info!(kind = kind.tag(), "{message}"),
            Severity::Warning => warn!(kind = kind.tag(), "{message}"),
            Severity::Error | Severity::Fatal => error!(kind = kind.tag(), "{message}"),
        }
        let _ = self.tx.send(LogEvent::Message {
            timestamp: Utc::now(),
            kind,
            severity,
            message,
        });
    }

    /// Enqueue an informational message.
    pub fn info(&self, kind: ClientKind, message: impl Into<String>) {
        self.log(kind, Severity::Info, message);
    }

    /// Enqueue a warning.
    pub fn warning(&self, kind: ClientKind, message: impl Into<String>) {
        self.log(kind, Severity::Warning, message);
    }

    /// Enqueue an error.
    pub fn error(&self, kind: ClientKind, message: impl Into<String>) {
        self.log(kind, Severity::Error, message);
    }

    /// Enqueue a fatal error. The core does not terminate the process; the
    /// GUI layer reacts to fatal events.
    pub fn fatal(&self, kind: ClientKind, message: impl Into<String>) {
        self.log(kind, Severity::Fatal, message);
    }

    /// Enqueue a progress report for a job.
    pub fn progress(&self, kind: ClientKind, job: impl Into<String>, percent: f64) {
        let _ = self.tx.send(LogEvent::Progress {
            timestamp: Utc::now(),
            kind,
            job: job.into(),
            percent: percent.clamp(0.0, 100.0),
        });
    }
}

impl LoggerStream {
    /// Wait for the next event. Returns `None` once every sink clone has
    /// been dropped.
    pub async fn next(&mut self) -> Option<LogEvent> {
        self.rx.recv().await
    }

    /// Drain one event without waiting.
    pub fn try_next(&mut self) -> Option<LogEvent> {
        self.rx.try_recv().ok()
    }

    /// Drain everything currently queued.
    pub fn drain(&mut self) -> Vec<LogEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.try_next() {
            events.push(event);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_arrive_in_enqueue_order() {
        let (sink, mut stream) = LoggerSink::channel();
        sink.info(ClientKind::Network, "first");
        sink.error(ClientKind::Simulation, "second");
        sink.progress(ClientKind::Simulation, "job-1", 50.0);

        let events = stream.drain();
        assert_eq!(events.len(), 3);
        match &events[0] {
            LogEvent::Message {
                kind,
                severity,
                message,
                ..
            } => {
                assert_eq!(*kind, ClientKind::Network);
                assert_eq!(*severity, Severity::Info);
                assert_eq!(message, "first");
            }
            other => panic!("unexpected event {other:?}"),
        }
        match &events[2] {
            LogEvent::Progress { job, percent, .. } => {
                assert_eq!(job, "job-1");
                assert_eq!(*percent, 50.0);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn timestamps_are_monotone_in_enqueue_order() {
        let (sink, mut stream) = LoggerSink::channel();
        sink.info(ClientKind::General, "a");
        sink.info(ClientKind::General, "b");

        let events = stream.drain();
        let stamp = |event: &LogEvent| match event {
            LogEvent::Message { timestamp, .. } | LogEvent::Progress { timestamp, .. } => {
                *timestamp
            }
        };
        assert!(stamp(&events[0]) <= stamp(&events[1]));
    }

    #[test]
    fn dropped_stream_does_not_panic_producers() {
        let (sink, stream) = LoggerSink::channel();
        drop(stream);
        sink.warning(ClientKind::General, "still fine");
    }

    #[test]
    fn kind_tags_match_routing_table() {
        assert_eq!(ClientKind::Network.tag(), 0);
        assert_eq!(ClientKind::Simulation.tag(), 1);
        assert_eq!(ClientKind::Gui.tag(), 2);
        assert_eq!(ClientKind::Database.tag(), 3);
        assert_eq!(ClientKind::General.tag(), 4);
    }
}
