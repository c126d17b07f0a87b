// WG Profile Manager - Session Events
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Events published by the session orchestrator for display and logging.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

use super::sequencer::SequenceEvent;
use crate::models::{Error, SessionState, StatusSnapshot};

/// Severity of a session log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something the user should see.
#[derive(Debug)]
pub enum SessionEvent {
    /// A session log line.
    Log { level: LogLevel, message: String },
    StateChanged { profile: String, state: SessionState },
    /// Progress of the running command sequence.
    Sequence(SequenceEvent),
    /// Advisory condition. Never blocks an operation.
    Warning(Error),
    /// Result of a periodic status refresh.
    Status(StatusSnapshot),
}

/// Sending half of the session event channel.
///
/// Sends never fail; events are dropped once the receiver is gone.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

/// Create a session event channel.
pub fn event_channel() -> (EventSender, mpsc::UnboundedReceiver<SessionEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, rx)
}

impl EventSender {
    pub fn send(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.send(SessionEvent::Log {
            level,
            message: message.into(),
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_after_receiver_dropped() {
        let (events, rx) = event_channel();
        events.info("first");
        drop(rx);
        assert!(events.is_closed());
        // Dropped silently.
        events.error("second");
    }

    #[tokio::test]
    async fn test_log_levels() {
        let (events, mut rx) = event_channel();
        events.warn("careful");
        match rx.recv().await {
            Some(SessionEvent::Log { level, message }) => {
                assert_eq!(level, LogLevel::Warn);
                assert_eq!(message, "careful");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
