//! Captured console events for a sandbox run.
//!
//! Console output from learner code is appended to a capped, append-only
//! buffer. Once the cap is exceeded a `truncated` flag latches for the rest
//! of the run, signalling that output was capped rather than lost silently.

use serde::{Deserialize, Serialize};

/// Maximum number of events retained per run.
pub const MAX_EVENTS: usize = 200;

/// Severity of a captured console event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// `console.log`
    Log,
    /// `console.warn`
    Warn,
    /// `console.error` and host-reported errors.
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Log => write!(f, "log"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// One captured console line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxEvent {
    /// Monotonic id within the run (0-based).
    pub id: u64,
    /// Severity.
    pub level: LogLevel,
    /// The rendered message text.
    pub message: String,
}

/// Append-only, capped event buffer for one run.
///
/// The first [`MAX_EVENTS`] events are retained in order; everything past
/// the cap is dropped and `truncated` latches to `true` for the rest of
/// the run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<SandboxEvent>,
    next_id: u64,
    truncated: bool,
}

impl EventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event, dropping it (and latching `truncated`) once the
    /// cap has been reached.
    pub fn push(&mut self, level: LogLevel, message: impl Into<String>) {
        if self.events.len() >= MAX_EVENTS {
            self.truncated = true;
            return;
        }
        self.events.push(SandboxEvent {
            id: self.next_id,
            level,
            message: message.into(),
        });
        self.next_id += 1;
    }

    /// The retained events, in append order.
    #[must_use]
    pub fn events(&self) -> &[SandboxEvent] {
        &self.events
    }

    /// `true` once at least one event has been dropped.
    #[must_use]
    pub const fn truncated(&self) -> bool {
        self.truncated
    }

    /// Number of retained events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// `true` if nothing has been captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Consumes the log, returning the retained events.
    #[must_use]
    pub fn into_events(self) -> Vec<SandboxEvent> {
        self.events
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_push_assigns_monotonic_ids() {
        let mut log = EventLog::new();
        log.push(LogLevel::Log, "first");
        log.push(LogLevel::Warn, "second");
        log.push(LogLevel::Error, "third");

        let events = log.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].id, 0);
        assert_eq!(events[1].id, 1);
        assert_eq!(events[2].id, 2);
        assert_eq!(events[1].level, LogLevel::Warn);
        assert_eq!(events[2].message, "third");
        assert!(!log.truncated());
    }

    #[test]
    fn test_cap_retains_first_200_in_order() {
        let mut log = EventLog::new();
        for i in 0..250 {
            log.push(LogLevel::Log, format!("line {i}"));
        }

        assert_eq!(log.len(), MAX_EVENTS);
        assert!(log.truncated());
        assert_eq!(log.events()[0].message, "line 0");
        assert_eq!(log.events()[MAX_EVENTS - 1].message, "line 199");
    }

    #[test]
    fn test_truncated_latches() {
        let mut log = EventLog::new();
        for _ in 0..=MAX_EVENTS {
            log.push(LogLevel::Log, "x");
        }
        assert!(log.truncated());
        // Further pushes keep it latched and keep the buffer unchanged.
        log.push(LogLevel::Error, "late");
        assert!(log.truncated());
        assert_eq!(log.len(), MAX_EVENTS);
    }

    #[test]
    fn test_exactly_at_cap_is_not_truncated() {
        let mut log = EventLog::new();
        for _ in 0..MAX_EVENTS {
            log.push(LogLevel::Log, "x");
        }
        assert_eq!(log.len(), MAX_EVENTS);
        assert!(!log.truncated());
    }

    #[test]
    fn test_log_level_serialization() {
        assert_eq!(
            serde_json::to_string(&LogLevel::Log).unwrap(),
            r#""log""#
        );
        assert_eq!(
            serde_json::to_string(&LogLevel::Warn).unwrap(),
            r#""warn""#
        );
        assert_eq!(
            serde_json::to_string(&LogLevel::Error).unwrap(),
            r#""error""#
        );
    }
}
