//! Failure signals and check outcomes.

use chrono::{DateTime, Utc};

use crate::location::Location;

/// One failed check. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureSignal {
    message: Option<String>,
    location: Location,
    occurred_at: DateTime<Utc>,
}

impl FailureSignal {
    pub fn new(message: Option<String>, location: Location) -> Self {
        Self {
            message,
            location,
            occurred_at: Utc::now(),
        }
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    /// The message, or the source location when no message was given.
    pub fn summary(&self) -> String {
        match &self.message {
            Some(message) => message.clone(),
            None => self.location.file_line(),
        }
    }

    /// Multi-line rendering used for logging and in alert mail bodies.
    pub fn log(&self) -> String {
        let mut out = format!("[{}] ", self.occurred_at.format("%Y-%m-%d %H:%M:%S %Z"));
        if let Some(message) = &self.message {
            out.push_str(message);
            out.push('\n');
        }
        out.push_str(&self.location.render());
        out
    }
}

/// Result of one run of a check body, after timing and error folding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Success,
    Failed(FailureSignal),
}

impl CheckOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CheckOutcome::Success)
    }
}
