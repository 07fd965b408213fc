//! Failure accumulation, adaptive cadence, and alert decisions.
//!
//! [`AlertState`] is the pure state machine behind every task. It is fed one
//! outcome per tick and answers two questions: how long until the next
//! check, and whether an alert or recovery mail must go out now.
//!
//! ```text
//!            failure (n <= retries)        failure (n > retries)
//!  Healthy ─────────────────────► Degraded ───────────────────► Alerting
//!     ▲                              │                              │
//!     └──────────── success ─────────┴────────── success ───────────┘
//! ```

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use watchpost_core::WatcherConfig;

use crate::failure::FailureSignal;

/// Minimum spacing between two alert mails of the same task.
/// Recovery mails are never held back.
pub const ALERT_COOLDOWN: Duration = Duration::from_secs(10 * 60);

/// Externally visible health of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// No pending failures.
    Healthy,
    /// Failing, but not more often than `retries` in a row.
    Degraded,
    /// Failed more than `retries` times in a row; the alert is firing.
    Alerting,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TaskStatus::Healthy => "healthy",
            TaskStatus::Degraded => "degraded",
            TaskStatus::Alerting => "alerting",
        };
        f.write_str(name)
    }
}

/// A mail the task must send after an alert-state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The failure streak exceeded `retries`.
    Alert { failures: Vec<FailureSignal> },
    /// The task passed again; `streak` is the failure history that just ended.
    Recovery { streak: Vec<FailureSignal> },
}

/// Per-task failure history and alert bookkeeping.
#[derive(Debug, Clone)]
pub struct AlertState {
    /// Watcher name, for log lines.
    watcher: String,
    interval: Duration,
    interval_error: Duration,
    retries: u32,
    recent_failures: Vec<FailureSignal>,
    alert_firing: bool,
    last_mailed_at: Option<Instant>,
    current_interval: Duration,
}

impl AlertState {
    pub fn new(watcher: impl Into<String>, config: &WatcherConfig) -> Self {
        Self {
            watcher: watcher.into(),
            interval: config.interval,
            interval_error: config.interval_error,
            retries: config.retries,
            recent_failures: Vec::new(),
            alert_firing: false,
            last_mailed_at: None,
            current_interval: config.interval,
        }
    }

    /// Record a passing check.
    pub fn record_success(&mut self, now: Instant) -> Option<Notice> {
        let streak = std::mem::take(&mut self.recent_failures);
        if !streak.is_empty() {
            debug!(watcher = %self.watcher, failures = streak.len(), "failure streak cleared");
        }
        self.current_interval = self.interval;

        self.set_alert_state(false, now)
            .then_some(Notice::Recovery { streak })
    }

    /// Record a failed check.
    pub fn record_failure(&mut self, failure: FailureSignal, now: Instant) -> Option<Notice> {
        if self.recent_failures.is_empty() {
            self.current_interval = self.interval_error;
        }
        self.recent_failures.push(failure);

        if self.recent_failures.len() > self.retries as usize && self.set_alert_state(true, now) {
            return Some(Notice::Alert {
                failures: self.recent_failures.clone(),
            });
        }
        None
    }

    /// Flip the alert state. Returns whether a mail must be sent.
    ///
    /// The cooldown clock restarts on every transition, including ones whose
    /// alert mail was suppressed.
    fn set_alert_state(&mut self, firing: bool, now: Instant) -> bool {
        if firing == self.alert_firing {
            return false;
        }

        let in_cooldown = self
            .last_mailed_at
            .is_some_and(|at| now.saturating_duration_since(at) < ALERT_COOLDOWN);
        let send = !(firing && in_cooldown);

        if firing {
            if send {
                warn!(
                    watcher = %self.watcher,
                    failures = self.recent_failures.len(),
                    retries = self.retries,
                    "alert firing"
                );
            } else {
                info!(
                    watcher = %self.watcher,
                    failures = self.recent_failures.len(),
                    "alert firing again within cooldown, mail suppressed"
                );
            }
        } else {
            info!(watcher = %self.watcher, "alert cleared");
        }

        self.last_mailed_at = Some(now);
        self.alert_firing = firing;
        send
    }

    pub fn status(&self) -> TaskStatus {
        if self.alert_firing {
            TaskStatus::Alerting
        } else if self.recent_failures.is_empty() {
            TaskStatus::Healthy
        } else {
            TaskStatus::Degraded
        }
    }

    pub fn recent_failures(&self) -> &[FailureSignal] {
        &self.recent_failures
    }

    pub fn alert_firing(&self) -> bool {
        self.alert_firing
    }

    pub fn last_mailed_at(&self) -> Option<Instant> {
        self.last_mailed_at
    }

    /// Cadence presently in effect.
    pub fn current_interval(&self) -> Duration {
        self.current_interval
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use watchpost_core::{FileConfig, WatchOptions};

    use super::*;
    use crate::location::Location;

    fn state(retries: u32) -> AlertState {
        let options = WatchOptions::new()
            .interval(Duration::from_secs(60))
            .retries(retries);
        AlertState::new("db", &WatcherConfig::resolve(&options, &FileConfig::default()).unwrap())
    }

    fn failure(message: &str) -> FailureSignal {
        FailureSignal::new(Some(message.to_string()), Location::unknown())
    }

    fn assert_interval_invariant(state: &AlertState) {
        let expected = if state.recent_failures().is_empty() {
            Duration::from_secs(60)
        } else {
            Duration::from_secs(12)
        };
        assert_eq!(state.current_interval(), expected);
    }

    #[test]
    fn starts_healthy_at_normal_cadence() {
        let state = state(1);
        assert_eq!(state.status(), TaskStatus::Healthy);
        assert_eq!(state.current_interval(), Duration::from_secs(60));
        assert!(!state.alert_firing());
        assert!(state.last_mailed_at().is_none());
    }

    #[test]
    fn first_failure_accelerates_rechecks() {
        let mut state = state(3);
        let now = Instant::now();

        assert_eq!(state.record_failure(failure("a"), now), None);
        assert_eq!(state.status(), TaskStatus::Degraded);
        assert_eq!(state.current_interval(), Duration::from_secs(12));

        assert_eq!(state.record_failure(failure("b"), now), None);
        assert_eq!(state.current_interval(), Duration::from_secs(12));
        assert_eq!(state.recent_failures().len(), 2);
    }

    #[test]
    fn alert_fires_only_once_failures_exceed_retries() {
        let mut state = state(1);
        let now = Instant::now();

        assert_eq!(state.record_failure(failure("first"), now), None);
        assert!(!state.alert_firing());

        let notice = state.record_failure(failure("second"), now);
        let Some(Notice::Alert { failures }) = notice else {
            panic!("expected an alert, got {notice:?}");
        };
        assert_eq!(failures.len(), 2);
        assert_eq!(state.status(), TaskStatus::Alerting);

        // Further failures keep the alert firing without new mail.
        assert_eq!(state.record_failure(failure("third"), now), None);
        assert_eq!(state.status(), TaskStatus::Alerting);
        assert_eq!(state.recent_failures().len(), 3);
    }

    #[test]
    fn zero_retries_alerts_on_first_failure() {
        let mut state = state(0);
        let notice = state.record_failure(failure("down"), Instant::now());
        assert!(matches!(notice, Some(Notice::Alert { .. })));
    }

    #[test]
    fn success_resets_everything() {
        let mut state = state(1);
        let now = Instant::now();
        state.record_failure(failure("a"), now);
        state.record_failure(failure("b"), now);
        assert!(state.alert_firing());

        let notice = state.record_success(now + Duration::from_secs(12));
        let Some(Notice::Recovery { streak }) = notice else {
            panic!("expected a recovery notice, got {notice:?}");
        };
        assert_eq!(streak.len(), 2);
        assert_eq!(state.status(), TaskStatus::Healthy);
        assert!(state.recent_failures().is_empty());
        assert!(!state.alert_firing());
        assert_eq!(state.current_interval(), Duration::from_secs(60));
    }

    #[test]
    fn success_while_degraded_sends_nothing() {
        let mut state = state(2);
        let now = Instant::now();
        state.record_failure(failure("blip"), now);
        assert_eq!(state.record_success(now), None);
        assert_eq!(state.status(), TaskStatus::Healthy);
        assert!(state.last_mailed_at().is_none());
    }

    #[test]
    fn recovery_mails_even_inside_cooldown() {
        let mut state = state(0);
        let t0 = Instant::now();
        assert!(state.record_failure(failure("down"), t0).is_some());
        let notice = state.record_success(t0 + Duration::from_secs(1));
        assert!(matches!(notice, Some(Notice::Recovery { .. })));
    }

    #[test]
    fn repeated_alert_inside_cooldown_is_suppressed() {
        let mut state = state(0);
        let t0 = Instant::now();

        assert!(state.record_failure(failure("down"), t0).is_some());
        assert!(state.record_success(t0 + Duration::from_secs(60)).is_some());

        // Flapping back to failing five minutes after the first alert.
        let notice = state.record_failure(failure("down again"), t0 + Duration::from_secs(300));
        assert_eq!(notice, None);
        assert!(state.alert_firing());
        assert_eq!(state.last_mailed_at(), Some(t0 + Duration::from_secs(300)));
    }

    #[test]
    fn new_streak_after_cooldown_alerts_again() {
        let mut state = state(0);
        let t0 = Instant::now();

        assert!(state.record_failure(failure("down"), t0).is_some());
        assert!(state.record_success(t0 + Duration::from_secs(30)).is_some());

        let later = t0 + Duration::from_secs(30) + ALERT_COOLDOWN;
        let notice = state.record_failure(failure("down again"), later);
        assert!(matches!(notice, Some(Notice::Alert { .. })));
    }

    #[test]
    fn suppressed_transition_restarts_cooldown_clock() {
        let mut state = state(0);
        let t0 = Instant::now();
        let minute = Duration::from_secs(60);

        assert!(state.record_failure(failure("down"), t0).is_some());
        assert!(state.record_success(t0 + minute).is_some());
        // Suppressed: two minutes after the recovery mail.
        assert!(state.record_failure(failure("down"), t0 + 3 * minute).is_none());
        assert!(state.record_success(t0 + 4 * minute).is_some());
        // Eleven minutes after the first alert, but only seven after the
        // last transition: still suppressed.
        assert!(state.record_failure(failure("down"), t0 + 11 * minute).is_none());
    }

    #[test]
    fn interval_tracks_failures_across_any_sequence() {
        let mut state = state(1);
        let mut now = Instant::now();
        let outcomes = [false, false, true, false, true, true, false, false, false, true];

        for passed in outcomes {
            now += Duration::from_secs(1);
            if passed {
                state.record_success(now);
            } else {
                state.record_failure(failure("x"), now);
            }
            assert_interval_invariant(&state);
            if state.alert_firing() {
                assert!(state.recent_failures().len() > 1);
            }
        }
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn transitions_are_logged_with_the_watcher_name() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let mut state = state(0);
            let now = Instant::now();
            state.record_failure(failure("down"), now);
            state.record_success(now);
            state.record_failure(failure("down again"), now);
        });

        let logs = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        for event in ["alert firing", "alert cleared", "mail suppressed"] {
            let line = logs
                .lines()
                .find(|line| line.contains(event))
                .unwrap_or_else(|| panic!("no {event:?} line in:\n{logs}"));
            assert!(line.contains("watcher=db"), "{line}");
        }
    }
}
