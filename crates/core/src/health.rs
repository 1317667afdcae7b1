//! Poll-cycle bookkeeping shared between the alert poller (writer) and the
//! health monitor (reader).

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};

#[derive(Debug)]
pub struct PollState {
    started_at: DateTime<Utc>,
    last_successful_check_ms: AtomicI64,
    consecutive_failures: AtomicU32,
    cycle_in_progress: AtomicBool,
}

impl PollState {
    /// The start time counts as the last successful check so a fresh
    /// process is not reported as stale before its first cycle.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            started_at: now,
            last_successful_check_ms: AtomicI64::new(now.timestamp_millis()),
            consecutive_failures: AtomicU32::new(0),
            cycle_in_progress: AtomicBool::new(false),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn record_success(&self, now: DateTime<Utc>) {
        self.last_successful_check_ms
            .store(now.timestamp_millis(), Ordering::SeqCst);
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }

    /// Returns the failure count after incrementing.
    pub fn record_failure(&self) -> u32 {
        self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    pub fn last_successful_check(&self) -> DateTime<Utc> {
        let millis = self.last_successful_check_ms.load(Ordering::SeqCst);
        Utc.timestamp_millis_opt(millis)
            .single()
            .unwrap_or(self.started_at)
    }

    pub fn is_cycle_in_progress(&self) -> bool {
        self.cycle_in_progress.load(Ordering::SeqCst)
    }

    /// Claims the cycle slot. Returns `None` while another cycle holds it.
    pub fn try_begin_cycle(&self) -> Option<CycleGuard<'_>> {
        self.cycle_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| CycleGuard { state: self })
    }

    pub fn snapshot(&self) -> PollSnapshot {
        PollSnapshot {
            started_at: self.started_at,
            last_successful_check: self.last_successful_check(),
            consecutive_failures: self.consecutive_failures(),
            cycle_in_progress: self.is_cycle_in_progress(),
        }
    }
}

/// Releases the cycle slot on drop.
#[derive(Debug)]
pub struct CycleGuard<'a> {
    state: &'a PollState,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.state.cycle_in_progress.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PollSnapshot {
    pub started_at: DateTime<Utc>,
    pub last_successful_check: DateTime<Utc>,
    pub consecutive_failures: u32,
    pub cycle_in_progress: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthThresholds {
    pub max_consecutive_failures: u32,
    pub max_silence: Duration,
}

impl HealthThresholds {
    /// Silence is tolerated for twice the poll interval.
    pub fn for_poll_interval(poll_interval: std::time::Duration, max_consecutive_failures: u32) -> Self {
        let interval = Duration::from_std(poll_interval).unwrap_or_else(|_| Duration::minutes(5));
        Self {
            max_consecutive_failures,
            max_silence: interval * 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscalationReason {
    ConsecutiveFailures(u32),
    Stale { silent_for: Duration },
}

impl fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EscalationReason::ConsecutiveFailures(count) => {
                write!(f, "{} consecutive poll failures detected", count)
            }
            EscalationReason::Stale { silent_for } => write!(
                f,
                "alert monitoring offline: last successful check {} minutes ago",
                silent_for.num_minutes()
            ),
        }
    }
}

/// Evaluates both escalation triggers independently.
pub fn evaluate(
    snapshot: &PollSnapshot,
    thresholds: &HealthThresholds,
    now: DateTime<Utc>,
) -> Vec<EscalationReason> {
    let mut reasons = Vec::new();

    if snapshot.consecutive_failures >= thresholds.max_consecutive_failures {
        reasons.push(EscalationReason::ConsecutiveFailures(
            snapshot.consecutive_failures,
        ));
    }

    let silent_for = now - snapshot.last_successful_check;
    if silent_for > thresholds.max_silence {
        reasons.push(EscalationReason::Stale { silent_for });
    }

    reasons
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn thresholds() -> HealthThresholds {
        HealthThresholds::for_poll_interval(std::time::Duration::from_secs(300), 3)
    }

    #[test]
    fn test_new_state_is_healthy() {
        let state = PollState::new(now());
        assert_eq!(state.consecutive_failures(), 0);
        assert_eq!(state.last_successful_check(), now());
        assert!(evaluate(&state.snapshot(), &thresholds(), now()).is_empty());
    }

    #[test]
    fn test_failures_then_success_resets() {
        let state = PollState::new(now());
        assert_eq!(state.record_failure(), 1);
        assert_eq!(state.record_failure(), 2);
        let later = now() + Duration::minutes(10);
        state.record_success(later);
        assert_eq!(state.consecutive_failures(), 0);
        assert_eq!(state.last_successful_check(), later);
    }

    #[test]
    fn test_cycle_guard_is_exclusive() {
        let state = PollState::new(now());
        let guard = state.try_begin_cycle();
        assert!(guard.is_some());
        assert!(state.is_cycle_in_progress());
        assert!(state.try_begin_cycle().is_none());
        drop(guard);
        assert!(!state.is_cycle_in_progress());
        assert!(state.try_begin_cycle().is_some());
    }

    #[test]
    fn test_thresholds_double_the_poll_interval() {
        assert_eq!(thresholds().max_silence, Duration::minutes(10));
    }

    #[test]
    fn test_evaluate_consecutive_failures() {
        let state = PollState::new(now());
        state.record_failure();
        state.record_failure();
        assert!(evaluate(&state.snapshot(), &thresholds(), now()).is_empty());
        state.record_failure();
        assert_eq!(
            evaluate(&state.snapshot(), &thresholds(), now()),
            vec![EscalationReason::ConsecutiveFailures(3)]
        );
    }

    #[test]
    fn test_evaluate_stale() {
        let state = PollState::new(now());
        let at_limit = now() + Duration::minutes(10);
        assert!(evaluate(&state.snapshot(), &thresholds(), at_limit).is_empty());

        let past_limit = now() + Duration::minutes(11);
        let reasons = evaluate(&state.snapshot(), &thresholds(), past_limit);
        assert_eq!(reasons.len(), 1);
        assert!(matches!(reasons[0], EscalationReason::Stale { .. }));
        assert!(reasons[0].to_string().contains("11 minutes"));
    }

    #[test]
    fn test_evaluate_both_triggers() {
        let state = PollState::new(now());
        for _ in 0..4 {
            state.record_failure();
        }
        let reasons = evaluate(&state.snapshot(), &thresholds(), now() + Duration::hours(1));
        assert_eq!(reasons.len(), 2);
    }
}
