use chrono::{DateTime, Utc};
use nimbus_core::admins::AdminList;
use nimbus_core::health::{evaluate, EscalationReason, HealthThresholds, PollState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::format;
use crate::notify::Notifier;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub reasons: Vec<EscalationReason>,
    pub probe_ok: bool,
}

impl TickReport {
    pub fn escalated(&self) -> bool {
        !self.reasons.is_empty()
    }
}

/// Watches the poller's counters and escalates to administrators. Never
/// retries a poll itself.
pub struct HealthMonitor {
    state: Arc<PollState>,
    notifier: Arc<dyn Notifier>,
    admins: AdminList,
    target_channel: String,
    thresholds: HealthThresholds,
}

impl HealthMonitor {
    pub fn new(
        state: Arc<PollState>,
        notifier: Arc<dyn Notifier>,
        admins: AdminList,
        target_channel: impl Into<String>,
        thresholds: HealthThresholds,
    ) -> Self {
        Self {
            state,
            notifier,
            admins,
            target_channel: target_channel.into(),
            thresholds,
        }
    }

    pub async fn run(&self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; the poller has not run yet.
        ticker.tick().await;
        info!(period_secs = period.as_secs(), "health monitor started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.changed() => break,
            }
        }
        info!("health monitor stopped");
    }

    pub async fn tick(&self) -> TickReport {
        self.tick_at(Utc::now()).await
    }

    pub async fn tick_at(&self, now: DateTime<Utc>) -> TickReport {
        let snapshot = self.state.snapshot();
        debug!(
            consecutive_failures = snapshot.consecutive_failures,
            silent_secs = (now - snapshot.last_successful_check).num_seconds(),
            "health check"
        );

        let reasons = evaluate(&snapshot, &self.thresholds, now);
        if !reasons.is_empty() {
            for reason in &reasons {
                error!(reason = %reason, "critical: alert monitoring degraded");
            }
            self.escalate(&reasons, now).await;
        }

        let probe_ok = match self.notifier.probe().await {
            Ok(()) => true,
            Err(err) => {
                let failures = self.state.record_failure();
                warn!(error = %err, consecutive_failures = failures, "delivery platform probe failed");
                false
            }
        };

        TickReport { reasons, probe_ok }
    }

    async fn escalate(&self, reasons: &[EscalationReason], now: DateTime<Utc>) {
        let message = format::escalation_message(reasons, now - self.state.started_at(), now);
        for admin in self.admins.users() {
            if let Err(err) = self.notifier.post_message(admin, &message, None).await {
                warn!(admin = %admin, error = %err, "failed to send escalation");
            }
        }
        if let Err(err) = self
            .notifier
            .post_message(&self.target_channel, format::ESCALATION_CHANNEL_NOTICE, None)
            .await
        {
            warn!(channel = %self.target_channel, error = %err, "failed to post escalation notice");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::tests::RecordingNotifier;
    use chrono::{Duration as ChronoDuration, TimeZone};

    const CHANNEL: &str = "C_ALERTS";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 15, 0, 0).unwrap()
    }

    fn monitor(state: Arc<PollState>, notifier: Arc<RecordingNotifier>) -> HealthMonitor {
        HealthMonitor::new(
            state,
            notifier,
            AdminList::new(["U_ADMIN1", "U_ADMIN2"]),
            CHANNEL,
            HealthThresholds::for_poll_interval(Duration::from_secs(300), 3),
        )
    }

    #[tokio::test]
    async fn test_healthy_tick_sends_nothing() {
        let state = Arc::new(PollState::new(now()));
        let notifier = Arc::new(RecordingNotifier::default());
        let report = monitor(state.clone(), notifier.clone())
            .tick_at(now() + ChronoDuration::minutes(1))
            .await;
        assert!(!report.escalated());
        assert!(report.probe_ok);
        assert!(notifier.sent().is_empty());
        assert_eq!(state.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn test_three_failures_escalate_once_per_tick() {
        let state = Arc::new(PollState::new(now()));
        for _ in 0..3 {
            state.record_failure();
        }
        let notifier = Arc::new(RecordingNotifier::default());
        let monitor = monitor(state.clone(), notifier.clone());

        let report = monitor.tick_at(now()).await;
        assert_eq!(report.reasons, vec![EscalationReason::ConsecutiveFailures(3)]);
        assert_eq!(notifier.sent_to("U_ADMIN1").len(), 1);
        assert_eq!(notifier.sent_to("U_ADMIN2").len(), 1);
        assert_eq!(notifier.sent_to(CHANNEL).len(), 1);

        monitor.tick_at(now()).await;
        assert_eq!(notifier.sent_to("U_ADMIN1").len(), 2);
        assert_eq!(notifier.sent_to(CHANNEL).len(), 2);
    }

    #[tokio::test]
    async fn test_both_triggers_share_one_escalation() {
        let state = Arc::new(PollState::new(now()));
        for _ in 0..5 {
            state.record_failure();
        }
        let notifier = Arc::new(RecordingNotifier::default());

        let report = monitor(state, notifier.clone())
            .tick_at(now() + ChronoDuration::minutes(30))
            .await;
        assert_eq!(report.reasons.len(), 2);
        let dms = notifier.sent_to("U_ADMIN1");
        assert_eq!(dms.len(), 1);
        assert!(dms[0].text.contains("5 consecutive poll failures"));
        assert!(dms[0].text.contains("30 minutes ago"));
        assert!(dms[0].text.contains("Uptime: 30 minutes"));
    }

    #[tokio::test]
    async fn test_stale_poller_escalates() {
        let state = Arc::new(PollState::new(now()));
        let notifier = Arc::new(RecordingNotifier::default());
        let report = monitor(state, notifier.clone())
            .tick_at(now() + ChronoDuration::minutes(11))
            .await;
        assert!(matches!(report.reasons[..], [EscalationReason::Stale { .. }]));
        assert_eq!(notifier.sent_to(CHANNEL).len(), 1);
    }

    #[tokio::test]
    async fn test_probe_failure_counts_as_poll_failure() {
        let state = Arc::new(PollState::new(now()));
        let notifier = Arc::new(RecordingNotifier::default());
        notifier.fail_probe();
        let monitor = monitor(state.clone(), notifier.clone());

        let report = monitor.tick_at(now()).await;
        assert!(!report.probe_ok);
        assert!(!report.escalated());
        assert_eq!(state.consecutive_failures(), 1);

        monitor.tick_at(now()).await;
        monitor.tick_at(now()).await;
        let report = monitor.tick_at(now()).await;
        assert_eq!(report.reasons, vec![EscalationReason::ConsecutiveFailures(3)]);
    }

    #[tokio::test]
    async fn test_escalation_survives_delivery_errors() {
        let state = Arc::new(PollState::new(now()));
        for _ in 0..3 {
            state.record_failure();
        }
        let notifier = Arc::new(RecordingNotifier::default());
        notifier.fail_target("U_ADMIN1");

        let report = monitor(state, notifier.clone()).tick_at(now()).await;
        assert!(report.escalated());
        assert_eq!(notifier.sent_to("U_ADMIN2").len(), 1);
        assert_eq!(notifier.sent_to(CHANNEL).len(), 1);
    }
}
