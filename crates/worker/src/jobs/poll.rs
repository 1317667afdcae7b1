use chrono::{DateTime, Utc};
use nimbus_core::admins::AdminList;
use nimbus_core::health::PollState;
use nimbus_core::types::{Alert, Subscription};
use nimbus_core::{Error, Result};
use nimbus_db::queries::{processed_alerts, subscriptions};
use nimbus_db::SharedStore;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::feed::FeedSource;
use crate::format;
use crate::notify::Notifier;

/// Outcome of one pass over the active subscriptions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub checked: usize,
    pub failed: usize,
    /// Alert ids delivered this cycle, in delivery order.
    pub delivered: Vec<String>,
}

impl CycleReport {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

pub struct Poller {
    store: SharedStore,
    feeds: Arc<dyn FeedSource>,
    notifier: Arc<dyn Notifier>,
    state: Arc<PollState>,
    admins: AdminList,
    target_channel: String,
    fetch_timeout: Duration,
}

impl Poller {
    pub fn new(
        store: SharedStore,
        feeds: Arc<dyn FeedSource>,
        notifier: Arc<dyn Notifier>,
        state: Arc<PollState>,
        admins: AdminList,
        target_channel: impl Into<String>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            store,
            feeds,
            notifier,
            state,
            admins,
            target_channel: target_channel.into(),
            fetch_timeout,
        }
    }

    /// Runs a cycle now and then once per `period` until `shutdown` flips.
    pub async fn run(&self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(period_secs = period.as_secs(), "alert poller started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
                _ = shutdown.changed() => break,
            }
        }
        info!("alert poller stopped");
    }

    pub async fn run_cycle(&self) -> Option<CycleReport> {
        self.run_cycle_at(Utc::now()).await
    }

    /// Returns `None` when another cycle is still running.
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> Option<CycleReport> {
        let Some(_guard) = self.state.try_begin_cycle() else {
            warn!("previous poll cycle still running, skipping");
            return None;
        };
        let started = Instant::now();

        let report = match self.check_all(now).await {
            Ok(report) => report,
            Err(err) => {
                error!(error = %err, "poll cycle could not load its state");
                CycleReport {
                    failed: 1,
                    ..Default::default()
                }
            }
        };

        if report.is_success() {
            self.state.record_success(now);
        } else {
            let failures = self.state.record_failure();
            warn!(consecutive_failures = failures, failed = report.failed, "poll cycle had failures");
        }

        info!(
            checked = report.checked,
            failed = report.failed,
            delivered = report.delivered.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "poll cycle complete"
        );
        Some(report)
    }

    async fn check_all(&self, now: DateTime<Utc>) -> Result<CycleReport> {
        let active = subscriptions::list_active(self.store.as_ref()).await?;
        let mut processed = processed_alerts::load(self.store.as_ref(), now).await?;
        let mut report = CycleReport::default();

        for subscription in &active {
            match self
                .check_subscription(subscription, &mut processed, &mut report, now)
                .await
            {
                Ok(()) => report.checked += 1,
                Err(err) => {
                    report.failed += 1;
                    warn!(
                        subscription_id = %subscription.id,
                        url = %subscription.url,
                        error = %err,
                        "subscription check failed"
                    );
                }
            }
        }

        Ok(report)
    }

    async fn check_subscription(
        &self,
        subscription: &Subscription,
        processed: &mut HashSet<String>,
        report: &mut CycleReport,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let alerts = tokio::time::timeout(self.fetch_timeout, self.feeds.fetch_alerts(&subscription.url))
            .await
            .map_err(|_| {
                Error::Transport(format!(
                    "fetching {} timed out after {}s",
                    subscription.url,
                    self.fetch_timeout.as_secs()
                ))
            })??;

        let mut last_delivered = None;
        for alert in &alerts {
            if processed.contains(&alert.id) {
                continue;
            }
            self.deliver(alert, subscription).await?;
            processed_alerts::mark_processed(self.store.as_ref(), &alert.id, now).await?;
            processed.insert(alert.id.clone());
            report.delivered.push(alert.id.clone());
            last_delivered = Some(alert.id.as_str());
            info!(alert_id = %alert.id, event = alert.headline(), subscription_id = %subscription.id, "alert delivered");
        }

        subscriptions::record_check(self.store.as_ref(), &subscription.id, last_delivered, now).await
    }

    async fn deliver(&self, alert: &Alert, subscription: &Subscription) -> Result<()> {
        self.notifier
            .post_message(
                &self.target_channel,
                &format::alert_text(alert),
                Some(format::alert_blocks(alert, subscription)),
            )
            .await?;

        if alert.is_severe() {
            self.notify_admins(alert, subscription).await;
        }
        Ok(())
    }

    async fn notify_admins(&self, alert: &Alert, subscription: &Subscription) {
        let notice = format::admin_notice(alert, subscription);
        for admin in self.admins.users() {
            if let Err(err) = self.notifier.post_message(admin, &notice, None).await {
                warn!(admin = %admin, alert_id = %alert.id, error = %err, "failed to notify admin");
            }
        }
    }
}
