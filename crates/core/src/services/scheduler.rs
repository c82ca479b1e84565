//! Poll expiration scheduler.
//!
//! Each tick runs two scans: polls whose deadline has passed are closed, then
//! members of rooms with polls ending inside the warning window are reminded.
//! Both scans go through [`PollService`], so closure happens at most once no
//! matter how many ticks or requests observe the same lapsed poll.

use std::time::Duration;

use chrono::{DateTime, Utc};
use pollroom_common::SchedulerConfig;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info};

use crate::services::poll::PollService;

/// Timing for the scheduler.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerSettings {
    /// Time between ticks.
    pub tick_interval: Duration,
    /// Look-ahead window for "expiring soon" reminders.
    pub expiry_warning: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(10),
            expiry_warning: Duration::from_secs(300),
        }
    }
}

impl From<&SchedulerConfig> for SchedulerSettings {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            tick_interval: Duration::from_secs(config.tick_interval_secs.max(1)),
            expiry_warning: Duration::from_secs(config.expiry_warning_secs),
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Polls closed by this tick.
    pub closed: usize,
    /// Reminders sent by this tick.
    pub warned: usize,
}

/// Background driver for poll deadlines.
#[derive(Clone)]
pub struct PollScheduler {
    polls: PollService,
    settings: SchedulerSettings,
}

impl PollScheduler {
    #[must_use]
    pub const fn new(polls: PollService, settings: SchedulerSettings) -> Self {
        Self { polls, settings }
    }

    /// Run both scans once. A failed scan is logged and counts as zero; it
    /// never stops the other scan.
    pub async fn tick(&self, now: DateTime<Utc>) -> TickReport {
        let closed = self.polls.close_expired(now).await.unwrap_or_else(|e| {
            error!(error = %e, "Expired poll scan failed");
            0
        });

        let window = chrono::Duration::from_std(self.settings.expiry_warning)
            .unwrap_or_else(|_| chrono::Duration::minutes(5));
        let warned = self
            .polls
            .warn_expiring(now, window)
            .await
            .unwrap_or_else(|e| {
                error!(error = %e, "Expiring poll scan failed");
                0
            });

        TickReport { closed, warned }
    }

    /// Tick forever. Failures are retried on the next tick.
    pub async fn run(self) {
        let mut interval = interval(self.settings.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            tick_secs = self.settings.tick_interval.as_secs(),
            warning_secs = self.settings.expiry_warning.as_secs(),
            "Poll scheduler started"
        );

        loop {
            interval.tick().await;
            let report = self.tick(Utc::now()).await;
            if report.closed > 0 {
                info!(count = report.closed, "Closed expired polls");
            }
            if report.warned > 0 {
                debug!(count = report.warned, "Sent expiry reminders");
            }
        }
    }
}
