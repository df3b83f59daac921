use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Default interval between keepalive probes.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Periodic keepalive timer for one open stream connection.
///
/// Created when a connection opens and dropped when it closes, so a
/// connection owns at most one running timer. The first tick fires one
/// full period after creation.
pub struct KeepaliveTimer {
    interval: Interval,
    period: Duration,
}

impl KeepaliveTimer {
    pub fn start(period: Duration) -> Self {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval, period }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Wait for the next probe to be due. Cancel-safe.
    pub async fn tick(&mut self) {
        self.interval.tick().await;
    }
}
