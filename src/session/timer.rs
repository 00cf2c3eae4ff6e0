//! Owned, cancellable timer tasks.
//!
//! A [`ScheduledTask`] delivers a message to the controller's internal
//! channel after a delay (or every period). Dropping or cancelling the task
//! stops further deliveries; messages already queued are filtered by the
//! controller using the epoch it stamped them with.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

pub struct ScheduledTask {
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Deliver `make()` once, after `delay`.
    pub fn once<M, F>(delay: Duration, tx: mpsc::UnboundedSender<M>, make: F) -> Self
    where
        M: Send + 'static,
        F: FnOnce() -> M + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            time::sleep(delay).await;
            let _ = tx.send(make());
        });
        Self { handle }
    }

    /// Deliver `make()` every `period`, first after one full period.
    pub fn repeating<M, F>(period: Duration, tx: mpsc::UnboundedSender<M>, make: F) -> Self
    where
        M: Send + 'static,
        F: Fn() -> M + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tx.send(make()).is_err() {
                    break;
                }
            }
        });
        Self { handle }
    }

    pub fn cancel(self) {
        self.handle.abort();
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
