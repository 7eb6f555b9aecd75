//! Cancellable periodic ticks.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tracing::debug;

/// A periodic tick source backed by a spawned task.
///
/// The task stops when the ticker is cancelled or dropped.
#[derive(Debug)]
pub struct Ticker {
    period: Duration,
    rx: mpsc::Receiver<Instant>,
    handle: JoinHandle<()>,
}

impl Ticker {
    /// Starts ticking every `period`, first tick one period from now.
    pub fn every(period: Duration) -> Self {
        let (tx, rx) = mpsc::channel(1);
        let handle = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                let at = interval.tick().await;
                if tx.send(at).await.is_err() {
                    break;
                }
            }
        });
        Self { period, rx, handle }
    }

    /// The tick period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Waits for the next tick. `None` once cancelled.
    pub async fn tick(&mut self) -> Option<Instant> {
        self.rx.recv().await
    }

    /// Stops the ticker.
    pub fn cancel(&mut self) {
        debug!(period_ms = self.period.as_millis() as u64, "Ticker cancelled");
        self.handle.abort();
        self.rx.close();
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
