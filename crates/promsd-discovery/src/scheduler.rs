//! Periodic refresh driver.
//!
//! ```text
//! Idle --run--> Running --tick--> Running --cancel--> Stopped
//! ```
//!
//! The first cycle starts immediately; later ones follow the interval.
//! Snapshots go out over a channel, so writing them never holds up the
//! timer. Dropping the sender on exit is what tells the consumer the
//! stream is over.

use crate::discovery::Discovery;
use promsd_core::Snapshot;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Shortest refresh interval; a zero interval is raised to this.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Lifecycle of a [`Scheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Created, not yet started
    Idle,
    /// Refreshing on every tick
    Running,
    /// Terminal; no further cycles
    Stopped,
}

pub struct Scheduler {
    discovery: Discovery,
    interval: Duration,
    state: SchedulerState,
    cycles: u64,
}

impl Scheduler {
    pub fn new(discovery: Discovery, interval: Duration) -> Self {
        let interval = if interval.is_zero() {
            warn!(interval = ?MIN_INTERVAL, "Zero refresh interval, using minimum");
            MIN_INTERVAL
        } else {
            interval
        };

        Self {
            discovery,
            interval,
            state: SchedulerState::Idle,
            cycles: 0,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of refresh cycles started so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    fn transition(&mut self, next: SchedulerState) {
        debug!(from = ?self.state, to = ?next, "Scheduler state change");
        self.state = next;
    }

    /// Runs until `token` is cancelled or the receiving side goes away.
    ///
    /// A cycle interrupted by cancellation is abandoned without being
    /// forwarded. `snapshots` is dropped on return.
    pub async fn run(&mut self, snapshots: mpsc::Sender<Snapshot>, token: CancellationToken) {
        if self.state != SchedulerState::Idle {
            return;
        }

        info!(
            interval = ?self.interval,
            queries = self.discovery.plans().len(),
            "Starting discovery"
        );
        self.transition(SchedulerState::Running);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            self.cycles += 1;
            debug!(cycle = self.cycles, "Refresh cycle started");
            let report = self.discovery.refresh_all(&token).await;
            if token.is_cancelled() {
                debug!(cycle = self.cycles, "Abandoning cycle after cancellation");
                break;
            }

            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                sent = snapshots.send(report.snapshot) => {
                    if sent.is_err() {
                        debug!("Snapshot consumer closed");
                        break;
                    }
                }
            }
        }

        self.transition(SchedulerState::Stopped);
        info!(cycles = self.cycles, "Discovery stopped");
    }
}
