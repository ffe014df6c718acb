//! Drives poll cycles on a fixed cadence.
//!
//! The next cycle starts `interval` after the previous one completed, so cycles
//! never overlap however long one takes. Cancellation is observed between
//! cycles only; a cycle in flight runs to completion before the coordinator is
//! shut down.

use tokio::sync::watch;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::PollSettings;
use crate::coordinator::PollCoordinator;
use crate::error::UpdateFailed;
use crate::resolver::{DeviceResolver, StaleConnectionReclaimer};
use crate::session::MowerSession;
use crate::sink::SnapshotSink;

/// How the device looks to consumers after the latest cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollStatus {
    /// False until the first success, and after `unavailable_after`
    /// consecutive failures.
    pub available: bool,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub cycles: u64,
}

pub struct Scheduler {
    interval: Duration,
    unavailable_after: u32,
    status: watch::Sender<PollStatus>,
}

impl Scheduler {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

    pub fn new(interval: Duration, unavailable_after: u32) -> Self {
        let (status, _) = watch::channel(PollStatus::default());
        Self {
            interval,
            unavailable_after: unavailable_after.max(1),
            status,
        }
    }

    pub fn from_settings(settings: &PollSettings) -> Self {
        Self::new(settings.interval(), settings.unavailable_after)
    }

    pub fn status(&self) -> watch::Receiver<PollStatus> {
        self.status.subscribe()
    }

    /// Poll until `cancel` fires, then shut the coordinator down.
    pub async fn run<S, R, C>(
        &self,
        coordinator: &PollCoordinator<S, R, C>,
        sink: &dyn SnapshotSink,
        cancel: CancellationToken,
    ) where
        S: MowerSession,
        R: DeviceResolver<Handle = S::Handle>,
        C: StaleConnectionReclaimer,
    {
        while !cancel.is_cancelled() {
            match coordinator.run_cycle().await {
                Ok(snapshot) => {
                    sink.consume(&snapshot);
                    self.record_success();
                }
                Err(UpdateFailed::ShutDown) => break,
                Err(err) => self.record_failure(&err),
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = sleep(self.interval) => {}
            }
        }

        coordinator.shutdown().await;
    }

    fn record_success(&self) {
        self.status.send_modify(|status| {
            if !status.available && status.consecutive_failures > 0 {
                info!("Fetching data recovered");
            }
            status.available = true;
            status.consecutive_failures = 0;
            status.last_error = None;
            status.cycles += 1;
        });
    }

    fn record_failure(&self, err: &UpdateFailed) {
        let unavailable_after = self.unavailable_after;
        self.status.send_modify(|status| {
            status.consecutive_failures += 1;
            status.last_error = Some(err.to_string());
            status.cycles += 1;
            if status.consecutive_failures >= unavailable_after {
                if status.available {
                    error!("Error fetching data: {err}");
                }
                status.available = false;
            } else {
                warn!("Error fetching data: {err}");
            }
        });
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INTERVAL, 1)
    }
}
