use std::time::Duration;

use murmur_store::ErrorKind;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::engine::SyncEngine;

/// Why the poll loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollExit {
    Stopped,
    /// A tick failed with `Unauthorized`; polling again cannot succeed.
    Unauthorized,
}

struct PollerState {
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<PollExit>,
}

/// Fixed-interval driver for [`SyncEngine::refresh`].
///
/// Each refresh is awaited inside the loop and the ticker restarts once it
/// resolves, so a tick that came due during a slow refresh is dropped and the
/// next one is a full interval later.
pub struct PollScheduler {
    poller: Option<PollerState>,
}

impl PollScheduler {
    pub fn start(engine: SyncEngine, interval: Duration) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::debug!(interval_ms = interval.as_millis() as u64, "poll scheduler started");

            loop {
                tokio::select! {
                    _ = &mut stop_rx => return PollExit::Stopped,
                    _ = ticker.tick() => {}
                }

                let outcome = tokio::select! {
                    _ = &mut stop_rx => return PollExit::Stopped,
                    outcome = engine.refresh() => outcome,
                };

                if outcome.failure() == Some(ErrorKind::Unauthorized) {
                    tracing::warn!("poll scheduler stopping after unauthorized response");
                    return PollExit::Unauthorized;
                }
                ticker.reset();
            }
        });

        Self {
            poller: Some(PollerState {
                stop_tx: Some(stop_tx),
                task,
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.poller
            .as_ref()
            .is_some_and(|poller| !poller.task.is_finished())
    }

    /// Stops the loop, dropping any refresh still in flight, and reports how it ended.
    pub async fn stop(&mut self) -> Option<PollExit> {
        let mut poller = self.poller.take()?;
        if let Some(stop_tx) = poller.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        match poller.task.await {
            Ok(exit) => {
                tracing::debug!(?exit, "poll scheduler stopped");
                Some(exit)
            }
            Err(error) => {
                tracing::warn!(error = %error, "poll scheduler task join failed");
                None
            }
        }
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.task.abort();
        }
    }
}
