//! Sweeper - 期限切れ lease と yield の回収
//!
//! # フロー
//! 1. TaskStore::release_yielded() で yield 済みのタスクを ready に戻す
//! 2. TaskStore::reclaim_expired() で deadline を過ぎたタスクを ready に戻す（timeout を履歴に追加）
//!
//! 失敗はログに残して次の tick で再試行する。ループ自体は止めない。

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, debug, info, warn};

use crate::config::SweeperConfig;
use crate::error::LeaseError;
use crate::ports::{Clock, TaskStore};

/// Ids of the tasks one pass put back to ready.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Yielded tasks that were released.
    pub released: Vec<String>,
    /// Tasks whose lease had expired.
    pub timed_out: Vec<String>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.released.is_empty() && self.timed_out.is_empty()
    }
}

#[derive(Clone)]
pub struct Sweeper {
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    config: SweeperConfig,
}

impl Sweeper {
    pub fn new(store: Arc<dyn TaskStore>, clock: Arc<dyn Clock>, config: SweeperConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Run a single pass.
    pub async fn sweep_once(&self) -> Result<SweepReport, LeaseError> {
        let now = self.clock.now();
        let released = self.store.release_yielded(now).await?;
        let timed_out = self.store.reclaim_expired(now).await?;

        let report = SweepReport {
            released: released.into_iter().map(|task| task.id).collect(),
            timed_out: timed_out.into_iter().map(|task| task.id).collect(),
        };
        if report.is_empty() {
            debug!("sweep found nothing to reclaim");
        } else {
            info!(
                released = ?report.released,
                timed_out = ?report.timed_out,
                "tasks returned to ready"
            );
        }
        Ok(report)
    }

    /// Run passes every `interval` on a background task until shut down.
    /// The task inherits the caller's current span.
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(sweep_loop(self, shutdown_rx).in_current_span());
        SweeperHandle { shutdown_tx, join }
    }
}

/// Background sweeper handle.
/// - `shutdown_tx` を drop してもループは止まる
/// - `shutdown_and_join()` で終了を待てる
pub struct SweeperHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop after the pass in flight, if any.
    pub fn request_shutdown(&self) {
        // ignore send error: the loop may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        if let Err(e) = self.join.await {
            warn!(error = %e, "sweeper task ended abnormally");
        }
    }
}

async fn sweep_loop(sweeper: Sweeper, mut shutdown_rx: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(sweeper.config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval = ?sweeper.config.interval, "sweeper started");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        if let Err(e) = sweeper.sweep_once().await {
            warn!(error = %e, "sweep failed, retrying next tick");
        }
    }
    info!("sweeper stopped");
}
