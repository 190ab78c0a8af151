//! Background Expiry Sweeper
//!
//! This module implements "active expiry": a background task that removes
//! keys once their `PX` deadline passes, whether or not anyone reads them
//! again. Reads still perform "lazy expiry" on their own.
//!
//! ## Design
//!
//! The sweeper runs as a Tokio task and:
//! 1. Sleeps until the earliest pending deadline (bounded by `max_interval`)
//! 2. Wakes early if a `SET` schedules an even earlier deadline
//! 3. Removes every key whose deadline has passed and whose entry was not
//!    overwritten since the deadline was scheduled
//!
//! All removals go through the storage engine's lock, the same one client
//! commands use.

use crate::storage::StorageEngine;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, trace};

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Longest the sweeper sleeps when no deadline is closer (default: 1s)
    pub max_interval: Duration,

    /// Shortest sleep between two sweeps (default: 1ms)
    pub min_interval: Duration,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            max_interval: Duration::from_secs(1),
            min_interval: Duration::from_millis(1),
        }
    }
}

impl ExpiryConfig {
    /// How long to sleep before the next sweep.
    fn wait_for(&self, next_deadline: Option<Instant>, now: Instant) -> Duration {
        next_deadline
            .map(|at| at.saturating_duration_since(now))
            .unwrap_or(self.max_interval)
            .min(self.max_interval)
            .max(self.min_interval)
    }
}

/// A handle to the running expiry sweeper.
///
/// When this handle is dropped, the sweeper task will be stopped.
#[derive(Debug)]
pub struct ExpirySweeper {
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Starts the expiry sweeper as a background task.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use respkv::storage::{StorageEngine, ExpirySweeper, ExpiryConfig};
    /// use std::sync::Arc;
    ///
    /// let engine = Arc::new(StorageEngine::new());
    /// let sweeper = ExpirySweeper::start(engine, ExpiryConfig::default());
    ///
    /// // Dropping the sweeper will stop it
    /// drop(sweeper);
    /// ```
    pub fn start(engine: Arc<StorageEngine>, config: ExpiryConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(sweeper_loop(engine, config, shutdown_rx));

        info!("Background expiry sweeper started");

        Self { shutdown_tx }
    }

    /// Stops the expiry sweeper.
    ///
    /// This is called automatically when the handle is dropped.
    pub fn stop(&self) {
        if !*self.shutdown_tx.borrow() {
            let _ = self.shutdown_tx.send(true);
            info!("Background expiry sweeper stopped");
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sweeper_loop(
    engine: Arc<StorageEngine>,
    config: ExpiryConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let wait = config.wait_for(engine.next_deadline(), Instant::now());

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = engine.deadline_added() => {
                trace!("Earlier deadline scheduled, re-arming sweeper");
            }
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiry sweeper received shutdown signal");
                    return;
                }
            }
        }

        let expired = engine.expire_due(Instant::now());

        if expired > 0 {
            debug!(
                expired = expired,
                keys_remaining = engine.len(),
                "Expired keys removed"
            );
        }
    }
}

/// Starts the expiry sweeper with default configuration.
pub fn start_expiry_sweeper(engine: Arc<StorageEngine>) -> ExpirySweeper {
    ExpirySweeper::start(engine, ExpiryConfig::default())
}
