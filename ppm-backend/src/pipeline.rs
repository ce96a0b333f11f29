//! Worker pool and statistics.
//!
//! Each worker owns one [`MessageHandler`] (its own PRNG and scratch
//! document) and processes its channel strictly one message at a time, so
//! output order matches input order per worker. The quad, velocity bounds,
//! and partII field list are shared read-only. Shutdown is cooperative: the
//! watch flag is checked between messages, and an in-flight message is
//! always finished before a worker exits.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Duration};
use tracing::{debug, info};

use crate::handler::{MessageHandler, ResultStatus};

// ── Statistics ────────────────────────────────────────────────────────────────

/// Pipeline counters, shared across workers.
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub received: AtomicU64,
    pub forwarded: AtomicU64,
    pub suppressed_speed: AtomicU64,
    pub suppressed_geofence: AtomicU64,
    pub parse_errors: AtomicU64,
    pub missing_errors: AtomicU64,
    pub other_errors: AtomicU64,
}

impl PipelineStats {
    fn record(&self, result: ResultStatus) {
        let counter = match result {
            ResultStatus::Success => &self.forwarded,
            ResultStatus::Speed => &self.suppressed_speed,
            ResultStatus::Geoposition => &self.suppressed_geofence,
            ResultStatus::Parse => &self.parse_errors,
            ResultStatus::Missing => &self.missing_errors,
            ResultStatus::Other => &self.other_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn log_summary(&self) {
        info!(
            received = self.received.load(Ordering::Relaxed),
            forwarded = self.forwarded.load(Ordering::Relaxed),
            speed = self.suppressed_speed.load(Ordering::Relaxed),
            geofence = self.suppressed_geofence.load(Ordering::Relaxed),
            parse = self.parse_errors.load(Ordering::Relaxed),
            missing = self.missing_errors.load(Ordering::Relaxed),
            other = self.other_errors.load(Ordering::Relaxed),
            "pipeline totals",
        );
    }
}

// ── Worker ────────────────────────────────────────────────────────────────────

/// Consume messages until shutdown or channel close, forwarding accepted
/// rewrites to the producer channel.
pub async fn worker_loop(
    worker: usize,
    mut handler: MessageHandler,
    mut rx: mpsc::Receiver<String>,
    producer_tx: mpsc::Sender<String>,
    stats: Arc<PipelineStats>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            message = rx.recv() => {
                let Some(raw) = message else { break };

                stats.received.fetch_add(1, Ordering::Relaxed);
                let forward = handler.process(&raw);
                stats.record(handler.result());

                if forward {
                    if producer_tx.send(handler.json().to_string()).await.is_err() {
                        break;
                    }
                } else {
                    debug!(
                        worker,
                        result = %handler.result(),
                        "message suppressed: {}",
                        handler.bsm()
                    );
                }
            }
        }
    }

    debug!(worker, "worker stopped");
}

// ── Periodic reporting ────────────────────────────────────────────────────────

/// Log pipeline totals every `period` until shutdown.
pub async fn stats_loop(
    stats: Arc<PipelineStats>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    // The first tick fires immediately; skip it.
    ticker.tick().await;

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => stats.log_summary(),
        }
    }
}
