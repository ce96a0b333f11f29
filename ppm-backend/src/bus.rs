//! Message-bus adapter.
//!
//! The decision engine only sees two seams: a stream of raw inbound
//! messages and a sink for accepted ones. This module binds those seams to
//! UDP datagrams, one JSON message per datagram: an ingest task fans
//! messages out to the workers round-robin, and an egress task forwards
//! accepted messages to the downstream address. Bus errors are logged and
//! never crash the pipeline.

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

// ── Configuration ─────────────────────────────────────────────────────────────

pub struct BusConfig {
    /// Address the consumer socket binds (default 0.0.0.0:5556).
    pub consumer_addr: String,
    /// Address accepted messages are sent to (default 127.0.0.1:5557).
    pub producer_addr: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            consumer_addr: std::env::var("PPM_CONSUMER_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:5556".to_string()),
            producer_addr: std::env::var("PPM_PRODUCER_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:5557".to_string()),
        }
    }
}

// ── Ingest ────────────────────────────────────────────────────────────────────

/// Bind the consumer socket. Failing to bind is a startup error, so this
/// runs before any task is spawned.
pub async fn bind_consumer(config: &BusConfig) -> anyhow::Result<UdpSocket> {
    let socket = UdpSocket::bind(&config.consumer_addr).await?;
    info!("consuming messages on udp {}", config.consumer_addr);
    Ok(socket)
}

/// Bind and connect the producer socket.
pub async fn bind_producer(config: &BusConfig) -> anyhow::Result<UdpSocket> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect(&config.producer_addr).await?;
    info!("producing messages to udp {}", config.producer_addr);
    Ok(socket)
}

/// Receive datagrams and dispatch them to the workers round-robin, which
/// preserves ordering within each worker. Ends on shutdown.
pub async fn ingest_loop(
    socket: UdpSocket,
    worker_txs: Vec<mpsc::Sender<String>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut buf = vec![0u8; 65536];
    let mut next_worker = 0usize;

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            received = socket.recv_from(&mut buf) => {
                let (len, src) = match received {
                    Ok(r) => r,
                    Err(e) => {
                        // Never crash on a bad datagram.
                        warn!("udp recv error: {e}");
                        continue;
                    }
                };

                let raw = match std::str::from_utf8(&buf[..len]) {
                    Ok(s) => s.to_string(),
                    Err(_) => {
                        debug!("non-utf8 datagram from {src} dropped");
                        continue;
                    }
                };

                let target = &worker_txs[next_worker % worker_txs.len()];
                next_worker = next_worker.wrapping_add(1);

                if target.send(raw).await.is_err() {
                    // Worker is gone; the pipeline is coming down.
                    break;
                }
            }
        }
    }

    debug!("ingest loop stopped");
}

// ── Egress ────────────────────────────────────────────────────────────────────

/// Forward accepted messages downstream. Runs until every worker sender is
/// dropped, which drains anything still queued during shutdown.
pub async fn produce_loop(socket: UdpSocket, mut rx: mpsc::Receiver<String>) {
    while let Some(message) = rx.recv().await {
        if let Err(e) = socket.send(message.as_bytes()).await {
            warn!("udp send error, message dropped: {e}");
        }
    }

    debug!("produce loop stopped");
}
