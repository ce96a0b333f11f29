//! Privacy Protection Module entry point.
//!
//! Startup wiring, in order:
//!   1. Load the `key=value` configuration file named on the command line.
//!   2. Build the geofence quad from the configured map file and world
//!      bounds (configuration problems abort startup with a diagnostic).
//!   3. Load the partII redaction field list from the environment.
//!   4. Spawn the bus ingest task, N message workers, the producer task,
//!      and the periodic stats reporter.
//!   5. Wait for ctrl-c, flip the shutdown flag, and drain everything.

mod bus;
mod config;
mod handler;
mod pipeline;
mod redaction_properties;
mod redactor;
mod velocity;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::{mpsc, watch};
use tracing::info;

use cv_geo::{Point, QuadConfig, QuadTree};

use bus::BusConfig;
use config::ConfigMap;
use handler::MessageHandler;
use pipeline::PipelineStats;
use redaction_properties::RedactionProperties;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "ppm", about = "Privacy Protection Module for connected-vehicle telemetry")]
struct Args {
    /// Configuration file (key=value lines)
    #[arg(short, long)]
    config: String,

    /// Number of message workers
    #[arg(short, long, default_value_t = 2)]
    workers: usize,
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ppm=info,cv_geo=info".into()),
        )
        .init();

    let args = Args::parse();
    info!("🛡 PPM v{} starting", env!("CARGO_PKG_VERSION"));

    let conf = config::load_config(&args.config)?;

    // The reference deployment names its bus topics in the same file; they
    // are surfaced here so operators can cross-check the wiring.
    if let (Some(consumer), Some(producer)) =
        (conf.get("privacy.topic.consumer"), conf.get("privacy.topic.producer"))
    {
        let partition = conf
            .get("privacy.kafka.partition")
            .map(String::as_str)
            .unwrap_or("unassigned");
        info!("configured topics: {consumer} -> {producer} (partition {partition})");
    }

    let quad = build_quad(&conf)?;
    let redaction_fields = Arc::new(RedactionProperties::from_env());

    let workers = args.workers.max(1);

    let bus_config = BusConfig::default();
    let consumer_socket = bus::bind_consumer(&bus_config).await?;
    let producer_socket = bus::bind_producer(&bus_config).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (producer_tx, producer_rx) = mpsc::channel::<String>(256);
    let stats = Arc::new(PipelineStats::default());

    let mut worker_txs = Vec::with_capacity(workers);
    let mut worker_handles = Vec::with_capacity(workers);
    for worker in 0..workers {
        let (tx, rx) = mpsc::channel::<String>(256);
        worker_txs.push(tx);

        let message_handler =
            MessageHandler::new(Arc::clone(&quad), Arc::clone(&redaction_fields), &conf)?;
        worker_handles.push(tokio::spawn(pipeline::worker_loop(
            worker,
            message_handler,
            rx,
            producer_tx.clone(),
            Arc::clone(&stats),
            shutdown_rx.clone(),
        )));
    }
    // The workers hold the only remaining producer senders, so the produce
    // loop ends once they all stop.
    drop(producer_tx);

    let ingest_handle =
        tokio::spawn(bus::ingest_loop(consumer_socket, worker_txs, shutdown_rx.clone()));
    let produce_handle = tokio::spawn(bus::produce_loop(producer_socket, producer_rx));
    let stats_handle =
        tokio::spawn(pipeline::stats_loop(Arc::clone(&stats), Duration::from_secs(10), shutdown_rx));

    info!("🚦 {workers} workers running; ctrl-c to stop");
    tokio::signal::ctrl_c().await.context("failed waiting for the shutdown signal")?;
    info!("shutdown signal received");

    let _ = shutdown_tx.send(true);

    let _ = ingest_handle.await;
    for handle in worker_handles {
        let _ = handle.await;
    }
    let _ = produce_handle.await;
    let _ = stats_handle.await;

    stats.log_summary();
    info!("PPM stopped");
    Ok(())
}

// ── Geofence construction ─────────────────────────────────────────────────────

fn build_quad(conf: &ConfigMap) -> Result<Arc<QuadTree>> {
    if !config::flag_on(conf, "privacy.filter.geofence") {
        // The handlers never query the quad with the filter off, but they
        // still share one; cover the whole valid coordinate range.
        return Ok(Arc::new(QuadTree::new(
            Point::new(-84.0, -179.999),
            Point::new(80.0, 179.999),
            QuadConfig::default(),
        )));
    }

    let sw = Point::new(
        config::require_f64(conf, "privacy.filter.geofence.sw.lat")?,
        config::require_f64(conf, "privacy.filter.geofence.sw.lon")?,
    );
    let ne = Point::new(
        config::require_f64(conf, "privacy.filter.geofence.ne.lat")?,
        config::require_f64(conf, "privacy.filter.geofence.ne.lon")?,
    );
    let mapfile = config::require(conf, "privacy.filter.geofence.mapfile")?;

    let shapes = cv_geo::read_shapes(mapfile)
        .with_context(|| format!("could not load geofence map {mapfile}"))?;

    let mut quad = QuadTree::new(sw, ne, QuadConfig::default());
    for shape in shapes.shapes() {
        quad.insert(shape);
    }

    info!(
        edges = shapes.edges.len(),
        circles = shapes.circles.len(),
        grids = shapes.grids.len(),
        nodes = quad.node_count(),
        "geofence index built"
    );

    Ok(Arc::new(quad))
}
