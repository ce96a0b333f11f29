//! bsm-sim — randomized telemetry generator.
//!
//! Sends synthetic BSM (and occasional TIM) JSON messages to the PPM's
//! consumer socket at a configurable rate. A tunable share of the traffic
//! is deliberately out of policy (positions far outside the fence, speeds
//! outside the plausible interval, truncated JSON) so every decision path
//! of the module gets exercised in a live run.

use std::time::Duration;

use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use tokio::net::UdpSocket;
use tokio::time::interval;
use tracing::{info, warn};

use cv_geo::Point;

const BSM_PAYLOAD_TYPE: &str = "us.dot.its.jpo.ode.model.OdeBsmPayload";
const TIM_PAYLOAD_TYPE: &str = "us.dot.its.jpo.ode.model.OdeTimPayload";

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "bsm-sim", about = "BSM traffic generator for the privacy module")]
struct Args {
    /// PPM consumer address
    #[arg(long, default_value = "127.0.0.1:5556")]
    target: String,

    /// Messages per second
    #[arg(long, default_value_t = 10.0)]
    rate: f64,

    /// Total messages to send (0 = run until stopped)
    #[arg(long, default_value_t = 0)]
    count: u64,

    /// Fleet center latitude
    #[arg(long, default_value_t = 40.5)]
    lat: f64,

    /// Fleet center longitude
    #[arg(long, default_value_t = -83.5)]
    lon: f64,

    /// Position spread around the center, meters
    #[arg(long, default_value_t = 2000.0)]
    spread: f64,

    /// Fraction of messages positioned far outside the fence
    #[arg(long, default_value_t = 0.2)]
    outside_ratio: f64,

    /// Fraction of messages with implausible speeds
    #[arg(long, default_value_t = 0.2)]
    bad_speed_ratio: f64,

    /// Fraction of TIM payloads
    #[arg(long, default_value_t = 0.1)]
    tim_ratio: f64,

    /// Fraction of deliberately malformed messages
    #[arg(long, default_value_t = 0.05)]
    malformed_ratio: f64,

    /// PRNG seed (0 = seed from entropy)
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bsm_sim=info".into()),
        )
        .init();

    let args = Args::parse();

    let socket = UdpSocket::bind("0.0.0.0:0").await.expect("failed to bind UDP socket");
    socket.connect(&args.target).await.expect("failed to connect UDP socket");

    let mut rng = if args.seed == 0 {
        StdRng::from_entropy()
    } else {
        StdRng::seed_from_u64(args.seed)
    };

    let period = Duration::from_secs_f64(1.0 / args.rate.max(0.01));
    let mut ticker = interval(period);
    let mut sent = 0u64;

    info!(
        "🚗 sending to {} at {} msg/s around ({}, {})",
        args.target, args.rate, args.lat, args.lon
    );

    loop {
        ticker.tick().await;

        let message = generate(&mut rng, &args);
        if let Err(e) = socket.send(message.as_bytes()).await {
            warn!("send failed: {e}");
        }

        sent += 1;
        if sent % 100 == 0 {
            info!("{sent} messages sent");
        }
        if args.count > 0 && sent >= args.count {
            break;
        }
    }

    info!("done: {sent} messages sent");
}

// ── Message generation ────────────────────────────────────────────────────────

fn generate(rng: &mut StdRng, args: &Args) -> String {
    if rng.gen_bool(args.malformed_ratio.clamp(0.0, 1.0)) {
        // Truncated JSON; the PPM should count a parse error and move on.
        return String::from("{\"metadata\": {\"payloadType\":");
    }

    let position = random_position(rng, args);
    let speed = random_speed(rng, args);

    if rng.gen_bool(args.tim_ratio.clamp(0.0, 1.0)) {
        tim_message(position, speed)
    } else {
        bsm_message(rng, position, speed)
    }
}

fn random_position(rng: &mut StdRng, args: &Args) -> Point {
    let center = Point::new(args.lat, args.lon);
    let bearing = rng.gen_range(0.0..360.0);

    let distance = if rng.gen_bool(args.outside_ratio.clamp(0.0, 1.0)) {
        // Well clear of any fence built around the center.
        args.spread * 50.0
    } else {
        rng.gen_range(0.0..args.spread)
    };

    center.project(bearing, distance)
}

fn random_speed(rng: &mut StdRng, args: &Args) -> f64 {
    if rng.gen_bool(args.bad_speed_ratio.clamp(0.0, 1.0)) {
        if rng.gen_bool(0.5) {
            rng.gen_range(0.0..2.0)
        } else {
            rng.gen_range(36.0..60.0)
        }
    } else {
        rng.gen_range(3.0..35.0)
    }
}

fn bsm_message(rng: &mut StdRng, position: Point, speed: f64) -> String {
    let id = format!("{:08X}", rng.gen::<u32>());
    let heading = rng.gen_range(0.0..360.0);

    json!({
        "metadata": {
            "payloadType": BSM_PAYLOAD_TYPE,
            "sanitized": false,
            "serialId": { "bundleSize": 1, "recordId": rng.gen::<u16>() }
        },
        "payload": {
            "data": {
                "coreData": {
                    "msgCnt": rng.gen_range(0..128),
                    "id": id,
                    "speed": speed,
                    "heading": heading,
                    "position": {
                        "latitude": position.lat,
                        "longitude": position.lon,
                        "elevation": rng.gen_range(150.0..300.0)
                    },
                    "size": { "length": 500, "width": 200 }
                },
                "partII": [
                    {
                        "id": "VehicleSafetyExtensions",
                        "value": {
                            "pathHistory": {
                                "crumbData": [
                                    { "elevationOffset": 0.0, "latOffset": 0.0001, "lonOffset": 0.0001 }
                                ]
                            },
                            "pathPrediction": { "confidence": 50.0, "radiusOfCurve": 0.0 }
                        }
                    }
                ]
            }
        }
    })
    .to_string()
}

fn tim_message(position: Point, speed: f64) -> String {
    json!({
        "metadata": {
            "payloadType": TIM_PAYLOAD_TYPE,
            "sanitized": false,
            "receivedMessageDetails": {
                "locationData": {
                    "latitude": position.lat,
                    "longitude": position.lon,
                    "speed": speed
                }
            }
        },
        "payload": { "data": { "MessageFrame": { "messageId": 31 } } }
    })
    .to_string()
}
