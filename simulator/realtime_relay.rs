//! Realtime swarm with a bandwidth relay: peer 0 listens to what the others measure
//!
//! Run with: cargo run --example realtime_relay   (Ctrl-C stops early)

use log::info;
use simple_logger::SimpleLogger;
use swarm_sim::sw_realtime::{run_realtime, BroadcastRelay};
use swarm_sim::{ChurnMode, RunSummary, SimulationBuilder, SimulationConfig};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()
        .unwrap();

    let config = SimulationConfig {
        total_peers: 5,
        duration_ms: 10_000,
        churn_mode: ChurnMode::jitter_based(),
        label: Some("realtime-relay".to_string()),
        ..Default::default()
    };

    let relay = BroadcastRelay::new(256);
    let mut listener = relay.subscribe(0);
    let engine = SimulationBuilder::new(config)
        .event_sink(relay)
        .build()
        .unwrap();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let listen = tokio::spawn(async move {
        let mut heard = 0usize;
        while let Some(report) = listener.recv().await {
            info!(
                "peer 0 heard: peer {} at {:.1} kbps (t={}ms, {:.0}ms latency)",
                report.peer, report.bandwidth_kbps, report.time_ms, report.latency_ms
            );
            heard += 1;
        }
        heard
    });

    let run = run_realtime(engine, cancel).await;
    // engine (and the relay inside it) is gone, so the listener drains and stops
    let heard = listen.await.unwrap_or(0);

    RunSummary::from_run(&run).print_summary();
    println!("Peer 0 received {} reports from other peers", heard);
}
