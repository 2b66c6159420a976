//! Basic churn simulation with the built-in profile catalog
//!
//! Run with: cargo run --example basic_simulation

use simple_logger::SimpleLogger;
use swarm_sim::{ChurnMode, RunSummary, SimulationConfig, SimulationEngine};

fn main() {
    SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()
        .unwrap();

    println!("╔════════════════════════════════════════════════════════╗");
    println!("║    Swarm Churn Simulator                               ║");
    println!("╚════════════════════════════════════════════════════════╝\n");

    let config = SimulationConfig {
        total_peers: 5,
        duration_ms: 30_000,
        tick_interval_ms: 1000,
        churn_mode: ChurnMode::GlobalRate { rate: 0.1 },
        label: Some("basic".to_string()),
        ..Default::default()
    };

    let run = SimulationEngine::new(config).unwrap().run();

    for sample in run.samples.iter().step_by(5) {
        let peers: Vec<String> = sample
            .active_peers
            .iter()
            .map(|p| format!("{}:{:.0}kbps/{:.2}", p.peer_id, p.bandwidth, p.contribution_ratio))
            .collect();
        println!("t={:>6}ms active={} [{}]", sample.timestamp_ms, sample.active_count(), peers.join(", "));
    }

    RunSummary::from_run(&run).print_summary();
}
