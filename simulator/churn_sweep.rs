// Churn Sweep - run the global churn ladder 0.05..0.50 and export results
//
// Usage:
//   cargo run --bin churn_sweep
//   cargo run --bin churn_sweep -- --seed 0x1234... --out results/

use std::env;
use std::fs;
use std::path::PathBuf;

use simple_logger::SimpleLogger;
use swarm_sim::sw_engine::seed_hex;
use swarm_sim::sw_sweep::{default_sweep_rates, run_sweep};
use swarm_sim::{CsvFileSink, JsonFileSink, ResultSink, RunSummary, SimulationConfig};

fn main() {
    SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()
        .unwrap();

    let args: Vec<String> = env::args().collect();
    let mut seed = None;
    let mut out_dir = PathBuf::from(".");
    let mut rest = args[1..].iter();
    while let Some(arg) = rest.next() {
        match (arg.as_str(), rest.next()) {
            ("--seed", Some(hex)) => seed = Some(parse_seed_hex(hex)),
            ("--out", Some(dir)) => out_dir = PathBuf::from(dir),
            _ => {
                eprintln!("Usage: {} [--seed SEED_HEX] [--out DIR]", args[0]);
                std::process::exit(1);
            }
        }
    }

    let base = SimulationConfig {
        total_peers: 5,
        duration_ms: 30_000,
        seed: Some(seed.unwrap_or_else(|| {
            let mut s = [0u8; 32];
            rand::Rng::fill(&mut rand::thread_rng(), &mut s);
            s
        })),
        ..Default::default()
    };

    println!("\n╔════════════════════════════════════════════════════════╗");
    println!("║  CHURN SWEEP                                           ║");
    println!("╚════════════════════════════════════════════════════════╝\n");
    if let Some(ref s) = base.seed {
        println!("Master seed: {}\n", seed_hex(s));
    }

    let runs = run_sweep(&base, &default_sweep_rates()).unwrap_or_else(|e| {
        eprintln!("Invalid sweep configuration: {}", e);
        std::process::exit(1);
    });

    println!("═══ Sweep Results ═══");
    println!("  {:<12} {:>10} {:>10} {:>10} {:>8}", "run", "avg active", "departures", "rejoins", "poor %");
    for run in &runs {
        let summary = RunSummary::from_run(run);
        println!("  {:<12} {:>10.2} {:>10} {:>10} {:>7.1}%",
            summary.label,
            summary.active.mean,
            summary.churn.departures,
            summary.churn.rejoins,
            summary.label_share(swarm_sim::ProfileLabel::PoorStable));
    }
    println!();

    if let Err(e) = fs::create_dir_all(&out_dir) {
        eprintln!("Failed to create {}: {}", out_dir.display(), e);
        std::process::exit(1);
    }
    let mut json = JsonFileSink::new(out_dir.join("churn-results.json"));
    let mut csv = CsvFileSink::new(out_dir.join("churn-results.csv"));
    let sinks: [&mut dyn ResultSink; 2] = [&mut json, &mut csv];
    for sink in sinks {
        if let Err(e) = sink.write_runs(&runs) {
            eprintln!("Failed to write results: {}", e);
            std::process::exit(1);
        }
    }
    println!("✓ Results written to {}\n", out_dir.display());
}

fn parse_seed_hex(hex: &str) -> [u8; 32] {
    let hex = hex.strip_prefix("0x").unwrap_or(hex);
    let mut seed = [0u8; 32];

    for (i, chunk) in hex.as_bytes().chunks(2).take(32).enumerate() {
        let parsed = std::str::from_utf8(chunk)
            .ok()
            .and_then(|s| u8::from_str_radix(s, 16).ok());
        match parsed {
            Some(byte) => seed[i] = byte,
            None => {
                eprintln!("Invalid hex seed: {}", hex);
                std::process::exit(1);
            }
        }
    }

    seed
}
