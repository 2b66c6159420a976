// Scenario Runner - Load and execute churn scenario YAML files
//
// Usage:
//   cargo run --bin scenario_runner simulator/scenarios/baseline.yaml
//   cargo run --bin scenario_runner simulator/scenarios/  (runs all .yaml files in directory)
//   cargo run --bin scenario_runner simulator/scenarios/baseline.yaml --seed 0x1234...
//   cargo run --bin scenario_runner simulator/scenarios/baseline.yaml --realtime

use std::env;
use std::fs;
use std::path::Path;

use log::warn;
use simple_logger::SimpleLogger;
use swarm_sim::sw_engine::seed_hex;
use swarm_sim::sw_realtime::run_realtime;
use swarm_sim::sw_sinks::ConsoleEventSink;
use swarm_sim::{
    CsvFileSink, JsonFileSink, ResultSink, RunSummary, SimulationBuilder,
    SimulationConfig, SimulationRun,
};
use tokio_util::sync::CancellationToken;

/// Scenario file format
#[derive(Debug, serde::Deserialize)]
struct ScenarioFile {
    #[serde(default)]
    meta: ScenarioMeta,

    /// Simulation configuration (missing fields take defaults)
    #[serde(default)]
    config: SimulationConfig,

    #[serde(default)]
    output: OutputConfig,
}

#[derive(Debug, Default, serde::Deserialize)]
struct ScenarioMeta {
    name: Option<String>,
    description: Option<String>,
    hypothesis: Option<String>,
}

#[derive(Debug, Default, serde::Deserialize)]
struct OutputConfig {
    json: Option<String>,
    csv: Option<String>,
    #[serde(default)]
    print_events: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct RunnerOptions {
    seed: Option<[u8; 32]>,
    realtime: bool,
}

fn main() {
    SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()
        .unwrap();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <scenario.yaml | directory/> [--seed SEED_HEX] [--realtime]", args[0]);
        eprintln!("\nExamples:");
        eprintln!("  {} simulator/scenarios/baseline.yaml", args[0]);
        eprintln!("  {} simulator/scenarios/", args[0]);
        eprintln!("  {} simulator/scenarios/baseline.yaml --seed 0x123456...", args[0]);
        eprintln!("  {} simulator/scenarios/baseline.yaml --realtime", args[0]);
        std::process::exit(1);
    }

    let path = Path::new(&args[1]);

    let mut options = RunnerOptions::default();
    let mut rest = args[2..].iter();
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--seed" => match rest.next() {
                Some(hex) => options.seed = Some(parse_seed_hex(hex)),
                None => {
                    eprintln!("--seed needs a hex value");
                    std::process::exit(1);
                }
            },
            "--realtime" => options.realtime = true,
            other => {
                eprintln!("Unknown argument: {}", other);
                std::process::exit(1);
            }
        }
    }

    if path.is_file() {
        run_scenario_file(path, options);
    } else if path.is_dir() {
        run_scenario_directory(path, options);
    } else {
        eprintln!("Error: Path does not exist: {}", path.display());
        std::process::exit(1);
    }
}

fn run_scenario_directory(dir: &Path, options: RunnerOptions) {
    let mut scenarios = Vec::new();

    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            let ext = path.extension().and_then(|s| s.to_str());
            if ext == Some("yaml") || ext == Some("yml") {
                scenarios.push(path);
            }
        }
    }

    scenarios.sort();

    if scenarios.is_empty() {
        eprintln!("No .yaml files found in {}", dir.display());
        std::process::exit(1);
    }

    println!("\n╔════════════════════════════════════════════════════════╗");
    println!("║  SCENARIO RUNNER - Multiple Scenarios                 ║");
    println!("╚════════════════════════════════════════════════════════╝\n");
    println!("Found {} scenario(s) to run\n", scenarios.len());

    for (i, scenario_path) in scenarios.iter().enumerate() {
        println!("\n{}/{} Running: {}\n", i + 1, scenarios.len(), scenario_path.display());
        run_scenario_file(scenario_path, options);
    }

    println!("\n╔════════════════════════════════════════════════════════╗");
    println!("║  All scenarios complete!                               ║");
    println!("╚════════════════════════════════════════════════════════╝\n");
}

fn run_scenario_file(path: &Path, options: RunnerOptions) {
    println!("Loading scenario from: {}", path.display());

    let yaml_content = fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Failed to read {}: {}", path.display(), e);
        std::process::exit(1);
    });

    let scenario: ScenarioFile = serde_yaml::from_str(&yaml_content).unwrap_or_else(|e| {
        eprintln!("Failed to parse {}: {}", path.display(), e);
        std::process::exit(1);
    });

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("scenario")
        .to_string();
    let name = scenario.meta.name.clone().unwrap_or_else(|| stem.clone());

    println!("\n╔════════════════════════════════════════════════════════╗");
    println!("║  {}{}║", name, " ".repeat(54_usize.saturating_sub(name.len())));
    println!("╚════════════════════════════════════════════════════════╝\n");

    if let Some(ref desc) = scenario.meta.description {
        println!("{}\n", desc);
    }

    if let Some(ref hypothesis) = scenario.meta.hypothesis {
        println!("Hypothesis:");
        println!("  {}\n", hypothesis);
    }

    let mut config = scenario.config;
    if options.seed.is_some() {
        config.seed = options.seed;
    }
    if config.label.is_none() {
        config.label = Some(stem);
    }

    println!("Configuration:");
    println!("  Peers: {}", config.total_peers);
    println!("  Duration: {}ms ({} ticks of {}ms)", config.duration_ms, config.expected_ticks(), config.tick_interval_ms);
    println!("  Churn: {:?}", config.churn_mode);
    println!("  Rejoin: {:?}", config.rejoin);
    if let Some(profile) = config.network_condition_override {
        println!("  Network Override: {} ({} kbps, {}ms, {}% jitter)",
            profile.label, profile.bandwidth_kbps, profile.latency_ms, profile.jitter_pct);
    }
    println!("  Mode: {}", if options.realtime { "realtime" } else { "logical clock" });
    println!("\nStarting simulation...\n");

    let mut builder = SimulationBuilder::new(config);
    if scenario.output.print_events {
        builder = builder.event_sink(ConsoleEventSink);
    }
    let engine = builder.build().unwrap_or_else(|e| {
        eprintln!("Invalid configuration in {}: {}", path.display(), e);
        std::process::exit(1);
    });
    if let Some(seed) = engine.seed() {
        println!("Seed: {}\n", seed_hex(&seed));
    }

    let run = if options.realtime {
        run_realtime_blocking(engine)
    } else {
        engine.run()
    };

    RunSummary::from_run(&run).print_summary();

    if let Some(ref json) = scenario.output.json {
        write_or_warn(&mut JsonFileSink::new(json), &run);
    }
    if let Some(ref csv) = scenario.output.csv {
        write_or_warn(&mut CsvFileSink::new(csv), &run);
    }

    println!("\n✓ Scenario complete!\n");
}

/// Drive the engine on a tokio runtime; Ctrl-C stops early and keeps the samples.
fn run_realtime_blocking(engine: swarm_sim::SimulationEngine) -> SimulationRun {
    let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("Failed to start tokio runtime: {}", e);
        std::process::exit(1);
    });

    runtime.block_on(async move {
        let cancel = CancellationToken::new();
        let on_signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_signal.cancel();
            }
        });

        run_realtime(engine, cancel).await
    })
}

fn write_or_warn(sink: &mut dyn ResultSink, run: &SimulationRun) {
    if let Err(e) = sink.write_run(run) {
        warn!("failed to write results: {}", e);
    }
}

fn parse_seed_hex(hex: &str) -> [u8; 32] {
    let hex = hex.strip_prefix("0x").unwrap_or(hex);
    let mut seed = [0u8; 32];

    for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
        if i >= 32 {
            break;
        }
        let byte_str = std::str::from_utf8(chunk).unwrap_or_else(|e| {
            eprintln!("Invalid hex seed: {}", e);
            std::process::exit(1);
        });
        seed[i] = u8::from_str_radix(byte_str, 16).unwrap_or_else(|e| {
            eprintln!("Invalid hex seed: {}", e);
            std::process::exit(1);
        });
    }

    seed
}
