//! # swarm-churn - P2P Swarm Churn & Network-Quality Simulator
//!
//! Simulates a swarm of streaming peers whose network conditions vary and who
//! leave and rejoin over time. Every tick the engine applies churn, measures
//! each active peer's bandwidth, computes contribution ratios against the
//! swarm average and records a timestamped snapshot.
//!
//! ## Core Components
//!
//! - **ProfileGenerator**: assigns GOOD_STABLE / POOR_STABLE / UNSTABLE network profiles
//! - **Swarm**: fixed set of peer slots that churn toggles in place
//! - **ChurnDriver**: per-peer leave/rejoin state machine with pluggable policies
//! - **SimulationEngine**: tick scheduler producing a [`SimulationRun`]
//!
//! ## Usage
//!
//! ```no_run
//! use swarm_sim::{ChurnMode, SimulationConfig, SimulationEngine};
//!
//! let config = SimulationConfig {
//!     total_peers: 5,
//!     duration_ms: 30_000,
//!     churn_mode: ChurnMode::GlobalRate { rate: 0.1 },
//!     seed: Some([1u8; 32]),
//!     ..Default::default()
//! };
//! let run = SimulationEngine::new(config).unwrap().run();
//! println!("{} samples", run.samples.len());
//! ```
//!
//! With a seed (or an injected [`RandomSource`]) runs are reproducible. For a
//! wall-clock run on tokio see [`sw_realtime::run_realtime`].

pub mod sw_churn;
pub mod sw_config;
pub mod sw_engine;
pub mod sw_error;
pub mod sw_interface;
pub mod sw_profile;
pub mod sw_registry;
pub mod sw_sampler;

// Output and analysis
pub mod sw_sinks;
pub mod sw_stats;
pub mod sw_sweep;

pub mod sw_realtime;

// Re-export commonly used types
pub use sw_churn::{ChurnMode, ChurnPolicy, GlobalRate, JitterThreshold, PerPeerRate, RejoinPolicy};
pub use sw_config::SimulationConfig;
pub use sw_engine::{MetricsSample, PeerSnapshot, SimulationBuilder, SimulationEngine, SimulationRun};
pub use sw_error::{ConfigError, SinkError, SinkWriteFailure};
pub use sw_interface::{
    EventSink, MetricsSource, NoOpSink, PeerId, PlaybackReading, RandomSource, RngSource,
    ScriptedSource, SimTime, SwarmEvent,
};
pub use sw_profile::{NetworkProfile, ProfileLabel, GOOD_STABLE, POOR_STABLE};
pub use sw_registry::{Peer, PeerStatus, Swarm};
pub use sw_sinks::{CsvFileSink, JsonFileSink, MemorySink, ResultSink};
pub use sw_stats::RunSummary;
