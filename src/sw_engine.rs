// Churn & Network-Quality Simulation Engine

use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::sw_churn::{ChurnDriver, ChurnMode, ChurnOutcome, ChurnPolicy, RejoinPolicy};
use crate::sw_config::SimulationConfig;
use crate::sw_error::{ConfigError, SinkWriteFailure};
use crate::sw_interface::{
    EventSink, MetricsSource, NoOpSink, NullMetricsSource, PeerId, PlaybackReading, RandomSource,
    RngSource, SimTime, SwarmEvent,
};
use crate::sw_profile::{NetworkProfile, ProfileGenerator, ProfileLabel};
use crate::sw_registry::Swarm;
use crate::sw_sampler::{self, PendingMeasurement};
use crate::sw_sinks::ResultSink;

// ============================================================================
// Samples and Results
// ============================================================================

/// One active peer as seen at a sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerSnapshot {
    pub peer_id: PeerId,
    pub bandwidth: f64,
    pub latency: f64,
    pub jitter: f64,
    pub contribution_ratio: f64,
    pub label: ProfileLabel,
    pub churn_probability: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub distance: Option<f64>,
    pub playback: PlaybackReading,
}

/// Timestamped snapshot of every active peer. Never mutated once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSample {
    pub tick: u64,
    pub timestamp_ms: SimTime,
    /// Slowest simulated measurement latency of the tick
    pub measurement_window_ms: f64,
    pub active_peers: Vec<PeerSnapshot>,
}

impl MetricsSample {
    pub fn active_count(&self) -> usize {
        self.active_peers.len()
    }
}

/// Join/leave totals over a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChurnCounters {
    pub departures: usize,
    pub rejoins: usize,
}

/// Complete simulation result, handed to the result sink once the run ends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRun {
    pub label: Option<String>,
    pub churn_mode: ChurnMode,
    pub rejoin: RejoinPolicy,
    pub network_condition_override: Option<NetworkProfile>,
    pub total_peers: usize,
    pub duration_ms: u64,
    pub tick_interval_ms: u64,
    /// Hex seed, when the run was seeded from the built-in generator
    pub seed: Option<String>,
    pub churn: ChurnCounters,
    pub metrics_unavailable: usize,
    pub cancelled: bool,
    pub samples: Vec<MetricsSample>,
}

impl SimulationRun {
    pub fn display_label(&self) -> String {
        self.label.clone().unwrap_or_else(|| format!("{:?}", self.churn_mode))
    }
}

/// Churn applied and measurements drawn for one tick, awaiting completion
#[derive(Debug, Clone)]
pub struct TickPlan {
    pub tick: u64,
    pub pending: Vec<PendingMeasurement>,
    /// Transitions of this tick, counted into the run only once it completes
    pub churn: ChurnOutcome,
}

impl TickPlan {
    pub fn window_ms(&self) -> f64 {
        sw_sampler::measurement_window_ms(&self.pending)
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Assembles an engine from a configuration plus optional collaborators
pub struct SimulationBuilder {
    config: SimulationConfig,
    rng: Option<Box<dyn RandomSource + Send>>,
    metrics: Option<Box<dyn MetricsSource + Send>>,
    events: Option<Box<dyn EventSink + Send>>,
    policy: Option<Box<dyn ChurnPolicy + Send + Sync>>,
}

impl SimulationBuilder {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            rng: None,
            metrics: None,
            events: None,
            policy: None,
        }
    }

    /// Replace the seeded generator with an injected source
    pub fn random_source(mut self, rng: impl RandomSource + Send + 'static) -> Self {
        self.rng = Some(Box::new(rng));
        self
    }

    pub fn metrics_source(mut self, metrics: impl MetricsSource + Send + 'static) -> Self {
        self.metrics = Some(Box::new(metrics));
        self
    }

    pub fn event_sink(mut self, events: impl EventSink + Send + 'static) -> Self {
        self.events = Some(Box::new(events));
        self
    }

    /// Install a custom churn policy instead of the configured `churn_mode`
    pub fn churn_policy(mut self, policy: impl ChurnPolicy + Send + Sync + 'static) -> Self {
        self.policy = Some(Box::new(policy));
        self
    }

    pub fn build(self) -> Result<SimulationEngine, ConfigError> {
        self.config.validate()?;

        let (mut rng, seed_used) = match self.rng {
            Some(rng) => (rng, None),
            None => {
                let seed = self.config.seed.unwrap_or_else(|| {
                    let mut seed = [0u8; 32];
                    rand::thread_rng().fill(&mut seed);
                    seed
                });
                let rng: Box<dyn RandomSource + Send> = Box::new(RngSource(StdRng::from_seed(seed)));
                (rng, Some(seed))
            }
        };
        let mut events = self.events.unwrap_or_else(|| Box::new(NoOpSink));
        let policy = self.policy.unwrap_or_else(|| self.config.churn_mode.policy());

        let generator = ProfileGenerator::new(self.config.network_condition_override);
        let placement = self.config.distance.map(|d| d.extent);
        let swarm = Swarm::populate(
            self.config.total_peers,
            generator,
            placement,
            policy.as_ref(),
            rng.as_mut(),
        );
        for peer in swarm.iter() {
            events.log(
                0,
                peer.id,
                SwarmEvent::PeerJoined {
                    label: peer.profile.label,
                    rejoin: false,
                    churn_probability: peer.churn_probability,
                },
            );
        }

        Ok(SimulationEngine {
            churn: ChurnDriver::new(policy, self.config.rejoin),
            config: self.config,
            swarm,
            rng,
            metrics: self.metrics.unwrap_or_else(|| Box::new(NullMetricsSource)),
            events,
            seed_used,
            ticks: 0,
            samples: Vec::new(),
            counters: ChurnCounters::default(),
            metrics_unavailable: 0,
            finished: false,
            cancelled: false,
        })
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Owns the swarm and drives it tick by tick. Tick N is fully applied before
/// tick N+1 begins; once finished no further ticks are produced.
pub struct SimulationEngine {
    config: SimulationConfig,
    swarm: Swarm,
    churn: ChurnDriver,
    rng: Box<dyn RandomSource + Send>,
    metrics: Box<dyn MetricsSource + Send>,
    events: Box<dyn EventSink + Send>,
    seed_used: Option<[u8; 32]>,

    ticks: u64,
    samples: Vec<MetricsSample>,
    counters: ChurnCounters,
    metrics_unavailable: usize,
    finished: bool,
    cancelled: bool,
}

impl SimulationEngine {
    pub fn new(config: SimulationConfig) -> Result<Self, ConfigError> {
        SimulationBuilder::new(config).build()
    }

    /// Run every tick on the logical clock and return the result
    pub fn run(mut self) -> SimulationRun {
        info!("simulation starting: {}", self.config.summary());
        while self.step().is_some() {}
        self.finish()
    }

    /// Run to completion, then hand the result to `sink`. A sink failure
    /// still returns the collected run inside the error.
    pub fn run_to_sink(self, sink: &mut dyn ResultSink) -> Result<SimulationRun, SinkWriteFailure> {
        let run = self.run();
        deliver(run, sink)
    }

    /// Advance one tick on the logical clock: tick `k` is stamped
    /// `k * tick_interval_ms` and the measurement delay is a logical offset.
    pub fn step(&mut self) -> Option<&MetricsSample> {
        let plan = self.begin_tick()?;
        let elapsed = self.nominal_time(plan.tick);
        Some(self.complete_tick(plan, elapsed))
    }

    /// Churn pass plus measurement draws for the next tick. All randomness of
    /// the tick is consumed here, before any simulated delay.
    pub fn begin_tick(&mut self) -> Option<TickPlan> {
        if self.finished {
            return None;
        }
        self.ticks += 1;
        let nominal = self.nominal_time(self.ticks);

        let churn = self.churn.run_pass(
            &mut self.swarm,
            self.rng.as_mut(),
            self.events.as_mut(),
            nominal,
        );

        let pending = sw_sampler::plan_measurements(
            &self.swarm,
            self.rng.as_mut(),
            self.config.distance.as_ref(),
        );

        Some(TickPlan {
            tick: self.ticks,
            pending,
            churn,
        })
    }

    /// Logical stamp of tick `k`: `k * tick_interval_ms`, saturating at
    /// `SimTime::MAX` so an oversized run still reaches its duration.
    fn nominal_time(&self, tick: u64) -> SimTime {
        tick.saturating_mul(self.config.tick_interval_ms)
    }

    /// Apply a tick's measurements (bandwidths first, then ratios) and record
    /// the sample at `elapsed_ms` since run start.
    pub fn complete_tick(&mut self, plan: TickPlan, elapsed_ms: SimTime) -> &MetricsSample {
        debug_assert_eq!(plan.tick, self.ticks, "tick plans must complete in order");

        self.counters.departures += plan.churn.departed.len();
        self.counters.rejoins += plan.churn.rejoined.len();

        sw_sampler::apply_measurements(&mut self.swarm, &plan.pending);
        sw_sampler::refresh_contributions(&mut self.swarm);

        for m in &plan.pending {
            self.events.log(
                elapsed_ms,
                m.peer,
                SwarmEvent::BandwidthMeasured {
                    bandwidth_kbps: m.bandwidth_kbps,
                    latency_ms: m.delay_ms,
                },
            );
        }

        let mut active_peers = Vec::with_capacity(plan.pending.len());
        for peer in self.swarm.active() {
            let playback = match self.metrics.read(peer.id, elapsed_ms) {
                Ok(reading) => reading,
                Err(e) => {
                    warn!("{}; recording zeros", e);
                    self.metrics_unavailable += 1;
                    PlaybackReading::default()
                }
            };
            active_peers.push(PeerSnapshot {
                peer_id: peer.id,
                bandwidth: peer.current_bandwidth,
                latency: peer.profile.latency_ms,
                jitter: peer.profile.jitter_pct,
                contribution_ratio: peer.contribution_ratio,
                label: peer.profile.label,
                churn_probability: peer.churn_probability,
                distance: self.swarm.distance_to_origin(peer.id),
                playback,
            });
        }

        self.samples.push(MetricsSample {
            tick: plan.tick,
            timestamp_ms: elapsed_ms,
            measurement_window_ms: plan.window_ms(),
            active_peers,
        });

        if elapsed_ms >= self.config.duration_ms {
            self.finished = true;
        }

        &self.samples[self.samples.len() - 1]
    }

    /// Stop before the configured duration; collected samples are kept.
    pub fn cancel(&mut self) {
        if !self.finished {
            info!("simulation cancelled after {} ticks", self.ticks);
            self.cancelled = true;
            self.finished = true;
        }
    }

    /// Close the run and take its samples
    pub fn finish(self) -> SimulationRun {
        info!(
            "simulation finished: {} samples, {} departures, {} rejoins",
            self.samples.len(),
            self.counters.departures,
            self.counters.rejoins
        );
        SimulationRun {
            label: self.config.label.clone(),
            churn_mode: self.config.churn_mode.clone(),
            rejoin: self.config.rejoin,
            network_condition_override: self.config.network_condition_override,
            total_peers: self.config.total_peers,
            duration_ms: self.config.duration_ms,
            tick_interval_ms: self.config.tick_interval_ms,
            seed: self.seed_used.map(|seed| seed_hex(&seed)),
            churn: self.counters,
            metrics_unavailable: self.metrics_unavailable,
            cancelled: self.cancelled,
            samples: self.samples,
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn swarm(&self) -> &Swarm {
        &self.swarm
    }

    pub fn samples(&self) -> &[MetricsSample] {
        &self.samples
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn seed(&self) -> Option<[u8; 32]> {
        self.seed_used
    }
}

/// Hand a finished run to the sink, keeping the run on failure
pub fn deliver(run: SimulationRun, sink: &mut dyn ResultSink) -> Result<SimulationRun, SinkWriteFailure> {
    match sink.write_run(&run) {
        Ok(()) => Ok(run),
        Err(source) => {
            warn!("result sink failed: {}", source);
            Err(SinkWriteFailure {
                run: Box::new(run),
                source,
            })
        }
    }
}

pub fn seed_hex(seed: &[u8; 32]) -> String {
    let mut out = String::with_capacity(66);
    out.push_str("0x");
    for byte in seed {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sw_error::SinkError;
    use crate::sw_interface::ScriptedSource;
    use crate::sw_profile::GOOD_STABLE;
    use crate::sw_sinks::MemorySink;
    use std::io;

    fn config(total_peers: usize, duration_ms: u64, rate: f64) -> SimulationConfig {
        SimulationConfig {
            total_peers,
            duration_ms,
            tick_interval_ms: 1000,
            churn_mode: ChurnMode::GlobalRate { rate },
            seed: Some([7u8; 32]),
            ..Default::default()
        }
    }

    #[test]
    fn test_no_churn_keeps_profiles() {
        let run = SimulationEngine::new(config(5, 5000, 0.0)).unwrap().run();

        assert_eq!(run.samples.len(), 5);
        let first = &run.samples[0];
        for (i, sample) in run.samples.iter().enumerate() {
            assert_eq!(sample.tick, i as u64 + 1);
            assert_eq!(sample.timestamp_ms, (i as u64 + 1) * 1000);
            assert_eq!(sample.active_count(), 5);
            for (a, b) in sample.active_peers.iter().zip(&first.active_peers) {
                assert_eq!(a.peer_id, b.peer_id);
                assert_eq!(a.label, b.label);
                assert_eq!(a.latency, b.latency);
                assert_eq!(a.jitter, b.jitter);
            }
        }
        assert_eq!(run.churn, ChurnCounters::default());
        assert!(!run.cancelled);
    }

    #[test]
    fn test_full_churn_alternates() {
        let run = SimulationEngine::new(config(3, 3000, 1.0)).unwrap().run();
        let counts: Vec<usize> = run.samples.iter().map(|s| s.active_count()).collect();
        assert_eq!(counts, vec![0, 3, 0]);
        assert_eq!(run.churn.departures, 6);
        assert_eq!(run.churn.rejoins, 3);
        assert_eq!(run.samples[0].measurement_window_ms, 0.0);
    }

    #[test]
    fn test_active_count_bounded() {
        let mut cfg = config(12, 40_000, 0.4);
        cfg.rejoin = RejoinPolicy::Probabilistic;
        let run = SimulationEngine::new(cfg).unwrap().run();
        assert_eq!(run.samples.len(), 40);
        for sample in &run.samples {
            assert!(sample.active_count() <= 12);
            let ratio_sum: f64 = sample.active_peers.iter().map(|p| p.contribution_ratio).sum();
            if sample.active_count() > 0 {
                assert!((ratio_sum / sample.active_count() as f64 - 1.0).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_seeded_runs_are_identical() {
        let a = SimulationEngine::new(config(6, 8000, 0.3)).unwrap().run();
        let b = SimulationEngine::new(config(6, 8000, 0.3)).unwrap().run();
        assert_eq!(
            serde_json::to_string(&a.samples).unwrap(),
            serde_json::to_string(&b.samples).unwrap()
        );
        assert_eq!(a.seed, Some(seed_hex(&[7u8; 32])));
    }

    #[test]
    fn test_injected_source_is_deterministic() {
        let script = vec![0.12, 0.87, 0.45, 0.05, 0.66, 0.31, 0.99, 0.2];
        let build = || {
            SimulationBuilder::new(config(4, 6000, 0.25))
                .random_source(ScriptedSource::new(script.clone()))
                .build()
                .unwrap()
                .run()
        };
        let a = build();
        let b = build();
        assert_eq!(
            serde_json::to_vec(&a.samples).unwrap(),
            serde_json::to_vec(&b.samples).unwrap()
        );
        assert!(a.seed.is_none());
    }

    #[test]
    fn test_lone_peer_ratio_exactly_one() {
        let mut cfg = config(1, 3000, 0.0);
        cfg.network_condition_override = Some(GOOD_STABLE);
        let run = SimulationEngine::new(cfg).unwrap().run();
        for sample in &run.samples {
            assert_eq!(sample.active_peers[0].contribution_ratio, 1.0);
            assert_eq!(sample.measurement_window_ms, 50.0);
        }
    }

    #[test]
    fn test_missing_metrics_recorded_as_zero() {
        let reading = PlaybackReading {
            startup_delay_s: 2.0,
            buffering_events: 1,
            p2p_bandwidth: 300.0,
            playback_latency_s: 0.4,
        };
        let source = move |peer: PeerId, _at: SimTime| if peer == 1 { None } else { Some(reading) };
        let run = SimulationBuilder::new(config(3, 4000, 0.0))
            .metrics_source(source)
            .build()
            .unwrap()
            .run();

        assert_eq!(run.samples.len(), 4);
        assert_eq!(run.metrics_unavailable, 4);
        for sample in &run.samples {
            assert_eq!(sample.active_peers[0].playback, reading);
            assert_eq!(sample.active_peers[1].playback, PlaybackReading::default());
        }
    }

    #[test]
    fn test_custom_policy_overrides_mode() {
        let run = SimulationBuilder::new(config(4, 2000, 0.0))
            .churn_policy(|_: &NetworkProfile| 1.0)
            .build()
            .unwrap()
            .run();
        assert_eq!(run.samples[0].active_count(), 0);
        assert_eq!(run.samples[1].active_count(), 4);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = SimulationEngine::new(config(0, 1000, 0.1));
        assert!(matches!(result, Err(ConfigError::NoPeers)));
        let result = SimulationEngine::new(config(3, 1000, 2.0));
        assert!(matches!(result, Err(ConfigError::RateOutOfRange { .. })));
    }

    #[test]
    fn test_step_stops_after_duration() {
        let mut engine = SimulationEngine::new(config(2, 2500, 0.1)).unwrap();
        assert!(engine.step().is_some());
        assert!(engine.step().is_some());
        let last = engine.step().unwrap();
        assert_eq!(last.timestamp_ms, 3000);
        assert!(engine.is_finished());
        assert!(engine.step().is_none());
        assert!(engine.begin_tick().is_none());
        assert_eq!(engine.ticks(), 3);
    }

    #[test]
    fn test_huge_tick_interval_saturates() {
        let mut cfg = config(2, u64::MAX, 0.0);
        cfg.tick_interval_ms = u64::MAX / 2 + 1;
        assert!(cfg.validate().is_ok());

        let run = SimulationEngine::new(cfg).unwrap().run();
        let stamps: Vec<SimTime> = run.samples.iter().map(|s| s.timestamp_ms).collect();
        assert_eq!(stamps, vec![u64::MAX / 2 + 1, u64::MAX]);
    }

    #[test]
    fn test_abandoned_tick_not_counted() {
        let mut engine = SimulationEngine::new(config(2, 10_000, 1.0)).unwrap();
        engine.step();
        let plan = engine.begin_tick().unwrap();
        assert_eq!(plan.churn.rejoined, vec![0, 1]);
        drop(plan);
        engine.cancel();

        let run = engine.finish();
        assert_eq!(run.samples.len(), 1);
        assert_eq!(run.churn, ChurnCounters { departures: 2, rejoins: 0 });
    }

    #[test]
    fn test_cancel_keeps_collected_samples() {
        let mut engine = SimulationEngine::new(config(3, 10_000, 0.2)).unwrap();
        engine.step();
        engine.step();
        engine.cancel();
        assert!(engine.step().is_none());
        let run = engine.finish();
        assert!(run.cancelled);
        assert_eq!(run.samples.len(), 2);
    }

    #[test]
    fn test_run_to_sink() {
        let mut sink = MemorySink::default();
        let run = SimulationEngine::new(config(2, 2000, 0.0))
            .unwrap()
            .run_to_sink(&mut sink)
            .unwrap();
        assert_eq!(sink.runs.len(), 1);
        assert_eq!(sink.runs[0], run);
    }

    struct BrokenSink;

    impl ResultSink for BrokenSink {
        fn write_run(&mut self, _run: &SimulationRun) -> Result<(), SinkError> {
            Err(SinkError::Io(io::Error::new(io::ErrorKind::Other, "disk full")))
        }
    }

    #[test]
    fn test_sink_failure_keeps_run() {
        let err = SimulationEngine::new(config(2, 3000, 0.0))
            .unwrap()
            .run_to_sink(&mut BrokenSink)
            .unwrap_err();
        assert_eq!(err.run.samples.len(), 3);
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_seed_hex_format() {
        let mut seed = [0u8; 32];
        seed[0] = 0xab;
        seed[31] = 0x01;
        let hex = seed_hex(&seed);
        assert_eq!(hex.len(), 66);
        assert!(hex.starts_with("0xab00"));
        assert!(hex.ends_with("01"));
    }
}
