// Wall-clock driver: ticks on a tokio interval and waits out simulated
// measurement latencies concurrently.

use std::time::Duration;

use futures::future::join_all;
use log::{info, warn};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::sw_engine::{deliver, SimulationEngine, SimulationRun};
use crate::sw_error::SinkWriteFailure;
use crate::sw_interface::{EventSink, PeerId, SimTime, SwarmEvent};
use crate::sw_sinks::ResultSink;

// ============================================================================
// Driver
// ============================================================================

/// Longest wall-clock tick; longer intervals are clamped so the timer
/// deadline stays representable.
pub const MAX_TICK: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Run the engine against the tokio clock until the duration elapses or
/// `cancel` fires. Samples collected before cancellation are kept.
///
/// Each tick issues every active peer's measurement at once and waits for
/// the slowest, so a tick takes the maximum latency rather than the sum.
pub async fn run_realtime(mut engine: SimulationEngine, cancel: CancellationToken) -> SimulationRun {
    let tick = Duration::from_millis(engine.config().tick_interval_ms).min(MAX_TICK);
    let start = Instant::now();
    let mut interval = tokio::time::interval_at(start + tick, tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("realtime simulation starting: {}", engine.config().summary());

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                engine.cancel();
                break;
            }
            _ = interval.tick() => {}
        }

        let Some(plan) = engine.begin_tick() else {
            break;
        };

        let waits = plan.pending.iter().map(|m| tokio::time::sleep(m.delay()));
        tokio::select! {
            _ = cancel.cancelled() => {
                // the plan (with its churn counts) is dropped uncommitted
                warn!("cancelled with tick {} in flight; its measurements are dropped", plan.tick);
                engine.cancel();
                break;
            }
            _ = join_all(waits) => {}
        }

        let elapsed = start.elapsed().as_millis() as SimTime;
        engine.complete_tick(plan, elapsed);
        if engine.is_finished() {
            break;
        }
    }

    engine.finish()
}

/// [`run_realtime`], then hand whatever was collected to `sink`
pub async fn run_realtime_to_sink(
    engine: SimulationEngine,
    cancel: CancellationToken,
    sink: &mut dyn ResultSink,
) -> Result<SimulationRun, SinkWriteFailure> {
    let run = run_realtime(engine, cancel).await;
    deliver(run, sink)
}

// ============================================================================
// Bandwidth Relay
// ============================================================================

/// A bandwidth measurement as seen by other peers
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BandwidthReport {
    pub peer: PeerId,
    pub time_ms: SimTime,
    pub bandwidth_kbps: f64,
    pub latency_ms: f64,
}

/// Event sink republishing every bandwidth measurement on a broadcast
/// channel. Clones publish to the same channel.
#[derive(Debug, Clone)]
pub struct BroadcastRelay {
    tx: broadcast::Sender<BandwidthReport>,
}

impl BroadcastRelay {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe on behalf of `own`; reports about `own` are filtered out.
    pub fn subscribe(&self, own: PeerId) -> RelaySubscriber {
        RelaySubscriber {
            own,
            rx: self.tx.subscribe(),
        }
    }
}

impl EventSink for BroadcastRelay {
    fn log(&mut self, time: SimTime, peer: PeerId, event: SwarmEvent) {
        if let SwarmEvent::BandwidthMeasured {
            bandwidth_kbps,
            latency_ms,
        } = event
        {
            // no subscribers is fine
            let _ = self.tx.send(BandwidthReport {
                peer,
                time_ms: time,
                bandwidth_kbps,
                latency_ms,
            });
        }
    }
}

pub struct RelaySubscriber {
    own: PeerId,
    rx: broadcast::Receiver<BandwidthReport>,
}

impl RelaySubscriber {
    /// Next report about another peer; `None` once the relay is gone.
    pub async fn recv(&mut self) -> Option<BandwidthReport> {
        loop {
            match self.rx.recv().await {
                Ok(report) if report.peer == self.own => continue,
                Ok(report) => return Some(report),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("peer {} relay lagged, {} reports skipped", self.own, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv)
    pub fn try_next(&mut self) -> Option<BandwidthReport> {
        loop {
            match self.rx.try_recv() {
                Ok(report) if report.peer == self.own => continue,
                Ok(report) => return Some(report),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sw_churn::ChurnMode;
    use crate::sw_config::SimulationConfig;
    use crate::sw_engine::SimulationBuilder;
    use crate::sw_profile::{NetworkProfile, ProfileLabel};
    use crate::sw_sinks::MemorySink;

    fn fixed_latency_config(total_peers: usize, duration_ms: u64) -> SimulationConfig {
        SimulationConfig {
            total_peers,
            duration_ms,
            tick_interval_ms: 1000,
            churn_mode: ChurnMode::GlobalRate { rate: 0.0 },
            network_condition_override: Some(NetworkProfile {
                bandwidth_kbps: 1000.0,
                latency_ms: 100.0,
                jitter_pct: 0.0,
                label: ProfileLabel::PoorStable,
            }),
            seed: Some([9u8; 32]),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_waits_for_slowest_not_sum() {
        let engine = SimulationEngine::new(fixed_latency_config(3, 1000)).unwrap();
        let run = run_realtime(engine, CancellationToken::new()).await;

        assert_eq!(run.samples.len(), 1);
        assert_eq!(run.samples[0].timestamp_ms, 1100);
        assert_eq!(run.samples[0].measurement_window_ms, 100.0);
        assert_eq!(run.samples[0].active_count(), 3);
        assert!(!run.cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_flushes_collected_samples() {
        let engine = SimulationEngine::new(fixed_latency_config(2, 60_000)).unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            trigger.cancel();
        });

        let mut sink = MemorySink::default();
        let run = run_realtime_to_sink(engine, cancel, &mut sink).await.unwrap();

        assert!(run.cancelled);
        let stamps: Vec<SimTime> = run.samples.iter().map(|s| s.timestamp_ms).collect();
        assert_eq!(stamps, vec![1100, 2100]);
        assert_eq!(sink.runs.len(), 1);
        assert_eq!(sink.runs[0].samples.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_relay_filters_own_reports() {
        let relay = BroadcastRelay::new(16);
        let mut peer0 = relay.subscribe(0);
        let engine = SimulationBuilder::new(fixed_latency_config(3, 1000))
            .event_sink(relay.clone())
            .build()
            .unwrap();
        run_realtime(engine, CancellationToken::new()).await;

        let first = peer0.recv().await.unwrap();
        let second = peer0.try_next().unwrap();
        assert_eq!(first.peer, 1);
        assert_eq!(second.peer, 2);
        assert_eq!(first.time_ms, 1100);
        assert_eq!(first.bandwidth_kbps, 1000.0);
        assert!(peer0.try_next().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_in_flight_tick_and_its_churn() {
        let mut config = fixed_latency_config(2, 10_000);
        config.churn_mode = ChurnMode::GlobalRate { rate: 1.0 };
        let engine = SimulationEngine::new(config).unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2050)).await;
            trigger.cancel();
        });

        let run = run_realtime(engine, cancel).await;

        // tick 1 empties the swarm; tick 2 rejoins both but is still measuring at 2050ms
        assert!(run.cancelled);
        assert_eq!(run.samples.len(), 1);
        assert_eq!(run.samples[0].timestamp_ms, 1000);
        assert_eq!(run.samples[0].active_count(), 0);
        assert_eq!(run.churn.departures, 2);
        assert_eq!(run.churn.rejoins, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_latency_does_not_panic() {
        let mut config = fixed_latency_config(2, 10_000);
        if let Some(profile) = config.network_condition_override.as_mut() {
            profile.latency_ms = 1e30;
        }
        assert!(config.validate().is_ok());
        let engine = SimulationEngine::new(config).unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            trigger.cancel();
        });

        let run = run_realtime(engine, cancel).await;
        assert!(run.cancelled);
        assert!(run.samples.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_tick_interval_does_not_panic() {
        let mut config = fixed_latency_config(1, u64::MAX);
        config.tick_interval_ms = u64::MAX;
        let engine = SimulationEngine::new(config).unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1000)).await;
            trigger.cancel();
        });

        let run = run_realtime(engine, cancel).await;
        assert!(run.cancelled);
        assert!(run.samples.is_empty());
    }

    #[tokio::test]
    async fn test_relay_closed_when_dropped() {
        let relay = BroadcastRelay::new(4);
        let mut sub = relay.subscribe(5);
        drop(relay);
        assert!(sub.recv().await.is_none());
    }
}
