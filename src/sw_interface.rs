// stable slot index of a simulated peer - reused across leave/rejoin
pub type PeerId = usize;

// elapsed simulated milliseconds since run start
pub type SimTime = u64;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::sw_profile::ProfileLabel;

// ============================================================================
// Random Source
// ============================================================================

/// Source of uniform draws in `[0, 1)` driving every stochastic decision of a run.
///
/// The engine draws in a fixed order (churn pass in index order, then one
/// measurement draw per active peer) so an injected deterministic source
/// reproduces a run exactly.
pub trait RandomSource {
    fn next_unit(&mut self) -> f64;

    /// Uniform draw in `[low, high)`.
    fn next_in(&mut self, low: f64, high: f64) -> f64 {
        self.next_unit() * (high - low) + low
    }
}

/// Adapts any `rand` generator (`StdRng`, `ThreadRng`, ...) into a [`RandomSource`].
pub struct RngSource<R: Rng>(pub R);

impl<R: Rng> RandomSource for RngSource<R> {
    fn next_unit(&mut self) -> f64 {
        self.0.gen::<f64>()
    }
}

/// Replays a fixed sequence of unit values, wrapping around at the end.
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    values: Vec<f64>,
    cursor: usize,
}

impl ScriptedSource {
    /// Values are clamped into `[0, 1)`. An empty script always yields 0.
    pub fn new(values: Vec<f64>) -> Self {
        let values = values
            .into_iter()
            .map(|v| v.clamp(0.0, 1.0 - f64::EPSILON))
            .collect();
        Self { values, cursor: 0 }
    }

    /// Number of draws taken so far
    pub fn draws(&self) -> usize {
        self.cursor
    }
}

impl RandomSource for ScriptedSource {
    fn next_unit(&mut self) -> f64 {
        if self.values.is_empty() {
            self.cursor += 1;
            return 0.0;
        }
        let value = self.values[self.cursor % self.values.len()];
        self.cursor += 1;
        value
    }
}

// ============================================================================
// Playback Metrics Source
// ============================================================================

/// Client-observed playback quality for one peer at one sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaybackReading {
    pub startup_delay_s: f64,
    pub buffering_events: u32,
    pub p2p_bandwidth: f64,
    pub playback_latency_s: f64,
}

/// The metrics source had nothing for this peer at this sample.
#[derive(Debug, Clone, thiserror::Error)]
#[error("playback metrics unavailable for peer {peer} at {at_ms}ms")]
pub struct MetricsUnavailable {
    pub peer: PeerId,
    pub at_ms: SimTime,
}

/// Opaque playback engine consulted once per active peer per sample.
pub trait MetricsSource {
    fn read(&mut self, peer: PeerId, at_ms: SimTime) -> Result<PlaybackReading, MetricsUnavailable>;
}

/// Metrics source for runs without an attached player: every reading is zero.
pub struct NullMetricsSource;

impl MetricsSource for NullMetricsSource {
    #[inline(always)]
    fn read(&mut self, _peer: PeerId, _at_ms: SimTime) -> Result<PlaybackReading, MetricsUnavailable> {
        Ok(PlaybackReading::default())
    }
}

impl<F> MetricsSource for F
where
    F: FnMut(PeerId, SimTime) -> Option<PlaybackReading>,
{
    fn read(&mut self, peer: PeerId, at_ms: SimTime) -> Result<PlaybackReading, MetricsUnavailable> {
        self(peer, at_ms).ok_or(MetricsUnavailable { peer, at_ms })
    }
}

// ============================================================================
// Event Logging System
// ============================================================================

/// Events emitted by the swarm engine for relays, logs and analysis
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SwarmEvent {
    /// Peer slot became active with a freshly drawn profile
    PeerJoined {
        label: ProfileLabel,
        rejoin: bool,
        churn_probability: f64,
    },
    /// Peer churned out
    PeerLeft { churn_probability: f64 },
    /// Bandwidth measured for a peer after its simulated latency
    BandwidthMeasured {
        bandwidth_kbps: f64,
        latency_ms: f64,
    },
}

/// Trait for consuming events from the swarm engine
pub trait EventSink {
    fn log(&mut self, time: SimTime, peer: PeerId, event: SwarmEvent);
}

/// No-op event sink (zero overhead)
pub struct NoOpSink;

impl EventSink for NoOpSink {
    #[inline(always)]
    fn log(&mut self, _time: SimTime, _peer: PeerId, _event: SwarmEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_scripted_source_wraps() {
        let mut src = ScriptedSource::new(vec![0.1, 0.2]);
        assert_eq!(src.next_unit(), 0.1);
        assert_eq!(src.next_unit(), 0.2);
        assert_eq!(src.next_unit(), 0.1);
        assert_eq!(src.draws(), 3);
    }

    #[test]
    fn test_scripted_source_clamps_to_unit_interval() {
        let mut src = ScriptedSource::new(vec![1.0, -3.0]);
        assert!(src.next_unit() < 1.0);
        assert_eq!(src.next_unit(), 0.0);
    }

    #[test]
    fn test_next_in_range() {
        let mut src = RngSource(StdRng::seed_from_u64(7));
        for _ in 0..1000 {
            let v = src.next_in(150.0, 300.0);
            assert!((150.0..300.0).contains(&v));
        }
    }

    #[test]
    fn test_closure_metrics_source() {
        let mut source = |peer: PeerId, _at: SimTime| {
            if peer == 0 {
                Some(PlaybackReading {
                    startup_delay_s: 1.5,
                    ..Default::default()
                })
            } else {
                None
            }
        };
        assert_eq!(source.read(0, 1000).unwrap().startup_delay_s, 1.5);
        let err = source.read(3, 2000).unwrap_err();
        assert_eq!(err.peer, 3);
        assert_eq!(err.at_ms, 2000);
    }
}
