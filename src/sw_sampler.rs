use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::sw_error::ConfigError;
use crate::sw_interface::{PeerId, RandomSource};
use crate::sw_profile::NetworkProfile;
use crate::sw_registry::Swarm;

// ============================================================================
// Distance Model
// ============================================================================

/// Bandwidth penalty for peers far from peer 0 on the simulated map.
/// Measured bandwidth is divided by `1 + alpha * distance`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistancePenalty {
    pub alpha: f64,
    /// Side length of the square peers are placed on
    #[serde(default = "default_extent")]
    pub extent: f64,
}

fn default_extent() -> f64 {
    1000.0
}

impl DistancePenalty {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.alpha.is_finite() || self.alpha < 0.0 {
            return Err(ConfigError::InvalidDistanceModel {
                field: "alpha",
                value: self.alpha,
            });
        }
        if !self.extent.is_finite() || self.extent <= 0.0 {
            return Err(ConfigError::InvalidDistanceModel {
                field: "extent",
                value: self.extent,
            });
        }
        Ok(())
    }

    pub fn scale(&self, bandwidth_kbps: f64, distance: f64) -> f64 {
        bandwidth_kbps / (1.0 + self.alpha * distance)
    }
}

// ============================================================================
// Measurement
// ============================================================================

/// Simulated bandwidth reading: profile bandwidth boosted by up to `jitter_pct`
/// percent, one fresh draw per call.
pub fn measure(profile: &NetworkProfile, rng: &mut dyn RandomSource) -> f64 {
    let fluctuation = 1.0 + rng.next_unit() * profile.jitter_pct / 100.0;
    profile.bandwidth_kbps * fluctuation
}

/// A measurement whose value is already drawn but which completes only after
/// the peer's simulated latency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingMeasurement {
    pub peer: PeerId,
    pub delay_ms: f64,
    pub bandwidth_kbps: f64,
}

impl PendingMeasurement {
    /// Latency as a `Duration`, saturating at `Duration::MAX`
    pub fn delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.delay_ms.max(0.0) / 1000.0).unwrap_or(Duration::MAX)
    }
}

/// Draw one measurement per active peer, in slot order.
pub fn plan_measurements(
    swarm: &Swarm,
    rng: &mut dyn RandomSource,
    penalty: Option<&DistancePenalty>,
) -> Vec<PendingMeasurement> {
    let mut pending = Vec::with_capacity(swarm.len());
    for peer in swarm.active() {
        let mut bandwidth_kbps = measure(&peer.profile, rng);
        if let (Some(penalty), Some(distance)) = (penalty, swarm.distance_to_origin(peer.id)) {
            bandwidth_kbps = penalty.scale(bandwidth_kbps, distance);
        }
        pending.push(PendingMeasurement {
            peer: peer.id,
            delay_ms: peer.profile.latency_ms,
            bandwidth_kbps,
        });
    }
    pending
}

/// Time a tick spends waiting on measurements issued concurrently: the slowest one.
pub fn measurement_window_ms(pending: &[PendingMeasurement]) -> f64 {
    pending.iter().map(|m| m.delay_ms).fold(0.0, f64::max)
}

/// First pass: store every measured bandwidth. Measurements for peers that
/// are no longer active are dropped.
pub fn apply_measurements(swarm: &mut Swarm, pending: &[PendingMeasurement]) {
    for m in pending {
        if let Some(peer) = swarm.get_mut(m.peer) {
            if peer.is_active() {
                peer.current_bandwidth = m.bandwidth_kbps;
            }
        }
    }
}

/// Second pass: every ratio against one consistent swarm average.
pub fn refresh_contributions(swarm: &mut Swarm) {
    let average = swarm.average_bandwidth();
    for index in 0..swarm.len() {
        if let Some(peer) = swarm.get_mut(index) {
            peer.contribution_ratio = if peer.is_active() && average > 0.0 {
                peer.current_bandwidth / average
            } else {
                0.0
            };
        }
    }
}
