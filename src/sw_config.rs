// Swarm Simulation Configuration

use serde::{Deserialize, Serialize};

use crate::sw_churn::{ChurnMode, RejoinPolicy};
use crate::sw_error::ConfigError;
use crate::sw_profile::NetworkProfile;
use crate::sw_sampler::DistancePenalty;

// ============================================================================
// Main Configuration
// ============================================================================

/// Main configuration for a churn simulation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of peer slots, fixed for the run
    pub total_peers: usize,

    /// Run length (milliseconds of simulated time)
    pub duration_ms: u64,

    /// Time between churn/sampling ticks (milliseconds)
    pub tick_interval_ms: u64,

    /// Churn probability policy
    pub churn_mode: ChurnMode,

    /// How inactive peers come back
    pub rejoin: RejoinPolicy,

    /// Force every peer onto one profile instead of the catalog
    pub network_condition_override: Option<NetworkProfile>,

    /// Optional bandwidth penalty by simulated distance
    pub distance: Option<DistancePenalty>,

    /// Random seed for reproducibility
    #[serde(skip)]
    pub seed: Option<[u8; 32]>,

    /// Free-form run label carried into results
    pub label: Option<String>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            total_peers: 10,
            duration_ms: 10_000,
            tick_interval_ms: 1000,
            churn_mode: ChurnMode::GlobalRate { rate: 0.3 },
            rejoin: RejoinPolicy::Unconditional,
            network_condition_override: None,
            distance: None,
            seed: None,
            label: None,
        }
    }
}

impl SimulationConfig {
    /// Reject configurations that cannot produce a meaningful run
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.total_peers == 0 {
            return Err(ConfigError::NoPeers);
        }
        if self.duration_ms == 0 {
            return Err(ConfigError::ZeroDuration);
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::ZeroTickInterval);
        }
        self.churn_mode.validate()?;
        if let Some(profile) = &self.network_condition_override {
            profile.validate()?;
        }
        if let Some(distance) = &self.distance {
            distance.validate()?;
        }
        Ok(())
    }

    /// Number of ticks (and samples) a full run produces
    pub fn expected_ticks(&self) -> u64 {
        if self.tick_interval_ms == 0 {
            return 0;
        }
        self.duration_ms.div_ceil(self.tick_interval_ms)
    }

    pub fn summary(&self) -> String {
        format!(
            "Peers: {}, Duration: {}ms, Tick: {}ms, Churn: {:?}, Rejoin: {:?}",
            self.total_peers, self.duration_ms, self.tick_interval_ms, self.churn_mode, self.rejoin
        )
    }
}
