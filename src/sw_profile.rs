use std::fmt;

use serde::{Deserialize, Serialize};

use crate::sw_error::ConfigError;
use crate::sw_interface::RandomSource;

// ============================================================================
// Network Profile
// ============================================================================

/// Catalog class of a network profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProfileLabel {
    GoodStable,
    PoorStable,
    Unstable,
}

impl ProfileLabel {
    pub const ALL: [ProfileLabel; 3] = [
        ProfileLabel::GoodStable,
        ProfileLabel::PoorStable,
        ProfileLabel::Unstable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileLabel::GoodStable => "GOOD_STABLE",
            ProfileLabel::PoorStable => "POOR_STABLE",
            ProfileLabel::Unstable => "UNSTABLE",
        }
    }
}

impl fmt::Display for ProfileLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bandwidth, latency and jitter governing a peer's simulated network behavior.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetworkProfile {
    pub bandwidth_kbps: f64,
    pub latency_ms: f64,
    pub jitter_pct: f64,
    pub label: ProfileLabel,
}

pub const GOOD_STABLE: NetworkProfile = NetworkProfile {
    bandwidth_kbps: 5000.0,
    latency_ms: 50.0,
    jitter_pct: 10.0,
    label: ProfileLabel::GoodStable,
};

pub const POOR_STABLE: NetworkProfile = NetworkProfile {
    bandwidth_kbps: 1000.0,
    latency_ms: 100.0,
    jitter_pct: 20.0,
    label: ProfileLabel::PoorStable,
};

/// UNSTABLE draw ranges, half-open
pub const UNSTABLE_BANDWIDTH_KBPS: (f64, f64) = (100.0, 1000.0);
pub const UNSTABLE_LATENCY_MS: (f64, f64) = (150.0, 300.0);
pub const UNSTABLE_JITTER_PCT: (f64, f64) = (50.0, 100.0);

// catalog split points: [0, 0.33) good, [0.33, 0.66) poor, rest unstable
const GOOD_CUTOFF: f64 = 0.33;
const POOR_CUTOFF: f64 = 0.66;

impl NetworkProfile {
    /// Fresh UNSTABLE profile; bandwidth, latency and jitter are drawn in that order.
    pub fn unstable(rng: &mut dyn RandomSource) -> Self {
        Self {
            bandwidth_kbps: rng.next_in(UNSTABLE_BANDWIDTH_KBPS.0, UNSTABLE_BANDWIDTH_KBPS.1),
            latency_ms: rng.next_in(UNSTABLE_LATENCY_MS.0, UNSTABLE_LATENCY_MS.1),
            jitter_pct: rng.next_in(UNSTABLE_JITTER_PCT.0, UNSTABLE_JITTER_PCT.1),
            label: ProfileLabel::Unstable,
        }
    }

    /// All numeric fields finite and non-negative
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("bandwidth_kbps", self.bandwidth_kbps),
            ("latency_ms", self.latency_ms),
            ("jitter_pct", self.jitter_pct),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidProfile { field, value });
            }
        }
        Ok(())
    }
}

// ============================================================================
// Profile Generator
// ============================================================================

/// Assigns profiles to newly created peers.
///
/// Without an override this is the three-way catalog (fast/stable, slow/stable,
/// volatile). With an override every peer gets the same profile and no
/// randomness is consumed.
#[derive(Debug, Clone, Default)]
pub struct ProfileGenerator {
    override_profile: Option<NetworkProfile>,
}

impl ProfileGenerator {
    pub fn new(override_profile: Option<NetworkProfile>) -> Self {
        Self { override_profile }
    }

    pub fn assign(&self, rng: &mut dyn RandomSource) -> NetworkProfile {
        if let Some(profile) = self.override_profile {
            return profile;
        }

        let u = rng.next_unit();
        if u < GOOD_CUTOFF {
            GOOD_STABLE
        } else if u < POOR_CUTOFF {
            POOR_STABLE
        } else {
            NetworkProfile::unstable(rng)
        }
    }
}
