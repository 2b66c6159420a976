use log::debug;
use serde::{Deserialize, Serialize};

use crate::sw_error::ConfigError;
use crate::sw_interface::{EventSink, PeerId, RandomSource, SimTime, SwarmEvent};
use crate::sw_profile::NetworkProfile;
use crate::sw_registry::{PeerStatus, Swarm};

// ============================================================================
// Churn Policies
// ============================================================================

/// Decides the leave probability a peer carries for its current session.
///
/// Called once whenever a peer (re)joins; the result is stored on the peer
/// and used on every following tick until it leaves.
pub trait ChurnPolicy {
    fn rate_for(&self, profile: &NetworkProfile, rng: &mut dyn RandomSource) -> f64;
}

/// Same churn probability for every peer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobalRate(pub f64);

impl ChurnPolicy for GlobalRate {
    fn rate_for(&self, _profile: &NetworkProfile, _rng: &mut dyn RandomSource) -> f64 {
        self.0
    }
}

/// Each peer draws its own fixed rate from `[min, max)` when it joins
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerPeerRate {
    pub min: f64,
    pub max: f64,
}

impl ChurnPolicy for PerPeerRate {
    fn rate_for(&self, _profile: &NetworkProfile, rng: &mut dyn RandomSource) -> f64 {
        if self.max > self.min {
            rng.next_in(self.min, self.max)
        } else {
            self.min
        }
    }
}

/// Volatile links churn more: jitter above the threshold gets `high_rate`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JitterThreshold {
    pub threshold_pct: f64,
    pub high_rate: f64,
    pub low_rate: f64,
}

impl Default for JitterThreshold {
    fn default() -> Self {
        Self {
            threshold_pct: 30.0,
            high_rate: 0.10,
            low_rate: 0.05,
        }
    }
}

impl ChurnPolicy for JitterThreshold {
    fn rate_for(&self, profile: &NetworkProfile, _rng: &mut dyn RandomSource) -> f64 {
        if profile.jitter_pct > self.threshold_pct {
            self.high_rate
        } else {
            self.low_rate
        }
    }
}

impl<F> ChurnPolicy for F
where
    F: Fn(&NetworkProfile) -> f64,
{
    fn rate_for(&self, profile: &NetworkProfile, _rng: &mut dyn RandomSource) -> f64 {
        self(profile)
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Churn probability policy selected by configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ChurnMode {
    GlobalRate {
        rate: f64,
    },
    PerPeerRate {
        min: f64,
        max: f64,
    },
    JitterBased {
        #[serde(default = "default_jitter_threshold")]
        threshold_pct: f64,
        #[serde(default = "default_high_rate")]
        high_rate: f64,
        #[serde(default = "default_low_rate")]
        low_rate: f64,
    },
}

fn default_jitter_threshold() -> f64 {
    JitterThreshold::default().threshold_pct
}

fn default_high_rate() -> f64 {
    JitterThreshold::default().high_rate
}

fn default_low_rate() -> f64 {
    JitterThreshold::default().low_rate
}

impl ChurnMode {
    pub fn jitter_based() -> Self {
        let t = JitterThreshold::default();
        ChurnMode::JitterBased {
            threshold_pct: t.threshold_pct,
            high_rate: t.high_rate,
            low_rate: t.low_rate,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            ChurnMode::GlobalRate { rate } => check_rate("churn_mode.rate", rate),
            ChurnMode::PerPeerRate { min, max } => {
                check_rate("churn_mode.min", min)?;
                check_rate("churn_mode.max", max)?;
                if min > max {
                    return Err(ConfigError::InvertedRateRange { min, max });
                }
                Ok(())
            }
            ChurnMode::JitterBased {
                threshold_pct,
                high_rate,
                low_rate,
            } => {
                if !threshold_pct.is_finite() || threshold_pct < 0.0 {
                    return Err(ConfigError::InvalidProfile {
                        field: "churn_mode.threshold_pct",
                        value: threshold_pct,
                    });
                }
                check_rate("churn_mode.high_rate", high_rate)?;
                check_rate("churn_mode.low_rate", low_rate)
            }
        }
    }

    pub fn policy(&self) -> Box<dyn ChurnPolicy + Send + Sync> {
        match *self {
            ChurnMode::GlobalRate { rate } => Box::new(GlobalRate(rate)),
            ChurnMode::PerPeerRate { min, max } => Box::new(PerPeerRate { min, max }),
            ChurnMode::JitterBased {
                threshold_pct,
                high_rate,
                low_rate,
            } => Box::new(JitterThreshold {
                threshold_pct,
                high_rate,
                low_rate,
            }),
        }
    }
}

fn check_rate(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::RateOutOfRange { name, value })
    }
}

/// How an inactive peer comes back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejoinPolicy {
    /// Rejoin on the tick after leaving
    #[default]
    Unconditional,
    /// Rejoin with the peer's own churn probability each tick
    Probabilistic,
}

// ============================================================================
// Churn Driver
// ============================================================================

/// Transitions applied during one churn pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChurnOutcome {
    pub departed: Vec<PeerId>,
    pub rejoined: Vec<PeerId>,
}

/// Per-peer ACTIVE/INACTIVE state machine run once per tick over every slot
pub struct ChurnDriver {
    policy: Box<dyn ChurnPolicy + Send + Sync>,
    rejoin: RejoinPolicy,
}

impl ChurnDriver {
    pub fn new(policy: Box<dyn ChurnPolicy + Send + Sync>, rejoin: RejoinPolicy) -> Self {
        Self { policy, rejoin }
    }

    pub fn policy(&self) -> &dyn ChurnPolicy {
        self.policy.as_ref()
    }

    pub fn rejoin(&self) -> RejoinPolicy {
        self.rejoin
    }

    /// Visit slots `0..N-1` in order; each peer makes at most one transition.
    pub fn run_pass(
        &self,
        swarm: &mut Swarm,
        rng: &mut dyn RandomSource,
        events: &mut dyn EventSink,
        time: SimTime,
    ) -> ChurnOutcome {
        let mut outcome = ChurnOutcome::default();

        for index in 0..swarm.len() {
            let Some(peer) = swarm.get(index) else {
                continue;
            };
            let probability = peer.churn_probability;
            let status = peer.status;

            match status {
                PeerStatus::Active => {
                    if rng.next_unit() < probability {
                        swarm.remove(index);
                        debug!("peer {} churned out (p={:.4})", index, probability);
                        events.log(time, index, SwarmEvent::PeerLeft { churn_probability: probability });
                        outcome.departed.push(index);
                    }
                }
                PeerStatus::Inactive => {
                    let rejoin = match self.rejoin {
                        RejoinPolicy::Unconditional => true,
                        RejoinPolicy::Probabilistic => rng.next_unit() < probability,
                    };
                    if !rejoin {
                        continue;
                    }
                    if let Some(peer) = swarm.create(index, self.policy.as_ref(), rng) {
                        debug!(
                            "peer {} rejoined as {} (p={:.4})",
                            index, peer.profile.label, peer.churn_probability
                        );
                        events.log(
                            time,
                            index,
                            SwarmEvent::PeerJoined {
                                label: peer.profile.label,
                                rejoin: true,
                                churn_probability: peer.churn_probability,
                            },
                        );
                        outcome.rejoined.push(index);
                    }
                }
            }
        }

        outcome
    }
}
