use serde::{Deserialize, Serialize};

use crate::sw_churn::ChurnPolicy;
use crate::sw_interface::{PeerId, RandomSource};
use crate::sw_profile::{NetworkProfile, ProfileGenerator};

// ============================================================================
// Peer
// ============================================================================

/// Lifecycle state of a peer slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeerStatus {
    Active,
    Inactive,
}

/// A simulated peer. The record outlives churn: leaving only flips `status`.
#[derive(Debug, Clone, PartialEq)]
pub struct Peer {
    pub id: PeerId,
    pub profile: NetworkProfile,
    /// Last measured bandwidth (kbps); starts at the profile bandwidth
    pub current_bandwidth: f64,
    pub status: PeerStatus,
    /// Probability of leaving on a tick, fixed when the peer (re)joins
    pub churn_probability: f64,
    pub contribution_ratio: f64,
    /// Position on the simulated map, only when placement is enabled
    pub position: Option<(f64, f64)>,
    /// Number of times this slot has joined the swarm
    pub joins: u32,
}

impl Peer {
    pub fn is_active(&self) -> bool {
        self.status == PeerStatus::Active
    }
}

// ============================================================================
// Swarm (Peer Registry)
// ============================================================================

/// Fixed set of peer slots `0..N-1`. Slots are never renumbered or removed;
/// churn toggles status in place and rejoin overwrites the slot.
#[derive(Debug, Clone)]
pub struct Swarm {
    peers: Vec<Peer>,
    generator: ProfileGenerator,
    /// Side length of the square peers are placed on, when placement is enabled
    placement_extent: Option<f64>,
}

impl Swarm {
    /// Create `total_peers` active peers, each with a freshly assigned profile.
    pub fn populate(
        total_peers: usize,
        generator: ProfileGenerator,
        placement_extent: Option<f64>,
        policy: &dyn ChurnPolicy,
        rng: &mut dyn RandomSource,
    ) -> Self {
        let mut swarm = Self {
            peers: Vec::with_capacity(total_peers),
            generator,
            placement_extent,
        };
        for id in 0..total_peers {
            let peer = swarm.fresh_peer(id, 1, policy, rng);
            swarm.peers.push(peer);
        }
        swarm
    }

    fn fresh_peer(
        &self,
        id: PeerId,
        joins: u32,
        policy: &dyn ChurnPolicy,
        rng: &mut dyn RandomSource,
    ) -> Peer {
        let profile = self.generator.assign(rng);
        let churn_probability = policy.rate_for(&profile, rng);
        let position = self
            .placement_extent
            .map(|extent| (rng.next_in(0.0, extent), rng.next_in(0.0, extent)));

        Peer {
            id,
            profile,
            current_bandwidth: profile.bandwidth_kbps,
            status: PeerStatus::Active,
            churn_probability,
            contribution_ratio: 0.0,
            position,
            joins,
        }
    }

    /// (Re)create the peer at `index` with a new profile draw. Returns `None`
    /// for an index outside the swarm.
    pub fn create(
        &mut self,
        index: PeerId,
        policy: &dyn ChurnPolicy,
        rng: &mut dyn RandomSource,
    ) -> Option<&Peer> {
        let joins = self.peers.get(index)?.joins + 1;
        let peer = self.fresh_peer(index, joins, policy, rng);
        self.peers[index] = peer;
        Some(&self.peers[index])
    }

    /// Mark the peer at `index` inactive. The profile stays until the next
    /// `create`. Returns true if the peer was active.
    pub fn remove(&mut self, index: PeerId) -> bool {
        match self.peers.get_mut(index) {
            Some(peer) if peer.is_active() => {
                peer.status = PeerStatus::Inactive;
                true
            }
            _ => false,
        }
    }

    /// Mean current bandwidth over active peers, 0 when none are active.
    pub fn average_bandwidth(&self) -> f64 {
        let (total, count) = self
            .active()
            .fold((0.0, 0usize), |(sum, n), p| (sum + p.current_bandwidth, n + 1));
        if count == 0 {
            0.0
        } else {
            total / count as f64
        }
    }

    /// Peer bandwidth relative to the current swarm average (0 if the average is 0).
    pub fn contribution_ratio(&self, index: PeerId) -> f64 {
        let Some(peer) = self.peers.get(index) else {
            return 0.0;
        };
        let average = self.average_bandwidth();
        if average > 0.0 {
            peer.current_bandwidth / average
        } else {
            0.0
        }
    }

    /// Euclidean distance from the peer to peer 0 on the simulated map
    pub fn distance_to_origin(&self, index: PeerId) -> Option<f64> {
        let (x1, y1) = self.peers.get(index)?.position?;
        let (x0, y0) = self.peers.first()?.position?;
        Some(((x1 - x0).powi(2) + (y1 - y0).powi(2)).sqrt())
    }

    pub fn get(&self, index: PeerId) -> Option<&Peer> {
        self.peers.get(index)
    }

    pub(crate) fn get_mut(&mut self, index: PeerId) -> Option<&mut Peer> {
        self.peers.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Peer> {
        self.peers.iter()
    }

    pub fn active(&self) -> impl Iterator<Item = &Peer> {
        self.peers.iter().filter(|p| p.is_active())
    }

    pub fn active_count(&self) -> usize {
        self.active().count()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
