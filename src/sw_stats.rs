// Run Summary Statistics

use std::collections::BTreeMap;

use serde::Serialize;

use crate::sw_engine::{ChurnCounters, SimulationRun};
use crate::sw_interface::PeerId;
use crate::sw_profile::ProfileLabel;

/// Averages over every sample in which the peer was active
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PeerAverages {
    pub peer_id: PeerId,
    pub samples: usize,
    pub bandwidth: f64,
    pub contribution_ratio: f64,
    pub startup_delay_s: f64,
    pub buffering_events: f64,
    pub p2p_bandwidth: f64,
    pub playback_latency_s: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActivePeerStats {
    pub min: usize,
    pub max: usize,
    pub mean: f64,
}

/// Aggregate view of a finished run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub label: String,
    pub total_peers: usize,
    pub samples: usize,
    pub cancelled: bool,
    pub active: ActivePeerStats,
    /// Snapshot count per profile label, over all samples
    pub label_counts: BTreeMap<ProfileLabel, usize>,
    pub churn: ChurnCounters,
    pub metrics_unavailable: usize,
    pub peers: Vec<PeerAverages>,
}

impl RunSummary {
    pub fn from_run(run: &SimulationRun) -> Self {
        let mut label_counts: BTreeMap<ProfileLabel, usize> =
            ProfileLabel::ALL.iter().map(|label| (*label, 0)).collect();
        let mut sums: BTreeMap<PeerId, PeerAverages> = BTreeMap::new();
        let mut active = ActivePeerStats {
            min: usize::MAX,
            max: 0,
            mean: 0.0,
        };

        for sample in &run.samples {
            let count = sample.active_count();
            active.min = active.min.min(count);
            active.max = active.max.max(count);
            active.mean += count as f64;

            for snap in &sample.active_peers {
                *label_counts.entry(snap.label).or_insert(0) += 1;

                let entry = sums.entry(snap.peer_id).or_insert_with(|| PeerAverages {
                    peer_id: snap.peer_id,
                    ..Default::default()
                });
                entry.samples += 1;
                entry.bandwidth += snap.bandwidth;
                entry.contribution_ratio += snap.contribution_ratio;
                entry.startup_delay_s += snap.playback.startup_delay_s;
                entry.buffering_events += snap.playback.buffering_events as f64;
                entry.p2p_bandwidth += snap.playback.p2p_bandwidth;
                entry.playback_latency_s += snap.playback.playback_latency_s;
            }
        }

        if run.samples.is_empty() {
            active.min = 0;
        } else {
            active.mean /= run.samples.len() as f64;
        }

        let peers = sums
            .into_values()
            .map(|mut p| {
                let n = p.samples as f64;
                p.bandwidth /= n;
                p.contribution_ratio /= n;
                p.startup_delay_s /= n;
                p.buffering_events /= n;
                p.p2p_bandwidth /= n;
                p.playback_latency_s /= n;
                p
            })
            .collect();

        Self {
            label: run.display_label(),
            total_peers: run.total_peers,
            samples: run.samples.len(),
            cancelled: run.cancelled,
            active,
            label_counts,
            churn: run.churn,
            metrics_unavailable: run.metrics_unavailable,
            peers,
        }
    }

    /// Share of all snapshots carrying `label`, in percent
    pub fn label_share(&self, label: ProfileLabel) -> f64 {
        let total: usize = self.label_counts.values().sum();
        if total == 0 {
            return 0.0;
        }
        self.label_counts.get(&label).copied().unwrap_or(0) as f64 * 100.0 / total as f64
    }

    /// Peers ordered by average contribution ratio, highest first
    pub fn top_contributors(&self, n: usize) -> Vec<&PeerAverages> {
        let mut ranked: Vec<&PeerAverages> = self.peers.iter().collect();
        ranked.sort_by(|a, b| {
            b.contribution_ratio
                .total_cmp(&a.contribution_ratio)
                .then(a.peer_id.cmp(&b.peer_id))
        });
        ranked.truncate(n);
        ranked
    }

    pub fn print_summary(&self) {
        println!("\n╔════════════════════════════════════════════════════════╗");
        println!("║    SWARM CHURN SIMULATION RESULTS                      ║");
        println!("╚════════════════════════════════════════════════════════╝\n");

        println!("Run: {}", self.label);
        println!("Peers: {}, Samples: {}{}", self.total_peers, self.samples,
            if self.cancelled { " (cancelled)" } else { "" });
        println!();

        println!("═══ Swarm Size ═══");
        println!("  Active Peers: min={}, max={}, avg={:.1}",
            self.active.min, self.active.max, self.active.mean);
        println!("  Departures: {}", self.churn.departures);
        println!("  Rejoins: {}", self.churn.rejoins);
        println!();

        println!("═══ Network Conditions ═══");
        for label in ProfileLabel::ALL {
            println!("  {:<12} {:>6} snapshots ({:.1}%)",
                label.as_str(),
                self.label_counts.get(&label).copied().unwrap_or(0),
                self.label_share(label));
        }
        println!();

        println!("═══ Per-Peer Averages ═══");
        println!("  {:>4} {:>7} {:>12} {:>8} {:>9} {:>9} {:>11} {:>9}",
            "peer", "samples", "bw (kbps)", "ratio", "startup", "buffer", "p2p (kbps)", "latency");
        for p in &self.peers {
            println!("  {:>4} {:>7} {:>12.1} {:>8.3} {:>8.2}s {:>9.2} {:>11.1} {:>8.2}s",
                p.peer_id, p.samples, p.bandwidth, p.contribution_ratio,
                p.startup_delay_s, p.buffering_events, p.p2p_bandwidth, p.playback_latency_s);
        }
        println!();

        println!("═══ Top Contributors ═══");
        for (rank, p) in self.top_contributors(5).iter().enumerate() {
            println!("  {}. peer {} (ratio {:.3})", rank + 1, p.peer_id, p.contribution_ratio);
        }
        if self.metrics_unavailable > 0 {
            println!("\n  Missing playback readings: {}", self.metrics_unavailable);
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sw_churn::{ChurnMode, RejoinPolicy};
    use crate::sw_engine::{MetricsSample, PeerSnapshot};
    use crate::sw_interface::PlaybackReading;

    fn snapshot(peer_id: PeerId, bandwidth: f64, ratio: f64, label: ProfileLabel) -> PeerSnapshot {
        PeerSnapshot {
            peer_id,
            bandwidth,
            latency: 50.0,
            jitter: 10.0,
            contribution_ratio: ratio,
            label,
            churn_probability: 0.1,
            distance: None,
            playback: PlaybackReading {
                buffering_events: 2,
                ..Default::default()
            },
        }
    }

    fn run_with(samples: Vec<MetricsSample>) -> SimulationRun {
        SimulationRun {
            label: Some("unit".to_string()),
            churn_mode: ChurnMode::GlobalRate { rate: 0.1 },
            rejoin: RejoinPolicy::Unconditional,
            network_condition_override: None,
            total_peers: 3,
            duration_ms: 2000,
            tick_interval_ms: 1000,
            seed: None,
            churn: ChurnCounters { departures: 1, rejoins: 0 },
            metrics_unavailable: 0,
            cancelled: false,
            samples,
        }
    }

    #[test]
    fn test_summary_aggregates() {
        let run = run_with(vec![
            MetricsSample {
                tick: 1,
                timestamp_ms: 1000,
                measurement_window_ms: 300.0,
                active_peers: vec![
                    snapshot(0, 1000.0, 0.5, ProfileLabel::PoorStable),
                    snapshot(1, 3000.0, 1.5, ProfileLabel::GoodStable),
                    snapshot(2, 2000.0, 1.0, ProfileLabel::Unstable),
                ],
            },
            MetricsSample {
                tick: 2,
                timestamp_ms: 2000,
                measurement_window_ms: 50.0,
                active_peers: vec![
                    snapshot(0, 3000.0, 1.5, ProfileLabel::PoorStable),
                    snapshot(1, 1000.0, 0.5, ProfileLabel::GoodStable),
                ],
            },
        ]);
        let summary = RunSummary::from_run(&run);

        assert_eq!(summary.samples, 2);
        assert_eq!(summary.active, ActivePeerStats { min: 2, max: 3, mean: 2.5 });
        assert_eq!(summary.label_counts[&ProfileLabel::PoorStable], 2);
        assert_eq!(summary.label_share(ProfileLabel::PoorStable), 40.0);

        assert_eq!(summary.peers.len(), 3);
        assert_eq!(summary.peers[0].bandwidth, 2000.0);
        assert_eq!(summary.peers[0].contribution_ratio, 1.0);
        assert_eq!(summary.peers[2].samples, 1);
        assert_eq!(summary.peers[1].buffering_events, 2.0);
    }

    #[test]
    fn test_top_contributors_order() {
        let run = run_with(vec![MetricsSample {
            tick: 1,
            timestamp_ms: 1000,
            measurement_window_ms: 0.0,
            active_peers: vec![
                snapshot(0, 1.0, 0.2, ProfileLabel::Unstable),
                snapshot(1, 1.0, 1.9, ProfileLabel::GoodStable),
                snapshot(2, 1.0, 0.9, ProfileLabel::PoorStable),
            ],
        }]);
        let summary = RunSummary::from_run(&run);
        let ids: Vec<PeerId> = summary.top_contributors(2).iter().map(|p| p.peer_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_empty_run() {
        let summary = RunSummary::from_run(&run_with(Vec::new()));
        assert_eq!(summary.active, ActivePeerStats::default());
        assert_eq!(summary.label_share(ProfileLabel::GoodStable), 0.0);
        assert!(summary.peers.is_empty());
        assert!(summary.top_contributors(3).is_empty());
    }
}
