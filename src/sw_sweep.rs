use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::sw_churn::ChurnMode;
use crate::sw_config::SimulationConfig;
use crate::sw_engine::{SimulationEngine, SimulationRun};
use crate::sw_error::ConfigError;
use crate::sw_profile::NetworkProfile;

/// Global churn rates 0.05, 0.10, ... 0.50
pub fn default_sweep_rates() -> Vec<f64> {
    (1..=10).map(|i| i as f64 * 0.05).collect()
}

/// Run `base` once per global churn rate. Each run gets its own seed derived
/// from the master seed (`base.seed`, or a fresh one) and is labelled
/// `churn-<rate>`. All configurations are validated before any run starts.
pub fn run_sweep(base: &SimulationConfig, rates: &[f64]) -> Result<Vec<SimulationRun>, ConfigError> {
    let configs = rates
        .iter()
        .map(|&rate| SimulationConfig {
            churn_mode: ChurnMode::GlobalRate { rate },
            label: Some(format!("churn-{:.2}", rate)),
            ..base.clone()
        })
        .collect();
    run_all(base, configs)
}

/// Run `base` once per forced network condition, labelled by the condition.
pub fn run_condition_sweep(
    base: &SimulationConfig,
    conditions: &[NetworkProfile],
) -> Result<Vec<SimulationRun>, ConfigError> {
    let configs = conditions
        .iter()
        .map(|&profile| SimulationConfig {
            network_condition_override: Some(profile),
            label: Some(format!("condition-{}", profile.label)),
            ..base.clone()
        })
        .collect();
    run_all(base, configs)
}

fn run_all(base: &SimulationConfig, mut configs: Vec<SimulationConfig>) -> Result<Vec<SimulationRun>, ConfigError> {
    for config in &configs {
        config.validate()?;
    }

    let master = base.seed.unwrap_or_else(|| rand::thread_rng().gen());
    let mut seeds = StdRng::from_seed(master);
    for config in configs.iter_mut() {
        config.seed = Some(seeds.gen());
    }

    let total = configs.len();
    let mut runs = Vec::with_capacity(total);
    for (i, config) in configs.into_iter().enumerate() {
        info!(
            "sweep run {}/{}: {}",
            i + 1,
            total,
            config.label.as_deref().unwrap_or("unlabelled")
        );
        runs.push(SimulationEngine::new(config)?.run());
    }
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sw_profile::{GOOD_STABLE, POOR_STABLE};

    fn base() -> SimulationConfig {
        SimulationConfig {
            total_peers: 4,
            duration_ms: 3000,
            seed: Some([42u8; 32]),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_rates() {
        let rates = default_sweep_rates();
        assert_eq!(rates.len(), 10);
        assert!((rates[0] - 0.05).abs() < 1e-12);
        assert!((rates[9] - 0.50).abs() < 1e-12);
    }

    #[test]
    fn test_sweep_labels_and_seeds() {
        let runs = run_sweep(&base(), &[0.1, 0.3]).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].label.as_deref(), Some("churn-0.10"));
        assert_eq!(runs[1].label.as_deref(), Some("churn-0.30"));
        assert_eq!(runs[1].churn_mode, ChurnMode::GlobalRate { rate: 0.3 });
        assert_ne!(runs[0].seed, runs[1].seed);
        assert!(runs.iter().all(|r| r.samples.len() == 3));
    }

    #[test]
    fn test_sweep_reproducible_from_master_seed() {
        let a = run_sweep(&base(), &[0.2, 0.4]).unwrap();
        let b = run_sweep(&base(), &[0.2, 0.4]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_sweep_rejects_bad_rate_up_front() {
        let err = run_sweep(&base(), &[0.1, 1.5]).unwrap_err();
        assert!(matches!(err, ConfigError::RateOutOfRange { value, .. } if value == 1.5));
    }

    #[test]
    fn test_condition_sweep() {
        let runs = run_condition_sweep(&base(), &[GOOD_STABLE, POOR_STABLE]).unwrap();
        assert_eq!(runs[0].label.as_deref(), Some("condition-GOOD_STABLE"));
        for sample in &runs[1].samples {
            for peer in &sample.active_peers {
                assert_eq!(peer.latency, 100.0);
            }
        }
    }
}
