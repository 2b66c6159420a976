use std::io;

use thiserror::Error;

use crate::sw_engine::SimulationRun;

/// Configuration rejected before a run starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("total_peers must be greater than zero")]
    NoPeers,

    #[error("duration_ms must be greater than zero")]
    ZeroDuration,

    #[error("tick_interval_ms must be greater than zero")]
    ZeroTickInterval,

    #[error("{name} = {value} is outside [0, 1]")]
    RateOutOfRange { name: &'static str, value: f64 },

    #[error("per-peer churn range is inverted: min {min} > max {max}")]
    InvertedRateRange { min: f64, max: f64 },

    #[error("network profile field {field} = {value} must be finite and non-negative")]
    InvalidProfile { field: &'static str, value: f64 },

    #[error("distance model {field} = {value} is invalid")]
    InvalidDistanceModel { field: &'static str, value: f64 },
}

/// Failure while serializing or writing results.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// The result sink rejected a finished run. The collected samples are kept
/// in `run` and handed back to the caller.
#[derive(Debug, Error)]
#[error("failed to write simulation run: {source}")]
pub struct SinkWriteFailure {
    pub run: Box<SimulationRun>,
    #[source]
    pub source: SinkError,
}
