//! Error types for the overload-protection engine.

use thiserror::Error;

/// A `PlanConfig` field is outside its accepted range.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("high_load_decile must be a multiple of 10 within 0..=90, got {0}")]
    HighLoadDecile(u32),

    #[error("high_load_ratio must be within [0.1, 1.0], got {0} (0.2 is recommended)")]
    HighLoadRatio(f64),

    #[error("initial_intensity must not exceed 100, got {0} (50 is recommended)")]
    InitialIntensity(u32),

    #[error("intensity_step must be within 1..=10, got {0} (1 is recommended)")]
    IntensityStep(u32),

    #[error("check_period_secs must be within 1..=10, got {0} (3 is recommended)")]
    CheckPeriod(u64),

    #[error("sample_interval_ms must be greater than zero")]
    SampleInterval,

    #[error("failed to load config file: {0}")]
    File(String),
}

/// Failure to start a `Plan`.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("invalid config: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("massage plan already started")]
    AlreadyStarted,
}
