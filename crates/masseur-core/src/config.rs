//! Plan configuration: named fields, validated once at start.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::recorder::{Decile, WINDOW};

/// Intensity ceiling: shed every request.
pub(crate) const FULL_INTENSITY: u32 = 100;

/// Largest accepted per-adjustment intensity step.
pub const MAX_INTENSITY_STEP: u32 = 10;

/// Largest accepted hysteresis check period.
pub const MAX_CHECK_PERIOD_SECS: u64 = 10;

/// Tuning knobs for a [`crate::Plan`].
///
/// The defaults match the reference deployment: a sample at or above 80%
/// counts as high load, the plan turns tired once more than 20% of the
/// trailing window is high load, shedding starts at 50% and is adjusted
/// in steps of 1 every 3 quiet-or-busy seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlanConfig {
    /// Load percent at or above which a sample counts as high load.
    /// Must be a multiple of 10 within `0..=90`.
    pub high_load_decile: u32,

    /// Share of the trailing ~100-sample window that must be high load
    /// before the plan turns tired. Within `[0.1, 1.0]`.
    pub high_load_ratio: f64,

    /// Shedding intensity applied on every entry into the tired state,
    /// `0..=100`.
    pub initial_intensity: u32,

    /// Intensity change per adjustment, `1..=10`.
    pub intensity_step: u32,

    /// Hysteresis window in seconds: load must hold steadily high (or low)
    /// this long before the intensity moves. `1..=10`.
    pub check_period_secs: u64,

    /// Tick of the background sampling loop in milliseconds.
    pub sample_interval_ms: u64,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            high_load_decile: 80,
            high_load_ratio: 0.2,
            initial_intensity: 50,
            intensity_step: 1,
            check_period_secs: 3,
            sample_interval_ms: 1000,
        }
    }
}

/// Parameters compiled out of a valid `PlanConfig`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Tuning {
    pub(crate) decile: Decile,
    pub(crate) high_load_threshold: u32,
    pub(crate) initial_intensity: u32,
    pub(crate) intensity_step: u32,
    pub(crate) check_period: Duration,
    pub(crate) sample_interval: Duration,
}

impl PlanConfig {
    /// Check every field against its accepted range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tuning().map(|_| ())
    }

    pub(crate) fn tuning(&self) -> Result<Tuning, ConfigError> {
        let Some(decile) = Decile::from_percent(self.high_load_decile) else {
            return Err(ConfigError::HighLoadDecile(self.high_load_decile));
        };
        if !(0.1..=1.0).contains(&self.high_load_ratio) {
            return Err(ConfigError::HighLoadRatio(self.high_load_ratio));
        }
        if self.initial_intensity > FULL_INTENSITY {
            return Err(ConfigError::InitialIntensity(self.initial_intensity));
        }
        if self.intensity_step == 0 || self.intensity_step > MAX_INTENSITY_STEP {
            return Err(ConfigError::IntensityStep(self.intensity_step));
        }
        if self.check_period_secs == 0 || self.check_period_secs > MAX_CHECK_PERIOD_SECS {
            return Err(ConfigError::CheckPeriod(self.check_period_secs));
        }
        if self.sample_interval_ms == 0 {
            return Err(ConfigError::SampleInterval);
        }
        Ok(Tuning {
            decile,
            // Truncating like integer math keeps the strict `>` comparison
            // float-free on the hot tick.
            high_load_threshold: (f64::from(WINDOW) * self.high_load_ratio) as u32,
            initial_intensity: self.initial_intensity,
            intensity_step: self.intensity_step,
            check_period: Duration::from_secs(self.check_period_secs),
            sample_interval: Duration::from_millis(self.sample_interval_ms),
        })
    }

    /// Load a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|err| ConfigError::File(err.to_string()))?;
        toml::from_str(&content).map_err(|err| ConfigError::File(err.to_string()))
    }
}
