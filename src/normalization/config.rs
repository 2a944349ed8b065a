use anyhow::{bail, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::models::MISSING_SENTINEL;

/// Tunables for the repair stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationConfig {
    /// Valid AQI range; values outside are clamped.
    pub aqi_range: [f64; 2],

    /// Valid carbon intensity range (gCO2eq/kWh); values outside are clamped.
    pub carbon_intensity_range: [i64; 2],

    /// Timestamps older than this (or in the future) are replaced with now.
    pub max_age_secs: i64,

    /// When true a missing float becomes `NaN` so rolling means skip it.
    /// When false it becomes `-1`, matching the integer sentinel.
    pub nan_for_missing_floats: bool,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            aqi_range: [0.0, 500.0],
            carbon_intensity_range: [0, 1000],
            max_age_secs: 24 * 60 * 60,
            nan_for_missing_floats: true,
        }
    }
}

impl NormalizationConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.aqi_range[0] <= self.aqi_range[1]) {
            bail!("aqi_range is inverted: {:?}", self.aqi_range);
        }
        if self.carbon_intensity_range[0] > self.carbon_intensity_range[1] {
            bail!(
                "carbon_intensity_range is inverted: {:?}",
                self.carbon_intensity_range
            );
        }
        if self.max_age_secs <= 0 {
            bail!("max_age_secs must be positive");
        }
        if Duration::try_seconds(self.max_age_secs).is_none() {
            bail!("max_age_secs {} is out of range", self.max_age_secs);
        }
        Ok(())
    }

    pub fn float_sentinel(&self) -> f64 {
        if self.nan_for_missing_floats {
            f64::NAN
        } else {
            MISSING_SENTINEL as f64
        }
    }
}
