use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Configuration for feature extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Rolling window sizes, in records (one record per polling interval).
    pub windows: Vec<usize>,

    /// Upper (inclusive) edges of the first five AQI bands.
    pub aqi_breaks: [f64; 5],

    /// Upper (inclusive) edges of the first four carbon-intensity bands.
    pub carbon_breaks: [f64; 4],

    /// Offset applied to UTC timestamps before deriving hour, weekday and season.
    pub utc_offset_minutes: i32,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            windows: vec![3, 24],
            aqi_breaks: [50.0, 100.0, 150.0, 200.0, 300.0],
            carbon_breaks: [100.0, 200.0, 300.0, 400.0],
            utc_offset_minutes: 0,
        }
    }
}

impl FeatureConfig {
    pub fn validate(&self) -> Result<()> {
        if self.windows.iter().any(|w| *w == 0) {
            bail!("rolling windows must be at least one record");
        }
        if !is_ascending(&self.aqi_breaks) {
            bail!("aqi_breaks must be strictly ascending: {:?}", self.aqi_breaks);
        }
        if !is_ascending(&self.carbon_breaks) {
            bail!(
                "carbon_breaks must be strictly ascending: {:?}",
                self.carbon_breaks
            );
        }
        // chrono's FixedOffset only accepts offsets strictly inside a day.
        if self.utc_offset_minutes.abs() >= 24 * 60 {
            bail!("utc_offset_minutes out of range: {}", self.utc_offset_minutes);
        }
        Ok(())
    }
}

fn is_ascending(breaks: &[f64]) -> bool {
    breaks.iter().all(|b| b.is_finite()) && breaks.windows(2).all(|pair| pair[0] < pair[1])
}
