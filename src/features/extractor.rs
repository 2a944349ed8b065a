use crate::models::{FeatureRow, NormalizedRecord, Pollutant, PollutantLevels, WindowMeans};

use super::bins::{aqi_category, carbon_intensity_category, dominant_pollutant};
use super::config::FeatureConfig;
use super::rolling::rolling_mean;
use super::temporal::{offset_from_minutes, temporal_features};

/// Builds the feature table for a batch of normalized readings.
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    config: FeatureConfig,
}

impl FeatureExtractor {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    /// Sort by timestamp and derive one [`FeatureRow`] per record.
    ///
    /// The whole table is recomputed from scratch on every call.
    pub fn extract(&self, records: &[NormalizedRecord]) -> Vec<FeatureRow> {
        if records.is_empty() {
            return Vec::new();
        }

        // Stable: equal timestamps keep their collection order.
        let mut sorted = records.to_vec();
        sorted.sort_by_key(|record| record.timestamp);

        let rolling = self.rolling_columns(&sorted);
        let offset = offset_from_minutes(self.config.utc_offset_minutes);

        sorted
            .into_iter()
            .enumerate()
            .map(|(i, record)| {
                let temporal = temporal_features(record.timestamp, offset);
                let windows = rolling.iter().map(|columns| columns.at(i)).collect();

                FeatureRow {
                    hour: temporal.hour,
                    day_of_week: temporal.day_of_week,
                    is_weekend: temporal.is_weekend,
                    season: temporal.season,
                    aqi_category: aqi_category(record.aqi, &self.config.aqi_breaks),
                    carbon_intensity_category: carbon_intensity_category(
                        record.carbon_intensity,
                        &self.config.carbon_breaks,
                    ),
                    dominant_pollutant: dominant_pollutant(&record.pollutants),
                    rolling: windows,
                    record,
                }
            })
            .collect()
    }

    fn rolling_columns(&self, sorted: &[NormalizedRecord]) -> Vec<RollingColumns> {
        // Missing-value sentinels become NaN so they drop out of the means.
        let aqi: Vec<f64> = sorted
            .iter()
            .map(|r| if r.has_aqi() { r.aqi } else { f64::NAN })
            .collect();
        let carbon: Vec<f64> = sorted
            .iter()
            .map(|r| {
                if r.has_carbon_intensity() {
                    r.carbon_intensity as f64
                } else {
                    f64::NAN
                }
            })
            .collect();
        let pollutants: Vec<Vec<f64>> = Pollutant::ALL
            .iter()
            .map(|p| sorted.iter().map(|r| r.pollutant(*p)).collect())
            .collect();

        self.config
            .windows
            .iter()
            .map(|&window| RollingColumns {
                window,
                aqi: rolling_mean(&aqi, window),
                carbon_intensity: rolling_mean(&carbon, window),
                pollutants: pollutants
                    .iter()
                    .map(|column| rolling_mean(column, window))
                    .collect(),
            })
            .collect()
    }
}

/// Rolling means for one window size, column-major.
struct RollingColumns {
    window: usize,
    aqi: Vec<f64>,
    carbon_intensity: Vec<f64>,
    /// Indexed like [`Pollutant::ALL`].
    pollutants: Vec<Vec<f64>>,
}

impl RollingColumns {
    fn at(&self, i: usize) -> WindowMeans {
        let mut levels = PollutantLevels::missing();
        for (pollutant, column) in Pollutant::ALL.iter().zip(&self.pollutants) {
            levels.set(*pollutant, column[i]);
        }

        WindowMeans {
            window: self.window,
            aqi: self.aqi[i],
            carbon_intensity: self.carbon_intensity[i],
            pollutants: levels,
        }
    }
}

/// Convenience wrapper over [`FeatureExtractor::extract`].
pub fn extract(records: &[NormalizedRecord], config: &FeatureConfig) -> Vec<FeatureRow> {
    FeatureExtractor::new(config.clone()).extract(records)
}
