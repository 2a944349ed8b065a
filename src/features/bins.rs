use crate::models::{AqiCategory, CarbonIntensityCategory, Pollutant, PollutantLevels, MISSING_SENTINEL};

/// Index of the right-inclusive bin `value` falls into.
///
/// `breaks` are the upper edges of every bin except the last, ascending.
/// A value equal to an edge belongs to the lower bin.
fn bin_index(value: f64, breaks: &[f64]) -> usize {
    breaks.iter().take_while(|edge| value > **edge).count()
}

/// `None` when the reading carries no usable AQI. Negative values are
/// treated as missing rather than falling in the lowest bin.
pub fn aqi_category(aqi: f64, breaks: &[f64; 5]) -> Option<AqiCategory> {
    if !aqi.is_finite() || aqi < 0.0 {
        return None;
    }
    AqiCategory::ORDERED.get(bin_index(aqi, breaks)).copied()
}

/// `None` for the `-1` missing sentinel rather than the lowest bin.
pub fn carbon_intensity_category(
    carbon_intensity: i64,
    breaks: &[f64; 4],
) -> Option<CarbonIntensityCategory> {
    if carbon_intensity == MISSING_SENTINEL {
        return None;
    }
    CarbonIntensityCategory::ORDERED
        .get(bin_index(carbon_intensity as f64, breaks))
        .copied()
}

/// Pollutant with the highest instantaneous value.
///
/// Missing values count as zero here only. Ties go to the earliest pollutant
/// in [`Pollutant::ALL`] order.
pub fn dominant_pollutant(levels: &PollutantLevels) -> Pollutant {
    let as_score = |v: f64| if v.is_finite() { v } else { 0.0 };

    let mut best = Pollutant::ALL[0];
    let mut best_value = as_score(levels.get(best));
    for (pollutant, value) in levels.iter().skip(1) {
        let value = as_score(value);
        if value > best_value {
            best = pollutant;
            best_value = value;
        }
    }
    best
}
