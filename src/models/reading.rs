//! Reading data models.
//!
//! A [`RawReading`] is whatever JSON document a source returned. The
//! normalization chain turns one air-quality reading and one carbon-intensity
//! reading into a single flat [`NormalizedRecord`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::pollutant::{Pollutant, PollutantLevels};

/// Opaque nested document from one source, consumed immediately by
/// normalization.
pub type RawReading = serde_json::Value;

/// Sentinel stored in integer fields (and in nulled numeric fields) that had
/// no usable value.
pub const MISSING_SENTINEL: i64 = -1;

/// Flat, fully populated reading for one collection cycle.
///
/// Float fields use `NaN` for "not reported"; it serializes as JSON `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub city: String,
    #[serde(with = "nan_as_null")]
    pub aqi: f64,
    pub timestamp: DateTime<Utc>,
    pub carbon_intensity: i64,
    #[serde(flatten)]
    pub pollutants: PollutantLevels,
}

impl NormalizedRecord {
    pub fn pollutant(&self, pollutant: Pollutant) -> f64 {
        self.pollutants.get(pollutant)
    }

    pub fn has_aqi(&self) -> bool {
        self.aqi.is_finite() && self.aqi >= 0.0
    }

    pub fn has_carbon_intensity(&self) -> bool {
        self.carbon_intensity != MISSING_SENTINEL
    }
}

/// Serialize `NaN` as `null` and read `null` back as `NaN`.
pub(crate) mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_none()
        } else {
            serializer.serialize_some(value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}
