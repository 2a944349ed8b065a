//! Feature table rows derived from normalized readings.

use serde::{Deserialize, Serialize};

use super::pollutant::{Pollutant, PollutantLevels};
use super::reading::{nan_as_null, NormalizedRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Autumn,
}

impl Season {
    /// Dec–Feb winter, Mar–May spring, Jun–Aug summer, Sep–Nov autumn.
    pub fn from_month(month: u32) -> Self {
        match month {
            3..=5 => Season::Spring,
            6..=8 => Season::Summer,
            9..=11 => Season::Autumn,
            _ => Season::Winter,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Season::Winter => "Winter",
            Season::Spring => "Spring",
            Season::Summer => "Summer",
            Season::Autumn => "Autumn",
        }
    }
}

/// Ordered AQI bands, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AqiCategory {
    #[serde(rename = "Good")]
    Good,
    #[serde(rename = "Moderate")]
    Moderate,
    #[serde(rename = "Unhealthy for Sensitive Groups")]
    UnhealthyForSensitiveGroups,
    #[serde(rename = "Unhealthy")]
    Unhealthy,
    #[serde(rename = "Very Unhealthy")]
    VeryUnhealthy,
    #[serde(rename = "Hazardous")]
    Hazardous,
}

impl AqiCategory {
    pub const ORDERED: [AqiCategory; 6] = [
        AqiCategory::Good,
        AqiCategory::Moderate,
        AqiCategory::UnhealthyForSensitiveGroups,
        AqiCategory::Unhealthy,
        AqiCategory::VeryUnhealthy,
        AqiCategory::Hazardous,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            AqiCategory::Good => "Good",
            AqiCategory::Moderate => "Moderate",
            AqiCategory::UnhealthyForSensitiveGroups => "Unhealthy for Sensitive Groups",
            AqiCategory::Unhealthy => "Unhealthy",
            AqiCategory::VeryUnhealthy => "Very Unhealthy",
            AqiCategory::Hazardous => "Hazardous",
        }
    }
}

/// Ordered grid carbon-intensity bands, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CarbonIntensityCategory {
    #[serde(rename = "Very Low")]
    VeryLow,
    #[serde(rename = "Low")]
    Low,
    #[serde(rename = "Moderate")]
    Moderate,
    #[serde(rename = "High")]
    High,
    #[serde(rename = "Very High")]
    VeryHigh,
}

impl CarbonIntensityCategory {
    pub const ORDERED: [CarbonIntensityCategory; 5] = [
        CarbonIntensityCategory::VeryLow,
        CarbonIntensityCategory::Low,
        CarbonIntensityCategory::Moderate,
        CarbonIntensityCategory::High,
        CarbonIntensityCategory::VeryHigh,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            CarbonIntensityCategory::VeryLow => "Very Low",
            CarbonIntensityCategory::Low => "Low",
            CarbonIntensityCategory::Moderate => "Moderate",
            CarbonIntensityCategory::High => "High",
            CarbonIntensityCategory::VeryHigh => "Very High",
        }
    }
}

/// Trailing means over the last `window` records for every rolled column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowMeans {
    pub window: usize,
    #[serde(with = "nan_as_null")]
    pub aqi: f64,
    #[serde(with = "nan_as_null")]
    pub carbon_intensity: f64,
    pub pollutants: PollutantLevels,
}

/// One row of the feature table. Rows are built once and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub record: NormalizedRecord,
    pub hour: u32,
    /// Monday = 0 … Sunday = 6.
    pub day_of_week: u32,
    pub is_weekend: bool,
    pub season: Season,
    pub aqi_category: Option<AqiCategory>,
    pub carbon_intensity_category: Option<CarbonIntensityCategory>,
    pub dominant_pollutant: Pollutant,
    pub rolling: Vec<WindowMeans>,
}

impl FeatureRow {
    pub fn window(&self, window: usize) -> Option<&WindowMeans> {
        self.rolling.iter().find(|means| means.window == window)
    }
}
