pub mod feature_row;
pub mod pollutant;
pub mod reading;

pub use feature_row::{AqiCategory, CarbonIntensityCategory, FeatureRow, Season, WindowMeans};
pub use pollutant::{Pollutant, PollutantLevels};
pub use reading::{NormalizedRecord, RawReading, MISSING_SENTINEL};
