pub mod bins;
pub mod config;
pub mod extractor;
pub mod rolling;
pub mod temporal;

pub use config::FeatureConfig;
pub use extractor::{extract, FeatureExtractor};
