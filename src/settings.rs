use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf, time::Duration};

use crate::features::FeatureConfig;
use crate::normalization::NormalizationConfig;
use crate::sinks::{FieldMapping, RetryPolicy};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionSettings {
    pub total_collection_time_secs: u64,
    pub request_interval_secs: u64,
}

impl Default for CollectionSettings {
    fn default() -> Self {
        Self {
            total_collection_time_secs: 3600,
            request_interval_secs: 300,
        }
    }
}

impl CollectionSettings {
    pub fn total_collection_time(&self) -> Duration {
        Duration::from_secs(self.total_collection_time_secs)
    }

    pub fn request_interval(&self) -> Duration {
        Duration::from_secs(self.request_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub attempts: u32,
    pub delay_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay_secs: 5,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.attempts, Duration::from_secs(self.delay_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub air_quality_url: String,
    pub carbon_intensity_url: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timeout_secs: u64,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            air_quality_url: "https://api.waqi.info/feed/sakarya/".into(),
            carbon_intensity_url: "https://api.electricitymap.org/v3/carbon-intensity/latest"
                .into(),
            latitude: 40.7569,
            longitude: 30.3783,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadSettings {
    pub endpoint: Option<String>,
    pub max_batch: usize,
    #[serde(flatten)]
    pub mapping: FieldMapping,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            max_batch: 100,
            mapping: FieldMapping::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub save_directory: PathBuf,
    pub database_path: PathBuf,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            save_directory: PathBuf::from("output"),
            database_path: PathBuf::from("data/airwatch.sqlite3"),
        }
    }
}

/// Everything the pipeline reads from `config.json`.
///
/// Every section falls back to its defaults, so an empty object (or a missing
/// file) is a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub city: String,
    pub collection: CollectionSettings,
    pub retry: RetrySettings,
    pub normalization: NormalizationConfig,
    pub features: FeatureConfig,
    pub sources: SourceSettings,
    pub upload: UploadSettings,
    pub output: OutputSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            city: "Sakarya".into(),
            collection: CollectionSettings::default(),
            retry: RetrySettings::default(),
            normalization: NormalizationConfig::default(),
            features: FeatureConfig::default(),
            sources: SourceSettings::default(),
            upload: UploadSettings::default(),
            output: OutputSettings::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let config: PipelineConfig = if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config {}", path.display()))?
        } else {
            log::info!("No config at {}, using defaults", path.display());
            PipelineConfig::default()
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.collection.request_interval_secs == 0 {
            bail!("collection.request_interval_secs must be greater than zero");
        }
        if self.retry.attempts == 0 {
            bail!("retry.attempts must be at least 1");
        }
        if self.upload.max_batch == 0 {
            bail!("upload.max_batch must be at least 1");
        }
        self.normalization
            .validate()
            .context("invalid normalization section")?;
        self.features.validate().context("invalid features section")?;
        Ok(())
    }
}

/// API credentials, read from the environment only.
#[derive(Clone, Default)]
pub struct Secrets {
    pub aqi_token: Option<String>,
    pub carbon_token: Option<String>,
    pub upload_key: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        let read = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            aqi_token: read("AQI_API_TOKEN"),
            carbon_token: read("CARBON_API_TOKEN"),
            upload_key: read("UPLOAD_API_KEY"),
        }
    }
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |v: &Option<String>| if v.is_some() { "***" } else { "<unset>" };
        f.debug_struct("Secrets")
            .field("aqi_token", &mask(&self.aqi_token))
            .field("carbon_token", &mask(&self.carbon_token))
            .field("upload_key", &mask(&self.upload_key))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = PipelineConfig::load(&tmp.path().join("nope.json")).unwrap();
        assert_eq!(config.city, "Sakarya");
        assert_eq!(config.collection.request_interval_secs, 300);
        assert_eq!(config.retry.attempts, 3);
        assert_eq!(config.features.windows, vec![3, 24]);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(
            &path,
            r#"{ "collection": { "request_interval_secs": 30 }, "upload": { "city_code": 1 } }"#,
        )
        .unwrap();

        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.collection.request_interval_secs, 30);
        assert_eq!(config.collection.total_collection_time_secs, 3600);
        assert_eq!(config.upload.mapping.city_code, Some(1));
        assert_eq!(config.upload.mapping.drop_fields, vec!["timestamp".to_string()]);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = PipelineConfig::default();
        config.collection.request_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut config = PipelineConfig::default();
        config.retry.attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(PipelineConfig::load(&path).is_err());
    }

    #[test]
    fn test_secrets_debug_is_masked() {
        let secrets = Secrets {
            aqi_token: Some("abc".into()),
            carbon_token: None,
            upload_key: None,
        };
        let shown = format!("{secrets:?}");
        assert!(!shown.contains("abc"));
        assert!(shown.contains("***"));
    }
}
