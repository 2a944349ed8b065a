use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::NormalizedRecord;
use crate::{log_debug, log_info};

use super::{SinkError, SinkResult, UploadSink};

const ENABLE_LOGS: bool = true;

/// Reshapes records for the analytics store's fixed schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldMapping {
    /// Columns removed before upload.
    pub drop_fields: Vec<String>,

    /// Numeric surrogate written in place of the city name.
    pub city_code: Option<i64>,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            drop_fields: vec!["timestamp".to_string()],
            city_code: None,
        }
    }
}

impl FieldMapping {
    pub fn apply(&self, record: &NormalizedRecord) -> SinkResult<Map<String, Value>> {
        let value =
            serde_json::to_value(record).map_err(|e| SinkError::Upload(e.to_string()))?;
        let Value::Object(mut fields) = value else {
            return Err(SinkError::Upload("record did not serialize to an object".into()));
        };

        for name in &self.drop_fields {
            fields.remove(name);
        }
        if let Some(code) = self.city_code {
            fields.insert("city".to_string(), Value::from(code));
        }
        Ok(fields)
    }
}

/// POSTs batches as a JSON array.
pub struct HttpUploadSink {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    mapping: FieldMapping,
    max_batch: usize,
}

impl HttpUploadSink {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        mapping: FieldMapping,
        max_batch: usize,
        timeout: Duration,
    ) -> SinkResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
            mapping,
            max_batch: max_batch.max(1),
        })
    }
}

#[async_trait]
impl UploadSink for HttpUploadSink {
    fn max_batch(&self) -> usize {
        self.max_batch
    }

    async fn upload(&self, batch: &[NormalizedRecord]) -> SinkResult<()> {
        if batch.len() > self.max_batch {
            return Err(SinkError::BatchTooLarge {
                len: batch.len(),
                max: self.max_batch,
            });
        }
        if batch.is_empty() {
            return Ok(());
        }

        let body = batch
            .iter()
            .map(|record| self.mapping.apply(record).map(Value::Object))
            .collect::<SinkResult<Vec<Value>>>()?;

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SinkError::Upload(format!(
                "{} responded {status}: {text}",
                self.endpoint
            )));
        }

        log_info!("uploaded {} record(s) to {}", batch.len(), self.endpoint);
        Ok(())
    }
}

/// Used when no upload endpoint is configured.
pub struct DisabledUpload;

#[async_trait]
impl UploadSink for DisabledUpload {
    fn max_batch(&self) -> usize {
        usize::MAX
    }

    async fn upload(&self, batch: &[NormalizedRecord]) -> SinkResult<()> {
        log_debug!("upload disabled, skipping {} record(s)", batch.len());
        Ok(())
    }
}
