//! Integration tests for the airwatch pipeline.
//!
//! These drive the full path with a scripted fetcher:
//! fetch → normalize → SQLite → feature table → export files.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use airwatch::collection::{Fetcher, SourceKind};
use airwatch::db::{Database, RunPersistSink};
use airwatch::models::{NormalizedRecord, Pollutant, RawReading};
use airwatch::settings::PipelineConfig;
use airwatch::sinks::{DisabledUpload, PersistSink, RetryPolicy, SinkResult, UploadSink};

/// Serves a fixed AQI series, one value per cycle.
struct ScriptedFetcher {
    aqi: Vec<serde_json::Value>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    fn new(aqi: Vec<serde_json::Value>) -> Self {
        Self {
            aqi,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch_source(&self, source: SourceKind) -> Option<RawReading> {
        match source {
            SourceKind::AirQuality => {
                let n = self.calls.fetch_add(1, Ordering::SeqCst);
                let aqi = self.aqi.get(n).cloned().unwrap_or(json!(0));
                Some(json!({
                    "status": "ok",
                    "data": {
                        "aqi": aqi,
                        "iaqi": { "pm25": { "v": aqi }, "no2": { "v": 7 } }
                    }
                }))
            }
            SourceKind::CarbonIntensity => Some(json!({
                "carbonIntensity": 420,
                "datetime": "2024-01-01T00:00:00.000Z",
                "updatedAt": "2024-01-01T00:05:00.000Z"
            })),
        }
    }
}

fn config_in(dir: &std::path::Path) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.collection.total_collection_time_secs = 100;
    config.collection.request_interval_secs = 30;
    config.output.save_directory = dir.join("output");
    config.output.database_path = dir.join("data").join("airwatch.sqlite3");
    config
}

#[tokio::test(start_paused = true)]
async fn collect_persists_and_exports_every_cycle() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config_in(tmp.path());

    let db = Database::new(config.output.database_path.clone()).unwrap();
    let persist: Arc<dyn PersistSink> = Arc::new(RunPersistSink::new(db.clone(), "run-1"));
    let upload: Arc<dyn UploadSink> = Arc::new(DisabledUpload);
    let fetcher = Arc::new(ScriptedFetcher::new(vec![
        json!(40),
        json!("-"),
        json!("612"),
        json!(75),
    ]));

    let report = airwatch::collect_with(
        fetcher,
        persist,
        upload,
        &config,
        "run-1".to_string(),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(report.outcome.cycles, 4);
    assert_eq!(report.outcome.records.len(), 4);
    assert!(!report.outcome.records[1].has_aqi());
    assert_eq!(report.outcome.records[2].aqi, 500.0);

    let stored = db.readings_for_run("run-1").await.unwrap();
    assert_eq!(stored.len(), 4);
    assert!(stored[1].aqi.is_nan());
    assert_eq!(stored[3].pollutant(Pollutant::Pm25), 75.0);

    let features = report.features_path.expect("features exported");
    let mut reader = csv::Reader::from_path(&features).unwrap();
    assert_eq!(reader.records().count(), 4);
    assert!(report.readings_path.is_some());
    assert!(report.summary_path.exists());
}

#[tokio::test]
async fn features_rebuilt_from_database() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config_in(tmp.path());
    let db = Database::new(config.output.database_path.clone()).unwrap();

    let chain = airwatch::normalization::NormalizationChain::new(
        "Sakarya",
        config.normalization.clone(),
    );
    let carbon = json!({
        "carbonIntensity": 150,
        "datetime": "2024-01-01T00:00:00.000Z",
        "updatedAt": "2024-01-01T00:05:00.000Z"
    });
    for aqi in [20, 60, 120] {
        let raw = json!({ "status": "ok", "data": { "aqi": aqi } });
        let normalized = chain.normalize(&raw, &carbon).unwrap();
        db.insert_reading("seed", &normalized.record).await.unwrap();
    }

    let path = airwatch::features_from_db(&db, &config, 10)
        .await
        .unwrap()
        .expect("rows exported");
    let mut reader = csv::Reader::from_path(&path).unwrap();
    let headers = reader.headers().unwrap().clone();
    let category = headers.iter().position(|h| h == "aqi_category").unwrap();
    let labels: Vec<String> = reader
        .records()
        .map(|r| r.unwrap()[category].to_string())
        .collect();
    assert_eq!(labels.len(), 3);
    assert!(labels.contains(&"Unhealthy for Sensitive Groups".to_string()));
}

#[tokio::test]
async fn unreachable_persistence_is_fatal_up_front() {
    struct DownSink;

    #[async_trait]
    impl PersistSink for DownSink {
        async fn persist(
            &self,
            _record: &airwatch::models::NormalizedRecord,
        ) -> airwatch::sinks::SinkResult<()> {
            unreachable!("persist must not run when the check fails")
        }

        async fn check(&self) -> airwatch::sinks::SinkResult<()> {
            Err(airwatch::sinks::SinkError::Persistence("connection refused".into()))
        }
    }

    let tmp = tempfile::tempdir().unwrap();
    let config = config_in(tmp.path());
    let fetcher = Arc::new(ScriptedFetcher::new(vec![json!(10)]));

    let result = airwatch::collect_with(
        fetcher.clone(),
        Arc::new(DownSink),
        Arc::new(DisabledUpload),
        &config,
        "run-x".to_string(),
        CancellationToken::new(),
    )
    .await;

    assert!(result.is_err());
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn stored_readings_reuploaded_oldest_first() {
    struct RecordingUpload {
        sent: Mutex<Vec<f64>>,
    }

    #[async_trait]
    impl UploadSink for RecordingUpload {
        fn max_batch(&self) -> usize {
            10
        }

        async fn upload(&self, batch: &[NormalizedRecord]) -> SinkResult<()> {
            self.sent
                .lock()
                .unwrap()
                .extend(batch.iter().map(|r| r.aqi));
            Ok(())
        }
    }

    let tmp = tempfile::tempdir().unwrap();
    let config = config_in(tmp.path());
    let db = Database::new(config.output.database_path.clone()).unwrap();

    let chain = airwatch::normalization::NormalizationChain::new(
        "Sakarya",
        config.normalization.clone(),
    );
    let carbon = json!({
        "carbonIntensity": 150,
        "datetime": "2024-01-01T00:00:00.000Z",
        "updatedAt": "2024-01-01T00:05:00.000Z"
    });
    for aqi in [10, 20, 30] {
        let raw = json!({ "status": "ok", "data": { "aqi": aqi } });
        let normalized = chain.normalize(&raw, &carbon).unwrap();
        db.insert_reading("seed", &normalized.record).await.unwrap();
    }

    let sink = Arc::new(RecordingUpload {
        sent: Mutex::new(Vec::new()),
    });
    let policy = RetryPolicy::new(1, Duration::from_millis(1));
    let sent = airwatch::upload_from_db(&db, sink.clone(), policy, 2)
        .await
        .unwrap();

    assert_eq!(sent, 2);
    assert_eq!(*sink.sent.lock().unwrap(), vec![20.0, 30.0]);
}
