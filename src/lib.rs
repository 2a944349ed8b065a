pub mod collection;
pub mod db;
pub mod features;
pub mod metrics;
pub mod models;
pub mod normalization;
pub mod settings;
pub mod sinks;
pub mod utils;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use log::{info, warn};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use collection::{CollectionScheduler, Fetcher, HttpFetcher, RunOutcome, SchedulerConfig};
use db::{Database, RunPersistSink};
use features::FeatureExtractor;
use metrics::MetricsCollector;
use normalization::NormalizationChain;
use settings::{PipelineConfig, Secrets};
use sinks::{
    export::timestamped_path, write_readings_json, write_run_summary, CsvFeatureExporter,
    DisabledUpload, Exporter, HttpUploadSink, PersistSink, RetryPolicy, RetryableSink, RunSummary,
    UploadSink,
};

pub use utils::init_logging;

/// Files and counts produced by one `collect` run.
#[derive(Debug)]
pub struct CollectReport {
    pub run_id: String,
    pub outcome: RunOutcome,
    pub readings_path: Option<PathBuf>,
    pub features_path: Option<PathBuf>,
    pub summary_path: PathBuf,
}

fn file_prefix(config: &PipelineConfig, kind: &str) -> String {
    format!("{}_{kind}", config.city.trim().to_lowercase().replace(' ', "_"))
}

/// Upload sink for the configured endpoint, or a no-op when none is set.
pub fn build_upload_sink(config: &PipelineConfig, secrets: &Secrets) -> Result<Arc<dyn UploadSink>> {
    match &config.upload.endpoint {
        Some(endpoint) => {
            let sink = HttpUploadSink::new(
                endpoint.clone(),
                secrets.upload_key.clone(),
                config.upload.mapping.clone(),
                config.upload.max_batch,
                Duration::from_secs(config.sources.timeout_secs),
            )
            .context("failed to build upload client")?;
            Ok(Arc::new(sink))
        }
        None => {
            info!("No upload endpoint configured, uploads disabled");
            Ok(Arc::new(DisabledUpload))
        }
    }
}

/// Full collection run against the real sources and database.
pub async fn run_collect(
    config: &PipelineConfig,
    secrets: &Secrets,
    cancel: CancellationToken,
) -> Result<CollectReport> {
    let run_id = Uuid::new_v4().to_string();
    let db = Database::new(config.output.database_path.clone())?;
    let persist: Arc<dyn PersistSink> = Arc::new(RunPersistSink::new(db, run_id.clone()));
    let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(config.sources.clone(), secrets)?);
    let upload = build_upload_sink(config, secrets)?;

    collect_with(fetcher, persist, upload, config, run_id, cancel).await
}

/// Run the scheduler with the given collaborators and export the results.
///
/// Fails only when the persistence backend is unreachable up front or the
/// run summary cannot be written.
pub async fn collect_with(
    fetcher: Arc<dyn Fetcher>,
    persist: Arc<dyn PersistSink>,
    upload: Arc<dyn UploadSink>,
    config: &PipelineConfig,
    run_id: String,
    cancel: CancellationToken,
) -> Result<CollectReport> {
    persist
        .check()
        .await
        .context("persistence backend is unreachable")?;

    let started_at = Utc::now();
    let metrics = MetricsCollector::new();
    let scheduler = CollectionScheduler::new(
        fetcher,
        NormalizationChain::new(config.city.clone(), config.normalization.clone()),
        persist,
        upload,
        SchedulerConfig {
            total_collection_time: config.collection.total_collection_time(),
            request_interval: config.collection.request_interval(),
            retry: config.retry.policy(),
        },
    )
    .with_metrics(metrics.clone());

    info!("Starting run {run_id} for {}", config.city);
    let outcome = scheduler.run(cancel).await;

    let save_dir = &config.output.save_directory;
    let (readings_path, features_path) = if outcome.records.is_empty() {
        warn!("No readings collected, skipping data and feature export");
        (None, None)
    } else {
        let readings = write_readings_json(
            &outcome.records,
            &timestamped_path(save_dir, &file_prefix(config, "data"), "json"),
        )
        .map_err(|err| warn!("Failed to save readings: {err}"))
        .ok();

        let rows = FeatureExtractor::new(config.features.clone()).extract(&outcome.records);
        let features = CsvFeatureExporter
            .write_features(
                &rows,
                &timestamped_path(save_dir, &file_prefix(config, "features"), "csv"),
            )
            .map_err(|err| warn!("Failed to save features: {err}"))
            .ok();
        (readings, features)
    };

    let summary = RunSummary {
        run_id: run_id.clone(),
        city: config.city.clone(),
        started_at,
        finished_at: Utc::now(),
        cancelled: outcome.cancelled,
        records: outcome.records.len(),
        metrics: metrics.get_snapshot().await,
    };
    let summary_path = write_run_summary(
        &summary,
        &timestamped_path(save_dir, &file_prefix(config, "run"), "json"),
    )
    .context("failed to write run summary")?;

    Ok(CollectReport {
        run_id,
        outcome,
        readings_path,
        features_path,
        summary_path,
    })
}

/// Re-send the most recent stored readings, oldest first.
pub async fn upload_from_db(
    db: &Database,
    upload: Arc<dyn UploadSink>,
    retry: RetryPolicy,
    limit: usize,
) -> Result<usize> {
    let mut readings = db.recent_readings(limit).await?;
    readings.reverse();
    info!(
        "Uploading {} of {} stored reading(s)",
        readings.len(),
        db.count_readings().await?
    );

    RetryableSink::new(upload, retry)
        .upload(&readings)
        .await
        .context("upload failed")?;
    Ok(readings.len())
}

pub async fn run_upload(config: &PipelineConfig, secrets: &Secrets, limit: usize) -> Result<usize> {
    if config.upload.endpoint.is_none() {
        bail!("upload.endpoint is not configured");
    }
    let db = Database::new(config.output.database_path.clone())?;
    let upload = build_upload_sink(config, secrets)?;
    upload_from_db(&db, upload, config.retry.policy(), limit).await
}

/// Rebuild the feature table from the latest stored readings.
pub async fn features_from_db(
    db: &Database,
    config: &PipelineConfig,
    limit: usize,
) -> Result<Option<PathBuf>> {
    let readings = db.recent_readings(limit).await?;
    if readings.is_empty() {
        warn!("No stored readings, nothing to export");
        return Ok(None);
    }

    let rows = FeatureExtractor::new(config.features.clone()).extract(&readings);
    let path = CsvFeatureExporter
        .write_features(
            &rows,
            &timestamped_path(
                &config.output.save_directory,
                &file_prefix(config, "features"),
                "csv",
            ),
        )
        .context("failed to write features")?;
    Ok(Some(path))
}

pub async fn run_features(config: &PipelineConfig, limit: usize) -> Result<Option<PathBuf>> {
    let db = Database::new(config.output.database_path.clone())?;
    features_from_db(&db, config, limit).await
}
