//! File exports written at the end of a run.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::MetricsSnapshot;
use crate::models::{FeatureRow, NormalizedRecord, Pollutant};

use super::{Exporter, SinkResult};

/// `<dir>/<prefix>_<YYYYmmdd_HHMMSS>.<ext>`, local time.
pub fn timestamped_path(dir: &Path, prefix: &str, ext: &str) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    dir.join(format!("{prefix}_{stamp}.{ext}"))
}

fn ensure_parent(path: &Path) -> SinkResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn format_float(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        format!("{value:.2}")
    }
}

/// Feature table as CSV with two-decimal floats and empty cells for missing values.
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvFeatureExporter;

impl CsvFeatureExporter {
    fn header(windows: &[usize]) -> Vec<String> {
        let mut header: Vec<String> = ["city", "timestamp", "aqi", "carbon_intensity"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        header.extend(Pollutant::ALL.iter().map(|p| p.code().to_string()));
        header.extend(
            [
                "hour",
                "day_of_week",
                "is_weekend",
                "season",
                "aqi_category",
                "carbon_intensity_category",
                "dominant_pollutant",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        for w in windows {
            header.push(format!("aqi_rolling_{w}h"));
            header.push(format!("carbon_intensity_rolling_{w}h"));
            header.extend(
                Pollutant::ALL
                    .iter()
                    .map(|p| format!("{}_rolling_{w}h", p.code())),
            );
        }
        header
    }

    fn row(row: &FeatureRow) -> Vec<String> {
        let record = &row.record;
        let mut cells = vec![
            record.city.clone(),
            record
                .timestamp
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            format_float(record.aqi),
            record.carbon_intensity.to_string(),
        ];
        cells.extend(record.pollutants.iter().map(|(_, v)| format_float(v)));
        cells.extend([
            row.hour.to_string(),
            row.day_of_week.to_string(),
            row.is_weekend.to_string(),
            row.season.as_str().to_string(),
            row.aqi_category
                .map(|c| c.label().to_string())
                .unwrap_or_default(),
            row.carbon_intensity_category
                .map(|c| c.label().to_string())
                .unwrap_or_default(),
            row.dominant_pollutant.code().to_string(),
        ]);
        for means in &row.rolling {
            cells.push(format_float(means.aqi));
            cells.push(format_float(means.carbon_intensity));
            cells.extend(means.pollutants.iter().map(|(_, v)| format_float(v)));
        }
        cells
    }
}

impl Exporter for CsvFeatureExporter {
    fn write_features(&self, rows: &[FeatureRow], destination: &Path) -> SinkResult<PathBuf> {
        ensure_parent(destination)?;

        let windows: Vec<usize> = rows
            .first()
            .map(|row| row.rolling.iter().map(|m| m.window).collect())
            .unwrap_or_default();

        let mut writer = csv::Writer::from_path(destination)?;
        writer.write_record(Self::header(&windows))?;
        for row in rows {
            writer.write_record(Self::row(row))?;
        }
        writer.flush()?;

        log::info!(
            "Features saved to {} ({} rows)",
            destination.display(),
            rows.len()
        );
        Ok(destination.to_path_buf())
    }
}

/// Raw session buffer as a pretty-printed JSON array.
pub fn write_readings_json(records: &[NormalizedRecord], destination: &Path) -> SinkResult<PathBuf> {
    ensure_parent(destination)?;
    let json = serde_json::to_string_pretty(records)?;
    fs::write(destination, json)?;
    log::info!(
        "{} reading(s) saved to {}",
        records.len(),
        destination.display()
    );
    Ok(destination.to_path_buf())
}

/// What a collection run did, written next to its exports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub city: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub cancelled: bool,
    pub records: usize,
    pub metrics: MetricsSnapshot,
}

pub fn write_run_summary(summary: &RunSummary, destination: &Path) -> SinkResult<PathBuf> {
    ensure_parent(destination)?;
    fs::write(destination, serde_json::to_string_pretty(summary)?)?;
    Ok(destination.to_path_buf())
}
