use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use rusqlite::{params_from_iter, types::Value as SqlValue, Row};

use crate::db::{
    connection::Database,
    helpers::{float_or_nan, nullable_float, parse_datetime, to_i64},
};
use crate::models::{NormalizedRecord, Pollutant, PollutantLevels};
use crate::sinks::{PersistSink, SinkError, SinkResult};

const SELECT_COLUMNS: &str = "city, aqi, timestamp, carbon_intensity, \
     co, dew, h, no2, o3, p, pm10, pm25, so2, t, w";

fn map_reading(row: &Row<'_>) -> Result<NormalizedRecord> {
    let timestamp: String = row.get(2)?;

    let mut pollutants = PollutantLevels::missing();
    for (offset, pollutant) in Pollutant::ALL.iter().enumerate() {
        let value: Option<f64> = row.get(4 + offset)?;
        pollutants.set(*pollutant, float_or_nan(value));
    }

    Ok(NormalizedRecord {
        city: row.get(0)?,
        aqi: float_or_nan(row.get(1)?),
        timestamp: parse_datetime(&timestamp, "readings.timestamp")?,
        carbon_intensity: row.get(3)?,
        pollutants,
    })
}

impl Database {
    pub async fn insert_reading(&self, run_id: &str, record: &NormalizedRecord) -> Result<i64> {
        let run_id = run_id.to_string();
        let record = record.clone();
        self.execute(move |conn| {
            let mut values: Vec<SqlValue> = vec![
                SqlValue::Text(run_id),
                SqlValue::Text(record.city.clone()),
                nullable_float(record.aqi).map_or(SqlValue::Null, SqlValue::Real),
                SqlValue::Text(record.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)),
                SqlValue::Integer(record.carbon_intensity),
            ];
            values.extend(
                record
                    .pollutants
                    .iter()
                    .map(|(_, v)| nullable_float(v).map_or(SqlValue::Null, SqlValue::Real)),
            );
            values.push(SqlValue::Text(
                Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true),
            ));

            conn.execute(
                "INSERT INTO readings (
                    run_id, city, aqi, timestamp, carbon_intensity,
                    co, dew, h, no2, o3, p, pm10, pm25, so2, t, w,
                    created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                params_from_iter(values),
            )
            .with_context(|| "failed to insert reading")?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Most recent readings, newest first.
    pub async fn recent_readings(&self, limit: usize) -> Result<Vec<NormalizedRecord>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM readings ORDER BY timestamp DESC, id DESC LIMIT ?1"
            ))?;
            let mut rows = stmt.query([to_i64(limit)?])?;
            let mut readings = Vec::new();
            while let Some(row) = rows.next()? {
                readings.push(map_reading(row)?);
            }
            Ok(readings)
        })
        .await
    }

    /// All readings written by one run, oldest first.
    pub async fn readings_for_run(&self, run_id: &str) -> Result<Vec<NormalizedRecord>> {
        let run_id = run_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM readings WHERE run_id = ?1 ORDER BY timestamp ASC, id ASC"
            ))?;
            let mut rows = stmt.query([run_id])?;
            let mut readings = Vec::new();
            while let Some(row) = rows.next()? {
                readings.push(map_reading(row)?);
            }
            Ok(readings)
        })
        .await
    }

    pub async fn count_readings(&self) -> Result<usize> {
        self.execute(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM readings", [], |row| row.get(0))?;
            Ok(usize::try_from(count).unwrap_or(0))
        })
        .await
    }
}

/// Database writes scoped to one collection run.
pub struct RunPersistSink {
    db: Database,
    run_id: String,
}

impl RunPersistSink {
    pub fn new(db: Database, run_id: impl Into<String>) -> Self {
        Self {
            db,
            run_id: run_id.into(),
        }
    }
}

#[async_trait]
impl PersistSink for RunPersistSink {
    async fn persist(&self, record: &NormalizedRecord) -> SinkResult<()> {
        self.db
            .insert_reading(&self.run_id, record)
            .await
            .map(|_| ())
            .map_err(|err| SinkError::Persistence(format!("{err:#}")))
    }

    async fn check(&self) -> SinkResult<()> {
        self.db
            .ping()
            .await
            .map_err(|err| SinkError::Persistence(format!("{err:#}")))
    }
}
