//! Turns a pair of raw source documents into one [`NormalizedRecord`].
//!
//! Schema check, merge and type coercion are fail-fast and drop the reading.
//! The remaining stages repair in place and report what they changed.

mod config;
mod draft;
mod error;
pub mod stages;

pub use config::NormalizationConfig;
pub use draft::{Field, FieldKind, FieldValue, RecordDraft};
pub use error::{FailureKind, NormalizationFailure, Repair, RepairKind};
pub use stages::{StageContext, StageFn};

use chrono::{DateTime, Utc};

use crate::models::{NormalizedRecord, RawReading};
use crate::{log_debug, log_warn};

const ENABLE_LOGS: bool = true;

/// One named post-merge stage.
#[derive(Clone, Copy)]
pub struct Stage {
    pub name: &'static str,
    pub apply: StageFn,
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Stage").field(&self.name).finish()
    }
}

/// Stages 3 through 7, in the order they must run.
pub fn default_stages() -> Vec<Stage> {
    vec![
        Stage { name: "type_coercion", apply: stages::coerce_types },
        Stage { name: "range_clamp", apply: stages::clamp_ranges },
        Stage { name: "missing_fill", apply: stages::fill_missing },
        Stage { name: "timestamp_sanity", apply: stages::check_timestamp },
        Stage { name: "completeness", apply: stages::ensure_complete },
    ]
}

/// A successful normalization plus the repairs made along the way.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub record: NormalizedRecord,
    pub repairs: Vec<Repair>,
}

#[derive(Debug)]
pub struct NormalizationChain {
    city: String,
    config: NormalizationConfig,
    stages: Vec<Stage>,
}

impl NormalizationChain {
    pub fn new(city: impl Into<String>, config: NormalizationConfig) -> Self {
        Self {
            city: city.into(),
            config,
            stages: default_stages(),
        }
    }

    /// Names of every stage in execution order, including schema check and merge.
    pub fn stage_names(&self) -> Vec<&'static str> {
        ["schema_check", "merge"]
            .into_iter()
            .chain(self.stages.iter().map(|s| s.name))
            .collect()
    }

    pub fn normalize(
        &self,
        raw_aqi: &RawReading,
        raw_carbon: &RawReading,
    ) -> Result<Normalized, NormalizationFailure> {
        self.normalize_at(raw_aqi, raw_carbon, Utc::now())
    }

    /// Same as [`normalize`](Self::normalize) with an explicit wall clock.
    pub fn normalize_at(
        &self,
        raw_aqi: &RawReading,
        raw_carbon: &RawReading,
        now: DateTime<Utc>,
    ) -> Result<Normalized, NormalizationFailure> {
        let result = stages::check_schema(raw_aqi, raw_carbon).and_then(|()| {
            let draft = stages::merge(raw_aqi, raw_carbon, &self.city, now);
            self.run_stages(draft, now)
        });

        let mut draft = match result {
            Ok(draft) => draft,
            Err(failure) => {
                log_warn!("dropping reading: {failure}");
                return Err(failure);
            }
        };

        for repair in &draft.repairs {
            match repair.kind {
                RepairKind::MissingValue => {
                    log_debug!("{} on {}: {}", repair.kind, repair.field, repair.detail)
                }
                RepairKind::RangeViolation | RepairKind::StaleTimestamp => {
                    log_warn!("{} on {}: {}", repair.kind, repair.field, repair.detail)
                }
            }
        }

        let repairs = std::mem::take(&mut draft.repairs);
        Ok(Normalized {
            record: draft.into_record(self.config.float_sentinel()),
            repairs,
        })
    }

    /// Run the post-merge stages over an already merged draft.
    pub fn run_stages(
        &self,
        draft: RecordDraft,
        now: DateTime<Utc>,
    ) -> Result<RecordDraft, NormalizationFailure> {
        let ctx = StageContext {
            config: &self.config,
            now,
        };
        self.stages
            .iter()
            .try_fold(draft, |draft, stage| (stage.apply)(draft, &ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Pollutant, MISSING_SENTINEL};
    use chrono::TimeZone;
    use serde_json::{json, Value};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 2, 14, 30, 0).unwrap()
    }

    fn chain() -> NormalizationChain {
        NormalizationChain::new("Sakarya", NormalizationConfig::default())
    }

    fn carbon(ci: Value) -> Value {
        json!({
            "carbonIntensity": ci,
            "datetime": "2024-03-02T14:00:00.000Z",
            "updatedAt": "2024-03-02T14:10:00.000Z"
        })
    }

    #[test]
    fn test_stage_order() {
        assert_eq!(
            chain().stage_names(),
            vec![
                "schema_check",
                "merge",
                "type_coercion",
                "range_clamp",
                "missing_fill",
                "timestamp_sanity",
                "completeness"
            ]
        );
    }

    #[test]
    fn test_well_formed_reading() {
        let aqi = json!({
            "status": "ok",
            "data": { "aqi": 74, "iaqi": { "pm25": { "v": 74 }, "t": { "v": 11.5 } } }
        });
        let out = chain().normalize_at(&aqi, &carbon(json!(356)), now()).unwrap();

        assert_eq!(out.record.city, "Sakarya");
        assert_eq!(out.record.aqi, 74.0);
        assert_eq!(out.record.carbon_intensity, 356);
        assert_eq!(out.record.timestamp, now());
        assert_eq!(out.record.pollutant(Pollutant::Pm25), 74.0);
        assert_eq!(out.record.pollutant(Pollutant::T), 11.5);
        assert!(out.record.pollutant(Pollutant::So2).is_nan());
        assert!(out
            .repairs
            .iter()
            .all(|r| r.kind == RepairKind::MissingValue));
    }

    #[test]
    fn test_out_of_range_values_clamped() {
        let aqi = json!({ "status": "ok", "data": { "aqi": "731" } });
        let out = chain().normalize_at(&aqi, &carbon(json!(-20)), now()).unwrap();

        assert_eq!(out.record.aqi, 500.0);
        assert_eq!(out.record.carbon_intensity, 0);
        let clamps = out
            .repairs
            .iter()
            .filter(|r| r.kind == RepairKind::RangeViolation)
            .count();
        assert_eq!(clamps, 2);
    }

    #[test]
    fn test_dash_aqi_becomes_missing() {
        let aqi = json!({ "status": "ok", "data": { "aqi": "-" } });
        let out = chain().normalize_at(&aqi, &carbon(json!(null)), now()).unwrap();
        assert!(!out.record.has_aqi());
        assert_eq!(out.record.carbon_intensity, MISSING_SENTINEL);
    }

    #[test]
    fn test_schema_failure_drops_reading() {
        let aqi = json!({ "data": { "aqi": 10 } });
        let err = chain().normalize_at(&aqi, &carbon(json!(10)), now()).unwrap_err();
        assert_eq!(err.kind, FailureKind::SchemaViolation);
    }

    #[test]
    fn test_type_failure_drops_reading() {
        let aqi = json!({ "status": "ok", "data": { "aqi": [1, 2] } });
        let err = chain().normalize_at(&aqi, &carbon(json!(10)), now()).unwrap_err();
        assert_eq!(err.kind, FailureKind::TypeViolation);
        assert_eq!(err.source_name, "aqi");
    }

    #[test]
    fn test_every_field_populated_after_stages() {
        let inputs = [
            json!({ "status": "ok", "data": { "aqi": null } }),
            json!({ "status": "ok", "data": { "aqi": "-", "iaqi": { "co": {} } } }),
            json!({ "status": "ok", "data": { "aqi": 12, "iaqi": { "zz": { "v": 3 } } } }),
            json!({ "status": "ok", "data": { "aqi": 900, "iaqi": "oops" } }),
        ];
        let carbons = [json!(null), json!("42"), json!(4000)];
        let chain = chain();

        for aqi in &inputs {
            for ci in &carbons {
                let raw_carbon = carbon(ci.clone());
                stages::check_schema(aqi, &raw_carbon).unwrap();
                let merged = stages::merge(aqi, &raw_carbon, "Sakarya", now());
                let draft = chain.run_stages(merged, now()).unwrap();

                assert!(draft.city.is_some());
                assert!(draft.timestamp.is_some());
                for field in Field::all() {
                    let ok = matches!(
                        (field.kind(), draft.get(field)),
                        (FieldKind::Float, Some(FieldValue::Float(_)))
                            | (FieldKind::Int, Some(FieldValue::Int(_)))
                    );
                    assert!(ok, "{} missing for {aqi} / {ci}", field.name());
                }
            }
        }
    }

    #[test]
    fn test_integer_sentinel_for_floats_when_configured() {
        let config = NormalizationConfig {
            nan_for_missing_floats: false,
            ..Default::default()
        };
        let chain = NormalizationChain::new("Sakarya", config);
        let aqi = json!({ "status": "ok", "data": { "aqi": null } });
        let out = chain.normalize_at(&aqi, &carbon(json!(1)), now()).unwrap();

        assert_eq!(out.record.aqi, -1.0);
        assert_eq!(out.record.pollutant(Pollutant::Co), -1.0);
    }
}
