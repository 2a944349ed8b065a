//! Individual normalization stages.
//!
//! Schema check and merge consume the two raw documents. Every later stage
//! shares the [`StageFn`] signature and takes the draft by value, so the chain
//! is just an ordered list of these functions.

use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};

use crate::log_debug;
use crate::models::{Pollutant, RawReading, MISSING_SENTINEL};

use super::config::NormalizationConfig;
use super::draft::{Field, FieldKind, FieldValue, RecordDraft};
use super::error::{NormalizationFailure, RepairKind};

const ENABLE_LOGS: bool = true;

pub const AIR_QUALITY: &str = "air_quality";
pub const CARBON_INTENSITY: &str = "carbon_intensity";

const AIR_QUALITY_KEYS: &[&str] = &["status", "data"];
const CARBON_INTENSITY_KEYS: &[&str] = &["carbonIntensity", "datetime", "updatedAt"];

/// Inputs shared by every post-merge stage.
pub struct StageContext<'a> {
    pub config: &'a NormalizationConfig,
    pub now: DateTime<Utc>,
}

pub type StageFn =
    fn(RecordDraft, &StageContext<'_>) -> Result<RecordDraft, NormalizationFailure>;

// ---------------------------------------------------------------------------
// Stage 1: schema check
// ---------------------------------------------------------------------------

pub fn check_schema(
    raw_aqi: &RawReading,
    raw_carbon: &RawReading,
) -> Result<(), NormalizationFailure> {
    let aqi = as_object(AIR_QUALITY, raw_aqi)?;
    require_keys(AIR_QUALITY, aqi, AIR_QUALITY_KEYS)?;

    match aqi.get("status").and_then(Value::as_str) {
        Some("ok") => {}
        other => {
            return Err(NormalizationFailure::schema(
                AIR_QUALITY,
                format!("status is {other:?}, expected \"ok\""),
            ))
        }
    }

    let has_nested_aqi = aqi
        .get("data")
        .and_then(Value::as_object)
        .is_some_and(|data| data.contains_key("aqi"));
    if !has_nested_aqi {
        return Err(NormalizationFailure::schema(
            AIR_QUALITY,
            "missing or invalid nested key data.aqi",
        ));
    }

    let carbon = as_object(CARBON_INTENSITY, raw_carbon)?;
    require_keys(CARBON_INTENSITY, carbon, CARBON_INTENSITY_KEYS)?;

    Ok(())
}

fn as_object<'a>(
    source: &str,
    raw: &'a RawReading,
) -> Result<&'a Map<String, Value>, NormalizationFailure> {
    raw.as_object()
        .ok_or_else(|| NormalizationFailure::schema(source, "document is not a JSON object"))
}

fn require_keys(
    source: &str,
    object: &Map<String, Value>,
    keys: &[&str],
) -> Result<(), NormalizationFailure> {
    let missing: Vec<&str> = keys
        .iter()
        .copied()
        .filter(|key| !object.contains_key(*key))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(NormalizationFailure::schema(
            source,
            format!("missing required keys: {}", missing.join(", ")),
        ))
    }
}

// ---------------------------------------------------------------------------
// Stage 2: merge
// ---------------------------------------------------------------------------

/// Flatten both documents into one draft stamped with `now`.
pub fn merge(
    raw_aqi: &RawReading,
    raw_carbon: &RawReading,
    city: &str,
    now: DateTime<Utc>,
) -> RecordDraft {
    let mut draft = RecordDraft::new();
    draft.city = Some(city.to_string());
    draft.timestamp = Some(now);

    let data = raw_aqi.get("data");

    let aqi = data
        .and_then(|d| d.get("aqi"))
        .cloned()
        .unwrap_or(Value::Null);
    draft.set(Field::Aqi, raw_or_null(aqi));

    if let Some(iaqi) = data.and_then(|d| d.get("iaqi")).and_then(Value::as_object) {
        for (code, entry) in iaqi {
            let Some(pollutant) = Pollutant::from_code(code) else {
                log_debug!("ignoring unknown pollutant code '{code}'");
                continue;
            };
            let value = match entry {
                Value::Object(inner) => inner.get("v").cloned().unwrap_or(Value::Null),
                other => other.clone(),
            };
            draft.set(Field::Pollutant(pollutant), raw_or_null(value));
        }
    }

    let carbon = raw_carbon
        .get("carbonIntensity")
        .cloned()
        .unwrap_or(Value::Null);
    draft.set(Field::CarbonIntensity, raw_or_null(carbon));

    draft
}

/// The feed reports "-" when a station has no current value.
fn raw_or_null(value: Value) -> FieldValue {
    match value {
        Value::Null => FieldValue::Null,
        Value::String(s) if s.trim() == "-" => FieldValue::Null,
        other => FieldValue::Raw(other),
    }
}

// ---------------------------------------------------------------------------
// Stage 3: type coercion
// ---------------------------------------------------------------------------

pub fn coerce_types(
    mut draft: RecordDraft,
    ctx: &StageContext<'_>,
) -> Result<RecordDraft, NormalizationFailure> {
    for (field, value) in draft.fields.iter_mut() {
        let coerced = match (field.kind(), &*value) {
            (FieldKind::Float, FieldValue::Null) if ctx.config.nan_for_missing_floats => {
                FieldValue::Float(f64::NAN)
            }
            (FieldKind::Int, FieldValue::Null) => FieldValue::Int(MISSING_SENTINEL),
            (FieldKind::Float, FieldValue::Raw(raw)) => {
                FieldValue::Float(coerce_float(raw).ok_or_else(|| {
                    NormalizationFailure::type_violation(
                        field.name(),
                        format!("cannot read {raw} as a float"),
                    )
                })?)
            }
            (FieldKind::Int, FieldValue::Raw(raw)) => {
                FieldValue::Int(coerce_int(raw).ok_or_else(|| {
                    NormalizationFailure::type_violation(
                        field.name(),
                        format!("cannot read {raw} as an integer"),
                    )
                })?)
            }
            (FieldKind::Float, FieldValue::Int(v)) => FieldValue::Float(*v as f64),
            (FieldKind::Int, FieldValue::Float(v)) => match float_to_int(*v) {
                Some(i) => FieldValue::Int(i),
                None => FieldValue::Int(MISSING_SENTINEL),
            },
            _ => continue,
        };
        *value = coerced;
    }

    Ok(draft)
}

fn coerce_float(raw: &Value) -> Option<f64> {
    let parsed = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}

fn coerce_int(raw: &Value) -> Option<i64> {
    match raw {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(float_to_int)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(float_to_int))
        }
        _ => None,
    }
}

fn float_to_int(value: f64) -> Option<i64> {
    let truncated = value.trunc();
    if truncated.is_finite() && truncated >= i64::MIN as f64 && truncated <= i64::MAX as f64 {
        Some(truncated as i64)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Stage 4: range clamp
// ---------------------------------------------------------------------------

/// Clamp ranged fields. Sentinels and non-finite values are left alone.
pub fn clamp_ranges(
    mut draft: RecordDraft,
    ctx: &StageContext<'_>,
) -> Result<RecordDraft, NormalizationFailure> {
    let [aqi_lo, aqi_hi] = ctx.config.aqi_range;
    if let Some(FieldValue::Float(v)) = draft.get(Field::Aqi).cloned() {
        if v.is_finite() && (v < aqi_lo || v > aqi_hi) {
            let clamped = v.clamp(aqi_lo, aqi_hi);
            draft.set(Field::Aqi, FieldValue::Float(clamped));
            draft.record_repair(
                RepairKind::RangeViolation,
                Field::Aqi.name(),
                format!("{v} clamped to {clamped}"),
            );
        }
    }

    let [ci_lo, ci_hi] = ctx.config.carbon_intensity_range;
    if let Some(FieldValue::Int(v)) = draft.get(Field::CarbonIntensity).cloned() {
        if v != MISSING_SENTINEL && (v < ci_lo || v > ci_hi) {
            let clamped = v.clamp(ci_lo, ci_hi);
            draft.set(Field::CarbonIntensity, FieldValue::Int(clamped));
            draft.record_repair(
                RepairKind::RangeViolation,
                Field::CarbonIntensity.name(),
                format!("{v} clamped to {clamped}"),
            );
        }
    }

    Ok(draft)
}

// ---------------------------------------------------------------------------
// Stage 5: missing-value fill
// ---------------------------------------------------------------------------

pub fn fill_missing(
    mut draft: RecordDraft,
    _ctx: &StageContext<'_>,
) -> Result<RecordDraft, NormalizationFailure> {
    let mut filled = Vec::new();
    for (field, value) in draft.fields.iter_mut() {
        if *value == FieldValue::Null {
            *value = match field.kind() {
                FieldKind::Float => FieldValue::Float(MISSING_SENTINEL as f64),
                FieldKind::Int => FieldValue::Int(MISSING_SENTINEL),
            };
            filled.push(field.name());
        }
    }

    for name in filled {
        draft.record_repair(
            RepairKind::MissingValue,
            name,
            format!("null filled with {MISSING_SENTINEL}"),
        );
    }

    Ok(draft)
}

// ---------------------------------------------------------------------------
// Stage 6: timestamp sanity
// ---------------------------------------------------------------------------

pub fn check_timestamp(
    mut draft: RecordDraft,
    ctx: &StageContext<'_>,
) -> Result<RecordDraft, NormalizationFailure> {
    let Some(timestamp) = draft.timestamp else {
        return Ok(draft);
    };

    // An age chrono cannot represent leaves no lower bound.
    let oldest = Duration::try_seconds(ctx.config.max_age_secs)
        .and_then(|age| ctx.now.checked_sub_signed(age));
    let too_old = oldest.is_some_and(|oldest| timestamp < oldest);
    if timestamp > ctx.now || too_old {
        draft.timestamp = Some(ctx.now);
        draft.record_repair(
            RepairKind::StaleTimestamp,
            "timestamp",
            format!(
                "{} outside [{}, {}], replaced with now",
                timestamp.to_rfc3339(),
                oldest.map_or_else(|| "-inf".to_string(), |o| o.to_rfc3339()),
                ctx.now.to_rfc3339()
            ),
        );
    }

    Ok(draft)
}

// ---------------------------------------------------------------------------
// Stage 7: completeness guarantee
// ---------------------------------------------------------------------------

/// Backstop: every declared field ends up present and typed. Never fails.
pub fn ensure_complete(
    mut draft: RecordDraft,
    ctx: &StageContext<'_>,
) -> Result<RecordDraft, NormalizationFailure> {
    if draft.city.as_deref().map_or(true, |c| c.trim().is_empty()) {
        draft.city = Some("N/A".to_string());
        draft.record_repair(RepairKind::MissingValue, "city", "set to N/A".into());
    }

    if draft.timestamp.is_none() {
        draft.timestamp = Some(ctx.now);
        draft.record_repair(RepairKind::MissingValue, "timestamp", "set to now".into());
    }

    for field in Field::all() {
        let typed = matches!(
            (field.kind(), draft.get(field)),
            (FieldKind::Float, Some(FieldValue::Float(_))) | (FieldKind::Int, Some(FieldValue::Int(_)))
        );
        if typed {
            continue;
        }

        let detail = match draft.get(field) {
            None => "absent",
            Some(_) => "unresolved",
        };
        let sentinel = match field.kind() {
            FieldKind::Float => FieldValue::Float(ctx.config.float_sentinel()),
            FieldKind::Int => FieldValue::Int(MISSING_SENTINEL),
        };
        draft.set(field, sentinel);
        draft.record_repair(
            RepairKind::MissingValue,
            field.name(),
            format!("{detail}, filled with sentinel"),
        );
    }

    Ok(draft)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
