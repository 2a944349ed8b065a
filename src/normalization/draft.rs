//! Working representation passed between normalization stages.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::models::{NormalizedRecord, Pollutant, PollutantLevels, MISSING_SENTINEL};

use super::error::{Repair, RepairKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Float,
    Int,
}

/// Numeric fields of a [`NormalizedRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Aqi,
    CarbonIntensity,
    Pollutant(Pollutant),
}

impl Field {
    pub fn kind(&self) -> FieldKind {
        match self {
            Field::CarbonIntensity => FieldKind::Int,
            Field::Aqi | Field::Pollutant(_) => FieldKind::Float,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Field::Aqi => "aqi",
            Field::CarbonIntensity => "carbon_intensity",
            Field::Pollutant(p) => p.code(),
        }
    }

    /// Every numeric field a complete record carries.
    pub fn all() -> impl Iterator<Item = Field> {
        [Field::Aqi, Field::CarbonIntensity]
            .into_iter()
            .chain(Pollutant::ALL.into_iter().map(Field::Pollutant))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Present in the source but explicitly empty.
    Null,
    /// Not yet coerced.
    Raw(serde_json::Value),
    Float(f64),
    Int(i64),
}

/// A record under construction. Absent fields are simply not in `fields`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordDraft {
    pub city: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub fields: BTreeMap<Field, FieldValue>,
    pub repairs: Vec<Repair>,
}

impl RecordDraft {
    pub fn new() -> Self {
        Self {
            city: None,
            timestamp: None,
            fields: BTreeMap::new(),
            repairs: Vec::new(),
        }
    }

    pub fn get(&self, field: Field) -> Option<&FieldValue> {
        self.fields.get(&field)
    }

    pub fn set(&mut self, field: Field, value: FieldValue) {
        self.fields.insert(field, value);
    }

    pub fn record_repair(&mut self, kind: RepairKind, field: &str, detail: String) {
        self.repairs.push(Repair {
            kind,
            field: field.to_string(),
            detail,
        });
    }

    /// Convert into the final record.
    ///
    /// Total: anything not in its final typed form falls back to the field's
    /// sentinel, so this never fails even if a stage was skipped.
    pub fn into_record(self, float_sentinel: f64) -> NormalizedRecord {
        let float_of = |value: Option<&FieldValue>| match value {
            Some(FieldValue::Float(v)) => *v,
            Some(FieldValue::Int(v)) => *v as f64,
            _ => float_sentinel,
        };
        let int_of = |value: Option<&FieldValue>| match value {
            Some(FieldValue::Int(v)) => *v,
            Some(FieldValue::Float(v)) if v.is_finite() => v.trunc() as i64,
            _ => MISSING_SENTINEL,
        };

        let mut pollutants = PollutantLevels::missing();
        for pollutant in Pollutant::ALL {
            pollutants.set(pollutant, float_of(self.get(Field::Pollutant(pollutant))));
        }

        NormalizedRecord {
            city: self.city.clone().unwrap_or_else(|| "N/A".to_string()),
            aqi: float_of(self.get(Field::Aqi)),
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            carbon_intensity: int_of(self.get(Field::CarbonIntensity)),
            pollutants,
        }
    }
}

impl Default for RecordDraft {
    fn default() -> Self {
        Self::new()
    }
}
