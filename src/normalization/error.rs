use thiserror::Error;

/// Unrecoverable problems: the cycle's reading is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    SchemaViolation,
    TypeViolation,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SchemaViolation => write!(f, "schema violation"),
            Self::TypeViolation => write!(f, "type violation"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind} ({source_name}): {detail}")]
pub struct NormalizationFailure {
    pub kind: FailureKind,
    /// Which input or field the failure refers to.
    pub source_name: String,
    pub detail: String,
}

impl NormalizationFailure {
    pub fn schema(source_name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::SchemaViolation,
            source_name: source_name.into(),
            detail: detail.into(),
        }
    }

    pub fn type_violation(field: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::TypeViolation,
            source_name: field.into(),
            detail: detail.into(),
        }
    }
}

/// Recoverable problems, repaired in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairKind {
    RangeViolation,
    MissingValue,
    StaleTimestamp,
}

impl std::fmt::Display for RepairKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RangeViolation => write!(f, "range violation"),
            Self::MissingValue => write!(f, "missing value"),
            Self::StaleTimestamp => write!(f, "stale timestamp"),
        }
    }
}

/// One repair applied by a best-effort stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Repair {
    pub kind: RepairKind,
    pub field: String,
    pub detail: String,
}
