use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Normalized and appended to the session buffer.
    Collected,
    /// A source returned nothing; normalization never ran.
    FetchSkipped,
    /// Normalization rejected the reading.
    Dropped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleMetrics {
    pub cycle: u64,
    pub timestamp: DateTime<Utc>,
    pub outcome: CycleOutcome,
    pub fetch_ms: u64,
    pub normalize_ms: u64,
    pub persist_ms: u64,
    pub upload_ms: u64,
    pub persisted: bool,
    pub uploaded: bool,
    pub repairs: usize,
    pub total_ms: u64,
    pub cpu_percent: f32,
    pub memory_mb: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub cpu_percent: f32,
    pub memory_mb: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub system: SystemMetrics,
    pub recent_cycles: Vec<CycleMetrics>,
    pub cycle_count: u64,
    pub collected_count: u64,
    pub skipped_count: u64,
    pub dropped_count: u64,
    pub persist_failures: u64,
    pub upload_failures: u64,
}

impl MetricsSnapshot {
    pub fn summary_line(&self) -> String {
        format!(
            "{} cycle(s): {} collected, {} skipped, {} dropped; {} persist failure(s), {} upload failure(s); cpu {:.1}%, mem {:.1} MB",
            self.cycle_count,
            self.collected_count,
            self.skipped_count,
            self.dropped_count,
            self.persist_failures,
            self.upload_failures,
            self.system.cpu_percent,
            self.system.memory_mb,
        )
    }
}
