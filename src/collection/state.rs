use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CycleStage {
    Fetching,
    Normalizing,
    Persisting,
    Uploading,
    Waiting,
}

/// Where the collection loop currently is.
///
/// There is no error state: per-cycle failures are logged and the loop moves on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum SchedulerState {
    Idle,
    Running { cycle: u64, stage: CycleStage },
    Completed,
}

impl Default for SchedulerState {
    fn default() -> Self {
        SchedulerState::Idle
    }
}

