mod types;

pub use types::{CycleMetrics, CycleOutcome, MetricsSnapshot, SystemMetrics};

use std::sync::Arc;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::sync::Mutex;

const MAX_RECENT_CYCLES: usize = 20;

/// Per-cycle timings and outcome counters for one collection run.
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsState>>,
}

struct MetricsState {
    recent_cycles: Vec<CycleMetrics>,
    cycle_count: u64,
    collected_count: u64,
    skipped_count: u64,
    dropped_count: u64,
    persist_failures: u64,
    upload_failures: u64,
    system: System,
    pid: Pid,
}

impl MetricsCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        let pid = Pid::from_u32(std::process::id());

        // CPU usage is a delta, so take a baseline now.
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]));

        Self {
            inner: Arc::new(Mutex::new(MetricsState {
                recent_cycles: Vec::with_capacity(MAX_RECENT_CYCLES),
                cycle_count: 0,
                collected_count: 0,
                skipped_count: 0,
                dropped_count: 0,
                persist_failures: 0,
                upload_failures: 0,
                system,
                pid,
            })),
        }
    }

    /// Current process CPU percent and resident memory in MB.
    pub async fn sample_system_metrics(&self) -> (f32, f64) {
        let mut state = self.inner.lock().await;
        state.sample()
    }

    pub async fn record_cycle(&self, metrics: CycleMetrics) {
        let mut state = self.inner.lock().await;

        state.cycle_count += 1;
        match metrics.outcome {
            CycleOutcome::Collected => {
                state.collected_count += 1;
                if !metrics.persisted {
                    state.persist_failures += 1;
                }
                if !metrics.uploaded {
                    state.upload_failures += 1;
                }
            }
            CycleOutcome::FetchSkipped => state.skipped_count += 1,
            CycleOutcome::Dropped => state.dropped_count += 1,
        }

        state.recent_cycles.push(metrics);
        if state.recent_cycles.len() > MAX_RECENT_CYCLES {
            state.recent_cycles.remove(0);
        }
    }

    pub async fn get_snapshot(&self) -> MetricsSnapshot {
        let mut state = self.inner.lock().await;
        let (cpu_percent, memory_mb) = state.sample();

        MetricsSnapshot {
            system: SystemMetrics {
                cpu_percent,
                memory_mb,
            },
            recent_cycles: state.recent_cycles.clone(),
            cycle_count: state.cycle_count,
            collected_count: state.collected_count,
            skipped_count: state.skipped_count,
            dropped_count: state.dropped_count,
            persist_failures: state.persist_failures,
            upload_failures: state.upload_failures,
        }
    }
}

impl MetricsState {
    fn sample(&mut self) -> (f32, f64) {
        let pid = self.pid;
        self.system.refresh_processes(ProcessesToUpdate::Some(&[pid]));

        match self.system.process(pid) {
            Some(process) => (
                process.cpu_usage(),
                process.memory() as f64 / 1024.0 / 1024.0,
            ),
            None => (0.0, 0.0),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MetricsCollector {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
