use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::metrics::{CycleMetrics, CycleOutcome, MetricsCollector};
use crate::models::NormalizedRecord;
use crate::normalization::NormalizationChain;
use crate::sinks::{PersistSink, RetryPolicy, RetryableSink, UploadSink};

use super::fetcher::{Fetcher, SourceKind};
use super::state::{CycleStage, SchedulerState};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub total_collection_time: Duration,
    pub request_interval: Duration,
    pub retry: RetryPolicy,
}

/// What a run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Session buffer in collection order.
    pub records: Vec<NormalizedRecord>,
    pub cycles: u64,
    /// True when the run stopped on the cancellation token.
    pub cancelled: bool,
}

/// Drives fetch → normalize → persist → upload on a fixed cadence.
///
/// All collaborators are injected; the persistence precondition check is the
/// caller's job and happens before [`run`](Self::run).
pub struct CollectionScheduler {
    fetcher: Arc<dyn Fetcher>,
    chain: NormalizationChain,
    persist: RetryableSink<dyn PersistSink>,
    upload: RetryableSink<dyn UploadSink>,
    config: SchedulerConfig,
    metrics: MetricsCollector,
    state_tx: watch::Sender<SchedulerState>,
}

impl CollectionScheduler {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        chain: NormalizationChain,
        persist: Arc<dyn PersistSink>,
        upload: Arc<dyn UploadSink>,
        config: SchedulerConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(SchedulerState::Idle);
        Self {
            fetcher,
            chain,
            persist: RetryableSink::new(persist, config.retry),
            upload: RetryableSink::new(upload, config.retry),
            config,
            metrics: MetricsCollector::new(),
            state_tx,
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn state(&self) -> SchedulerState {
        *self.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, state: SchedulerState) {
        self.state_tx.send_replace(state);
    }

    fn set_stage(&self, cycle: u64, stage: CycleStage) {
        self.set_state(SchedulerState::Running { cycle, stage });
    }

    /// Collect until the configured duration is used up or `cancel` fires.
    ///
    /// Records already appended when cancellation arrives are returned.
    pub async fn run(&self, cancel: CancellationToken) -> RunOutcome {
        let start = Instant::now();
        let mut buffer = Vec::new();
        let mut cycle = 0;
        let mut cancelled = false;

        log_info!(
            "collection started: {}s total, {}s interval",
            self.config.total_collection_time.as_secs(),
            self.config.request_interval.as_secs()
        );

        while start.elapsed() < self.config.total_collection_time {
            cycle += 1;

            let metrics = tokio::select! {
                metrics = self.run_cycle(cycle, &mut buffer) => metrics,
                _ = cancel.cancelled() => {
                    log_info!("collection cancelled during cycle {cycle}");
                    cancelled = true;
                    break;
                }
            };
            self.metrics.record_cycle(metrics).await;

            let remaining = self
                .config
                .total_collection_time
                .saturating_sub(start.elapsed());
            if remaining <= self.config.request_interval {
                break;
            }

            self.set_stage(cycle, CycleStage::Waiting);
            log_info!(
                "waiting {}s before next cycle",
                self.config.request_interval.as_secs()
            );
            tokio::select! {
                _ = tokio::time::sleep(self.config.request_interval) => {}
                _ = cancel.cancelled() => {
                    log_info!("collection cancelled while waiting after cycle {cycle}");
                    cancelled = true;
                    break;
                }
            }
        }

        self.set_state(SchedulerState::Completed);
        let snapshot = self.metrics.get_snapshot().await;
        log_info!(
            "collection finished with {} record(s): {}",
            buffer.len(),
            snapshot.summary_line()
        );

        RunOutcome {
            records: buffer,
            cycles: cycle,
            cancelled,
        }
    }

    async fn run_cycle(&self, cycle: u64, buffer: &mut Vec<NormalizedRecord>) -> CycleMetrics {
        let cycle_start = Instant::now();
        let mut metrics = CycleMetrics {
            cycle,
            timestamp: Utc::now(),
            outcome: CycleOutcome::FetchSkipped,
            fetch_ms: 0,
            normalize_ms: 0,
            persist_ms: 0,
            upload_ms: 0,
            persisted: false,
            uploaded: false,
            repairs: 0,
            total_ms: 0,
            cpu_percent: 0.0,
            memory_mb: 0.0,
        };

        self.set_stage(cycle, CycleStage::Fetching);
        let step = Instant::now();
        let raw_aqi = self.fetcher.fetch_source(SourceKind::AirQuality).await;
        let raw_carbon = self.fetcher.fetch_source(SourceKind::CarbonIntensity).await;
        metrics.fetch_ms = elapsed_ms(step);

        let (raw_aqi, raw_carbon) = match (raw_aqi, raw_carbon) {
            (Some(aqi), Some(carbon)) => (aqi, carbon),
            (aqi, carbon) => {
                let missing: Vec<&str> = [
                    aqi.is_none().then_some(SourceKind::AirQuality.name()),
                    carbon.is_none().then_some(SourceKind::CarbonIntensity.name()),
                ]
                .into_iter()
                .flatten()
                .collect();
                log_warn!(
                    "cycle {cycle}: data could not be retrieved ({}), skipping",
                    missing.join(", ")
                );
                return self.finish(metrics, cycle_start).await;
            }
        };

        self.set_stage(cycle, CycleStage::Normalizing);
        let step = Instant::now();
        let normalized = self.chain.normalize(&raw_aqi, &raw_carbon);
        metrics.normalize_ms = elapsed_ms(step);

        let normalized = match normalized {
            Ok(normalized) => normalized,
            Err(failure) => {
                log_warn!("cycle {cycle}: reading dropped: {failure}");
                metrics.outcome = CycleOutcome::Dropped;
                return self.finish(metrics, cycle_start).await;
            }
        };
        metrics.outcome = CycleOutcome::Collected;
        metrics.repairs = normalized.repairs.len();
        let record = normalized.record;

        self.set_stage(cycle, CycleStage::Persisting);
        let step = Instant::now();
        match self.persist.persist(&record).await {
            Ok(()) => metrics.persisted = true,
            Err(err) => log_error!("cycle {cycle}: persist gave up: {err}"),
        }
        metrics.persist_ms = elapsed_ms(step);

        // The in-memory copy is kept even if the database write failed.
        buffer.push(record.clone());

        self.set_stage(cycle, CycleStage::Uploading);
        let step = Instant::now();
        match self.upload.upload(std::slice::from_ref(&record)).await {
            Ok(()) => metrics.uploaded = true,
            Err(err) => log_error!("cycle {cycle}: upload gave up: {err}"),
        }
        metrics.upload_ms = elapsed_ms(step);

        log_info!(
            "cycle {cycle}: collected aqi={} carbon_intensity={} ({} repair(s))",
            record.aqi,
            record.carbon_intensity,
            metrics.repairs
        );
        self.finish(metrics, cycle_start).await
    }

    async fn finish(&self, mut metrics: CycleMetrics, cycle_start: Instant) -> CycleMetrics {
        let (cpu_percent, memory_mb) = self.metrics.sample_system_metrics().await;
        metrics.cpu_percent = cpu_percent;
        metrics.memory_mb = memory_mb;
        metrics.total_ms = elapsed_ms(cycle_start);
        metrics
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis().try_into().unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawReading;
    use crate::normalization::NormalizationConfig;
    use crate::sinks::{SinkError, SinkResult};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    // -----------------------------------------------------------------------
    // Fakes
    // -----------------------------------------------------------------------

    struct FakeFetcher {
        started: Instant,
        aqi_fetch_times: Mutex<Vec<u64>>,
        /// Cycle numbers (1-based) on which the carbon source is down.
        carbon_down_on: Vec<usize>,
        /// Cycle numbers on which the AQI document is malformed.
        malformed_on: Vec<usize>,
    }

    impl FakeFetcher {
        fn new() -> Self {
            Self {
                started: Instant::now(),
                aqi_fetch_times: Mutex::new(Vec::new()),
                carbon_down_on: Vec::new(),
                malformed_on: Vec::new(),
            }
        }

        fn fetch_times(&self) -> Vec<u64> {
            self.aqi_fetch_times.lock().unwrap().clone()
        }

        fn current_cycle(&self) -> usize {
            self.aqi_fetch_times.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Fetcher for FakeFetcher {
        async fn fetch_source(&self, source: SourceKind) -> Option<RawReading> {
            match source {
                SourceKind::AirQuality => {
                    self.aqi_fetch_times
                        .lock()
                        .unwrap()
                        .push(self.started.elapsed().as_secs());
                    if self.malformed_on.contains(&self.current_cycle()) {
                        return Some(json!({ "status": "ok" }));
                    }
                    Some(json!({
                        "status": "ok",
                        "data": { "aqi": 42, "iaqi": { "pm25": { "v": 42 } } }
                    }))
                }
                SourceKind::CarbonIntensity => {
                    if self.carbon_down_on.contains(&self.current_cycle()) {
                        return None;
                    }
                    Some(json!({
                        "carbonIntensity": 250,
                        "datetime": "2024-01-01T00:00:00.000Z",
                        "updatedAt": "2024-01-01T00:00:00.000Z"
                    }))
                }
            }
        }
    }

    #[derive(Default)]
    struct CountingSink {
        fail: bool,
        persist_calls: AtomicU32,
        upload_calls: AtomicU32,
    }

    impl CountingSink {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl PersistSink for CountingSink {
        async fn persist(&self, _record: &NormalizedRecord) -> SinkResult<()> {
            self.persist_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(SinkError::Persistence("database is locked".into()))
            } else {
                Ok(())
            }
        }

        async fn check(&self) -> SinkResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl UploadSink for CountingSink {
        fn max_batch(&self) -> usize {
            10
        }

        async fn upload(&self, _batch: &[NormalizedRecord]) -> SinkResult<()> {
            self.upload_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(SinkError::Upload("503".into()))
            } else {
                Ok(())
            }
        }
    }

    fn scheduler(
        fetcher: Arc<FakeFetcher>,
        persist: Arc<CountingSink>,
        upload: Arc<CountingSink>,
        total_secs: u64,
        interval_secs: u64,
    ) -> CollectionScheduler {
        CollectionScheduler::new(
            fetcher,
            NormalizationChain::new("Sakarya", NormalizationConfig::default()),
            persist,
            upload,
            SchedulerConfig {
                total_collection_time: Duration::from_secs(total_secs),
                request_interval: Duration::from_secs(interval_secs),
                retry: RetryPolicy::new(3, Duration::from_secs(1)),
            },
        )
    }

    // -----------------------------------------------------------------------
    // Duration bound
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_runs_four_cycles_in_one_hundred_seconds() {
        let fetcher = Arc::new(FakeFetcher::new());
        let sink = Arc::new(CountingSink::default());
        let scheduler = scheduler(fetcher.clone(), sink.clone(), sink.clone(), 100, 30);

        let outcome = scheduler.run(CancellationToken::new()).await;

        assert_eq!(fetcher.fetch_times(), vec![0, 30, 60, 90]);
        assert_eq!(outcome.cycles, 4);
        assert_eq!(outcome.records.len(), 4);
        assert!(!outcome.cancelled);
        assert_eq!(scheduler.state(), SchedulerState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_total_shorter_than_interval_runs_once() {
        let fetcher = Arc::new(FakeFetcher::new());
        let sink = Arc::new(CountingSink::default());
        let scheduler = scheduler(fetcher.clone(), sink.clone(), sink.clone(), 10, 30);

        let outcome = scheduler.run(CancellationToken::new()).await;
        assert_eq!(outcome.cycles, 1);
        assert_eq!(fetcher.fetch_times(), vec![0]);
    }

    // -----------------------------------------------------------------------
    // Partial failure
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_missing_source_skips_cycle() {
        let mut fake = FakeFetcher::new();
        fake.carbon_down_on = vec![2];
        let fetcher = Arc::new(fake);
        let sink = Arc::new(CountingSink::default());
        let scheduler = scheduler(fetcher.clone(), sink.clone(), sink.clone(), 100, 30);

        let outcome = scheduler.run(CancellationToken::new()).await;
        assert_eq!(outcome.cycles, 4);
        assert_eq!(outcome.records.len(), 3);
        assert_eq!(sink.persist_calls.load(Ordering::SeqCst), 3);

        let snapshot = scheduler.metrics().get_snapshot().await;
        assert_eq!(snapshot.skipped_count, 1);
        assert_eq!(snapshot.collected_count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_reading_dropped() {
        let mut fake = FakeFetcher::new();
        fake.malformed_on = vec![1];
        let fetcher = Arc::new(fake);
        let sink = Arc::new(CountingSink::default());
        let scheduler = scheduler(fetcher.clone(), sink.clone(), sink.clone(), 50, 30);

        let outcome = scheduler.run(CancellationToken::new()).await;
        assert_eq!(outcome.cycles, 2);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(scheduler.metrics().get_snapshot().await.dropped_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persist_failure_does_not_block_upload() {
        let fetcher = Arc::new(FakeFetcher::new());
        let persist = Arc::new(CountingSink::failing());
        let upload = Arc::new(CountingSink::default());
        let scheduler = scheduler(fetcher.clone(), persist.clone(), upload.clone(), 10, 30);

        let outcome = scheduler.run(CancellationToken::new()).await;
        assert_eq!(persist.persist_calls.load(Ordering::SeqCst), 3);
        assert_eq!(upload.upload_calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.records.len(), 1);

        let snapshot = scheduler.metrics().get_snapshot().await;
        assert_eq!(snapshot.persist_failures, 1);
        assert_eq!(snapshot.upload_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_failure_keeps_collecting() {
        let fetcher = Arc::new(FakeFetcher::new());
        let persist = Arc::new(CountingSink::default());
        let upload = Arc::new(CountingSink::failing());
        let scheduler = scheduler(fetcher.clone(), persist.clone(), upload.clone(), 100, 30);

        let outcome = scheduler.run(CancellationToken::new()).await;
        assert_eq!(outcome.records.len(), 4);
        assert_eq!(upload.upload_calls.load(Ordering::SeqCst), 12);
        assert_eq!(persist.persist_calls.load(Ordering::SeqCst), 4);
    }

    // -----------------------------------------------------------------------
    // Cancellation and state
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_cancel_keeps_partial_buffer() {
        let fetcher = Arc::new(FakeFetcher::new());
        let sink = Arc::new(CountingSink::default());
        let scheduler = scheduler(fetcher.clone(), sink.clone(), sink.clone(), 300, 30);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(45)).await;
            trigger.cancel();
        });

        let outcome = scheduler.run(cancel).await;
        assert!(outcome.cancelled);
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(fetcher.fetch_times(), vec![0, 30]);
        assert_eq!(scheduler.state(), SchedulerState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_starts_idle_and_is_observable() {
        let fetcher = Arc::new(FakeFetcher::new());
        let sink = Arc::new(CountingSink::default());
        let scheduler = scheduler(fetcher, sink.clone(), sink, 10, 30);

        assert_eq!(scheduler.state(), SchedulerState::Idle);
        let mut rx = scheduler.subscribe();
        scheduler.run(CancellationToken::new()).await;

        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), SchedulerState::Completed);
    }
}
