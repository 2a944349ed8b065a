use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::models::NormalizedRecord;
use crate::{log_error, log_info, log_warn};

use super::{PersistSink, SinkResult, UploadSink};

const ENABLE_LOGS: bool = true;

/// Bounded retry with a fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(5))
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Run `op` until it succeeds or `max_attempts` calls have failed.
    ///
    /// The error from the last attempt is returned unchanged.
    pub async fn execute<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        log_info!(
                            "{label} succeeded on attempt {attempt} of {}",
                            self.max_attempts
                        );
                    }
                    return Ok(value);
                }
                Err(err) if attempt < self.max_attempts => {
                    log_warn!(
                        "{label} failed (attempt {attempt} of {}): {err}; retrying in {:?}",
                        self.max_attempts,
                        self.delay
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    log_error!("{label} failed after {attempt} attempts: {err}");
                    return Err(err);
                }
            }
        }
    }
}

/// A sink decorated with a [`RetryPolicy`].
pub struct RetryableSink<S: ?Sized> {
    inner: Arc<S>,
    policy: RetryPolicy,
}

impl<S: ?Sized> RetryableSink<S> {
    pub fn new(inner: Arc<S>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

impl<S: PersistSink + ?Sized> RetryableSink<S> {
    pub async fn persist(&self, record: &NormalizedRecord) -> SinkResult<()> {
        let inner = &*self.inner;
        self.policy
            .execute("persist", move || inner.persist(record))
            .await
    }
}

impl<S: UploadSink + ?Sized> RetryableSink<S> {
    /// Upload in chunks of at most `max_batch`, each retried on its own.
    ///
    /// Stops at the first chunk that exhausts its attempts.
    pub async fn upload(&self, records: &[NormalizedRecord]) -> SinkResult<()> {
        let inner = &*self.inner;
        let max_batch = inner.max_batch().max(1);

        for chunk in records.chunks(max_batch) {
            self.policy
                .execute("upload", move || inner.upload(chunk))
                .await?;
        }
        Ok(())
    }
}
