//! Bounded worker pool shared by every pipeline.
//!
//! # Design
//! - Jobs are pulled lazily from a stream; a slot is reserved before the next
//!   job is pulled so producers never run far ahead of the workers.
//! - With one worker, jobs run inline in submission order.
//! - A failed or panicking job is logged and counted at any parallelism;
//!   siblings keep running.
//! - Resolving the shutdown future aborts in-flight jobs and returns
//!   [`CoreError::Cancelled`]; partial output is left in place.

use std::future::Future;
use std::num::NonZeroUsize;
use std::panic::AssertUnwindSafe;
use std::pin::pin;
use std::sync::Arc;

use futures_util::{FutureExt, Stream, StreamExt};
use serde::Serialize;
use swc_telemetry::{JobKind, JobStatus, Metrics};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info};

use crate::error::{CoreError, CoreResult};

/// Unit of pooled work.
pub trait Job: Send + 'static {
    /// Name used in logs.
    fn label(&self) -> String;
}

/// Aggregate outcome of a pool run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolReport {
    /// Jobs that completed.
    pub completed: usize,
    /// Jobs that failed.
    pub failed: usize,
    /// Bytes reported by completed jobs.
    pub bytes: u64,
}

impl PoolReport {
    /// Whether every job completed.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.failed == 0
    }

    /// Fold another report into this one.
    pub const fn absorb(&mut self, other: Self) {
        self.completed += other.completed;
        self.failed += other.failed;
        self.bytes = self.bytes.saturating_add(other.bytes);
    }
}

/// Executes jobs with bounded concurrency.
#[derive(Clone)]
pub struct WorkerPool {
    parallelism: NonZeroUsize,
    kind: JobKind,
    metrics: Option<Metrics>,
}

impl WorkerPool {
    /// Pool running at most `parallelism` jobs of `kind` at once.
    #[must_use]
    pub const fn new(parallelism: NonZeroUsize, kind: JobKind) -> Self {
        Self {
            parallelism,
            kind,
            metrics: None,
        }
    }

    /// Record job outcomes in `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Option<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Run every job from `jobs` through `worker` until the stream ends.
    ///
    /// Returns once all jobs finished. Job failures are counted in the report,
    /// not returned.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Cancelled`] when `shutdown` resolves first.
    pub async fn run<J, S, W, F, C>(&self, jobs: S, worker: W, shutdown: C) -> CoreResult<PoolReport>
    where
        J: Job,
        S: Stream<Item = J> + Send,
        W: Fn(J) -> F + Send + Sync + 'static,
        F: Future<Output = CoreResult<u64>> + Send + 'static,
        C: Future<Output = ()> + Send,
    {
        let worker = Arc::new(worker);
        let mut jobs = pin!(jobs);
        let mut shutdown = pin!(shutdown);
        let mut report = PoolReport::default();

        if self.parallelism.get() == 1 {
            loop {
                let next = tokio::select! {
                    biased;
                    () = &mut shutdown => return Err(CoreError::Cancelled),
                    next = jobs.next() => next,
                };
                let Some(job) = next else { break };
                let label = job.label();
                debug!(job = %label, "job running");
                let outcome = tokio::select! {
                    biased;
                    () = &mut shutdown => return Err(CoreError::Cancelled),
                    outcome = AssertUnwindSafe((*worker)(job)).catch_unwind() => outcome,
                };
                match outcome {
                    Ok(outcome) => self.settle(&mut report, &label, outcome),
                    Err(_) => {
                        error!(job = %label, "job panicked");
                        report.failed += 1;
                        self.record(JobStatus::Failed);
                    }
                }
            }
            return Ok(report);
        }

        let slots = Arc::new(Semaphore::new(self.parallelism.get()));
        let mut tasks: JoinSet<(String, CoreResult<u64>)> = JoinSet::new();
        loop {
            let permit = tokio::select! {
                biased;
                () = &mut shutdown => {
                    tasks.shutdown().await;
                    return Err(CoreError::Cancelled);
                }
                permit = Arc::clone(&slots).acquire_owned() => {
                    permit.map_err(|_| CoreError::Cancelled)?
                }
            };
            while let Some(joined) = tasks.try_join_next() {
                self.settle_joined(&mut report, joined);
            }

            let next = tokio::select! {
                biased;
                () = &mut shutdown => {
                    tasks.shutdown().await;
                    return Err(CoreError::Cancelled);
                }
                next = jobs.next() => next,
            };
            let Some(job) = next else { break };

            let label = job.label();
            debug!(job = %label, "job queued");
            let worker = Arc::clone(&worker);
            tasks.spawn(async move {
                let _permit = permit;
                debug!(job = %label, "job running");
                let outcome = (*worker)(job).await;
                (label, outcome)
            });
        }

        loop {
            let joined = tokio::select! {
                biased;
                () = &mut shutdown => {
                    tasks.shutdown().await;
                    return Err(CoreError::Cancelled);
                }
                joined = tasks.join_next() => joined,
            };
            let Some(joined) = joined else { break };
            self.settle_joined(&mut report, joined);
        }

        Ok(report)
    }

    fn settle_joined(
        &self,
        report: &mut PoolReport,
        joined: Result<(String, CoreResult<u64>), JoinError>,
    ) {
        match joined {
            Ok((label, outcome)) => self.settle(report, &label, outcome),
            Err(err) => {
                error!(error = %err, "worker task aborted");
                report.failed += 1;
                self.record(JobStatus::Failed);
            }
        }
    }

    fn settle(&self, report: &mut PoolReport, label: &str, outcome: CoreResult<u64>) {
        match outcome {
            Ok(bytes) => {
                info!(job = %label, bytes, "job completed");
                report.completed += 1;
                report.bytes = report.bytes.saturating_add(bytes);
                self.record(JobStatus::Completed);
            }
            Err(err) => {
                error!(job = %label, error = ?err, "job failed");
                report.failed += 1;
                self.record(JobStatus::Failed);
            }
        }
    }

    fn record(&self, status: JobStatus) {
        if let Some(metrics) = &self.metrics {
            metrics.record_job(self.kind, status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use futures_util::stream;

    type TestResult<T> = anyhow::Result<T>;

    struct Numbered(usize);

    impl Job for Numbered {
        fn label(&self) -> String {
            format!("job-{}", self.0)
        }
    }

    fn workers(count: usize) -> NonZeroUsize {
        NonZeroUsize::new(count).unwrap_or(NonZeroUsize::MIN)
    }

    #[tokio::test]
    async fn failing_job_does_not_affect_siblings() -> TestResult<()> {
        let metrics = Metrics::new()?;
        let pool = WorkerPool::new(workers(4), JobKind::Archive).with_metrics(Some(metrics.clone()));
        let jobs = stream::iter((0..10).map(Numbered));

        let report = pool
            .run(
                jobs,
                |job: Numbered| async move {
                    if job.0 == 3 {
                        Err(CoreError::invalid("job", "engineered_failure", "3"))
                    } else {
                        Ok(10)
                    }
                },
                future::pending(),
            )
            .await?;

        assert_eq!(report.completed, 9);
        assert_eq!(report.failed, 1);
        assert_eq!(report.bytes, 90);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.jobs_completed, 9);
        assert_eq!(snapshot.jobs_failed, 1);
        Ok(())
    }

    #[tokio::test]
    async fn single_worker_runs_in_submission_order() -> TestResult<()> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        let pool = WorkerPool::new(workers(1), JobKind::Extract);

        let report = pool
            .run(
                stream::iter((0..5).map(Numbered)),
                move |job: Numbered| {
                    let recorder = Arc::clone(&recorder);
                    async move {
                        let delay = 5 * (5 - job.0);
                        tokio::time::sleep(Duration::from_millis(delay as u64)).await;
                        recorder
                            .lock()
                            .map_err(|_| CoreError::Cancelled)?
                            .push(job.0);
                        Ok(0)
                    }
                },
                future::pending(),
            )
            .await?;

        assert_eq!(report.completed, 5);
        let order = seen.lock().map_err(|_| anyhow::anyhow!("poisoned"))?.clone();
        assert_eq!(order, [0, 1, 2, 3, 4]);
        Ok(())
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_the_limit() -> TestResult<()> {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (active_in, peak_in) = (Arc::clone(&active), Arc::clone(&peak));
        let pool = WorkerPool::new(workers(3), JobKind::Segment);

        let report = pool
            .run(
                stream::iter((0..12).map(Numbered)),
                move |_job: Numbered| {
                    let active = Arc::clone(&active_in);
                    let peak = Arc::clone(&peak_in);
                    async move {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                        Ok(1)
                    }
                },
                future::pending(),
            )
            .await?;

        assert_eq!(report.completed, 12);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(active.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn shutdown_cancels_in_flight_jobs() {
        let pool = WorkerPool::new(workers(2), JobKind::Download);
        let outcome = pool
            .run(
                stream::iter((0..4).map(Numbered)),
                |_job: Numbered| async {
                    future::pending::<()>().await;
                    Ok(0)
                },
                tokio::time::sleep(Duration::from_millis(20)),
            )
            .await;
        assert!(matches!(outcome, Err(CoreError::Cancelled)));
    }

    #[tokio::test]
    async fn panicking_job_counts_as_failed() -> TestResult<()> {
        for parallelism in [1, 2] {
            let pool = WorkerPool::new(workers(parallelism), JobKind::Search);
            let report = pool
                .run(
                    stream::iter((0..3).map(Numbered)),
                    |job: Numbered| async move {
                        assert_ne!(job.0, 1, "engineered panic");
                        Ok(1)
                    },
                    future::pending(),
                )
                .await?;
            assert_eq!(report.completed, 2, "parallelism {parallelism}");
            assert_eq!(report.failed, 1, "parallelism {parallelism}");
        }
        Ok(())
    }
}
