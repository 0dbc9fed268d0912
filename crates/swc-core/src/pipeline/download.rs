//! Download named objects, reassembling segmented ones in parallel.
//!
//! # Design
//! - Objects are fetched one after another; the segments of one large object
//!   are fetched concurrently and written straight into a pre-sized file.
//! - The layout is decided once from the object's metadata.
//! - A failed segment fails its object only; the partial file is left in
//!   place so the run can be repeated.

use std::future::{self, Future};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::stream;
use swc_config::DownloadSettings;
use swc_store::{ObjectLayout, ObjectStore};
use swc_telemetry::{Direction, JobKind, Metrics};
use tracing::{debug, info};

use crate::codec;
use crate::error::{CoreError, CoreResult};
use crate::pool::{Job, PoolReport, WorkerPool};
use crate::segments::{self, SegmentDescriptor};
use crate::sparse;

/// One object to download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    /// Object name in the container.
    pub object_name: String,
}

impl Job for DownloadJob {
    fn label(&self) -> String {
        self.object_name.clone()
    }
}

/// Downloads objects into a local directory.
#[derive(Clone)]
pub struct DownloadPipeline {
    store: Arc<dyn ObjectStore>,
    metrics: Metrics,
}

impl DownloadPipeline {
    /// Pipeline over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, metrics: Metrics) -> Self {
        Self { store, metrics }
    }

    /// Download every object in `settings.objects` below `settings.target_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Cancelled`] when `shutdown` resolves first.
    /// Individual object failures are counted in the report.
    pub async fn run<C>(&self, settings: &DownloadSettings, shutdown: C) -> CoreResult<PoolReport>
    where
        C: Future<Output = ()> + Send,
    {
        info!(
            container = %settings.container,
            objects = settings.objects.len(),
            parallelism = settings.parallelism.get(),
            "download run starting"
        );
        let worker = Arc::new(DownloadWorker {
            store: Arc::clone(&self.store),
            metrics: self.metrics.clone(),
            container: settings.container.clone(),
            target_dir: settings.target_dir.clone(),
            parallelism: settings.parallelism,
        });
        let jobs: Vec<DownloadJob> = settings
            .objects
            .iter()
            .map(|name| DownloadJob {
                object_name: name.clone(),
            })
            .collect();

        WorkerPool::new(NonZeroUsize::MIN, JobKind::Download)
            .with_metrics(Some(self.metrics.clone()))
            .run(
                stream::iter(jobs),
                move |job: DownloadJob| {
                    let worker = Arc::clone(&worker);
                    async move { worker.download(job).await }
                },
                shutdown,
            )
            .await
    }
}

struct DownloadWorker {
    store: Arc<dyn ObjectStore>,
    metrics: Metrics,
    container: String,
    target_dir: PathBuf,
    parallelism: NonZeroUsize,
}

impl DownloadWorker {
    async fn download(&self, job: DownloadJob) -> CoreResult<u64> {
        let relative = codec::sanitize_relative(&job.object_name)?;
        if relative.as_os_str().is_empty() {
            return Err(CoreError::invalid("object_name", "empty_path", job.object_name));
        }
        let target = self.target_dir.join(relative);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| CoreError::io("download.create_parent", parent, source))?;
        }

        let head = self
            .store
            .head(&self.container, &job.object_name)
            .await
            .map_err(|source| CoreError::store("head", &job.object_name, source))?;
        match head.layout {
            ObjectLayout::Single => {
                let bytes = self
                    .store
                    .download_to(&self.container, &job.object_name, &target)
                    .await
                    .map_err(|source| CoreError::store("download", &job.object_name, source))?;
                self.metrics.add_bytes(Direction::Download, bytes);
                Ok(bytes)
            }
            ObjectLayout::Segmented => self.reassemble(&job.object_name, &target).await,
        }
    }

    async fn reassemble(&self, object: &str, target: &Path) -> CoreResult<u64> {
        let map = segments::resolve(self.store.as_ref(), &self.container, object).await?;
        debug!(
            object,
            segments = map.segments.len(),
            total_size = map.total_size,
            "segment map resolved"
        );
        sparse::allocate(target, map.total_size).await?;

        let store = Arc::clone(&self.store);
        let metrics = self.metrics.clone();
        let target = Arc::new(target.to_path_buf());
        let report = WorkerPool::new(self.parallelism, JobKind::Segment)
            .with_metrics(Some(self.metrics.clone()))
            .run(
                stream::iter(map.segments),
                move |segment: SegmentDescriptor| {
                    fetch_segment(
                        Arc::clone(&store),
                        metrics.clone(),
                        Arc::clone(&target),
                        segment,
                    )
                },
                future::pending(),
            )
            .await?;

        if !report.is_clean() {
            return Err(CoreError::Incomplete {
                object: object.to_string(),
                failed: report.failed,
            });
        }
        Ok(map.total_size)
    }
}

async fn fetch_segment(
    store: Arc<dyn ObjectStore>,
    metrics: Metrics,
    target: Arc<PathBuf>,
    segment: SegmentDescriptor,
) -> CoreResult<u64> {
    let body = store
        .get(&segment.container, &segment.object)
        .await
        .map_err(|source| CoreError::store("get_segment", segment.label(), source))?;
    let actual = u64::try_from(body.len()).unwrap_or(u64::MAX);
    if actual != segment.length {
        return Err(CoreError::SegmentLength {
            segment: segment.label(),
            expected: segment.length,
            actual,
        });
    }
    sparse::write_segment(&target, segment.offset, &body).await?;
    metrics.add_bytes(Direction::Download, actual);
    Ok(actual)
}
