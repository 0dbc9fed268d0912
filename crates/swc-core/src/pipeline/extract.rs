//! Restore a tree from the archives stored in a container.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::stream;
use swc_config::{BuildFailurePolicy, ExtractSettings};
use swc_store::{ListMode, ObjectStore};
use swc_telemetry::{Direction, JobKind, Metrics};
use tracing::{debug, info, warn};

use super::{remove_scratch, scratch_path};
use crate::builder::Archiver;
use crate::codec::{self, DecodedName};
use crate::error::{CoreError, CoreResult};
use crate::pool::{Job, PoolReport, WorkerPool};

/// One archive object to download and unpack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractJob {
    /// Stored object name.
    pub object_name: String,
    /// Stem and tag recovered from the name.
    pub decoded: DecodedName,
}

impl Job for ExtractJob {
    fn label(&self) -> String {
        self.object_name.clone()
    }
}

/// Downloads and unpacks archives.
#[derive(Clone)]
pub struct ExtractPipeline {
    store: Arc<dyn ObjectStore>,
    archiver: Arc<dyn Archiver>,
    metrics: Metrics,
}

impl ExtractPipeline {
    /// Pipeline over the given store and archiver.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, archiver: Arc<dyn Archiver>, metrics: Metrics) -> Self {
        Self {
            store,
            archiver,
            metrics,
        }
    }

    /// Archive jobs for every object below the prefix.
    ///
    /// Objects that are not archives, and hidden ones when requested, are
    /// left out.
    ///
    /// # Errors
    ///
    /// Returns an error when the container cannot be listed.
    pub async fn plan(&self, settings: &ExtractSettings) -> CoreResult<Vec<ExtractJob>> {
        let prefix = settings.prefix.as_deref().filter(|prefix| !prefix.is_empty());
        let listing_prefix = prefix.map(|prefix| {
            if prefix.ends_with('/') {
                prefix.to_string()
            } else {
                format!("{prefix}/")
            }
        });
        let entries = self
            .store
            .list(&settings.container, listing_prefix.as_deref(), ListMode::Full)
            .await
            .map_err(|source| CoreError::store("list", &settings.container, source))?;

        Ok(entries
            .into_iter()
            .filter_map(|entry| {
                let Some(decoded) = codec::decode(&entry.name, prefix) else {
                    debug!(object = %entry.name, "not an archive; skipping");
                    return None;
                };
                if settings.no_hidden && codec::is_hidden(&decoded.relative_path) {
                    debug!(object = %entry.name, "hidden archive; skipping");
                    return None;
                }
                Some(ExtractJob {
                    object_name: entry.name,
                    decoded,
                })
            })
            .collect())
    }

    /// Restore every archive below the prefix into `settings.local_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error when the container cannot be listed or the run is
    /// cancelled. Individual job failures are counted in the report.
    pub async fn run<C>(&self, settings: &ExtractSettings, shutdown: C) -> CoreResult<PoolReport>
    where
        C: Future<Output = ()> + Send,
    {
        let jobs = self.plan(settings).await?;
        info!(
            container = %settings.container,
            local_dir = %settings.local_dir.display(),
            archives = jobs.len(),
            "extract run starting"
        );

        let worker = Arc::new(ExtractWorker {
            store: Arc::clone(&self.store),
            archiver: Arc::clone(&self.archiver),
            metrics: self.metrics.clone(),
            container: settings.container.clone(),
            local_dir: settings.local_dir.clone(),
            temp_dir: settings.temp_dir.clone(),
            policy: settings.failure_policy,
        });
        WorkerPool::new(settings.parallelism, JobKind::Extract)
            .with_metrics(Some(self.metrics.clone()))
            .run(
                stream::iter(jobs),
                move |job: ExtractJob| {
                    let worker = Arc::clone(&worker);
                    async move { worker.extract(job).await }
                },
                shutdown,
            )
            .await
    }
}

struct ExtractWorker {
    store: Arc<dyn ObjectStore>,
    archiver: Arc<dyn Archiver>,
    metrics: Metrics,
    container: String,
    local_dir: PathBuf,
    temp_dir: PathBuf,
    policy: BuildFailurePolicy,
}

impl ExtractWorker {
    async fn extract(&self, job: ExtractJob) -> CoreResult<u64> {
        let target = job.decoded.restore_target(&self.local_dir)?;
        tokio::fs::create_dir_all(&target)
            .await
            .map_err(|source| CoreError::io("extract.create_target", &target, source))?;

        let scratch = scratch_path(&self.temp_dir, &job.object_name);
        let outcome = self.download_and_unpack(&job, &scratch, &target).await;
        remove_scratch(&scratch).await;
        outcome
    }

    async fn download_and_unpack(&self, job: &ExtractJob, scratch: &Path, target: &Path) -> CoreResult<u64> {
        let bytes = self
            .store
            .download_to(&self.container, &job.object_name, scratch)
            .await
            .map_err(|source| CoreError::store("download", &job.object_name, source))?;
        self.metrics.add_bytes(Direction::Download, bytes);

        match self.archiver.extract(scratch, target).await {
            Ok(()) => Ok(bytes),
            Err(err @ CoreError::Archiver { .. }) if self.policy == BuildFailurePolicy::BestEffort => {
                warn!(
                    object = %job.object_name,
                    error = %err,
                    "extractor failed; keeping what was unpacked"
                );
                Ok(bytes)
            }
            Err(err) => Err(err),
        }
    }
}
