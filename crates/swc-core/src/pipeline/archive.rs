//! Archive a local tree into a container.
//!
//! # Design
//! - The walk and plan run on a blocking thread and feed a bounded channel,
//!   so jobs are uploading while the rest of the tree is still being walked.
//! - An archiver failure aborts the job unless the run is best-effort, in
//!   which case whatever was written is uploaded.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use swc_config::{ArchiveSettings, BuildFailurePolicy};
use swc_store::{ObjectStore, UploadOptions};
use swc_telemetry::{Direction, JobKind, Metrics};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use super::{UPLOADED_BY_HEADER, remove_scratch, scratch_path, uploader_login};
use crate::builder::{Archiver, CreateArchive};
use crate::classifier::{Classifier, root_stem};
use crate::codec;
use crate::error::{CoreError, CoreResult};
use crate::plan::{ArchiveJob, PlanOptions, Planner};
use crate::pool::{PoolReport, WorkerPool};

/// Walks, archives and uploads a tree.
#[derive(Clone)]
pub struct ArchivePipeline {
    store: Arc<dyn ObjectStore>,
    archiver: Arc<dyn Archiver>,
    metrics: Metrics,
}

impl ArchivePipeline {
    /// Pipeline over the given store and archiver.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, archiver: Arc<dyn Archiver>, metrics: Metrics) -> Self {
        Self {
            store,
            archiver,
            metrics,
        }
    }

    /// Archive `settings.local_dir` into `settings.container`.
    ///
    /// # Errors
    ///
    /// Returns an error when the container cannot be prepared, the subtree is
    /// outside the tree, or the run is cancelled. Individual job failures are
    /// counted in the report.
    pub async fn run<C>(&self, settings: &ArchiveSettings, shutdown: C) -> CoreResult<PoolReport>
    where
        C: Future<Output = ()> + Send,
    {
        let subtree = relative_subtree(settings)?;
        self.store
            .ensure_container(&settings.container)
            .await
            .map_err(|source| CoreError::store("ensure_container", &settings.container, source))?;

        let worker = Arc::new(ArchiveWorker {
            store: Arc::clone(&self.store),
            archiver: Arc::clone(&self.archiver),
            metrics: self.metrics.clone(),
            container: settings.container.clone(),
            temp_dir: settings.temp_dir.clone(),
            upload: upload_options(settings),
            policy: settings.failure_policy,
        });
        info!(
            local_dir = %settings.local_dir.display(),
            container = %settings.container,
            archiver = worker.archiver.name(),
            parallelism = settings.parallelism.get(),
            "archive run starting"
        );

        let (sender, receiver) = mpsc::channel(settings.parallelism.get());
        let classifier = Classifier::new(&settings.local_dir, settings.walk.clone())
            .with_metrics(Some(self.metrics.clone()));
        let root = settings.local_dir.clone();
        let options = PlanOptions {
            prefix: settings.prefix.clone(),
            subtree,
            bundle_threshold: settings.bundle_threshold,
        };
        let producer = tokio::task::spawn_blocking(move || {
            let stem = root_stem(&root);
            for job in Planner::new(classifier.units(), root, stem, options) {
                if sender.blocking_send(job).is_err() {
                    break;
                }
            }
        });

        let pool = WorkerPool::new(settings.parallelism, JobKind::Archive)
            .with_metrics(Some(self.metrics.clone()));
        let report = pool
            .run(
                ReceiverStream::new(receiver),
                move |job: ArchiveJob| {
                    let worker = Arc::clone(&worker);
                    async move { worker.archive(job).await }
                },
                shutdown,
            )
            .await?;
        producer.await.map_err(|source| CoreError::Join {
            operation: "archive.plan",
            source,
        })?;
        Ok(report)
    }
}

struct ArchiveWorker {
    store: Arc<dyn ObjectStore>,
    archiver: Arc<dyn Archiver>,
    metrics: Metrics,
    container: String,
    temp_dir: PathBuf,
    upload: UploadOptions,
    policy: BuildFailurePolicy,
}

impl ArchiveWorker {
    async fn archive(&self, job: ArchiveJob) -> CoreResult<u64> {
        codec::ensure_reversible(&job.object_name, job.tag)?;
        let scratch = scratch_path(&self.temp_dir, &job.object_name);
        let outcome = self.build_and_upload(&job, &scratch).await;
        remove_scratch(&scratch).await;
        outcome
    }

    async fn build_and_upload(&self, job: &ArchiveJob, scratch: &Path) -> CoreResult<u64> {
        let request = CreateArchive {
            archive: scratch,
            base_dir: &job.base_dir,
            members: &job.members,
            recursive: job.recursive,
            scratch_dir: &self.temp_dir,
        };
        match self.archiver.create(&request).await {
            Ok(()) => {}
            Err(err @ CoreError::Archiver { .. }) if self.policy == BuildFailurePolicy::BestEffort => {
                warn!(
                    object = %job.object_name,
                    error = %err,
                    "archiver failed; uploading what was written"
                );
            }
            Err(err) => return Err(err),
        }

        let bytes = self
            .store
            .upload_file(&self.container, &job.object_name, scratch, &self.upload)
            .await
            .map_err(|source| CoreError::store("upload", &job.object_name, source))?;
        self.metrics.add_bytes(Direction::Upload, bytes);
        Ok(bytes)
    }
}

fn upload_options(settings: &ArchiveSettings) -> UploadOptions {
    let mut headers = vec![(UPLOADED_BY_HEADER.to_string(), uploader_login())];
    headers.extend(
        settings
            .metadata
            .iter()
            .map(|pair| (pair.header_name(), pair.value.clone())),
    );
    UploadOptions {
        segment_size: settings.segment_size,
        segment_container: settings.segment_container(),
        headers,
    }
}

fn relative_subtree(settings: &ArchiveSettings) -> CoreResult<Option<PathBuf>> {
    let Some(subtree) = &settings.subtree else {
        return Ok(None);
    };
    if subtree.is_relative() {
        return Ok(Some(subtree.clone()));
    }
    subtree
        .strip_prefix(&settings.local_dir)
        .map(|relative| Some(relative.to_path_buf()))
        .map_err(|_| {
            CoreError::invalid(
                "subtree",
                "outside_local_dir",
                subtree.display().to_string(),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future;

    use async_trait::async_trait;
    use swc_config::ObjectMetadata;
    use swc_test_support::fixtures::write_tree;
    use swc_test_support::mocks::MemoryStore;
    use tempfile::TempDir;

    use crate::builder::NativeTar;

    type TestResult<T> = anyhow::Result<T>;

    struct Fixture {
        _temp: TempDir,
        store: Arc<MemoryStore>,
        settings: ArchiveSettings,
    }

    fn fixture(files: &[(&str, &[u8])]) -> TestResult<Fixture> {
        let temp = TempDir::new()?;
        let local_dir = temp.path().join("data");
        write_tree(&local_dir, files)?;
        let scratch = temp.path().join("scratch");
        std::fs::create_dir_all(&scratch)?;
        let mut settings = ArchiveSettings::new(local_dir, "proj".to_string(), scratch);
        settings.prefix = Some("backup".to_string());
        Ok(Fixture {
            _temp: temp,
            store: Arc::new(MemoryStore::new()),
            settings,
        })
    }

    fn pipeline(store: &Arc<MemoryStore>, archiver: Arc<dyn Archiver>) -> TestResult<(ArchivePipeline, Metrics)> {
        let metrics = Metrics::new()?;
        let store: Arc<dyn ObjectStore> = Arc::clone(store) as Arc<dyn ObjectStore>;
        Ok((ArchivePipeline::new(store, archiver, metrics.clone()), metrics))
    }

    struct FailingArchiver;

    #[async_trait]
    impl Archiver for FailingArchiver {
        async fn create(&self, request: &CreateArchive<'_>) -> CoreResult<()> {
            tokio::fs::write(request.archive, b"partial")
                .await
                .map_err(|source| CoreError::io("test.create", request.archive, source))?;
            Err(CoreError::Archiver {
                operation: "test.create",
                archive: request.archive.to_path_buf(),
                status: Some(2),
            })
        }

        async fn extract(&self, _archive: &Path, _target: &Path) -> CoreResult<()> {
            Ok(())
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    #[tokio::test]
    async fn one_object_per_directory_with_root_tag() -> TestResult<()> {
        let fx = fixture(&[("a.txt", &[1_u8; 10]), ("sub/b.txt", &[2_u8; 20])])?;
        let (pipeline, metrics) = pipeline(&fx.store, Arc::new(NativeTar))?;

        let report = pipeline.run(&fx.settings, future::pending()).await?;

        assert_eq!(report.completed, 2);
        assert!(report.is_clean());
        assert_eq!(
            fx.store.names("proj"),
            ["backup/data.root.tar.gz", "backup/sub.tar.gz"]
        );
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.jobs_completed, 2);
        assert_eq!(snapshot.bytes_uploaded, report.bytes);
        let leftovers = std::fs::read_dir(&fx.settings.temp_dir)?.count();
        assert_eq!(leftovers, 0);
        Ok(())
    }

    #[tokio::test]
    async fn uploads_carry_uploader_and_user_metadata() -> TestResult<()> {
        let mut fx = fixture(&[("a.txt", b"a")])?;
        fx.settings.metadata = vec![ObjectMetadata {
            key: "project".to_string(),
            value: "genomics".to_string(),
        }];
        let (pipeline, _metrics) = pipeline(&fx.store, Arc::new(NativeTar))?;

        pipeline.run(&fx.settings, future::pending()).await?;

        let metadata = fx
            .store
            .metadata("proj", "backup/data.root.tar.gz")
            .ok_or_else(|| anyhow::anyhow!("object missing"))?;
        assert_eq!(metadata.get("project").map(String::as_str), Some("genomics"));
        assert_eq!(metadata.get("uploaded-by"), Some(&uploader_login()));
        Ok(())
    }

    #[tokio::test]
    async fn subtree_limits_the_run() -> TestResult<()> {
        let mut fx = fixture(&[("a.txt", b"a"), ("keep/x", b"x"), ("keep/deep/y", b"y"), ("skip/z", b"z")])?;
        fx.settings.subtree = Some(fx.settings.local_dir.join("keep"));
        let (pipeline, _metrics) = pipeline(&fx.store, Arc::new(NativeTar))?;

        pipeline.run(&fx.settings, future::pending()).await?;

        assert_eq!(
            fx.store.names("proj"),
            ["backup/keep.tar.gz", "backup/keep/deep.tar.gz"]
        );
        Ok(())
    }

    #[tokio::test]
    async fn subtree_outside_the_tree_is_rejected() -> TestResult<()> {
        let mut fx = fixture(&[("a.txt", b"a")])?;
        fx.settings.subtree = Some(PathBuf::from("/elsewhere"));
        let (pipeline, _metrics) = pipeline(&fx.store, Arc::new(NativeTar))?;

        let outcome = pipeline.run(&fx.settings, future::pending()).await;
        assert!(matches!(
            outcome,
            Err(CoreError::InvalidInput { field: "subtree", .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn archiver_failure_aborts_by_default() -> TestResult<()> {
        let fx = fixture(&[("a.txt", b"a")])?;
        let (pipeline, metrics) = pipeline(&fx.store, Arc::new(FailingArchiver))?;

        let report = pipeline.run(&fx.settings, future::pending()).await?;

        assert_eq!(report.failed, 1);
        assert!(fx.store.names("proj").is_empty());
        assert_eq!(metrics.snapshot().jobs_failed, 1);
        Ok(())
    }

    #[tokio::test]
    async fn best_effort_uploads_partial_archives() -> TestResult<()> {
        let mut fx = fixture(&[("a.txt", b"a")])?;
        fx.settings.failure_policy = BuildFailurePolicy::BestEffort;
        let (pipeline, _metrics) = pipeline(&fx.store, Arc::new(FailingArchiver))?;

        let report = pipeline.run(&fx.settings, future::pending()).await?;

        assert_eq!(report.completed, 1);
        assert_eq!(report.bytes, 7);
        assert_eq!(fx.store.names("proj"), ["backup/data.root.tar.gz"]);
        Ok(())
    }

    #[tokio::test]
    async fn failed_upload_leaves_siblings_untouched() -> TestResult<()> {
        let mut fx = fixture(&[("a.txt", b"a"), ("one/x", b"x"), ("two/y", b"y")])?;
        fx.settings.prefix = None;
        fx.store.fail_on("one.tar.gz");
        let (pipeline, _metrics) = pipeline(&fx.store, Arc::new(NativeTar))?;

        let report = pipeline.run(&fx.settings, future::pending()).await?;

        assert_eq!(report.completed, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(fx.store.names("proj"), ["data.root.tar.gz", "two.tar.gz"]);
        Ok(())
    }

    #[tokio::test]
    async fn directories_named_like_tags_fail_instead_of_misrestoring() -> TestResult<()> {
        let fx = fixture(&[("a.txt", b"a"), ("x.root/f", b"f"), ("y.bundle/g", b"g")])?;
        let (pipeline, metrics) = pipeline(&fx.store, Arc::new(NativeTar))?;

        let report = pipeline.run(&fx.settings, future::pending()).await?;

        assert_eq!(report.completed, 1);
        assert_eq!(report.failed, 2);
        assert!(!report.is_clean());
        assert_eq!(fx.store.names("proj"), ["backup/data.root.tar.gz"]);
        assert_eq!(metrics.snapshot().jobs_failed, 2);
        Ok(())
    }

    #[tokio::test]
    async fn large_archives_are_segmented() -> TestResult<()> {
        let mut fx = fixture(&[("noise.bin", &pseudo_random(4_096))])?;
        fx.settings.segment_size = 512;
        let (pipeline, _metrics) = pipeline(&fx.store, Arc::new(NativeTar))?;

        pipeline.run(&fx.settings, future::pending()).await?;

        let head = fx.store.head("proj", "backup/data.root.tar.gz").await?;
        assert_eq!(head.layout, swc_store::ObjectLayout::Segmented);
        assert!(fx.store.names(".segments_proj").len() > 1);
        Ok(())
    }

    fn pseudo_random(len: usize) -> Vec<u8> {
        let mut state = 0x2545_f491_u32;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state.to_le_bytes()[0]
            })
            .collect()
    }
}
