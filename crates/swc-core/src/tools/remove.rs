//! Bulk deletion of objects below a prefix.
//!
//! # Design
//! - Planning and deleting are separate steps so callers can report what a
//!   run would remove before anything is touched.
//! - Segments of a large object are deleted before its manifest; a segment
//!   that is already gone is not an error.

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;

use futures_util::stream;
use serde::Serialize;
use swc_store::{ListMode, ObjectEntry, ObjectLayout, ObjectStore};
use swc_telemetry::{JobKind, Metrics};
use tracing::{debug, info, warn};

use crate::error::{CoreError, CoreResult};
use crate::pool::{Job, PoolReport, WorkerPool};
use crate::segments;

/// Objects selected for deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovalPlan {
    /// Container holding the objects.
    pub container: String,
    /// Prefix the objects were listed with, after normalisation.
    pub prefix: Option<String>,
    /// Objects to delete.
    pub objects: Vec<ObjectEntry>,
    /// Delete the container once it is empty.
    pub delete_container: bool,
}

impl RemovalPlan {
    /// Bytes held by the selected objects.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.objects
            .iter()
            .fold(0_u64, |total, entry| total.saturating_add(entry.bytes))
    }
}

/// Outcome of executing a [`RemovalPlan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RemovalReport {
    /// Per-object results.
    pub objects: PoolReport,
    /// Whether the container itself was deleted.
    pub container_deleted: bool,
}

struct RemoveJob {
    name: String,
    bytes: u64,
}

impl Job for RemoveJob {
    fn label(&self) -> String {
        self.name.clone()
    }
}

/// Plans and executes deletions.
#[derive(Clone)]
pub struct Remover {
    store: Arc<dyn ObjectStore>,
    metrics: Metrics,
}

impl Remover {
    /// Remover over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, metrics: Metrics) -> Self {
        Self { store, metrics }
    }

    /// Select the objects a prefix refers to.
    ///
    /// - no prefix: every object, then the container;
    /// - a trailing `*`: the prefix as given, without the `*`;
    /// - no trailing `/`: the single object of that name, or the pseudo
    ///   folder `prefix/` when no such object exists;
    /// - otherwise every object below the prefix.
    ///
    /// # Errors
    ///
    /// Returns an error when the container cannot be listed or the object
    /// lookup fails for a reason other than absence.
    pub async fn plan(&self, container: &str, prefix: Option<&str>) -> CoreResult<RemovalPlan> {
        let Some(prefix) = prefix.filter(|prefix| !prefix.is_empty()) else {
            let objects = self.list(container, None).await?;
            return Ok(RemovalPlan {
                container: container.to_string(),
                prefix: None,
                objects,
                delete_container: true,
            });
        };

        let listing = if let Some(raw) = prefix.strip_suffix('*') {
            raw.to_string()
        } else if prefix.ends_with('/') {
            prefix.to_string()
        } else {
            match self.store.head(container, prefix).await {
                Ok(head) => {
                    return Ok(RemovalPlan {
                        container: container.to_string(),
                        prefix: Some(prefix.to_string()),
                        objects: vec![ObjectEntry {
                            name: prefix.to_string(),
                            bytes: head.content_length,
                            hash: head.etag,
                            content_type: None,
                            last_modified: None,
                        }],
                        delete_container: false,
                    });
                }
                Err(err) if err.is_not_found() => {
                    debug!(object = prefix, "no such object; treating as folder");
                    format!("{prefix}/")
                }
                Err(source) => return Err(CoreError::store("head", prefix, source)),
            }
        };

        let objects = self.list(container, Some(&listing)).await?;
        Ok(RemovalPlan {
            container: container.to_string(),
            prefix: Some(listing),
            objects,
            delete_container: false,
        })
    }

    async fn list(&self, container: &str, prefix: Option<&str>) -> CoreResult<Vec<ObjectEntry>> {
        self.store
            .list(container, prefix, ListMode::Full)
            .await
            .map_err(|source| CoreError::store("list", container, source))
    }

    /// Delete every object in `plan`, then the container when requested and
    /// every object was removed.
    ///
    /// # Errors
    ///
    /// Returns an error when the run is cancelled or the container cannot be
    /// deleted. Individual object failures are counted in the report.
    pub async fn execute<C>(
        &self,
        plan: &RemovalPlan,
        parallelism: NonZeroUsize,
        shutdown: C,
    ) -> CoreResult<RemovalReport>
    where
        C: Future<Output = ()> + Send,
    {
        info!(
            container = %plan.container,
            prefix = ?plan.prefix,
            objects = plan.objects.len(),
            bytes = plan.total_bytes(),
            "removal starting"
        );
        let jobs: Vec<RemoveJob> = plan
            .objects
            .iter()
            .map(|entry| RemoveJob {
                name: entry.name.clone(),
                bytes: entry.bytes,
            })
            .collect();
        let store = Arc::clone(&self.store);
        let container = Arc::new(plan.container.clone());
        let objects = WorkerPool::new(parallelism, JobKind::Delete)
            .with_metrics(Some(self.metrics.clone()))
            .run(
                stream::iter(jobs),
                move |job: RemoveJob| delete_object(Arc::clone(&store), Arc::clone(&container), job),
                shutdown,
            )
            .await?;

        let mut container_deleted = false;
        if plan.delete_container && objects.is_clean() {
            self.store
                .delete_container(&plan.container)
                .await
                .map_err(|source| CoreError::store("delete_container", &plan.container, source))?;
            info!(container = %plan.container, "container deleted");
            container_deleted = true;
        }
        Ok(RemovalReport {
            objects,
            container_deleted,
        })
    }
}

async fn delete_object(store: Arc<dyn ObjectStore>, container: Arc<String>, job: RemoveJob) -> CoreResult<u64> {
    match store.head(&container, &job.name).await {
        Ok(head) if head.layout == ObjectLayout::Segmented => {
            let map = segments::resolve(store.as_ref(), &container, &job.name).await?;
            for segment in &map.segments {
                match store.delete_object(&segment.container, &segment.object).await {
                    Ok(()) => debug!(segment = %segment.label(), "segment deleted"),
                    Err(err) if err.is_not_found() => {
                        debug!(segment = %segment.label(), "segment already gone");
                    }
                    Err(err) => warn!(segment = %segment.label(), error = %err, "failed to delete segment"),
                }
            }
        }
        Ok(_) => {}
        Err(err) if err.is_not_found() => {}
        Err(source) => return Err(CoreError::store("head", job.name, source)),
    }
    store
        .delete_object(&container, &job.name)
        .await
        .map_err(|source| CoreError::store("delete_object", job.name, source))?;
    Ok(job.bytes)
}
