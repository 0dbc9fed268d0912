//! Pattern search over object names and bodies.
//!
//! # Design
//! - Objects with known binary or compressed suffixes are never fetched.
//! - Hits are delivered through a callback as they are found so callers can
//!   print them inline.

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;

use futures_util::stream;
use globset::{Glob, GlobMatcher};
use regex::bytes::{Regex, RegexBuilder};
use serde::Serialize;
use swc_store::{ListMode, ObjectEntry, ObjectStore};
use swc_telemetry::{Direction, JobKind, Metrics};
use tracing::{debug, warn};

use crate::error::{CoreError, CoreResult};
use crate::pool::{Job, PoolReport, WorkerPool};

/// Object name suffixes whose bodies are never searched.
pub const SKIPPED_SUFFIXES: &[&str] = &[
    ".bam", ".gz", ".tif", ".nc", ".fcs", ".dv", ".MOV", ".bin", ".jpg", ".zip", ".nd2", ".lsm",
    ".bz2", ".avi", ".pdf", ".tgz", ".xls", ".png", ".gif", ".pyc",
];

/// Bytes of context on each side of a body match.
pub const EXCERPT_CONTEXT: usize = 25;

/// What to search for and where.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    /// Literal text, or a regular expression when `ignore_case` is set.
    pub pattern: String,
    /// Match case-insensitively, treating the pattern as a regex.
    pub ignore_case: bool,
    /// Only search objects whose full name matches this glob.
    pub name_glob: Option<String>,
    /// Skip bodies that look binary.
    pub skip_binary: bool,
    /// Skip objects larger than this.
    pub max_object_bytes: Option<u64>,
}

/// Where a match was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HitKind {
    /// The object name contains the pattern.
    Name,
    /// The object body contains the pattern.
    Body,
}

/// One match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    /// Object the match was found in.
    pub object: String,
    /// Name or body match.
    pub kind: HitKind,
    /// Byte offset of a body match.
    pub offset: Option<usize>,
    /// Body text around the match.
    pub excerpt: Option<String>,
}

#[derive(Debug)]
struct CompiledQuery {
    matcher: Regex,
    names: Option<GlobMatcher>,
    skip_binary: bool,
    max_object_bytes: Option<u64>,
}

impl CompiledQuery {
    fn compile(query: &SearchQuery) -> CoreResult<Self> {
        if query.pattern.is_empty() {
            return Err(CoreError::InvalidInput {
                field: "pattern",
                reason: "empty",
                value: None,
            });
        }
        let source = if query.ignore_case {
            query.pattern.clone()
        } else {
            regex::escape(&query.pattern)
        };
        let matcher = RegexBuilder::new(&source)
            .case_insensitive(query.ignore_case)
            .build()
            .map_err(|source| CoreError::Pattern {
                pattern: query.pattern.clone(),
                source,
            })?;
        let names = query
            .name_glob
            .as_deref()
            .map(|pattern| {
                Glob::new(pattern)
                    .map(|glob| glob.compile_matcher())
                    .map_err(|source| CoreError::Glob {
                        pattern: pattern.to_string(),
                        source,
                    })
            })
            .transpose()?;
        Ok(Self {
            matcher,
            names,
            skip_binary: query.skip_binary,
            max_object_bytes: query.max_object_bytes,
        })
    }

    fn selects(&self, entry: &ObjectEntry) -> bool {
        if SKIPPED_SUFFIXES
            .iter()
            .any(|suffix| entry.name.ends_with(suffix))
        {
            return false;
        }
        if self
            .names
            .as_ref()
            .is_some_and(|names| !names.is_match(&entry.name))
        {
            return false;
        }
        if self.max_object_bytes.is_some_and(|limit| entry.bytes > limit) {
            warn!(object = %entry.name, bytes = entry.bytes, "object too large to search");
            return false;
        }
        true
    }
}

struct SearchJob {
    object: String,
}

impl Job for SearchJob {
    fn label(&self) -> String {
        self.object.clone()
    }
}

/// Searches objects below a prefix.
#[derive(Clone)]
pub struct Searcher {
    store: Arc<dyn ObjectStore>,
    metrics: Metrics,
}

impl Searcher {
    /// Searcher over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, metrics: Metrics) -> Self {
        Self { store, metrics }
    }

    /// Search every selected object and report hits through `on_hit`.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid pattern or glob, when the container
    /// cannot be listed, or when the run is cancelled.
    pub async fn run<H, C>(
        &self,
        container: &str,
        prefix: Option<&str>,
        query: &SearchQuery,
        parallelism: NonZeroUsize,
        on_hit: H,
        shutdown: C,
    ) -> CoreResult<PoolReport>
    where
        H: Fn(SearchHit) + Send + Sync + 'static,
        C: Future<Output = ()> + Send,
    {
        let query = Arc::new(CompiledQuery::compile(query)?);
        let entries = self
            .store
            .list(container, prefix, ListMode::Full)
            .await
            .map_err(|source| CoreError::store("list", container, source))?;
        let jobs: Vec<SearchJob> = entries
            .into_iter()
            .filter(|entry| query.selects(entry))
            .map(|entry| SearchJob { object: entry.name })
            .collect();
        debug!(container, objects = jobs.len(), "search starting");

        let worker = Arc::new(SearchWorker {
            store: Arc::clone(&self.store),
            metrics: self.metrics.clone(),
            container: container.to_string(),
            query,
            on_hit,
        });
        WorkerPool::new(parallelism, JobKind::Search)
            .with_metrics(Some(self.metrics.clone()))
            .run(
                stream::iter(jobs),
                move |job: SearchJob| {
                    let worker = Arc::clone(&worker);
                    async move { worker.search(job).await }
                },
                shutdown,
            )
            .await
    }
}

struct SearchWorker<H> {
    store: Arc<dyn ObjectStore>,
    metrics: Metrics,
    container: String,
    query: Arc<CompiledQuery>,
    on_hit: H,
}

impl<H> SearchWorker<H>
where
    H: Fn(SearchHit) + Send + Sync,
{
    async fn search(&self, job: SearchJob) -> CoreResult<u64> {
        if self.query.matcher.is_match(job.object.as_bytes()) {
            (self.on_hit)(SearchHit {
                object: job.object.clone(),
                kind: HitKind::Name,
                offset: None,
                excerpt: None,
            });
        }

        let body = self
            .store
            .get(&self.container, &job.object)
            .await
            .map_err(|source| CoreError::store("get", &job.object, source))?;
        let bytes = u64::try_from(body.len()).unwrap_or(u64::MAX);
        self.metrics.add_bytes(Direction::Download, bytes);

        if self.query.skip_binary && is_binary(&body) {
            debug!(object = %job.object, "binary body skipped");
            return Ok(bytes);
        }
        if let Some(found) = self.query.matcher.find(&body) {
            (self.on_hit)(SearchHit {
                object: job.object,
                kind: HitKind::Body,
                offset: Some(found.start()),
                excerpt: Some(excerpt(&body, found.start(), found.end())),
            });
        }
        Ok(bytes)
    }
}

/// Whether `data` contains bytes outside the usual text range.
#[must_use]
pub fn is_binary(data: &[u8]) -> bool {
    data.iter()
        .any(|&byte| !matches!(byte, 7..=10 | 12 | 13 | 27 | 0x20..=0x7e | 0x80..=0xff))
}

/// Text around `start..end`, widened by [`EXCERPT_CONTEXT`] bytes each side.
#[must_use]
pub fn excerpt(data: &[u8], start: usize, end: usize) -> String {
    let from = start.saturating_sub(EXCERPT_CONTEXT);
    let to = end.saturating_add(EXCERPT_CONTEXT).min(data.len());
    String::from_utf8_lossy(&data[from..to]).into_owned()
}
