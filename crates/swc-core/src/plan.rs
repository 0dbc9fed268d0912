//! Turning directory units into archive jobs.
//!
//! # Design
//! - One job per standalone directory by default.
//! - With a bundle threshold, consecutive child or sibling directories are
//!   merged until the bundle reaches the threshold; a directory at or above
//!   the threshold on its own is archived standalone.
//! - Recursive units are archived from the walk root so their members carry
//!   the full relative path, like the root and bundle archives.

use std::collections::VecDeque;
use std::path::{Component, Path, PathBuf};

use crate::codec::{self, ArchiveTag};
use crate::pool::Job;
use crate::unit::{DirectoryUnit, UnitKind};

/// Member name of a directory's own entry.
const SELF_MEMBER: &str = ".";

/// A single archive to build and upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveJob {
    /// Destination object name.
    pub object_name: String,
    /// Naming tag of the archive.
    pub tag: ArchiveTag,
    /// Directory the members are relative to.
    pub base_dir: PathBuf,
    /// Members in archive order.
    pub members: Vec<PathBuf>,
    /// Include descendants of directory members.
    pub recursive: bool,
    /// Bytes of regular files known to be included.
    pub bytes_hint: u64,
}

impl Job for ArchiveJob {
    fn label(&self) -> String {
        self.object_name.clone()
    }
}

/// Options shaping the plan.
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// Object name prefix.
    pub prefix: Option<String>,
    /// Only plan units at or below this path relative to the walk root.
    pub subtree: Option<PathBuf>,
    /// Bundle directories until they reach this many bytes.
    pub bundle_threshold: Option<u64>,
}

/// Iterator adapter from directory units to archive jobs.
pub struct Planner<I> {
    units: I,
    root: PathBuf,
    root_stem: String,
    prefix: Option<String>,
    subtree: Option<PathBuf>,
    bundles: Option<BundleAccumulator>,
    ready: VecDeque<ArchiveJob>,
    exhausted: bool,
}

impl<I> Planner<I>
where
    I: Iterator<Item = DirectoryUnit>,
{
    /// Plan jobs for `units` walked from `root`.
    pub fn new(units: I, root: impl Into<PathBuf>, root_stem: String, options: PlanOptions) -> Self {
        Self {
            units,
            root: root.into(),
            root_stem,
            prefix: options.prefix,
            subtree: options.subtree.map(|path| normalise(&path)),
            bundles: options.bundle_threshold.map(BundleAccumulator::new),
            ready: VecDeque::new(),
            exhausted: false,
        }
    }

    fn in_subtree(&self, unit: &DirectoryUnit) -> bool {
        self.subtree.as_ref().is_none_or(|subtree| {
            subtree.as_os_str().is_empty() || unit.relative_path.starts_with(subtree)
        })
    }

    fn plan(&mut self, unit: DirectoryUnit) {
        if !self.in_subtree(&unit) {
            return;
        }
        match unit.kind {
            UnitKind::RecursiveChild => {}
            UnitKind::RecursiveRoot => {
                let stem = codec::stem_for(&unit.relative_path);
                self.ready.push_back(ArchiveJob {
                    object_name: codec::encode(&stem, ArchiveTag::Root, self.prefix.as_deref()),
                    tag: ArchiveTag::Root,
                    base_dir: self.root.clone(),
                    members: vec![unit.relative_path],
                    recursive: true,
                    bytes_hint: unit.flat_size,
                });
            }
            UnitKind::Standalone | UnitKind::Bundle => match self.bundles.take() {
                Some(mut bundles) => {
                    bundles.offer(unit, self);
                    self.bundles = Some(bundles);
                }
                None => {
                    let job = self.standalone(unit);
                    self.ready.push_back(job);
                }
            },
        }
    }

    fn stem_of(&self, unit: &DirectoryUnit) -> String {
        if unit.is_root() {
            self.root_stem.clone()
        } else {
            codec::stem_for(&unit.relative_path)
        }
    }

    fn standalone(&self, unit: DirectoryUnit) -> ArchiveJob {
        let tag = if unit.is_root() {
            ArchiveTag::Root
        } else {
            ArchiveTag::Plain
        };
        let stem = self.stem_of(&unit);
        let mut members = Vec::with_capacity(unit.files.len() + 1);
        members.push(PathBuf::from(SELF_MEMBER));
        members.extend(unit.files.into_iter().map(PathBuf::from));
        ArchiveJob {
            object_name: codec::encode(&stem, tag, self.prefix.as_deref()),
            tag,
            base_dir: unit.path,
            members,
            recursive: false,
            bytes_hint: unit.flat_size,
        }
    }
}

impl<I> Iterator for Planner<I>
where
    I: Iterator<Item = DirectoryUnit>,
{
    type Item = ArchiveJob;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(job) = self.ready.pop_front() {
                return Some(job);
            }
            if self.exhausted {
                return None;
            }
            match self.units.next() {
                Some(unit) => self.plan(unit),
                None => {
                    self.exhausted = true;
                    let last = match self.bundles.as_mut() {
                        Some(bundles) => bundles.close(self.prefix.as_deref(), &self.root),
                        None => None,
                    };
                    self.ready.extend(last);
                }
            }
        }
    }
}

struct OpenBundle {
    stem: String,
    last_dir: PathBuf,
    members: Vec<PathBuf>,
    size: u64,
}

impl OpenBundle {
    fn append(&mut self, unit: DirectoryUnit) {
        if unit.is_root() {
            self.members.push(PathBuf::from(SELF_MEMBER));
            self.members.extend(unit.files.iter().map(PathBuf::from));
        } else {
            let base = &unit.relative_path;
            self.members.push(base.clone());
            self.members.extend(unit.files.iter().map(|file| base.join(file)));
        }
        self.size = self.size.saturating_add(unit.flat_size);
        self.last_dir = unit.path;
    }
}

struct BundleAccumulator {
    threshold: u64,
    open: Option<OpenBundle>,
}

impl BundleAccumulator {
    const fn new(threshold: u64) -> Self {
        Self {
            threshold,
            open: None,
        }
    }

    fn offer<I>(&mut self, unit: DirectoryUnit, planner: &mut Planner<I>)
    where
        I: Iterator<Item = DirectoryUnit>,
    {
        let prefix = planner.prefix.clone();
        let joins = self
            .open
            .as_ref()
            .is_some_and(|open| is_child_or_sibling(&unit.path, &open.last_dir));
        if joins {
            let threshold = self.threshold;
            let full = self.open.as_mut().is_some_and(|open| {
                open.append(unit);
                open.size >= threshold
            });
            if full {
                planner
                    .ready
                    .extend(self.close(prefix.as_deref(), &planner.root));
            }
            return;
        }

        planner
            .ready
            .extend(self.close(prefix.as_deref(), &planner.root));
        if unit.flat_size < self.threshold {
            let mut open = OpenBundle {
                stem: planner.stem_of(&unit),
                last_dir: unit.path.clone(),
                members: Vec::new(),
                size: 0,
            };
            open.append(unit);
            self.open = Some(open);
        } else {
            let job = planner.standalone(unit);
            planner.ready.push_back(job);
        }
    }

    fn close(&mut self, prefix: Option<&str>, root: &Path) -> Option<ArchiveJob> {
        let open = self.open.take()?;
        Some(ArchiveJob {
            object_name: codec::encode(&open.stem, ArchiveTag::Bundle, prefix),
            tag: ArchiveTag::Bundle,
            base_dir: root.to_path_buf(),
            members: open.members,
            recursive: false,
            bytes_hint: open.size,
        })
    }
}

fn is_child_or_sibling(dir: &Path, last_dir: &Path) -> bool {
    let parent = dir.parent();
    parent == Some(last_dir) || parent == last_dir.parent()
}

fn normalise(path: &Path) -> PathBuf {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect()
}
