//! Operator tools sharing the store, pool and segment machinery.

pub mod compare;
pub mod hashcomp;
pub mod remove;
pub mod search;

pub use compare::{SizeComparison, compare_sizes};
pub use hashcomp::{HashComparison, HashSource, SegmentCheck, compare_hash};
pub use remove::{RemovalPlan, RemovalReport, Remover};
pub use search::{HitKind, SearchHit, SearchQuery, Searcher};
