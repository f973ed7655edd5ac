//! Corpus reports and the persistent outcome cache.
//!
//! This module provides:
//! - Per-unit outcomes and the corpus [`Report`]
//! - The [`Aggregator`], the single writer of results and cache entries
//! - rkyv persistence of completed checks keyed by content hash
//! - JSON and terminal renderings

mod aggregator;
mod cache;
mod render;
mod types;

pub use aggregator::Aggregator;
pub use cache::{
    CACHE_VERSION, CacheError, CachePersistence, CacheSnapshot, CachedDiagnostic, CachedOutcome,
    OutcomeCache,
};
pub use render::{render_human, render_json};
pub use types::{DocumentSummary, Report, ReportCounts, RunStats, UnitOutcome, UnitReport};
