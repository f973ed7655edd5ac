//! Dependency graph for curriculum and continuity ordering.
//!
//! This module provides:
//! - Curriculum ordinals derived from document paths
//! - Continuity link graphs within a document
//! - Topological ordering with deterministic tie-breaking
//! - Cycle detection reported as warnings, never as failures

mod continuity;
mod curriculum;
mod schedule;

pub use continuity::{ContinuityGraph, ContinuityLink, SnippetOrder};
pub use curriculum::{CurriculumKey, curriculum_ordinals};
pub use schedule::{UnitKey, UnitSchedule};
