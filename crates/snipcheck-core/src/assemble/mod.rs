//! Compilation unit assembly.
//!
//! This module provides:
//! - Continuity inference between adjacent snippets
//! - Explicit `id=` / `continues=` linking
//! - Ambient preamble synthesis from the profile allow-list
//! - A structural syntax gate that marks unbalanced units malformed
//! - Content hashing for the outcome cache

mod assembler;
mod preamble;
mod scan;
mod syntax;
mod types;

pub use assembler::{Assembler, content_hash};
pub use preamble::{PREAMBLE_VERSION, Preamble};
pub use scan::{ScanKind, ScanToken, SyntaxError, scan};
pub use syntax::{check_body, check_delimiters};
pub use types::{AssembledDocument, CompilationUnit, Segment, UnitKind};
