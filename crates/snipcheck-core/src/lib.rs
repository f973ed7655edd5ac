//! Core engine for snipcheck, the lesson snippet validator.
//!
//! This crate provides:
//! - Extraction of fenced code blocks from Markdown lessons
//! - Assembly of snippets into compilation units with continuity and an ambient preamble
//! - Curriculum and continuity ordering
//! - Type-checking through a pluggable backend (in-process or `tsc`)
//! - Mapping of diagnostics back to document lines
//! - Corpus reports with a persistent content-hash cache

pub mod assemble;
pub mod compile;
pub mod corpus;
pub mod error;
pub mod execute;
pub mod extract;
pub mod graph;
pub mod paths;
pub mod profile;
pub mod report;

pub use assemble::{AssembledDocument, Assembler, CompilationUnit, UnitKind};
pub use compile::{
    BuiltinChecker, CheckOutcome, CompilerDriver, Diagnostic, RawDiagnostic, Severity, TscBackend,
    TypeChecker,
};
pub use corpus::{Corpus, Document};
pub use error::{Error, Result};
pub use execute::{AbortHandle, CheckCallback, ValidationOutput, Validator};
pub use extract::{Snippet, SourceSpan, extract};
pub use paths::CorpusDirs;
pub use profile::{BackendKind, CompilerProfile, Target};
pub use report::{Report, RunStats, UnitOutcome, render_human, render_json};
