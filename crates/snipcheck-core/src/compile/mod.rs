//! Type-checking of compilation units.
//!
//! This module provides:
//! - The [`TypeChecker`] backend trait and the [`CompilerDriver`] that runs
//!   one backend invocation per unit under a timeout
//! - An in-process checker for a TypeScript subset ([`BuiltinChecker`])
//! - An external `tsc` backend ([`TscBackend`])
//! - Mapping of unit-local diagnostics back to document coordinates
//!
//! # Architecture
//!
//! ```text
//! CompilationUnit (preamble + body)
//!     │
//!     └── CompilerDriver ──► TypeChecker (builtin | tsc) ──► RawDiagnostic
//!                                                               │
//!                                        map_diagnostics ◄──────┘
//!                                               │
//!                                               └──► Diagnostic (document, line, column)
//! ```

mod builtin;
mod driver;
mod mapper;
mod tsc;
mod types;

pub use builtin::{BuiltinChecker, check_source};
pub use driver::{CheckOutcome, CompilerDriver, TypeChecker};
pub use mapper::{MappedPosition, map_diagnostics, map_position};
pub use tsc::{TscBackend, parse_tsc_output};
pub use types::{Diagnostic, RawDiagnostic, Severity};
