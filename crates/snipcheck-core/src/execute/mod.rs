//! Run orchestration for corpus validation.
//!
//! # Architecture
//!
//! ```text
//! Corpus
//!     │
//!     └── Assembler (rayon, per document)
//!             │
//!             └── UnitSchedule (curriculum order)
//!                     │
//!                     ├── cache hit ──────────────────────────┐
//!                     │                                       │
//!                     └── tokio task (semaphore-bounded)      │
//!                             │                               │
//!                             └── CompilerDriver ── mpsc ──► Aggregator ──► Report
//! ```
//!
//! # Module Structure
//!
//! - `context` - Abort handle and progress callbacks
//! - `validator` - The validation pipeline

mod context;
mod validator;

pub use context::{AbortHandle, CheckCallback};
pub use validator::{ValidationOutput, Validator};
