//! Compiler driver: one backend invocation per compilation unit.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::builtin::BuiltinChecker;
use super::tsc::TscBackend;
use super::types::{RawDiagnostic, Severity};
use crate::assemble::CompilationUnit;
use crate::error::Result;
use crate::profile::{BackendKind, CompilerProfile};

/// A type-checking backend.
///
/// Implementations must not keep state between calls: every unit is
/// checked in isolation.
#[async_trait]
pub trait TypeChecker: Send + Sync {
    /// Short backend name for logs and errors.
    fn name(&self) -> &'static str;

    /// Version of the underlying compiler. Part of the cache fingerprint, so
    /// an upgrade re-checks every unit.
    fn version(&self) -> String {
        self.name().to_string()
    }

    /// Type-check a unit's full source (preamble + body).
    ///
    /// Returns unit-local diagnostics; an empty list means the unit is clean.
    async fn check(&self, unit: &CompilationUnit, profile: &CompilerProfile) -> Result<Vec<RawDiagnostic>>;
}

/// Result of submitting a unit to the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The backend ran to completion. Safe to cache.
    Completed(Vec<RawDiagnostic>),
    /// Backend crash or a rejected preamble.
    Failed(String),
    /// The check exceeded the per-unit timeout.
    TimedOut(Duration),
}

/// Runs units through the configured backend under a profile.
#[derive(Clone)]
pub struct CompilerDriver {
    backend: Arc<dyn TypeChecker>,
    profile: Arc<CompilerProfile>,
}

impl CompilerDriver {
    /// Create a driver with an explicit backend.
    pub fn new(backend: Arc<dyn TypeChecker>, profile: Arc<CompilerProfile>) -> Self {
        Self { backend, profile }
    }

    /// Create a driver for the backend the profile selects.
    ///
    /// Fails when the `tsc` backend is selected but no compiler can be found.
    pub fn from_profile(profile: Arc<CompilerProfile>) -> Result<Self> {
        let backend: Arc<dyn TypeChecker> = match profile.backend {
            BackendKind::Builtin => Arc::new(BuiltinChecker::new()),
            BackendKind::Tsc => Arc::new(TscBackend::locate(profile.tsc_path.as_deref())?),
        };
        tracing::debug!("Using '{}' backend", backend.name());
        Ok(Self::new(backend, profile))
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn backend_version(&self) -> String {
        self.backend.version()
    }

    pub fn profile(&self) -> &CompilerProfile {
        &self.profile
    }

    /// Check one unit, bounded by the profile timeout.
    pub async fn check_unit(&self, unit: &CompilationUnit) -> CheckOutcome {
        let limit = self.profile.timeout();
        let result = tokio::time::timeout(limit, self.backend.check(unit, &self.profile)).await;

        match result {
            Err(_) => {
                tracing::warn!("{} timed out after {:?}", unit.id, limit);
                CheckOutcome::TimedOut(limit)
            }
            Ok(Err(e)) => {
                tracing::error!("{}: {}", unit.id, e);
                CheckOutcome::Failed(e.to_string())
            }
            Ok(Ok(raw)) => {
                let rejected = raw
                    .iter()
                    .find(|d| d.severity == Severity::Error && unit.in_preamble(d.line));
                if let Some(d) = rejected {
                    tracing::error!(
                        "{}: '{}' rejected the preamble at line {}: {}",
                        unit.id,
                        self.backend.name(),
                        d.line,
                        d.message
                    );
                    return CheckOutcome::Failed(format!(
                        "preamble rejected at line {}: {}",
                        d.line, d.message
                    ));
                }
                CheckOutcome::Completed(raw)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::Assembler;
    use crate::corpus::Document;
    use crate::error::Error;

    struct FixedChecker(Vec<RawDiagnostic>);

    #[async_trait]
    impl TypeChecker for FixedChecker {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn check(&self, _: &CompilationUnit, _: &CompilerProfile) -> Result<Vec<RawDiagnostic>> {
            Ok(self.0.clone())
        }
    }

    struct FailingChecker;

    #[async_trait]
    impl TypeChecker for FailingChecker {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn check(&self, _: &CompilationUnit, _: &CompilerProfile) -> Result<Vec<RawDiagnostic>> {
            Err(Error::Backend {
                backend: "failing".into(),
                message: "crashed".into(),
            })
        }
    }

    struct SlowChecker;

    #[async_trait]
    impl TypeChecker for SlowChecker {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn check(&self, _: &CompilationUnit, _: &CompilerProfile) -> Result<Vec<RawDiagnostic>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }
    }

    fn unit_with_preamble() -> CompilationUnit {
        let assembler = Assembler::new(&CompilerProfile::default()).unwrap();
        let doc = assembler.assemble(&Document::new("a.md", "```ts\nconsole.log(x);\n```\n"));
        doc.units[0].clone()
    }

    fn driver(backend: impl TypeChecker + 'static, profile: CompilerProfile) -> CompilerDriver {
        CompilerDriver::new(Arc::new(backend), Arc::new(profile))
    }

    #[tokio::test]
    async fn test_completed() {
        let unit = unit_with_preamble();
        let raw = vec![RawDiagnostic::error(2, 13, "TS2304", "Cannot find name 'x'.")];
        let outcome = driver(FixedChecker(raw.clone()), CompilerProfile::default())
            .check_unit(&unit)
            .await;
        assert_eq!(outcome, CheckOutcome::Completed(raw));
    }

    #[tokio::test]
    async fn test_preamble_error_fails_unit() {
        let unit = unit_with_preamble();
        let raw = vec![RawDiagnostic::error(1, 15, "TS2451", "Cannot redeclare block-scoped variable 'console'.")];
        let outcome = driver(FixedChecker(raw), CompilerProfile::default())
            .check_unit(&unit)
            .await;
        assert!(matches!(outcome, CheckOutcome::Failed(msg) if msg.contains("preamble")));
    }

    #[tokio::test]
    async fn test_backend_failure() {
        let unit = unit_with_preamble();
        let outcome = driver(FailingChecker, CompilerProfile::default())
            .check_unit(&unit)
            .await;
        assert!(matches!(outcome, CheckOutcome::Failed(msg) if msg.contains("crashed")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let unit = unit_with_preamble();
        let profile = CompilerProfile {
            timeout_ms: 50,
            ..CompilerProfile::default()
        };
        let outcome = driver(SlowChecker, profile).check_unit(&unit).await;
        assert_eq!(outcome, CheckOutcome::TimedOut(Duration::from_millis(50)));
    }
}
