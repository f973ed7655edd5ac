//! Corpus validation pipeline.
//!
//! Documents are assembled in parallel on the rayon pool. Checked units are
//! then handed to tokio tasks in schedule order, at most `concurrency` at a
//! time; every task posts exactly one message back to the aggregating loop,
//! which is the only writer of outcomes and cache entries.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use tokio::sync::{Semaphore, mpsc};

use super::context::{AbortHandle, CheckCallback};
use crate::assemble::{AssembledDocument, Assembler, CompilationUnit};
use crate::compile::{CheckOutcome, CompilerDriver, TypeChecker};
use crate::corpus::Corpus;
use crate::error::Result;
use crate::graph::{UnitKey, UnitSchedule};
use crate::paths::CorpusDirs;
use crate::profile::CompilerProfile;
use crate::report::{Aggregator, OutcomeCache, Report, RunStats, UnitOutcome};

/// Report plus the statistics that are kept out of it.
#[derive(Debug, Clone)]
pub struct ValidationOutput {
    pub report: Report,
    pub stats: RunStats,
}

/// Message posted by a check task.
enum UnitResult {
    Checked(CheckOutcome),
    Cancelled,
}

/// Validates a corpus against one compiler profile.
pub struct Validator {
    driver: CompilerDriver,
    use_cache: bool,
    abort: AbortHandle,
    callback: Option<Arc<dyn CheckCallback>>,
}

impl Validator {
    /// Create a validator with the backend the profile selects.
    ///
    /// Fails on an invalid profile or a missing `tsc`.
    pub fn new(profile: CompilerProfile) -> Result<Self> {
        profile.validate()?;
        let driver = CompilerDriver::from_profile(Arc::new(profile))?;
        Ok(Self::with_driver(driver))
    }

    /// Create a validator with an explicit backend.
    pub fn with_backend(profile: CompilerProfile, backend: Arc<dyn TypeChecker>) -> Result<Self> {
        profile.validate()?;
        Ok(Self::with_driver(CompilerDriver::new(backend, Arc::new(profile))))
    }

    pub fn with_driver(driver: CompilerDriver) -> Self {
        Self {
            driver,
            use_cache: true,
            abort: AbortHandle::new(),
            callback: None,
        }
    }

    /// Neither read nor write the outcome cache.
    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    pub fn with_abort_handle(mut self, abort: AbortHandle) -> Self {
        self.abort = abort;
        self
    }

    pub fn with_callback(mut self, callback: Arc<dyn CheckCallback>) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn profile(&self) -> &CompilerProfile {
        self.driver.profile()
    }

    /// Cache file for a corpus root. Relative `cache_path` settings resolve
    /// against the root.
    pub fn cache_path(&self, root: &Path) -> PathBuf {
        match &self.profile().cache_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => root.join(path),
            None => CorpusDirs::for_root(root).cache_file(),
        }
    }

    /// Load the corpus under `root` and validate it.
    pub async fn validate_root(&self, root: &Path) -> Result<ValidationOutput> {
        let corpus = Corpus::load(root, self.profile())?;
        self.validate_corpus(&corpus).await
    }

    /// Validate an already-loaded corpus.
    pub async fn validate_corpus(&self, corpus: &Corpus) -> Result<ValidationOutput> {
        let start = Instant::now();
        let profile = self.driver.profile();
        let assembler = Assembler::new(profile)?;

        let documents: Vec<AssembledDocument> = corpus
            .documents
            .par_iter()
            .map(|doc| assembler.assemble(doc))
            .collect();

        let cache = if self.use_cache {
            let version = self.driver.backend_version();
            tracing::debug!("Cache keyed to '{}' backend ({})", self.driver.backend_name(), version);
            let fingerprint = profile.fingerprint(&version);
            OutcomeCache::open(self.cache_path(&corpus.root), fingerprint)
        } else {
            OutcomeCache::disabled()
        };

        let mut stats = RunStats {
            documents: documents.len(),
            cache_discarded: cache.discarded().map(str::to_string),
            ..RunStats::default()
        };

        let mut aggregator = Aggregator::new(profile.deny_warnings, cache);
        for warning in &corpus.warnings {
            aggregator.add_warning(warning.clone());
        }

        let mut checked: FxHashMap<UnitKey, Arc<CompilationUnit>> = FxHashMap::default();
        for doc in &documents {
            aggregator.add_document(doc);
            stats.units += doc.units.len();
            for unit in doc.checked_units() {
                let key = UnitKey {
                    document: unit.document_ordinal,
                    unit: unit.index,
                };
                checked.insert(key, Arc::new(unit.clone()));
            }
        }

        let order = UnitSchedule::from_keys(checked.keys().copied()).topological_order();
        stats.checked = order.len();
        tracing::info!(
            "Validating {} documents: {} units, {} checked, backend '{}'",
            stats.documents,
            stats.units,
            stats.checked,
            self.driver.backend_name()
        );
        if let Some(callback) = &self.callback {
            callback.on_run_started(stats.documents, stats.checked);
        }

        let semaphore = Arc::new(Semaphore::new(profile.concurrency));
        let (tx, mut rx) = mpsc::channel::<(Arc<CompilationUnit>, UnitResult)>(order.len().max(1));
        let mut in_flight: FxHashMap<String, Arc<CompilationUnit>> = FxHashMap::default();

        for key in order {
            let Some(unit) = checked.remove(&key) else {
                continue;
            };

            if self.abort.is_aborted() {
                aggregator.record_cancelled(&unit);
                stats.cancelled += 1;
                self.notify(&unit, &UnitOutcome::Cancelled, false);
                continue;
            }

            if let Some(outcome) = aggregator.record_cached(&unit) {
                stats.cache_hits += 1;
                self.notify(&unit, &outcome, true);
                continue;
            }

            in_flight.insert(unit.id.clone(), Arc::clone(&unit));
            let driver = self.driver.clone();
            let semaphore = Arc::clone(&semaphore);
            let abort = self.abort.clone();
            let tx = tx.clone();

            tokio::spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(permit) => {
                        if abort.is_aborted() {
                            UnitResult::Cancelled
                        } else {
                            let outcome = driver.check_unit(&unit).await;
                            drop(permit);
                            UnitResult::Checked(outcome)
                        }
                    }
                    Err(_) => UnitResult::Cancelled,
                };
                // The receiver outlives every sender.
                let _ = tx.send((unit, result)).await;
            });
        }
        drop(tx);

        while let Some((unit, result)) = rx.recv().await {
            in_flight.remove(&unit.id);
            let outcome = match result {
                UnitResult::Checked(check) => {
                    stats.compiled += 1;
                    aggregator.record_check(&unit, check)
                }
                UnitResult::Cancelled => {
                    stats.cancelled += 1;
                    aggregator.record_cancelled(&unit);
                    UnitOutcome::Cancelled
                }
            };
            self.notify(&unit, &outcome, false);
        }

        // A task that panicked never posted its message.
        for unit in in_flight.into_values() {
            tracing::error!("{}: check task ended without a result", unit.id);
            let outcome = UnitOutcome::Error {
                message: "check task ended without a result".to_string(),
            };
            aggregator.record(&unit, outcome.clone());
            self.notify(&unit, &outcome, false);
        }

        if let Err(e) = aggregator.persist_cache() {
            tracing::warn!("Failed to save outcome cache: {}", e);
        }

        let report = aggregator.finish();
        stats.elapsed = start.elapsed();
        tracing::info!(
            "Validated {} units in {:.2}s ({} cache hits, {} compiled)",
            stats.checked,
            stats.elapsed.as_secs_f64(),
            stats.cache_hits,
            stats.compiled
        );

        Ok(ValidationOutput { report, stats })
    }

    fn notify(&self, unit: &CompilationUnit, outcome: &UnitOutcome, cached: bool) {
        if let Some(callback) = &self.callback {
            callback.on_unit_finished(unit, outcome, cached);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::RawDiagnostic;
    use crate::corpus::Document;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts calls and tracks the peak number of concurrent checks.
    #[derive(Default)]
    struct CountingChecker {
        calls: AtomicUsize,
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl TypeChecker for CountingChecker {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn check(&self, _: &CompilationUnit, _: &CompilerProfile) -> Result<Vec<RawDiagnostic>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(String, &'static str, bool)>>);

    impl CheckCallback for Recorder {
        fn on_unit_finished(&self, unit: &CompilationUnit, outcome: &UnitOutcome, cached: bool) {
            self.0
                .lock()
                .unwrap()
                .push((unit.id.clone(), outcome.label(), cached));
        }
    }

    fn corpus(count: usize) -> Corpus {
        let documents = (0..count)
            .map(|i| Document::new(format!("{i:02}.md"), format!("```ts\nconst v{i} = {i};\n```\n")))
            .collect();
        Corpus::from_documents(PathBuf::from("."), documents, Vec::new())
    }

    fn profile(concurrency: usize) -> CompilerProfile {
        CompilerProfile {
            concurrency,
            ..CompilerProfile::default()
        }
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let checker = Arc::new(CountingChecker::default());
        let validator = Validator::with_backend(profile(2), checker.clone())
            .unwrap()
            .without_cache();

        let output = validator.validate_corpus(&corpus(8)).await.unwrap();
        assert!(output.report.passed);
        assert_eq!(output.report.counts.ok, 8);
        assert_eq!(output.stats.compiled, 8);
        assert_eq!(checker.calls.load(Ordering::SeqCst), 8);
        assert!(checker.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_abort_before_start_cancels_everything() {
        let checker = Arc::new(CountingChecker::default());
        let validator = Validator::with_backend(profile(2), checker.clone())
            .unwrap()
            .without_cache();
        validator.abort_handle().abort();

        let output = validator.validate_corpus(&corpus(3)).await.unwrap();
        assert_eq!(output.report.counts.cancelled, 3);
        assert_eq!(output.report.units.len(), 3);
        assert!(output.report.is_partial());
        assert_eq!(output.stats.cancelled, 3);
        assert_eq!(checker.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_callback_sees_every_checked_unit() {
        let recorder = Arc::new(Recorder::default());
        let validator = Validator::with_backend(profile(4), Arc::new(CountingChecker::default()))
            .unwrap()
            .without_cache()
            .with_callback(recorder.clone());

        validator.validate_corpus(&corpus(3)).await.unwrap();
        let mut seen = recorder.0.lock().unwrap().clone();
        seen.sort();
        assert_eq!(
            seen,
            vec![
                ("00.md#0".to_string(), "ok", false),
                ("01.md#0".to_string(), "ok", false),
                ("02.md#0".to_string(), "ok", false),
            ]
        );
    }

    #[test]
    fn test_invalid_profile_is_rejected() {
        let result = Validator::with_backend(profile(0), Arc::new(CountingChecker::default()));
        assert!(matches!(result, Err(crate::error::Error::Config(_))));
    }

    #[test]
    fn test_cache_path_resolution() {
        let validator = Validator::with_backend(profile(1), Arc::new(CountingChecker::default())).unwrap();
        assert!(
            validator
                .cache_path(Path::new("lessons"))
                .ends_with(".snipcheck/cache/outcomes.bin")
        );

        let custom = CompilerProfile {
            cache_path: Some(PathBuf::from("build/cache.bin")),
            ..CompilerProfile::default()
        };
        let validator = Validator::with_backend(custom, Arc::new(CountingChecker::default())).unwrap();
        assert_eq!(
            validator.cache_path(Path::new("lessons")),
            PathBuf::from("lessons/build/cache.bin")
        );
    }
}
