//! Check command implementation for snipcheck CLI.
//!
//! Validates every lesson under a corpus root and prints the report.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::ValueEnum;
use snipcheck_core::{
    AbortHandle, BackendKind, CheckCallback, CompilationUnit, CompilerProfile, UnitOutcome,
    Validator, render_human, render_json,
};

use crate::colors;

/// Report format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Options of `snipcheck check`.
#[derive(Debug, Clone)]
pub struct CheckOptions {
    pub root: PathBuf,
    pub profile: Option<PathBuf>,
    pub format: OutputFormat,
    pub output: Option<PathBuf>,
    pub concurrency: Option<usize>,
    pub timeout_ms: Option<u64>,
    pub backend: Option<String>,
    pub no_cache: bool,
    pub strict: bool,
    pub deny_warnings: bool,
}

/// Prints one line per failing unit to stderr while the run progresses.
struct Progress {
    color: bool,
}

impl CheckCallback for Progress {
    fn on_run_started(&self, documents: usize, checked_units: usize) {
        eprintln!(
            "{} {checked_units} units in {documents} documents",
            colors::paint("Checking", colors::CYAN, self.color)
        );
    }

    fn on_unit_finished(&self, unit: &CompilationUnit, outcome: &UnitOutcome, cached: bool) {
        let label = match outcome {
            UnitOutcome::Timeout { .. } => colors::paint("timeout", colors::YELLOW, self.color),
            UnitOutcome::Error { .. } => colors::paint("error", colors::RED, self.color),
            _ => return,
        };
        let source = if cached { " (cached)" } else { "" };
        eprintln!("  {label} {}{source}", unit.id);
    }
}

/// Resolve the profile: explicit file, else `snipcheck.toml` at the root,
/// then command-line overrides.
pub fn resolve_profile(options: &CheckOptions) -> snipcheck_core::Result<CompilerProfile> {
    let mut profile = match &options.profile {
        Some(path) => CompilerProfile::load(path)?,
        None => CompilerProfile::discover(&options.root)?,
    };

    if let Some(concurrency) = options.concurrency {
        profile.concurrency = concurrency;
    }
    if let Some(timeout_ms) = options.timeout_ms {
        profile.timeout_ms = timeout_ms;
    }
    if let Some(backend) = &options.backend {
        profile.backend = backend.parse::<BackendKind>()?;
    }
    if options.strict {
        profile.strict = true;
    }
    if options.deny_warnings {
        profile.deny_warnings = true;
    }

    profile.validate()?;
    Ok(profile)
}

/// Run the check. Returns whether the corpus passed.
pub async fn execute(options: CheckOptions, abort: AbortHandle) -> anyhow::Result<bool> {
    if !options.root.is_dir() {
        return Err(snipcheck_core::Error::CorpusNotFound(options.root.clone()).into());
    }

    let profile = resolve_profile(&options)?;
    let mut validator = Validator::new(profile)?.with_abort_handle(abort);
    if options.no_cache {
        validator = validator.without_cache();
    }
    if options.format == OutputFormat::Human && options.output.is_none() {
        validator = validator.with_callback(Arc::new(Progress {
            color: colors::stderr_enabled(),
        }));
    }

    let output = validator.validate_root(&options.root).await?;
    let report = &output.report;

    if let Some(reason) = &output.stats.cache_discarded {
        tracing::warn!("Outcome cache discarded: {}", reason);
    }

    let rendered = match options.format {
        OutputFormat::Json => render_json(report)?,
        OutputFormat::Human => {
            let color = options.output.is_none() && colors::stdout_enabled();
            render_human(report, color)
        }
    };

    match &options.output {
        Some(path) => write_output(path, &rendered)?,
        None => print!("{rendered}"),
    }

    if options.format == OutputFormat::Human {
        let stats = &output.stats;
        eprintln!(
            "{}",
            colors::paint(
                &format!(
                    "{} checked, {} from cache, {} compiled in {:.2}s",
                    stats.checked,
                    stats.cache_hits,
                    stats.compiled,
                    stats.elapsed.as_secs_f64()
                ),
                colors::DIM,
                colors::stderr_enabled()
            )
        );
    }

    if report.is_partial() {
        eprintln!(
            "{} {} units were not checked",
            colors::paint("Run aborted:", colors::YELLOW, colors::stderr_enabled()),
            report.counts.cancelled
        );
        return Ok(false);
    }

    Ok(report.passed)
}

fn write_output(path: &Path, rendered: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, rendered)?;
    tracing::debug!("Wrote report to {}", path.display());
    Ok(())
}
