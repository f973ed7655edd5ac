//! snipcheck CLI - validates code snippets embedded in lesson documents.

mod check;
mod clean;
mod colors;
mod extract;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use snipcheck_core::AbortHandle;

use check::{CheckOptions, OutputFormat};

#[derive(Parser)]
#[command(name = "snipcheck")]
#[command(about = "Type-check the code snippets of a lesson corpus")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate every lesson under a corpus root
    Check {
        /// Corpus root directory
        root: PathBuf,

        /// Profile file (default: snipcheck.toml in the root, if present)
        #[arg(long)]
        profile: Option<PathBuf>,

        /// Report format
        #[arg(long, value_enum, default_value = "human")]
        format: OutputFormat,

        /// Write the report to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Maximum number of units checked at once
        #[arg(long)]
        concurrency: Option<usize>,

        /// Per-unit timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Type-checking backend (builtin or tsc)
        #[arg(long)]
        backend: Option<String>,

        /// Ignore and do not update the outcome cache
        #[arg(long)]
        no_cache: bool,

        /// Force strict checking
        #[arg(long)]
        strict: bool,

        /// Fail on warnings too
        #[arg(long)]
        deny_warnings: bool,
    },

    /// List the snippets of one document
    Extract {
        /// Path to the document
        file: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value = "human")]
        format: OutputFormat,
    },

    /// Remove the persisted outcome cache of a corpus
    Clean {
        /// Corpus root directory
        root: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli.command).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            // Format snipcheck-core errors with recovery hints
            match err.downcast_ref::<snipcheck_core::Error>() {
                Some(core_err) => eprintln!("error: {}", core_err.with_hint()),
                None => eprintln!("error: {err:#}"),
            }
            ExitCode::from(2)
        }
    }
}

/// Run a subcommand. `Ok(false)` means the corpus failed validation.
async fn run(command: Commands) -> anyhow::Result<bool> {
    match command {
        Commands::Check {
            root,
            profile,
            format,
            output,
            concurrency,
            timeout_ms,
            backend,
            no_cache,
            strict,
            deny_warnings,
        } => {
            let abort = AbortHandle::new();
            let on_signal = abort.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupted; finishing in-flight checks");
                    on_signal.abort();
                }
            });

            let options = CheckOptions {
                root,
                profile,
                format,
                output,
                concurrency,
                timeout_ms,
                backend,
                no_cache,
                strict,
                deny_warnings,
            };
            check::execute(options, abort).await
        }

        Commands::Extract { file, format } => {
            extract::execute(&file, format)?;
            Ok(true)
        }

        Commands::Clean { root } => {
            clean::execute(&root)?;
            Ok(true)
        }
    }
}
