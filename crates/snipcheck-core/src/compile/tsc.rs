//! External TypeScript compiler backend.
//!
//! Writes the unit source into a scratch directory and runs
//! `tsc --noEmit --pretty false` on it. Diagnostics are read from lines of
//! the form `unit.ts(3,7): error TS2322: Type 'string' is not ...`.

use std::path::{Path, PathBuf};
use std::process::Command as StdCommand;

use async_trait::async_trait;
use tokio::process::Command;

use super::driver::TypeChecker;
use super::types::{RawDiagnostic, Severity};
use crate::assemble::CompilationUnit;
use crate::error::{Error, Result};
use crate::profile::CompilerProfile;

/// Runs units through an installed `tsc`.
#[derive(Debug, Clone)]
pub struct TscBackend {
    program: PathBuf,
    /// `tsc --version` output, e.g. `Version 5.4.5`.
    version: String,
}

impl TscBackend {
    /// Locate the compiler: an explicit path, else `tsc` on `PATH`.
    pub fn locate(explicit: Option<&Path>) -> Result<Self> {
        let program = match explicit {
            Some(path) if path.is_file() => path.to_path_buf(),
            Some(path) => {
                return Err(Error::Toolchain(format!(
                    "tsc not found at {}",
                    path.display()
                )));
            }
            None => which::which("tsc")
                .map_err(|e| Error::Toolchain(format!("tsc not found on PATH: {e}")))?,
        };
        let version = Self::get_tsc_version(&program)?;
        tracing::debug!("Using tsc at {} ({})", program.display(), version);
        Ok(Self { program, version })
    }

    fn get_tsc_version(program: &Path) -> Result<String> {
        let output = StdCommand::new(program)
            .arg("--version")
            .output()
            .map_err(|e| Error::Toolchain(format!("failed to run {}: {e}", program.display())))?;

        if !output.status.success() {
            return Err(Error::Toolchain(format!(
                "{} --version exited with {}",
                program.display(),
                output.status
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Command-line arguments for a profile and input file.
    pub fn args(profile: &CompilerProfile, file: &Path) -> Vec<String> {
        let mut args = vec![
            "--noEmit".to_string(),
            "--pretty".to_string(),
            "false".to_string(),
            "--skipLibCheck".to_string(),
            "--target".to_string(),
            profile.target.as_tsc_flag().to_string(),
            "--lib".to_string(),
            profile.target.as_tsc_lib().to_string(),
            "--jsx".to_string(),
            "preserve".to_string(),
        ];
        if profile.strict {
            args.push("--strict".to_string());
        }
        args.push("--noImplicitAny".to_string());
        args.push(profile.no_implicit_any().to_string());
        if profile.no_unused_locals {
            args.push("--noUnusedLocals".to_string());
        }
        args.push(file.to_string_lossy().into_owned());
        args
    }
}

#[async_trait]
impl TypeChecker for TscBackend {
    fn name(&self) -> &'static str {
        "tsc"
    }

    fn version(&self) -> String {
        self.version.clone()
    }

    async fn check(&self, unit: &CompilationUnit, profile: &CompilerProfile) -> Result<Vec<RawDiagnostic>> {
        let scratch = tempfile::Builder::new().prefix("snipcheck-").tempdir()?;
        let file_name = if unit.language == "tsx" { "unit.tsx" } else { "unit.ts" };
        let file = scratch.path().join(file_name);
        tokio::fs::write(&file, unit.source()).await?;

        let output = Command::new(&self.program)
            .args(Self::args(profile, &file))
            .current_dir(scratch.path())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::Backend {
                backend: "tsc".into(),
                message: format!("failed to run {}: {e}", self.program.display()),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let diagnostics = parse_tsc_output(&stdout, file_name);

        // tsc exits non-zero whenever it reports diagnostics; only an exit
        // without any parseable diagnostic is a backend failure.
        if !output.status.success() && diagnostics.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = if stderr.trim().is_empty() { stdout.trim() } else { stderr.trim() };
            return Err(Error::Backend {
                backend: "tsc".into(),
                message: format!("exited with {}: {detail}", output.status),
            });
        }

        Ok(diagnostics)
    }
}

/// Parse `--pretty false` output for the diagnostics of `file_name`.
///
/// Continuation lines (indented message chains) are appended to the
/// preceding diagnostic. Diagnostics for other files are skipped.
pub fn parse_tsc_output(output: &str, file_name: &str) -> Vec<RawDiagnostic> {
    let mut diagnostics: Vec<RawDiagnostic> = Vec::new();
    let mut current_matches = false;

    for line in output.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if current_matches && let Some(last) = diagnostics.last_mut() {
                last.message.push('\n');
                last.message.push_str(line.trim());
            }
            continue;
        }

        current_matches = false;
        let Some((location, rest)) = line.split_once("): ") else {
            continue;
        };
        let Some((path, position)) = location.rsplit_once('(') else {
            continue;
        };
        if Path::new(path).file_name().and_then(|n| n.to_str()) != Some(file_name) {
            continue;
        }
        let Some((line_no, column)) = position.split_once(',') else {
            continue;
        };
        let (Ok(line_no), Ok(column)) = (line_no.parse::<usize>(), column.parse::<usize>()) else {
            continue;
        };

        let (severity, rest) = if let Some(rest) = rest.strip_prefix("error ") {
            (Severity::Error, rest)
        } else if let Some(rest) = rest.strip_prefix("warning ") {
            (Severity::Warning, rest)
        } else {
            continue;
        };
        let (code, message) = match rest.split_once(": ") {
            Some((code, message)) if code.starts_with("TS") => (Some(code.to_string()), message),
            _ => (None, rest),
        };

        // tsc reports unused locals as errors; they are warnings here.
        let severity = if code.as_deref() == Some("TS6133") || code.as_deref() == Some("TS6196") {
            Severity::Warning
        } else {
            severity
        };

        diagnostics.push(RawDiagnostic {
            line: line_no,
            column,
            severity,
            message: message.to_string(),
            code,
        });
        current_matches = true;
    }

    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tsc_output() {
        let output = "\
unit.ts(3,5): error TS2322: Type 'string' is not assignable to type 'number'.
unit.ts(7,1): error TS2345: Argument of type 'string' is not assignable to parameter of type 'number'.
  Type 'string' is not assignable to type 'number'.
other.ts(1,1): error TS2304: Cannot find name 'x'.
unit.ts(9,7): error TS6133: 'unused' is declared but its value is never read.
";
        let diagnostics = parse_tsc_output(output, "unit.ts");
        assert_eq!(diagnostics.len(), 3);
        assert_eq!(diagnostics[0].line, 3);
        assert_eq!(diagnostics[0].column, 5);
        assert_eq!(diagnostics[0].code.as_deref(), Some("TS2322"));
        assert!(diagnostics[1].message.ends_with("\nType 'string' is not assignable to type 'number'."));
        assert_eq!(diagnostics[2].severity, Severity::Warning);
    }

    #[test]
    fn test_parse_absolute_paths() {
        let output = "/tmp/snipcheck-x/unit.tsx(2,10): error TS1005: ';' expected.\n";
        let diagnostics = parse_tsc_output(output, "unit.tsx");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].message, "';' expected.");
    }

    #[test]
    fn test_args_follow_profile() {
        let profile = CompilerProfile {
            strict: false,
            no_unused_locals: true,
            ..CompilerProfile::default()
        };
        let args = TscBackend::args(&profile, Path::new("unit.ts"));
        assert!(args.contains(&"--noEmit".to_string()));
        assert!(!args.contains(&"--strict".to_string()));
        assert!(args.contains(&"--noUnusedLocals".to_string()));
        let idx = args.iter().position(|a| a == "--noImplicitAny").unwrap();
        assert_eq!(args[idx + 1], "false");
        assert_eq!(args.last().map(String::as_str), Some("unit.ts"));
    }

    #[test]
    fn test_missing_explicit_path() {
        let err = TscBackend::locate(Some(Path::new("/nonexistent/tsc"))).unwrap_err();
        assert!(matches!(err, Error::Toolchain(_)));
    }
}
