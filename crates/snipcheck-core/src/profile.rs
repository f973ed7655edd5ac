//! Compiler profile: the recognized set of checking options.
//!
//! A profile is loaded from `snipcheck.toml` at the corpus root (or any
//! explicit path), overlaid with command-line overrides, and validated once
//! before any unit is processed. Validation failures are the only fatal
//! errors of a run.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use globset::Glob;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// File name looked up at the corpus root.
pub const PROFILE_FILE_NAME: &str = "snipcheck.toml";

/// Target language level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Es5,
    Es2015,
    Es2016,
    Es2017,
    Es2018,
    Es2019,
    Es2020,
    Es2021,
    Es2022,
    EsNext,
}

impl Target {
    /// Flag value understood by `tsc --target`.
    pub fn as_tsc_flag(&self) -> &'static str {
        match self {
            Target::Es5 => "ES5",
            Target::Es2015 => "ES2015",
            Target::Es2016 => "ES2016",
            Target::Es2017 => "ES2017",
            Target::Es2018 => "ES2018",
            Target::Es2019 => "ES2019",
            Target::Es2020 => "ES2020",
            Target::Es2021 => "ES2021",
            Target::Es2022 => "ES2022",
            Target::EsNext => "ESNext",
        }
    }

    /// Library name understood by `tsc --lib`.
    pub fn as_tsc_lib(&self) -> &'static str {
        match self {
            Target::Es5 => "es5",
            Target::Es2015 => "es2015",
            Target::Es2016 => "es2016",
            Target::Es2017 => "es2017",
            Target::Es2018 => "es2018",
            Target::Es2019 => "es2019",
            Target::Es2020 => "es2020",
            Target::Es2021 => "es2021",
            Target::Es2022 => "es2022",
            Target::EsNext => "esnext",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tsc_lib())
    }
}

/// Which type-checking backend runs the units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process checker for a TypeScript subset.
    Builtin,
    /// External `tsc` compiler.
    Tsc,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Builtin => f.write_str("builtin"),
            BackendKind::Tsc => f.write_str("tsc"),
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "builtin" => Ok(BackendKind::Builtin),
            "tsc" => Ok(BackendKind::Tsc),
            other => Err(Error::Config(format!(
                "unknown backend '{other}', expected 'builtin' or 'tsc'"
            ))),
        }
    }
}

/// A host global that the preamble may declare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmbientGlobal {
    pub name: String,
    /// Type annotation source; `any` when the entry names no type.
    pub type_annotation: String,
}

/// Configuration enumerating the recognized checking options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerProfile {
    /// Target language level.
    pub target: Target,

    /// Enable strict checking (strict null checks, implicit any).
    pub strict: bool,

    /// Report parameters without annotations. Follows `strict` when unset.
    pub no_implicit_any: Option<bool>,

    /// Report unused local declarations as warnings.
    pub no_unused_locals: bool,

    /// Treat warnings as failures in the overall verdict.
    pub deny_warnings: bool,

    /// Host globals the preamble may stand in for (`name` or `name: Type`).
    pub ambient: Vec<String>,

    /// Fence language tags that are type-checked.
    pub languages: Vec<String>,

    /// Corpus-relative include globs.
    pub include: Vec<String>,

    /// Corpus-relative exclude globs.
    pub exclude: Vec<String>,

    /// Maximum number of units checked concurrently.
    pub concurrency: usize,

    /// Per-unit timeout in milliseconds.
    pub timeout_ms: u64,

    /// Merge adjacent checked snippets of one section into one unit.
    pub continuity: bool,

    /// Deepest heading level that starts a fresh topic (1-6).
    pub section_depth: u8,

    /// Backend used to type-check units.
    pub backend: BackendKind,

    /// Explicit path to `tsc`; only meaningful with the `tsc` backend.
    pub tsc_path: Option<PathBuf>,

    /// Explicit cache file location.
    pub cache_path: Option<PathBuf>,
}

impl Default for CompilerProfile {
    fn default() -> Self {
        Self {
            target: Target::Es2020,
            strict: true,
            no_implicit_any: None,
            no_unused_locals: false,
            deny_warnings: false,
            ambient: default_ambient(),
            languages: vec!["ts".into(), "typescript".into(), "tsx".into()],
            include: vec!["**/*.md".into(), "**/*.markdown".into()],
            exclude: Vec::new(),
            concurrency: default_concurrency(),
            timeout_ms: 10_000,
            continuity: true,
            section_depth: 6,
            backend: BackendKind::Builtin,
            tsc_path: None,
            cache_path: None,
        }
    }
}

fn default_ambient() -> Vec<String> {
    [
        "console",
        "document",
        "window",
        "fetch",
        "setTimeout",
        "clearTimeout",
        "setInterval",
        "clearInterval",
        "process",
        "require",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl CompilerProfile {
    /// Load a profile from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::ProfileLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| Error::ProfileLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Load `snipcheck.toml` from the corpus root, or fall back to defaults.
    pub fn discover(root: &Path) -> Result<Self> {
        let path = root.join(PROFILE_FILE_NAME);
        if path.is_file() {
            tracing::debug!("Loading profile from {}", path.display());
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Effective implicit-any setting.
    pub fn no_implicit_any(&self) -> bool {
        self.no_implicit_any.unwrap_or(self.strict)
    }

    /// Whether a fence language tag is type-checked under this profile.
    /// Tags compare case-insensitively; JSX dialects need the `tsc` backend.
    pub fn is_checked_language(&self, tag: &str) -> bool {
        (self.backend == BackendKind::Tsc || !is_jsx_dialect(tag))
            && self.languages.iter().any(|l| l.eq_ignore_ascii_case(tag))
    }

    /// Per-unit timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Parse the ambient allow-list into typed entries.
    pub fn ambient_globals(&self) -> Result<Vec<AmbientGlobal>> {
        let mut globals = Vec::with_capacity(self.ambient.len());
        let mut seen = HashSet::new();

        for entry in &self.ambient {
            let (name, ty) = match entry.split_once(':') {
                Some((name, ty)) => (name.trim(), ty.trim()),
                None => (entry.trim(), "any"),
            };

            if !is_identifier(name) {
                return Err(Error::Config(format!(
                    "ambient entry '{entry}' does not name a valid identifier"
                )));
            }
            if ty.is_empty() {
                return Err(Error::Config(format!(
                    "ambient entry '{entry}' has an empty type annotation"
                )));
            }
            if !seen.insert(name.to_string()) {
                return Err(Error::Config(format!(
                    "ambient global '{name}' is listed more than once"
                )));
            }

            globals.push(AmbientGlobal {
                name: name.to_string(),
                type_annotation: ty.to_string(),
            });
        }

        Ok(globals)
    }

    /// Reject invalid or contradictory settings.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::Config("concurrency must be > 0".into()));
        }
        if self.timeout_ms == 0 {
            return Err(Error::Config("timeout_ms must be > 0".into()));
        }
        if !(1..=6).contains(&self.section_depth) {
            return Err(Error::Config(format!(
                "section_depth must be between 1 and 6, got {}",
                self.section_depth
            )));
        }
        if self.languages.is_empty() {
            return Err(Error::Config(
                "languages must name at least one checked fence tag".into(),
            ));
        }
        if let Some(tag) = self
            .languages
            .iter()
            .find(|l| l.is_empty() || l.chars().any(char::is_whitespace))
        {
            return Err(Error::Config(format!("invalid language tag '{tag}'")));
        }
        if self.backend == BackendKind::Builtin && self.languages.iter().all(|l| is_jsx_dialect(l)) {
            return Err(Error::Config(
                "languages only name JSX dialects, which the builtin backend does not check".into(),
            ));
        }
        if self.include.is_empty() {
            return Err(Error::Config("include must contain at least one glob".into()));
        }
        for pattern in self.include.iter().chain(&self.exclude) {
            Glob::new(pattern)
                .map_err(|e| Error::Config(format!("invalid glob '{pattern}': {e}")))?;
        }
        if let Some(pattern) = self.include.iter().find(|p| self.exclude.contains(p)) {
            return Err(Error::Config(format!(
                "glob '{pattern}' is both included and excluded"
            )));
        }
        if self.tsc_path.is_some() && self.backend != BackendKind::Tsc {
            return Err(Error::Config(
                "tsc_path is set but the backend is not 'tsc'".into(),
            ));
        }
        self.ambient_globals()?;
        Ok(())
    }

    /// Stable fingerprint of the options that influence checking results.
    ///
    /// Stored in the cache header; a different fingerprint discards the cache.
    /// `toolchain_version` is the backend's compiler version.
    pub fn fingerprint(&self, toolchain_version: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.backend.to_string().as_bytes());
        hasher.update([0]);
        hasher.update(toolchain_version.as_bytes());
        hasher.update([0]);
        hasher.update(self.target.as_tsc_lib().as_bytes());
        hasher.update([0]);
        hasher.update([
            self.strict as u8,
            self.no_implicit_any() as u8,
            self.no_unused_locals as u8,
        ]);
        if let Some(tsc) = &self.tsc_path {
            hasher.update(tsc.to_string_lossy().as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

/// Whether a fence tag names a JSX dialect (`tsx`, `jsx`).
pub fn is_jsx_dialect(tag: &str) -> bool {
    tag.eq_ignore_ascii_case("tsx") || tag.eq_ignore_ascii_case("jsx")
}

/// Whether `s` is a valid JavaScript identifier (ASCII subset).
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile_is_valid() {
        let profile = CompilerProfile::default();
        profile.validate().unwrap();
        assert!(profile.is_checked_language("ts"));
        assert!(!profile.is_checked_language("bash"));
        assert!(!profile.is_checked_language("tsx"));
        assert!(profile.no_implicit_any());
    }

    #[test]
    fn test_parse_toml() {
        let profile: CompilerProfile = toml::from_str(
            r#"
            target = "es2015"
            strict = false
            ambient = ["console", "fetch: (url: string) => any"]
            concurrency = 2
            timeout_ms = 500
            "#,
        )
        .unwrap();

        assert_eq!(profile.target, Target::Es2015);
        assert!(!profile.strict);
        assert!(!profile.no_implicit_any());
        assert_eq!(profile.concurrency, 2);
        assert_eq!(profile.timeout(), Duration::from_millis(500));

        let globals = profile.ambient_globals().unwrap();
        assert_eq!(globals[0].type_annotation, "any");
        assert_eq!(globals[1].name, "fetch");
        assert_eq!(globals[1].type_annotation, "(url: string) => any");
    }

    #[test]
    fn test_unknown_option_rejected() {
        let result: std::result::Result<CompilerProfile, _> = toml::from_str("optimize = true");
        assert!(result.is_err());
    }

    #[test]
    fn test_contradictory_profiles() {
        let zero = CompilerProfile {
            concurrency: 0,
            ..Default::default()
        };
        assert!(matches!(zero.validate(), Err(Error::Config(_))));

        let both = CompilerProfile {
            exclude: vec!["**/*.md".into()],
            ..Default::default()
        };
        assert!(matches!(both.validate(), Err(Error::Config(_))));

        let tsc_path = CompilerProfile {
            tsc_path: Some(PathBuf::from("/usr/bin/tsc")),
            ..Default::default()
        };
        assert!(matches!(tsc_path.validate(), Err(Error::Config(_))));

        let bad_glob = CompilerProfile {
            include: vec!["lessons/[".into()],
            ..Default::default()
        };
        assert!(matches!(bad_glob.validate(), Err(Error::Config(_))));

        let dup = CompilerProfile {
            ambient: vec!["console".into(), "console: number".into()],
            ..Default::default()
        };
        assert!(matches!(dup.validate(), Err(Error::Config(_))));

        let bad_name = CompilerProfile {
            ambient: vec!["3d".into()],
            ..Default::default()
        };
        assert!(matches!(bad_name.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_fingerprint_tracks_checking_options() {
        let base = CompilerProfile::default();
        let relaxed = CompilerProfile {
            strict: false,
            ..Default::default()
        };
        let wider = CompilerProfile {
            concurrency: base.concurrency + 1,
            ..Default::default()
        };

        assert_ne!(base.fingerprint("builtin 0.1.0"), relaxed.fingerprint("builtin 0.1.0"));
        assert_eq!(base.fingerprint("builtin 0.1.0"), wider.fingerprint("builtin 0.1.0"));
        assert_ne!(base.fingerprint("Version 5.3.3"), base.fingerprint("Version 5.4.5"));
    }

    #[test]
    fn test_language_tags_ignore_case() {
        let profile: CompilerProfile = toml::from_str(r#"languages = ["TypeScript", "TS"]"#).unwrap();
        profile.validate().unwrap();
        assert!(profile.is_checked_language("typescript"));
        assert!(profile.is_checked_language("ts"));
        assert!(!profile.is_checked_language("tsx"));
    }

    #[test]
    fn test_jsx_only_languages_rejected_on_builtin() {
        let jsx_only = CompilerProfile {
            languages: vec!["TSX".into()],
            ..Default::default()
        };
        assert!(matches!(jsx_only.validate(), Err(Error::Config(_))));

        let with_tsc = CompilerProfile {
            backend: BackendKind::Tsc,
            ..jsx_only
        };
        with_tsc.validate().unwrap();
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("console"));
        assert!(is_identifier("$"));
        assert!(is_identifier("_private1"));
        assert!(!is_identifier("1abc"));
        assert!(!is_identifier("a-b"));
        assert!(!is_identifier(""));
    }
}
