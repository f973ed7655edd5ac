//! End-to-end validation of small lesson corpora with the builtin checker.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use snipcheck_core::{
    CompilationUnit, CompilerProfile, RawDiagnostic, Result, TypeChecker, UnitOutcome, Validator,
    render_json,
};
use tempfile::TempDir;

fn write(root: &Path, name: &str, text: &str) {
    let path = root.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, text).unwrap();
}

fn profile() -> CompilerProfile {
    CompilerProfile {
        concurrency: 2,
        ..CompilerProfile::default()
    }
}

fn line_of(text: &str, line: usize) -> &str {
    text.lines().nth(line - 1).unwrap()
}

#[tokio::test]
async fn test_type_mismatch_maps_to_document_line() {
    let temp = TempDir::new().unwrap();
    let lesson = "# Numbers\n\nSome prose.\n\n```ts\nlet x: number = \"s\";\n```\n";
    write(temp.path(), "01-numbers.md", lesson);

    let output = Validator::new(profile())
        .unwrap()
        .validate_root(temp.path())
        .await
        .unwrap();
    let report = output.report;

    assert!(!report.passed);
    assert_eq!(report.units.len(), 1);
    let diagnostics = report.units[0].outcome.diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].line, 6);
    assert_eq!(diagnostics[0].column, 5);
    assert_eq!(
        diagnostics[0].message,
        "Type 'string' is not assignable to type 'number'."
    );
    assert_eq!(line_of(lesson, diagnostics[0].line), "let x: number = \"s\";");
}

#[tokio::test]
async fn test_continuity_merges_adjacent_snippets() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "joined.md",
        "# Strings\n\n```ts\nconst greeting = \"hello\";\n```\n\nThen shout it:\n\n```ts\nconst shout = greeting.toUpperCase();\n```\n",
    );
    write(
        temp.path(),
        "split.md",
        "# Strings\n\n```ts\nconst greeting = \"hello\";\n```\n\nThen shout it:\n\n```ts standalone\nconst shout = greeting.toUpperCase();\n```\n",
    );

    let report = Validator::new(profile())
        .unwrap()
        .without_cache()
        .validate_root(temp.path())
        .await
        .unwrap()
        .report;

    let joined: Vec<_> = report.units.iter().filter(|u| u.document == "joined.md").collect();
    assert_eq!(joined.len(), 1);
    assert_eq!(joined[0].snippets, vec![0, 1]);
    assert_eq!(joined[0].outcome, UnitOutcome::Ok);

    let split: Vec<_> = report.units.iter().filter(|u| u.document == "split.md").collect();
    assert_eq!(split.len(), 2);
    assert_eq!(split[0].outcome, UnitOutcome::Ok);
    let diagnostics = split[1].outcome.diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].code.as_deref(), Some("TS2304"));
    assert_eq!(diagnostics[0].message, "Cannot find name 'greeting'.");
    assert_eq!(diagnostics[0].line, 10);
}

#[tokio::test]
async fn test_explicit_continuation_across_sections() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "lesson.md",
        "# Setup\n\n```ts id=setup\ninterface Point { x: number; y: number }\n```\n\n# Usage\n\n```ts continues=setup\nconst origin: Point = { x: 0, y: 0 };\n```\n\n```ts continues=missing\nconst n = 1;\n```\n",
    );

    let report = Validator::new(profile())
        .unwrap()
        .without_cache()
        .validate_root(temp.path())
        .await
        .unwrap()
        .report;

    assert!(report.passed);
    assert_eq!(report.units[0].snippets, vec![0, 1]);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("missing"));
}

#[tokio::test]
async fn test_ambient_globals_and_preamble_offsets() {
    let temp = TempDir::new().unwrap();
    let lesson = "```ts\nconst x = 1;\nconsole.log(x, y);\n```\n";
    write(temp.path(), "a.md", lesson);

    let report = Validator::new(profile())
        .unwrap()
        .without_cache()
        .validate_root(temp.path())
        .await
        .unwrap()
        .report;

    assert_eq!(report.diagnostics.len(), 1);
    let d = &report.diagnostics[0];
    assert_eq!(d.message, "Cannot find name 'y'.");
    assert_eq!((d.line, d.column), (3, 16));
}

#[tokio::test]
async fn test_mapped_lines_fall_inside_their_snippet() {
    let temp = TempDir::new().unwrap();
    let lesson = "# Mixed\n\n```ts\nlet a: string = 1;\n```\n\n```ts\nlet b: boolean = \"no\";\nlet c = a + b;\nnotDefined();\n```\n";
    write(temp.path(), "mixed.md", lesson);

    let corpus_root = temp.path();
    let report = Validator::new(profile())
        .unwrap()
        .without_cache()
        .validate_root(corpus_root)
        .await
        .unwrap()
        .report;

    let snippets: Vec<_> = snipcheck_core::extract(lesson).collect();
    assert_eq!(report.diagnostics.len(), 3);
    for d in &report.diagnostics {
        let snippet = &snippets[d.snippet];
        assert!(d.line > snippet.span.start_line && d.line < snippet.span.end_line);
        let source_line = line_of(lesson, d.line);
        assert!(snippet.text.lines().any(|l| l == source_line));
    }
}

#[tokio::test]
async fn test_unterminated_fence_is_malformed_and_never_checked() {
    #[derive(Default)]
    struct Counting(AtomicUsize);

    #[async_trait]
    impl TypeChecker for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn check(&self, _: &CompilationUnit, _: &CompilerProfile) -> Result<Vec<RawDiagnostic>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    let temp = TempDir::new().unwrap();
    write(temp.path(), "broken.md", "# Broken\n\n```ts\nconst a = 1;\n");
    let checker = Arc::new(Counting::default());

    let report = Validator::with_backend(profile(), checker.clone())
        .unwrap()
        .without_cache()
        .validate_root(temp.path())
        .await
        .unwrap()
        .report;

    assert_eq!(report.units.len(), 1);
    assert!(matches!(report.units[0].outcome, UnitOutcome::Malformed { .. }));
    assert_eq!(report.units[0].end_line, 4);
    assert_eq!(checker.0.load(Ordering::SeqCst), 0);
    assert!(!report.passed);
}

#[tokio::test]
async fn test_second_run_is_identical_and_fully_cached() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "01-intro.md", "# Intro\n\n```ts\nconst a: number = 1;\n```\n\n```bash\nnpm install\n```\n");
    write(temp.path(), "02-types/lesson.md", "```ts\nlet s: string = 42;\n```\n\n---\n\n```ts\nconst ok = [1, 2, 3].map((n) => n * 2);\n```\n");

    let first = Validator::new(profile()).unwrap().validate_root(temp.path()).await.unwrap();
    assert_eq!(first.stats.checked, 3);
    assert_eq!(first.stats.cache_hits, 0);
    assert_eq!(first.stats.compiled, 3);

    let second = Validator::new(profile()).unwrap().validate_root(temp.path()).await.unwrap();
    assert_eq!(second.stats.cache_hits, second.stats.checked);
    assert_eq!(second.stats.compiled, 0);

    assert_eq!(
        render_json(&first.report).unwrap(),
        render_json(&second.report).unwrap()
    );
}

#[tokio::test]
async fn test_profile_change_discards_cache() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "a.md", "```ts\nfunction id(v) { return v; }\n```\n");

    let strict = Validator::new(profile()).unwrap().validate_root(temp.path()).await.unwrap();
    assert!(!strict.report.passed);

    let loose = CompilerProfile {
        strict: false,
        ..profile()
    };
    let relaxed = Validator::new(loose).unwrap().validate_root(temp.path()).await.unwrap();
    assert!(relaxed.report.passed);
    assert_eq!(relaxed.stats.cache_hits, 0);
    assert!(relaxed.stats.cache_discarded.is_some());
}

#[tokio::test]
async fn test_timeout_is_reported_and_not_cached() {
    struct Slow;

    #[async_trait]
    impl TypeChecker for Slow {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn check(&self, _: &CompilationUnit, _: &CompilerProfile) -> Result<Vec<RawDiagnostic>> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Vec::new())
        }
    }

    let temp = TempDir::new().unwrap();
    write(temp.path(), "a.md", "```ts\nconst a = 1;\n```\n\n# Next\n\n```bash\nls\n```\n");
    let fast_timeout = CompilerProfile {
        timeout_ms: 20,
        ..profile()
    };

    let first = Validator::with_backend(fast_timeout.clone(), Arc::new(Slow))
        .unwrap()
        .validate_root(temp.path())
        .await
        .unwrap();
    assert_eq!(first.report.units[0].outcome, UnitOutcome::Timeout { timeout_ms: 20 });
    assert_eq!(first.report.counts.unchecked, 1);
    assert!(!first.report.passed);

    let second = Validator::with_backend(fast_timeout, Arc::new(Slow))
        .unwrap()
        .validate_root(temp.path())
        .await
        .unwrap();
    assert_eq!(second.stats.cache_hits, 0);
    assert_eq!(second.stats.compiled, 1);
}

#[tokio::test]
async fn test_documents_follow_curriculum_order() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "10-wrap-up.md", "```ts\nconst c = 3;\n```\n");
    write(temp.path(), "2-middle.md", "```ts\nconst b = 2;\n```\n");
    write(temp.path(), "1-start.md", "```ts\nconst a = 1;\n```\n");
    write(temp.path(), "notes.txt", "```ts\nnot a lesson\n```\n");

    let report = Validator::new(profile())
        .unwrap()
        .without_cache()
        .validate_root(temp.path())
        .await
        .unwrap()
        .report;

    let order: Vec<&str> = report.documents.iter().map(|d| d.document.as_str()).collect();
    assert_eq!(order, vec!["1-start.md", "2-middle.md", "10-wrap-up.md"]);
    assert!(report.passed);
}

#[tokio::test]
async fn test_missing_root_is_fatal() {
    let temp = TempDir::new().unwrap();
    let err = Validator::new(profile())
        .unwrap()
        .validate_root(&temp.path().join("nope"))
        .await
        .unwrap_err();
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_continuation_cycle_warns_and_checks_everything() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "loop.md",
        "# Loop\n\n```ts id=first continues=second\nconst a = 1;\n```\n\n```ts id=second continues=first\nconst b = a + 1;\n```\n\n```ts standalone\nconst c: number = \"c\";\n```\n",
    );

    let report = Validator::new(profile())
        .unwrap()
        .without_cache()
        .validate_root(temp.path())
        .await
        .unwrap()
        .report;

    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("continuity cycle"));
    assert_eq!(report.units.len(), 2);
    assert_eq!(report.units[0].snippets, vec![0, 1]);
    assert_eq!(report.units[0].outcome, UnitOutcome::Ok);
    assert_eq!(report.units[1].outcome.diagnostics().len(), 1);
}

#[tokio::test]
async fn test_timed_out_unit_is_rechecked_later() {
    #[derive(Default)]
    struct SlowOnce(AtomicUsize);

    #[async_trait]
    impl TypeChecker for SlowOnce {
        fn name(&self) -> &'static str {
            "slow-once"
        }

        async fn check(&self, _: &CompilationUnit, _: &CompilerProfile) -> Result<Vec<RawDiagnostic>> {
            if self.0.fetch_add(1, Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            Ok(Vec::new())
        }
    }

    let temp = TempDir::new().unwrap();
    write(temp.path(), "a.md", "```ts\nconst a = 1;\n```\n");
    let checker = Arc::new(SlowOnce::default());

    let hurried = CompilerProfile {
        timeout_ms: 20,
        ..profile()
    };
    let first = Validator::with_backend(hurried, checker.clone())
        .unwrap()
        .validate_root(temp.path())
        .await
        .unwrap();
    assert_eq!(first.report.units[0].outcome, UnitOutcome::Timeout { timeout_ms: 20 });

    let second = Validator::with_backend(profile(), checker.clone())
        .unwrap()
        .validate_root(temp.path())
        .await
        .unwrap();
    assert_eq!(second.report.units[0].outcome, UnitOutcome::Ok);
    assert_eq!(second.stats.cache_hits, 0);
    assert_eq!(second.stats.compiled, 1);
    assert!(second.report.passed);

    let third = Validator::with_backend(profile(), checker)
        .unwrap()
        .validate_root(temp.path())
        .await
        .unwrap();
    assert_eq!(third.stats.cache_hits, 1);
}

#[tokio::test]
async fn test_compiler_upgrade_discards_cache() {
    struct Versioned(&'static str);

    #[async_trait]
    impl TypeChecker for Versioned {
        fn name(&self) -> &'static str {
            "versioned"
        }

        fn version(&self) -> String {
            self.0.to_string()
        }

        async fn check(&self, _: &CompilationUnit, _: &CompilerProfile) -> Result<Vec<RawDiagnostic>> {
            Ok(Vec::new())
        }
    }

    let temp = TempDir::new().unwrap();
    write(temp.path(), "a.md", "```ts\nconst a = 1;\n```\n");

    let run = |version: &'static str| {
        let root = temp.path().to_path_buf();
        async move {
            Validator::with_backend(profile(), Arc::new(Versioned(version)))
                .unwrap()
                .validate_root(&root)
                .await
                .unwrap()
        }
    };

    assert_eq!(run("Version 5.3.3").await.stats.compiled, 1);
    assert_eq!(run("Version 5.3.3").await.stats.cache_hits, 1);

    let upgraded = run("Version 5.4.5").await;
    assert_eq!(upgraded.stats.cache_hits, 0);
    assert!(upgraded.stats.cache_discarded.is_some());
}

#[tokio::test]
async fn test_destructured_ambient_name_is_not_redeclared() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "a.md",
        "```ts\nconst props = { document: 1 };\nconst { document } = props;\nconsole.log(document);\n```\n",
    );

    let report = Validator::new(profile())
        .unwrap()
        .without_cache()
        .validate_root(temp.path())
        .await
        .unwrap()
        .report;

    assert_eq!(report.units[0].outcome, UnitOutcome::Ok);
}
