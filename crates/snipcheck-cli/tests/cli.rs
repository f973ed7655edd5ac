//! Command-line behavior of the `snipcheck` binary.

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn snipcheck() -> Command {
    let mut cmd = Command::cargo_bin("snipcheck").unwrap();
    cmd.env("NO_COLOR", "1");
    cmd
}

fn lesson(root: &Path, name: &str, text: &str) {
    fs::write(root.join(name), text).unwrap();
}

#[test]
fn test_check_passing_corpus() {
    let temp = TempDir::new().unwrap();
    lesson(temp.path(), "01-intro.md", "# Intro\n\n```ts\nconst answer: number = 42;\n```\n");

    snipcheck()
        .arg("check")
        .arg(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("01-intro.md (Intro) ... ok"))
        .stdout(predicate::str::contains("PASSED"));
}

#[test]
fn test_check_failing_corpus_exits_one() {
    let temp = TempDir::new().unwrap();
    lesson(temp.path(), "01-intro.md", "# Intro\n\n```ts\nlet x: number = \"s\";\n```\n");

    snipcheck()
        .arg("check")
        .arg(temp.path())
        .assert()
        .code(1)
        .stdout(predicate::str::contains("error[TS2322]"))
        .stdout(predicate::str::contains("01-intro.md:4:5"))
        .stdout(predicate::str::contains("FAILED"));
}

#[test]
fn test_json_report() {
    let temp = TempDir::new().unwrap();
    lesson(temp.path(), "a.md", "```ts\nlet x: number = \"s\";\n```\n");

    let output = snipcheck()
        .args(["check", "--format", "json", "--no-cache"])
        .arg(temp.path())
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["passed"], false);
    assert_eq!(report["diagnostics"][0]["document"], "a.md");
    assert_eq!(report["diagnostics"][0]["line"], 2);
    assert_eq!(report["diagnostics"][0]["severity"], "error");
    assert!(!temp.path().join(".snipcheck").exists());
}

#[test]
fn test_json_output_file_is_stable() {
    let temp = TempDir::new().unwrap();
    lesson(temp.path(), "a.md", "```ts\nconst a = 1;\n```\n\n```bash\nls\n```\n");
    let first = temp.path().join("out/first.json");
    let second = temp.path().join("out/second.json");

    for path in [&first, &second] {
        snipcheck()
            .args(["check", "--format", "json", "--output"])
            .arg(path)
            .arg(temp.path())
            .assert()
            .success();
    }

    assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
    assert!(temp.path().join(".snipcheck/cache/outcomes.bin").exists());
}

#[test]
fn test_invalid_configuration_exits_two() {
    let temp = TempDir::new().unwrap();
    lesson(temp.path(), "a.md", "```ts\nconst a = 1;\n```\n");

    snipcheck()
        .args(["check", "--concurrency", "0"])
        .arg(temp.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("concurrency must be > 0"));

    snipcheck()
        .args(["check", "--backend", "javac"])
        .arg(temp.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown backend"));
}

#[test]
fn test_profile_file_is_discovered() {
    let temp = TempDir::new().unwrap();
    lesson(temp.path(), "a.md", "```ts\nfunction id(v) { return v; }\n```\n");

    snipcheck().arg("check").arg(temp.path()).assert().code(1);

    fs::write(temp.path().join("snipcheck.toml"), "strict = false\n").unwrap();
    snipcheck().arg("check").arg(temp.path()).assert().success();

    fs::write(temp.path().join("snipcheck.toml"), "optimize = true\n").unwrap();
    snipcheck()
        .arg("check")
        .arg(temp.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("hint:"));
}

#[test]
fn test_missing_root() {
    let temp = TempDir::new().unwrap();
    snipcheck()
        .arg("check")
        .arg(temp.path().join("missing"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("corpus root not found"));
}

#[test]
fn test_extract_lists_snippets() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("lesson.md");
    fs::write(&file, "# One\n\n```ts id=setup\nconst a = 1;\n```\n\n```bash\nls\n```\n").unwrap();

    snipcheck()
        .arg("extract")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("2 snippets"))
        .stdout(predicate::str::contains("checked  id=setup"))
        .stdout(predicate::str::contains("unchecked"));

    let output = snipcheck()
        .args(["extract", "--format", "json"])
        .arg(&file)
        .output()
        .unwrap();
    let snippets: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(snippets[0]["language"], "ts");
    assert_eq!(snippets[0]["text"], "const a = 1;\n");
    assert_eq!(snippets[0]["span"]["start_line"], 3);
    assert_eq!(snippets[1]["language"], "bash");
}

#[test]
fn test_clean_removes_cache() {
    let temp = TempDir::new().unwrap();
    lesson(temp.path(), "a.md", "```ts\nconst a = 1;\n```\n");

    snipcheck().arg("check").arg(temp.path()).assert().success();
    assert!(temp.path().join(".snipcheck").exists());

    snipcheck()
        .arg("clean")
        .arg(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed"));
    assert!(!temp.path().join(".snipcheck").exists());

    snipcheck()
        .arg("clean")
        .arg(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to clean"));
}
