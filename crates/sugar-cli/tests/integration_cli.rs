//! End-to-end tests for the `sugar` binary.
//!
//! Each test lays out a template root in a temporary directory, runs the
//! binary on it and checks the exit status, the report and the cache
//! directory.

use camino::{Utf8Path, Utf8PathBuf};
use pretty_assertions::assert_eq;
use std::fs;
use std::process::{Command, Output};
use tempfile::TempDir;

fn write(root: &Utf8Path, path: &str, text: &str) {
    let full = root.join(path);
    if let Some(parent) = full.parent() {
        fs::create_dir_all(parent).expect("create template dir");
    }
    fs::write(full, text).expect("write template");
}

fn site() -> (TempDir, Utf8PathBuf) {
    let dir = TempDir::new().expect("temp dir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp dir");
    write(&root, "layouts/base.sugar.php", "<main s:block=\"content\">Default</main>");
    write(&root, "components/badge.sugar.php", "<span class=\"badge\"><?= $slot ?></span>");
    write(
        &root,
        "pages/home.sugar.php",
        "<s-template s:extends=\"../layouts/base\"><main s:block=\"content\"><s-badge>New</s-badge></main></s-template>",
    );
    (dir, root)
}

fn sugar(root: &Utf8Path, extra: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_sugar"))
        .arg(root.as_str())
        .args(extra)
        .env_remove("SUGAR_LOG")
        .output()
        .expect("run sugar")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn compiles_pages_into_cache_dir() {
    let (_dir, root) = site();
    let output = sugar(&root, &[]);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let report = stdout(&output);
    assert!(report.contains("sugar compiled 2 of 2 templates (0 cached)"), "{report}");
    assert!(root.join(".sugar-cache/index.json").is_file());
}

#[test]
fn second_run_uses_cache() {
    let (_dir, root) = site();
    assert!(sugar(&root, &[]).status.success());

    let report = stdout(&sugar(&root, &[]));
    assert!(report.contains("compiled 0 of 2 templates (2 cached)"), "{report}");

    let forced = stdout(&sugar(&root, &["--force"]));
    assert!(forced.contains("compiled 2 of 2 templates (0 cached)"), "{forced}");
}

#[test]
fn errors_fail_the_run() {
    let (_dir, root) = site();
    write(&root, "pages/broken.sugar.php", "<p s:iff=\"$a\">x</p>");

    let output = sugar(&root, &[]);
    assert_eq!(output.status.code(), Some(1));
    let report = stdout(&output);
    assert!(report.contains("pages/broken.sugar.php:1:4"), "{report}");
    assert!(report.contains("Unknown directive \"s:iff\". Did you mean \"s:if\"?"), "{report}");
}

#[test]
fn json_output_lists_failures() {
    let (_dir, root) = site();
    write(&root, "pages/broken.sugar.php", "<s-bdge>x</s-bdge>");

    let output = sugar(&root, &["--output", "json"]);
    assert_eq!(output.status.code(), Some(1));
    let errors: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json report");
    assert_eq!(errors[0]["kind"], "ComponentNotFound");
    assert_eq!(errors[0]["template"], "pages/broken.sugar.php");
    assert_eq!(
        errors[0]["message"],
        "Component \"bdge\" not found. Did you mean \"badge\"?"
    );
}

#[test]
fn config_file_and_flags() {
    let (_dir, root) = site();
    write(&root, "sugar.toml", "cache_dir = \"build\"\nignore = [\"layouts/**\"]\n");

    let report = stdout(&sugar(&root, &[]));
    assert!(report.contains("compiled 1 of 1 template (0 cached)"), "{report}");
    assert!(root.join("build/index.json").is_file());

    let out = root.join("elsewhere");
    let report = stdout(&sugar(&root, &["--out", out.as_str(), "-t", "pages/home.sugar.php"]));
    assert!(report.contains(&format!("into {out}")), "{report}");
}

#[test]
fn emit_php_prints_generated_code() {
    let (_dir, root) = site();
    let report = stdout(&sugar(&root, &["--emit-php", "-t", "pages/home.sugar.php"]));
    assert!(report.contains("=== PHP for pages/home.sugar.php ==="), "{report}");
    assert!(report.contains("declare(strict_types=1);"), "{report}");
}
