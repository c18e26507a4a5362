use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

mod common;

fn deckforge_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("deckforge");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();
    fs::create_dir_all(root.join("config")).unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/deckforge.sqlite"

[deck]
api_url = "{url}"
timeout_secs = 2
fallback_dir = "{root}/data/fallback"
"#,
        root = root.display(),
        url = common::dead_url(),
    );
    let config_path = root.join("config/deckforge.toml");
    fs::write(&config_path, config_content).unwrap();

    fs::write(
        root.join("slides.txt"),
        "# Muscles of the Thigh\nQuadriceps femoris has four heads\n",
    )
    .unwrap();
    fs::write(
        root.join("lecture.txt"),
        "today the muscles of the thigh. the quadriceps femoris has four heads.",
    )
    .unwrap();
    fs::write(
        root.join("facts.json"),
        r#"[{"id":"f1","text":"Quadriceps femoris has four heads","source_window_index":0,"entity_tags":["quadriceps femoris"]}]"#,
    )
    .unwrap();

    (tmp, config_path)
}

fn run_deckforge(config: &Path, args: &[&str]) -> Output {
    Command::new(deckforge_binary())
        .arg("--config")
        .arg(config)
        .args(args)
        .output()
        .expect("failed to run deckforge")
}

#[test]
fn test_init_is_idempotent() {
    let (_tmp, config) = setup_test_env();
    for _ in 0..2 {
        let out = run_deckforge(&config, &["init"]);
        assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
        assert!(String::from_utf8_lossy(&out.stdout).contains("Database initialized"));
    }
}

#[test]
fn test_run_then_status() {
    let (tmp, config) = setup_test_env();
    let root = tmp.path();

    let out = run_deckforge(
        &config,
        &[
            "run",
            "--slides",
            root.join("slides.txt").to_str().unwrap(),
            "--transcript",
            root.join("lecture.txt").to_str().unwrap(),
            "--facts",
            root.join("facts.json").to_str().unwrap(),
            "--module",
            "wk09",
            "--deck",
            "Anatomy::wk09",
        ],
    );
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("verified: 1"));
    assert!(stdout.contains("1 file"));
    assert!(String::from_utf8_lossy(&out.stderr).contains("DELIVERY_SUCCESS: file="));

    let out = run_deckforge(&config, &["status"]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    let line = stdout
        .lines()
        .find(|l| l.trim_start().starts_with("delivered_file"))
        .unwrap();
    assert!(line.trim_end().ends_with('1'));
}

#[test]
fn test_invalid_config_fails() {
    let (tmp, _) = setup_test_env();
    let bad = tmp.path().join("config/bad.toml");
    fs::write(&bad, "[db]\npath = \"x\"\n[sync]\nmax_attempts = 0\n").unwrap();
    let out = run_deckforge(&bad, &["status"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("max_attempts"));
}
