//! Runs the built `allezon` binary against isolated config directories

use std::process::{Command, Output};

use tempfile::TempDir;

fn allezon(home: &TempDir, project: &TempDir, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_allezon"))
        .args(args)
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join(".config"))
        .env("ALLEZON_PROJECT_CONFIG_DIR", project.path())
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run allezon")
}

#[test]
fn help_lists_subcommands() {
    let (home, project) = (TempDir::new().unwrap(), TempDir::new().unwrap());
    let output = allezon(&home, &project, &["--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("serve"));
    assert!(stdout.contains("config"));
}

#[test]
fn config_show_prints_defaults_without_files() {
    let (home, project) = (TempDir::new().unwrap(), TempDir::new().unwrap());
    let output = allezon(&home, &project, &["config", "show"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[server]"));
    assert!(stdout.contains("port = 8080"));
    assert!(stdout.contains("[query]"));
    assert!(stdout.contains("max_buckets = 10080"));
}

#[test]
fn config_show_applies_project_file() {
    let (home, project) = (TempDir::new().unwrap(), TempDir::new().unwrap());
    std::fs::write(
        project.path().join("config.toml"),
        "[server]\nport = 9321\n\n[log]\npartition_count = 4\n",
    )
    .unwrap();

    let output = allezon(&home, &project, &["config", "show"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("port = 9321"));
    assert!(stdout.contains("partition_count = 4"));
}

#[test]
fn broken_project_file_fails() {
    let (home, project) = (TempDir::new().unwrap(), TempDir::new().unwrap());
    std::fs::write(project.path().join("config.toml"), "[server\n").unwrap();

    let output = allezon(&home, &project, &["config", "show"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("config.toml"));
}
