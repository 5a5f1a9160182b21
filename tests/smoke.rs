//! Smoke tests -- verify the binary runs and key subcommands parse.

use assert_cmd::Command;

fn popreport() -> Command {
    Command::cargo_bin("popreport").unwrap()
}

/// Write a config that keeps all state inside `dir`.
fn isolated_config(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("popreport.toml");
    let body = format!(
        "[storage]\nhistory_path = {:?}\noutput_dir = {:?}\n\n[scheduler]\ncron = \"0 0 8 * * *\"\n",
        dir.join("history.json"),
        dir.join("outputs"),
    );
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_cli_help() {
    popreport()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains("Scheduled world population report pipeline"));
}

#[test]
fn test_cli_version() {
    popreport()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::contains("popreport"));
}

#[test]
fn test_subcommands_exist() {
    for sub in ["serve", "run-now", "history", "dry-run"] {
        popreport().args([sub, "--help"]).assert().success();
    }
}

#[test]
fn test_history_json_is_empty_on_fresh_install() {
    let dir = tempfile::tempdir().unwrap();
    let config = isolated_config(dir.path());

    popreport()
        .arg("--config")
        .arg(&config)
        .args(["history", "--json"])
        .assert()
        .success()
        .stdout(predicates::str::diff("[]\n"));
}

#[test]
fn test_history_table_on_fresh_install() {
    let dir = tempfile::tempdir().unwrap();
    let config = isolated_config(dir.path());

    popreport()
        .arg("--config")
        .arg(&config)
        .arg("history")
        .assert()
        .success()
        .stdout(predicates::str::contains("No executions recorded."));
}

#[test]
fn test_dry_run_lists_daily_trigger() {
    let dir = tempfile::tempdir().unwrap();
    let config = isolated_config(dir.path());

    popreport()
        .arg("--config")
        .arg(&config)
        .args(["dry-run", "--hours", "48"])
        .assert()
        .success()
        .stdout(predicates::str::contains("08:00:00+00:00"));
}

#[test]
fn test_missing_config_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();

    popreport()
        .arg("--config")
        .arg(dir.path().join("absent.toml"))
        .arg("history")
        .assert()
        .failure();
}

#[test]
fn test_unloadable_env_config_is_logged() {
    let dir = tempfile::tempdir().unwrap();

    popreport()
        .current_dir(dir.path())
        .env("POPREPORT_CONFIG", dir.path().join("absent.toml"))
        .env("RUST_LOG", "warn")
        .args(["history", "--json"])
        .assert()
        .success()
        .stdout(predicates::str::diff("[]\n"))
        .stderr(predicates::str::contains(
            "config file from POPREPORT_CONFIG could not be loaded",
        ))
        .stderr(predicates::str::contains("absent.toml"));
}

#[test]
fn test_malformed_local_config_is_logged() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("popreport.toml"), "[scheduler\n").unwrap();

    popreport()
        .current_dir(dir.path())
        .env_remove("POPREPORT_CONFIG")
        .env("RUST_LOG", "warn")
        .args(["history", "--json"])
        .assert()
        .success()
        .stdout(predicates::str::diff("[]\n"))
        .stderr(predicates::str::contains(
            "config file from working directory could not be loaded",
        ));
}
