//! CLI tests for failures that happen before any network access.

use std::fs;
use std::process::Command;

use ci_migrate::exit_codes;

const UNSET_TOKEN_VAR: &str = "CI_MIGRATE_TEST_UNSET_TOKEN";

#[test]
fn missing_token_exits_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(
        temp.path().join("ci-migrate.toml"),
        format!("token_env = \"{UNSET_TOKEN_VAR}\"\n"),
    )
    .expect("write config");

    let output = Command::new(env!("CARGO_BIN_EXE_ci-migrate"))
        .current_dir(temp.path())
        .env_remove(UNSET_TOKEN_VAR)
        .args(["update", "afw", "--null-check"])
        .output()
        .expect("ci-migrate update");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains(UNSET_TOKEN_VAR), "stderr: {stderr}");
}

#[test]
fn invalid_config_exits_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = temp.path().join("bad.toml");
    fs::write(&config, "timeout_secs = 0\n").expect("write config");

    let status = Command::new(env!("CARGO_BIN_EXE_ci-migrate"))
        .arg("--config")
        .arg(&config)
        .arg("detect")
        .status()
        .expect("ci-migrate detect");

    assert_eq!(status.code(), Some(exit_codes::INVALID));
}
