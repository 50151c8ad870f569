mod common;

use common::crmd_bin;

#[test]
fn version_flag_prints_version() {
    crmd_bin()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::starts_with("crmd "));
}

#[test]
fn help_flag_prints_usage() {
    crmd_bin()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains("Usage: crmd"));
}

#[test]
fn missing_config_is_an_error() {
    crmd_bin()
        .arg("/nonexistent/config.toml")
        .assert()
        .failure();
}
