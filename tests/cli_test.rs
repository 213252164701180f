//! CLI surface tests.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_describes_the_client() {
    Command::cargo_bin("hublink")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("notification client"))
        .stdout(predicate::str::contains("--hub-url"))
        .stdout(predicate::str::contains("--wallet"));
}

#[test]
fn test_version_flag() {
    Command::cargo_bin("hublink")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("hublink"));
}

#[test]
fn test_unknown_flag_is_rejected() {
    Command::cargo_bin("hublink")
        .unwrap()
        .arg("--definitely-not-a-flag")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unexpected argument"));
}
