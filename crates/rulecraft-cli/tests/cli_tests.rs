// SPDX-License-Identifier: Apache-2.0
//! End-to-end tests driving the `rulecraft` binary against fixture JSON
//! files, the way a user would from a shell.

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::NamedTempFile;

fn fixture(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

const BUMP_RULE: &str = r#"[
  {
    "name": "Bump",
    "priority": 0,
    "effects": [
      { "type": "increment", "field": "Score", "by": 1 }
    ]
  }
]"#;

const ROOT_STATE: &str = r#"{ "Score": 0 }"#;

#[test]
fn run_advances_the_engine_and_prints_the_final_state() {
    let rules = fixture(BUMP_RULE);
    let state = fixture(ROOT_STATE);

    Command::cargo_bin("rulecraft")
        .unwrap()
        .args(["run", "--rules", rules.path().to_str().unwrap(), "--state", state.path().to_str().unwrap(), "--ticks", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"Score\": 3"));
}

#[test]
fn list_prints_a_table_without_running_the_engine() {
    let rules = fixture(BUMP_RULE);

    Command::cargo_bin("rulecraft")
        .unwrap()
        .args(["list", "--rules", rules.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Bump"))
        .stdout(predicate::str::contains("always"));
}

#[test]
fn replay_steps_through_a_recorded_tick_sequence() {
    let rules = fixture(BUMP_RULE);
    let state = fixture(ROOT_STATE);
    let steps = fixture(
        r#"[
          { "kind": "tick", "dtMs": 100.0 },
          { "kind": "tick", "dtMs": 100.0 }
        ]"#,
    );

    Command::cargo_bin("rulecraft")
        .unwrap()
        .args([
            "replay",
            "--rules",
            rules.path().to_str().unwrap(),
            "--state",
            state.path().to_str().unwrap(),
            "--steps",
            steps.path().to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"Score\": 2"));
}

#[test]
fn a_missing_rules_file_is_a_clean_non_zero_exit() {
    Command::cargo_bin("rulecraft")
        .unwrap()
        .args(["list", "--rules", "/nonexistent/rules.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("reading rule file"));
}

#[test]
fn duplicate_rule_names_fail_at_registration_not_at_tick() {
    let rules = fixture(
        r#"[
          { "name": "Dup", "priority": 0, "effects": [] },
          { "name": "Dup", "priority": 1, "effects": [] }
        ]"#,
    );
    let state = fixture(ROOT_STATE);

    Command::cargo_bin("rulecraft")
        .unwrap()
        .args(["run", "--rules", rules.path().to_str().unwrap(), "--state", state.path().to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("registering rule"));
}
