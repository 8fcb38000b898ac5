// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario: repeat run with unchanged inputs skips every stage.

use crate::prelude::*;

#[test]
fn unchanged_rerun_skips_both_stages() {
    let ws = two_stage_workspace();
    ws.run_ok("t2a");
    let baseline = ws.invocations().len();

    let output = ws.run_ok("t2b");
    let stdout = stdout_of(&output);

    assert!(stdout.contains("[SKIP] copy"), "stdout: {stdout}");
    assert!(stdout.contains("[SKIP] upper"), "stdout: {stdout}");
    assert_eq!(
        ws.invocations().len(),
        baseline,
        "skipped stages must not invoke processors"
    );

    let metrics = ws.state_json("state/metrics_t2b.json");
    assert_eq!(metrics["skippedStages"], 2);
    assert_eq!(metrics["okStages"], 0);
}

#[test]
fn idempotency_key_survives_the_skip() {
    let ws = two_stage_workspace();
    ws.run_ok("t3a");
    let key_before = ws.state_json("state/stage_upper.json")["idempotencyKey"].clone();
    assert!(key_before.is_string());

    ws.run_ok("t3b");
    let key_after = ws.state_json("state/stage_upper.json")["idempotencyKey"].clone();
    assert_eq!(key_before, key_after);
}

#[test]
fn changed_input_triggers_re_execution() {
    let ws = two_stage_workspace();
    ws.run_ok("t4a");
    let baseline = ws.invocations().len();

    // One byte of one input changes both stages' keys downstream.
    ws.write_sample("data/input/sample.txt", 101);

    let output = ws.run_ok("t4b");
    let stdout = stdout_of(&output);
    assert!(stdout.contains("[DONE] copy"), "stdout: {stdout}");
    assert!(stdout.contains("[DONE] upper"), "stdout: {stdout}");
    assert!(ws.invocations().len() > baseline);

    let result = ws.read("data/output/result.txt");
    assert_eq!(result.lines().count(), 101);
}

#[test]
fn changed_params_trigger_re_execution() {
    let ws = two_stage_workspace();
    let mut spec = two_stage_pipeline();
    spec["stages"][1]["params"] = serde_json::json!({"mode": "a"});
    ws.write_pipeline(&spec);
    ws.run_ok("t5a");
    let upper_runs_before = ws
        .invocations()
        .iter()
        .filter(|s| s.as_str() == "upper")
        .count();

    spec["stages"][1]["params"] = serde_json::json!({"mode": "b"});
    ws.write_pipeline(&spec);
    let output = ws.run_ok("t5b");

    let stdout = stdout_of(&output);
    assert!(stdout.contains("[SKIP] copy"), "copy params unchanged: {stdout}");
    let upper_runs_after = ws
        .invocations()
        .iter()
        .filter(|s| s.as_str() == "upper")
        .count();
    assert_eq!(upper_runs_after, upper_runs_before + 1);
}

#[test]
fn marker_without_key_re_runs_the_stage() {
    let ws = two_stage_workspace();
    ws.run_ok("t6a");

    // Clear the recorded key but leave the marker.
    let mut state = ws.state_json("state/stage_upper.json");
    state.as_object_mut().unwrap().remove("idempotencyKey");
    ws.write_file("state/stage_upper.json", &state.to_string());

    let output = ws.run_ok("t6b");
    let stdout = stdout_of(&output);
    assert!(stdout.contains("[DONE] upper"), "stdout: {stdout}");
}
