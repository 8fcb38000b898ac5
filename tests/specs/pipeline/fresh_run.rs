// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario: fresh run of the two-stage uppercase pipeline.

use crate::prelude::*;

#[test]
fn fresh_run_uppercases_the_sample() {
    let ws = two_stage_workspace();
    let output = ws.run_ok("t1");

    let stdout = stdout_of(&output);
    assert!(stdout.contains("[DONE] copy"), "stdout: {stdout}");
    assert!(stdout.contains("[DONE] upper"), "stdout: {stdout}");
    assert!(stdout.contains("Run t1 state: completed"));

    let result = ws.read("data/output/result.txt");
    let lines: Vec<&str> = result.lines().collect();
    assert_eq!(lines.len(), 100);
    assert_eq!(lines[0], "LINE 1");
    assert_eq!(lines[99], "LINE 100");
}

#[test]
fn fresh_run_persists_state_metrics_and_markers() {
    let ws = two_stage_workspace();
    ws.run_ok("t1");

    let metrics = ws.state_json("state/metrics_t1.json");
    assert_eq!(metrics["totalStages"], 2);
    assert_eq!(metrics["okStages"], 2);
    assert_eq!(metrics["skippedStages"], 0);
    assert_eq!(metrics["failedStages"], 0);

    let run_state = ws.state_json("state/run_t1.json");
    assert_eq!(run_state["state"], "completed");
    assert_eq!(run_state["pipeline"], "uppercase");

    assert!(ws.exists("data/work/.copy.done"));
    assert!(ws.exists("data/output/.upper.done"));

    let progress = ws.state_json("state/progress_upper.json");
    assert_eq!(progress["lineOffset"], 100);

    for stage in ["copy", "upper"] {
        let state = ws.state_json(&format!("state/stage_{stage}.json"));
        assert_eq!(state["lastStatus"], "ok");
        assert!(state["idempotencyKey"].as_str().unwrap().len() == 64);
    }
}

#[test]
fn fresh_run_leaves_no_tmp_files() {
    let ws = two_stage_workspace();
    ws.run_ok("t1");
    ws.assert_no_tmp_residue();
}

#[test]
fn audit_log_chains_and_verifies() {
    let ws = two_stage_workspace();
    ws.run_ok("t1");

    let entries =
        stagehand_storage::verify_audit_log(&ws.root().join("state/audit_t1.jsonl")).unwrap();
    // run_start, 2 × (start + done), run_end
    assert!(entries >= 6, "expected a full event trail, got {entries}");
}
