// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario: checkpoint resume from a mid-stage offset.

use crate::prelude::*;

#[test]
fn resume_passes_the_persisted_offset() {
    let ws = two_stage_workspace();
    ws.run_ok("t1");

    // Simulate an interrupted upper stage: marker gone, key cleared,
    // checkpoint at line 50.
    std::fs::remove_file(ws.root().join("data/output/.upper.done")).unwrap();
    let mut state = ws.state_json("state/stage_upper.json");
    state.as_object_mut().unwrap().remove("idempotencyKey");
    ws.write_file("state/stage_upper.json", &state.to_string());
    ws.write_file("state/progress_upper.json", r#"{"lineOffset": 50}"#);

    let output = ws.run_ok("t2");
    let stdout = stdout_of(&output);
    assert!(stdout.contains("[SKIP] copy"), "stdout: {stdout}");
    assert!(stdout.contains("[DONE] upper"), "stdout: {stdout}");

    // The processor saw offset 50 on the resumed run.
    let offsets = ws.read("upper_offsets.log");
    assert_eq!(offsets.lines().last().unwrap().trim(), "50");

    // And only appended the tail.
    let result = ws.read("data/output/result.txt");
    let appended: Vec<&str> = result.lines().skip(100).collect();
    assert_eq!(appended.first().copied(), Some("LINE 51"));
    assert_eq!(appended.last().copied(), Some("LINE 100"));

    assert!(ws.exists("data/output/.upper.done"));
    let progress = ws.state_json("state/progress_upper.json");
    assert_eq!(progress["lineOffset"], 100);
}

#[test]
fn corrupt_progress_file_resumes_from_zero() {
    let ws = two_stage_workspace();
    ws.run_ok("t1");

    std::fs::remove_file(ws.root().join("data/output/.upper.done")).unwrap();
    let mut state = ws.state_json("state/stage_upper.json");
    state.as_object_mut().unwrap().remove("idempotencyKey");
    ws.write_file("state/stage_upper.json", &state.to_string());
    ws.write_file("state/progress_upper.json", "{corrupt");

    ws.run_ok("t2");
    let offsets = ws.read("upper_offsets.log");
    assert_eq!(offsets.lines().last().unwrap().trim(), "0");

    let progress = ws.state_json("state/progress_upper.json");
    assert_eq!(progress["lineOffset"], 100);
}

#[test]
fn offsets_never_decrease_across_runs() {
    let ws = two_stage_workspace();
    ws.run_ok("t1");
    assert_eq!(ws.state_json("state/progress_upper.json")["lineOffset"], 100);

    // Force a re-run whose processor reports the same final offset.
    std::fs::remove_file(ws.root().join("data/output/.upper.done")).unwrap();
    let mut state = ws.state_json("state/stage_upper.json");
    state.as_object_mut().unwrap().remove("idempotencyKey");
    ws.write_file("state/stage_upper.json", &state.to_string());

    ws.run_ok("t2");
    assert_eq!(ws.state_json("state/progress_upper.json")["lineOffset"], 100);
}
