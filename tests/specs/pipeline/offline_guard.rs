// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario: offline guard violation is terminal and spawns nothing.

use crate::prelude::*;

fn guarded_workspace(guard_enabled: bool) -> Workspace {
    let ws = Workspace::new();
    ws.write_file(
        "bin/netfetch.py",
        "import socket\nimport json\nprint('fetching')\n",
    );
    ws.write_pipeline(&serde_json::json!({
        "name": "guarded",
        "stages": [{
            "name": "fetch",
            "processor": "bin/netfetch.py",
            "outputDir": "data/output",
            "offlineGuard": guard_enabled,
            "retry": {"maxAttempts": 3, "baseDelaySeconds": 0.05},
        }],
    }));
    ws
}

#[test]
fn banned_import_fails_the_stage() {
    let ws = guarded_workspace(true);
    let output = ws.run("t1");

    assert!(!output.status.success());
    let stdout = stdout_of(&output);
    assert!(stdout.contains("[FAIL] fetch"), "stdout: {stdout}");
    assert!(stdout.contains("offline violation"), "stdout: {stdout}");
    assert!(stdout.contains("socket"), "stdout: {stdout}");
}

#[test]
fn violation_spawns_no_processor_and_writes_no_marker() {
    let ws = guarded_workspace(true);
    ws.run("t1");

    assert!(ws.invocations().is_empty(), "guard must precede the spawn");
    assert!(!ws.exists("data/output/.fetch.done"));
}

#[test]
fn violation_is_not_retried() {
    let ws = guarded_workspace(true);
    let output = ws.run("t1");

    let stdout = stdout_of(&output);
    assert!(!stdout.contains("[RETRY]"), "static failures never retry: {stdout}");

    let state = ws.state_json("state/stage_fetch.json");
    assert_eq!(state["lastStatus"], "failed");
    assert!(state.get("history").is_none_or(|h| h
        .as_array()
        .is_some_and(|a| a.is_empty())));
}

#[test]
fn guard_can_be_disabled_per_stage() {
    let ws = guarded_workspace(false);
    let output = ws.run("t1");

    // The stage now actually runs (and may fail only if python3 is absent).
    let stdout = stdout_of(&output);
    assert!(!stdout.contains("offline violation"), "stdout: {stdout}");
}
