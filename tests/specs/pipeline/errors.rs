// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error-path specs: bad specs, missing processors, short-circuiting.

use crate::prelude::*;

#[test]
fn missing_processor_fails_the_run() {
    let ws = Workspace::new();
    ws.write_pipeline(&serde_json::json!({
        "name": "broken",
        "stages": [{
            "name": "ghost",
            "processor": "bin/nonexistent.sh",
            "outputDir": "data/output",
        }],
    }));

    let output = ws.run("t1");
    assert!(!output.status.success());
    let stdout = stdout_of(&output);
    assert!(stdout.contains("[FAIL] ghost"), "stdout: {stdout}");
    assert!(stdout.contains("Run t1 state: failed"));
}

#[test]
fn invalid_spec_is_fatal_before_any_stage() {
    let ws = Workspace::new();
    ws.write_file("pipeline.json", r#"{"name": "bad", "stages": []}"#);

    let output = ws.run("t1");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("[FATAL]"), "stderr: {stderr}");
    assert!(!ws.exists("state/run_t1.json"), "no run state for a bad spec");
}

#[test]
fn unparseable_spec_is_fatal() {
    let ws = Workspace::new();
    ws.write_file("pipeline.json", "{not json");

    let output = ws.run("t1");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("[FATAL]"));
}

#[test]
fn failure_stops_later_stages() {
    let ws = Workspace::new();
    ws.write_script("bin/copy.sh", COPY_PROCESSOR);
    ws.write_script("bin/boom.sh", "#!/bin/sh\necho kaput >&2\nexit 1\n");
    ws.write_sample("data/input/sample.txt", 5);
    ws.write_pipeline(&serde_json::json!({
        "name": "stops",
        "stages": [
            {
                "name": "copy",
                "processor": "bin/copy.sh",
                "inputs": ["data/input/sample.txt"],
                "outputDir": "data/work",
            },
            {
                "name": "boom",
                "processor": "bin/boom.sh",
                "outputDir": "data/output",
            },
            {
                "name": "after",
                "processor": "bin/copy.sh",
                "inputs": ["data/input/sample.txt"],
                "outputDir": "data/output",
            },
        ],
    }));

    let output = ws.run("t1");
    assert!(!output.status.success());

    let stdout = stdout_of(&output);
    assert!(stdout.contains("[DONE] copy"));
    assert!(stdout.contains("[FAIL] boom: kaput"), "stdout: {stdout}");
    assert!(!stdout.contains("after"), "third stage must not run: {stdout}");

    let metrics = ws.state_json("state/metrics_t1.json");
    assert_eq!(metrics["totalStages"], 2);
    assert_eq!(metrics["okStages"], 1);
    assert_eq!(metrics["failedStages"], 1);

    let run_state = ws.state_json("state/run_t1.json");
    assert_eq!(run_state["state"], "failed");
    assert!(run_state["endedAt"].is_string());
}

#[test]
fn failed_stage_keeps_its_error_in_state() {
    let ws = Workspace::new();
    ws.write_script("bin/boom.sh", "#!/bin/sh\necho kaput >&2\nexit 1\n");
    ws.write_pipeline(&serde_json::json!({
        "name": "errs",
        "stages": [{
            "name": "boom",
            "processor": "bin/boom.sh",
            "outputDir": "data/output",
        }],
    }));

    ws.run("t1");

    let state = ws.state_json("state/stage_boom.json");
    assert_eq!(state["lastStatus"], "failed");
    assert_eq!(state["lastError"], "kaput");
    let history = state["history"].as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["exitCode"], 1);
    assert_eq!(history[0]["error"], "kaput");
}
