// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario: transient failure recovers within the retry budget.

use crate::prelude::*;

fn flaky_workspace(max_attempts: u32, retryable: &[i32]) -> Workspace {
    let ws = Workspace::new();
    ws.write_script("bin/flaky.sh", FLAKY_PROCESSOR);
    ws.write_pipeline(&serde_json::json!({
        "name": "flaky-demo",
        "stages": [{
            "name": "flaky",
            "processor": "bin/flaky.sh",
            "outputDir": "data/output",
            "params": {"simulateTransient": true},
            "retry": {
                "maxAttempts": max_attempts,
                "baseDelaySeconds": 0.05,
                "retryableExitCodes": retryable,
                "seed": 7,
            },
        }],
    }));
    ws
}

#[test]
fn transient_exit_code_recovers_on_retry() {
    let ws = flaky_workspace(3, &[75]);
    let output = ws.run_ok("t1");

    let stdout = stdout_of(&output);
    assert!(stdout.contains("[RETRY]"), "stdout: {stdout}");
    assert!(stdout.contains("[DONE] flaky"), "stdout: {stdout}");
    assert!(ws.exists("data/output/flaky_done"));

    let state = ws.state_json("state/stage_flaky.json");
    assert_eq!(state["lastStatus"], "ok");
    assert!(state["attempts"].as_u64().unwrap() >= 2);
    let history = state["history"].as_array().unwrap();
    assert_eq!(history[0]["status"], "failed");
    assert_eq!(history[0]["exitCode"], 75);
    assert_eq!(history.last().unwrap()["status"], "ok");
}

#[test]
fn audit_records_the_fail_then_done_chain() {
    let ws = flaky_workspace(3, &[75]);
    ws.run_ok("t1");

    let audit_path = ws.root().join("state/audit_t1.jsonl");
    stagehand_storage::verify_audit_log(&audit_path).unwrap();

    let text = ws.read("state/audit_t1.jsonl");
    let events: Vec<serde_json::Value> = text
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert!(events.iter().any(|e| e["event"] == "fail"));
    assert!(events.iter().any(|e| e["event"] == "done"));
}

#[test]
fn retry_budget_is_a_hard_bound() {
    // Transient failure but only one attempt allowed: the run fails and
    // the processor ran exactly once.
    let ws = flaky_workspace(1, &[75]);
    let output = ws.run("t1");

    assert!(!output.status.success());
    assert_eq!(ws.invocations().len(), 1);

    let metrics = ws.state_json("state/metrics_t1.json");
    assert_eq!(metrics["failedStages"], 1);
}

#[test]
fn unlisted_exit_codes_do_not_retry() {
    let ws = flaky_workspace(3, &[99]);
    let output = ws.run("t1");

    assert!(!output.status.success());
    assert_eq!(ws.invocations().len(), 1, "exit 75 is not in the retryable set");

    let state = ws.state_json("state/stage_flaky.json");
    assert_eq!(state["lastStatus"], "failed");
    assert_eq!(state["lastError"], "simulated transient failure");
}
