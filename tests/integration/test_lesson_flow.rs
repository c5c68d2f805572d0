//! End-to-end lesson flow tests.
//!
//! These walk the full assessment pipeline: run the submission in the
//! sandbox, score it with the check runner, and drive the gate through
//! failures, hint unlocks, a soft block, and a pass.

use indexmap::IndexMap;
use kata_gate::{gate_reducer, GateAction, GateState, GateStatus};
use kata_lesson::{
    get_highest_unlocked_tier, get_unlocked_hints, run_lesson_checks, Lesson, LessonRunResult,
};
use kata_sandbox::{ExecutionHost, RunOptions, RunStatus, SandboxEvent};

fn counter_lesson() -> Lesson {
    Lesson::from_json(
        r#"{
        "id": "counter-101",
        "title": "Build a Counter",
        "files": [
            {
                "filename": "Counter.tsx",
                "language": "tsx",
                "editable": true,
                "content": "export default function Counter() {\n  return <div>todo</div>;\n}"
            }
        ],
        "checks": [
            {
                "id": "uses-state",
                "checkType": "functional",
                "weight": 0.6,
                "testCode": "files[\"Counter.tsx\"].includes(\"useState\")",
                "failMessage": "Track the count with the useState hook",
                "successMessage": "State hook in place"
            },
            {
                "id": "logs-count",
                "checkType": "behavioral",
                "weight": 0.4,
                "testCode": "console.some((e) => e.message.includes(\"count\"))",
                "failMessage": "Log the count on every render",
                "successMessage": "Count is logged"
            }
        ],
        "hintLadder": [
            { "tier": 1, "unlocksAfterFails": 1, "text": "Components re-render when state changes" },
            { "tier": 2, "unlocksAfterFails": 2, "text": "Import useState from react" },
            { "tier": 3, "unlocksAfterFails": 3, "text": "Destructure the state pair",
              "codeSnippet": "const [count, setCount] = useState(0);" }
        ],
        "gate": {
            "passCondition": "rubric_score",
            "scoreThreshold": 60,
            "maxAttempts": 3
        }
    }"#,
    )
    .expect("lesson manifest should parse")
}

async fn run_submission(lesson: &Lesson, content: &str) -> (IndexMap<String, String>, Vec<SandboxEvent>) {
    let mut files: IndexMap<String, String> = lesson
        .files
        .iter()
        .map(|f| (f.filename.clone(), f.content.clone()))
        .collect();
    files.insert("Counter.tsx".to_string(), content.to_string());

    let mut host = ExecutionHost::new();
    let options = RunOptions {
        simulate_user_flow: true,
        ..RunOptions::default()
    };
    let state = host.run("Counter.tsx", files.clone(), &options).await;
    assert_eq!(state.status, RunStatus::Success, "{:?}", state.error_message);
    (files, state.events.clone())
}

fn attempt(gate: &GateState, result: &LessonRunResult) -> GateState {
    let gate = gate_reducer(gate, &GateAction::SubmitAttempt);
    gate_reducer(
        &gate,
        &GateAction::CheckResult {
            passed: result.passed,
            check_results: result.checks.clone(),
            score: Some(result.score),
        },
    )
}

const WORKING_COUNTER: &str = r#"import { useState } from "react";

export default function Counter() {
  const [count, setCount] = useState(0);
  console.log("count", count);
  return <button onClick={() => setCount(count + 1)}>Increment</button>;
}"#;

const STATELESS_COUNTER: &str = r#"export default function Counter() {
  console.log("count", 0);
  return <button>Increment</button>;
}"#;

const SILENT_COUNTER: &str = r#"export default function Counter() {
  return <button>Increment</button>;
}"#;

#[tokio::test]
async fn test_passing_submission_closes_the_gate() {
    let lesson = counter_lesson();
    let (files, console) = run_submission(&lesson, WORKING_COUNTER).await;
    let result = run_lesson_checks(&lesson, &files, &console);

    assert_eq!(result.score, 100);
    assert!(result.passed);
    assert!(result.checks.iter().all(|c| c.passed));

    let gate = attempt(&GateState::new(lesson.gate.max_attempts), &result);
    assert_eq!(gate.status, GateStatus::Passed);
    assert!(gate.unlocked_hint_tiers.is_empty());
}

#[tokio::test]
async fn test_partial_submission_scores_the_rubric_split() {
    let lesson = counter_lesson();
    // Logs the count but never uses state: 40 of 100, under the threshold.
    let (files, console) = run_submission(&lesson, STATELESS_COUNTER).await;
    let result = run_lesson_checks(&lesson, &files, &console);

    assert_eq!(result.score, 40);
    assert!(!result.passed);
    assert!(!result.checks[0].passed);
    assert!(result.checks[1].passed);
    assert_eq!(
        result.checks[0].message,
        "Track the count with the useState hook"
    );
}

#[tokio::test]
async fn test_three_failures_soft_block_and_unlock_the_ladder() {
    let lesson = counter_lesson();
    let (files, console) = run_submission(&lesson, SILENT_COUNTER).await;
    let result = run_lesson_checks(&lesson, &files, &console);
    assert_eq!(result.score, 0);

    let mut gate = GateState::new(lesson.gate.max_attempts);
    for (attempt_no, expected_status) in
        [(1, GateStatus::Failed), (2, GateStatus::Failed), (3, GateStatus::SoftBlocked)]
    {
        gate = attempt(&gate, &result);
        assert_eq!(gate.status, expected_status, "after attempt {attempt_no}");
    }

    let tiers: Vec<u8> = gate.unlocked_hint_tiers.iter().copied().collect();
    assert_eq!(tiers, vec![1, 2, 3]);
    assert_eq!(gate.attempts, 0);
    assert_eq!(get_highest_unlocked_tier(&gate.unlocked_hint_tiers), Some(3));

    let hints = get_unlocked_hints(&lesson.hint_ladder, &gate.unlocked_hint_tiers);
    assert_eq!(hints.len(), 3);
    assert_eq!(
        hints[2].code_snippet.as_deref(),
        Some("const [count, setCount] = useState(0);")
    );

    // Dismissing the block reopens submissions with hints intact.
    gate = gate_reducer(&gate, &GateAction::DismissSoftBlock);
    assert_eq!(gate.status, GateStatus::Idle);
    assert_eq!(gate.unlocked_hint_tiers.len(), 3);
}

#[tokio::test]
async fn test_fail_then_fix_then_pass() {
    let lesson = counter_lesson();
    let mut gate = GateState::new(lesson.gate.max_attempts);

    let (files, console) = run_submission(&lesson, SILENT_COUNTER).await;
    let failing = run_lesson_checks(&lesson, &files, &console);
    gate = attempt(&gate, &failing);
    assert_eq!(gate.status, GateStatus::Failed);
    assert_eq!(gate.score, Some(0));
    assert!(gate.unlocked_hint_tiers.contains(&1));

    let (files, console) = run_submission(&lesson, WORKING_COUNTER).await;
    let passing = run_lesson_checks(&lesson, &files, &console);
    gate = attempt(&gate, &passing);
    assert_eq!(gate.status, GateStatus::Passed);
    assert_eq!(gate.score, Some(100));
    // Hints earned on the way stay unlocked after the pass.
    assert!(gate.unlocked_hint_tiers.contains(&1));

    // Passed is absorbing: further submissions are ignored.
    let after = attempt(&gate, &failing);
    assert_eq!(after, gate);
}
