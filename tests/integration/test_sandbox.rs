//! End-to-end sandbox tests.
//!
//! These drive the public `ExecutionHost` API the way an editor frontend
//! would: submit files, await the run, and inspect the resulting state.

use indexmap::IndexMap;
use kata_sandbox::{
    transpile, ExecutionHost, RunOptions, RunStatus, SourceLocation, MAX_EVENTS,
};

fn file_set(files: &[(&str, &str)]) -> IndexMap<String, String> {
    files
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

#[tokio::test]
async fn test_hello_console_run() {
    let mut host = ExecutionHost::new();
    let files = file_set(&[(
        "main.ts",
        "const answer: number = 42;\nconsole.log(\"hello\", answer);",
    )]);
    let state = host.run("main.ts", files, &RunOptions::default()).await;

    assert_eq!(state.status, RunStatus::Success);
    assert_eq!(state.events.len(), 1);
    assert_eq!(state.events[0].message, "hello 42");
}

#[tokio::test]
async fn test_while_true_rejected_before_evaluation() {
    let mut host = ExecutionHost::new();
    let files = file_set(&[(
        "main.ts",
        "console.log(\"should never appear\");\nwhile (true) {}",
    )]);
    let state = host.run("main.ts", files, &RunOptions::default()).await;

    assert_eq!(state.status, RunStatus::Error);
    let message = state.error_message.as_deref().expect("error message");
    assert!(message.contains("Unbounded loop"));
    // Preflight fires before evaluation: no console output was captured.
    assert!(state.events.iter().all(|e| e.message != "should never appear"));
}

#[tokio::test]
async fn test_deadline_produces_timeout_state() {
    let mut host = ExecutionHost::new();
    let files = file_set(&[(
        "main.ts",
        "let n = 0;\nwhile (n >= 0) {\n  n = n + 1;\n}",
    )]);
    let options = RunOptions {
        timeout_ms: 50,
        ..RunOptions::default()
    };
    let state = host.run("main.ts", files, &options).await;

    assert_eq!(state.status, RunStatus::Timeout);
    assert!(state
        .error_message
        .as_deref()
        .expect("error message")
        .contains("timed out"));
}

#[tokio::test]
async fn test_console_truncates_at_two_hundred_events() {
    let mut host = ExecutionHost::new();
    let files = file_set(&[(
        "main.ts",
        "let i = 0;\nwhile (i < 300) {\n  console.log(\"line\", i);\n  i = i + 1;\n}",
    )]);
    let state = host.run("main.ts", files, &RunOptions::default()).await;

    assert_eq!(state.status, RunStatus::Success);
    assert_eq!(state.events.len(), MAX_EVENTS);
    assert!(state.truncated);
    assert_eq!(state.events[0].message, "line 0");
    assert_eq!(state.events[MAX_EVENTS - 1].message, "line 199");
}

#[tokio::test]
async fn test_cross_module_import_and_error_remap() {
    let mut host = ExecutionHost::new();
    let files = file_set(&[
        (
            "main.ts",
            "import { add } from \"./math\";\nconsole.log(\"sum\", add(20, 22));\nconsole.log(boom);",
        ),
        (
            "math.ts",
            "export function add(a: number, b: number): number {\n  return a + b;\n}",
        ),
    ]);
    let state = host.run("main.ts", files, &RunOptions::default()).await;

    assert_eq!(state.status, RunStatus::Error);
    assert_eq!(state.events[0].message, "sum 42");
    let message = state.error_message.as_deref().expect("error message");
    assert!(message.contains("boom is not defined"));
    assert!(message.contains("main.ts:3"));
}

#[tokio::test]
async fn test_forbidden_import_names_specifier() {
    let mut host = ExecutionHost::new();
    let files = file_set(&[("main.ts", "import fs from \"node:fs\";\nconsole.log(fs);")]);
    let state = host.run("main.ts", files, &RunOptions::default()).await;

    assert_eq!(state.status, RunStatus::Error);
    assert!(state
        .error_message
        .as_deref()
        .expect("error message")
        .contains("node:fs"));
}

#[tokio::test]
async fn test_counter_component_with_simulated_interaction() {
    let mut host = ExecutionHost::new();
    let source = r#"import { useState } from "react";

export default function Counter() {
  const [count, setCount] = useState(0);
  console.log("count", count);
  return (
    <div>
      <button onClick={() => setCount(count + 1)}>Increment</button>
      <button onClick={() => setCount((n) => n - 1)}>Decrement</button>
    </div>
  );
}"#;
    let files = file_set(&[("Counter.tsx", source)]);
    let options = RunOptions {
        simulate_user_flow: true,
        ..RunOptions::default()
    };
    let state = host.run("Counter.tsx", files, &options).await;

    assert_eq!(state.status, RunStatus::Success);
    // Initial render, after Increment, after Decrement.
    let messages: Vec<&str> = state.events.iter().map(|e| e.message.as_str()).collect();
    assert_eq!(messages, vec!["count 0", "count 1", "count 0"]);
}

#[test]
fn test_source_map_round_trips_lines() {
    let source = "const greeting: string = \"hi\";\nconst shout = greeting.toUpperCase();";
    let module = transpile("greet.ts", source).expect("transpile");

    // Type stripping is blank-space style, so positions survive the trip.
    let location = module.map.lookup(2, 14).expect("mapped location");
    assert_eq!(
        location,
        SourceLocation {
            file: "greet.ts".to_string(),
            line: 2,
            column: 14,
        }
    );
}
