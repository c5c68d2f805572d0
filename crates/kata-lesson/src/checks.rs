//! Check runner.
//!
//! Each check's `test_code` evaluates in the sandbox interpreter with two
//! bindings in scope: `files` (filename to content) and `console` (the
//! run's captured events as `{ level, message }` objects). Checks are
//! isolated: a throw fails that check only, and every check gets fresh
//! copies of the bindings.
//!
//! A check passes when its code completes and its final value is not
//! `false`; authors can therefore end with a boolean expression or throw
//! with a custom message.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use kata_sandbox::builtins;
use kata_sandbox::events::{EventLog, SandboxEvent};
use kata_sandbox::interp::{define, Flow, Interp, Scope, Value};
use kata_sandbox::parser;
use kata_sandbox::DEFAULT_TIMEOUT_MS;

use crate::lesson::{Check, CheckRunResult, Lesson, LessonRunResult, PassCondition};

/// Runs every check in `lesson` against a submission.
///
/// `files` is the submitted workspace; `console` is the event log captured
/// by the sandbox run that preceded checking.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn run_lesson_checks(
    lesson: &Lesson,
    files: &IndexMap<String, String>,
    console: &[SandboxEvent],
) -> LessonRunResult {
    let mut interp = Interp::new();
    builtins::install(&mut interp, Rc::new(RefCell::new(EventLog::new())));

    let mut results = Vec::with_capacity(lesson.checks.len());
    let mut passed_weight = 0.0_f64;
    for check in &lesson.checks {
        let result = run_check(&mut interp, check, files, console);
        debug!(check = %check.id, passed = result.passed, "check finished");
        if result.passed {
            passed_weight += check.weight;
        }
        results.push(result);
    }

    let score = (100.0 * passed_weight).round().clamp(0.0, 100.0) as u8;
    let all_passed = results.iter().all(|r| r.passed);
    let passed = match lesson.gate.pass_condition {
        PassCondition::AllChecks => all_passed,
        PassCondition::RubricScore => lesson
            .gate
            .score_threshold
            .is_some_and(|threshold| score >= threshold),
    };
    info!(lesson = %lesson.id, score, passed, "checks complete");

    LessonRunResult {
        passed,
        score,
        checks: results,
    }
}

fn run_check(
    interp: &mut Interp,
    check: &Check,
    files: &IndexMap<String, String>,
    console: &[SandboxEvent],
) -> CheckRunResult {
    let Some(code) = check.test_code.as_deref() else {
        return CheckRunResult {
            id: check.id.clone(),
            passed: true,
            message: check.success_message.clone(),
        };
    };

    let stmts = match parser::parse_program(code) {
        Ok(stmts) => stmts,
        Err(e) => {
            warn!(check = %check.id, error = %e.message, "check code failed to parse");
            return failed(check, None);
        }
    };

    // Fresh bindings per check so one check cannot poison another.
    let env = Scope::child(&interp.globals);
    define(&env, "files", files_value(files));
    define(&env, "console", console_value(console));

    interp.set_deadline(Instant::now() + Duration::from_millis(DEFAULT_TIMEOUT_MS));
    match interp.exec_program(&stmts, &env) {
        Ok(Value::Bool(false)) => failed(check, None),
        Ok(_) => CheckRunResult {
            id: check.id.clone(),
            passed: true,
            message: check.success_message.clone(),
        },
        Err(Flow::Throw(value, _)) => failed(check, thrown_message(&value)),
        Err(flow) => {
            if let Flow::Error(err) = &flow {
                warn!(check = %check.id, error = %err.message, "check code raised");
            }
            failed(check, None)
        }
    }
}

fn failed(check: &Check, message: Option<String>) -> CheckRunResult {
    CheckRunResult {
        id: check.id.clone(),
        passed: false,
        message: message.unwrap_or_else(|| check.fail_message.clone()),
    }
}

/// The `message` of a thrown error object, when one was provided.
fn thrown_message(value: &Value) -> Option<String> {
    let Value::Object(map) = value else {
        if let Value::Str(s) = value {
            return Some(s.clone());
        }
        return None;
    };
    match map.borrow().get("message") {
        Some(Value::Str(message)) if !message.is_empty() => Some(message.clone()),
        _ => None,
    }
}

fn files_value(files: &IndexMap<String, String>) -> Value {
    let map: IndexMap<String, Value> = files
        .iter()
        .map(|(name, content)| (name.clone(), Value::str(content.clone())))
        .collect();
    Value::object(map)
}

fn console_value(console: &[SandboxEvent]) -> Value {
    let entries = console
        .iter()
        .map(|event| {
            let mut entry = IndexMap::new();
            entry.insert("level".to_string(), Value::str(event.level.to_string()));
            entry.insert("message".to_string(), Value::str(event.message.clone()));
            Value::object(entry)
        })
        .collect();
    Value::array(entries)
}
