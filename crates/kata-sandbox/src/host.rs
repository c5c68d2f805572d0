//! Run orchestration.
//!
//! The host owns the visible [`SandboxState`] and drives one run at a time
//! through it: preflight, a single scheduling yield, synchronous evaluation
//! under a wall-clock deadline, then a terminal commit. Every failure is a
//! terminal state in the returned snapshot; `run` never rejects.
//!
//! Commits are gated on the monotonic `run_id`, so a completion from a
//! superseded run cannot overwrite the current one's state.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::builtins::{self, ConsoleSink};
use crate::error::SandboxError;
use crate::events::{EventLog, LogLevel};
use crate::hooks::{render_value, HookRuntime, HookRuntimeRef};
use crate::interp::{
    format_number, js_to_string, native, throw_message, Element, EvalResult, Flow, Interp, Value,
};
use crate::lexer::Span;
use crate::loader::ModuleLoader;
use crate::state::{RunStatus, SandboxState};
use crate::transpile;

/// Default wall-clock budget for a run.
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

static WHILE_TRUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"while\s*\(\s*true\s*\)\s*\{").unwrap_or_else(|_| unreachable!())
});

static HEADERLESS_FOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"for\s*\(\s*;\s*;\s*\)\s*\{").unwrap_or_else(|_| unreachable!())
});

/// Per-run knobs.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Wall-clock budget in milliseconds.
    pub timeout_ms: u64,
    /// Drive the scripted interaction pass after the first render.
    pub simulate_user_flow: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            simulate_user_flow: false,
        }
    }
}

// ============================================================================
// Script Engine
// ============================================================================

/// Evaluation seam between run orchestration and learner code.
///
/// The shipped engine is the in-process tree-walking interpreter; a stricter
/// isolate can replace it without touching the host.
pub trait ScriptEngine {
    /// Evaluates `entry` and, when its default export is callable, drives the
    /// component pass (and optionally the scripted interaction pass).
    fn execute(&mut self, entry: &str, simulate_user_flow: bool) -> Result<(), SandboxError>;
}

/// The interpreter-backed [`ScriptEngine`].
pub struct InterpreterEngine {
    interp: Interp,
    loader: Rc<ModuleLoader>,
    hooks: HookRuntimeRef,
    budget_ms: u64,
    entry: String,
}

impl InterpreterEngine {
    /// Builds an engine over the run's file set, wired to the run's console
    /// sink and armed with its deadline.
    #[must_use]
    pub fn new(
        files: IndexMap<String, String>,
        sink: &ConsoleSink,
        deadline: Instant,
        budget_ms: u64,
    ) -> Self {
        let hooks = HookRuntime::shared();
        let loader = ModuleLoader::new(files, Rc::clone(&hooks));
        let mut interp = Interp::new();
        builtins::install(&mut interp, Rc::clone(sink));
        install_jsx_globals(&mut interp);
        install_debug_global(&mut interp, Rc::clone(sink));
        interp.set_deadline(deadline);
        Self {
            interp,
            loader,
            hooks,
            budget_ms,
            entry: String::new(),
        }
    }

    fn run_pass(&mut self, entry: &str, simulate_user_flow: bool) -> EvalResult<()> {
        let exports = self.loader.load_entry(&mut self.interp, entry)?;
        let Some(component) = default_export(&exports) else {
            return Ok(());
        };
        let mut tree = self.render_once(&component)?;
        if !simulate_user_flow {
            return Ok(());
        }

        if let Some(on_change) = find_handler(&tree, "onChange", |el| {
            el.host_tag() == Some("input")
        }) {
            self.interp
                .call_value(&on_change, &[change_event("3")], Span::default())?;
            tree = self.render_once(&component)?;
        }
        for label in ["Increment", "Decrement"] {
            let found = find_handler(&tree, "onClick", |el| {
                el.host_tag() == Some("button") && text_content(el).contains(label)
            });
            if let Some(on_click) = found {
                debug!(label, "firing click");
                self.interp
                    .call_value(&on_click, &[click_event()], Span::default())?;
                tree = self.render_once(&component)?;
            }
        }
        Ok(())
    }

    /// One synchronous component pass: cursor reset, invoke, expand.
    fn render_once(&mut self, component: &Value) -> EvalResult<Value> {
        self.hooks.borrow_mut().reset_cursor();
        let props = Value::object(IndexMap::new());
        let rendered = self
            .interp
            .call_value(component, &[props], Span::default())?;
        render_value(&mut self.interp, &rendered)
    }

    /// Converts an escaping flow into the run's terminal error. Component
    /// pass failures remap against the entry module's map.
    fn into_error(&self, flow: Flow) -> SandboxError {
        let map = self.loader.source_map(&self.entry);
        match flow {
            Flow::Error(err) if err.timeout => SandboxError::Timeout {
                budget_ms: self.budget_ms,
            },
            Flow::Error(err) => {
                let location = err.location.or_else(|| {
                    let span = err.span?;
                    map.as_ref()?.lookup(span.line, span.column)
                });
                SandboxError::runtime(err.message, location)
            }
            Flow::Throw(value, span) => {
                let location = map.and_then(|m| m.lookup(span.line, span.column));
                SandboxError::runtime(throw_message(&value), location)
            }
            Flow::Return(_) | Flow::Break(_) | Flow::Continue(_) => {
                SandboxError::runtime("Unexpected control flow outside a function", None)
            }
        }
    }
}

impl ScriptEngine for InterpreterEngine {
    fn execute(&mut self, entry: &str, simulate_user_flow: bool) -> Result<(), SandboxError> {
        self.entry = entry.to_string();
        self.run_pass(entry, simulate_user_flow)
            .map_err(|flow| self.into_error(flow))
    }
}

/// Lowered JSX calls `jsx`/`jsxs`/`Fragment` unqualified, so the factory is
/// installed globally rather than behind an import.
fn install_jsx_globals(interp: &mut Interp) {
    let runtime = crate::hooks::jsx_runtime_module();
    if let Value::Object(map) = &runtime {
        for (name, value) in map.borrow().iter() {
            interp.define_global(name, value.clone());
        }
    }
}

/// `__debug(label, payload?)`: a breakpoint-style probe that writes to both
/// the run's console log and the host's tracing output.
fn install_debug_global(interp: &mut Interp, sink: ConsoleSink) {
    interp.define_global(
        "__debug",
        native("__debug", move |_interp, args| {
            let label = args.first().map(js_to_string).unwrap_or_default();
            let payload = args.get(1).map(crate::interp::format_value);
            debug!(label = %label, payload = ?payload, "debug probe");
            let line = match &payload {
                Some(p) => format!("[debug] {label}: {p}"),
                None => format!("[debug] {label}"),
            };
            sink.borrow_mut().push(LogLevel::Log, line);
            Ok(Value::Undefined)
        }),
    );
}

fn default_export(exports: &Value) -> Option<Value> {
    let candidate = match exports {
        Value::Function(_) | Value::Native(_) => exports.clone(),
        Value::Object(map) => map.borrow().get("default").cloned()?,
        _ => return None,
    };
    matches!(candidate, Value::Function(_) | Value::Native(_)).then_some(candidate)
}

fn collect_elements(value: &Value, out: &mut Vec<Rc<Element>>) {
    match value {
        Value::Element(el) => {
            out.push(Rc::clone(el));
            for child in el.children() {
                collect_elements(&child, out);
            }
        }
        Value::Array(items) => {
            for item in items.borrow().iter() {
                collect_elements(item, out);
            }
        }
        _ => {}
    }
}

/// First callable `prop` on an element matching `wanted`, in render order.
fn find_handler(tree: &Value, prop: &str, wanted: impl Fn(&Element) -> bool) -> Option<Value> {
    let mut elements = Vec::new();
    collect_elements(tree, &mut elements);
    for el in elements {
        if !wanted(&el) {
            continue;
        }
        if let Some(handler) = el.props.borrow().get(prop) {
            if matches!(handler, Value::Function(_) | Value::Native(_)) {
                return Some(handler.clone());
            }
        }
    }
    None
}

/// Visible label text: string and number children, concatenated depth-first.
fn text_content(el: &Element) -> String {
    let mut out = String::new();
    for child in el.children() {
        collect_text(&child, &mut out);
    }
    out
}

fn collect_text(value: &Value, out: &mut String) {
    match value {
        Value::Str(s) => out.push_str(s),
        Value::Number(n) => out.push_str(&format_number(*n)),
        Value::Element(el) => {
            for child in el.children() {
                collect_text(&child, out);
            }
        }
        Value::Array(items) => {
            for item in items.borrow().iter() {
                collect_text(item, out);
            }
        }
        _ => {}
    }
}

fn change_event(value: &str) -> Value {
    let mut target = IndexMap::new();
    target.insert("value".to_string(), Value::str(value));
    let mut event = IndexMap::new();
    event.insert("target".to_string(), Value::object(target));
    Value::object(event)
}

fn click_event() -> Value {
    Value::object(IndexMap::new())
}

// ============================================================================
// Execution Host
// ============================================================================

/// Owns the visible state and runs learner code against it.
pub struct ExecutionHost {
    state: SandboxState,
    next_run_id: u64,
}

impl Default for ExecutionHost {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionHost {
    /// Creates an idle host.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: SandboxState::new(),
            next_run_id: 0,
        }
    }

    /// The current visible state.
    #[must_use]
    pub const fn state(&self) -> &SandboxState {
        &self.state
    }

    /// Runs `entry` against `files` and returns the resulting snapshot.
    ///
    /// All failures are terminal statuses on the snapshot; the future never
    /// rejects. The only suspension point is one yield before evaluation,
    /// taken before any interpreter state exists.
    pub async fn run(
        &mut self,
        entry: &str,
        files: IndexMap<String, String>,
        options: &RunOptions,
    ) -> &SandboxState {
        self.next_run_id += 1;
        let run_id = self.next_run_id;
        self.state.begin_run(run_id, entry);
        info!(run_id, entry, "run started");

        if let Some(err) = preflight(&files) {
            warn!(run_id, error = %err, "preflight rejected");
            let message = err.display_message();
            let mut log = EventLog::new();
            log.push(LogLevel::Error, message.clone());
            self.commit(run_id, RunStatus::Error, log, Some(message));
            return &self.state;
        }

        tokio::task::yield_now().await;

        let (mut log, result) = evaluate(entry, files, options);
        match result {
            Ok(()) => {
                info!(run_id, "run succeeded");
                self.commit(run_id, RunStatus::Success, log, None);
            }
            Err(err) => {
                let status = if err.is_timeout() {
                    RunStatus::Timeout
                } else {
                    RunStatus::Error
                };
                warn!(run_id, %status, error = %err, "run failed");
                let message = err.display_message();
                log.push(LogLevel::Error, message.clone());
                self.commit(run_id, status, log, Some(message));
            }
        }
        &self.state
    }

    /// Supersedes any in-flight completion and returns the state to `Idle`.
    pub fn reset(&mut self) {
        self.next_run_id += 1;
        self.state.run_id = self.next_run_id;
        self.state.clear();
        debug!(run_id = self.state.run_id, "host reset");
    }

    /// Stale completions (superseded `run_id`) never touch visible state.
    fn commit(
        &mut self,
        run_id: u64,
        status: RunStatus,
        log: EventLog,
        error_message: Option<String>,
    ) {
        if run_id != self.state.run_id {
            debug!(run_id, current = self.state.run_id, "stale result discarded");
            return;
        }
        self.state.finish_run(status, log, error_message);
    }
}

/// Static unbounded-loop scan over every source file, before evaluation.
fn preflight(files: &IndexMap<String, String>) -> Option<SandboxError> {
    for (name, source) in files {
        if !transpile::is_source_file(name) {
            continue;
        }
        for pattern in [&WHILE_TRUE, &HEADERLESS_FOR] {
            if let Some(found) = pattern.find(source) {
                return Some(SandboxError::preflight(found.as_str(), name));
            }
        }
    }
    None
}

/// The synchronous evaluation scope. Everything `Rc`-based lives and dies
/// inside this call.
fn evaluate(
    entry: &str,
    files: IndexMap<String, String>,
    options: &RunOptions,
) -> (EventLog, Result<(), SandboxError>) {
    let sink: ConsoleSink = Rc::new(RefCell::new(EventLog::new()));
    let deadline = Instant::now() + Duration::from_millis(options.timeout_ms);
    let mut engine = InterpreterEngine::new(files, &sink, deadline, options.timeout_ms);
    let result = engine.execute(entry, options.simulate_user_flow);
    drop(engine);
    let log = sink.borrow().clone();
    (log, result)
}
