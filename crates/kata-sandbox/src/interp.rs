//! Tree-walking evaluator for the transpiled JavaScript subset.
//!
//! The evaluator is deliberately small: enough of the language to run
//! lesson-sized components and check snippets. It enforces the run's
//! wall-clock budget cooperatively, checking a deadline on a coarse
//! operation counter, so a runaway loop surfaces as a timeout instead of
//! hanging the host.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Instant;

use indexmap::IndexMap;

use crate::lexer::Span;
use crate::parser::{
    ArrayElem, ArrowBody, AssignOp, BinOp, Expr, LogicalOp, MemberProp, ObjProp,
    Pattern, Stmt, TplChunk, UnOp,
};

/// How many evaluation steps pass between deadline checks.
const DEADLINE_CHECK_INTERVAL: u64 = 512;

/// Maximum interpreter call depth before "stack overflow".
const MAX_CALL_DEPTH: u32 = 128;

/// An evaluation failure with a best-effort generated-code position.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalError {
    /// Human-readable message, `TypeError: x is not a function` style.
    pub message: String,
    /// Position in generated code, when known.
    pub span: Option<Span>,
    /// Original-source position, once a module boundary has remapped the
    /// span through its source map.
    pub location: Option<crate::error::SourceLocation>,
    /// `true` if this failure is the wall-clock budget expiring.
    pub timeout: bool,
}

impl EvalError {
    /// A runtime error at `span`.
    #[must_use]
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span: Some(span),
            location: None,
            timeout: false,
        }
    }

    /// A runtime error with no position.
    #[must_use]
    pub fn unlocated(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            span: None,
            location: None,
            timeout: false,
        }
    }

    /// The budget-expired error.
    #[must_use]
    pub fn timeout() -> Self {
        Self {
            message: "execution budget exceeded".to_string(),
            span: None,
            location: None,
            timeout: true,
        }
    }
}

/// Non-local control flow (and errors) threaded through evaluation.
#[derive(Debug)]
pub enum Flow {
    /// `return` unwinding to the nearest call.
    Return(Value),
    /// `break` unwinding to the nearest loop.
    Break(Span),
    /// `continue` unwinding to the nearest loop.
    Continue(Span),
    /// `throw` with the thrown value and the throw site.
    Throw(Value, Span),
    /// An interpreter-raised error (undefined variable, bad call, timeout).
    Error(EvalError),
}

/// Result type used throughout evaluation.
pub type EvalResult<T> = Result<T, Flow>;

fn runtime(message: impl Into<String>, span: Span) -> Flow {
    Flow::Error(EvalError::new(message, span))
}

// ============================================================================
// Values
// ============================================================================

/// Shared mutable object storage. Insertion order is observable through
/// `Object.keys` and JSON serialization, hence `IndexMap`.
pub type ObjectRef = Rc<RefCell<IndexMap<String, Value>>>;

/// Shared mutable array storage.
pub type ArrayRef = Rc<RefCell<Vec<Value>>>;

/// What a rendered element is an instance of.
#[derive(Debug, Clone)]
pub enum ElementTag {
    /// An intrinsic tag like `div` or `button`.
    Host(String),
    /// A user component; the value is the component function.
    Component(Value),
    /// A fragment grouping children without a tag.
    Fragment,
}

/// One node of the rendered element tree.
///
/// `children` always lives inside `props` under the `"children"` key, as an
/// array, so learner code and probes see a single uniform shape.
#[derive(Debug)]
pub struct Element {
    /// The element's tag.
    pub tag: ElementTag,
    /// Props, including `children`.
    pub props: ObjectRef,
}

impl Element {
    /// The children array, empty when absent.
    #[must_use]
    pub fn children(&self) -> Vec<Value> {
        match self.props.borrow().get("children") {
            Some(Value::Array(items)) => items.borrow().clone(),
            Some(other) => vec![other.clone()],
            None => Vec::new(),
        }
    }

    /// Host tag name, if this is an intrinsic element.
    #[must_use]
    pub fn host_tag(&self) -> Option<&str> {
        match &self.tag {
            ElementTag::Host(name) => Some(name),
            _ => None,
        }
    }
}

/// A user-defined function value.
pub struct Closure {
    /// Function name, for display.
    pub name: Option<String>,
    /// Parameter patterns.
    pub params: Rc<Vec<Pattern>>,
    /// Body shared across calls.
    pub body: Rc<ClosureBody>,
    /// Captured environment.
    pub env: EnvRef,
}

/// Body of a closure.
#[derive(Debug)]
pub enum ClosureBody {
    /// Concise arrow body.
    Expr(Expr),
    /// Block body.
    Block(Vec<Stmt>),
}

/// A host-provided function.
pub struct NativeFn {
    /// Name, for display and error messages.
    pub name: String,
    /// The implementation. Receives the interpreter so callbacks can
    /// re-enter evaluation.
    pub call: Box<dyn Fn(&mut Interp, &[Value]) -> EvalResult<Value>>,
}

/// A runtime value.
#[derive(Clone)]
pub enum Value {
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// Boolean.
    Bool(bool),
    /// IEEE 754 double, as in the source language.
    Number(f64),
    /// Immutable string.
    Str(String),
    /// Shared mutable array.
    Array(ArrayRef),
    /// Shared mutable object.
    Object(ObjectRef),
    /// User function.
    Function(Rc<Closure>),
    /// Host function.
    Native(Rc<NativeFn>),
    /// Rendered element node.
    Element(Rc<Element>),
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Undefined => write!(f, "Undefined"),
            Self::Null => write!(f, "Null"),
            Self::Bool(b) => write!(f, "Bool({b})"),
            Self::Number(n) => write!(f, "Number({n})"),
            Self::Str(s) => write!(f, "Str({s:?})"),
            Self::Array(items) => write!(f, "Array(len={})", items.borrow().len()),
            Self::Object(map) => write!(f, "Object(keys={})", map.borrow().len()),
            Self::Function(c) => write!(f, "Function({:?})", c.name),
            Self::Native(n) => write!(f, "Native({})", n.name),
            Self::Element(e) => write!(f, "Element({:?})", e.tag),
        }
    }
}

impl Value {
    /// Wraps a string.
    #[must_use]
    pub fn str(s: impl Into<String>) -> Self {
        Self::Str(s.into())
    }

    /// Wraps a fresh array.
    #[must_use]
    pub fn array(items: Vec<Self>) -> Self {
        Self::Array(Rc::new(RefCell::new(items)))
    }

    /// Wraps a fresh object.
    #[must_use]
    pub fn object(map: IndexMap<String, Self>) -> Self {
        Self::Object(Rc::new(RefCell::new(map)))
    }

    /// `true` for `null` and `undefined`.
    #[must_use]
    pub const fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    /// The `typeof` string.
    #[must_use]
    pub const fn type_of(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::Str(_) => "string",
            Self::Function(_) | Self::Native(_) => "function",
            Self::Null | Self::Array(_) | Self::Object(_) | Self::Element(_) => "object",
        }
    }
}

/// Wraps a host function as a value.
pub fn native(
    name: impl Into<String>,
    call: impl Fn(&mut Interp, &[Value]) -> EvalResult<Value> + 'static,
) -> Value {
    Value::Native(Rc::new(NativeFn {
        name: name.into(),
        call: Box::new(call),
    }))
}

// ============================================================================
// Conversions and comparisons
// ============================================================================

/// Formats a number the way the source language prints it.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    if n.fract() == 0.0 && n.abs() < 9e15 {
        return format!("{}", n as i64);
    }
    format!("{n}")
}

/// Truthiness per the source language.
#[must_use]
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Undefined | Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => *n != 0.0 && !n.is_nan(),
        Value::Str(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) | Value::Function(_) | Value::Native(_)
        | Value::Element(_) => true,
    }
}

/// Implicit string conversion (for `+`, templates, and `String(x)`).
#[must_use]
pub fn js_to_string(value: &Value) -> String {
    match value {
        Value::Undefined => "undefined".to_string(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format_number(*n),
        Value::Str(s) => s.clone(),
        Value::Array(items) => items
            .borrow()
            .iter()
            .map(|v| {
                if v.is_nullish() {
                    String::new()
                } else {
                    js_to_string(v)
                }
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
        Value::Function(c) => match &c.name {
            Some(name) => format!("function {name}"),
            None => "function".to_string(),
        },
        Value::Native(n) => format!("function {}", n.name),
        Value::Element(e) => match &e.tag {
            ElementTag::Host(name) => format!("<{name} />"),
            ElementTag::Component(_) => "<Component />".to_string(),
            ElementTag::Fragment => "<Fragment />".to_string(),
        },
    }
}

/// Numeric coercion (for arithmetic and comparisons).
#[must_use]
pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Undefined => f64::NAN,
        Value::Null => 0.0,
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::Number(n) => *n,
        Value::Str(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed.parse().unwrap_or(f64::NAN)
            }
        }
        Value::Array(items) => {
            let items = items.borrow();
            match items.len() {
                0 => 0.0,
                1 => to_number(&items[0]),
                _ => f64::NAN,
            }
        }
        Value::Object(_) | Value::Function(_) | Value::Native(_) | Value::Element(_) => f64::NAN,
    }
}

/// Strict (`===`) equality. Reference identity for arrays, objects,
/// functions, and elements.
#[must_use]
pub fn strict_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => Rc::ptr_eq(x, y),
        (Value::Object(x), Value::Object(y)) => Rc::ptr_eq(x, y),
        (Value::Function(x), Value::Function(y)) => Rc::ptr_eq(x, y),
        (Value::Native(x), Value::Native(y)) => Rc::ptr_eq(x, y),
        (Value::Element(x), Value::Element(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}

/// Loose (`==`) equality, covering the coercions lesson code relies on.
#[must_use]
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
        (Value::Number(_), Value::Str(_))
        | (Value::Str(_), Value::Number(_))
        | (Value::Bool(_), _)
        | (_, Value::Bool(_)) => {
            let (x, y) = (to_number(a), to_number(b));
            x == y
        }
        _ => strict_eq(a, b),
    }
}

/// Renders a value for console output. Top-level strings print bare;
/// nested strings are quoted.
#[must_use]
pub fn format_value(value: &Value) -> String {
    fn inner(value: &Value, depth: usize) -> String {
        if depth > 6 {
            return "…".to_string();
        }
        match value {
            Value::Str(s) => format!("\"{s}\""),
            Value::Array(items) => {
                let rendered = items
                    .borrow()
                    .iter()
                    .map(|v| inner(v, depth + 1))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("[{rendered}]")
            }
            Value::Object(map) => {
                let rendered = map
                    .borrow()
                    .iter()
                    .map(|(k, v)| format!("{k}: {}", inner(v, depth + 1)))
                    .collect::<Vec<_>>()
                    .join(", ");
                if rendered.is_empty() {
                    "{}".to_string()
                } else {
                    format!("{{ {rendered} }}")
                }
            }
            other => js_to_string(other),
        }
    }
    match value {
        Value::Str(s) => s.clone(),
        other => inner(other, 0),
    }
}

// ============================================================================
// Environments
// ============================================================================

/// Shared reference to a lexical scope.
pub type EnvRef = Rc<RefCell<Scope>>;

/// One lexical scope in the environment chain.
#[derive(Default)]
pub struct Scope {
    vars: HashMap<String, Value>,
    parent: Option<EnvRef>,
}

impl Scope {
    /// Creates a root scope.
    #[must_use]
    pub fn root() -> EnvRef {
        Rc::new(RefCell::new(Self::default()))
    }

    /// Creates a child scope of `parent`.
    #[must_use]
    pub fn child(parent: &EnvRef) -> EnvRef {
        Rc::new(RefCell::new(Self {
            vars: HashMap::new(),
            parent: Some(Rc::clone(parent)),
        }))
    }
}

fn env_lookup(env: &EnvRef, name: &str) -> Option<Value> {
    let mut current = Rc::clone(env);
    loop {
        if let Some(value) = current.borrow().vars.get(name) {
            return Some(value.clone());
        }
        let parent = current.borrow().parent.clone();
        match parent {
            Some(p) => current = p,
            None => return None,
        }
    }
}

fn env_assign(env: &EnvRef, name: &str, value: Value) -> bool {
    let mut current = Rc::clone(env);
    loop {
        if current.borrow().vars.contains_key(name) {
            current.borrow_mut().vars.insert(name.to_string(), value);
            return true;
        }
        let parent = current.borrow().parent.clone();
        match parent {
            Some(p) => current = p,
            None => return false,
        }
    }
}

fn env_declare(env: &EnvRef, name: &str, value: Value) {
    env.borrow_mut().vars.insert(name.to_string(), value);
}

/// Declares a binding directly in `env`.
pub fn define(env: &EnvRef, name: &str, value: Value) {
    env_declare(env, name, value);
}

/// Formats an uncaught thrown value, `Error: message` style for error
/// objects.
#[must_use]
pub fn throw_message(value: &Value) -> String {
    if let Value::Object(map) = value {
        let map = map.borrow();
        if let Some(Value::Str(message)) = map.get("message") {
            let name = match map.get("name") {
                Some(Value::Str(n)) => n.clone(),
                _ => "Error".to_string(),
            };
            return format!("{name}: {message}");
        }
    }
    format!("Uncaught {}", js_to_string(value))
}

// ============================================================================
// Interpreter
// ============================================================================

/// The evaluator. One instance per sandbox run (and per check pass).
pub struct Interp {
    /// Global scope, shared by all modules of the run.
    pub globals: EnvRef,
    deadline: Option<Instant>,
    ops_until_check: u64,
    call_depth: u32,
}

impl Default for Interp {
    fn default() -> Self {
        Self::new()
    }
}

impl Interp {
    /// Creates an interpreter with empty globals and no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self {
            globals: Scope::root(),
            deadline: None,
            ops_until_check: DEADLINE_CHECK_INTERVAL,
            call_depth: 0,
        }
    }

    /// Arms the wall-clock budget. Evaluation past `deadline` fails with a
    /// timeout error at the next check.
    pub fn set_deadline(&mut self, deadline: Instant) {
        self.deadline = Some(deadline);
    }

    /// Defines (or replaces) a global binding.
    pub fn define_global(&mut self, name: &str, value: Value) {
        env_declare(&self.globals, name, value);
    }

    /// Reads a global binding.
    #[must_use]
    pub fn global(&self, name: &str) -> Option<Value> {
        env_lookup(&self.globals, name)
    }

    fn tick(&mut self) -> EvalResult<()> {
        self.ops_until_check -= 1;
        if self.ops_until_check == 0 {
            self.ops_until_check = DEADLINE_CHECK_INTERVAL;
            if let Some(deadline) = self.deadline {
                if Instant::now() >= deadline {
                    return Err(Flow::Error(EvalError::timeout()));
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    /// Executes a program in `env`, returning the value of the last
    /// expression statement (or `undefined`). A top-level `return` also
    /// yields its value, which check snippets use.
    pub fn exec_program(&mut self, stmts: &[Stmt], env: &EnvRef) -> EvalResult<Value> {
        match self.exec_stmts(stmts, env) {
            Ok(value) | Err(Flow::Return(value)) => Ok(value),
            Err(Flow::Break(span) | Flow::Continue(span)) => Err(runtime(
                "SyntaxError: illegal break/continue outside a loop",
                span,
            )),
            Err(other) => Err(other),
        }
    }

    fn exec_stmts(&mut self, stmts: &[Stmt], env: &EnvRef) -> EvalResult<Value> {
        // Function declarations are hoisted within their block.
        for stmt in stmts {
            if let Stmt::FuncDecl {
                name, params, body, ..
            } = stmt
            {
                let closure = Value::Function(Rc::new(Closure {
                    name: Some(name.clone()),
                    params: Rc::new(params.clone()),
                    body: Rc::new(ClosureBody::Block(body.clone())),
                    env: Rc::clone(env),
                }));
                env_declare(env, name, closure);
            }
        }
        let mut last = Value::Undefined;
        for stmt in stmts {
            last = self.exec_stmt(stmt, env)?;
        }
        Ok(last)
    }

    fn exec_stmt(&mut self, stmt: &Stmt, env: &EnvRef) -> EvalResult<Value> {
        self.tick()?;
        match stmt {
            Stmt::VarDecl {
                pattern,
                init,
                span,
                ..
            } => {
                let value = match init {
                    Some(expr) => self.eval_expr(expr, env)?,
                    None => Value::Undefined,
                };
                self.bind_pattern(pattern, value, env, *span)?;
                Ok(Value::Undefined)
            }
            Stmt::FuncDecl { .. } => Ok(Value::Undefined), // hoisted in exec_stmts
            Stmt::Return(value, _) => {
                let value = match value {
                    Some(expr) => self.eval_expr(expr, env)?,
                    None => Value::Undefined,
                };
                Err(Flow::Return(value))
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => {
                let cond = self.eval_expr(cond, env)?;
                if truthy(&cond) {
                    self.exec_stmt(then_branch, env)?;
                } else if let Some(else_branch) = else_branch {
                    self.exec_stmt(else_branch, env)?;
                }
                Ok(Value::Undefined)
            }
            Stmt::While { cond, body, .. } => {
                loop {
                    self.tick()?;
                    let test = self.eval_expr(cond, env)?;
                    if !truthy(&test) {
                        break;
                    }
                    match self.exec_stmt(body, env) {
                        Ok(_) | Err(Flow::Continue(_)) => {}
                        Err(Flow::Break(_)) => break,
                        Err(other) => return Err(other),
                    }
                }
                Ok(Value::Undefined)
            }
            Stmt::For {
                init,
                test,
                update,
                body,
                ..
            } => {
                let scope = Scope::child(env);
                if let Some(init) = init {
                    self.exec_stmt(init, &scope)?;
                }
                loop {
                    self.tick()?;
                    if let Some(test) = test {
                        let value = self.eval_expr(test, &scope)?;
                        if !truthy(&value) {
                            break;
                        }
                    }
                    match self.exec_stmt(body, &scope) {
                        Ok(_) | Err(Flow::Continue(_)) => {}
                        Err(Flow::Break(_)) => break,
                        Err(other) => return Err(other),
                    }
                    if let Some(update) = update {
                        self.eval_expr(update, &scope)?;
                    }
                }
                Ok(Value::Undefined)
            }
            Stmt::ForOf {
                pattern,
                iterable,
                body,
                span,
                ..
            } => {
                let iterable = self.eval_expr(iterable, env)?;
                let items = iterable_items(&iterable)
                    .ok_or_else(|| runtime("TypeError: value is not iterable", *span))?;
                for item in items {
                    self.tick()?;
                    let scope = Scope::child(env);
                    self.bind_pattern(pattern, item, &scope, *span)?;
                    match self.exec_stmt(body, &scope) {
                        Ok(_) | Err(Flow::Continue(_)) => {}
                        Err(Flow::Break(_)) => break,
                        Err(other) => return Err(other),
                    }
                }
                Ok(Value::Undefined)
            }
            Stmt::Throw(expr, span) => {
                let value = self.eval_expr(expr, env)?;
                Err(Flow::Throw(value, *span))
            }
            Stmt::Break(span) => Err(Flow::Break(*span)),
            Stmt::Continue(span) => Err(Flow::Continue(*span)),
            Stmt::Block(stmts) => {
                let scope = Scope::child(env);
                self.exec_stmts(stmts, &scope)?;
                Ok(Value::Undefined)
            }
            Stmt::Expr(expr) => self.eval_expr(expr, env),
        }
    }

    fn bind_pattern(
        &mut self,
        pattern: &Pattern,
        value: Value,
        env: &EnvRef,
        span: Span,
    ) -> EvalResult<()> {
        match pattern {
            Pattern::Ident(name) => {
                env_declare(env, name, value);
                Ok(())
            }
            Pattern::Array(elems) => {
                let items = iterable_items(&value).ok_or_else(|| {
                    runtime("TypeError: cannot destructure a non-iterable value", span)
                })?;
                for (i, elem) in elems.iter().enumerate() {
                    if let Some(sub) = elem {
                        let item = items.get(i).cloned().unwrap_or(Value::Undefined);
                        self.bind_pattern(sub, item, env, span)?;
                    }
                }
                Ok(())
            }
            Pattern::Object(props) => {
                let Value::Object(map) = &value else {
                    return Err(runtime(
                        "TypeError: cannot destructure a non-object value",
                        span,
                    ));
                };
                for (key, sub) in props {
                    let item = map.borrow().get(key).cloned().unwrap_or(Value::Undefined);
                    self.bind_pattern(sub, item, env, span)?;
                }
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    #[allow(clippy::too_many_lines)]
    fn eval_expr(&mut self, expr: &Expr, env: &EnvRef) -> EvalResult<Value> {
        self.tick()?;
        match expr {
            Expr::Number(n, _) => Ok(Value::Number(*n)),
            Expr::Str(s, _) => Ok(Value::Str(s.clone())),
            Expr::Bool(b, _) => Ok(Value::Bool(*b)),
            Expr::Null(_) => Ok(Value::Null),
            Expr::Undefined(_) => Ok(Value::Undefined),
            Expr::Ident(name, span) => env_lookup(env, name)
                .ok_or_else(|| runtime(format!("ReferenceError: {name} is not defined"), *span)),
            Expr::Template(chunks, _) => {
                let mut out = String::new();
                for chunk in chunks {
                    match chunk {
                        TplChunk::Text(t) => out.push_str(t),
                        TplChunk::Expr(e) => {
                            let value = self.eval_expr(e, env)?;
                            out.push_str(&js_to_string(&value));
                        }
                    }
                }
                Ok(Value::Str(out))
            }
            Expr::Array(elems, span) => {
                let mut items = Vec::new();
                for elem in elems {
                    match elem {
                        ArrayElem::Item(e) => items.push(self.eval_expr(e, env)?),
                        ArrayElem::Spread(e) => {
                            let value = self.eval_expr(e, env)?;
                            let spread = iterable_items(&value).ok_or_else(|| {
                                runtime("TypeError: spread of a non-iterable value", *span)
                            })?;
                            items.extend(spread);
                        }
                    }
                }
                Ok(Value::array(items))
            }
            Expr::Object(props, span) => {
                let mut map = IndexMap::new();
                for prop in props {
                    match prop {
                        ObjProp::KeyValue(key, e) => {
                            map.insert(key.clone(), self.eval_expr(e, env)?);
                        }
                        ObjProp::Shorthand(key, key_span) => {
                            let value = env_lookup(env, key).ok_or_else(|| {
                                runtime(format!("ReferenceError: {key} is not defined"), *key_span)
                            })?;
                            map.insert(key.clone(), value);
                        }
                        ObjProp::Spread(e) => {
                            let value = self.eval_expr(e, env)?;
                            match value {
                                Value::Object(src) => {
                                    for (k, v) in src.borrow().iter() {
                                        map.insert(k.clone(), v.clone());
                                    }
                                }
                                Value::Undefined | Value::Null => {}
                                _ => {
                                    return Err(runtime(
                                        "TypeError: spread of a non-object value",
                                        *span,
                                    ));
                                }
                            }
                        }
                    }
                }
                Ok(Value::object(map))
            }
            Expr::Arrow { params, body, .. } => {
                let body = match body {
                    ArrowBody::Expr(e) => ClosureBody::Expr((**e).clone()),
                    ArrowBody::Block(stmts) => ClosureBody::Block(stmts.clone()),
                };
                Ok(Value::Function(Rc::new(Closure {
                    name: None,
                    params: Rc::new(params.clone()),
                    body: Rc::new(body),
                    env: Rc::clone(env),
                })))
            }
            Expr::FuncExpr {
                name, params, body, ..
            } => Ok(Value::Function(Rc::new(Closure {
                name: name.clone(),
                params: Rc::new(params.clone()),
                body: Rc::new(ClosureBody::Block(body.clone())),
                env: Rc::clone(env),
            }))),
            Expr::Call { callee, args, span } => self.eval_call(callee, args, env, *span),
            Expr::New { callee, args, span } => {
                let ctor = self.eval_expr(callee, env)?;
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval_expr(arg, env)?);
                }
                match ctor {
                    Value::Native(_) | Value::Function(_) => {
                        self.call_value(&ctor, &values, *span)
                    }
                    _ => Err(runtime("TypeError: value is not a constructor", *span)),
                }
            }
            Expr::Member {
                object,
                property,
                optional,
                span,
            } => {
                let object = self.eval_expr(object, env)?;
                if *optional && object.is_nullish() {
                    return Ok(Value::Undefined);
                }
                match property {
                    MemberProp::Static(name) => self.property_of(&object, name, *span),
                    MemberProp::Computed(key) => {
                        let key = self.eval_expr(key, env)?;
                        self.computed_property(&object, &key, *span)
                    }
                }
            }
            Expr::Assign {
                target, op, value, ..
            } => self.eval_assign(target, *op, value, env),
            Expr::Binary {
                op,
                left,
                right,
                span,
            } => {
                let left = self.eval_expr(left, env)?;
                let right = self.eval_expr(right, env)?;
                Ok(apply_binary(*op, &left, &right, *span))
            }
            Expr::Logical {
                op, left, right, ..
            } => {
                let left = self.eval_expr(left, env)?;
                let take_right = match op {
                    LogicalOp::And => truthy(&left),
                    LogicalOp::Or => !truthy(&left),
                    LogicalOp::Nullish => left.is_nullish(),
                };
                if take_right {
                    self.eval_expr(right, env)
                } else {
                    Ok(left)
                }
            }
            Expr::Unary { op, expr, .. } => {
                // `typeof x` never throws on an undeclared name.
                if let (UnOp::Typeof, Expr::Ident(name, _)) = (op, expr.as_ref()) {
                    return Ok(match env_lookup(env, name) {
                        Some(value) => Value::str(value.type_of()),
                        None => Value::str("undefined"),
                    });
                }
                let value = self.eval_expr(expr, env)?;
                Ok(match op {
                    UnOp::Not => Value::Bool(!truthy(&value)),
                    UnOp::Neg => Value::Number(-to_number(&value)),
                    UnOp::Pos => Value::Number(to_number(&value)),
                    UnOp::Typeof => Value::str(value.type_of()),
                })
            }
            Expr::Cond {
                test, cons, alt, ..
            } => {
                let test = self.eval_expr(test, env)?;
                if truthy(&test) {
                    self.eval_expr(cons, env)
                } else {
                    self.eval_expr(alt, env)
                }
            }
        }
    }

    fn eval_assign(
        &mut self,
        target: &Expr,
        op: AssignOp,
        value: &Expr,
        env: &EnvRef,
    ) -> EvalResult<Value> {
        let rhs = self.eval_expr(value, env)?;
        match target {
            Expr::Ident(name, span) => {
                let new = match op {
                    AssignOp::Assign => rhs,
                    AssignOp::AddAssign | AssignOp::SubAssign => {
                        let current = env_lookup(env, name).ok_or_else(|| {
                            runtime(format!("ReferenceError: {name} is not defined"), *span)
                        })?;
                        compound(op, &current, &rhs)
                    }
                };
                if env_assign(env, name, new.clone()) {
                    Ok(new)
                } else {
                    Err(runtime(
                        format!("ReferenceError: {name} is not defined"),
                        *span,
                    ))
                }
            }
            Expr::Member {
                object,
                property,
                span,
                ..
            } => {
                let object = self.eval_expr(object, env)?;
                let key = match property {
                    MemberProp::Static(name) => PropKey::Name(name.clone()),
                    MemberProp::Computed(key_expr) => {
                        let key = self.eval_expr(key_expr, env)?;
                        match key {
                            Value::Number(n) => PropKey::Index(n),
                            other => PropKey::Name(js_to_string(&other)),
                        }
                    }
                };
                let new = match op {
                    AssignOp::Assign => rhs,
                    AssignOp::AddAssign | AssignOp::SubAssign => {
                        let current = self.read_prop(&object, &key, *span)?;
                        compound(op, &current, &rhs)
                    }
                };
                write_prop(&object, &key, new.clone(), *span)?;
                Ok(new)
            }
            _ => {
                // The parser rejects other targets; defensive fallthrough.
                Err(runtime("SyntaxError: invalid assignment target", target.span()))
            }
        }
    }

    fn read_prop(&mut self, object: &Value, key: &PropKey, span: Span) -> EvalResult<Value> {
        match key {
            PropKey::Name(name) => self.property_of(object, name, span),
            PropKey::Index(n) => self.computed_property(object, &Value::Number(*n), span),
        }
    }

    fn eval_call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        env: &EnvRef,
        span: Span,
    ) -> EvalResult<Value> {
        let mut values = Vec::with_capacity(args.len());

        // Method-style calls dispatch on the receiver so array and string
        // builtins work without a prototype chain.
        if let Expr::Member {
            object,
            property: MemberProp::Static(name),
            optional,
            ..
        } = callee
        {
            let receiver = self.eval_expr(object, env)?;
            if *optional && receiver.is_nullish() {
                return Ok(Value::Undefined);
            }
            for arg in args {
                values.push(self.eval_expr(arg, env)?);
            }
            // Explicit properties win over builtin methods.
            if let Value::Object(map) = &receiver {
                let found = map.borrow().get(name).cloned();
                if let Some(func) = found {
                    return self.call_value(&func, &values, span);
                }
            }
            return self.call_method(&receiver, name, &values, span);
        }

        let callee = self.eval_expr(callee, env)?;
        for arg in args {
            values.push(self.eval_expr(arg, env)?);
        }
        self.call_value(&callee, &values, span)
    }

    /// Invokes a callable value with `args`.
    pub fn call_value(&mut self, callee: &Value, args: &[Value], span: Span) -> EvalResult<Value> {
        self.tick()?;
        match callee {
            Value::Native(f) => {
                let f = Rc::clone(f);
                (f.call)(self, args)
            }
            Value::Function(closure) => {
                if self.call_depth >= MAX_CALL_DEPTH {
                    return Err(runtime(
                        "RangeError: maximum call stack size exceeded",
                        span,
                    ));
                }
                self.call_depth += 1;
                let closure = Rc::clone(closure);
                let scope = Scope::child(&closure.env);
                let mut result = Ok(Value::Undefined);
                for (i, param) in closure.params.iter().enumerate() {
                    let arg = args.get(i).cloned().unwrap_or(Value::Undefined);
                    if let Err(flow) = self.bind_pattern(param, arg, &scope, span) {
                        result = Err(flow);
                        break;
                    }
                }
                if result.is_ok() {
                    result = match closure.body.as_ref() {
                        ClosureBody::Expr(e) => self.eval_expr(e, &scope),
                        ClosureBody::Block(stmts) => {
                            self.exec_stmts(stmts, &scope).map(|_| Value::Undefined)
                        }
                    };
                }
                self.call_depth -= 1;
                match result {
                    Err(Flow::Return(value)) => Ok(value),
                    other => other,
                }
            }
            other => Err(runtime(
                format!("TypeError: {} is not a function", js_to_string(other)),
                span,
            )),
        }
    }

    // ------------------------------------------------------------------
    // Property access
    // ------------------------------------------------------------------

    #[allow(clippy::cast_precision_loss)]
    fn property_of(&mut self, object: &Value, name: &str, span: Span) -> EvalResult<Value> {
        match object {
            Value::Object(map) => Ok(map.borrow().get(name).cloned().unwrap_or(Value::Undefined)),
            Value::Array(items) => match name {
                "length" => Ok(Value::Number(items.borrow().len() as f64)),
                _ => Ok(Value::Undefined),
            },
            Value::Str(s) => match name {
                "length" => Ok(Value::Number(s.chars().count() as f64)),
                _ => Ok(Value::Undefined),
            },
            Value::Element(element) => match name {
                "type" => Ok(match &element.tag {
                    ElementTag::Host(tag) => Value::str(tag.clone()),
                    ElementTag::Component(func) => func.clone(),
                    ElementTag::Fragment => Value::str("Fragment"),
                }),
                "props" => Ok(Value::Object(Rc::clone(&element.props))),
                _ => Ok(Value::Undefined),
            },
            Value::Undefined | Value::Null => Err(runtime(
                format!(
                    "TypeError: cannot read properties of {} (reading '{name}')",
                    js_to_string(object)
                ),
                span,
            )),
            _ => Ok(Value::Undefined),
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn computed_property(&mut self, object: &Value, key: &Value, span: Span) -> EvalResult<Value> {
        match (object, key) {
            (Value::Array(items), Value::Number(n)) => {
                if n.fract() != 0.0 || *n < 0.0 {
                    return Ok(Value::Undefined);
                }
                Ok(items
                    .borrow()
                    .get(*n as usize)
                    .cloned()
                    .unwrap_or(Value::Undefined))
            }
            (Value::Str(s), Value::Number(n)) => {
                if n.fract() != 0.0 || *n < 0.0 {
                    return Ok(Value::Undefined);
                }
                Ok(s.chars()
                    .nth(*n as usize)
                    .map_or(Value::Undefined, |c| Value::str(c.to_string())))
            }
            _ => self.property_of(object, &js_to_string(key), span),
        }
    }
}

/// A property key, already evaluated.
enum PropKey {
    Name(String),
    Index(f64),
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn write_prop(object: &Value, key: &PropKey, value: Value, span: Span) -> EvalResult<()> {
    match (object, key) {
        (Value::Object(map), PropKey::Name(name)) => {
            map.borrow_mut().insert(name.clone(), value);
            Ok(())
        }
        (Value::Object(map), PropKey::Index(n)) => {
            map.borrow_mut().insert(format_number(*n), value);
            Ok(())
        }
        (Value::Array(items), PropKey::Index(n)) => {
            if n.fract() != 0.0 || *n < 0.0 {
                return Err(runtime("TypeError: invalid array index", span));
            }
            let idx = *n as usize;
            let mut items = items.borrow_mut();
            if idx >= items.len() {
                items.resize(idx + 1, Value::Undefined);
            }
            items[idx] = value;
            Ok(())
        }
        _ => Err(runtime(
            "TypeError: cannot assign a property on this value",
            span,
        )),
    }
}

/// Materializes the items an iterable yields, or `None` if not iterable.
fn iterable_items(value: &Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => Some(items.borrow().clone()),
        Value::Str(s) => Some(s.chars().map(|c| Value::str(c.to_string())).collect()),
        _ => None,
    }
}

fn compound(op: AssignOp, current: &Value, rhs: &Value) -> Value {
    match op {
        AssignOp::SubAssign => Value::Number(to_number(current) - to_number(rhs)),
        // `+=` follows `+`: string on either side concatenates.
        AssignOp::Assign | AssignOp::AddAssign => add_values(current, rhs),
    }
}

fn add_values(left: &Value, right: &Value) -> Value {
    if matches!(left, Value::Str(_))
        || matches!(right, Value::Str(_))
        || matches!(left, Value::Array(_) | Value::Object(_))
        || matches!(right, Value::Array(_) | Value::Object(_))
    {
        Value::Str(format!("{}{}", js_to_string(left), js_to_string(right)))
    } else {
        Value::Number(to_number(left) + to_number(right))
    }
}

fn apply_binary(op: BinOp, left: &Value, right: &Value, _span: Span) -> Value {
    match op {
        BinOp::Add => add_values(left, right),
        BinOp::Sub => Value::Number(to_number(left) - to_number(right)),
        BinOp::Mul => Value::Number(to_number(left) * to_number(right)),
        BinOp::Div => Value::Number(to_number(left) / to_number(right)),
        BinOp::Rem => Value::Number(to_number(left) % to_number(right)),
        BinOp::EqStrict => Value::Bool(strict_eq(left, right)),
        BinOp::NeStrict => Value::Bool(!strict_eq(left, right)),
        BinOp::EqLoose => Value::Bool(loose_eq(left, right)),
        BinOp::NeLoose => Value::Bool(!loose_eq(left, right)),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let result = if let (Value::Str(a), Value::Str(b)) = (left, right) {
                match op {
                    BinOp::Lt => a < b,
                    BinOp::Le => a <= b,
                    BinOp::Gt => a > b,
                    _ => a >= b,
                }
            } else {
                let (a, b) = (to_number(left), to_number(right));
                match op {
                    BinOp::Lt => a < b,
                    BinOp::Le => a <= b,
                    BinOp::Gt => a > b,
                    _ => a >= b,
                }
            };
            Value::Bool(result)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::parser::parse_program;

    fn eval(source: &str) -> Value {
        let mut interp = Interp::new();
        crate::builtins::install(&mut interp, Rc::new(RefCell::new(crate::events::EventLog::new())));
        let stmts = parse_program(source).unwrap();
        let env = Scope::child(&interp.globals);
        interp.exec_program(&stmts, &env).unwrap()
    }

    fn eval_err(source: &str) -> Flow {
        let mut interp = Interp::new();
        crate::builtins::install(&mut interp, Rc::new(RefCell::new(crate::events::EventLog::new())));
        let stmts = parse_program(source).unwrap();
        let env = Scope::child(&interp.globals);
        interp.exec_program(&stmts, &env).unwrap_err()
    }

    fn as_number(value: &Value) -> f64 {
        match value {
            Value::Number(n) => *n,
            other => panic!("expected number, got {other:?}"),
        }
    }

    fn as_str(value: &Value) -> String {
        match value {
            Value::Str(s) => s.clone(),
            other => panic!("expected string, got {other:?}"),
        }
    }

    #[test]
    fn test_arithmetic_and_precedence() {
        assert_eq!(as_number(&eval("1 + 2 * 3;")), 7.0);
        assert_eq!(as_number(&eval("(1 + 2) * 3;")), 9.0);
        assert_eq!(as_number(&eval("10 % 4;")), 2.0);
    }

    #[test]
    fn test_string_concat_rules() {
        assert_eq!(as_str(&eval(r#""a" + 1;"#)), "a1");
        assert_eq!(as_number(&eval(r#""3" * 2;"#)), 6.0);
    }

    #[test]
    fn test_closures_capture_environment() {
        let v = eval(
            "function makeCounter() {\n  let n = 0;\n  return () => { n += 1; return n; };\n}\nconst c = makeCounter();\nc();\nc();\nc();",
        );
        assert_eq!(as_number(&v), 3.0);
    }

    #[test]
    fn test_destructuring_in_params_and_decls() {
        let v = eval("const f = ({ a, b }) => a + b; f({ a: 2, b: 3 });");
        assert_eq!(as_number(&v), 5.0);
        let v = eval("const [x, , z] = [1, 2, 3]; x + z;");
        assert_eq!(as_number(&v), 4.0);
    }

    #[test]
    fn test_array_methods() {
        assert_eq!(
            as_str(&eval("[1, 2, 3].map(x => x * 2).join(\"-\");")),
            "2-4-6"
        );
        assert_eq!(
            as_number(&eval("[1, 2, 3, 4].filter(x => x % 2 === 0).length;")),
            2.0
        );
        assert_eq!(
            as_number(&eval("[1, 2, 3].reduce((acc, x) => acc + x, 10);")),
            16.0
        );
        assert_eq!(as_number(&eval("const a = [1]; a.push(2); a.length;")), 2.0);
    }

    #[test]
    fn test_string_methods() {
        assert_eq!(as_str(&eval(r#""hello".toUpperCase();"#)), "HELLO");
        assert_eq!(as_number(&eval(r#""a,b,c".split(",").length;"#)), 3.0);
        let v = eval(r#""hello world".includes("world");"#);
        assert!(matches!(v, Value::Bool(true)));
    }

    #[test]
    fn test_template_literals() {
        assert_eq!(as_str(&eval("const n = 41; `n = ${n + 1}`;")), "n = 42");
    }

    #[test]
    fn test_equality() {
        assert!(matches!(eval("1 === 1;"), Value::Bool(true)));
        assert!(matches!(eval(r#"1 === "1";"#), Value::Bool(false)));
        assert!(matches!(eval(r#"1 == "1";"#), Value::Bool(true)));
        assert!(matches!(eval("null == undefined;"), Value::Bool(true)));
        assert!(matches!(eval("null === undefined;"), Value::Bool(false)));
        assert!(matches!(
            eval("const a = [1]; const b = [1]; a === b;"),
            Value::Bool(false)
        ));
        assert!(matches!(
            eval("const a = [1]; const b = a; a === b;"),
            Value::Bool(true)
        ));
    }

    #[test]
    fn test_optional_chaining_and_nullish() {
        assert!(matches!(eval("const o = null; o?.x;"), Value::Undefined));
        assert_eq!(as_number(&eval("const v = null; v ?? 7;")), 7.0);
        assert_eq!(as_number(&eval("const v = 0; v ?? 7;")), 0.0);
    }

    #[test]
    fn test_undefined_variable_is_reference_error() {
        let Flow::Error(err) = eval_err("nope + 1;") else {
            panic!("expected error flow");
        };
        assert!(err.message.contains("nope is not defined"));
        assert_eq!(err.span.map(|s| s.line), Some(1));
    }

    #[test]
    fn test_throw_carries_value_and_span() {
        let Flow::Throw(value, span) = eval_err("\nthrow new Error(\"boom\");") else {
            panic!("expected throw flow");
        };
        assert_eq!(span.line, 2);
        let Value::Object(map) = value else {
            panic!("expected error object");
        };
        assert_eq!(as_str(map.borrow().get("message").unwrap()), "boom");
    }

    #[test]
    fn test_deadline_stops_runaway_loop() {
        let mut interp = Interp::new();
        interp.set_deadline(Instant::now() + std::time::Duration::from_millis(20));
        let stmts = parse_program("let i = 0; while (i >= 0) { i += 1; }").unwrap();
        let env = Scope::child(&interp.globals);
        let Flow::Error(err) = interp.exec_program(&stmts, &env).unwrap_err() else {
            panic!("expected error flow");
        };
        assert!(err.timeout);
    }

    #[test]
    fn test_call_depth_limit() {
        let Flow::Error(err) = eval_err("function f() { return f(); } f();") else {
            panic!("expected error flow");
        };
        assert!(err.message.contains("call stack"));
    }

    #[test]
    fn test_typeof_undeclared() {
        assert_eq!(as_str(&eval("typeof nothing;")), "undefined");
        assert_eq!(as_str(&eval("typeof \"x\";")), "string");
        assert_eq!(as_str(&eval("typeof (() => 1);")), "function");
    }

    #[test]
    fn test_for_of_and_spread() {
        let v = eval("let sum = 0; for (const x of [1, 2, 3]) { sum += x; } sum;");
        assert_eq!(as_number(&v), 6.0);
        let v = eval("const a = [1, 2]; const b = [...a, 3]; b.length;");
        assert_eq!(as_number(&v), 3.0);
        let v = eval("const o = { a: 1 }; const p = { ...o, b: 2 }; p.a + p.b;");
        assert_eq!(as_number(&v), 3.0);
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(42.0), "42");
        assert_eq!(format_number(-3.0), "-3");
        assert_eq!(format_number(1.5), "1.5");
        assert_eq!(format_number(0.0), "0");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::INFINITY), "Infinity");
    }

    #[test]
    fn test_format_value_top_level_string_is_bare() {
        assert_eq!(format_value(&Value::str("hello")), "hello");
        assert_eq!(format_value(&Value::Number(42.0)), "42");
        assert_eq!(
            format_value(&Value::array(vec![Value::Number(1.0), Value::str("a")])),
            "[1, \"a\"]"
        );
    }

    #[test]
    fn test_member_assignment_extends_array() {
        let v = eval("const a = []; a[2] = 9; a.length;");
        assert_eq!(as_number(&v), 3.0);
    }

    #[test]
    fn test_object_method_call_prefers_own_property() {
        let v = eval("const o = { length: () => 5 }; o.length();");
        assert_eq!(as_number(&v), 5.0);
    }
}
