//! Global bindings and builtin methods available to sandboxed code.
//!
//! There is no prototype chain; method calls dispatch on the receiver's
//! runtime type. The surface covers what lesson code actually uses:
//! `console`, `Math`, `JSON`, `Object`, `Array`, `Error`, and the usual
//! array/string methods.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::events::{EventLog, LogLevel};
use crate::interp::{
    format_number, format_value, js_to_string, native, strict_eq, to_number, truthy, EvalError,
    EvalResult, Flow, Interp, Value,
};
use crate::lexer::Span;

/// Shared handle to the run's console buffer.
pub type ConsoleSink = Rc<RefCell<EventLog>>;

fn anon_error(message: impl Into<String>) -> Flow {
    Flow::Error(EvalError::unlocated(message))
}

fn error_object(message: &str) -> Value {
    let mut map = IndexMap::new();
    map.insert("name".to_string(), Value::str("Error"));
    map.insert("message".to_string(), Value::str(message));
    Value::object(map)
}

/// Installs the global bindings into `interp`, wiring console output to
/// `sink`.
pub fn install(interp: &mut Interp, sink: ConsoleSink) {
    interp.define_global("console", console_object(&sink));
    interp.define_global("Math", math_object());
    interp.define_global("JSON", json_object());
    interp.define_global("Object", object_namespace());
    interp.define_global("Array", array_namespace());
    interp.define_global("NaN", Value::Number(f64::NAN));
    interp.define_global("Infinity", Value::Number(f64::INFINITY));

    interp.define_global(
        "Error",
        native("Error", |_, args| {
            let message = args.first().map(js_to_string).unwrap_or_default();
            Ok(error_object(&message))
        }),
    );
    interp.define_global(
        "String",
        native("String", |_, args| {
            Ok(Value::Str(
                args.first().map(js_to_string).unwrap_or_default(),
            ))
        }),
    );
    interp.define_global(
        "Number",
        native("Number", |_, args| {
            Ok(Value::Number(args.first().map_or(0.0, to_number)))
        }),
    );
    interp.define_global(
        "Boolean",
        native("Boolean", |_, args| {
            Ok(Value::Bool(args.first().is_some_and(truthy)))
        }),
    );
    interp.define_global(
        "isNaN",
        native("isNaN", |_, args| {
            Ok(Value::Bool(args.first().map_or(f64::NAN, to_number).is_nan()))
        }),
    );
}

fn console_object(sink: &ConsoleSink) -> Value {
    let mut map = IndexMap::new();
    for (name, level) in [
        ("log", LogLevel::Log),
        ("warn", LogLevel::Warn),
        ("error", LogLevel::Error),
    ] {
        let sink = Rc::clone(sink);
        map.insert(
            name.to_string(),
            native(name, move |_, args| {
                let message = args
                    .iter()
                    .map(format_value)
                    .collect::<Vec<_>>()
                    .join(" ");
                sink.borrow_mut().push(level, message);
                Ok(Value::Undefined)
            }),
        );
    }
    Value::object(map)
}

fn math_object() -> Value {
    fn unary(name: &'static str, f: fn(f64) -> f64) -> (String, Value) {
        (
            name.to_string(),
            native(name, move |_, args| {
                Ok(Value::Number(f(args.first().map_or(f64::NAN, to_number))))
            }),
        )
    }

    let mut map = IndexMap::new();
    map.insert("PI".to_string(), Value::Number(std::f64::consts::PI));
    map.insert("E".to_string(), Value::Number(std::f64::consts::E));
    for entry in [
        unary("floor", f64::floor),
        unary("ceil", f64::ceil),
        unary("round", f64::round),
        unary("trunc", f64::trunc),
        unary("abs", f64::abs),
        unary("sqrt", f64::sqrt),
        unary("sign", f64::signum),
    ] {
        map.insert(entry.0, entry.1);
    }
    map.insert(
        "pow".to_string(),
        native("pow", |_, args| {
            let base = args.first().map_or(f64::NAN, to_number);
            let exp = args.get(1).map_or(f64::NAN, to_number);
            Ok(Value::Number(base.powf(exp)))
        }),
    );
    map.insert(
        "min".to_string(),
        native("min", |_, args| {
            Ok(Value::Number(
                args.iter().map(to_number).fold(f64::INFINITY, f64::min),
            ))
        }),
    );
    map.insert(
        "max".to_string(),
        native("max", |_, args| {
            Ok(Value::Number(
                args.iter()
                    .map(to_number)
                    .fold(f64::NEG_INFINITY, f64::max),
            ))
        }),
    );
    Value::object(map)
}

fn json_object() -> Value {
    let mut map = IndexMap::new();
    map.insert(
        "stringify".to_string(),
        native("stringify", |_, args| {
            Ok(match args.first() {
                Some(value) => {
                    json_stringify(value, 0).map_or(Value::Undefined, Value::Str)
                }
                None => Value::Undefined,
            })
        }),
    );
    map.insert(
        "parse".to_string(),
        native("parse", |_, args| {
            let text = args.first().map(js_to_string).unwrap_or_default();
            let parsed: serde_json::Value = serde_json::from_str(&text)
                .map_err(|e| anon_error(format!("SyntaxError: invalid JSON: {e}")))?;
            Ok(from_json(&parsed))
        }),
    );
    Value::object(map)
}

fn json_stringify(value: &Value, depth: usize) -> Option<String> {
    if depth > 32 {
        return Some("null".to_string());
    }
    match value {
        Value::Undefined | Value::Function(_) | Value::Native(_) => None,
        Value::Null | Value::Element(_) => Some("null".to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(if n.is_finite() {
            format_number(*n)
        } else {
            "null".to_string()
        }),
        Value::Str(s) => serde_json::to_string(s).ok(),
        Value::Array(items) => {
            let parts = items
                .borrow()
                .iter()
                .map(|v| json_stringify(v, depth + 1).unwrap_or_else(|| "null".to_string()))
                .collect::<Vec<_>>();
            Some(format!("[{}]", parts.join(",")))
        }
        Value::Object(map) => {
            let mut parts = Vec::new();
            for (k, v) in map.borrow().iter() {
                if let Some(rendered) = json_stringify(v, depth + 1) {
                    let key = serde_json::to_string(k).ok()?;
                    parts.push(format!("{key}:{rendered}"));
                }
            }
            Some(format!("{{{}}}", parts.join(",")))
        }
    }
}

fn from_json(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::str(s.clone()),
        serde_json::Value::Array(items) => Value::array(items.iter().map(from_json).collect()),
        serde_json::Value::Object(map) => Value::object(
            map.iter()
                .map(|(k, v)| (k.clone(), from_json(v)))
                .collect(),
        ),
    }
}

fn object_namespace() -> Value {
    let mut map = IndexMap::new();
    map.insert(
        "keys".to_string(),
        native("keys", |_, args| {
            Ok(match args.first() {
                Some(Value::Object(map)) => Value::array(
                    map.borrow().keys().map(|k| Value::str(k.clone())).collect(),
                ),
                _ => Value::array(Vec::new()),
            })
        }),
    );
    map.insert(
        "values".to_string(),
        native("values", |_, args| {
            Ok(match args.first() {
                Some(Value::Object(map)) => {
                    Value::array(map.borrow().values().cloned().collect())
                }
                _ => Value::array(Vec::new()),
            })
        }),
    );
    map.insert(
        "entries".to_string(),
        native("entries", |_, args| {
            Ok(match args.first() {
                Some(Value::Object(map)) => Value::array(
                    map.borrow()
                        .iter()
                        .map(|(k, v)| Value::array(vec![Value::str(k.clone()), v.clone()]))
                        .collect(),
                ),
                _ => Value::array(Vec::new()),
            })
        }),
    );
    map.insert(
        "assign".to_string(),
        native("assign", |_, args| {
            let Some(Value::Object(target)) = args.first() else {
                return Err(anon_error("TypeError: Object.assign target must be an object"));
            };
            for src in args.iter().skip(1) {
                if let Value::Object(src) = src {
                    for (k, v) in src.borrow().iter() {
                        target.borrow_mut().insert(k.clone(), v.clone());
                    }
                }
            }
            Ok(Value::Object(Rc::clone(target)))
        }),
    );
    Value::object(map)
}

fn array_namespace() -> Value {
    let mut map = IndexMap::new();
    map.insert(
        "isArray".to_string(),
        native("isArray", |_, args| {
            Ok(Value::Bool(matches!(args.first(), Some(Value::Array(_)))))
        }),
    );
    map.insert(
        "from".to_string(),
        native("from", |interp, args| {
            let items = match args.first() {
                Some(Value::Array(items)) => items.borrow().clone(),
                Some(Value::Str(s)) => s.chars().map(|c| Value::str(c.to_string())).collect(),
                _ => Vec::new(),
            };
            match args.get(1) {
                Some(mapper @ (Value::Function(_) | Value::Native(_))) => {
                    let mut out = Vec::with_capacity(items.len());
                    for (i, item) in items.into_iter().enumerate() {
                        #[allow(clippy::cast_precision_loss)]
                        let mapped = interp.call_value(
                            mapper,
                            &[item, Value::Number(i as f64)],
                            Span::new(0, 0),
                        )?;
                        out.push(mapped);
                    }
                    Ok(Value::array(out))
                }
                _ => Ok(Value::array(items)),
            }
        }),
    );
    Value::object(map)
}

// ============================================================================
// Method dispatch
// ============================================================================

impl Interp {
    /// Dispatches a builtin method call on `receiver`.
    pub(crate) fn call_method(
        &mut self,
        receiver: &Value,
        name: &str,
        args: &[Value],
        span: Span,
    ) -> EvalResult<Value> {
        match receiver {
            Value::Array(_) => self.array_method(receiver, name, args, span),
            Value::Str(s) => string_method(&s.clone(), name, args, span),
            Value::Number(n) => number_method(*n, name, args, span),
            Value::Bool(b) => match name {
                "toString" => Ok(Value::str(b.to_string())),
                _ => Err(not_a_function(receiver, name, span)),
            },
            Value::Object(_) => match name {
                "toString" => Ok(Value::str("[object Object]")),
                "hasOwnProperty" => {
                    let key = args.first().map(js_to_string).unwrap_or_default();
                    let Value::Object(map) = receiver else {
                        return Ok(Value::Bool(false));
                    };
                    Ok(Value::Bool(map.borrow().contains_key(&key)))
                }
                _ => Err(not_a_function(receiver, name, span)),
            },
            _ => Err(not_a_function(receiver, name, span)),
        }
    }

    #[allow(
        clippy::too_many_lines,
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn array_method(
        &mut self,
        receiver: &Value,
        name: &str,
        args: &[Value],
        span: Span,
    ) -> EvalResult<Value> {
        let Value::Array(array) = receiver else {
            return Err(not_a_function(receiver, name, span));
        };
        let array = Rc::clone(array);
        match name {
            "push" => {
                let mut items = array.borrow_mut();
                items.extend(args.iter().cloned());
                Ok(Value::Number(items.len() as f64))
            }
            "pop" => Ok(array.borrow_mut().pop().unwrap_or(Value::Undefined)),
            "shift" => {
                let mut items = array.borrow_mut();
                if items.is_empty() {
                    Ok(Value::Undefined)
                } else {
                    Ok(items.remove(0))
                }
            }
            "unshift" => {
                let mut items = array.borrow_mut();
                for (i, arg) in args.iter().enumerate() {
                    items.insert(i, arg.clone());
                }
                Ok(Value::Number(items.len() as f64))
            }
            "map" => {
                let callback = callback_arg(args, "map", span)?;
                let snapshot = array.borrow().clone();
                let mut out = Vec::with_capacity(snapshot.len());
                for (i, item) in snapshot.into_iter().enumerate() {
                    out.push(self.call_value(
                        &callback,
                        &[item, Value::Number(i as f64)],
                        span,
                    )?);
                }
                Ok(Value::array(out))
            }
            "filter" => {
                let callback = callback_arg(args, "filter", span)?;
                let snapshot = array.borrow().clone();
                let mut out = Vec::new();
                for (i, item) in snapshot.into_iter().enumerate() {
                    let keep = self.call_value(
                        &callback,
                        &[item.clone(), Value::Number(i as f64)],
                        span,
                    )?;
                    if truthy(&keep) {
                        out.push(item);
                    }
                }
                Ok(Value::array(out))
            }
            "forEach" => {
                let callback = callback_arg(args, "forEach", span)?;
                let snapshot = array.borrow().clone();
                for (i, item) in snapshot.into_iter().enumerate() {
                    self.call_value(&callback, &[item, Value::Number(i as f64)], span)?;
                }
                Ok(Value::Undefined)
            }
            "reduce" => {
                let callback = callback_arg(args, "reduce", span)?;
                let snapshot = array.borrow().clone();
                let mut iter = snapshot.into_iter().enumerate();
                let mut acc = match args.get(1) {
                    Some(init) => init.clone(),
                    None => match iter.next() {
                        Some((_, first)) => first,
                        None => {
                            return Err(Flow::Error(EvalError::new(
                                "TypeError: reduce of empty array with no initial value",
                                span,
                            )));
                        }
                    },
                };
                for (i, item) in iter {
                    acc = self.call_value(
                        &callback,
                        &[acc, item, Value::Number(i as f64)],
                        span,
                    )?;
                }
                Ok(acc)
            }
            "find" | "findIndex" => {
                let callback = callback_arg(args, name, span)?;
                let snapshot = array.borrow().clone();
                for (i, item) in snapshot.into_iter().enumerate() {
                    let hit = self.call_value(
                        &callback,
                        &[item.clone(), Value::Number(i as f64)],
                        span,
                    )?;
                    if truthy(&hit) {
                        return Ok(if name == "find" {
                            item
                        } else {
                            Value::Number(i as f64)
                        });
                    }
                }
                Ok(if name == "find" {
                    Value::Undefined
                } else {
                    Value::Number(-1.0)
                })
            }
            "some" | "every" => {
                let callback = callback_arg(args, name, span)?;
                let snapshot = array.borrow().clone();
                for (i, item) in snapshot.into_iter().enumerate() {
                    let hit = self.call_value(
                        &callback,
                        &[item, Value::Number(i as f64)],
                        span,
                    )?;
                    if name == "some" && truthy(&hit) {
                        return Ok(Value::Bool(true));
                    }
                    if name == "every" && !truthy(&hit) {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(name == "every"))
            }
            "includes" => {
                let target = args.first().cloned().unwrap_or(Value::Undefined);
                Ok(Value::Bool(
                    array.borrow().iter().any(|v| strict_eq(v, &target)),
                ))
            }
            "indexOf" => {
                let target = args.first().cloned().unwrap_or(Value::Undefined);
                Ok(array
                    .borrow()
                    .iter()
                    .position(|v| strict_eq(v, &target))
                    .map_or(Value::Number(-1.0), |i| Value::Number(i as f64)))
            }
            "join" => {
                let sep = args.first().map_or_else(|| ",".to_string(), js_to_string);
                let joined = array
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
                    .join(&sep);
                Ok(Value::Str(joined))
            }
            "slice" => {
                let items = array.borrow();
                let len = items.len();
                let start = slice_index(args.first(), 0, len);
                let end = slice_index(args.get(1), len, len);
                Ok(Value::array(
                    items.get(start..end.max(start)).unwrap_or(&[]).to_vec(),
                ))
            }
            "concat" => {
                let mut out = array.borrow().clone();
                for arg in args {
                    match arg {
                        Value::Array(more) => out.extend(more.borrow().iter().cloned()),
                        other => out.push(other.clone()),
                    }
                }
                Ok(Value::array(out))
            }
            "reverse" => {
                array.borrow_mut().reverse();
                Ok(Value::Array(array))
            }
            "sort" => {
                let comparator = args.first().cloned();
                let mut items = array.borrow().clone();
                // Insertion sort so the comparator can re-enter evaluation.
                for i in 1..items.len() {
                    let mut j = i;
                    while j > 0 {
                        let out_of_order = match &comparator {
                            Some(cmp) => {
                                let ord = self.call_value(
                                    cmp,
                                    &[items[j - 1].clone(), items[j].clone()],
                                    span,
                                )?;
                                to_number(&ord) > 0.0
                            }
                            None => js_to_string(&items[j - 1]) > js_to_string(&items[j]),
                        };
                        if out_of_order {
                            items.swap(j - 1, j);
                            j -= 1;
                        } else {
                            break;
                        }
                    }
                }
                *array.borrow_mut() = items;
                Ok(Value::Array(array))
            }
            _ => Err(not_a_function(receiver, name, span)),
        }
    }
}

fn callback_arg(args: &[Value], method: &str, span: Span) -> EvalResult<Value> {
    match args.first() {
        Some(cb @ (Value::Function(_) | Value::Native(_))) => Ok(cb.clone()),
        _ => Err(Flow::Error(EvalError::new(
            format!("TypeError: {method} expects a callback"),
            span,
        ))),
    }
}

fn not_a_function(receiver: &Value, name: &str, span: Span) -> Flow {
    Flow::Error(EvalError::new(
        format!(
            "TypeError: {}.{name} is not a function",
            js_to_string(receiver)
        ),
        span,
    ))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn slice_index(arg: Option<&Value>, default: usize, len: usize) -> usize {
    match arg {
        None | Some(Value::Undefined) => default,
        Some(value) => {
            let n = to_number(value);
            if n.is_nan() {
                0
            } else if n < 0.0 {
                len.saturating_sub((-n) as usize)
            } else {
                (n as usize).min(len)
            }
        }
    }
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn string_method(s: &str, name: &str, args: &[Value], span: Span) -> EvalResult<Value> {
    let arg_str = |i: usize| args.get(i).map(js_to_string).unwrap_or_default();
    match name {
        "toUpperCase" => Ok(Value::str(s.to_uppercase())),
        "toLowerCase" => Ok(Value::str(s.to_lowercase())),
        "trim" => Ok(Value::str(s.trim())),
        "includes" => Ok(Value::Bool(s.contains(&arg_str(0)))),
        "startsWith" => Ok(Value::Bool(s.starts_with(&arg_str(0)))),
        "endsWith" => Ok(Value::Bool(s.ends_with(&arg_str(0)))),
        "indexOf" => {
            let pat = arg_str(0);
            Ok(s.find(&pat).map_or(Value::Number(-1.0), |byte_idx| {
                Value::Number(s[..byte_idx].chars().count() as f64)
            }))
        }
        "charAt" => {
            let idx = args.first().map_or(0.0, to_number);
            if idx.fract() != 0.0 || idx < 0.0 {
                return Ok(Value::str(""));
            }
            Ok(Value::str(
                s.chars()
                    .nth(idx as usize)
                    .map(|c| c.to_string())
                    .unwrap_or_default(),
            ))
        }
        "repeat" => {
            let count = args.first().map_or(0.0, to_number);
            if count < 0.0 || !count.is_finite() {
                return Err(Flow::Error(EvalError::new(
                    "RangeError: invalid repeat count",
                    span,
                )));
            }
            Ok(Value::str(s.repeat(count as usize)))
        }
        "replace" => Ok(Value::str(s.replacen(&arg_str(0), &arg_str(1), 1))),
        "split" => {
            let parts: Vec<Value> = match args.first() {
                None | Some(Value::Undefined) => vec![Value::str(s)],
                Some(sep) => {
                    let sep = js_to_string(sep);
                    if sep.is_empty() {
                        s.chars().map(|c| Value::str(c.to_string())).collect()
                    } else {
                        s.split(&sep).map(Value::str).collect()
                    }
                }
            };
            Ok(Value::array(parts))
        }
        "slice" => {
            let chars: Vec<char> = s.chars().collect();
            let len = chars.len();
            let start = slice_index(args.first(), 0, len);
            let end = slice_index(args.get(1), len, len);
            Ok(Value::str(
                chars
                    .get(start..end.max(start))
                    .unwrap_or(&[])
                    .iter()
                    .collect::<String>(),
            ))
        }
        "concat" => {
            let mut out = s.to_string();
            for arg in args {
                out.push_str(&js_to_string(arg));
            }
            Ok(Value::str(out))
        }
        "toString" => Ok(Value::str(s)),
        _ => Err(not_a_function(&Value::str(s), name, span)),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn number_method(n: f64, name: &str, args: &[Value], span: Span) -> EvalResult<Value> {
    match name {
        "toFixed" => {
            let digits = args.first().map_or(0.0, to_number);
            if !(0.0..=100.0).contains(&digits) {
                return Err(Flow::Error(EvalError::new(
                    "RangeError: toFixed() digits out of range",
                    span,
                )));
            }
            Ok(Value::str(format!("{:.*}", digits as usize, n)))
        }
        "toString" => Ok(Value::str(format_number(n))),
        _ => Err(not_a_function(&Value::Number(n), name, span)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::interp::Scope;
    use crate::parser::parse_program;

    fn eval_with_log(source: &str) -> (Value, Rc<RefCell<EventLog>>) {
        let mut interp = Interp::new();
        let sink = Rc::new(RefCell::new(EventLog::new()));
        install(&mut interp, Rc::clone(&sink));
        let stmts = parse_program(source).unwrap();
        let env = Scope::child(&interp.globals);
        let value = interp.exec_program(&stmts, &env).unwrap();
        (value, sink)
    }

    fn eval(source: &str) -> Value {
        eval_with_log(source).0
    }

    #[test]
    fn test_console_log_formats_args_with_spaces() {
        let (_, sink) = eval_with_log(r#"console.log("hello", 42);"#);
        let log = sink.borrow();
        assert_eq!(log.len(), 1);
        assert_eq!(log.events()[0].message, "hello 42");
        assert_eq!(log.events()[0].level, LogLevel::Log);
    }

    #[test]
    fn test_console_levels() {
        let (_, sink) = eval_with_log(r#"console.warn("w"); console.error("e");"#);
        let log = sink.borrow();
        assert_eq!(log.events()[0].level, LogLevel::Warn);
        assert_eq!(log.events()[1].level, LogLevel::Error);
    }

    #[test]
    fn test_math() {
        let Value::Number(n) = eval("Math.floor(3.7) + Math.max(1, 5, 2);") else {
            panic!("expected number");
        };
        assert_eq!(n, 8.0);
    }

    #[test]
    fn test_json_round_trip() {
        let Value::Str(s) = eval(r#"JSON.stringify({ a: 1, b: [true, null, "x"] });"#) else {
            panic!("expected string");
        };
        assert_eq!(s, r#"{"a":1,"b":[true,null,"x"]}"#);
        let Value::Number(n) = eval(r#"JSON.parse("{\"a\": 3}").a;"#) else {
            panic!("expected number");
        };
        assert_eq!(n, 3.0);
    }

    #[test]
    fn test_json_stringify_preserves_insertion_order() {
        let Value::Str(s) = eval(r#"JSON.stringify({ z: 1, a: 2 });"#) else {
            panic!("expected string");
        };
        assert_eq!(s, r#"{"z":1,"a":2}"#);
    }

    #[test]
    fn test_object_keys_order() {
        let Value::Str(s) = eval(r#"Object.keys({ b: 1, a: 2 }).join(",");"#) else {
            panic!("expected string");
        };
        assert_eq!(s, "b,a");
    }

    #[test]
    fn test_array_namespace() {
        assert!(matches!(eval("Array.isArray([1]);"), Value::Bool(true)));
        assert!(matches!(eval("Array.isArray({});"), Value::Bool(false)));
        let Value::Number(n) = eval(r#"Array.from("abc").length;"#) else {
            panic!("expected number");
        };
        assert_eq!(n, 3.0);
    }

    #[test]
    fn test_error_constructor() {
        let Value::Str(s) = eval(r#"new Error("boom").message;"#) else {
            panic!("expected string");
        };
        assert_eq!(s, "boom");
    }

    #[test]
    fn test_sort_with_comparator() {
        let Value::Str(s) = eval("[3, 1, 2].sort((a, b) => a - b).join(\"\");") else {
            panic!("expected string");
        };
        assert_eq!(s, "123");
    }

    #[test]
    fn test_slice_negative_indices() {
        let Value::Str(s) = eval(r#""hello".slice(-3);"#) else {
            panic!("expected string");
        };
        assert_eq!(s, "llo");
        let Value::Number(n) = eval("[1, 2, 3, 4].slice(1, -1).length;") else {
            panic!("expected number");
        };
        assert_eq!(n, 2.0);
    }

    #[test]
    fn test_to_fixed() {
        let Value::Str(s) = eval("(3.14159).toFixed(2);") else {
            panic!("expected string");
        };
        assert_eq!(s, "3.14");
    }
}
