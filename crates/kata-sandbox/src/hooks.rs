//! Mocked hook runtime and JSX factory.
//!
//! Hooks are backed by a flat slot table indexed by call order. The cursor
//! resets to zero before every render pass, so a component that calls hooks
//! in a stable order sees its state persist across passes. Effects run
//! immediately (there is no commit phase), and refs are a fresh box on
//! every call.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::interp::{
    native, Element, ElementTag, EvalError, EvalResult, Flow, Interp, Value,
};
use crate::lexer::Span;

/// Maximum component nesting while rendering an element tree.
const MAX_RENDER_DEPTH: usize = 64;

/// Marker key identifying the fragment sentinel object.
const FRAGMENT_MARKER: &str = "$typeof";

/// Hook slot storage for one component tree.
#[derive(Debug, Default)]
pub struct HookRuntime {
    slots: Vec<Value>,
    cursor: usize,
}

/// Shared handle to the run's hook runtime.
pub type HookRuntimeRef = Rc<RefCell<HookRuntime>>;

impl HookRuntime {
    /// Creates an empty runtime.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a shared handle to a fresh runtime.
    #[must_use]
    pub fn shared() -> HookRuntimeRef {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Rewinds the cursor for the next render pass, keeping slot values.
    pub fn reset_cursor(&mut self) {
        self.cursor = 0;
    }

    /// Clears all slots (a brand-new run).
    pub fn reset(&mut self) {
        self.slots.clear();
        self.cursor = 0;
    }

    /// Claims the next slot, initializing it on first use. Returns the
    /// slot index.
    fn claim(&mut self, init: Value) -> usize {
        let index = self.cursor;
        if index >= self.slots.len() {
            self.slots.push(init);
        }
        self.cursor += 1;
        index
    }

    fn get(&self, index: usize) -> Value {
        self.slots.get(index).cloned().unwrap_or(Value::Undefined)
    }

    fn set(&mut self, index: usize, value: Value) {
        if index < self.slots.len() {
            self.slots[index] = value;
        }
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// The next slot index a hook call will claim.
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

fn fragment_sentinel() -> Value {
    let mut map = IndexMap::new();
    map.insert(FRAGMENT_MARKER.to_string(), Value::str("fragment"));
    Value::object(map)
}

fn is_fragment_sentinel(value: &Value) -> bool {
    let Value::Object(map) = value else {
        return false;
    };
    matches!(map.borrow().get(FRAGMENT_MARKER), Some(Value::Str(s)) if s == "fragment")
}

/// Builds the mocked `react` module exports.
#[must_use]
pub fn react_module(runtime: &HookRuntimeRef) -> Value {
    let mut map = IndexMap::new();

    let rt = Rc::clone(runtime);
    map.insert(
        "useState".to_string(),
        native("useState", move |interp, args| {
            let mut init = args.first().cloned().unwrap_or(Value::Undefined);
            // Lazy initializers run once, on the call that creates the slot.
            let is_first_use = rt.borrow().slot_count() <= rt.borrow().cursor();
            if is_first_use && matches!(init, Value::Function(_) | Value::Native(_)) {
                init = interp.call_value(&init, &[], Span::new(0, 0))?;
            }
            let index = rt.borrow_mut().claim(init);
            let value = rt.borrow().get(index);
            let setter_rt = Rc::clone(&rt);
            let setter = native("setState", move |interp, args| {
                let next = args.first().cloned().unwrap_or(Value::Undefined);
                let resolved = match &next {
                    // Functional updates receive the current slot value.
                    Value::Function(_) | Value::Native(_) => {
                        let current = setter_rt.borrow().get(index);
                        interp.call_value(&next, &[current], Span::new(0, 0))?
                    }
                    _ => next,
                };
                setter_rt.borrow_mut().set(index, resolved);
                Ok(Value::Undefined)
            });
            Ok(Value::array(vec![value, setter]))
        }),
    );

    map.insert(
        "useEffect".to_string(),
        native("useEffect", |interp, args| {
            // Effects run immediately; cleanup returns are discarded.
            if let Some(effect @ (Value::Function(_) | Value::Native(_))) = args.first() {
                interp.call_value(effect, &[], Span::new(0, 0))?;
            }
            Ok(Value::Undefined)
        }),
    );

    map.insert(
        "useRef".to_string(),
        native("useRef", |_, args| {
            let init = args.first().cloned().unwrap_or(Value::Undefined);
            let mut boxed = IndexMap::new();
            boxed.insert("current".to_string(), init);
            Ok(Value::object(boxed))
        }),
    );

    map.insert(
        "useMemo".to_string(),
        native("useMemo", |interp, args| {
            match args.first() {
                Some(factory @ (Value::Function(_) | Value::Native(_))) => {
                    interp.call_value(factory, &[], Span::new(0, 0))
                }
                _ => Ok(Value::Undefined),
            }
        }),
    );

    map.insert(
        "useCallback".to_string(),
        native("useCallback", |_, args| {
            Ok(args.first().cloned().unwrap_or(Value::Undefined))
        }),
    );

    map.insert(
        "createContext".to_string(),
        native("createContext", |_, args| {
            let default = args.first().cloned().unwrap_or(Value::Undefined);
            let mut ctx = IndexMap::new();
            ctx.insert("_defaultValue".to_string(), default);
            Ok(Value::object(ctx))
        }),
    );

    map.insert(
        "useContext".to_string(),
        native("useContext", |_, args| {
            // No provider tracking; the default value is the value.
            match args.first() {
                Some(Value::Object(ctx)) => Ok(ctx
                    .borrow()
                    .get("_defaultValue")
                    .cloned()
                    .unwrap_or(Value::Undefined)),
                _ => Ok(Value::Undefined),
            }
        }),
    );

    map.insert(
        "createElement".to_string(),
        native("createElement", |_, args| jsx_factory(args)),
    );

    map.insert("Fragment".to_string(), fragment_sentinel());
    Value::object(map)
}

/// Builds the mocked `react/jsx-runtime` module exports.
#[must_use]
pub fn jsx_runtime_module() -> Value {
    let mut map = IndexMap::new();
    let factory = native("jsx", |_, args| jsx_factory(args));
    map.insert("jsx".to_string(), factory.clone());
    map.insert("jsxs".to_string(), factory);
    map.insert("Fragment".to_string(), fragment_sentinel());
    Value::object(map)
}

/// `jsx(tag, props, ...children)` builds one element node.
///
/// Children always land in `props.children` as an array, regardless of
/// arity, so tree walkers see a single shape.
fn jsx_factory(args: &[Value]) -> EvalResult<Value> {
    let tag_arg = args.first().cloned().unwrap_or(Value::Undefined);
    let tag = match &tag_arg {
        Value::Str(name) => ElementTag::Host(name.clone()),
        Value::Function(_) | Value::Native(_) => ElementTag::Component(tag_arg.clone()),
        other if is_fragment_sentinel(other) => ElementTag::Fragment,
        other => {
            return Err(Flow::Error(EvalError::unlocated(format!(
                "TypeError: invalid element type (got {})",
                other.type_of()
            ))));
        }
    };

    let mut props = match args.get(1) {
        Some(Value::Object(map)) => map.borrow().clone(),
        _ => IndexMap::new(),
    };
    let children: Vec<Value> = args.get(2..).unwrap_or(&[]).to_vec();
    props.insert("children".to_string(), Value::array(children));

    Ok(Value::Element(Rc::new(Element {
        tag,
        props: Rc::new(RefCell::new(props)),
    })))
}

/// Resolves an element tree by invoking component functions until only
/// host elements, fragments, and primitives remain.
pub fn render_value(interp: &mut Interp, value: &Value) -> EvalResult<Value> {
    render_at_depth(interp, value, 0)
}

fn render_at_depth(interp: &mut Interp, value: &Value, depth: usize) -> EvalResult<Value> {
    if depth > MAX_RENDER_DEPTH {
        return Err(Flow::Error(EvalError::unlocated(
            "RangeError: maximum render depth exceeded",
        )));
    }
    match value {
        Value::Element(element) => match &element.tag {
            ElementTag::Component(func) => {
                let props = Value::Object(Rc::clone(&element.props));
                let output = interp.call_value(func, &[props], Span::new(0, 0))?;
                render_at_depth(interp, &output, depth + 1)
            }
            ElementTag::Host(_) | ElementTag::Fragment => {
                let mut rendered = Vec::new();
                for child in element.children() {
                    rendered.push(render_at_depth(interp, &child, depth + 1)?);
                }
                let mut props = element.props.borrow().clone();
                props.insert("children".to_string(), Value::array(rendered));
                Ok(Value::Element(Rc::new(Element {
                    tag: element.tag.clone(),
                    props: Rc::new(RefCell::new(props)),
                })))
            }
        },
        Value::Array(items) => {
            let snapshot = items.borrow().clone();
            let mut rendered = Vec::with_capacity(snapshot.len());
            for item in snapshot {
                rendered.push(render_at_depth(interp, &item, depth + 1)?);
            }
            Ok(Value::array(rendered))
        }
        other => Ok(other.clone()),
    }
}
