//! Module resolution and loading.
//!
//! Only two kinds of import resolve: relative paths into the run's file
//! set (extension optional) and the two allowlisted runtime modules. That
//! allowlist is the sandbox's isolation boundary; there is no filesystem
//! or network behind it.
//!
//! Modules evaluate once per run. The exports object is cached before the
//! module body executes, so import cycles observe partial exports instead
//! of recursing forever.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::debug;

use crate::error::SandboxError;
use crate::hooks::{jsx_runtime_module, react_module, HookRuntimeRef};
use crate::interp::{
    define, js_to_string, native, throw_message, EvalError, EvalResult, Flow, Interp, Scope,
    Value,
};
use crate::parser;
use crate::sourcemap::SourceMap;
use crate::transpile;

/// Bare specifiers that resolve inside the sandbox.
pub const ALLOWED_BARE_IMPORTS: [&str; 2] = ["react", "react/jsx-runtime"];

/// Extensions tried, in order, when a relative specifier omits one.
const RESOLUTION_SUFFIXES: [&str; 4] = [".ts", ".tsx", ".js", ".jsx"];

fn static_err(err: &SandboxError) -> Flow {
    Flow::Error(EvalError::unlocated(err.to_string()))
}

/// Loads, compiles, and evaluates the run's modules.
pub struct ModuleLoader {
    files: IndexMap<String, String>,
    hook_runtime: HookRuntimeRef,
    cache: RefCell<HashMap<String, Value>>,
    maps: RefCell<HashMap<String, Rc<SourceMap>>>,
}

impl ModuleLoader {
    /// Creates a loader over the run's file set.
    #[must_use]
    pub fn new(files: IndexMap<String, String>, hook_runtime: HookRuntimeRef) -> Rc<Self> {
        Rc::new(Self {
            files,
            hook_runtime,
            cache: RefCell::new(HashMap::new()),
            maps: RefCell::new(HashMap::new()),
        })
    }

    /// Drops all per-run module state.
    pub fn begin_run(&self) {
        self.cache.borrow_mut().clear();
        self.maps.borrow_mut().clear();
    }

    /// `true` if `name` is in the file set.
    #[must_use]
    pub fn has_file(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    /// Source text of `name`, if present.
    #[must_use]
    pub fn source(&self, name: &str) -> Option<&str> {
        self.files.get(name).map(String::as_str)
    }

    /// The source map produced when `file` was compiled this run.
    #[must_use]
    pub fn source_map(&self, file: &str) -> Option<Rc<SourceMap>> {
        self.maps.borrow().get(file).cloned()
    }

    /// Resolves `specifier` as written in `from` to a file name or
    /// allowlisted module id.
    pub fn resolve(&self, specifier: &str, from: &str) -> crate::error::Result<String> {
        if !specifier.starts_with("./") && !specifier.starts_with("../") {
            if ALLOWED_BARE_IMPORTS.contains(&specifier) {
                return Ok(specifier.to_string());
            }
            return Err(SandboxError::forbidden_import(specifier, from));
        }
        let base = from.rsplit_once('/').map_or("", |(dir, _)| dir);
        let joined = normalize_path(base, specifier);
        if self.files.contains_key(&joined) {
            return Ok(joined);
        }
        for suffix in RESOLUTION_SUFFIXES {
            let candidate = format!("{joined}{suffix}");
            if self.files.contains_key(&candidate) {
                return Ok(candidate);
            }
        }
        Err(SandboxError::unresolved_import(specifier, from))
    }

    /// Resolves and evaluates an import. Module failures surface as
    /// evaluation errors at the `require` call.
    pub fn load(
        self: &Rc<Self>,
        interp: &mut Interp,
        specifier: &str,
        from: &str,
    ) -> EvalResult<Value> {
        let resolved = self.resolve(specifier, from).map_err(|e| static_err(&e))?;
        if let Some(cached) = self.cache.borrow().get(&resolved) {
            return Ok(cached.clone());
        }
        let exports = match resolved.as_str() {
            "react" => react_module(&self.hook_runtime),
            "react/jsx-runtime" => jsx_runtime_module(),
            _ => return self.evaluate_module(interp, &resolved),
        };
        self.cache
            .borrow_mut()
            .insert(resolved, exports.clone());
        Ok(exports)
    }

    /// Evaluates `path` (already a file-set name) as the run's entry.
    pub fn load_entry(self: &Rc<Self>, interp: &mut Interp, path: &str) -> EvalResult<Value> {
        if !self.files.contains_key(path) {
            let err = SandboxError::unresolved_import(path, path);
            return Err(static_err(&err));
        }
        if let Some(cached) = self.cache.borrow().get(path) {
            return Ok(cached.clone());
        }
        self.evaluate_module(interp, path)
    }

    fn evaluate_module(self: &Rc<Self>, interp: &mut Interp, path: &str) -> EvalResult<Value> {
        debug!(module = path, "evaluating module");
        let Some(source) = self.files.get(path).cloned() else {
            let err = SandboxError::unresolved_import(path, path);
            return Err(static_err(&err));
        };
        let module = transpile::transpile(path, &source).map_err(|e| static_err(&e))?;
        let map = Rc::new(module.map);
        self.maps
            .borrow_mut()
            .insert(path.to_string(), Rc::clone(&map));

        let stmts = parser::parse_program(&module.code).map_err(|e| {
            let detail = match map.lookup(e.span.line, e.span.column) {
                Some(loc) => format!("{} (line {})", e.message, loc.line),
                None => e.message.clone(),
            };
            static_err(&SandboxError::compilation(path, detail))
        })?;

        // Published before evaluation so cycles see partial exports.
        let exports = Value::object(IndexMap::new());
        self.cache
            .borrow_mut()
            .insert(path.to_string(), exports.clone());

        let mut module_map = IndexMap::new();
        module_map.insert("exports".to_string(), exports.clone());
        let module_obj = Value::object(module_map);

        let env = Scope::child(&interp.globals);
        define(&env, "module", module_obj.clone());
        define(&env, "exports", exports.clone());
        let loader = Rc::clone(self);
        let from = path.to_string();
        define(
            &env,
            "require",
            native("require", move |interp, args| {
                let spec = args.first().map(js_to_string).unwrap_or_default();
                loader.load(interp, &spec, &from)
            }),
        );

        if let Err(flow) = interp.exec_program(&stmts, &env) {
            self.cache.borrow_mut().remove(path);
            return Err(locate(flow, &map));
        }

        // `module.exports` may have been reassigned wholesale.
        let final_exports = match &module_obj {
            Value::Object(map) => map
                .borrow()
                .get("exports")
                .cloned()
                .unwrap_or_else(|| exports.clone()),
            _ => exports,
        };
        self.cache
            .borrow_mut()
            .insert(path.to_string(), final_exports.clone());
        Ok(final_exports)
    }
}

/// Attaches an original-source location to an escaping failure, using the
/// map of the module whose body it escaped.
fn locate(flow: Flow, map: &SourceMap) -> Flow {
    match flow {
        Flow::Throw(value, span) => {
            let mut err = EvalError::unlocated(throw_message(&value));
            err.location = map.lookup(span.line, span.column);
            Flow::Error(err)
        }
        Flow::Error(mut err) if err.location.is_none() && !err.timeout => {
            err.location = err.span.and_then(|s| map.lookup(s.line, s.column));
            Flow::Error(err)
        }
        other => other,
    }
}

/// Joins `specifier` onto `base`, folding `.` and `..` segments.
fn normalize_path(base: &str, specifier: &str) -> String {
    let mut segments: Vec<&str> = base.split('/').filter(|s| !s.is_empty()).collect();
    for segment in specifier.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::builtins;
    use crate::events::EventLog;
    use crate::hooks::HookRuntime;

    fn loader_with(files: &[(&str, &str)]) -> (Rc<ModuleLoader>, Interp) {
        let files: IndexMap<String, String> = files
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        let loader = ModuleLoader::new(files, HookRuntime::shared());
        let mut interp = Interp::new();
        builtins::install(&mut interp, Rc::new(RefCell::new(EventLog::new())));
        (loader, interp)
    }

    fn export_of(exports: &Value, name: &str) -> Value {
        let Value::Object(map) = exports else {
            panic!("expected exports object, got {exports:?}");
        };
        map.borrow().get(name).cloned().unwrap_or(Value::Undefined)
    }

    #[test]
    fn test_resolve_relative_with_extension_trial() {
        let (loader, _) = loader_with(&[("main.ts", ""), ("utils/math.ts", "")]);
        assert_eq!(
            loader.resolve("./utils/math", "main.ts").unwrap(),
            "utils/math.ts"
        );
        assert_eq!(
            loader.resolve("../utils/math.ts", "pages/home.ts").unwrap(),
            "utils/math.ts"
        );
    }

    #[test]
    fn test_resolve_prefers_exact_name() {
        let (loader, _) = loader_with(&[("a.ts", ""), ("a.ts.ts", "")]);
        assert_eq!(loader.resolve("./a.ts", "main.ts").unwrap(), "a.ts");
    }

    #[test]
    fn test_bare_import_outside_allowlist_is_forbidden() {
        let (loader, _) = loader_with(&[("main.ts", "")]);
        let err = loader.resolve("node:fs", "main.ts").unwrap_err();
        assert!(matches!(err, SandboxError::ForbiddenImport { .. }));
        let err = loader.resolve("lodash", "main.ts").unwrap_err();
        assert!(matches!(err, SandboxError::ForbiddenImport { .. }));
    }

    #[test]
    fn test_allowlisted_imports_resolve() {
        let (loader, _) = loader_with(&[]);
        assert_eq!(loader.resolve("react", "main.ts").unwrap(), "react");
        assert_eq!(
            loader.resolve("react/jsx-runtime", "main.ts").unwrap(),
            "react/jsx-runtime"
        );
    }

    #[test]
    fn test_unresolved_relative_import() {
        let (loader, _) = loader_with(&[("main.ts", "")]);
        let err = loader.resolve("./missing", "main.ts").unwrap_err();
        assert!(matches!(err, SandboxError::UnresolvedImport { .. }));
    }

    #[test]
    fn test_named_imports_across_modules() {
        let (loader, mut interp) = loader_with(&[
            (
                "main.ts",
                "import { double } from \"./math\";\nexport const result = double(21);",
            ),
            ("math.ts", "export function double(n: number): number {\n  return n * 2;\n}"),
        ]);
        let exports = loader.load_entry(&mut interp, "main.ts").unwrap();
        let Value::Number(n) = export_of(&exports, "result") else {
            panic!("expected number result");
        };
        assert_eq!(n, 42.0);
    }

    #[test]
    fn test_default_import() {
        let (loader, mut interp) = loader_with(&[
            (
                "main.ts",
                "import greet from \"./greet\";\nexport const msg = greet(\"kata\");",
            ),
            (
                "greet.ts",
                "export default function greet(name: string) {\n  return `hi ${name}`;\n}",
            ),
        ]);
        let exports = loader.load_entry(&mut interp, "main.ts").unwrap();
        let Value::Str(s) = export_of(&exports, "msg") else {
            panic!("expected string");
        };
        assert_eq!(s, "hi kata");
    }

    #[test]
    fn test_module_evaluates_once_per_run() {
        let (loader, mut interp) = loader_with(&[
            (
                "main.ts",
                "import \"./side\";\nimport \"./side\";\nexport const done = true;",
            ),
            ("side.ts", "console.log(\"evaluated\");"),
        ]);
        let sink = Rc::new(RefCell::new(EventLog::new()));
        builtins::install(&mut interp, Rc::clone(&sink));
        loader.load_entry(&mut interp, "main.ts").unwrap();
        assert_eq!(sink.borrow().len(), 1);
    }

    #[test]
    fn test_import_cycle_sees_partial_exports() {
        let (loader, mut interp) = loader_with(&[
            (
                "a.ts",
                "import { b } from \"./b\";\nexport const a = 1;\nexport const viaB = b;",
            ),
            (
                "b.ts",
                "import * as aMod from \"./a\";\nexport const b = 2;\nexport const sawA = typeof aMod;",
            ),
        ]);
        let exports = loader.load_entry(&mut interp, "a.ts").unwrap();
        let Value::Number(n) = export_of(&exports, "viaB") else {
            panic!("expected number");
        };
        assert_eq!(n, 2.0);
    }

    #[test]
    fn test_runtime_error_carries_remapped_location() {
        let (loader, mut interp) = loader_with(&[(
            "main.ts",
            "const a = 1;\nconst b: number = missing;",
        )]);
        let Err(Flow::Error(err)) = loader.load_entry(&mut interp, "main.ts") else {
            panic!("expected error");
        };
        assert!(err.message.contains("missing is not defined"));
        let loc = err.location.unwrap();
        assert_eq!(loc.file, "main.ts");
        assert_eq!(loc.line, 2);
    }

    #[test]
    fn test_throw_surfaces_as_located_error() {
        let (loader, mut interp) = loader_with(&[(
            "main.ts",
            "const x = 1;\nthrow new Error(\"boom\");",
        )]);
        let Err(Flow::Error(err)) = loader.load_entry(&mut interp, "main.ts") else {
            panic!("expected error");
        };
        assert_eq!(err.message, "Error: boom");
        assert_eq!(err.location.unwrap().line, 2);
    }

    #[test]
    fn test_compile_error_mentions_file() {
        let (loader, mut interp) = loader_with(&[("main.tsx", "const x = <div>text</span>;")]);
        let Err(Flow::Error(err)) = loader.load_entry(&mut interp, "main.tsx") else {
            panic!("expected error");
        };
        assert!(err.message.contains("main.tsx"));
        assert!(err.message.contains("</span>"));
    }

    #[test]
    fn test_failed_module_is_not_cached() {
        let (loader, mut interp) = loader_with(&[("main.ts", "throw new Error(\"x\");")]);
        assert!(loader.load_entry(&mut interp, "main.ts").is_err());
        assert!(loader.load_entry(&mut interp, "main.ts").is_err());
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("", "./a"), "a");
        assert_eq!(normalize_path("pages", "./home"), "pages/home");
        assert_eq!(normalize_path("pages", "../utils/math"), "utils/math");
        assert_eq!(normalize_path("a/b", "../../c"), "c");
    }
}
