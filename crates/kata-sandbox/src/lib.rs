//! Kata Sandbox
//!
//! In-process execution environment for learner TypeScript/JSX snippets:
//! line-preserving transpile, module loading behind an import allowlist,
//! a tree-walking interpreter with mocked hooks, and source-map error
//! remapping.

pub mod builtins;
pub mod error;
pub mod events;
pub mod hooks;
pub mod host;
pub mod interp;
pub mod lexer;
pub mod loader;
pub mod parser;
pub mod sourcemap;
pub mod state;
pub mod transpile;

pub use error::{Result, SandboxError, SourceLocation};
pub use events::{EventLog, LogLevel, SandboxEvent, MAX_EVENTS};
pub use host::{ExecutionHost, RunOptions, ScriptEngine, DEFAULT_TIMEOUT_MS};
pub use interp::{Interp, Value};
pub use loader::{ModuleLoader, ALLOWED_BARE_IMPORTS};
pub use sourcemap::{parse_stack_location, Segment, SourceMap};
pub use state::{RunStatus, SandboxState};
pub use transpile::{transpile, TranspiledModule};
