//! Kata CLI
//!
//! Entry point for running snippets in the sandbox and submitting lesson
//! attempts through the gate.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use indexmap::IndexMap;
use tracing_subscriber::EnvFilter;

use kata_gate::{gate_reducer, GateAction, GateState, GateStatus};
use kata_lesson::{get_unlocked_hints, run_lesson_checks, Lesson};
use kata_sandbox::{ExecutionHost, RunOptions, RunStatus, SandboxState, DEFAULT_TIMEOUT_MS};

/// Kata - Interactive Coding Exercise Runner
///
/// Evaluates learner TypeScript/JSX snippets in an in-process sandbox and
/// drives lesson submissions through automated checks and the attempt gate.
#[derive(Parser, Debug)]
#[command(name = "kata")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one snippet and print its status and captured console output
    Run {
        /// Entry file to evaluate
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Directory of sibling files importable from the entry
        #[arg(long, value_name = "DIR")]
        files: Option<PathBuf>,

        /// Drive the scripted interaction pass after the first render
        #[arg(long)]
        simulate: bool,

        /// Wall-clock budget in milliseconds
        #[arg(long, default_value_t = DEFAULT_TIMEOUT_MS)]
        timeout_ms: u64,
    },

    /// Run a lesson's checks against a submission and drive one gate attempt
    Submit {
        /// Lesson manifest (JSON)
        #[arg(value_name = "LESSON")]
        lesson: PathBuf,

        /// Directory of learner files overlaying the lesson's starting files
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let outcome = match args.command {
        Command::Run {
            file,
            files,
            simulate,
            timeout_ms,
        } => run_snippet(&file, files.as_deref(), simulate, timeout_ms).await,
        Command::Submit { lesson, dir } => submit_lesson(&lesson, dir.as_deref()).await,
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

/// Runs one snippet. Returns `true` when the run succeeds.
async fn run_snippet(
    file: &Path,
    files_dir: Option<&Path>,
    simulate: bool,
    timeout_ms: u64,
) -> anyhow::Result<bool> {
    let entry = file_name_of(file)?;
    let mut files = IndexMap::new();
    if let Some(dir) = files_dir {
        collect_source_files(dir, &mut files)?;
    }
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read '{}'", file.display()))?;
    files.insert(entry.clone(), content);

    let options = RunOptions {
        timeout_ms,
        simulate_user_flow: simulate,
    };
    let mut host = ExecutionHost::new();
    let state = host.run(&entry, files, &options).await;

    print_run(state);
    Ok(state.status == RunStatus::Success)
}

/// Loads a lesson, runs the submission, checks it, and drives one gate
/// attempt. Returns `true` when the attempt passes.
async fn submit_lesson(lesson_path: &Path, dir: Option<&Path>) -> anyhow::Result<bool> {
    let lesson = Lesson::load(lesson_path)?;
    println!("Lesson: {} ({})", lesson.title, lesson.id);

    let mut files: IndexMap<String, String> = lesson
        .files
        .iter()
        .map(|f| (f.filename.clone(), f.content.clone()))
        .collect();
    if let Some(dir) = dir {
        overlay_learner_files(dir, &mut files)?;
    }

    let entry = lesson
        .entry_file()
        .map(|f| f.filename.clone())
        .context("Lesson has no entry file")?;

    // The behavioral checks read the console captured here, so the run
    // includes the scripted interaction pass.
    let options = RunOptions {
        simulate_user_flow: true,
        ..RunOptions::default()
    };
    let mut host = ExecutionHost::new();
    let state = host.run(&entry, files.clone(), &options).await;
    print_run(state);

    let result = run_lesson_checks(&lesson, &files, &state.events);

    let gate = GateState::new(lesson.gate.max_attempts);
    let gate = gate_reducer(&gate, &GateAction::SubmitAttempt);
    let before: Vec<u8> = gate.unlocked_hint_tiers.iter().copied().collect();
    let gate = gate_reducer(
        &gate,
        &GateAction::CheckResult {
            passed: result.passed,
            check_results: result.checks.clone(),
            score: Some(result.score),
        },
    );

    println!();
    println!("Score: {}/100", result.score);
    for check in &result.checks {
        let marker = if check.passed { "PASS" } else { "FAIL" };
        println!("  [{marker}] {}: {}", check.id, check.message);
    }
    println!("Gate: {}", gate.status);

    let newly_unlocked: Vec<u8> = gate
        .unlocked_hint_tiers
        .iter()
        .copied()
        .filter(|tier| !before.contains(tier))
        .collect();
    if !newly_unlocked.is_empty() {
        let unlocked = gate.unlocked_hint_tiers.clone();
        println!();
        println!("Hints unlocked:");
        for hint in get_unlocked_hints(&lesson.hint_ladder, &unlocked) {
            if newly_unlocked.contains(&hint.tier) {
                println!("  Tier {}: {}", hint.tier, hint.text);
                if let Some(snippet) = &hint.code_snippet {
                    println!("    {snippet}");
                }
            }
        }
    }

    Ok(gate.status == GateStatus::Passed)
}

fn print_run(state: &SandboxState) {
    println!("Status: {}", state.status);
    for event in &state.events {
        println!("  [{}] {}", event.level, event.message);
    }
    if state.truncated {
        println!("  (output truncated)");
    }
    if let Some(message) = &state.error_message {
        println!("{message}");
    }
}

fn file_name_of(path: &Path) -> anyhow::Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .with_context(|| format!("Invalid file name: '{}'", path.display()))
}

/// Adds every source file in `dir` (non-recursive) to the run's file set.
fn collect_source_files(dir: &Path, files: &mut IndexMap<String, String>) -> anyhow::Result<()> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory '{}'", dir.display()))?;
    for entry in entries {
        let entry = entry?;
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if !entry.file_type()?.is_file() || !kata_sandbox::transpile::is_source_file(&name) {
            continue;
        }
        let content = std::fs::read_to_string(entry.path())
            .with_context(|| format!("Failed to read '{}'", entry.path().display()))?;
        files.insert(name, content);
    }
    Ok(())
}

/// Replaces lesson file contents with learner versions found in `dir`.
fn overlay_learner_files(dir: &Path, files: &mut IndexMap<String, String>) -> anyhow::Result<()> {
    for (name, content) in files.iter_mut() {
        let candidate = dir.join(name);
        if candidate.is_file() {
            *content = std::fs::read_to_string(&candidate)
                .with_context(|| format!("Failed to read '{}'", candidate.display()))?;
        }
    }
    Ok(())
}
