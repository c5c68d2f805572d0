//! Lesson manifest types, loading, and validation.
//!
//! Lessons are authored as JSON (camelCase keys). Loading validates size
//! and encoding; `validate` enforces the structural constraints the check
//! runner and gate rely on.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LessonError, Result};

/// Maximum allowed lesson manifest size in bytes (256KB).
pub const MAX_LESSON_SIZE: u64 = 256 * 1024;

/// Check weights must sum to 1.0 within this tolerance.
pub const WEIGHT_TOLERANCE: f64 = 0.1;

/// One file in a lesson's starting workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonFile {
    /// File name, also the import path other files use.
    pub filename: String,
    /// Language tag for the editor ("typescript", "tsx", ...).
    pub language: String,
    /// Whether the learner may edit this file.
    #[serde(default)]
    pub editable: bool,
    /// Whether the file is hidden from the learner (harness code).
    #[serde(default)]
    pub hidden: bool,
    /// Initial file content.
    pub content: String,
}

/// What kind of evidence a check inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckType {
    /// Inspects the learner's source.
    Functional,
    /// Inspects captured runtime behavior (console output).
    Behavioral,
    /// Contributes to a weighted rubric score.
    Rubric,
}

/// One automated check against a submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Check {
    /// Stable identifier.
    pub id: String,
    /// Kind of evidence inspected.
    pub check_type: CheckType,
    /// Contribution to the rubric score, in (0, 1].
    pub weight: f64,
    /// Script evaluated with `files` and `console` in scope. A check
    /// without code passes trivially.
    #[serde(default)]
    pub test_code: Option<String>,
    /// Shown when the check fails.
    pub fail_message: String,
    /// Shown when the check passes.
    pub success_message: String,
}

/// One rung of the hint ladder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HintTier {
    /// Tier number, 1 through 3.
    pub tier: u8,
    /// Failed attempts required before this tier unlocks.
    pub unlocks_after_fails: u32,
    /// Hint text.
    pub text: String,
    /// Optional code snippet revealed with the hint.
    #[serde(default)]
    pub code_snippet: Option<String>,
}

/// How a submission passes the lesson.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassCondition {
    /// Every check must pass.
    AllChecks,
    /// The weighted score must reach `score_threshold`.
    RubricScore,
}

/// Gate configuration for a lesson.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateConfig {
    /// How a submission passes.
    pub pass_condition: PassCondition,
    /// Required score, present only for `RubricScore`.
    #[serde(default)]
    pub score_threshold: Option<u8>,
    /// Attempts before a soft block.
    pub max_attempts: u32,
    /// Retry policy name; `"soft-block"` is the only shipped policy.
    #[serde(default = "default_retry_policy")]
    pub retry_policy: String,
    /// Whether alternative solutions are accepted.
    #[serde(default)]
    pub allow_multiple_solutions: bool,
}

fn default_retry_policy() -> String {
    "soft-block".to_string()
}

/// A complete lesson manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    /// Stable lesson identifier.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Starting workspace files.
    pub files: Vec<LessonFile>,
    /// Automated checks.
    pub checks: Vec<Check>,
    /// The 3-tier hint ladder.
    #[serde(default)]
    pub hint_ladder: Vec<HintTier>,
    /// Gate configuration.
    pub gate: GateConfig,
}

impl Lesson {
    /// Loads and validates a lesson manifest from `path`.
    ///
    /// Validates that the file exists, is within the 256KB limit, is valid
    /// UTF-8 and JSON, and satisfies [`Lesson::validate`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LessonError::not_found(path)
            } else {
                LessonError::Io(e)
            }
        })?;
        let file_size = metadata.len();
        if file_size > MAX_LESSON_SIZE {
            return Err(LessonError::too_large(path, file_size / 1024));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::InvalidData {
                LessonError::encoding(path)
            } else {
                LessonError::Io(e)
            }
        })?;

        let lesson: Self = serde_json::from_str(&content)
            .map_err(|e| LessonError::parse(path, e.to_string()))?;
        lesson.validate()?;
        Ok(lesson)
    }

    /// Parses and validates a lesson manifest from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let lesson: Self =
            serde_json::from_str(json).map_err(|e| LessonError::parse("<inline>", e.to_string()))?;
        lesson.validate()?;
        Ok(lesson)
    }

    /// The file a run starts from: the first editable file, else the first
    /// file.
    #[must_use]
    pub fn entry_file(&self) -> Option<&LessonFile> {
        self.files
            .iter()
            .find(|f| f.editable)
            .or_else(|| self.files.first())
    }

    /// Checks the structural constraints the runner and gate rely on.
    pub fn validate(&self) -> Result<()> {
        if self.files.is_empty() {
            return Err(LessonError::validation(
                "lesson has no files",
                "Add at least one file to the lesson",
            ));
        }
        if self.files.iter().any(|f| f.filename.trim().is_empty()) {
            return Err(LessonError::validation(
                "a lesson file has an empty filename",
                "Give every file a non-empty filename",
            ));
        }

        if self.checks.is_empty() {
            return Err(LessonError::validation(
                "lesson has no checks",
                "Add at least one check",
            ));
        }
        for check in &self.checks {
            if check.weight <= 0.0 || check.weight > 1.0 {
                return Err(LessonError::validation(
                    format!("check '{}' has weight {} outside (0, 1]", check.id, check.weight),
                    "Use a weight greater than 0 and at most 1",
                ));
            }
        }
        let total: f64 = self.checks.iter().map(|c| c.weight).sum();
        if (total - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(LessonError::validation(
                format!("check weights sum to {total:.2}, expected 1.0"),
                "Adjust check weights so they sum to 1.0",
            ));
        }

        if !self.hint_ladder.is_empty() {
            let mut tiers: Vec<u8> = self.hint_ladder.iter().map(|h| h.tier).collect();
            tiers.sort_unstable();
            if tiers != vec![1, 2, 3] {
                return Err(LessonError::validation(
                    format!("hint ladder tiers are {tiers:?}, expected [1, 2, 3]"),
                    "Provide exactly one hint for each of tiers 1, 2, and 3",
                ));
            }
        }

        match self.gate.pass_condition {
            PassCondition::RubricScore if self.gate.score_threshold.is_none() => {
                return Err(LessonError::validation(
                    "rubric_score gate has no scoreThreshold",
                    "Set scoreThreshold when passCondition is rubric_score",
                ));
            }
            PassCondition::AllChecks if self.gate.score_threshold.is_some() => {
                return Err(LessonError::validation(
                    "all_checks gate carries a scoreThreshold",
                    "Remove scoreThreshold or switch passCondition to rubric_score",
                ));
            }
            _ => {}
        }
        if self.gate.max_attempts == 0 {
            return Err(LessonError::validation(
                "maxAttempts is 0",
                "Allow at least one attempt",
            ));
        }
        Ok(())
    }
}

/// Outcome of one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRunResult {
    /// The check's identifier.
    pub id: String,
    /// Whether the check passed.
    pub passed: bool,
    /// The learner-facing message for this outcome.
    pub message: String,
}

/// Outcome of one full check pass over a submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonRunResult {
    /// Whether the submission passes the lesson's gate condition.
    pub passed: bool,
    /// Weighted rubric score, 0 through 100.
    pub score: u8,
    /// Per-check outcomes, in manifest order.
    pub checks: Vec<CheckRunResult>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample_lesson_json() -> String {
        r#"{
            "id": "counter-101",
            "title": "Build a Counter",
            "files": [
                {
                    "filename": "Counter.tsx",
                    "language": "tsx",
                    "editable": true,
                    "content": "export default function Counter() { return null; }"
                }
            ],
            "checks": [
                {
                    "id": "uses-state",
                    "checkType": "functional",
                    "weight": 0.6,
                    "testCode": "files[\"Counter.tsx\"].includes(\"useState\")",
                    "failMessage": "Use the useState hook",
                    "successMessage": "State hook in place"
                },
                {
                    "id": "logs-render",
                    "checkType": "behavioral",
                    "weight": 0.4,
                    "failMessage": "Should log on render",
                    "successMessage": "Render logged"
                }
            ],
            "hintLadder": [
                { "tier": 1, "unlocksAfterFails": 1, "text": "Think about state" },
                { "tier": 2, "unlocksAfterFails": 2, "text": "Import useState" },
                { "tier": 3, "unlocksAfterFails": 3, "text": "const [n, setN] = useState(0)",
                  "codeSnippet": "const [n, setN] = useState(0);" }
            ],
            "gate": {
                "passCondition": "rubric_score",
                "scoreThreshold": 60,
                "maxAttempts": 3
            }
        }"#
        .to_string()
    }

    #[test]
    fn test_lesson_parses_camel_case_manifest() {
        let lesson = Lesson::from_json(&sample_lesson_json()).unwrap();
        assert_eq!(lesson.id, "counter-101");
        assert_eq!(lesson.checks.len(), 2);
        assert_eq!(lesson.checks[0].check_type, CheckType::Functional);
        assert_eq!(lesson.gate.pass_condition, PassCondition::RubricScore);
        assert_eq!(lesson.gate.retry_policy, "soft-block");
        assert_eq!(lesson.entry_file().unwrap().filename, "Counter.tsx");
    }

    #[test]
    fn test_validate_rejects_bad_weight_sum() {
        let mut lesson = Lesson::from_json(&sample_lesson_json()).unwrap();
        lesson.checks[0].weight = 0.2;
        let err = lesson.validate().unwrap_err();
        assert!(matches!(err, LessonError::Validation { .. }));
        assert!(err.to_string().contains("sum to 0.60"));
    }

    #[test]
    fn test_validate_tolerates_small_weight_drift() {
        let mut lesson = Lesson::from_json(&sample_lesson_json()).unwrap();
        lesson.checks[0].weight = 0.55;
        // 0.55 + 0.4 = 0.95, inside the 0.1 tolerance.
        lesson.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_incomplete_hint_ladder() {
        let mut lesson = Lesson::from_json(&sample_lesson_json()).unwrap();
        lesson.hint_ladder.remove(1);
        let err = lesson.validate().unwrap_err();
        assert!(err.to_string().contains("[1, 2, 3]"));
    }

    #[test]
    fn test_validate_threshold_matches_pass_condition() {
        let mut lesson = Lesson::from_json(&sample_lesson_json()).unwrap();
        lesson.gate.score_threshold = None;
        assert!(lesson.validate().is_err());

        lesson.gate.pass_condition = PassCondition::AllChecks;
        lesson.validate().unwrap();

        lesson.gate.score_threshold = Some(60);
        assert!(lesson.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_files_and_checks() {
        let mut lesson = Lesson::from_json(&sample_lesson_json()).unwrap();
        lesson.files.clear();
        assert!(lesson.validate().is_err());

        let mut lesson = Lesson::from_json(&sample_lesson_json()).unwrap();
        lesson.checks.clear();
        assert!(lesson.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_is_not_found() {
        let err = Lesson::load("/nonexistent/lesson.json").unwrap_err();
        assert!(matches!(err, LessonError::NotFound { .. }));
    }

    #[test]
    fn test_check_result_serializes_camel_case() {
        let result = LessonRunResult {
            passed: true,
            score: 100,
            checks: vec![CheckRunResult {
                id: "uses-state".to_string(),
                passed: true,
                message: "ok".to_string(),
            }],
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"score\":100"));
        assert!(json.contains("\"passed\":true"));
    }
}
