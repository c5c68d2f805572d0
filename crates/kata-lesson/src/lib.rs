//! Kata Lessons
//!
//! Lesson manifests, the check runner, and hint ladder selectors.

pub mod checks;
pub mod error;
pub mod hints;
pub mod lesson;

pub use checks::run_lesson_checks;
pub use error::{LessonError, Result};
pub use hints::{get_highest_unlocked_tier, get_unlocked_hints, is_hint_tier_unlocked};
pub use lesson::{
    Check, CheckRunResult, CheckType, GateConfig, HintTier, Lesson, LessonFile, LessonRunResult,
    PassCondition, MAX_LESSON_SIZE, WEIGHT_TOLERANCE,
};
