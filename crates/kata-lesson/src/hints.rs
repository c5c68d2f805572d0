//! Hint ladder selectors.
//!
//! Pure functions over a lesson's hint ladder and the set of tiers the
//! gate has unlocked. The gate owns *when* tiers unlock; these selectors
//! only answer *what* is visible.

use std::collections::BTreeSet;

use crate::lesson::HintTier;

/// `true` if `tier` has been unlocked.
#[must_use]
pub fn is_hint_tier_unlocked(unlocked: &BTreeSet<u8>, tier: u8) -> bool {
    unlocked.contains(&tier)
}

/// The highest unlocked tier, or `None` when nothing is unlocked yet.
#[must_use]
pub fn get_highest_unlocked_tier(unlocked: &BTreeSet<u8>) -> Option<u8> {
    unlocked.iter().next_back().copied()
}

/// The unlocked hints, in ascending tier order.
#[must_use]
pub fn get_unlocked_hints<'a>(ladder: &'a [HintTier], unlocked: &BTreeSet<u8>) -> Vec<&'a HintTier> {
    let mut hints: Vec<&HintTier> = ladder
        .iter()
        .filter(|hint| unlocked.contains(&hint.tier))
        .collect();
    hints.sort_by_key(|hint| hint.tier);
    hints
}
