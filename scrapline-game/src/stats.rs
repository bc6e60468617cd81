//! Reputation math and threat-level adjustments.
//!
//! Reputation is a derived 0..=10 score over lifetime task history, log
//! scaled so early completions move it quickly and later ones slowly.
use crate::state::Profile;
use crate::tasks::CompletionMetrics;

/// Points where the log curve tops out at reputation 10.
const REPUTATION_CAP_POINTS: f64 = 200.0;
const MEDIUM_UNLOCK_REP: f64 = 2.0;
const HARD_UNLOCK_REP: f64 = 5.0;

/// Pure reputation score from lifetime counters. Harder completions are
/// worth more; failures claw points back before the curve is applied.
#[must_use]
pub fn reputation_score(profile: &Profile) -> f64 {
    let earned = f64::from(profile.easy_completed)
        + f64::from(profile.medium_completed) * 2.0
        + f64::from(profile.hard_completed) * 4.0
        + f64::from(profile.emergency_completed) * 3.0
        + f64::from(profile.milestones.bonus_objs_count) * 0.5;
    let penalty = f64::from(profile.tasks_failed) * 1.5
        + f64::from(profile.emergency_tasks_failed) * 2.0;
    let points = (earned - penalty).max(0.0);
    (10.0 * (1.0 + points).ln() / (1.0 + REPUTATION_CAP_POINTS).ln()).clamp(0.0, 10.0)
}

/// Recompute the stored reputation and flip tier unlocks. Unlocks are
/// one-way; a reputation dip never relocks a tier.
pub fn refresh_reputation(profile: &mut Profile) -> f64 {
    let rep = reputation_score(profile);
    profile.reputation = rep;
    if rep >= MEDIUM_UNLOCK_REP {
        profile.medium_unlocked = true;
    }
    if rep >= HARD_UNLOCK_REP {
        profile.hard_unlocked = true;
    }
    rep
}

/// Successful extraction heats the wasteland up one step. A hard-task
/// clear or a heavy task haul in the same raid adds another.
pub fn adjust_threat_on_extraction(profile: &mut Profile, metrics: &CompletionMetrics) {
    profile.threat_level += 1;
    if metrics.hard > 0 || metrics.total() >= 3 {
        profile.threat_level += 1;
    }
    profile.clamp_threat();
}

/// A death cools the wasteland down one step.
pub fn adjust_threat_on_failure(profile: &mut Profile) {
    profile.threat_level -= 1;
    profile.clamp_threat();
}
