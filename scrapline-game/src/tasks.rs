//! Taskboard state: accepted tasks, the offer pool, per-raid aging, and
//! the two-phase completion flow (read-only collect, then commit).
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::constants::{EMERGENCY_REWARD_BOOST, TASK_POOL_MAX, TASK_SLOTS_MAX};
use crate::loot::{self, RewardBundle, RewardCtx, RewardSource};
use crate::state::Profile;
use crate::task_gen::{self, TaskContent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskDifficulty {
    #[default]
    Easy,
    Medium,
    Hard,
}

impl TaskDifficulty {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

impl fmt::Display for TaskDifficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskDifficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "easy" => Ok(Self::Easy),
            "medium" => Ok(Self::Medium),
            "hard" => Ok(Self::Hard),
            other => Err(format!("unknown task difficulty: {other}")),
        }
    }
}

/// One tracked objective line. Progress is read off the per-raid stat
/// delta table, keyed by `stat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Objective {
    pub stat: String,
    pub icon: String,
    pub text: String,
    pub current: i64,
    pub target: i64,
    pub bonus: bool,
}

impl Objective {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.target > 0 && self.current >= self.target
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Task {
    pub number: u32,
    pub name: String,
    pub desc: String,
    pub difficulty: TaskDifficulty,
    pub objectives: Vec<Objective>,
    /// Raid returns remaining before the task expires. A task at zero is
    /// removed (and counted failed) on the next return's aging pass.
    pub cycles_remaining: u32,
    pub emergency: bool,
}

impl Task {
    /// Complete when every mandatory objective is met. Bonus objectives
    /// sweeten the reward but never gate completion.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        let mandatory: Vec<&Objective> = self.objectives.iter().filter(|o| !o.bonus).collect();
        !mandatory.is_empty() && mandatory.iter().all(|o| o.is_complete())
    }

    #[must_use]
    pub fn bonus_complete(&self) -> bool {
        self.objectives.iter().any(|o| o.bonus && o.is_complete())
    }
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("no free task slots")]
    NoSlots,
    #[error("no task rerolls remaining")]
    NoRerolls,
    #[error("no task numbered {0} on the board")]
    UnknownTask(u32),
    #[error("task {0} is already accepted")]
    AlreadyAccepted(u32),
}

/// What a successful raid return would pay out for the current board.
/// Purely descriptive; nothing is applied until `apply_completions`.
#[derive(Debug, Clone, Default)]
pub struct CompletionMetrics {
    pub completed: Vec<u32>,
    pub bundles: Vec<RewardBundle>,
    pub easy: u32,
    pub medium: u32,
    pub hard: u32,
    pub emergency: u32,
    pub bonus_objectives: u32,
}

impl CompletionMetrics {
    #[must_use]
    pub fn total(&self) -> u32 {
        self.easy + self.medium + self.hard
    }
}

fn next_task_number(profile: &Profile) -> u32 {
    profile
        .tasks
        .iter()
        .chain(profile.taskboard_pool.iter())
        .map(|t| t.number)
        .max()
        .map_or(1, |n| n + 1)
}

/// Top the offer pool back up to the unlocked pool size.
pub fn refresh_taskboard(profile: &mut Profile, content: &TaskContent, rng: &mut impl Rng) {
    let cap = usize::min(profile.unlocked_task_pool_size, TASK_POOL_MAX);
    while profile.taskboard_pool.len() < cap {
        let number = next_task_number(profile);
        let task = task_gen::generate_task(number, profile, content, false, rng);
        profile.taskboard_pool.push(task);
    }
}

/// Move a pool offer into an accepted slot.
pub fn accept_task(profile: &mut Profile, number: u32) -> Result<(), TaskError> {
    if profile.tasks.iter().any(|t| t.number == number) {
        return Err(TaskError::AlreadyAccepted(number));
    }
    let slots = usize::min(profile.unlocked_task_slots, TASK_SLOTS_MAX);
    if profile.active_task_count() >= slots {
        return Err(TaskError::NoSlots);
    }
    let idx = profile
        .taskboard_pool
        .iter()
        .position(|t| t.number == number)
        .ok_or(TaskError::UnknownTask(number))?;
    let task = profile.taskboard_pool.remove(idx);
    profile.tasks.push(task);
    Ok(())
}

/// Replace one pool offer with a fresh roll, consuming a reroll token.
pub fn reroll_task(
    profile: &mut Profile,
    number: u32,
    content: &TaskContent,
    rng: &mut impl Rng,
) -> Result<(), TaskError> {
    if profile.consumables.task_reroll <= 0 {
        return Err(TaskError::NoRerolls);
    }
    let idx = profile
        .taskboard_pool
        .iter()
        .position(|t| t.number == number)
        .ok_or(TaskError::UnknownTask(number))?;
    profile.consumables.task_reroll -= 1;
    let fresh = task_gen::generate_task(next_task_number(profile), profile, content, false, rng);
    profile.taskboard_pool[idx] = fresh;
    Ok(())
}

/// Push an emergency task straight into the accepted slots, ignoring the
/// slot cap. Emergency tasks expire after one raid return.
pub fn spawn_emergency_task(profile: &mut Profile, content: &TaskContent, rng: &mut impl Rng) {
    let number = next_task_number(profile);
    let task = task_gen::generate_task(number, profile, content, true, rng);
    profile.tasks.push(task);
}

/// Refresh objective progress off the per-raid stat delta table.
pub fn update_task_progress(profile: &mut Profile) {
    let bonuses = profile.current_bonuses.clone();
    for task in &mut profile.tasks {
        for obj in &mut task.objectives {
            obj.current = bonuses.get(&obj.stat).copied().unwrap_or(0);
        }
    }
}

/// Per-return aging pass. Tasks already at zero cycles are removed and
/// counted failed; survivors then lose one cycle. A task accepted with a
/// single cycle therefore gets exactly one full raid to finish before the
/// return after that expires it. Board offers age on the same boundary,
/// but letting one lapse costs nothing.
pub fn age_tasks(profile: &mut Profile) -> u32 {
    let mut failed = 0u32;
    let mut emergency_failed = 0u32;
    profile.tasks.retain(|t| {
        if t.cycles_remaining == 0 {
            failed += 1;
            if t.emergency {
                emergency_failed += 1;
            }
            false
        } else {
            true
        }
    });
    for task in &mut profile.tasks {
        task.cycles_remaining = task.cycles_remaining.saturating_sub(1);
    }
    profile.taskboard_pool.retain(|t| t.cycles_remaining > 0);
    for task in &mut profile.taskboard_pool {
        task.cycles_remaining = task.cycles_remaining.saturating_sub(1);
    }
    profile.tasks_failed += failed;
    profile.emergency_tasks_failed += emergency_failed;
    failed
}

/// Read-only completion sweep. Computes everything a commit would pay out
/// without touching the profile. Emergency and bonus boosts are applied
/// here, per bundle; the global difficulty multiplier is not.
#[must_use]
pub fn collect_completions(
    profile: &Profile,
    ctx: &RewardCtx<'_>,
    rng: &mut impl Rng,
) -> CompletionMetrics {
    let mut metrics = CompletionMetrics::default();
    for task in &profile.tasks {
        if !task.is_complete() {
            continue;
        }
        let mut bundle =
            loot::calculate_reward_package(RewardSource::Task, task.difficulty, profile, ctx, rng);
        if task.emergency {
            bundle.scale(EMERGENCY_REWARD_BOOST);
            metrics.emergency += 1;
        }
        if task.bonus_complete() {
            bundle.scale(1.5);
            metrics.bonus_objectives += 1;
        }
        match task.difficulty {
            TaskDifficulty::Easy => metrics.easy += 1,
            TaskDifficulty::Medium => metrics.medium += 1,
            TaskDifficulty::Hard => metrics.hard += 1,
        }
        metrics.completed.push(task.number);
        metrics.bundles.push(bundle);
    }
    metrics
}

/// Commit a completion sweep: drop the completed tasks and bump the
/// lifetime counters. Currency grants happen in the raid commit path.
pub fn apply_completions(profile: &mut Profile, metrics: &CompletionMetrics) {
    profile
        .tasks
        .retain(|t| !metrics.completed.contains(&t.number));
    profile.total_completed_tasks += metrics.total();
    profile.easy_completed += metrics.easy;
    profile.medium_completed += metrics.medium;
    profile.hard_completed += metrics.hard;
    profile.emergency_completed += metrics.emergency;
    profile.milestones.bonus_objs_count += metrics.bonus_objectives;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::companions::CompanionRoster;
    use crate::loot::LootIndex;
    use crate::modifiers::ModifierCatalog;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn bare_task(number: u32, cycles: u32) -> Task {
        Task {
            number,
            name: format!("task-{number}"),
            desc: String::new(),
            difficulty: TaskDifficulty::Easy,
            objectives: vec![Objective {
                stat: "kills".to_string(),
                icon: String::new(),
                text: "Kill 5".to_string(),
                current: 0,
                target: 5,
                bonus: false,
            }],
            cycles_remaining: cycles,
            emergency: false,
        }
    }

    #[test]
    fn single_cycle_task_survives_one_return() {
        let mut profile = Profile::default();
        profile.tasks.push(bare_task(1, 1));

        // First return: decremented to zero but still on the board.
        assert_eq!(age_tasks(&mut profile), 0);
        assert_eq!(profile.tasks.len(), 1);
        assert_eq!(profile.tasks[0].cycles_remaining, 0);

        // Second return: expired and counted failed.
        assert_eq!(age_tasks(&mut profile), 1);
        assert!(profile.tasks.is_empty());
        assert_eq!(profile.tasks_failed, 1);
    }

    #[test]
    fn board_offers_expire_on_the_same_boundary() {
        let mut profile = Profile::default();
        profile.taskboard_pool.push(bare_task(1, 1));

        // First return: the offer survives at zero cycles.
        age_tasks(&mut profile);
        assert_eq!(profile.taskboard_pool.len(), 1);
        assert_eq!(profile.taskboard_pool[0].cycles_remaining, 0);

        // Second return: gone, but a lapsed offer is not a failure.
        age_tasks(&mut profile);
        assert!(profile.taskboard_pool.is_empty());
        assert_eq!(profile.tasks_failed, 0);
    }

    #[test]
    fn accept_respects_slot_cap() {
        let mut profile = Profile::default();
        profile.unlocked_task_slots = 1;
        profile.taskboard_pool.push(bare_task(1, 3));
        profile.taskboard_pool.push(bare_task(2, 3));

        accept_task(&mut profile, 1).unwrap();
        assert!(matches!(accept_task(&mut profile, 2), Err(TaskError::NoSlots)));
        assert_eq!(profile.taskboard_pool.len(), 1);
    }

    #[test]
    fn reroll_consumes_a_token() {
        let mut profile = Profile::default();
        profile.consumables.task_reroll = 1;
        profile.taskboard_pool.push(bare_task(1, 3));
        let content = TaskContent::default();
        let mut rng = ChaCha20Rng::seed_from_u64(7);

        reroll_task(&mut profile, 1, &content, &mut rng).unwrap();
        assert_eq!(profile.consumables.task_reroll, 0);
        let rerolled = profile.taskboard_pool[0].number;
        assert!(matches!(
            reroll_task(&mut profile, rerolled, &content, &mut rng),
            Err(TaskError::NoRerolls)
        ));
    }

    #[test]
    fn collect_is_read_only_and_apply_commits() {
        let mut profile = Profile::default();
        let mut done = bare_task(1, 3);
        done.objectives[0].current = 5;
        profile.tasks.push(done);
        profile.tasks.push(bare_task(2, 3));

        let roster = CompanionRoster::default();
        let catalog = ModifierCatalog::builtin();
        let index = LootIndex::default();
        let ctx = RewardCtx {
            index: &index,
            roster: &roster,
            catalog: &catalog,
            extra_fortune: 0.0,
        };
        let mut rng = ChaCha20Rng::seed_from_u64(1);

        let before = serde_json::to_value(&profile).unwrap();
        let metrics = collect_completions(&profile, &ctx, &mut rng);
        assert_eq!(serde_json::to_value(&profile).unwrap(), before);
        assert_eq!(metrics.completed, vec![1]);
        assert_eq!(metrics.bundles.len(), 1);

        apply_completions(&mut profile, &metrics);
        assert_eq!(profile.tasks.len(), 1);
        assert_eq!(profile.tasks[0].number, 2);
        assert_eq!(profile.total_completed_tasks, 1);
        assert_eq!(profile.easy_completed, 1);
    }

    #[test]
    fn emergency_bundle_gets_boosted() {
        let mut profile = Profile::default();
        let mut task = bare_task(1, 1);
        task.emergency = true;
        task.difficulty = TaskDifficulty::Easy;
        task.objectives[0].current = 5;
        profile.tasks.push(task.clone());

        let roster = CompanionRoster::default();
        let catalog = ModifierCatalog::builtin();
        let index = LootIndex::default();
        let ctx = RewardCtx {
            index: &index,
            roster: &roster,
            catalog: &catalog,
            extra_fortune: 0.0,
        };
        let mut rng_a = ChaCha20Rng::seed_from_u64(9);
        let boosted = collect_completions(&profile, &ctx, &mut rng_a);

        profile.tasks[0].emergency = false;
        let mut rng_b = ChaCha20Rng::seed_from_u64(9);
        let plain = collect_completions(&profile, &ctx, &mut rng_b);

        assert!(boosted.bundles[0].xp > plain.bundles[0].xp);
        assert_eq!(boosted.emergency, 1);
        assert_eq!(plain.emergency, 0);
    }
}
