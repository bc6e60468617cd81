//! Raid lifecycle: departure, extraction planning and commit, death
//! cleanup, and the shared return path.
//!
//! Extraction is split into a read-only plan and a separate commit so the
//! profile only changes after the reward batch is verified in-game. A
//! failed or unverified batch leaves the save untouched and the raid
//! still active.
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;
use thiserror::Error;

use crate::companions;
use crate::console;
use crate::constants::{
    DEFAULT_EXTRACTION_COUNT, EMERGENCY_TASK_CHANCE, SOS_UNLOCK_SECS, THREAT_MAX,
};
use crate::content::GameContent;
use crate::loot::{self, RewardBundle, RewardCtx};
use crate::modifiers::{ExtractionRule, ModifierEffects, SosRule};
use crate::state::{Profile, RaidDifficulty};
use crate::stats;
use crate::tasks::{self, CompletionMetrics};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RaidError {
    #[error("a raid is already active")]
    AlreadyActive,
    #[error("no raid is active")]
    NotActive,
}

#[derive(Debug, Error, PartialEq)]
pub enum SosError {
    #[error("no raid is active")]
    NotActive,
    #[error("flare locked for another {remaining_secs:.0}s")]
    Locked { remaining_secs: f64 },
    #[error("flare is jammed this raid")]
    Jammed,
    #[error("no flares left")]
    NoFlares,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RaidOutcome {
    Extracted,
    SosExtracted,
    Died,
    TimeExpired,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RaidEndReport {
    pub outcome: RaidOutcome,
    pub duration_secs: f64,
    pub rewards: Option<RewardBundle>,
}

/// What departure decided, for logging and the depart command batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepartureReport {
    pub modifier_id: String,
    pub extraction_points: Vec<String>,
    pub emergency_tasks_added: u32,
}

/// The current modifier's effect block, falling back to no effects when
/// the save references an id the catalog no longer carries.
#[must_use]
pub fn current_effects(profile: &Profile, content: &GameContent) -> ModifierEffects {
    content
        .modifiers
        .get(&profile.current_raid_modifier)
        .map(|m| m.effects.clone())
        .unwrap_or_default()
}

/// Weighted departure pick. Locations whose tier matches the selected
/// difficulty weigh the most; each tier of distance costs a step, with
/// every location keeping at least a sliver of a chance.
fn roll_location(content: &GameContent, difficulty: RaidDifficulty, rng: &mut impl Rng) -> String {
    let selected = i32::from(difficulty.tier());
    content
        .raid_locations
        .choose_weighted(rng, |loc| {
            (4 - (i32::from(loc.tier) - selected).abs()).max(1) as u32
        })
        .map(|loc| loc.name.clone())
        .unwrap_or_default()
}

fn extraction_count(rule: ExtractionRule, rng: &mut impl Rng) -> usize {
    match rule {
        ExtractionRule::Default => DEFAULT_EXTRACTION_COUNT,
        ExtractionRule::Fixed { count } => count.max(1),
        ExtractionRule::Range { min, max } => rng.gen_range(min.max(1)..=max.max(min.max(1))),
    }
}

/// Start a raid: stamp the session, sample extraction points, and seed
/// emergency tasks. The cycle's modifier was rolled at the previous
/// return (or at first load) and announced on the board, so departure
/// only reads it.
pub fn begin_raid(
    profile: &mut Profile,
    content: &GameContent,
    difficulty: RaidDifficulty,
    location: Option<&str>,
    now: f64,
    rng: &mut impl Rng,
) -> Result<DepartureReport, RaidError> {
    if profile.raid_active {
        return Err(RaidError::AlreadyActive);
    }

    let effects = current_effects(profile, content);

    profile.raid_active = true;
    profile.reset_pause();
    profile.last_raid_start_timestamp = now;
    profile.raid_paused_elapsed = 0.0;
    profile.last_tick_at = now;
    profile.last_raid_duration = 0.0;
    profile.raid_difficulty_selection = difficulty;
    profile.current_raid_location =
        location.map_or_else(|| roll_location(content, difficulty, rng), str::to_string);
    profile.ambush = Default::default();
    profile.current_bonuses.clear();
    profile.raids_started += 1;

    let count = extraction_count(effects.extraction, rng);
    profile.current_extractions = content
        .extraction_points
        .choose_multiple(rng, count)
        .cloned()
        .collect();

    if effects.force_max_threat {
        profile.original_threat_level = Some(profile.threat_level);
        profile.threat_level = THREAT_MAX;
    }

    let mut emergency_tasks_added = 0;
    let spawn_emergency =
        effects.emergency_tasks_on_start || rng.r#gen::<f64>() < EMERGENCY_TASK_CHANCE;
    if spawn_emergency {
        tasks::spawn_emergency_task(profile, &content.tasks, rng);
        emergency_tasks_added = 1;
    }

    Ok(DepartureReport {
        modifier_id: profile.current_raid_modifier.clone(),
        extraction_points: profile.current_extractions.clone(),
        emergency_tasks_added,
    })
}

/// Validate and consume an SOS flare. The extraction itself still goes
/// through the plan/commit pair with the SOS flag set.
pub fn use_sos_flare(
    profile: &mut Profile,
    effects: &ModifierEffects,
    now: f64,
) -> Result<(), SosError> {
    if !profile.raid_active {
        return Err(SosError::NotActive);
    }
    if effects.sos == SosRule::Jammed {
        return Err(SosError::Jammed);
    }
    let elapsed = profile.effective_elapsed(now);
    if elapsed < SOS_UNLOCK_SECS {
        return Err(SosError::Locked {
            remaining_secs: SOS_UNLOCK_SECS - elapsed,
        });
    }
    if profile.consumables.sos_flare <= 0 {
        return Err(SosError::NoFlares);
    }
    profile.consumables.sos_flare -= 1;
    Ok(())
}

/// Everything an extraction would pay and the command batch that grants
/// it in-game. Computed without touching the profile.
#[derive(Debug, Clone)]
pub struct ExtractionPlan {
    pub duration_secs: f64,
    pub metrics: CompletionMetrics,
    pub time_bonus: RewardBundle,
    pub total: RewardBundle,
    pub commands: Vec<String>,
    pub sos: bool,
}

/// Sum task bundles and the time bonus, then apply the one global
/// difficulty multiplier. The modifier's conditional rule scales the time
/// bonus alone, before the aggregate is touched.
#[must_use]
pub fn aggregate_rewards(
    task_bundles: &[RewardBundle],
    time_bonus: &RewardBundle,
    effects: &ModifierEffects,
    duration_secs: f64,
    difficulty: RaidDifficulty,
) -> RewardBundle {
    let mut time_bonus = time_bonus.clone();
    if let Some(rule) = &effects.reward {
        if rule.condition.matches(duration_secs / 60.0) {
            time_bonus.scale(rule.multiplier);
        }
    }

    let mut total = RewardBundle::default();
    for bundle in task_bundles {
        total.absorb(bundle);
    }
    total.absorb(&time_bonus);
    total.scale(difficulty.reward_multiplier());
    total
}

/// Console batch that grants a bundle. Scrip is app-side currency and
/// never crosses into the game.
#[must_use]
pub fn build_reward_batch(bundle: &RewardBundle) -> Vec<String> {
    let mut commands = Vec::new();
    if bundle.xp > 0 {
        commands.push(console::reward_xp(bundle.xp));
    }
    if bundle.caps > 0 {
        commands.push(console::add_caps(bundle.caps));
    }
    for item in &bundle.items {
        commands.push(console::additem(&item.code, item.qty));
    }
    commands
}

/// Compute the full extraction payout without committing anything.
pub fn plan_extraction(
    profile: &Profile,
    content: &GameContent,
    now: f64,
    sos: bool,
    rng: &mut impl Rng,
) -> Result<ExtractionPlan, RaidError> {
    if !profile.raid_active {
        return Err(RaidError::NotActive);
    }
    let duration_secs = profile.effective_elapsed(now);
    let effects = current_effects(profile, content);

    let ctx = RewardCtx {
        index: &content.loot,
        roster: &content.companions,
        catalog: &content.modifiers,
        extra_fortune: profile.raid_difficulty_selection.fortune_bonus(),
    };
    let metrics = tasks::collect_completions(profile, &ctx, rng);

    let mut time_bonus = loot::extraction_time_reward(duration_secs, profile, &content.companions);
    if sos {
        // A flare extraction rescues the raid, not the survival bonus.
        time_bonus.xp /= 2;
        time_bonus.caps /= 2;
        time_bonus.scrip /= 2;
    }

    let total = aggregate_rewards(
        &metrics.bundles,
        &time_bonus,
        &effects,
        duration_secs,
        profile.raid_difficulty_selection,
    );
    let commands = build_reward_batch(&total);

    Ok(ExtractionPlan {
        duration_secs,
        metrics,
        time_bonus,
        total,
        commands,
        sos,
    })
}

/// Commit a verified extraction: currencies, task completions, counters,
/// threat, milestones, then the shared return path. Call exactly once,
/// and only after the plan's command batch was confirmed in-game.
pub fn commit_extraction(
    profile: &mut Profile,
    content: &GameContent,
    plan: &ExtractionPlan,
    now: f64,
    rng: &mut impl Rng,
) -> Result<RaidEndReport, RaidError> {
    if !profile.raid_active {
        return Err(RaidError::NotActive);
    }

    profile.current_xp += plan.total.xp;
    profile.scrip += plan.total.scrip;
    profile.loose_items.extend(plan.total.items.iter().cloned());

    tasks::apply_completions(profile, &plan.metrics);
    companions::grant_companion_xp(profile, plan.total.xp);

    profile.raids_extracted += 1;
    profile.consecutive_extractions += 1;
    profile.consecutive_deaths = 0;
    if plan.sos {
        profile.sos_extracts += 1;
        profile.milestones.first_sos_flare = true;
    }

    stats::adjust_threat_on_extraction(profile, &plan.metrics);
    companions::record_raid_end_milestones(profile, true, plan.duration_secs);
    stats::refresh_reputation(profile);
    companions::refresh_unlocks(profile, &content.companions);
    loot::log_reward(profile, "extraction", &plan.total, now);

    raid_return_shared(profile, content, plan.duration_secs, rng);

    Ok(RaidEndReport {
        outcome: if plan.sos {
            RaidOutcome::SosExtracted
        } else {
            RaidOutcome::Extracted
        },
        duration_secs: plan.duration_secs,
        rewards: Some(plan.total.clone()),
    })
}

/// What a death costs: every loose item without insurance cover, plus
/// the console batch that takes them away. Read-only, like the
/// extraction plan.
#[derive(Debug, Clone)]
pub struct DeathPlan {
    pub duration_secs: f64,
    pub lost_items: Vec<crate::loot::ItemGrant>,
    pub commands: Vec<String>,
    pub outcome: RaidOutcome,
}

pub fn prepare_death(
    profile: &Profile,
    now: f64,
    outcome: RaidOutcome,
) -> Result<DeathPlan, RaidError> {
    if !profile.raid_active {
        return Err(RaidError::NotActive);
    }
    let lost_items: Vec<_> = profile
        .loose_items
        .iter()
        .filter(|item| !profile.insured_items.contains(&item.code))
        .cloned()
        .collect();
    let commands = lost_items
        .iter()
        .map(|item| console::remove_item(&item.code, item.qty))
        .collect();
    Ok(DeathPlan {
        duration_secs: profile.effective_elapsed(now),
        lost_items,
        commands,
        outcome,
    })
}

/// Commit a death or time-expiry: item losses, counters, threat, then
/// the shared return path. No rewards.
pub fn commit_death(
    profile: &mut Profile,
    content: &GameContent,
    plan: &DeathPlan,
    rng: &mut impl Rng,
) -> Result<RaidEndReport, RaidError> {
    if !profile.raid_active {
        return Err(RaidError::NotActive);
    }

    let insured = profile.insured_items.clone();
    profile.loose_items.retain(|item| insured.contains(&item.code));

    profile.raids_died += 1;
    profile.consecutive_deaths += 1;
    profile.consecutive_extractions = 0;

    stats::adjust_threat_on_failure(profile);
    companions::record_raid_end_milestones(profile, false, plan.duration_secs);
    stats::refresh_reputation(profile);

    raid_return_shared(profile, content, plan.duration_secs, rng);

    Ok(RaidEndReport {
        outcome: plan.outcome,
        duration_secs: plan.duration_secs,
        rewards: None,
    })
}

/// Cleanup every raid end runs, extracted or not: close the session,
/// restore pinned threat, expire insurance, age the board, advance the
/// day cycle, and reroll the next cycle's modifier.
pub fn raid_return_shared(
    profile: &mut Profile,
    content: &GameContent,
    duration_secs: f64,
    rng: &mut impl Rng,
) {
    profile.raid_active = false;
    profile.reset_pause();
    profile.last_raid_duration = duration_secs;
    profile.last_tick_at = 0.0;
    profile.current_raid_location.clear();
    profile.current_extractions.clear();
    profile.ambush = Default::default();
    profile.current_bonuses.clear();
    profile.baseline.clear();
    profile.buffs_active = false;
    // Lunchbox buffs last one expedition; they never roll over.
    profile.active_buffs.clear();

    if let Some(original) = profile.original_threat_level.take() {
        profile.threat_level = original;
        profile.clamp_threat();
    }

    // Insurance is per-raid; cover ends the moment the raid does.
    profile.insured_items.clear();

    tasks::age_tasks(profile);
    for task in &mut profile.tasks {
        for obj in &mut task.objectives {
            obj.current = 0;
        }
    }

    profile.day_cycle += 1;
    profile.current_raid_modifier = content.modifiers.roll(rng).id.clone();
    tasks::refresh_taskboard(profile, &content.tasks, rng);
}
