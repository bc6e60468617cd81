//! Loot pools, reward-package math, and the reward history ledger.
//!
//! Multiplier ordering is load-bearing: per-source multipliers (buffs,
//! companions, emergency boosts, modifier bonuses) are applied inside each
//! package here; the single global difficulty multiplier is applied later,
//! once, to the aggregated sums in `raid::aggregate_rewards`.
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::companions::{self, CompanionRoster};
use crate::constants::{
    EXTRACTION_CAPS_RANGE, EXTRACTION_RAMP_MAX_MINUTES, EXTRACTION_RAMP_MIN_MINUTES,
    EXTRACTION_SCRIP_RANGE, EXTRACTION_XP_RANGE, REWARD_HISTORY_CAP,
};
use crate::modifiers::ModifierCatalog;
use crate::state::Profile;
use crate::tasks::TaskDifficulty;

/// One item definition in a loot pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LootItemDef {
    pub code: String,
    pub name: String,
    pub category: String,
    pub rarity: String,
}

/// A granted item line inside a reward bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ItemGrant {
    pub code: String,
    pub name: String,
    pub qty: i64,
    pub from_modifier: bool,
}

/// A full reward payload: currencies plus item lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RewardBundle {
    pub xp: i64,
    pub caps: i64,
    pub scrip: i64,
    pub items: Vec<ItemGrant>,
}

impl RewardBundle {
    /// Fold another bundle into this one (sums currencies, extends items).
    pub fn absorb(&mut self, other: &Self) {
        self.xp += other.xp;
        self.caps += other.caps;
        self.scrip += other.scrip;
        self.items.extend(other.items.iter().cloned());
    }

    /// Scale the currency sums by one multiplier, truncating like the
    /// game's integer economy does.
    #[allow(clippy::cast_possible_truncation)]
    pub fn scale(&mut self, mult: f64) {
        self.xp = (self.xp as f64 * mult) as i64;
        self.caps = (self.caps as f64 * mult) as i64;
        self.scrip = (self.scrip as f64 * mult) as i64;
    }
}

/// Ledger entry shown in the reward history view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RewardLogEntry {
    pub source: String,
    pub at: f64,
    pub xp: i64,
    pub caps: i64,
    pub scrip: i64,
    pub items: Vec<ItemGrant>,
}

/// Where a reward package originates; raid-sourced packages are the only
/// ones a raid modifier may sweeten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardSource {
    Task,
    Raid,
}

/// Read-through index over all loot pools, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct LootIndex {
    all: Vec<LootItemDef>,
    by_category: BTreeMap<String, Vec<usize>>,
    by_rarity: BTreeMap<String, Vec<usize>>,
}

impl LootIndex {
    #[must_use]
    pub fn build(pools: Vec<Vec<LootItemDef>>) -> Self {
        let mut index = Self::default();
        for item in pools.into_iter().flatten() {
            if item.code.is_empty() {
                continue;
            }
            let idx = index.all.len();
            index
                .by_category
                .entry(item.category.clone())
                .or_default()
                .push(idx);
            index
                .by_rarity
                .entry(item.rarity.clone())
                .or_default()
                .push(idx);
            index.all.push(item);
        }
        index
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.all.len()
    }

    fn pick(
        &self,
        category: Option<&str>,
        rarity: Option<&str>,
        rng: &mut impl Rng,
    ) -> Option<&LootItemDef> {
        let candidates: Vec<&LootItemDef> = self
            .all
            .iter()
            .filter(|i| category.is_none_or(|c| i.category == c))
            .filter(|i| rarity.is_none_or(|r| i.rarity == r))
            .collect();
        if candidates.is_empty() {
            // Relax the rarity constraint before giving up.
            let fallback: Vec<&LootItemDef> = self
                .all
                .iter()
                .filter(|i| category.is_none_or(|c| i.category == c))
                .collect();
            return fallback.choose(rng).copied();
        }
        candidates.choose(rng).copied()
    }
}

/// Aggregated player-side reward multipliers from consumable buffs and the
/// active companion.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerModifiers {
    pub xp_mult: f64,
    pub caps_mult: f64,
    pub scrip_mult: f64,
    pub loot_count_bonus: i32,
    pub effective_fortune: f64,
}

/// Shared inputs for reward computation.
pub struct RewardCtx<'a> {
    pub index: &'a LootIndex,
    pub roster: &'a CompanionRoster,
    pub catalog: &'a ModifierCatalog,
    /// Ephemeral fortune injected for the calculation only (e.g. the
    /// VeryHard high-stakes bonus); never written to the profile.
    pub extra_fortune: f64,
}

/// Combine consumable buffs and companion bonuses into one modifier set.
#[must_use]
pub fn player_modifiers(profile: &Profile, roster: &CompanionRoster) -> PlayerModifiers {
    let mut mods = PlayerModifiers {
        xp_mult: 1.0,
        caps_mult: 1.0,
        scrip_mult: 1.0,
        loot_count_bonus: 0,
        effective_fortune: profile.fortune,
    };

    for buff in &profile.active_buffs {
        match buff.id.as_str() {
            "xp_boost" | "rested_xp" => mods.xp_mult += 0.25,
            "caps_boost" => mods.caps_mult += 0.25,
            "scrip_boost" => mods.scrip_mult += 0.25,
            "loot_quantity" => mods.loot_count_bonus += 1,
            "fortune_boost" => mods.effective_fortune += 2.0,
            _ => {}
        }
    }

    let bonuses = companions::companion_bonuses(profile, roster, None, None);
    mods.xp_mult += bonuses.xp - 1.0;
    mods.caps_mult += bonuses.caps - 1.0;
    mods.scrip_mult += bonuses.scrip - 1.0;

    mods
}

/// Weighted category pick. Reputation tilts toward combat gear; fortune
/// tilts toward valuables.
fn choose_category(rep: f64, fortune: f64, rng: &mut impl Rng) -> &'static str {
    let tilt = rep * 1.5;
    let weights: [(&str, f64); 5] = [
        ("consumable", (40.0 - tilt).max(5.0)),
        ("ammo", (30.0 - tilt).max(5.0)),
        ("weapon", 10.0 + tilt),
        ("armor", 10.0 + tilt),
        ("misc", 10.0 + fortune),
    ];
    weights
        .choose_weighted(rng, |(_, w)| *w)
        .map_or("consumable", |(c, _)| c)
}

/// Weighted rarity tier pick, banded by difficulty then scaled by
/// reputation and fortune.
fn choose_rarity(
    rep: f64,
    fortune: f64,
    difficulty: TaskDifficulty,
    rng: &mut impl Rng,
) -> &'static str {
    let (mut t1, mut t2, mut t3, mut t4) = match difficulty {
        TaskDifficulty::Easy => (100.0, 5.0, 0.0, 0.0),
        TaskDifficulty::Medium => (80.0, 30.0, 5.0, 0.0),
        TaskDifficulty::Hard => (50.0, 60.0, 20.0, 2.0),
    };

    t2 += rep * 10.0;
    t3 += rep * 5.0;
    if rep > 5.0 {
        t4 += (rep - 5.0) * 2.0;
    }

    t2 += fortune * 3.0;
    t3 += fortune * 1.5;
    t4 += fortune * 0.5;

    // Squeeze commons once high tiers become likely.
    t1 = (t1 - (t2 + t3 + t4) * 0.2).max(10.0);

    let weights: [(&str, f64); 4] =
        [("tier_1", t1), ("tier_2", t2), ("tier_3", t3), ("tier_4", t4)];
    weights
        .choose_weighted(rng, |(_, w)| *w)
        .map_or("tier_1", |(t, _)| t)
}

/// Generate a full reward bundle (xp, caps, scrip, items) for one source.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn calculate_reward_package(
    source: RewardSource,
    difficulty: TaskDifficulty,
    profile: &Profile,
    ctx: &RewardCtx<'_>,
    rng: &mut impl Rng,
) -> RewardBundle {
    let mut mods = player_modifiers(profile, ctx.roster);
    let rep = crate::stats::reputation_score(profile);
    let mut fortune = mods.effective_fortune + ctx.extra_fortune;

    let modifier = ctx.catalog.get(&profile.current_raid_modifier);
    if source == RewardSource::Raid {
        if let Some(m) = modifier {
            fortune += m.effects.loot_fortune_bonus;
            mods.scrip_mult += m.effects.scrip_mult_bonus;
        }
    }

    let (base_caps, base_scrip, base_xp) = match difficulty {
        TaskDifficulty::Easy => (100.0, 1.0, 100.0),
        TaskDifficulty::Medium => (300.0, 3.0, 300.0),
        TaskDifficulty::Hard => (600.0, 6.0, 600.0),
    };

    let caps_mult = mods.caps_mult * profile.economy.caps_mult + fortune * 0.01;
    let xp_mult = mods.xp_mult * profile.economy.xp_mult;
    let scrip_mult = mods.scrip_mult * profile.economy.scrip_mult;

    let mut bundle = RewardBundle {
        xp: (base_xp * xp_mult) as i64,
        caps: (base_caps * caps_mult) as i64,
        scrip: (base_scrip * scrip_mult) as i64,
        items: Vec::new(),
    };

    if ctx.index.is_empty() {
        return bundle;
    }

    let base_items = match difficulty {
        TaskDifficulty::Easy => 1,
        TaskDifficulty::Medium => 2,
        TaskDifficulty::Hard => 3,
    };
    let mut total_items: i32 = base_items + mods.loot_count_bonus;
    if rep >= 8.0 {
        total_items += 1;
    }
    let companion = companions::companion_bonuses(profile, ctx.roster, None, None);
    if companion.loot > 1.0 && rng.r#gen::<f64>() < companion.loot - 1.0 {
        total_items += 1;
    }

    for _ in 0..total_items.max(0) {
        let cat = choose_category(rep, fortune, rng);
        let tier = choose_rarity(rep, fortune, difficulty, rng);
        if let Some(item) = ctx.index.pick(Some(cat), Some(tier), rng) {
            let base_qty: i64 = match cat {
                "ammo" => rng.gen_range(20..=50),
                "consumable" => rng.gen_range(1..=2),
                _ => 1,
            };
            let mut q_mult = 1.0 + rep * 0.1 + fortune * 0.05;
            match difficulty {
                TaskDifficulty::Medium => q_mult += 0.2,
                TaskDifficulty::Hard => q_mult += 0.5,
                TaskDifficulty::Easy => {}
            }
            bundle.items.push(ItemGrant {
                code: item.code.clone(),
                name: item.name.clone(),
                qty: ((base_qty as f64 * q_mult) as i64).max(1),
                from_modifier: false,
            });
        }
    }

    // Raid modifiers may tack on one extra roll at inflated fortune.
    if source == RewardSource::Raid {
        if let Some(m) = modifier {
            let chance = if m.effects.guaranteed_bonus_item { 1.0 } else { 0.5 };
            if rng.r#gen::<f64>() < chance {
                let tier = choose_rarity(rep, fortune + 5.0, difficulty, rng);
                if let Some(item) = ctx.index.pick(None, Some(tier), rng) {
                    bundle.items.push(ItemGrant {
                        code: item.code.clone(),
                        name: item.name.clone(),
                        qty: 1,
                        from_modifier: true,
                    });
                }
            }
        }
    }

    bundle
}

/// Survival bonus for raid time: a linear ramp between the min and max
/// thresholds, then player multipliers. No items.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn extraction_time_reward(
    duration_secs: f64,
    profile: &Profile,
    roster: &CompanionRoster,
) -> RewardBundle {
    let minutes = duration_secs / 60.0;
    let factor = if minutes < EXTRACTION_RAMP_MIN_MINUTES {
        0.0
    } else if minutes >= EXTRACTION_RAMP_MAX_MINUTES {
        1.0
    } else {
        (minutes - EXTRACTION_RAMP_MIN_MINUTES)
            / (EXTRACTION_RAMP_MAX_MINUTES - EXTRACTION_RAMP_MIN_MINUTES)
    };

    let lerp = |(lo, hi): (i64, i64)| (lo as f64 + (hi - lo) as f64 * factor) as i64;
    let base_scrip = lerp(EXTRACTION_SCRIP_RANGE);
    let base_caps = lerp(EXTRACTION_CAPS_RANGE);
    let base_xp = lerp(EXTRACTION_XP_RANGE);

    let mods = player_modifiers(profile, roster);
    let xp_mult = mods.xp_mult * profile.economy.xp_mult;
    let caps_mult = mods.caps_mult * profile.economy.caps_mult + mods.effective_fortune * 0.01;
    let scrip_mult = mods.scrip_mult * profile.economy.scrip_mult;

    RewardBundle {
        xp: (base_xp as f64 * xp_mult) as i64,
        caps: (base_caps as f64 * caps_mult) as i64,
        scrip: (base_scrip as f64 * scrip_mult) as i64,
        items: Vec::new(),
    }
}

/// Append a bundle to the capped reward history.
pub fn log_reward(profile: &mut Profile, source: &str, bundle: &RewardBundle, now: f64) {
    profile.reward_history.push(RewardLogEntry {
        source: source.to_string(),
        at: now,
        xp: bundle.xp,
        caps: bundle.caps,
        scrip: bundle.scrip,
        items: bundle.items.clone(),
    });
    let len = profile.reward_history.len();
    if len > REWARD_HISTORY_CAP {
        profile.reward_history.drain(..len - REWARD_HISTORY_CAP);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn sample_index() -> LootIndex {
        let mk = |code: &str, cat: &str, rarity: &str| LootItemDef {
            code: code.to_string(),
            name: code.to_string(),
            category: cat.to_string(),
            rarity: rarity.to_string(),
        };
        LootIndex::build(vec![vec![
            mk("AMMO1", "ammo", "tier_1"),
            mk("CONS1", "consumable", "tier_1"),
            mk("WEAP2", "weapon", "tier_2"),
            mk("ARMR1", "armor", "tier_1"),
            mk("MISC3", "misc", "tier_3"),
        ]])
    }

    #[test]
    fn time_reward_ramps_with_duration() {
        let profile = Profile::default();
        let roster = CompanionRoster::default();
        let short = extraction_time_reward(5.0 * 60.0, &profile, &roster);
        let long = extraction_time_reward(45.0 * 60.0, &profile, &roster);
        assert_eq!(short.xp, 100);
        assert_eq!(short.caps, 50);
        assert_eq!(short.scrip, 1);
        assert_eq!(long.xp, 300);
        assert_eq!(long.caps, 150);
        assert_eq!(long.scrip, 3);
    }

    #[test]
    fn package_scales_with_difficulty() {
        let profile = Profile::default();
        let roster = CompanionRoster::default();
        let catalog = ModifierCatalog::builtin();
        let index = sample_index();
        let ctx = RewardCtx {
            index: &index,
            roster: &roster,
            catalog: &catalog,
            extra_fortune: 0.0,
        };
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let easy =
            calculate_reward_package(RewardSource::Task, TaskDifficulty::Easy, &profile, &ctx, &mut rng);
        let hard =
            calculate_reward_package(RewardSource::Task, TaskDifficulty::Hard, &profile, &ctx, &mut rng);
        assert!(hard.xp > easy.xp);
        assert!(hard.caps > easy.caps);
        assert!(hard.items.len() >= easy.items.len());
        assert!(!easy.items.is_empty());
    }

    #[test]
    fn buff_multipliers_feed_packages() {
        let mut profile = Profile::default();
        profile.active_buffs.push(crate::state::ActiveBuff {
            id: "xp_boost".to_string(),
            name: "XP Boost".to_string(),
        });
        let roster = CompanionRoster::default();
        let mods = player_modifiers(&profile, &roster);
        assert!((mods.xp_mult - 1.25).abs() < f64::EPSILON);
    }

    #[test]
    fn history_is_capped() {
        let mut profile = Profile::default();
        let bundle = RewardBundle {
            xp: 1,
            caps: 1,
            scrip: 0,
            items: Vec::new(),
        };
        for i in 0..60 {
            log_reward(&mut profile, "test", &bundle, f64::from(i));
        }
        assert_eq!(profile.reward_history.len(), REWARD_HISTORY_CAP);
        assert!((profile.reward_history[0].at - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn bundle_scale_truncates_like_integer_economy() {
        let mut bundle = RewardBundle {
            xp: 150,
            caps: 70,
            scrip: 3,
            items: Vec::new(),
        };
        bundle.scale(1.5);
        assert_eq!(bundle.xp, 225);
        assert_eq!(bundle.caps, 105);
        assert_eq!(bundle.scrip, 4);
    }

    #[test]
    fn bundle_scale_applies_penalty_multipliers() {
        let mut bundle = RewardBundle {
            xp: 150,
            caps: 70,
            scrip: 3,
            items: Vec::new(),
        };
        bundle.scale(0.5);
        assert_eq!(bundle.xp, 75);
        assert_eq!(bundle.caps, 35);
        assert_eq!(bundle.scrip, 1);
    }
}
