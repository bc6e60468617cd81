//! In-raid ambush scheduling and spawn batch construction.
//!
//! The trigger check rolls every tick once the floor has passed; only a
//! roll that actually fires stamps the cooldown, so repeated calls inside
//! one cooldown window cannot double-fire.
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::constants::{
    AMBUSH_BASE_CHANCE, AMBUSH_COOLDOWN_SECS, AMBUSH_DELAY_MAX_SECS, AMBUSH_DELAY_MIN_SECS,
    AMBUSH_FIRST_FLOOR_SECS, AMBUSH_MAX_OFFSET, AMBUSH_MIN_OFFSET, AMBUSH_THREAT_FACTOR,
    AMBUSH_TIER_GRACE,
};
use crate::console;
use crate::modifiers::{AmbushRule, ModifierEffects};
use crate::state::Profile;

/// A world-space player position snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// One spawn line inside an ambush group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SpawnLine {
    pub code: String,
    pub count: u32,
}

/// An ambush wave definition, gated by threat tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AmbushGroupDef {
    pub id: String,
    pub name: String,
    pub threat_tier: i32,
    pub spawns: Vec<SpawnLine>,
}

/// Loadable ambush wave content with a builtin fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AmbushContent {
    pub groups: Vec<AmbushGroupDef>,
}

impl AmbushContent {
    #[must_use]
    pub fn builtin() -> Self {
        let group = |id: &str, name: &str, tier: i32, spawns: Vec<(&str, u32)>| AmbushGroupDef {
            id: id.to_string(),
            name: name.to_string(),
            threat_tier: tier,
            spawns: spawns
                .into_iter()
                .map(|(code, count)| SpawnLine {
                    code: code.to_string(),
                    count,
                })
                .collect(),
        };
        Self {
            groups: vec![
                group("feral_pack", "Feral Pack", 1, vec![("0001CF95", 3)]),
                group("raider_patrol", "Raider Patrol", 2, vec![("0002EA90", 2), ("0002EA91", 1)]),
                group("mutant_squad", "Mutant Squad", 3, vec![("0001CF99", 2), ("0001CF9A", 1)]),
                group("deathclaw_pair", "Deathclaw Pair", 5, vec![("000A2B44", 2)]),
            ],
        }
    }

    #[must_use]
    pub fn or_builtin(self) -> Self {
        if self.groups.is_empty() {
            Self::builtin()
        } else {
            self
        }
    }

    /// Groups at or below the current threat tier, with one tier of grace.
    #[must_use]
    pub fn eligible(&self, threat: i32) -> Vec<&AmbushGroupDef> {
        self.groups
            .iter()
            .filter(|g| g.threat_tier <= threat + AMBUSH_TIER_GRACE)
            .collect()
    }

    #[must_use]
    pub fn choose(&self, threat: i32, rng: &mut impl Rng) -> Option<&AmbushGroupDef> {
        self.eligible(threat).choose(rng).copied()
    }
}

/// Decide whether an ambush fires on this tick. The roll repeats every
/// tick; only a firing decision stamps the cooldown, so a poll loop
/// calling this repeatedly gets at most one trigger per cooldown window
/// without starving the per-tick odds. `force` skips the time gates and
/// the roll but never overrides a modifier that disables ambushes.
pub fn should_trigger(
    profile: &mut Profile,
    effects: &ModifierEffects,
    now: f64,
    force: bool,
    rng: &mut impl Rng,
) -> bool {
    let (cooldown, bonus_chance) = match effects.ambush {
        AmbushRule::Disabled => return false,
        AmbushRule::Normal => (AMBUSH_COOLDOWN_SECS, 0.0),
        AmbushRule::Frenzied {
            cooldown_secs,
            bonus_chance,
        } => (cooldown_secs, bonus_chance),
    };

    if !force {
        if profile.effective_elapsed(now) < AMBUSH_FIRST_FLOOR_SECS {
            return false;
        }
        if profile.ambush.last_check_time > 0.0
            && now - profile.ambush.last_check_time < cooldown
        {
            return false;
        }
    }

    let triggered = if force {
        true
    } else {
        let chance =
            AMBUSH_BASE_CHANCE + f64::from(profile.threat_level) * AMBUSH_THREAT_FACTOR + bonus_chance;
        rng.r#gen::<f64>() < chance
    };
    if triggered {
        profile.ambush.last_check_time = now;
        profile.ambush.ambushes_triggered += 1;
    }
    triggered
}

/// Random spawn offset: at least the floor distance out, random sign.
fn spawn_offset(rng: &mut impl Rng) -> f64 {
    let magnitude = rng.gen_range(AMBUSH_MIN_OFFSET..=AMBUSH_MAX_OFFSET);
    let sign = if rng.r#gen::<bool>() { 1.0 } else { -1.0 };
    f64::from(magnitude) * sign
}

/// Seconds between a trigger decision and the spawn batch going out, so
/// the wave lands just after the player moves on from the snapshot spot.
pub fn roll_delay(rng: &mut impl Rng) -> f64 {
    rng.gen_range(AMBUSH_DELAY_MIN_SECS..=AMBUSH_DELAY_MAX_SECS)
}

/// Build the spawn command batch: each creature placed at an offset from
/// the position snapshot, then the player snapped back to the snapshot so
/// the wave closes in rather than spawning on top of them.
#[must_use]
pub fn build_spawn_batch(group: &AmbushGroupDef, pos: Position, rng: &mut impl Rng) -> Vec<String> {
    let mut batch = Vec::new();
    for line in &group.spawns {
        for _ in 0..line.count {
            let x = pos.x + spawn_offset(rng);
            let y = pos.y + spawn_offset(rng);
            batch.push(console::place_at(&line.code, x, y, pos.z));
        }
    }
    batch.push(console::set_pos('x', pos.x));
    batch.push(console::set_pos('y', pos.y));
    batch.push(console::set_pos('z', pos.z));
    batch
}
