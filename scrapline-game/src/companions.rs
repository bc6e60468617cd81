//! Companion roster content, XP sharing, passive bonuses, and the
//! milestone flags that gate loyalty unlocks.
use serde::{Deserialize, Serialize};

use crate::constants::{COMPANION_XP_SHARE, EXTENDED_RAID_MINUTES, ULTIMATE_FILL_MINUTES};
use crate::state::{CompanionRecord, Profile};

pub const COMPANION_MAX_LEVEL: u32 = 10;

/// A console stat adjustment applied while a companion rides along.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StatBuff {
    /// Actor value name as the game console spells it.
    pub av: String,
    /// Delta per companion level.
    pub per_level: f64,
}

/// How a companion becomes recruitable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum UnlockRule {
    FromStart,
    RaidsExtracted { count: u32 },
    TasksCompleted { count: u32 },
    Reputation { minimum: f64 },
}

impl Default for UnlockRule {
    fn default() -> Self {
        Self::FromStart
    }
}

impl UnlockRule {
    #[must_use]
    pub fn is_met(&self, profile: &Profile) -> bool {
        match self {
            Self::FromStart => true,
            Self::RaidsExtracted { count } => profile.raids_extracted >= *count,
            Self::TasksCompleted { count } => profile.total_completed_tasks >= *count,
            Self::Reputation { minimum } => profile.reputation >= *minimum,
        }
    }
}

/// Passive reward multipliers a companion contributes. All four default
/// to the identity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanionBonuses {
    pub xp: f64,
    pub caps: f64,
    pub scrip: f64,
    pub loot: f64,
}

impl Default for CompanionBonuses {
    fn default() -> Self {
        Self {
            xp: 1.0,
            caps: 1.0,
            scrip: 1.0,
            loot: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CompanionDef {
    pub id: String,
    pub name: String,
    pub desc: String,
    pub unlock: UnlockRule,
    /// Multiplier growth per level above the 1.0 identity, e.g. an
    /// `xp_per_level` of 0.02 yields 1.10 xp at level 5.
    pub xp_per_level: f64,
    pub caps_per_level: f64,
    pub scrip_per_level: f64,
    pub loot_per_level: f64,
    pub buffs: Vec<StatBuff>,
}

/// Loadable companion content with a builtin fallback roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CompanionRoster {
    pub companions: Vec<CompanionDef>,
}

impl CompanionRoster {
    #[must_use]
    pub fn builtin() -> Self {
        let buff = |av: &str, per_level: f64| StatBuff {
            av: av.to_string(),
            per_level,
        };
        Self {
            companions: vec![
                CompanionDef {
                    id: "scrapper".to_string(),
                    name: "Rust".to_string(),
                    desc: "A salvage hound with a nose for components.".to_string(),
                    unlock: UnlockRule::FromStart,
                    xp_per_level: 0.0,
                    caps_per_level: 0.01,
                    scrip_per_level: 0.02,
                    loot_per_level: 0.03,
                    buffs: vec![buff("CarryWeight", 5.0)],
                },
                CompanionDef {
                    id: "gunhand".to_string(),
                    name: "Vex".to_string(),
                    desc: "An ex-merc who keeps the crosshairs steady.".to_string(),
                    unlock: UnlockRule::RaidsExtracted { count: 3 },
                    xp_per_level: 0.02,
                    caps_per_level: 0.0,
                    scrip_per_level: 0.0,
                    loot_per_level: 0.0,
                    buffs: vec![buff("Strength", 0.5), buff("Endurance", 0.5)],
                },
                CompanionDef {
                    id: "fixer".to_string(),
                    name: "Dot".to_string(),
                    desc: "A broker who knows what the caravans pay for.".to_string(),
                    unlock: UnlockRule::TasksCompleted { count: 10 },
                    xp_per_level: 0.0,
                    caps_per_level: 0.03,
                    scrip_per_level: 0.01,
                    loot_per_level: 0.0,
                    buffs: vec![buff("Charisma", 0.5)],
                },
            ],
        }
    }

    #[must_use]
    pub fn or_builtin(self) -> Self {
        if self.companions.is_empty() {
            Self::builtin()
        } else {
            self
        }
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&CompanionDef> {
        self.companions.iter().find(|c| c.id == id)
    }
}

/// The active companion's definition and saved record, if one is out.
#[must_use]
pub fn active_companion<'a>(
    profile: &'a Profile,
    roster: &'a CompanionRoster,
) -> Option<(&'a CompanionDef, &'a CompanionRecord)> {
    let id = profile.active_companion.as_deref()?;
    let def = roster.get(id)?;
    let record = profile.companions.get(id)?;
    if !record.unlocked {
        return None;
    }
    Some((def, record))
}

/// Sweep unlock rules and mark newly recruitable companions.
pub fn refresh_unlocks(profile: &mut Profile, roster: &CompanionRoster) {
    for def in &roster.companions {
        if def.unlock.is_met(profile) {
            let record = profile.companions.entry(def.id.clone()).or_default();
            record.unlocked = true;
            if record.level == 0 {
                record.level = 1;
            }
        }
    }
}

/// Passive reward multipliers from the active companion. Loyalty
/// completion boosts the growth rates by half. The tag arguments are
/// reserved for content that keys bonuses to task or raid kinds.
#[must_use]
pub fn companion_bonuses(
    profile: &Profile,
    roster: &CompanionRoster,
    _task_tags: Option<&[String]>,
    _raid_tags: Option<&[String]>,
) -> CompanionBonuses {
    let mut bonuses = CompanionBonuses::default();
    if !profile.companion_buffs_enabled {
        return bonuses;
    }
    let Some((def, record)) = active_companion(profile, roster) else {
        return bonuses;
    };
    let levels = f64::from(record.level);
    let loyalty = if record.loyalty_completed { 1.5 } else { 1.0 };
    bonuses.xp += def.xp_per_level * levels * loyalty;
    bonuses.caps += def.caps_per_level * levels * loyalty;
    bonuses.scrip += def.scrip_per_level * levels * loyalty;
    bonuses.loot += def.loot_per_level * levels * loyalty;
    bonuses
}

/// XP needed to go from `level` to the next one.
#[must_use]
pub fn xp_to_next_level(level: u32) -> i64 {
    i64::from(level) * 1000
}

/// Share a quarter of player XP with the active companion and resolve any
/// level-ups. Returns levels gained.
#[allow(clippy::cast_possible_truncation)]
pub fn grant_companion_xp(profile: &mut Profile, player_xp: i64) -> u32 {
    let Some(id) = profile.active_companion.clone() else {
        return 0;
    };
    let Some(record) = profile.companions.get_mut(&id) else {
        return 0;
    };
    if !record.unlocked || player_xp <= 0 {
        return 0;
    }
    record.xp += (player_xp as f64 * COMPANION_XP_SHARE) as i64;
    let mut gained = 0;
    while record.level < COMPANION_MAX_LEVEL {
        let needed = xp_to_next_level(record.level);
        if record.xp < needed {
            break;
        }
        record.xp -= needed;
        record.level += 1;
        gained += 1;
    }
    gained
}

/// Charge the active companion's ultimate from raid time. The meter holds
/// at full until spent; only time since the previous tick is credited.
pub fn update_ultimate_progress(profile: &mut Profile, delta_secs: f64) {
    if delta_secs <= 0.0 {
        return;
    }
    let Some(id) = profile.active_companion.clone() else {
        return;
    };
    let Some(record) = profile.companions.get_mut(&id) else {
        return;
    };
    if !record.unlocked {
        return;
    }
    let charge = (delta_secs / 60.0) / ULTIMATE_FILL_MINUTES;
    record.ultimate_progress = (record.ultimate_progress + charge).min(1.0);
}

/// Record raid-boundary milestone flags. Loyalty quests open once the
/// active companion hits half level cap with the right flags set.
pub fn record_raid_end_milestones(profile: &mut Profile, extracted: bool, duration_secs: f64) {
    let m = &mut profile.milestones;
    if extracted {
        if duration_secs / 60.0 >= EXTENDED_RAID_MINUTES {
            m.first_extended_raid = true;
        }
        if profile.consecutive_extractions >= 3 {
            m.three_successful_raids = true;
        }
    } else {
        m.first_death = true;
    }
    if profile.emergency_completed > 0 {
        m.first_emergency_task = true;
    }
    if m.bonus_objs_count > 0 {
        m.first_bonus_objective = true;
    }
    if m.bonus_objs_count >= 5 {
        m.five_bonus_objectives_total = true;
    }
    if profile.threat_level >= crate::constants::THREAT_MAX {
        m.first_threat_level_5 = true;
    }

    let unlock_loyalty = m.three_successful_raids && m.first_bonus_objective;
    if let Some(id) = profile.active_companion.clone() {
        if let Some(record) = profile.companions.get_mut(&id) {
            if unlock_loyalty && record.level >= COMPANION_MAX_LEVEL / 2 {
                record.loyalty_unlocked = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile_with_active(id: &str, level: u32) -> Profile {
        let mut profile = Profile::default();
        profile.active_companion = Some(id.to_string());
        profile.companions.insert(
            id.to_string(),
            CompanionRecord {
                unlocked: true,
                level,
                xp: 0,
                loyalty_unlocked: false,
                loyalty_completed: false,
                ultimate_progress: 0.0,
            },
        );
        profile
    }

    #[test]
    fn bonuses_scale_with_level_and_loyalty() {
        let roster = CompanionRoster::builtin();
        let profile = profile_with_active("scrapper", 5);
        let bonuses = companion_bonuses(&profile, &roster, None, None);
        assert!((bonuses.scrip - 1.10).abs() < 1e-9);
        assert!((bonuses.loot - 1.15).abs() < 1e-9);

        let mut loyal = profile.clone();
        loyal
            .companions
            .get_mut("scrapper")
            .unwrap()
            .loyalty_completed = true;
        let boosted = companion_bonuses(&loyal, &roster, None, None);
        assert!(boosted.scrip > bonuses.scrip);
    }

    #[test]
    fn disabled_toggle_silences_bonuses() {
        let roster = CompanionRoster::builtin();
        let mut profile = profile_with_active("scrapper", 5);
        profile.companion_buffs_enabled = false;
        let bonuses = companion_bonuses(&profile, &roster, None, None);
        assert!((bonuses.scrip - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn xp_share_levels_up() {
        let mut profile = profile_with_active("gunhand", 1);
        // 25% of 4000 player xp covers the 1000-xp first level exactly.
        let gained = grant_companion_xp(&mut profile, 4000);
        assert_eq!(gained, 1);
        let record = &profile.companions["gunhand"];
        assert_eq!(record.level, 2);
        assert_eq!(record.xp, 0);
    }

    #[test]
    fn ultimate_charges_from_delta_and_saturates() {
        let mut profile = profile_with_active("fixer", 3);
        update_ultimate_progress(&mut profile, 15.0 * 60.0);
        let halfway = profile.companions["fixer"].ultimate_progress;
        assert!((halfway - 0.5).abs() < 1e-9);

        update_ultimate_progress(&mut profile, 120.0 * 60.0);
        assert!((profile.companions["fixer"].ultimate_progress - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unlock_rules_sweep() {
        let roster = CompanionRoster::builtin();
        let mut profile = Profile::default();
        refresh_unlocks(&mut profile, &roster);
        assert!(profile.companions["scrapper"].unlocked);
        assert!(!profile.companions.contains_key("gunhand"));

        profile.raids_extracted = 3;
        refresh_unlocks(&mut profile, &roster);
        assert!(profile.companions["gunhand"].unlocked);
        assert_eq!(profile.companions["gunhand"].level, 1);
    }
}
