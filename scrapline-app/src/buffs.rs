//! Companion stat buffs and lunchbox reward buffs.
//!
//! Companion buffs land in-game as `modav` deltas, so removal is the
//! exact negative of application. The profile only tracks whether the
//! deltas are currently applied; the amounts are always recomputed from
//! the roster and the companion's level.
use log::debug;
use rand::Rng;
use rand::seq::SliceRandom;

use scrapline_game::companions::{self, CompanionRoster};
use scrapline_game::console;
use scrapline_game::{ActiveBuff, Profile};

/// Actor values the buff system may touch, with their vanilla base
/// values. Unknown actor values in content are dropped rather than sent
/// blind into the console.
pub const STAT_MAP: &[(&str, f64)] = &[
    ("Strength", 5.0),
    ("Perception", 5.0),
    ("Endurance", 5.0),
    ("Charisma", 5.0),
    ("Intelligence", 5.0),
    ("Agility", 5.0),
    ("Luck", 5.0),
    ("CarryWeight", 200.0),
    ("ActionPoints", 75.0),
    ("CritChance", 5.0),
];

/// Buffs a lunchbox can roll, as `(id, display name)`.
const LUNCHBOX_BUFFS: &[(&str, &str)] = &[
    ("xp_boost", "XP Boost"),
    ("caps_boost", "Caps Boost"),
    ("scrip_boost", "Scrip Boost"),
    ("loot_quantity", "Packed Pockets"),
    ("fortune_boost", "Lucky Streak"),
    ("rested_xp", "Well Rested"),
];

fn known_av(av: &str) -> bool {
    STAT_MAP.iter().any(|(name, _)| *name == av)
}

fn buff_deltas(profile: &Profile, roster: &CompanionRoster) -> Vec<(String, f64)> {
    let Some((def, record)) = companions::active_companion(profile, roster) else {
        return Vec::new();
    };
    def.buffs
        .iter()
        .filter(|buff| known_av(&buff.av))
        .map(|buff| (buff.av.clone(), buff.per_level * f64::from(record.level)))
        .filter(|(_, delta)| delta.abs() > f64::EPSILON)
        .collect()
}

/// Console batch applying the active companion's stat buffs. Empty when
/// buffs are disabled, already applied, or nobody is riding along.
#[must_use]
pub fn build_apply_batch(profile: &Profile, roster: &CompanionRoster) -> Vec<String> {
    if !profile.companion_buffs_enabled || profile.buffs_active {
        return Vec::new();
    }
    buff_deltas(profile, roster)
        .into_iter()
        .map(|(av, delta)| console::mod_av(&av, delta))
        .collect()
}

/// Console batch undoing exactly what [`build_apply_batch`] applied.
#[must_use]
pub fn build_remove_batch(profile: &Profile, roster: &CompanionRoster) -> Vec<String> {
    if !profile.buffs_active {
        return Vec::new();
    }
    buff_deltas(profile, roster)
        .into_iter()
        .map(|(av, delta)| console::mod_av(&av, -delta))
        .collect()
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("no lunchboxes left")]
pub struct NoLunchbox;

/// Crack a lunchbox: consume one and roll a reward buff that lasts until
/// the next raid return.
pub fn use_lunchbox(profile: &mut Profile, rng: &mut impl Rng) -> Result<ActiveBuff, NoLunchbox> {
    if profile.consumables.lunchbox <= 0 {
        return Err(NoLunchbox);
    }
    profile.consumables.lunchbox -= 1;
    let (id, name) = LUNCHBOX_BUFFS
        .choose(rng)
        .copied()
        .unwrap_or(("xp_boost", "XP Boost"));
    let buff = ActiveBuff {
        id: id.to_string(),
        name: name.to_string(),
    };
    debug!("lunchbox rolled {}", buff.name);
    profile.active_buffs.push(buff.clone());
    Ok(buff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;
    use scrapline_game::CompanionRecord;

    fn profile_with_scrapper(level: u32) -> Profile {
        let mut profile = Profile::default();
        profile.active_companion = Some("scrapper".to_string());
        profile.companions.insert(
            "scrapper".to_string(),
            CompanionRecord {
                unlocked: true,
                level,
                ..Default::default()
            },
        );
        profile
    }

    #[test]
    fn apply_and_remove_are_exact_inverses() {
        let roster = CompanionRoster::builtin();
        let mut profile = profile_with_scrapper(4);

        let apply = build_apply_batch(&profile, &roster);
        assert_eq!(apply, vec!["player.modav CarryWeight 20".to_string()]);

        profile.buffs_active = true;
        let remove = build_remove_batch(&profile, &roster);
        assert_eq!(remove, vec!["player.modav CarryWeight -20".to_string()]);
    }

    #[test]
    fn already_applied_buffs_do_not_reapply() {
        let roster = CompanionRoster::builtin();
        let mut profile = profile_with_scrapper(4);
        profile.buffs_active = true;
        assert!(build_apply_batch(&profile, &roster).is_empty());
    }

    #[test]
    fn disabled_toggle_blocks_application() {
        let roster = CompanionRoster::builtin();
        let mut profile = profile_with_scrapper(4);
        profile.companion_buffs_enabled = false;
        assert!(build_apply_batch(&profile, &roster).is_empty());
    }

    #[test]
    fn lunchbox_consumes_and_grants() {
        let mut profile = Profile::default();
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        assert_eq!(use_lunchbox(&mut profile, &mut rng), Err(NoLunchbox));

        profile.consumables.lunchbox = 1;
        let buff = use_lunchbox(&mut profile, &mut rng).unwrap();
        assert_eq!(profile.consumables.lunchbox, 0);
        assert_eq!(profile.active_buffs.len(), 1);
        assert!(LUNCHBOX_BUFFS.iter().any(|(id, _)| *id == buff.id));
    }
}
