//! The save document: a single typed aggregate holding all meta-progression.
//!
//! Loaded once at startup and rewritten atomically after nearly every
//! mutation. Missing fields are backfilled from `Default` at load time, so
//! older documents keep working as the schema grows.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::constants::{THREAT_MAX, THREAT_MIN};
use crate::loot::{ItemGrant, RewardLogEntry};
use crate::modifiers::ModifierCatalog;
use crate::tasks::Task;

/// Difficulty tier selected for the next raid departure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RaidDifficulty {
    #[default]
    Easy,
    Medium,
    Hard,
    VeryHard,
}

impl RaidDifficulty {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
            Self::VeryHard => "veryhard",
        }
    }

    /// Single global multiplier applied to the aggregated reward bundle.
    /// Applied once to the sums, never to individual packages.
    #[must_use]
    pub const fn reward_multiplier(self) -> f64 {
        match self {
            Self::Easy => 1.0,
            Self::Medium => 1.5,
            Self::Hard => 2.0,
            Self::VeryHard => 3.0,
        }
    }

    /// VeryHard departures raise effective fortune for loot rolls only.
    #[must_use]
    pub const fn fortune_bonus(self) -> f64 {
        match self {
            Self::VeryHard => 1.0,
            _ => 0.0,
        }
    }

    /// Numeric tier used to weight departure locations toward the
    /// selected difficulty.
    #[must_use]
    pub const fn tier(self) -> u8 {
        match self {
            Self::Easy => 1,
            Self::Medium => 2,
            Self::Hard => 3,
            Self::VeryHard => 4,
        }
    }
}

impl fmt::Display for RaidDifficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RaidDifficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "easy" => Ok(Self::Easy),
            "medium" => Ok(Self::Medium),
            "hard" => Ok(Self::Hard),
            "veryhard" | "very_hard" => Ok(Self::VeryHard),
            other => Err(format!("unknown raid difficulty: {other}")),
        }
    }
}

/// Cooldown bookkeeping for the ambush scheduler.
///
/// `last_check_time` is stamped the instant a trigger decision passes,
/// before the spawn executes, so re-entrant ticks cannot double-fire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmbushLedger {
    pub last_check_time: f64,
    pub ambushes_triggered: u32,
}

/// Meta-consumables tracked outside the game process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Consumables {
    pub sos_flare: i32,
    pub task_reroll: i32,
    pub lunchbox: i32,
}

/// User-tunable global economy multipliers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomySettings {
    pub xp_mult: f64,
    pub caps_mult: f64,
    pub scrip_mult: f64,
    pub cost_mult: f64,
}

impl Default for EconomySettings {
    fn default() -> Self {
        Self {
            xp_mult: 1.0,
            caps_mult: 1.0,
            scrip_mult: 1.0,
            cost_mult: 1.0,
        }
    }
}

/// A temporary consumable or situational buff by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActiveBuff {
    pub id: String,
    pub name: String,
}

impl Default for ActiveBuff {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
        }
    }
}

/// Per-companion progression record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanionRecord {
    pub unlocked: bool,
    pub level: u32,
    pub xp: i64,
    pub loyalty_unlocked: bool,
    pub loyalty_completed: bool,
    pub ultimate_progress: f64,
}

/// One-shot companion milestone flags recorded at raid boundaries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Milestones {
    pub first_extended_raid: bool,
    pub first_emergency_task: bool,
    pub first_bonus_objective: bool,
    pub bonus_objs_count: u32,
    pub five_bonus_objectives_total: bool,
    pub first_death: bool,
    pub first_sos_flare: bool,
    pub first_threat_level_5: bool,
    pub three_successful_raids: bool,
}

/// The whole-document save aggregate. Single source of truth for
/// everything the companion app knows; the live game may diverge whenever
/// an unverified command batch fails silently (documented risk).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    // Environment
    pub game_install_path: String,
    pub launcher_path: String,
    pub homepoint: String,

    // Currencies & progression scalars
    pub scrip: i64,
    pub components: i64,
    pub current_xp: i64,
    pub player_level: u32,
    pub reputation: f64,
    pub fortune: f64,
    pub threat_level: i32,
    pub day_cycle: u32,

    // Raid session
    pub raid_active: bool,
    pub raid_paused: bool,
    pub raid_pause_started: f64,
    pub last_raid_start_timestamp: f64,
    pub raid_paused_elapsed: f64,
    pub last_raid_duration: f64,
    pub last_tick_at: f64,
    pub current_raid_modifier: String,
    pub raid_difficulty_selection: RaidDifficulty,
    pub current_raid_location: String,
    pub original_threat_level: Option<i32>,
    pub ambush: AmbushLedger,
    pub current_extractions: Vec<String>,

    // Tasks
    pub tasks: Vec<Task>,
    pub taskboard_pool: Vec<Task>,
    pub unlocked_task_slots: usize,
    pub unlocked_task_pool_size: usize,

    // Inventory shadow
    pub consumables: Consumables,
    pub insured_items: Vec<String>,
    pub loose_items: Vec<ItemGrant>,

    // Buffs
    pub economy: EconomySettings,
    pub active_buffs: Vec<ActiveBuff>,
    pub companion_buffs_enabled: bool,
    pub buffs_active: bool,
    pub baseline: BTreeMap<String, f64>,
    pub current_bonuses: BTreeMap<String, i64>,

    // Companions
    pub companions: BTreeMap<String, CompanionRecord>,
    pub active_companion: Option<String>,
    pub milestones: Milestones,

    // Ledger
    pub reward_history: Vec<RewardLogEntry>,

    // Lifetime counters
    pub raids_started: u32,
    pub raids_died: u32,
    pub raids_extracted: u32,
    pub sos_extracts: u32,
    pub consecutive_deaths: u32,
    pub consecutive_extractions: u32,
    pub tasks_failed: u32,
    pub emergency_tasks_failed: u32,
    pub total_completed_tasks: u32,
    pub easy_completed: u32,
    pub medium_completed: u32,
    pub hard_completed: u32,
    pub emergency_completed: u32,

    // Unlocks
    pub medium_unlocked: bool,
    pub hard_unlocked: bool,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            game_install_path: String::new(),
            launcher_path: String::new(),
            homepoint: "Megaton".to_string(),
            scrip: 0,
            components: 0,
            current_xp: 0,
            player_level: 1,
            reputation: 0.0,
            fortune: 0.0,
            threat_level: 1,
            day_cycle: 1,
            raid_active: false,
            raid_paused: false,
            raid_pause_started: 0.0,
            last_raid_start_timestamp: 0.0,
            raid_paused_elapsed: 0.0,
            last_raid_duration: 0.0,
            last_tick_at: 0.0,
            current_raid_modifier: String::new(),
            raid_difficulty_selection: RaidDifficulty::Easy,
            current_raid_location: String::new(),
            original_threat_level: None,
            ambush: AmbushLedger::default(),
            current_extractions: Vec::new(),
            tasks: Vec::new(),
            taskboard_pool: Vec::new(),
            unlocked_task_slots: 1,
            unlocked_task_pool_size: 3,
            consumables: Consumables::default(),
            insured_items: Vec::new(),
            loose_items: Vec::new(),
            economy: EconomySettings::default(),
            active_buffs: Vec::new(),
            companion_buffs_enabled: true,
            buffs_active: false,
            baseline: BTreeMap::new(),
            current_bonuses: BTreeMap::new(),
            companions: BTreeMap::new(),
            active_companion: None,
            milestones: Milestones::default(),
            reward_history: Vec::new(),
            raids_started: 0,
            raids_died: 0,
            raids_extracted: 0,
            sos_extracts: 0,
            consecutive_deaths: 0,
            consecutive_extractions: 0,
            tasks_failed: 0,
            emergency_tasks_failed: 0,
            total_completed_tasks: 0,
            easy_completed: 0,
            medium_completed: 0,
            hard_completed: 0,
            emergency_completed: 0,
            medium_unlocked: false,
            hard_unlocked: false,
        }
    }
}

impl Profile {
    /// Effective raid time: wall clock minus everything spent paused,
    /// including a pause that is still open.
    #[must_use]
    pub fn effective_elapsed(&self, now: f64) -> f64 {
        let mut paused = self.raid_paused_elapsed;
        if self.raid_paused {
            paused += (now - self.raid_pause_started).max(0.0);
        }
        (now - self.last_raid_start_timestamp - paused).max(0.0)
    }

    /// Keep threat inside its `[0, 5]` band.
    pub fn clamp_threat(&mut self) {
        self.threat_level = self.threat_level.clamp(THREAT_MIN, THREAT_MAX);
    }

    /// One-time fixups after loading an older or partial document.
    pub fn normalize(&mut self, catalog: &ModifierCatalog, rng: &mut impl rand::Rng) {
        self.clamp_threat();
        if self.day_cycle < 1 {
            self.day_cycle = 1;
        }
        if self.current_raid_modifier.is_empty()
            || catalog.get(&self.current_raid_modifier).is_none()
        {
            self.current_raid_modifier = catalog.roll(rng).id.clone();
        }
        if self.unlocked_task_slots == 0 {
            self.unlocked_task_slots = 1;
        }
        if self.unlocked_task_pool_size == 0 {
            self.unlocked_task_pool_size = 3;
        }
    }

    /// Flip the pause flag. Resuming folds the pause span into
    /// `raid_paused_elapsed` so effective elapsed time is pause-invariant.
    /// Returns the new paused state.
    pub fn toggle_pause(&mut self, now: f64) -> bool {
        if self.raid_paused {
            let span = (now - self.raid_pause_started).max(0.0);
            self.raid_paused_elapsed += span;
            self.raid_paused = false;
        } else {
            self.raid_paused = true;
            self.raid_pause_started = now;
        }
        self.raid_paused
    }

    /// Clear any pause bookkeeping (used before terminal transitions).
    pub fn reset_pause(&mut self) {
        self.raid_paused = false;
        self.raid_pause_started = 0.0;
        self.raid_paused_elapsed = 0.0;
    }

    /// Tasks currently occupying log slots.
    #[must_use]
    pub fn active_task_count(&self) -> usize {
        self.tasks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn partial_document_backfills_missing_fields() {
        let profile: Profile =
            serde_json::from_str(r#"{"scrip": 42, "threat_level": 3}"#).unwrap();
        assert_eq!(profile.scrip, 42);
        assert_eq!(profile.threat_level, 3);
        assert_eq!(profile.day_cycle, 1);
        assert_eq!(profile.unlocked_task_slots, 1);
        assert_eq!(profile.homepoint, "Megaton");
        assert!(profile.companion_buffs_enabled);
    }

    #[test]
    fn normalize_clamps_threat_and_rolls_modifier() {
        let mut profile = Profile::default();
        profile.threat_level = 99;
        profile.day_cycle = 0;
        let catalog = ModifierCatalog::builtin();
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        profile.normalize(&catalog, &mut rng);
        assert_eq!(profile.threat_level, 5);
        assert_eq!(profile.day_cycle, 1);
        assert!(catalog.get(&profile.current_raid_modifier).is_some());
    }

    #[test]
    fn effective_elapsed_is_pause_invariant() {
        let mut profile = Profile::default();
        profile.raid_active = true;
        profile.last_raid_start_timestamp = 1_000.0;

        // pause at +60s for 30s, pause again at +120s for 45s
        assert!(profile.toggle_pause(1_060.0));
        assert!(!profile.toggle_pause(1_090.0));
        assert!(profile.toggle_pause(1_120.0));
        assert!(!profile.toggle_pause(1_165.0));

        let elapsed = profile.effective_elapsed(1_200.0);
        assert!((elapsed - 125.0).abs() < 1e-9, "elapsed was {elapsed}");
    }

    #[test]
    fn effective_elapsed_freezes_during_an_open_pause() {
        let mut profile = Profile::default();
        profile.raid_active = true;
        profile.last_raid_start_timestamp = 1_000.0;

        assert!(profile.toggle_pause(1_060.0));
        // The clock must not advance while the pause is still open.
        let at_pause = profile.effective_elapsed(1_060.0);
        assert!((at_pause - 60.0).abs() < 1e-9, "elapsed was {at_pause}");
        let much_later = profile.effective_elapsed(1_600.0);
        assert!((much_later - 60.0).abs() < 1e-9, "elapsed was {much_later}");
    }

    #[test]
    fn difficulty_round_trips_and_scales() {
        for diff in [
            RaidDifficulty::Easy,
            RaidDifficulty::Medium,
            RaidDifficulty::Hard,
            RaidDifficulty::VeryHard,
        ] {
            assert_eq!(diff.as_str().parse::<RaidDifficulty>(), Ok(diff));
        }
        assert!((RaidDifficulty::VeryHard.reward_multiplier() - 3.0).abs() < f64::EPSILON);
        assert!("nope".parse::<RaidDifficulty>().is_err());
    }
}
