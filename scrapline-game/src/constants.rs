//! Central tuning constants for raid pacing, ambush odds, and progression.

/// Seconds of effective raid time before the SOS flare becomes usable.
pub const SOS_UNLOCK_SECS: f64 = 1500.0;

/// Earliest point in a raid an ambush may fire.
pub const AMBUSH_FIRST_FLOOR_SECS: f64 = 300.0;
/// Minimum spacing between ambush trigger checks that can pass.
pub const AMBUSH_COOLDOWN_SECS: f64 = 300.0;
/// Per-tick base probability of an ambush once gates are open.
pub const AMBUSH_BASE_CHANCE: f64 = 0.005;
/// Additional per-tick probability per threat level.
pub const AMBUSH_THREAT_FACTOR: f64 = 0.002;
/// Enemy groups are eligible up to `threat_level + AMBUSH_TIER_GRACE`.
pub const AMBUSH_TIER_GRACE: i32 = 1;
/// Spawn scatter is rolled in `[-AMBUSH_MAX_OFFSET, AMBUSH_MAX_OFFSET]`
/// per axis, then floored away from zero so enemies never overlap the player.
pub const AMBUSH_MIN_OFFSET: i32 = 300;
pub const AMBUSH_MAX_OFFSET: i32 = 1000;
/// Caller-owned delay between the ambush warning and the spawn batch.
pub const AMBUSH_DELAY_MIN_SECS: f64 = 3.0;
pub const AMBUSH_DELAY_MAX_SECS: f64 = 8.0;

pub const THREAT_MIN: i32 = 0;
pub const THREAT_MAX: i32 = 5;

/// Survival bonus ramps linearly between these raid durations (minutes).
pub const EXTRACTION_RAMP_MIN_MINUTES: f64 = 10.0;
pub const EXTRACTION_RAMP_MAX_MINUTES: f64 = 45.0;
pub const EXTRACTION_SCRIP_RANGE: (i64, i64) = (1, 3);
pub const EXTRACTION_CAPS_RANGE: (i64, i64) = (50, 150);
pub const EXTRACTION_XP_RANGE: (i64, i64) = (100, 300);

/// Reward history entries kept for the ledger view.
pub const REWARD_HISTORY_CAP: usize = 50;

/// Share of player XP forwarded to the active companion.
pub const COMPANION_XP_SHARE: f64 = 0.25;
/// Minutes of raid time to fully charge a companion ultimate.
pub const ULTIMATE_FILL_MINUTES: f64 = 30.0;
/// Flat bonus multiplier applied to emergency task rewards.
pub const EMERGENCY_REWARD_BOOST: f64 = 1.25;

/// Hard ceilings on task capacity upgrades.
pub const TASK_SLOTS_MAX: usize = 5;
pub const TASK_POOL_MAX: usize = 8;
/// Fresh tasks survive this many raid returns.
pub const TASK_CYCLES_RANGE: (u32, u32) = (2, 5);
/// Emergency tasks expire after a single return.
pub const EMERGENCY_TASK_CYCLES: u32 = 1;
/// Base chance a generated task carries a bonus objective.
pub const BONUS_OBJECTIVE_BASE_CHANCE: f64 = 0.30;
/// Bonus objective chance gained per point of reputation.
pub const BONUS_OBJECTIVE_REP_FACTOR: f64 = 0.02;
/// Chance an unforced task rolls emergency.
pub const EMERGENCY_TASK_CHANCE: f64 = 0.10;

/// Extraction points sampled when no modifier overrides the count.
pub const DEFAULT_EXTRACTION_COUNT: usize = 4;

/// Raid-duration milestone threshold (minutes) for the extended-raid unlock.
pub const EXTENDED_RAID_MINUTES: f64 = 45.0;
