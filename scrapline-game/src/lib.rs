//! Scrapline Core
//!
//! Platform-agnostic meta-progression and raid logic for the Scrapline
//! companion app. This crate owns the save aggregate, the raid lifecycle,
//! and everything derived from them, without any file or process
//! dependencies; the host binary supplies storage, content, and the game
//! bridge.

pub mod ambush;
pub mod companions;
pub mod console;
pub mod constants;
pub mod content;
pub mod loot;
pub mod modifiers;
pub mod raid;
pub mod state;
pub mod stats;
pub mod task_gen;
pub mod tasks;
pub mod tick;

// Re-export commonly used types
pub use ambush::{AmbushContent, AmbushGroupDef, Position, SpawnLine};
pub use companions::{
    CompanionBonuses, CompanionDef, CompanionRoster, StatBuff, UnlockRule, companion_bonuses,
    grant_companion_xp, refresh_unlocks, update_ultimate_progress,
};
pub use content::{GameContent, RaidLocation, RawContent};
pub use loot::{ItemGrant, LootIndex, LootItemDef, RewardBundle, RewardCtx, RewardLogEntry,
    RewardSource, calculate_reward_package, extraction_time_reward, log_reward};
pub use modifiers::{
    AmbushRule, ExtractionRule, ModifierCatalog, ModifierEffects, RaidModifier, RewardCondition,
    RewardRule, SosRule,
};
pub use raid::{
    DeathPlan, DepartureReport, ExtractionPlan, RaidEndReport, RaidError, RaidOutcome, SosError,
    aggregate_rewards, begin_raid, build_reward_batch, commit_death, commit_extraction,
    current_effects, plan_extraction, prepare_death, use_sos_flare,
};
pub use state::{
    ActiveBuff, AmbushLedger, CompanionRecord, Consumables, EconomySettings, Milestones, Profile,
    RaidDifficulty,
};
pub use task_gen::{ObjectiveTemplate, TaskContent, generate_task};
pub use tasks::{
    CompletionMetrics, Objective, Task, TaskDifficulty, TaskError, accept_task, age_tasks,
    apply_completions, collect_completions, refresh_taskboard, reroll_task, update_task_progress,
};
pub use tick::{FailState, RaidStatus, SosState, TickReport, raid_tick};

/// Trait for abstracting content loading
/// Platform-specific implementations should provide this
pub trait ContentSource {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load the raw content document from the platform-specific source
    ///
    /// # Errors
    ///
    /// Returns an error if the content cannot be loaded or parsed.
    fn load_content(&self) -> Result<RawContent, Self::Error>;
}

/// Trait for abstracting save/load operations
/// Platform-specific implementations should provide this
pub trait ProfileStore {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Persist the profile
    ///
    /// # Errors
    ///
    /// Returns an error if the profile cannot be saved.
    fn save_profile(&self, profile: &Profile) -> Result<(), Self::Error>;

    /// Load the profile, or `None` when no save exists yet
    ///
    /// # Errors
    ///
    /// Returns an error if the profile cannot be loaded or parsed.
    fn load_profile(&self) -> Result<Option<Profile>, Self::Error>;
}
