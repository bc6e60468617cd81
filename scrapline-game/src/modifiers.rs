//! Raid modifiers: a named condition rerolled each day cycle that bends
//! ambush, extraction, reward, and fail-state rules for the current raid.
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// How the modifier treats the ambush scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum AmbushRule {
    /// Standard cooldown and odds.
    #[default]
    Normal,
    /// No ambushes at all this cycle.
    Disabled,
    /// Shortened cooldown plus a flat chance bonus.
    Frenzied {
        cooldown_secs: f64,
        bonus_chance: f64,
    },
}

/// How the modifier treats the SOS flare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SosRule {
    #[default]
    Normal,
    /// Flare cannot be fired this cycle.
    Jammed,
}

/// Number of extraction points sampled at raid start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ExtractionRule {
    #[default]
    Default,
    Fixed { count: usize },
    Range { min: usize, max: usize },
}

/// Condition gating a modifier's conditional reward bonus.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum RewardCondition {
    RaidTimeGreaterThan { minutes: f64 },
    RaidTimeLessThan { minutes: f64 },
}

impl RewardCondition {
    #[must_use]
    pub fn matches(&self, duration_minutes: f64) -> bool {
        match *self {
            Self::RaidTimeGreaterThan { minutes } => duration_minutes > minutes,
            Self::RaidTimeLessThan { minutes } => duration_minutes < minutes,
        }
    }
}

/// Conditional multiplier applied to the time-survival bonus only,
/// before the global difficulty multiplier touches the aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardRule {
    pub condition: RewardCondition,
    pub multiplier: f64,
}

/// Full effect block for one modifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ModifierEffects {
    pub ambush: AmbushRule,
    pub sos: SosRule,
    /// Hard fail limit in effective raid seconds, if any.
    pub time_limit_secs: Option<f64>,
    pub extraction: ExtractionRule,
    pub reward: Option<RewardRule>,
    /// Extra effective fortune fed into raid-sourced loot rolls.
    pub loot_fortune_bonus: f64,
    /// Additive scrip multiplier for raid-sourced packages.
    pub scrip_mult_bonus: f64,
    /// Raid-sourced packages always roll the bonus item.
    pub guaranteed_bonus_item: bool,
    /// Inject emergency tasks into the active log at raid start.
    pub emergency_tasks_on_start: bool,
    /// Pin threat at max for the raid, restoring it on return.
    pub force_max_threat: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaidModifier {
    pub id: String,
    pub name: String,
    pub desc: String,
    pub effects: ModifierEffects,
}

impl Default for RaidModifier {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            desc: String::new(),
            effects: ModifierEffects::default(),
        }
    }
}

/// Read-through catalog of all known modifiers, built once at startup and
/// passed by reference into everything that needs it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifierCatalog {
    modifiers: Vec<RaidModifier>,
}

impl ModifierCatalog {
    #[must_use]
    pub fn new(mut modifiers: Vec<RaidModifier>) -> Self {
        if modifiers.is_empty() {
            return Self::builtin();
        }
        modifiers.retain(|m| !m.id.is_empty());
        Self { modifiers }
    }

    /// The shipped modifier set, used when no content file overrides it.
    #[must_use]
    pub fn builtin() -> Self {
        let mk = |id: &str, name: &str, desc: &str, effects: ModifierEffects| RaidModifier {
            id: id.to_string(),
            name: name.to_string(),
            desc: desc.to_string(),
            effects,
        };
        Self {
            modifiers: vec![
                mk(
                    "watching_eyes",
                    "Watching Eyes",
                    "Something is tracking you. No ambushes, but the flare is jammed.",
                    ModifierEffects {
                        ambush: AmbushRule::Disabled,
                        sos: SosRule::Jammed,
                        ..ModifierEffects::default()
                    },
                ),
                mk(
                    "spicy_sieverts",
                    "Spicy Sieverts",
                    "Radiation storm inbound. Fifteen minutes before the zone cooks you.",
                    ModifierEffects {
                        sos: SosRule::Jammed,
                        time_limit_secs: Some(900.0),
                        extraction: ExtractionRule::Fixed { count: 2 },
                        reward: Some(RewardRule {
                            condition: RewardCondition::RaidTimeLessThan { minutes: 12.0 },
                            multiplier: 1.5,
                        }),
                        ..ModifierEffects::default()
                    },
                ),
                mk(
                    "hostile_wasteland",
                    "Hostile Wasteland",
                    "Everything out there is angry today.",
                    ModifierEffects {
                        ambush: AmbushRule::Frenzied {
                            cooldown_secs: 120.0,
                            bonus_chance: 0.05,
                        },
                        reward: Some(RewardRule {
                            condition: RewardCondition::RaidTimeGreaterThan { minutes: 30.0 },
                            multiplier: 1.25,
                        }),
                        ..ModifierEffects::default()
                    },
                ),
                mk(
                    "fortunes_bounty",
                    "Fortune's Bounty",
                    "The scavenging is rich this cycle.",
                    ModifierEffects {
                        loot_fortune_bonus: 5.0,
                        scrip_mult_bonus: 0.5,
                        guaranteed_bonus_item: true,
                        extraction: ExtractionRule::Range { min: 6, max: 8 },
                        ..ModifierEffects::default()
                    },
                ),
                mk(
                    "wasteland_in_need",
                    "Wasteland in Need",
                    "Emergency contracts land in your log the moment you depart.",
                    ModifierEffects {
                        emergency_tasks_on_start: true,
                        force_max_threat: true,
                        ..ModifierEffects::default()
                    },
                ),
            ],
        }
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&RaidModifier> {
        self.modifiers.iter().find(|m| m.id == id)
    }

    /// Uniformly pick the next cycle's modifier.
    #[must_use]
    pub fn roll(&self, rng: &mut impl Rng) -> &RaidModifier {
        self.modifiers
            .choose(rng)
            .expect("catalog is never constructed empty")
    }

    #[must_use]
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.modifiers.iter().map(|m| m.id.as_str())
    }
}
