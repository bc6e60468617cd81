//! Aggregated game content: everything data-driven, loaded once at
//! startup and indexed for the session.
use serde::{Deserialize, Serialize};

use crate::ambush::AmbushContent;
use crate::companions::CompanionRoster;
use crate::loot::{LootIndex, LootItemDef};
use crate::modifiers::{ModifierCatalog, RaidModifier};
use crate::task_gen::TaskContent;

/// A departure destination with the difficulty tier it suits best.
/// Departure picks are weighted toward locations whose tier matches
/// the selected raid difficulty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaidLocation {
    pub name: String,
    #[serde(default = "default_location_tier")]
    pub tier: u8,
}

fn default_location_tier() -> u8 {
    2
}

/// On-disk content document shape. Every section is optional; missing or
/// empty sections fall back to the builtin data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawContent {
    pub modifiers: Vec<RaidModifier>,
    pub tasks: TaskContent,
    pub companions: CompanionRoster,
    pub ambushes: AmbushContent,
    pub loot_pools: Vec<Vec<LootItemDef>>,
    pub extraction_points: Vec<String>,
    pub raid_locations: Vec<RaidLocation>,
}

/// Indexed, session-ready content.
#[derive(Debug, Clone)]
pub struct GameContent {
    pub modifiers: ModifierCatalog,
    pub tasks: TaskContent,
    pub companions: CompanionRoster,
    pub ambushes: AmbushContent,
    pub loot: LootIndex,
    pub extraction_points: Vec<String>,
    pub raid_locations: Vec<RaidLocation>,
}

impl GameContent {
    #[must_use]
    pub fn from_raw(raw: RawContent) -> Self {
        let extraction_points = if raw.extraction_points.is_empty() {
            builtin_extraction_points()
        } else {
            raw.extraction_points
        };
        let raid_locations = if raw.raid_locations.is_empty() {
            builtin_raid_locations()
        } else {
            raw.raid_locations
        };
        Self {
            modifiers: ModifierCatalog::new(raw.modifiers),
            tasks: raw.tasks.or_builtin(),
            companions: raw.companions.or_builtin(),
            ambushes: raw.ambushes.or_builtin(),
            loot: LootIndex::build(raw.loot_pools),
            extraction_points,
            raid_locations,
        }
    }

    #[must_use]
    pub fn builtin() -> Self {
        Self::from_raw(RawContent::default())
    }
}

fn builtin_extraction_points() -> Vec<String> {
    [
        "Northern Overpass",
        "Flooded Metro Entrance",
        "Scrapyard Gate",
        "Ranger Watchtower",
        "Collapsed Tunnel Mouth",
        "River Barge Dock",
        "Transmission Tower Base",
        "Quarry Service Road",
    ]
    .map(str::to_string)
    .to_vec()
}

fn builtin_raid_locations() -> Vec<RaidLocation> {
    [
        ("Rustbelt Refinery", 1),
        ("Greenbriar Mall", 2),
        ("Irradiated Farmlands", 2),
        ("Fort Calloway", 3),
        ("Sunken District", 4),
    ]
    .map(|(name, tier)| RaidLocation {
        name: name.to_string(),
        tier,
    })
    .to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_raw_content_yields_builtins() {
        let content = GameContent::builtin();
        assert!(content.modifiers.ids().count() > 0);
        assert!(!content.tasks.objectives.is_empty());
        assert!(!content.companions.companions.is_empty());
        assert!(!content.ambushes.groups.is_empty());
        assert!(content.extraction_points.len() >= 4);
        // Loot stays empty without data; reward packages degrade to
        // currency-only rather than invent items.
        assert!(content.loot.is_empty());
    }

    #[test]
    fn provided_sections_are_kept() {
        let raw = RawContent {
            extraction_points: vec!["Back Gate".to_string()],
            ..Default::default()
        };
        let content = GameContent::from_raw(raw);
        assert_eq!(content.extraction_points, vec!["Back Gate".to_string()]);
    }
}
