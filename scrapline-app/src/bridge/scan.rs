//! Stat and position scans: building the console dump batches and
//! parsing what the game writes back.
//!
//! A scan types `GetPCMiscStat` lines between a pair of `scof` commands;
//! the dump then interleaves each echoed command with its `>>` result
//! line. Objective progress is the positive delta of each stat against
//! the baseline captured at departure.
use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use scrapline_game::Position;
use scrapline_game::console;

/// Misc stats the scanner tracks, as `(console name, delta key)`. Delta
/// keys are what objective templates reference.
pub const TRACKED_STATS: &[(&str, &str)] = &[
    ("People Killed", "enemies_killed"),
    ("Creatures Killed", "creatures_killed"),
    ("Locations Discovered", "locations_discovered"),
    ("Locks Picked", "locks_picked"),
    ("Chems Taken", "chems_taken"),
    ("Food Eaten", "food_eaten"),
    ("Stimpaks Taken", "stimpaks_taken"),
    ("Mines Disarmed", "mines_disarmed"),
    ("Pockets Picked", "pockets_picked"),
    ("Speech Successes", "speech_successes"),
    ("Caps Found", "caps_found"),
    ("Items Stolen", "items_stolen"),
    ("Objects Repaired", "objects_repaired"),
    ("Weapons Created", "weapons_created"),
    ("Corpses Eaten", "corpses_eaten"),
    ("Mysterious Stranger Visits", "stranger_visits"),
    ("Books Read", "books_read"),
    ("Bobbleheads Found", "bobbleheads_found"),
    ("Robots Disabled", "robots_disabled"),
    ("Computers Hacked", "computers_hacked"),
    ("Traps Disarmed", "traps_disarmed"),
    ("Quests Completed", "quests_completed"),
    ("Sandman Kills", "sandman_kills"),
    ("Barter Successes", "barter_successes"),
    ("Limbs Crippled", "limbs_crippled"),
];

fn stat_echo_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"GetPCMiscStat\s+"(?P<name>[^"]+)""#).unwrap_or_else(|_| unreachable!())
    })
}

fn value_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:>>|:)\s*(?P<value>-?\d+(?:\.\d+)?)").unwrap_or_else(|_| unreachable!())
    })
}

fn getpos_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"GetPos.*?(?:>>|:)\s*(?P<value>-?\d+(?:\.\d+)?)")
            .unwrap_or_else(|_| unreachable!())
    })
}

/// Console batch that dumps every tracked stat into `dump_name`.
#[must_use]
pub fn build_stat_scan_batch(dump_name: &str) -> Vec<String> {
    let mut batch = vec![console::console_dump(dump_name)];
    for (name, _) in TRACKED_STATS {
        batch.push(format!("GetPCMiscStat \"{name}\""));
    }
    batch.push(console::console_dump("0"));
    batch
}

/// Console batch that dumps the player's world position.
#[must_use]
pub fn build_position_batch(dump_name: &str) -> Vec<String> {
    vec![
        console::console_dump(dump_name),
        "player.getpos x".to_string(),
        "player.getpos y".to_string(),
        "player.getpos z".to_string(),
        console::console_dump("0"),
    ]
}

/// Parse a stat dump into `delta key -> value`. Each echoed
/// `GetPCMiscStat "<name>"` line claims the next value line; anything the
/// tracker doesn't know is skipped.
#[must_use]
pub fn parse_stat_dump(text: &str) -> BTreeMap<String, f64> {
    let mut stats = BTreeMap::new();
    let mut awaiting: Option<&str> = None;
    for line in text.lines() {
        if let Some(caps) = stat_echo_re().captures(line) {
            let name = caps.name("name").map(|m| m.as_str()).unwrap_or_default();
            awaiting = TRACKED_STATS
                .iter()
                .find(|(console_name, _)| *console_name == name)
                .map(|(_, key)| *key);
            // A value on the same line as the echo counts too.
            if awaiting.is_none() {
                continue;
            }
        }
        if let Some(key) = awaiting {
            if let Some(caps) = value_re().captures(line) {
                if let Some(value) = caps.name("value").and_then(|m| m.as_str().parse().ok()) {
                    stats.insert(key.to_string(), value);
                    awaiting = None;
                }
            }
        }
    }
    stats
}

/// Positive per-raid deltas against the departure baseline. Stats the
/// baseline never saw count from zero; negative movement (a reloaded
/// save inside the raid) clamps to zero instead of going backwards.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn compute_bonuses(
    baseline: &BTreeMap<String, f64>,
    current: &BTreeMap<String, f64>,
) -> BTreeMap<String, i64> {
    current
        .iter()
        .map(|(key, value)| {
            let base = baseline.get(key).copied().unwrap_or(0.0);
            (key.clone(), (value - base).max(0.0) as i64)
        })
        .collect()
}

/// Parse the three `getpos` result lines, in x, y, z order.
#[must_use]
pub fn parse_position(text: &str) -> Option<Position> {
    let mut values = getpos_re()
        .captures_iter(text)
        .filter_map(|caps| caps.name("value")?.as_str().parse::<f64>().ok());
    let x = values.next()?;
    let y = values.next()?;
    let z = values.next()?;
    Some(Position { x, y, z })
}
