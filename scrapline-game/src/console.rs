//! Builders for the game console command strings the launcher types in,
//! plus the echo-probe signature used to verify batch delivery.

/// Item code the game uses for bottlecaps.
pub const CAPS_ITEM_CODE: &str = "0000000F";

/// Probe appended to verified batches; its console echo proves the whole
/// batch was consumed.
pub const ECHO_PROBE: &str = "player.GetLevel";

#[must_use]
pub fn additem(code: &str, qty: i64) -> String {
    format!("player.additem {code} {qty}")
}

#[must_use]
pub fn add_caps(qty: i64) -> String {
    additem(CAPS_ITEM_CODE, qty)
}

#[must_use]
pub fn reward_xp(amount: i64) -> String {
    format!("player.rewardxp {amount}")
}

#[must_use]
pub fn remove_item(code: &str, qty: i64) -> String {
    format!("player.removeitem {code} {qty}")
}

#[must_use]
pub fn place_at(code: &str, x: f64, y: f64, z: f64) -> String {
    format!("player.placeatme {code} 1 {x:.0} {y:.0} {z:.0}")
}

#[must_use]
pub fn set_pos(axis: char, value: f64) -> String {
    format!("player.setpos {axis} {value:.0}")
}

#[must_use]
pub fn mod_av(av: &str, delta: f64) -> String {
    format!("player.modav {av} {delta}")
}

#[must_use]
pub fn center_on_cell(cell: &str) -> String {
    format!("coc {cell}")
}

#[must_use]
pub fn console_dump(path: &str) -> String {
    format!("scof {path}")
}

/// True when a console dump line is the echo probe's output. The game
/// prints either `GetLevel >> n` or `GetLevel: n` depending on build.
#[must_use]
pub fn is_echo_line(line: &str) -> bool {
    line.contains("GetLevel >>") || line.contains("GetLevel:")
}
