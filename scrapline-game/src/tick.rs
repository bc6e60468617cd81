//! Per-poll raid state evaluation. Pure against wall-clock input; the
//! caller owns the loop and the command channel.
use serde::Serialize;

use crate::companions;
use crate::constants::SOS_UNLOCK_SECS;
use crate::modifiers::{ModifierEffects, SosRule};
use crate::state::Profile;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RaidStatus {
    Idle,
    Active,
    Paused,
}

/// Why the raid must end now, if it must.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailState {
    /// The modifier's hard time limit ran out.
    TimeExpired,
}

/// Whether the SOS flare can be lit this tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SosState {
    /// Still inside the lockout; carries seconds until it opens.
    Locked { remaining_secs: f64 },
    Ready,
    /// The raid modifier jams the flare for the whole raid.
    Jammed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub status: RaidStatus,
    pub elapsed_secs: f64,
    pub sos: SosState,
    pub fail: Option<FailState>,
}

impl TickReport {
    fn idle() -> Self {
        Self {
            status: RaidStatus::Idle,
            elapsed_secs: 0.0,
            sos: SosState::Locked {
                remaining_secs: SOS_UNLOCK_SECS,
            },
            fail: None,
        }
    }
}

/// Advance raid-time accounting one tick and report the derived state.
///
/// Companion ultimate charge is credited from the span since the previous
/// tick only, so a long pause or an app restart never windfalls the meter.
pub fn raid_tick(profile: &mut Profile, effects: &ModifierEffects, now: f64) -> TickReport {
    if !profile.raid_active {
        return TickReport::idle();
    }
    if profile.raid_paused {
        profile.last_tick_at = now;
        return TickReport {
            status: RaidStatus::Paused,
            elapsed_secs: profile.effective_elapsed(now),
            sos: SosState::Locked {
                remaining_secs: SOS_UNLOCK_SECS,
            },
            fail: None,
        };
    }

    let elapsed = profile.effective_elapsed(now);

    let delta = if profile.last_tick_at > 0.0 {
        (now - profile.last_tick_at).max(0.0)
    } else {
        0.0
    };
    profile.last_tick_at = now;
    companions::update_ultimate_progress(profile, delta);

    let sos = match effects.sos {
        SosRule::Jammed => SosState::Jammed,
        SosRule::Normal => {
            if elapsed >= SOS_UNLOCK_SECS {
                SosState::Ready
            } else {
                SosState::Locked {
                    remaining_secs: SOS_UNLOCK_SECS - elapsed,
                }
            }
        }
    };

    let fail = match effects.time_limit_secs {
        Some(limit) if elapsed >= limit => Some(FailState::TimeExpired),
        _ => None,
    };

    TickReport {
        status: RaidStatus::Active,
        elapsed_secs: elapsed,
        sos,
        fail,
    }
}
