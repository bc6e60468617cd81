//! The raid runtime: owns the profile, the content, and the bridge, and
//! sequences every multi-step operation the CLI exposes.
//!
//! Reward-bearing paths commit to the profile only after their command
//! batch verifies in-game; everything else is fire-and-forget through the
//! queue. The departure sequence is a small explicit state machine
//! stepped from `tick`, not a chain of timers.
use std::collections::BTreeMap;

use anyhow::{Context, Result, anyhow};
use log::{info, warn};
use rand::Rng;

use scrapline_game::{
    GameContent, Profile, ProfileStore, RaidDifficulty, RaidEndReport, RaidOutcome, TickReport,
    ambush, console, raid, tasks, tick,
};

use crate::bridge::poll::POLL_INTERVAL;
use crate::bridge::{GameBridge, ScanProgress};
use crate::buffs;

/// Quiet gap between the baseline settling and the departure teleport,
/// so the teleport cannot race the tail of the scan dump.
pub const DEPART_SETTLE_SECS: f64 = 2.0;

/// Where the departure sequence currently stands.
#[derive(Debug, Clone, Copy, PartialEq)]
enum DepartPhase {
    AwaitingBaseline,
    Settling { teleport_at: f64 },
}

/// An ambush that has triggered but not yet spawned; the delay lets the
/// player drift off the snapshot spot before the wave closes in.
#[derive(Debug, Clone)]
struct PendingAmbush {
    fire_at: f64,
    commands: Vec<String>,
}

/// What one tick did, for the caller's logging.
#[derive(Debug, Clone, PartialEq)]
pub struct TickEvents {
    pub report: TickReport,
    pub departed: bool,
    pub ambush_spawned: bool,
    pub raid_ended: Option<RaidOutcome>,
}

pub struct RaidRuntime<B: GameBridge, S: ProfileStore> {
    bridge: B,
    store: S,
    content: GameContent,
    profile: Profile,
    depart: Option<DepartPhase>,
    pending_ambush: Option<PendingAmbush>,
}

impl<B: GameBridge, S: ProfileStore> RaidRuntime<B, S> {
    /// Load (or initialize) the profile and stand the runtime up.
    pub fn new(
        bridge: B,
        store: S,
        content: GameContent,
        rng: &mut impl Rng,
    ) -> Result<Self> {
        let mut profile = store
            .load_profile()
            .map_err(|err| anyhow!(err))
            .context("loading profile")?
            .unwrap_or_default();
        profile.normalize(&content.modifiers, rng);
        Ok(Self {
            bridge,
            store,
            content,
            profile,
            depart: None,
            pending_ambush: None,
        })
    }

    #[must_use]
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    #[must_use]
    pub fn profile_mut(&mut self) -> &mut Profile {
        &mut self.profile
    }

    #[must_use]
    pub fn content(&self) -> &GameContent {
        &self.content
    }

    fn save(&self) -> Result<()> {
        self.store
            .save_profile(&self.profile)
            .map_err(|err| anyhow!(err))
            .context("saving profile")
    }

    /// Start a raid: stamp the session, kick off the baseline scan, and
    /// apply companion buffs. The teleport itself waits for the baseline
    /// to settle and happens from `tick`.
    pub fn start_raid(
        &mut self,
        difficulty: RaidDifficulty,
        location: Option<&str>,
        now: f64,
        rng: &mut impl Rng,
    ) -> Result<()> {
        let report = raid::begin_raid(
            &mut self.profile,
            &self.content,
            difficulty,
            location,
            now,
            rng,
        )?;
        info!(
            "raid started: {} under '{}' with {} extraction point(s)",
            self.profile.current_raid_location,
            report.modifier_id,
            report.extraction_points.len()
        );

        let buff_batch = buffs::build_apply_batch(&self.profile, &self.content.companions);
        if !buff_batch.is_empty() {
            self.bridge.enqueue(buff_batch);
            self.profile.buffs_active = true;
        }

        self.bridge
            .begin_stat_scan()
            .context("starting baseline scan")?;
        self.depart = Some(DepartPhase::AwaitingBaseline);
        self.pending_ambush = None;

        self.save()?;
        Ok(())
    }

    fn step_departure(&mut self, now: f64) -> bool {
        match self.depart {
            None => false,
            Some(DepartPhase::AwaitingBaseline) => {
                match self.bridge.poll_stat_scan() {
                    ScanProgress::Pending => {}
                    ScanProgress::Ready(stats) => {
                        info!("baseline captured: {} stat(s)", stats.len());
                        self.profile.baseline = stats;
                        self.depart = Some(DepartPhase::Settling {
                            teleport_at: now + DEPART_SETTLE_SECS,
                        });
                    }
                    ScanProgress::TimedOut => {
                        // Objectives degrade to zero progress rather than
                        // holding the whole departure hostage.
                        warn!("baseline scan timed out; departing without one");
                        self.profile.baseline = BTreeMap::new();
                        self.depart = Some(DepartPhase::Settling {
                            teleport_at: now + DEPART_SETTLE_SECS,
                        });
                    }
                }
                false
            }
            Some(DepartPhase::Settling { teleport_at }) => {
                if now < teleport_at {
                    return false;
                }
                self.depart = None;
                let location = self.profile.current_raid_location.clone();
                self.bridge
                    .enqueue(vec![console::center_on_cell(&location)]);
                info!("departed for {location}");
                true
            }
        }
    }

    fn step_ambush(&mut self, now: f64, rng: &mut impl Rng) -> bool {
        if let Some(pending) = &self.pending_ambush {
            if now >= pending.fire_at {
                let commands = pending.commands.clone();
                self.bridge.enqueue(commands);
                self.pending_ambush = None;
                return true;
            }
            return false;
        }

        let effects = raid::current_effects(&self.profile, &self.content);
        if !ambush::should_trigger(&mut self.profile, &effects, now, false, rng) {
            return false;
        }
        // Arming is not the spawn; the pending wave fires on a later tick.
        self.arm_ambush(now, rng);
        false
    }

    /// Debug path: skip the floor, cooldown, roll, and spawn delay, and
    /// send a wave right now. A modifier that disables ambushes still
    /// wins.
    pub fn force_ambush(&mut self, now: f64, rng: &mut impl Rng) -> Result<bool> {
        if !self.profile.raid_active || self.profile.raid_paused {
            return Ok(false);
        }
        let effects = raid::current_effects(&self.profile, &self.content);
        if !ambush::should_trigger(&mut self.profile, &effects, now, true, rng) {
            return Ok(false);
        }
        if !self.arm_ambush(now, rng) {
            return Ok(false);
        }
        if let Some(pending) = self.pending_ambush.take() {
            self.bridge.enqueue(pending.commands);
        }
        self.save()?;
        Ok(true)
    }

    fn arm_ambush(&mut self, now: f64, rng: &mut impl Rng) -> bool {
        let Some(group) = self.content.ambushes.choose(self.profile.threat_level, rng) else {
            return false;
        };
        let group = group.clone();
        let pos = match self.bridge.snapshot_position() {
            Ok(pos) => pos,
            Err(err) => {
                warn!("ambush aborted, position snapshot failed: {err}");
                return false;
            }
        };
        let commands = ambush::build_spawn_batch(&group, pos, rng);
        let delay = ambush::roll_delay(rng);
        info!("ambush '{}' set for {delay:.1}s out", group.name);
        self.pending_ambush = Some(PendingAmbush {
            fire_at: now + delay,
            commands,
        });
        true
    }

    /// One poll-loop step: departure machine, raid timers, ambushes, and
    /// the modifier time limit.
    pub fn tick(&mut self, now: f64, rng: &mut impl Rng) -> Result<TickEvents> {
        let departed = self.step_departure(now);

        let effects = raid::current_effects(&self.profile, &self.content);
        let report = tick::raid_tick(&mut self.profile, &effects, now);

        let mut ambush_spawned = false;
        if report.status == tick::RaidStatus::Active && self.depart.is_none() {
            ambush_spawned = self.step_ambush(now, rng);
        }

        let mut raid_ended = None;
        if report.fail == Some(tick::FailState::TimeExpired) {
            warn!("raid time limit expired; forcing a failed return");
            let ended = self.finish_failed(now, RaidOutcome::TimeExpired, rng)?;
            raid_ended = Some(ended.outcome);
        } else if departed || ambush_spawned {
            self.save()?;
        }

        Ok(TickEvents {
            report,
            departed,
            ambush_spawned,
            raid_ended,
        })
    }

    fn scan_current_stats(&mut self) -> Result<BTreeMap<String, f64>> {
        self.bridge
            .begin_stat_scan()
            .context("starting extraction scan")?;
        loop {
            match self.bridge.poll_stat_scan() {
                ScanProgress::Pending => std::thread::sleep(POLL_INTERVAL),
                ScanProgress::Ready(stats) => return Ok(stats),
                ScanProgress::TimedOut => {
                    warn!("stat scan timed out; objective progress unchanged");
                    return Ok(BTreeMap::new());
                }
            }
        }
    }

    fn refresh_objectives(&mut self) -> Result<()> {
        let current = self.scan_current_stats()?;
        if !current.is_empty() {
            self.profile.current_bonuses =
                crate::bridge::scan::compute_bonuses(&self.profile.baseline, &current);
            tasks::update_task_progress(&mut self.profile);
        }
        Ok(())
    }

    fn return_home_batch(&self) -> Vec<String> {
        let mut batch = buffs::build_remove_batch(&self.profile, &self.content.companions);
        batch.push(console::center_on_cell(&self.profile.homepoint));
        batch
    }

    /// Extract: scan progress, plan the payout, verify the reward batch
    /// in-game, and only then commit. A failed verification leaves both
    /// the raid and the profile exactly as they were.
    pub fn extract(&mut self, sos: bool, now: f64, rng: &mut impl Rng) -> Result<RaidEndReport> {
        if sos {
            let effects = raid::current_effects(&self.profile, &self.content);
            raid::use_sos_flare(&mut self.profile, &effects, now)?;
        }
        self.refresh_objectives()?;

        let plan = raid::plan_extraction(&self.profile, &self.content, now, sos, rng)?;
        info!(
            "extraction plan: {} task(s), {} xp / {} caps / {} scrip",
            plan.metrics.total(),
            plan.total.xp,
            plan.total.caps,
            plan.total.scrip
        );

        self.bridge
            .execute_verified(&plan.commands)
            .context("reward batch was not confirmed in-game; nothing committed")?;

        let home = self.return_home_batch();
        let report = raid::commit_extraction(&mut self.profile, &self.content, &plan, now, rng)?;
        self.bridge.enqueue(home);
        self.pending_ambush = None;
        self.depart = None;
        self.save()?;
        Ok(report)
    }

    /// Player died in the raid: strip uninsured loot, commit the loss,
    /// and bring them home. Nothing here needs verification; there is no
    /// payout to protect.
    pub fn death(&mut self, now: f64, rng: &mut impl Rng) -> Result<RaidEndReport> {
        self.finish_failed(now, RaidOutcome::Died, rng)
    }

    fn finish_failed(
        &mut self,
        now: f64,
        outcome: RaidOutcome,
        rng: &mut impl Rng,
    ) -> Result<RaidEndReport> {
        let plan = raid::prepare_death(&self.profile, now, outcome)?;
        if !plan.commands.is_empty() {
            self.bridge.enqueue(plan.commands.clone());
        }
        let home = self.return_home_batch();
        let report = raid::commit_death(&mut self.profile, &self.content, &plan, rng)?;
        self.bridge.enqueue(home);
        self.pending_ambush = None;
        self.depart = None;
        self.save()?;
        Ok(report)
    }

    /// Flip the raid pause state; paused time never counts as raid time.
    pub fn toggle_pause(&mut self, now: f64) -> Result<bool> {
        if !self.profile.raid_active {
            return Err(raid::RaidError::NotActive.into());
        }
        let paused = self.profile.toggle_pause(now);
        info!("raid {}", if paused { "paused" } else { "resumed" });
        self.save()?;
        Ok(paused)
    }

    /// Persist any profile mutation made through `profile_mut`.
    pub fn flush(&self) -> Result<()> {
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::BridgeError;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;
    use scrapline_game::Position;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::time::Duration;

    #[derive(Default)]
    struct StubBridge {
        enqueued: Vec<Vec<String>>,
        verified: Vec<Vec<String>>,
        scan_results: VecDeque<ScanProgress>,
        fail_verify: bool,
    }

    impl GameBridge for &RefCell<StubBridge> {
        fn enqueue(&self, commands: Vec<String>) {
            self.borrow_mut().enqueued.push(commands);
        }

        fn execute_verified(&mut self, commands: &[String]) -> Result<(), BridgeError> {
            let mut stub = self.borrow_mut();
            if stub.fail_verify {
                return Err(BridgeError::VerifyTimeout(Duration::from_secs(4)));
            }
            stub.verified.push(commands.to_vec());
            Ok(())
        }

        fn begin_stat_scan(&mut self) -> Result<(), BridgeError> {
            Ok(())
        }

        fn poll_stat_scan(&mut self) -> ScanProgress {
            self.borrow_mut()
                .scan_results
                .pop_front()
                .unwrap_or(ScanProgress::TimedOut)
        }

        fn snapshot_position(&mut self) -> Result<Position, BridgeError> {
            Ok(Position {
                x: 100.0,
                y: 200.0,
                z: 50.0,
            })
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        saved: RefCell<Option<Profile>>,
    }

    impl ProfileStore for &MemoryStore {
        type Error = std::convert::Infallible;

        fn save_profile(&self, profile: &Profile) -> Result<(), Self::Error> {
            *self.saved.borrow_mut() = Some(profile.clone());
            Ok(())
        }

        fn load_profile(&self) -> Result<Option<Profile>, Self::Error> {
            Ok(self.saved.borrow().clone())
        }
    }

    fn runtime<'a>(
        bridge: &'a RefCell<StubBridge>,
        store: &'a MemoryStore,
    ) -> RaidRuntime<&'a RefCell<StubBridge>, &'a MemoryStore> {
        let mut rng = ChaCha20Rng::seed_from_u64(21);
        RaidRuntime::new(bridge, store, GameContent::builtin(), &mut rng).unwrap()
    }

    #[test]
    fn departure_waits_for_baseline_then_settles() {
        let bridge = RefCell::new(StubBridge::default());
        bridge
            .borrow_mut()
            .scan_results
            .extend([ScanProgress::Pending, {
                let mut stats = BTreeMap::new();
                stats.insert("enemies_killed".to_string(), 10.0);
                ScanProgress::Ready(stats)
            }]);
        let store = MemoryStore::default();
        let mut runtime = runtime(&bridge, &store);
        let mut rng = ChaCha20Rng::seed_from_u64(1);

        runtime
            .start_raid(RaidDifficulty::Easy, Some("Fort Calloway"), 0.0, &mut rng)
            .unwrap();

        // Baseline pending; no teleport yet.
        let events = runtime.tick(0.2, &mut rng).unwrap();
        assert!(!events.departed);

        // Baseline lands; settling begins.
        let events = runtime.tick(0.4, &mut rng).unwrap();
        assert!(!events.departed);
        assert_eq!(runtime.profile().baseline["enemies_killed"], 10.0);

        // Settle window passes; teleport goes out.
        let events = runtime.tick(0.4 + DEPART_SETTLE_SECS, &mut rng).unwrap();
        assert!(events.departed);
        let teleports: Vec<_> = bridge
            .borrow()
            .enqueued
            .iter()
            .flatten()
            .filter(|c| c.starts_with("coc "))
            .cloned()
            .collect();
        assert_eq!(teleports, vec!["coc Fort Calloway".to_string()]);
    }

    #[test]
    fn failed_verification_leaves_profile_untouched() {
        let bridge = RefCell::new(StubBridge::default());
        let store = MemoryStore::default();
        let mut runtime = runtime(&bridge, &store);
        let mut rng = ChaCha20Rng::seed_from_u64(2);

        runtime
            .start_raid(RaidDifficulty::Medium, None, 0.0, &mut rng)
            .unwrap();
        bridge.borrow_mut().fail_verify = true;

        let before = serde_json::to_value(runtime.profile()).unwrap();
        let result = runtime.extract(false, 1200.0, &mut rng);
        assert!(result.is_err());
        assert_eq!(serde_json::to_value(runtime.profile()).unwrap(), before);
        assert!(runtime.profile().raid_active);
    }

    #[test]
    fn time_limit_forces_a_failed_return() {
        let bridge = RefCell::new(StubBridge::default());
        let store = MemoryStore::default();
        let mut runtime = runtime(&bridge, &store);
        let mut rng = ChaCha20Rng::seed_from_u64(3);

        runtime
            .start_raid(RaidDifficulty::Easy, None, 0.0, &mut rng)
            .unwrap();
        runtime.profile_mut().current_raid_modifier = "spicy_sieverts".to_string();

        let events = runtime.tick(901.0, &mut rng).unwrap();
        assert_eq!(events.raid_ended, Some(RaidOutcome::TimeExpired));
        assert!(!runtime.profile().raid_active);
        assert_eq!(runtime.profile().raids_died, 1);
    }

    #[test]
    fn forced_ambush_spawns_at_once_and_stamps_the_cooldown() {
        let bridge = RefCell::new(StubBridge::default());
        let store = MemoryStore::default();
        let mut runtime = runtime(&bridge, &store);
        let mut rng = ChaCha20Rng::seed_from_u64(4);

        assert!(!runtime.force_ambush(5.0, &mut rng).unwrap());

        runtime
            .start_raid(RaidDifficulty::Easy, None, 0.0, &mut rng)
            .unwrap();
        runtime.profile_mut().current_raid_modifier = "fortunes_bounty".to_string();
        assert!(runtime.force_ambush(5.0, &mut rng).unwrap());

        let placed = bridge
            .borrow()
            .enqueued
            .iter()
            .flatten()
            .any(|c| c.starts_with("player.placeatme "));
        assert!(placed);
        assert!(runtime.profile().ambush.last_check_time > 0.0);
        assert_eq!(runtime.profile().ambush.ambushes_triggered, 1);
    }

    #[test]
    fn pause_requires_an_active_raid() {
        let bridge = RefCell::new(StubBridge::default());
        let store = MemoryStore::default();
        let mut runtime = runtime(&bridge, &store);
        assert!(runtime.toggle_pause(10.0).is_err());
    }
}
