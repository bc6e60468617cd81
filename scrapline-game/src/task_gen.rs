//! Procedural task generation from objective templates.
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::constants::{
    BONUS_OBJECTIVE_BASE_CHANCE, BONUS_OBJECTIVE_REP_FACTOR, EMERGENCY_TASK_CYCLES,
    TASK_CYCLES_RANGE,
};
use crate::state::Profile;
use crate::stats;
use crate::tasks::{Objective, Task, TaskDifficulty};

/// One objective blueprint tied to a tracked stat delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectiveTemplate {
    pub stat: String,
    pub icon: String,
    /// Text with a `{n}` placeholder for the rolled target.
    pub verb: String,
    pub easy_range: (i64, i64),
    pub medium_range: (i64, i64),
    pub hard_range: (i64, i64),
}

impl Default for ObjectiveTemplate {
    fn default() -> Self {
        Self {
            stat: String::new(),
            icon: String::new(),
            verb: String::new(),
            easy_range: (1, 1),
            medium_range: (1, 1),
            hard_range: (1, 1),
        }
    }
}

impl ObjectiveTemplate {
    fn range_for(&self, difficulty: TaskDifficulty) -> (i64, i64) {
        match difficulty {
            TaskDifficulty::Easy => self.easy_range,
            TaskDifficulty::Medium => self.medium_range,
            TaskDifficulty::Hard => self.hard_range,
        }
    }
}

/// Loadable task generation content, with a builtin fallback so a missing
/// or empty content file still produces a working board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskContent {
    pub names: Vec<String>,
    pub emergency_names: Vec<String>,
    pub objectives: Vec<ObjectiveTemplate>,
}

impl Default for TaskContent {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TaskContent {
    #[must_use]
    pub fn builtin() -> Self {
        let tpl = |stat: &str, icon: &str, verb: &str, e: (i64, i64), m: (i64, i64), h: (i64, i64)| {
            ObjectiveTemplate {
                stat: stat.to_string(),
                icon: icon.to_string(),
                verb: verb.to_string(),
                easy_range: e,
                medium_range: m,
                hard_range: h,
            }
        };
        Self {
            names: vec![
                "Salvage Run".to_string(),
                "Contract Work".to_string(),
                "Wasteland Errand".to_string(),
                "Supply Sweep".to_string(),
                "Bounty Posting".to_string(),
            ],
            emergency_names: vec![
                "Distress Call".to_string(),
                "Urgent Contract".to_string(),
            ],
            objectives: vec![
                tpl("enemies_killed", "skull", "Kill {n} enemies", (3, 8), (8, 15), (15, 30)),
                tpl("creatures_killed", "paw", "Kill {n} creatures", (2, 5), (5, 10), (10, 20)),
                tpl("locations_discovered", "map", "Discover {n} locations", (1, 2), (2, 4), (4, 6)),
                tpl("locks_picked", "lock", "Pick {n} locks", (1, 2), (2, 4), (4, 8)),
                tpl("chems_taken", "pill", "Take {n} chems", (1, 2), (2, 4), (4, 6)),
                tpl("food_eaten", "fork", "Eat {n} food items", (2, 4), (4, 8), (8, 12)),
                tpl("stimpaks_taken", "cross", "Use {n} stimpaks", (1, 2), (2, 4), (4, 8)),
                tpl("mines_disarmed", "bomb", "Disarm {n} mines", (1, 1), (1, 3), (3, 5)),
                tpl("pockets_picked", "hand", "Pick {n} pockets", (1, 1), (1, 3), (3, 5)),
                tpl("speech_successes", "chat", "Win {n} speech challenges", (1, 1), (1, 2), (2, 4)),
            ],
        }
    }

    /// Treat an empty objective list like no content at all.
    #[must_use]
    pub fn or_builtin(self) -> Self {
        if self.objectives.is_empty() {
            Self::builtin()
        } else {
            self
        }
    }
}

fn roll_difficulty(profile: &Profile, emergency: bool, rng: &mut impl Rng) -> TaskDifficulty {
    if emergency {
        return if profile.hard_unlocked {
            TaskDifficulty::Hard
        } else {
            TaskDifficulty::Medium
        };
    }
    let mut weights: Vec<(TaskDifficulty, f64)> = vec![(TaskDifficulty::Easy, 50.0)];
    if profile.medium_unlocked {
        weights.push((TaskDifficulty::Medium, 35.0));
    }
    if profile.hard_unlocked {
        weights.push((TaskDifficulty::Hard, 15.0));
    }
    weights
        .choose_weighted(rng, |(_, w)| *w)
        .map_or(TaskDifficulty::Easy, |(d, _)| *d)
}

fn roll_objective(
    template: &ObjectiveTemplate,
    difficulty: TaskDifficulty,
    bonus: bool,
    rng: &mut impl Rng,
) -> Objective {
    let (lo, hi) = template.range_for(difficulty);
    let target = rng.gen_range(lo..=hi.max(lo));
    Objective {
        stat: template.stat.clone(),
        icon: template.icon.clone(),
        text: template.verb.replace("{n}", &target.to_string()),
        current: 0,
        target,
        bonus,
    }
}

/// Roll one task for the board. Hard tasks carry two mandatory
/// objectives; a bonus objective rides along with a reputation-scaled
/// chance.
pub fn generate_task(
    number: u32,
    profile: &Profile,
    content: &TaskContent,
    emergency: bool,
    rng: &mut impl Rng,
) -> Task {
    let builtin;
    let content = if content.objectives.is_empty() {
        builtin = TaskContent::builtin();
        &builtin
    } else {
        content
    };
    let difficulty = roll_difficulty(profile, emergency, rng);

    let mandatory_count = if difficulty == TaskDifficulty::Hard { 2 } else { 1 };
    let mut picks: Vec<&ObjectiveTemplate> = content
        .objectives
        .choose_multiple(rng, mandatory_count + 1)
        .collect();
    let bonus_pick = if picks.len() > mandatory_count {
        picks.pop()
    } else {
        None
    };

    let mut objectives: Vec<Objective> = picks
        .iter()
        .map(|t| roll_objective(t, difficulty, false, rng))
        .collect();

    let rep = stats::reputation_score(profile);
    let bonus_chance = BONUS_OBJECTIVE_BASE_CHANCE + rep * BONUS_OBJECTIVE_REP_FACTOR;
    if let Some(tpl) = bonus_pick {
        if rng.r#gen::<f64>() < bonus_chance {
            objectives.push(roll_objective(tpl, difficulty, true, rng));
        }
    }

    let names = if emergency && !content.emergency_names.is_empty() {
        &content.emergency_names
    } else {
        &content.names
    };
    let name = names
        .choose(rng)
        .cloned()
        .unwrap_or_else(|| "Contract".to_string());

    let cycles = if emergency {
        EMERGENCY_TASK_CYCLES
    } else {
        rng.gen_range(TASK_CYCLES_RANGE.0..=TASK_CYCLES_RANGE.1)
    };

    let desc = objectives
        .iter()
        .filter(|o| !o.bonus)
        .map(|o| o.text.clone())
        .collect::<Vec<_>>()
        .join("; ");

    Task {
        number,
        name,
        desc,
        difficulty,
        objectives,
        cycles_remaining: cycles,
        emergency,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn generated_task_is_well_formed() {
        let profile = Profile::default();
        let content = TaskContent::builtin();
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let task = generate_task(7, &profile, &content, false, &mut rng);
        assert_eq!(task.number, 7);
        assert!(!task.name.is_empty());
        assert!(task.objectives.iter().any(|o| !o.bonus));
        assert!(task.objectives.iter().all(|o| o.target >= 1));
        assert!((TASK_CYCLES_RANGE.0..=TASK_CYCLES_RANGE.1).contains(&task.cycles_remaining));
        assert!(!task.emergency);
    }

    #[test]
    fn locked_tiers_never_roll() {
        let profile = Profile::default();
        let content = TaskContent::builtin();
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        for n in 0..50 {
            let task = generate_task(n, &profile, &content, false, &mut rng);
            assert_eq!(task.difficulty, TaskDifficulty::Easy);
        }
    }

    #[test]
    fn emergency_tasks_expire_fast() {
        let mut profile = Profile::default();
        profile.medium_unlocked = true;
        let content = TaskContent::builtin();
        let mut rng = ChaCha20Rng::seed_from_u64(4);
        let task = generate_task(1, &profile, &content, true, &mut rng);
        assert!(task.emergency);
        assert_eq!(task.cycles_remaining, EMERGENCY_TASK_CYCLES);
        assert_eq!(task.difficulty, TaskDifficulty::Medium);
    }

    #[test]
    fn empty_content_falls_back_to_builtin() {
        let profile = Profile::default();
        let content = TaskContent {
            names: Vec::new(),
            emergency_names: Vec::new(),
            objectives: Vec::new(),
        };
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let task = generate_task(1, &profile, &content, false, &mut rng);
        assert!(!task.objectives.is_empty());
    }
}
