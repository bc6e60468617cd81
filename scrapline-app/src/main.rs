use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use log::info;

use scrapline_app::bridge::FileBridge;
use scrapline_app::bridge::dispatch::ScriptLauncher;
use scrapline_app::bridge::poll::POLL_INTERVAL;
use scrapline_app::persist::{JsonContentSource, JsonProfileStore};
use scrapline_app::runtime::RaidRuntime;
use scrapline_game::{ContentSource, GameContent, RaidDifficulty};

/// How many recent actions the crash log keeps.
const ACTION_WINDOW: usize = 32;

#[derive(Debug, Parser)]
#[command(name = "scrapline", version)]
#[command(about = "Out-of-process raid loop and meta-progression for the Scrapline mod")]
struct Args {
    /// Profile save file
    #[arg(long, default_value = "scrapline_profile.json")]
    save: PathBuf,

    /// Content document (modifiers, tasks, loot, companions)
    #[arg(long, default_value = "scrapline_content.json")]
    content: PathBuf,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Print the profile summary and exit
    Status,
    /// Start a raid and keep ticking until the raid ends
    Run {
        /// Raid difficulty
        #[arg(long, default_value = "medium")]
        difficulty: RaidDifficulty,
        /// Raid location (random when omitted)
        #[arg(long)]
        location: Option<String>,
    },
    /// Start a raid without entering the tick loop
    Start {
        #[arg(long, default_value = "medium")]
        difficulty: RaidDifficulty,
        #[arg(long)]
        location: Option<String>,
    },
    /// Extract from the active raid
    Extract,
    /// Fire the SOS flare and extract
    Sos,
    /// Record a death in the active raid
    Death,
    /// Pause or resume the active raid clock
    Pause,
    /// Force an ambush in the active raid, skipping the timing gates
    AmbushTest,
    /// Print the recent reward history
    History,
}

fn recent_actions() -> &'static Mutex<VecDeque<String>> {
    static ACTIONS: OnceLock<Mutex<VecDeque<String>>> = OnceLock::new();
    ACTIONS.get_or_init(|| Mutex::new(VecDeque::new()))
}

fn note_action(action: impl Into<String>) {
    if let Ok(mut window) = recent_actions().lock() {
        if window.len() >= ACTION_WINDOW {
            window.pop_front();
        }
        window.push_back(action.into());
    }
}

/// Crashes land in crash.log with the recent action window, because the
/// app usually runs minimized next to the game with no console visible.
fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let actions = recent_actions()
            .lock()
            .map(|w| w.iter().cloned().collect::<Vec<_>>().join("\n  "))
            .unwrap_or_default();
        let report = format!(
            "[{}] panic: {info}\nrecent actions:\n  {actions}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        let _ = append_crash_report(std::path::Path::new("crash.log"), &report);
        default_hook(info);
    }));
}

/// Append so one session's crash never erases an earlier one.
fn append_crash_report(path: &std::path::Path, report: &str) -> std::io::Result<()> {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)?;
    file.write_all(report.as_bytes())
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

fn main() -> Result<()> {
    env_logger::init();
    install_panic_hook();
    let args = Args::parse();

    let store = JsonProfileStore::new(&args.save);
    let raw = JsonContentSource::new(&args.content)
        .load_content()
        .context("loading content")?;
    let content = GameContent::from_raw(raw);

    let mut rng = rand::thread_rng();

    // The bridge needs paths out of the profile, so peek before the
    // runtime takes the store over.
    let peek = scrapline_game::ProfileStore::load_profile(&store)
        .context("loading profile")?
        .unwrap_or_default();
    if peek.launcher_path.is_empty() || peek.game_install_path.is_empty() {
        if !matches!(args.command, CliCommand::Status | CliCommand::History) {
            bail!(
                "set launcher_path and game_install_path in {} first",
                args.save.display()
            );
        }
    }
    let launcher = Arc::new(ScriptLauncher::new(
        &peek.launcher_path,
        &peek.game_install_path,
    ));
    let bridge = FileBridge::new(launcher, &peek.game_install_path);
    let mut runtime = RaidRuntime::new(bridge, store, content, &mut rng)?;

    match args.command {
        CliCommand::Status => {
            print_status(&runtime);
        }
        CliCommand::Run {
            difficulty,
            location,
        } => {
            note_action(format!("run {difficulty}"));
            runtime.start_raid(difficulty, location.as_deref(), unix_now(), &mut rng)?;
            run_tick_loop(&mut runtime, &mut rng)?;
        }
        CliCommand::Start {
            difficulty,
            location,
        } => {
            note_action(format!("start {difficulty}"));
            runtime.start_raid(difficulty, location.as_deref(), unix_now(), &mut rng)?;
            println!("raid started at {}", runtime.profile().current_raid_location);
        }
        CliCommand::Extract => {
            note_action("extract");
            let report = runtime.extract(false, unix_now(), &mut rng)?;
            print_end_report(&report);
        }
        CliCommand::Sos => {
            note_action("sos");
            let report = runtime.extract(true, unix_now(), &mut rng)?;
            print_end_report(&report);
        }
        CliCommand::Death => {
            note_action("death");
            let report = runtime.death(unix_now(), &mut rng)?;
            print_end_report(&report);
        }
        CliCommand::Pause => {
            note_action("pause");
            let paused = runtime.toggle_pause(unix_now())?;
            println!("raid {}", if paused { "paused" } else { "resumed" });
        }
        CliCommand::AmbushTest => {
            note_action("ambush-test");
            if runtime.force_ambush(unix_now(), &mut rng)? {
                println!("ambush spawned");
            } else {
                println!("ambush not spawned (modifier disabled, or no eligible wave)");
            }
        }
        CliCommand::History => {
            print_history(&runtime);
        }
    }

    Ok(())
}

fn run_tick_loop<B, S>(runtime: &mut RaidRuntime<B, S>, rng: &mut impl rand::Rng) -> Result<()>
where
    B: scrapline_app::GameBridge,
    S: scrapline_game::ProfileStore,
{
    info!("entering tick loop");
    loop {
        let events = runtime.tick(unix_now(), rng)?;
        if let Some(outcome) = events.raid_ended {
            println!("raid ended: {outcome:?}");
            return Ok(());
        }
        if !runtime.profile().raid_active {
            return Ok(());
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn print_status<B, S>(runtime: &RaidRuntime<B, S>)
where
    B: scrapline_app::GameBridge,
    S: scrapline_game::ProfileStore,
{
    let p = runtime.profile();
    println!("day cycle     {}", p.day_cycle);
    println!("scrip         {}", p.scrip);
    println!("xp            {}", p.current_xp);
    println!("reputation    {:.2}", p.reputation);
    println!("threat        {}", p.threat_level);
    println!(
        "raid          {}",
        if p.raid_active {
            p.current_raid_location.as_str()
        } else {
            "none"
        }
    );
    println!(
        "tasks         {} active / {} offered",
        p.tasks.len(),
        p.taskboard_pool.len()
    );
    println!(
        "record        {} extracted / {} died over {} raids",
        p.raids_extracted, p.raids_died, p.raids_started
    );
    if let Some(companion) = &p.active_companion {
        println!("companion     {companion}");
    }
}

fn print_history<B, S>(runtime: &RaidRuntime<B, S>)
where
    B: scrapline_app::GameBridge,
    S: scrapline_game::ProfileStore,
{
    let history = &runtime.profile().reward_history;
    if history.is_empty() {
        println!("no rewards recorded yet");
        return;
    }
    for entry in history {
        let when = chrono::DateTime::from_timestamp(entry.at as i64, 0)
            .map(|t| {
                t.with_timezone(&chrono::Local)
                    .format("%H:%M")
                    .to_string()
            })
            .unwrap_or_else(|| "--:--".to_string());
        println!(
            "{when}  {:<6} {} xp / {} caps / {} scrip / {} item(s)",
            entry.source,
            entry.xp,
            entry.caps,
            entry.scrip,
            entry.items.len()
        );
    }
}

fn print_end_report(report: &scrapline_game::RaidEndReport) {
    println!(
        "{:?} after {:.1} min",
        report.outcome,
        report.duration_secs / 60.0
    );
    if let Some(rewards) = &report.rewards {
        println!(
            "rewards: {} xp, {} caps, {} scrip, {} item(s)",
            rewards.xp,
            rewards.caps,
            rewards.scrip,
            rewards.items.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crash_reports_accumulate_across_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crash.log");
        append_crash_report(&path, "first panic\n").unwrap();
        append_crash_report(&path, "second panic\n").unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "first panic\nsecond panic\n");
    }
}
