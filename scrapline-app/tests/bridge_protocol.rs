//! End-to-end exercises of the file bridge against a scripted launcher.
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use scrapline_app::bridge::dispatch::{CommandChannel, Launch};
use scrapline_app::bridge::{BridgeError, FileBridge, GameBridge, HANDSHAKE_DUMP, POSITION_DUMP};

/// Records every delivery and plays a canned dump file per batch, the way
/// the game would answer a `scof` bracket.
struct ScriptedLauncher {
    dump_dir: PathBuf,
    deliveries: Arc<Mutex<Vec<Vec<String>>>>,
    /// Written to the named dump whenever a batch opens one.
    responses: Mutex<Vec<(String, String)>>,
}

impl ScriptedLauncher {
    fn new(dump_dir: PathBuf) -> Self {
        Self {
            dump_dir,
            deliveries: Arc::default(),
            responses: Mutex::new(Vec::new()),
        }
    }

    fn respond(&self, dump: &str, contents: &str) {
        self.responses
            .lock()
            .unwrap()
            .push((dump.to_string(), contents.to_string()));
    }
}

impl Launch for ScriptedLauncher {
    fn deliver(&self, commands: &[String]) -> io::Result<()> {
        self.deliveries.lock().unwrap().push(commands.to_vec());
        let opened = commands
            .iter()
            .find_map(|c| c.strip_prefix("scof "))
            .filter(|name| *name != "0");
        if let Some(name) = opened {
            let mut responses = self.responses.lock().unwrap();
            if let Some(idx) = responses.iter().position(|(dump, _)| dump == name) {
                let (_, contents) = responses.remove(idx);
                fs::write(self.dump_dir.join(name), contents)?;
            }
        }
        Ok(())
    }
}

#[test]
fn verified_batch_is_wrapped_in_the_echo_protocol() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = Arc::new(ScriptedLauncher::new(dir.path().to_path_buf()));
    launcher.respond(HANDSHAKE_DUMP, "player.GetLevel\nGetLevel >> 12.00\n");
    let deliveries = Arc::clone(&launcher.deliveries);

    let mut bridge = FileBridge::new(launcher, dir.path());
    bridge
        .execute_verified(&[
            "player.rewardxp 225".to_string(),
            "player.additem 0000000F 105".to_string(),
        ])
        .unwrap();

    let recorded = deliveries.lock().unwrap();
    let wrapped = recorded.last().unwrap();
    assert_eq!(
        wrapped.as_slice(),
        [
            "scof sl_handshake",
            "player.rewardxp 225",
            "player.additem 0000000F 105",
            "player.GetLevel",
            "scof 0",
        ]
    );
}

#[test]
fn missing_echo_fails_verification() {
    let dir = tempfile::tempdir().unwrap();
    // No canned response: the dump never appears, the echo never lands.
    let launcher = Arc::new(ScriptedLauncher::new(dir.path().to_path_buf()));
    let mut bridge = FileBridge::new(launcher, dir.path());

    let started = Instant::now();
    let result = bridge.execute_verified(&["player.rewardxp 1".to_string()]);
    assert!(matches!(result, Err(BridgeError::VerifyTimeout(_))));
    assert!(started.elapsed() >= Duration::from_secs(4));
}

#[test]
fn stale_handshake_dump_cannot_satisfy_a_new_batch() {
    let dir = tempfile::tempdir().unwrap();
    // A leftover dump from a previous batch sits on disk.
    fs::write(dir.path().join(HANDSHAKE_DUMP), "GetLevel >> 9.00\n").unwrap();

    let launcher = Arc::new(ScriptedLauncher::new(dir.path().to_path_buf()));
    let mut bridge = FileBridge::new(launcher, dir.path());

    let result = bridge.execute_verified(&["player.rewardxp 1".to_string()]);
    // The stale file was deleted up front, so with no fresh response the
    // verification must time out rather than trust old evidence.
    assert!(matches!(result, Err(BridgeError::VerifyTimeout(_))));
}

#[test]
fn queued_batches_keep_enqueue_order() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = Arc::new(ScriptedLauncher::new(dir.path().to_path_buf()));
    let deliveries = Arc::clone(&launcher.deliveries);

    let channel = CommandChannel::with_cooldown(launcher, Duration::from_millis(20));
    for i in 0..5 {
        channel.enqueue(vec![format!("player.rewardxp {i}")]);
    }
    assert!(channel.drain(Duration::from_secs(5)));

    let recorded = deliveries.lock().unwrap();
    let flattened: Vec<&str> = recorded.iter().flatten().map(String::as_str).collect();
    assert_eq!(
        flattened,
        [
            "player.rewardxp 0",
            "player.rewardxp 1",
            "player.rewardxp 2",
            "player.rewardxp 3",
            "player.rewardxp 4",
        ]
    );
}

#[test]
fn position_snapshot_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = Arc::new(ScriptedLauncher::new(dir.path().to_path_buf()));
    launcher.respond(
        POSITION_DUMP,
        "player.getpos x\nGetPos >> 4096.00\nplayer.getpos y\nGetPos >> -512.50\nplayer.getpos z\nGetPos >> 96.00\n",
    );

    let mut bridge = FileBridge::new(launcher, dir.path());
    let pos = bridge.snapshot_position().unwrap();
    assert!((pos.x - 4096.0).abs() < f64::EPSILON);
    assert!((pos.y + 512.5).abs() < f64::EPSILON);
    assert!((pos.z - 96.0).abs() < f64::EPSILON);
}

#[test]
fn position_request_waits_its_turn_in_the_queue() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = Arc::new(ScriptedLauncher::new(dir.path().to_path_buf()));
    launcher.respond(
        POSITION_DUMP,
        "player.getpos x\nGetPos >> 1.00\nplayer.getpos y\nGetPos >> 2.00\nplayer.getpos z\nGetPos >> 3.00\n",
    );
    let deliveries = Arc::clone(&launcher.deliveries);

    let mut bridge = FileBridge::new(launcher, dir.path());
    bridge.enqueue(vec!["player.additem 0000000F 10".to_string()]);
    bridge.snapshot_position().unwrap();

    // The dump request rides the same queue, behind the earlier batch.
    let recorded = deliveries.lock().unwrap();
    assert_eq!(recorded.len(), 2);
    assert_eq!(recorded[0][0], "player.additem 0000000F 10");
    assert_eq!(recorded[1][0], format!("scof {POSITION_DUMP}"));
}
