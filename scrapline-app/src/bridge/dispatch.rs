//! Command delivery into the running game.
//!
//! All commands travel as batches through one launcher invocation: the
//! batch is written to the exchange file and the external keystroke
//! script replays it into the game console. Fire-and-forget batches go
//! through a queue worker that spaces deliveries out by a cooldown, so
//! rapid-fire UI actions never overlap a console that is still typing.
use std::io;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Sender, unbounded};
use log::{debug, error, warn};

/// Exchange file the keystroke script reads batches from.
pub const COMMAND_FILE_NAME: &str = "mng.txt";
/// Spacing between queued batch deliveries.
pub const BATCH_WRITE_COOLDOWN: Duration = Duration::from_millis(800);
/// How long a verified send waits for the queue to empty first.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Delivery seam: hand a command batch to whatever types it into the
/// game. Production uses the external keystroke script; tests substitute
/// a recorder.
pub trait Launch: Send + Sync + 'static {
    fn deliver(&self, commands: &[String]) -> io::Result<()>;
}

impl<L: Launch + ?Sized> Launch for Arc<L> {
    fn deliver(&self, commands: &[String]) -> io::Result<()> {
        (**self).deliver(commands)
    }
}

/// Writes the batch to the exchange file next to the script, then runs
/// the script and waits for it to finish typing.
#[derive(Debug, Clone)]
pub struct ScriptLauncher {
    script_path: PathBuf,
    command_file: PathBuf,
}

impl ScriptLauncher {
    #[must_use]
    pub fn new(script_path: impl Into<PathBuf>, exchange_dir: impl Into<PathBuf>) -> Self {
        Self {
            script_path: script_path.into(),
            command_file: exchange_dir.into().join(COMMAND_FILE_NAME),
        }
    }
}

impl Launch for ScriptLauncher {
    fn deliver(&self, commands: &[String]) -> io::Result<()> {
        let body = commands.join("\n");
        std::fs::write(&self.command_file, body)?;
        debug!(
            "delivering {} command(s) via {}",
            commands.len(),
            self.script_path.display()
        );
        let status = Command::new(&self.script_path)
            .arg(&self.command_file)
            .status()?;
        if !status.success() {
            return Err(io::Error::other(format!(
                "launcher exited with {status}"
            )));
        }
        Ok(())
    }
}

/// FIFO fire-and-forget channel. One persistent worker drains the queue
/// in order, sleeping the cooldown after every delivery. The pending
/// counter only drops after the cooldown completes, so a drain barrier
/// observes the full spacing of the last batch too.
pub struct CommandChannel {
    tx: Option<Sender<Vec<String>>>,
    pending: Arc<AtomicUsize>,
    worker: Option<JoinHandle<()>>,
}

impl CommandChannel {
    #[must_use]
    pub fn new(launcher: impl Launch) -> Self {
        Self::with_cooldown(launcher, BATCH_WRITE_COOLDOWN)
    }

    #[must_use]
    pub fn with_cooldown(launcher: impl Launch, cooldown: Duration) -> Self {
        let (tx, rx) = unbounded::<Vec<String>>();
        let pending = Arc::new(AtomicUsize::new(0));
        let worker_pending = Arc::clone(&pending);
        let worker = thread::Builder::new()
            .name("command-channel".to_string())
            .spawn(move || {
                for batch in rx {
                    if let Err(err) = launcher.deliver(&batch) {
                        error!("command batch delivery failed: {err}");
                    }
                    thread::sleep(cooldown);
                    worker_pending.fetch_sub(1, Ordering::SeqCst);
                }
            })
            .ok();
        if worker.is_none() {
            error!("failed to spawn command channel worker");
        }
        Self {
            tx: Some(tx),
            pending,
            worker,
        }
    }

    /// Queue a batch. Never blocks; order of enqueues is the order of
    /// deliveries.
    pub fn enqueue(&self, commands: Vec<String>) {
        if commands.is_empty() {
            return;
        }
        self.pending.fetch_add(1, Ordering::SeqCst);
        if let Some(tx) = &self.tx {
            if tx.send(commands).is_err() {
                self.pending.fetch_sub(1, Ordering::SeqCst);
                error!("command channel worker is gone; batch dropped");
            }
        }
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Block until the queue is empty or the timeout passes. Returns
    /// whether the queue actually drained.
    pub fn drain(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.pending() > 0 {
            if Instant::now() >= deadline {
                warn!("command queue did not drain within {timeout:?}");
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
        true
    }
}

impl Drop for CommandChannel {
    fn drop(&mut self) {
        // Closing the sender ends the worker after the queue empties.
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("command channel worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct RecordingLauncher {
        batches: Arc<Mutex<Vec<(Instant, Vec<String>)>>>,
    }

    impl Launch for RecordingLauncher {
        fn deliver(&self, commands: &[String]) -> io::Result<()> {
            self.batches
                .lock()
                .unwrap()
                .push((Instant::now(), commands.to_vec()));
            Ok(())
        }
    }

    #[test]
    fn batches_deliver_in_order_with_spacing() {
        let launcher = RecordingLauncher::default();
        let batches = Arc::clone(&launcher.batches);
        let channel = CommandChannel::with_cooldown(launcher, Duration::from_millis(50));

        channel.enqueue(vec!["player.additem 0000000F 10".to_string()]);
        channel.enqueue(vec!["player.rewardxp 100".to_string()]);
        channel.enqueue(vec!["coc Megaton".to_string()]);
        assert!(channel.drain(Duration::from_secs(5)));

        let recorded = batches.lock().unwrap();
        assert_eq!(recorded.len(), 3);
        assert_eq!(recorded[0].1[0], "player.additem 0000000F 10");
        assert_eq!(recorded[1].1[0], "player.rewardxp 100");
        assert_eq!(recorded[2].1[0], "coc Megaton");
        for pair in recorded.windows(2) {
            let gap = pair[1].0.duration_since(pair[0].0);
            assert!(gap >= Duration::from_millis(45), "gap was {gap:?}");
        }
    }

    #[test]
    fn empty_batches_are_ignored() {
        let launcher = RecordingLauncher::default();
        let batches = Arc::clone(&launcher.batches);
        let channel = CommandChannel::with_cooldown(launcher, Duration::from_millis(10));
        channel.enqueue(Vec::new());
        assert_eq!(channel.pending(), 0);
        drop(channel);
        assert!(batches.lock().unwrap().is_empty());
    }

    #[test]
    fn drain_times_out_when_backed_up() {
        struct SlowLauncher;
        impl Launch for SlowLauncher {
            fn deliver(&self, _commands: &[String]) -> io::Result<()> {
                thread::sleep(Duration::from_millis(300));
                Ok(())
            }
        }
        let channel = CommandChannel::with_cooldown(SlowLauncher, Duration::from_millis(300));
        channel.enqueue(vec!["a".to_string()]);
        channel.enqueue(vec!["b".to_string()]);
        assert!(!channel.drain(Duration::from_millis(50)));
        assert!(channel.drain(Duration::from_secs(5)));
    }
}
