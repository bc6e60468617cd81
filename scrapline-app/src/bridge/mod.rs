//! The file-based bridge into the running game: queued fire-and-forget
//! batches, echo-verified batches, and console dump scans.
pub mod dispatch;
pub mod poll;
pub mod scan;

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};
use thiserror::Error;

use scrapline_game::Position;
use scrapline_game::console;

use dispatch::{CommandChannel, DRAIN_TIMEOUT, Launch};
use poll::{POLL_INTERVAL, PollStep, StablePoll};

/// How long a verified send waits for its echo to land in the dump.
pub const VERIFY_TIMEOUT: Duration = Duration::from_secs(4);
/// Stat scans dump slowly; give the full batch this long to settle.
pub const STAT_SCAN_TIMEOUT: Duration = Duration::from_secs(15);
/// Position dumps are three lines and settle fast.
pub const POSITION_TIMEOUT: Duration = Duration::from_secs(4);

/// Dump file names the app asks `scof` to write.
pub const HANDSHAKE_DUMP: &str = "sl_handshake";
pub const STAT_DUMP: &str = "sl_stats";
pub const POSITION_DUMP: &str = "sl_pos";

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("echo verification timed out after {0:?}")]
    VerifyTimeout(Duration),
    #[error("position dump never settled")]
    PositionTimeout,
}

/// One step of an in-flight stat scan.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanProgress {
    Pending,
    Ready(BTreeMap<String, f64>),
    TimedOut,
}

/// Everything the raid runtime needs from the game side. Production is
/// [`FileBridge`]; tests substitute a scripted double.
pub trait GameBridge {
    /// Queue a fire-and-forget batch. Ordered, spaced, unconfirmed.
    fn enqueue(&self, commands: Vec<String>);

    /// Deliver a batch wrapped in the echo protocol and block until the
    /// echo confirms the whole batch was consumed.
    ///
    /// # Errors
    ///
    /// Returns an error if delivery fails or the echo never appears.
    fn execute_verified(&mut self, commands: &[String]) -> Result<(), BridgeError>;

    /// Kick off an asynchronous stat scan dump.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan batch cannot be delivered.
    fn begin_stat_scan(&mut self) -> Result<(), BridgeError>;

    /// Advance the in-flight stat scan one poll step.
    fn poll_stat_scan(&mut self) -> ScanProgress;

    /// Synchronously capture the player's world position.
    ///
    /// # Errors
    ///
    /// Returns an error if delivery fails or the dump never settles.
    fn snapshot_position(&mut self) -> Result<Position, BridgeError>;
}

/// The production bridge: one exchange directory shared with the game,
/// one keystroke launcher, one persistent queue worker.
pub struct FileBridge {
    launcher: Arc<dyn Launch>,
    channel: CommandChannel,
    dump_dir: PathBuf,
    active_scan: Option<StablePoll>,
}

impl FileBridge {
    #[must_use]
    pub fn new(launcher: Arc<dyn Launch>, dump_dir: impl Into<PathBuf>) -> Self {
        let channel = CommandChannel::new(Arc::clone(&launcher));
        Self {
            launcher,
            channel,
            dump_dir: dump_dir.into(),
            active_scan: None,
        }
    }

    /// Queue worker handle, exposed for shutdown-time draining.
    #[must_use]
    pub fn channel(&self) -> &CommandChannel {
        &self.channel
    }

    fn dump_path(&self, name: &str) -> PathBuf {
        self.dump_dir.join(name)
    }

    fn clear_stale_dump(&self, name: &str) -> io::Result<()> {
        match fs::remove_file(self.dump_path(name)) {
            Ok(()) => {
                debug!("removed stale dump {name}");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn wait_for_echo(&self, path: &Path) -> Result<(), BridgeError> {
        let deadline = Instant::now() + VERIFY_TIMEOUT;
        loop {
            if let Ok(bytes) = fs::read(path) {
                let text = String::from_utf8_lossy(&bytes);
                if text.lines().any(console::is_echo_line) {
                    return Ok(());
                }
            }
            if Instant::now() >= deadline {
                return Err(BridgeError::VerifyTimeout(VERIFY_TIMEOUT));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

impl GameBridge for FileBridge {
    fn enqueue(&self, commands: Vec<String>) {
        self.channel.enqueue(commands);
    }

    fn execute_verified(&mut self, commands: &[String]) -> Result<(), BridgeError> {
        // Queued batches ahead of us must finish typing first, or the
        // echo would vouch for a half-delivered mix. On a stuck queue we
        // proceed anyway; the echo check still protects this batch.
        if !self.channel.drain(DRAIN_TIMEOUT) {
            warn!("sending verified batch past an undrained queue");
        }
        self.clear_stale_dump(HANDSHAKE_DUMP)?;

        let mut wrapped = Vec::with_capacity(commands.len() + 3);
        wrapped.push(console::console_dump(HANDSHAKE_DUMP));
        wrapped.extend_from_slice(commands);
        wrapped.push(console::ECHO_PROBE.to_string());
        wrapped.push(console::console_dump("0"));
        self.launcher.deliver(&wrapped)?;

        self.wait_for_echo(&self.dump_path(HANDSHAKE_DUMP))
    }

    fn begin_stat_scan(&mut self) -> Result<(), BridgeError> {
        self.clear_stale_dump(STAT_DUMP)?;
        self.enqueue(scan::build_stat_scan_batch(STAT_DUMP));
        self.active_scan = Some(StablePoll::new(
            self.dump_path(STAT_DUMP),
            STAT_SCAN_TIMEOUT,
        ));
        Ok(())
    }

    fn poll_stat_scan(&mut self) -> ScanProgress {
        let Some(scan) = self.active_scan.as_mut() else {
            return ScanProgress::TimedOut;
        };
        match scan.step() {
            PollStep::Pending => ScanProgress::Pending,
            PollStep::Stable(contents) => {
                self.active_scan = None;
                ScanProgress::Ready(scan::parse_stat_dump(&contents))
            }
            PollStep::TimedOut => {
                self.active_scan = None;
                ScanProgress::TimedOut
            }
        }
    }

    fn snapshot_position(&mut self) -> Result<Position, BridgeError> {
        self.clear_stale_dump(POSITION_DUMP)?;
        // The dump request joins the queue so it cannot race a batch the
        // worker is still typing into the console.
        self.channel.enqueue(scan::build_position_batch(POSITION_DUMP));
        if !self.channel.drain(DRAIN_TIMEOUT) {
            warn!("position request is stuck behind an undrained queue");
        }
        let contents = poll::await_stable_file(
            &self.dump_path(POSITION_DUMP),
            POSITION_TIMEOUT,
            poll::DEFAULT_STABILITY_WINDOW,
        )
        .ok_or(BridgeError::PositionTimeout)?;
        scan::parse_position(&contents).ok_or(BridgeError::PositionTimeout)
    }
}
