//! File-stability polling: a console dump file counts as complete only
//! after its size has held still for a quiet window, because the game
//! writes dumps in bursts with no end marker.
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::trace;

/// Cadence every poller steps at.
pub const POLL_INTERVAL: Duration = Duration::from_millis(200);
/// Size must hold still this long before a dump counts as finished.
pub const DEFAULT_STABILITY_WINDOW: Duration = Duration::from_millis(500);

/// One step of a stability poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStep {
    /// File missing or still changing; step again next interval.
    Pending,
    /// File held still for the quiet window; carries its contents.
    Stable(String),
    TimedOut,
}

/// Resumable poll state for one expected file. The caller owns the clock
/// and the loop; each `step` is a single cheap filesystem check, so the
/// poll can interleave with other work without threads or callbacks.
#[derive(Debug)]
pub struct StablePoll {
    path: PathBuf,
    window: Duration,
    deadline: Instant,
    last_len: Option<u64>,
    held_since: Option<Instant>,
}

impl StablePoll {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self::with_window(path, timeout, DEFAULT_STABILITY_WINDOW)
    }

    #[must_use]
    pub fn with_window(path: impl Into<PathBuf>, timeout: Duration, window: Duration) -> Self {
        Self {
            path: path.into(),
            window,
            deadline: Instant::now() + timeout,
            last_len: None,
            held_since: None,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check the file once and advance the stability bookkeeping.
    pub fn step(&mut self) -> PollStep {
        let now = Instant::now();
        if now >= self.deadline {
            return PollStep::TimedOut;
        }

        let len = match fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(_) => {
                self.last_len = None;
                self.held_since = None;
                return PollStep::Pending;
            }
        };

        // A file the game has created but not started filling is the same
        // as no file at all; the stability window only runs on contents.
        if len == 0 {
            self.last_len = None;
            self.held_since = None;
            return PollStep::Pending;
        }

        if self.last_len == Some(len) {
            let held = self.held_since.get_or_insert(now);
            if now.duration_since(*held) >= self.window {
                let contents = match fs::read(&self.path) {
                    Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                    Err(_) => return PollStep::Pending,
                };
                trace!("{} stable at {len} bytes", self.path.display());
                return PollStep::Stable(contents);
            }
        } else {
            trace!("{} grew to {len} bytes", self.path.display());
            self.last_len = Some(len);
            self.held_since = None;
        }
        PollStep::Pending
    }
}

/// Blocking convenience wrapper around [`StablePoll`].
#[must_use]
pub fn await_stable_file(path: &Path, timeout: Duration, window: Duration) -> Option<String> {
    let mut poll = StablePoll::with_window(path, timeout, window);
    loop {
        match poll.step() {
            PollStep::Pending => std::thread::sleep(POLL_INTERVAL),
            PollStep::Stable(contents) => return Some(contents),
            PollStep::TimedOut => return None,
        }
    }
}
