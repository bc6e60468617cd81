//! Scrapline companion app internals: persistence, the file bridge into
//! the running game, buff batches, and the raid runtime the CLI drives.

pub mod bridge;
pub mod buffs;
pub mod persist;
pub mod runtime;

pub use bridge::{BridgeError, FileBridge, GameBridge, ScanProgress};
pub use persist::{JsonContentSource, JsonProfileStore, PersistError};
pub use runtime::{RaidRuntime, TickEvents};
