//! On-disk persistence: the profile store and the content loader.
//!
//! Profile writes are atomic: serialize to a sibling temp file, fsync,
//! then rename over the target, so a crash mid-write can never leave a
//! truncated save behind.
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{info, warn};
use thiserror::Error;

use scrapline_game::{ContentSource, Profile, ProfileStore, RawContent};

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed document: {0}")]
    Format(#[from] serde_json::Error),
}

/// JSON profile store rooted at one save file path.
#[derive(Debug, Clone)]
pub struct JsonProfileStore {
    path: PathBuf,
}

impl JsonProfileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_atomic(&self, bytes: &[u8]) -> Result<(), PersistError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl ProfileStore for JsonProfileStore {
    type Error = PersistError;

    fn save_profile(&self, profile: &Profile) -> Result<(), Self::Error> {
        let bytes = serde_json::to_vec_pretty(profile)?;
        self.write_atomic(&bytes)?;
        Ok(())
    }

    fn load_profile(&self) -> Result<Option<Profile>, Self::Error> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!("no profile at {}, starting fresh", self.path.display());
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        // Missing fields backfill from defaults, so older saves load as-is.
        let profile: Profile = serde_json::from_slice(&bytes)?;
        Ok(Some(profile))
    }
}

/// Content loader reading one JSON document; a missing file is not an
/// error, it just means the builtin content set.
#[derive(Debug, Clone)]
pub struct JsonContentSource {
    path: PathBuf,
}

impl JsonContentSource {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ContentSource for JsonContentSource {
    type Error = PersistError;

    fn load_content(&self) -> Result<RawContent, Self::Error> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    "no content file at {}, using builtin content",
                    self.path.display()
                );
                return Ok(RawContent::default());
            }
            Err(err) => return Err(err.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }
}
