//! Simulator cache files
//!
//! Two files per simulator identity hash inside a cache directory:
//!
//! - `<hash>_practice.json` - the trace. First writer wins: the file is
//!   created with `create_new` and an existing one is never replaced.
//! - `<hash>_stats.json` - memoized statistics. Rewritten on every save; it
//!   was merged into memory before, so the new content is a superset. A
//!   simulator whose trace differs from the cached trace file never writes
//!   its statistics there.
//!
//! Two processes creating the same trace file at the same moment are not
//! coordinated beyond `create_new`; a reader may observe a partially written
//! file in that window.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, SimError};
use crate::simulator::{Simulator, SimulatorStats};
use crate::types::Practice;

#[derive(Serialize, Deserialize)]
struct PracticeRecord {
    practice: Practice,
}

#[derive(Serialize, Deserialize)]
struct StatsRecord {
    description: String,
    model: String,
    stats: SimulatorStats,
}

impl Simulator {
    pub fn practice_path(&self, directory: &Path) -> PathBuf {
        directory.join(format!("{}_practice.json", self.hash))
    }

    pub fn stats_path(&self, directory: &Path) -> PathBuf {
        directory.join(format!("{}_stats.json", self.hash))
    }

    /// Uses `directory` as cache: statistics are merged now, the trace is
    /// read lazily when first needed.
    pub fn attach(&mut self, directory: impl Into<PathBuf>) -> Result<()> {
        self.directory = Some(directory.into());
        self.load_stats()
    }

    /// Writes the trace unless a trace file already exists, then the
    /// statistics, but only when the trace file on disk is the trace they
    /// were computed on.
    pub fn save(&self, directory: impl AsRef<Path>) -> Result<()> {
        let directory = directory.as_ref();
        let Some(practice) = self.practice.get() else {
            return Ok(());
        };
        fs::create_dir_all(directory).map_err(|e| SimError::io(directory, e))?;
        if self.save_practice(directory, practice)? {
            self.save_stats(directory)?;
        }
        Ok(())
    }

    fn save_stats(&self, directory: &Path) -> Result<()> {
        let path = self.stats_path(directory);
        let record = StatsRecord {
            description: self.description.clone(),
            model: self.model_description(),
            stats: self.stats(),
        };
        let bytes = serde_json::to_vec(&record)?;
        fs::write(&path, bytes).map_err(|e| SimError::io(&path, e))?;
        debug!(path = %path.display(), "simulator stats saved");
        Ok(())
    }

    /// Returns whether the trace file in `directory` holds `practice`.
    fn save_practice(&self, directory: &Path, practice: &Practice) -> Result<bool> {
        if practice.is_empty() {
            return Ok(false);
        }
        let path = self.practice_path(directory);
        if self.practice_source.borrow().as_deref() == Some(path.as_path()) {
            return Ok(true);
        }
        let bytes = serde_json::to_vec(&PracticeRecord {
            practice: practice.clone(),
        })?;
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(&bytes).map_err(|e| SimError::io(&path, e))?;
                debug!(path = %path.display(), "simulator practice saved");
                *self.practice_source.borrow_mut() = Some(path);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let same = match read_if_exists(&path)? {
                    Some(raw) => serde_json::from_str::<PracticeRecord>(&raw)
                        .map(|record| record.practice == *practice)
                        .unwrap_or(false),
                    None => false,
                };
                if same {
                    *self.practice_source.borrow_mut() = Some(path);
                } else {
                    warn!(
                        path = %path.display(),
                        "another trace is already cached, keeping it and skipping stats"
                    );
                }
                Ok(same)
            }
            Err(e) => Err(SimError::io(&path, e)),
        }
    }

    pub(super) fn load_practice(&self) -> Result<Option<Practice>> {
        let Some(directory) = &self.directory else {
            return Ok(None);
        };
        let path = self.practice_path(directory);
        let Some(raw) = read_if_exists(&path)? else {
            return Ok(None);
        };
        let record: PracticeRecord =
            serde_json::from_str(&raw).map_err(|e| SimError::malformed(&path, e))?;
        if let Some(user) = self
            .users
            .iter()
            .find(|&u| !record.practice.contains_key(u))
        {
            warn!(path = %path.display(), user, "cached practice misses a user");
            return Err(SimError::CacheEntry {
                key: format!("{}.practice.{user}", path.display()),
                expected: "trace for every user",
            });
        }
        debug!(path = %path.display(), "simulator practice loaded");
        *self.practice_source.borrow_mut() = Some(path);
        Ok(Some(record.practice))
    }

    fn load_stats(&self) -> Result<()> {
        let Some(directory) = &self.directory else {
            return Ok(());
        };
        if self.stats_loaded.get() {
            return Ok(());
        }
        let path = self.stats_path(directory);
        let Some(raw) = read_if_exists(&path)? else {
            return Ok(());
        };
        let record: StatsRecord =
            serde_json::from_str(&raw).map_err(|e| SimError::malformed(&path, e))?;
        self.stats.borrow_mut().merge_missing(record.stats);
        self.stats_loaded.set(true);
        debug!(path = %path.display(), "simulator stats loaded");
        Ok(())
    }
}

fn read_if_exists(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(Some(raw)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SimError::io(path, e)),
    }
}
