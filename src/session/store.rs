//! File-based credential store
//!
//! One JSON file per (platform, account), named `<platform>_<account>.json`.
//! Writes go to a hidden temporary file in the same directory that is then
//! renamed over the target, so a reader sees either the previous record or
//! the new one, never a partial file.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::types::{Account, Platform, SessionRecord};
use crate::{Error, Result};

/// Accounts with a stored session, per platform
pub type SessionListing = BTreeMap<Platform, BTreeSet<Account>>;

const RECORD_EXTENSION: &str = "json";

/// Owns every persisted [`SessionRecord`]
#[derive(Debug, Clone)]
pub struct CredentialStore {
    root: PathBuf,
}

impl CredentialStore {
    /// Store rooted at `root`; the directory is created on first write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic record path for a key
    pub fn record_path(&self, platform: Platform, account: &Account) -> PathBuf {
        self.root
            .join(format!("{}_{}.{}", platform, account, RECORD_EXTENSION))
    }

    pub fn exists(&self, platform: Platform, account: &Account) -> bool {
        self.record_path(platform, account).is_file()
    }

    /// Read a record; `Ok(None)` when nothing is stored for the key
    pub fn read(&self, platform: Platform, account: &Account) -> Result<Option<SessionRecord>> {
        let path = self.record_path(platform, account);
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::storage("read", path, e)),
        };

        let record: SessionRecord = serde_json::from_slice(&raw)
            .map_err(|e| Error::corrupt_record(&path, e.to_string()))?;

        if record.platform != platform || &record.account != account {
            return Err(Error::corrupt_record(
                &path,
                format!(
                    "record belongs to {}/{}",
                    record.platform, record.account
                ),
            ));
        }

        debug!(%platform, %account, saved_at = %record.saved_at, "Loaded session record");
        Ok(Some(record))
    }

    /// Persist `blob` for the key, atomically replacing any previous record
    pub fn write(&self, platform: Platform, account: &Account, blob: &str) -> Result<SessionRecord> {
        let record = SessionRecord::new(platform, account.clone(), blob);
        let path = self.record_path(platform, account);

        std::fs::create_dir_all(&self.root)
            .map_err(|e| Error::storage("create directory", &self.root, e))?;

        let payload = serde_json::to_vec_pretty(&record)?;

        let mut temp = tempfile::Builder::new()
            .prefix(&format!(".{}_{}.", platform, account))
            .suffix(".partial")
            .tempfile_in(&self.root)
            .map_err(|e| Error::storage("create temporary file", &self.root, e))?;
        temp.write_all(&payload)
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|e| Error::storage("write", temp.path().to_path_buf(), e))?;

        temp.persist(&path)
            .map_err(|e| Error::storage("replace", &path, e.error))?;

        info!(%platform, %account, path = %path.display(), "Saved session record");
        Ok(record)
    }

    /// Remove the record for the key; no-op when absent
    pub fn delete(&self, platform: Platform, account: &Account) -> Result<()> {
        let path = self.record_path(platform, account);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                info!(%platform, %account, "Deleted session record");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(%platform, %account, "No session record to delete");
                Ok(())
            }
            Err(e) => Err(Error::storage("delete", path, e)),
        }
    }

    /// Every stored (platform, account), derived from record file names
    pub fn list(&self) -> Result<SessionListing> {
        let mut listing = SessionListing::new();

        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(listing),
            Err(e) => return Err(Error::storage("list", &self.root, e)),
        };

        for entry in entries {
            let entry = entry.map_err(|e| Error::storage("list", &self.root, e))?;
            let path = entry.path();

            if path.extension().and_then(|s| s.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            match parse_record_stem(stem) {
                Some((platform, account)) => {
                    listing.entry(platform).or_default().insert(account);
                }
                None => warn!("Ignoring unrecognized file in sessions dir: {:?}", path),
            }
        }

        Ok(listing)
    }
}

/// `douyin_main` -> (Douyin, "main"); platform names contain no `_`
fn parse_record_stem(stem: &str) -> Option<(Platform, Account)> {
    let (platform, account) = stem.split_once('_')?;
    Some((platform.parse().ok()?, Account::new(account).ok()?))
}
