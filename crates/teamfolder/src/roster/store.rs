//! Reading and writing the roster document inside the metadata subfolder.
//!
//! In [`WriteMode::Overwrite`] a write replaces the document blindly, so two
//! clients that both read, append and write lose whichever mutation lands
//! first. [`WriteMode::Merge`] serializes writers behind a lock file next to
//! the roster (`<roster>.lock`, created exclusively). While holding it the
//! writer re-reads the document, merges by member id, renames the merged
//! document into place, and reads it back to confirm every member it wrote
//! is there before reporting success. A lock older than
//! [`MergeOptions::stale_after`] is treated as abandoned and removed.
//!
//! Either way each document is staged in a uniquely named temp file and
//! renamed over the roster, so readers never see a torn document.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::folder::FolderHandle;
use crate::roster::TeamRoster;

const BACKUP_DATE_FORMAT: &str = "%Y%m%d_%H%M%S";

const LOCK_POLL_MIN: Duration = Duration::from_millis(5);
const LOCK_POLL_MAX: Duration = Duration::from_millis(200);

/// Settings for [`WriteMode::Merge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOptions {
    /// Attempts before giving up with [`Error::WriteConflict`].
    pub max_attempts: u32,
    /// Base delay between attempts; grows linearly.
    pub backoff: Duration,
    /// How long to wait for another writer's lock.
    pub lock_timeout: Duration,
    /// Age after which a leftover lock or staging file is considered abandoned.
    pub stale_after: Duration,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_millis(50),
            lock_timeout: Duration::from_secs(10),
            stale_after: Duration::from_secs(30),
        }
    }
}

/// How [`RosterStore::write`] reconciles with the on-disk document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace the document as-is; last writer wins.
    Overwrite,
    /// Take the roster lock, merge onto the current document and verify.
    Merge(MergeOptions),
}

/// Result of loading the roster document.
#[derive(Debug, Clone, PartialEq)]
pub enum RosterLoad {
    /// No metadata folder or no roster document.
    Missing,
    /// The document parsed.
    Loaded {
        /// The parsed roster.
        roster: TeamRoster,
        /// BLAKE3 hash of the raw document.
        hash: blake3::Hash,
    },
    /// The document exists but does not parse.
    Corrupted {
        /// Parser message.
        message: String,
    },
}

impl RosterLoad {
    /// The roster, if one parsed.
    #[must_use]
    pub fn into_roster(self) -> Option<TeamRoster> {
        match self {
            Self::Loaded { roster, .. } => Some(roster),
            Self::Missing | Self::Corrupted { .. } => None,
        }
    }
}

/// A held roster lock; `token` is the lock file's content.
#[derive(Debug)]
struct RosterLock {
    token: String,
}

/// Store for the roster document of a team folder.
#[derive(Debug, Clone)]
pub struct RosterStore {
    metadata_dir: String,
    roster_file: String,
    mode: WriteMode,
}

impl RosterStore {
    /// Create a store for `metadata_dir/roster_file`.
    #[must_use]
    pub fn new(metadata_dir: impl Into<String>, roster_file: impl Into<String>, mode: WriteMode) -> Self {
        Self {
            metadata_dir: metadata_dir.into(),
            roster_file: roster_file.into(),
            mode,
        }
    }

    /// Create a store from configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.folders.metadata_dir.clone(),
            config.folders.roster_file.clone(),
            config.write_mode(),
        )
    }

    /// Name of the reserved metadata subfolder.
    #[must_use]
    pub fn metadata_dir(&self) -> &str {
        &self.metadata_dir
    }

    /// Full path of the roster document in `folder`.
    #[must_use]
    pub fn document_path(&self, folder: &dyn FolderHandle) -> PathBuf {
        folder
            .root()
            .join(&self.metadata_dir)
            .join(&self.roster_file)
    }

    fn lock_file(&self) -> String {
        format!("{}.lock", self.roster_file)
    }

    fn stale_after(&self) -> Duration {
        match self.mode {
            WriteMode::Merge(options) => options.stale_after,
            WriteMode::Overwrite => MergeOptions::default().stale_after,
        }
    }

    /// Load the roster document, distinguishing missing from corrupted.
    ///
    /// # Errors
    ///
    /// Fails only on I/O errors.
    pub async fn load(&self, folder: &dyn FolderHandle) -> Result<RosterLoad> {
        let Some(bytes) = folder
            .read_file(&self.metadata_dir, &self.roster_file)
            .await?
        else {
            return Ok(RosterLoad::Missing);
        };

        let hash = blake3::hash(&bytes);
        match serde_json::from_slice::<TeamRoster>(&bytes) {
            Ok(roster) => Ok(RosterLoad::Loaded { roster, hash }),
            Err(e) => {
                warn!(
                    "Roster at {} does not parse: {e}",
                    self.document_path(folder).display()
                );
                Ok(RosterLoad::Corrupted {
                    message: e.to_string(),
                })
            }
        }
    }

    /// Read the roster; `None` if it is missing or does not parse.
    ///
    /// # Errors
    ///
    /// Fails only on I/O errors.
    pub async fn read(&self, folder: &dyn FolderHandle) -> Result<Option<TeamRoster>> {
        Ok(self.load(folder).await?.into_roster())
    }

    /// Write `roster` into `folder`, creating the metadata subfolder if absent.
    ///
    /// Returns the document that was actually persisted, which in merge mode
    /// may contain members written by other clients. In merge mode `Ok` means
    /// every member of the returned document was read back from disk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RosterCorrupted`] in merge mode if the current document
    /// cannot be parsed, [`Error::WriteConflict`] if the lock could not be
    /// taken or the document kept changing, or an I/O error.
    pub async fn write(&self, folder: &dyn FolderHandle, roster: &TeamRoster) -> Result<TeamRoster> {
        folder.create_dir(&self.metadata_dir).await?;

        match self.mode {
            WriteMode::Overwrite => {
                self.sweep_temp_files(folder, self.stale_after()).await;
                let mut document = roster.clone();
                document.revision += 1;
                self.replace(folder, &document).await?;
                info!(
                    "Wrote roster revision {} to {} ({} members)",
                    document.revision,
                    folder.name(),
                    document.member_count()
                );
                Ok(document)
            }
            WriteMode::Merge(options) => {
                let lock = self.acquire_lock(folder, &options).await?;
                let result = self.write_merged(folder, roster, &options).await;
                self.release_lock(folder, &lock).await;
                result
            }
        }
    }

    async fn acquire_lock(
        &self,
        folder: &dyn FolderHandle,
        options: &MergeOptions,
    ) -> Result<RosterLock> {
        let lock_file = self.lock_file();
        let token = Uuid::new_v4().to_string();
        let started = Instant::now();
        let mut delay = LOCK_POLL_MIN;
        let mut attempts = 0;

        loop {
            attempts += 1;
            if folder
                .create_new_file(&self.metadata_dir, &lock_file, token.as_bytes())
                .await?
            {
                trace!("Took roster lock in {} after {attempts} attempts", folder.name());
                return Ok(RosterLock { token });
            }

            let Some(holder) = folder.read_file(&self.metadata_dir, &lock_file).await? else {
                continue;
            };
            if let Some(age) = folder.file_age(&self.metadata_dir, &lock_file).await? {
                if age >= options.stale_after {
                    // Only break the lock we judged stale, not a fresh one that replaced it.
                    if folder.read_file(&self.metadata_dir, &lock_file).await? == Some(holder) {
                        warn!(
                            "Removing stale roster lock in {} ({}s old)",
                            folder.name(),
                            age.as_secs()
                        );
                        folder.remove_file(&self.metadata_dir, &lock_file).await?;
                    }
                    continue;
                }
            }

            if started.elapsed() >= options.lock_timeout {
                warn!(
                    "Timed out after {:?} waiting for the roster lock in {}",
                    options.lock_timeout,
                    folder.name()
                );
                return Err(Error::WriteConflict {
                    folder: folder.name().to_string(),
                    attempts,
                });
            }

            let jitter = Duration::from_millis(u64::from(Uuid::new_v4().as_bytes()[0] % 8));
            tokio::time::sleep(delay + jitter).await;
            delay = (delay * 2).min(LOCK_POLL_MAX);
        }
    }

    async fn release_lock(&self, folder: &dyn FolderHandle, lock: &RosterLock) {
        let lock_file = self.lock_file();
        match folder.read_file(&self.metadata_dir, &lock_file).await {
            Ok(Some(bytes)) if bytes == lock.token.as_bytes() => {
                if let Err(e) = folder.remove_file(&self.metadata_dir, &lock_file).await {
                    warn!("Failed to release roster lock in {}: {e}", folder.name());
                }
            }
            Ok(_) => warn!(
                "Roster lock in {} was taken over before it was released",
                folder.name()
            ),
            Err(e) => warn!("Failed to read roster lock in {}: {e}", folder.name()),
        }
    }

    /// Merge and replace; the caller holds the roster lock.
    async fn write_merged(
        &self,
        folder: &dyn FolderHandle,
        roster: &TeamRoster,
        options: &MergeOptions,
    ) -> Result<TeamRoster> {
        self.sweep_temp_files(folder, options.stale_after).await;

        let max_attempts = options.max_attempts;
        for attempt in 1..=max_attempts {
            let (mut document, expected) = match self.load(folder).await? {
                RosterLoad::Missing => (roster.clone(), None),
                RosterLoad::Loaded { roster: current, hash } => {
                    let mut merged = roster.merge_onto(&current);
                    merged.revision = current.revision;
                    (merged, Some(hash))
                }
                RosterLoad::Corrupted { message } => {
                    return Err(Error::RosterCorrupted {
                        path: self.document_path(folder),
                        message,
                    });
                }
            };
            document.revision += 1;

            let temp = self.stage(folder, &document).await?;

            let current = folder
                .read_file(&self.metadata_dir, &self.roster_file)
                .await?
                .map(|bytes| blake3::hash(&bytes));

            if current == expected {
                self.commit(folder, &temp).await?;
                if self.landed(folder, &document).await? {
                    info!(
                        "Wrote roster revision {} to {} ({} members, attempt {attempt})",
                        document.revision,
                        folder.name(),
                        document.member_count()
                    );
                    return Ok(document);
                }
                warn!(
                    "Roster in {} was replaced right after writing (attempt {attempt}/{max_attempts})",
                    folder.name()
                );
            } else {
                self.discard(folder, &temp).await;
                warn!(
                    "Roster in {} changed during write (attempt {attempt}/{max_attempts})",
                    folder.name()
                );
            }

            if attempt < max_attempts {
                tokio::time::sleep(options.backoff * attempt).await;
            }
        }

        Err(Error::WriteConflict {
            folder: folder.name().to_string(),
            attempts: max_attempts,
        })
    }

    /// Whether every member of `document` is in the roster now on disk.
    async fn landed(&self, folder: &dyn FolderHandle, document: &TeamRoster) -> Result<bool> {
        Ok(match self.load(folder).await? {
            RosterLoad::Loaded { roster, .. } => document
                .users
                .iter()
                .all(|entry| roster.member(entry.id).is_some()),
            RosterLoad::Missing | RosterLoad::Corrupted { .. } => false,
        })
    }

    async fn replace(&self, folder: &dyn FolderHandle, document: &TeamRoster) -> Result<()> {
        let temp = self.stage(folder, document).await?;
        self.commit(folder, &temp).await
    }

    async fn stage(&self, folder: &dyn FolderHandle, document: &TeamRoster) -> Result<String> {
        let json = serde_json::to_vec_pretty(document)?;
        let temp = format!("{}.{}.tmp", self.roster_file, Uuid::new_v4().simple());
        folder
            .write_file(&self.metadata_dir, &temp, &json)
            .await?;
        debug!("Staged roster as {temp}");
        Ok(temp)
    }

    async fn commit(&self, folder: &dyn FolderHandle, temp: &str) -> Result<()> {
        if let Err(e) = folder
            .rename_file(&self.metadata_dir, temp, &self.roster_file)
            .await
        {
            self.discard(folder, temp).await;
            return Err(e);
        }
        Ok(())
    }

    async fn discard(&self, folder: &dyn FolderHandle, temp: &str) {
        if let Err(e) = folder.remove_file(&self.metadata_dir, temp).await {
            warn!("Failed to remove staged roster {temp} in {}: {e}", folder.name());
        }
    }

    /// Remove staging files left behind by writers that died mid-write.
    async fn sweep_temp_files(&self, folder: &dyn FolderHandle, older_than: Duration) {
        let entries = match folder.dir_entries(&self.metadata_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to list {} in {}: {e}", self.metadata_dir, folder.name());
                return;
            }
        };

        let prefix = format!("{}.", self.roster_file);
        for entry in entries {
            if entry.is_dir() || !entry.name.starts_with(&prefix) || !entry.name.ends_with(".tmp") {
                continue;
            }
            match folder.file_age(&self.metadata_dir, &entry.name).await {
                Ok(Some(age)) if age >= older_than => {
                    debug!("Removing abandoned staging file {}", entry.name);
                    self.discard(folder, &entry.name).await;
                }
                Ok(_) => {}
                Err(e) => warn!("Failed to inspect {} in {}: {e}", entry.name, folder.name()),
            }
        }
    }

    /// Move an unparseable roster aside as `<file>.corrupted.<timestamp>`.
    ///
    /// Returns the backup file name, or `None` if there was no document or it
    /// parses fine. Abandoned staging files are swept either way.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors.
    pub async fn backup_corrupted(&self, folder: &dyn FolderHandle) -> Result<Option<String>> {
        self.sweep_temp_files(folder, self.stale_after()).await;

        if !matches!(self.load(folder).await?, RosterLoad::Corrupted { .. }) {
            return Ok(None);
        }

        let backup = format!(
            "{}.corrupted.{}",
            self.roster_file,
            Utc::now().format(BACKUP_DATE_FORMAT)
        );
        folder
            .rename_file(&self.metadata_dir, &self.roster_file, &backup)
            .await?;
        warn!("Moved corrupted roster in {} to {backup}", folder.name());
        Ok(Some(backup))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::folder::LocalFolder;
    use crate::identity::{NewIdentity, Role, UserIdentity};

    const MERGE: WriteMode = WriteMode::Merge(MergeOptions {
        max_attempts: 3,
        backoff: Duration::from_millis(1),
        lock_timeout: Duration::from_secs(10),
        stale_after: Duration::from_secs(30),
    });

    fn identity(name: &str) -> UserIdentity {
        UserIdentity::new(NewIdentity::named(name)).unwrap()
    }

    async fn folder() -> (tempfile::TempDir, LocalFolder) {
        let dir = tempfile::tempdir().unwrap();
        let folder = LocalFolder::open(dir.path()).await.unwrap();
        (dir, folder)
    }

    #[tokio::test]
    async fn test_read_missing() {
        let (_dir, folder) = folder().await;
        let store = RosterStore::new(".teamfolder", "roster.json", MERGE);
        assert_eq!(store.load(&folder).await.unwrap(), RosterLoad::Missing);
        assert!(store.read(&folder).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_then_read_round_trip() {
        let (dir, folder) = folder().await;
        let store = RosterStore::new(".teamfolder", "roster.json", MERGE);
        let ada = identity("Ada");
        let mut roster = TeamRoster::bootstrap(&ada, "1.0");
        roster.add_member(&identity("Bob"), Role::Recruiter);

        let written = store.write(&folder, &roster).await.unwrap();
        assert_eq!(written.revision, 1);
        assert!(dir.path().join(".teamfolder/roster.json").exists());

        let read = store.read(&folder).await.unwrap().unwrap();
        assert_eq!(read.creator.id, ada.id);
        assert_eq!(read.users, roster.users);
    }

    #[tokio::test]
    async fn test_write_leaves_no_temp_files() {
        let (dir, folder) = folder().await;
        let store = RosterStore::new(".teamfolder", "roster.json", MERGE);
        let roster = TeamRoster::bootstrap(&identity("Ada"), "1.0");
        store.write(&folder, &roster).await.unwrap();
        store.write(&folder, &roster).await.unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path().join(".teamfolder"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["roster.json".to_string()]);
    }

    #[tokio::test]
    async fn test_revision_increments() {
        let (_dir, folder) = folder().await;
        let store = RosterStore::new(".teamfolder", "roster.json", MERGE);
        let roster = TeamRoster::bootstrap(&identity("Ada"), "1.0");

        store.write(&folder, &roster).await.unwrap();
        let current = store.read(&folder).await.unwrap().unwrap();
        let second = store.write(&folder, &current).await.unwrap();
        assert_eq!(second.revision, 2);
    }

    #[tokio::test]
    async fn test_corrupted_document_detected() {
        let (dir, folder) = folder().await;
        std::fs::create_dir(dir.path().join(".teamfolder")).unwrap();
        std::fs::write(dir.path().join(".teamfolder/roster.json"), "{ broken").unwrap();
        let store = RosterStore::new(".teamfolder", "roster.json", MERGE);

        assert!(matches!(
            store.load(&folder).await.unwrap(),
            RosterLoad::Corrupted { .. }
        ));
        assert!(store.read(&folder).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_merge_write_refuses_to_clobber_corrupted() {
        let (dir, folder) = folder().await;
        std::fs::create_dir(dir.path().join(".teamfolder")).unwrap();
        std::fs::write(dir.path().join(".teamfolder/roster.json"), "{ broken").unwrap();
        let store = RosterStore::new(".teamfolder", "roster.json", MERGE);

        let roster = TeamRoster::bootstrap(&identity("Ada"), "1.0");
        let err = store.write(&folder, &roster).await.unwrap_err();
        assert!(err.is_corruption());
        assert_eq!(
            std::fs::read_to_string(dir.path().join(".teamfolder/roster.json")).unwrap(),
            "{ broken"
        );
    }

    #[tokio::test]
    async fn test_backup_corrupted() {
        let (dir, folder) = folder().await;
        std::fs::create_dir(dir.path().join(".teamfolder")).unwrap();
        std::fs::write(dir.path().join(".teamfolder/roster.json"), "{ broken").unwrap();
        let store = RosterStore::new(".teamfolder", "roster.json", MERGE);

        let backup = store.backup_corrupted(&folder).await.unwrap().unwrap();
        assert!(backup.starts_with("roster.json.corrupted."));
        assert_eq!(store.load(&folder).await.unwrap(), RosterLoad::Missing);
        assert!(store.backup_corrupted(&folder).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_backup_ignores_valid_roster() {
        let (_dir, folder) = folder().await;
        let store = RosterStore::new(".teamfolder", "roster.json", MERGE);
        store
            .write(&folder, &TeamRoster::bootstrap(&identity("Ada"), "1.0"))
            .await
            .unwrap();
        assert!(store.backup_corrupted(&folder).await.unwrap().is_none());
    }

    async fn interleaved_joins(mode: WriteMode) -> (TeamRoster, [Uuid; 3]) {
        let (_dir, folder) = folder().await;
        let store = RosterStore::new(".teamfolder", "roster.json", mode);
        let ada = identity("Ada");
        let bob = identity("Bob");
        let cat = identity("Cat");
        store
            .write(&folder, &TeamRoster::bootstrap(&ada, "1.0"))
            .await
            .unwrap();

        let mut seen_by_bob = store.read(&folder).await.unwrap().unwrap();
        let mut seen_by_cat = store.read(&folder).await.unwrap().unwrap();
        seen_by_bob.add_member(&bob, Role::Recruiter);
        store.write(&folder, &seen_by_bob).await.unwrap();
        seen_by_cat.add_member(&cat, Role::Recruiter);
        store.write(&folder, &seen_by_cat).await.unwrap();

        let final_roster = store.read(&folder).await.unwrap().unwrap();
        (final_roster, [ada.id, bob.id, cat.id])
    }

    #[tokio::test]
    async fn test_overwrite_mode_loses_first_join() {
        let (roster, [ada, bob, cat]) = interleaved_joins(WriteMode::Overwrite).await;
        assert!(roster.member(ada).is_some());
        assert!(roster.member(bob).is_none());
        assert!(roster.member(cat).is_some());
        assert_eq!(roster.member_count(), 2);
    }

    #[tokio::test]
    async fn test_merge_mode_keeps_both_joins() {
        let (roster, [ada, bob, cat]) = interleaved_joins(MERGE).await;
        assert!(roster.member(ada).is_some());
        assert!(roster.member(bob).is_some());
        assert!(roster.member(cat).is_some());
        assert_eq!(roster.member_count(), 3);
        assert!(roster.check_invariants().is_ok());
    }

    fn merge_with(lock_timeout: Duration, stale_after: Duration) -> WriteMode {
        WriteMode::Merge(MergeOptions {
            max_attempts: 3,
            backoff: Duration::from_millis(1),
            lock_timeout,
            stale_after,
        })
    }

    fn metadata_names(dir: &tempfile::TempDir) -> Vec<String> {
        let mut names: Vec<_> = std::fs::read_dir(dir.path().join(".teamfolder"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_merge_write_waits_out_a_held_lock() {
        let (dir, folder) = folder().await;
        let store = RosterStore::new(".teamfolder", "roster.json", MERGE);
        store
            .write(&folder, &TeamRoster::bootstrap(&identity("Ada"), "1.0"))
            .await
            .unwrap();
        std::fs::write(dir.path().join(".teamfolder/roster.json.lock"), "other").unwrap();

        let lock = dir.path().join(".teamfolder/roster.json.lock");
        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            std::fs::remove_file(lock).unwrap();
        });

        let mut roster = store.read(&folder).await.unwrap().unwrap();
        roster.add_member(&identity("Bob"), Role::Recruiter);
        let written = store.write(&folder, &roster).await.unwrap();
        release.await.unwrap();

        assert_eq!(written.member_count(), 2);
        assert_eq!(metadata_names(&dir), ["roster.json"]);
    }

    #[tokio::test]
    async fn test_merge_write_times_out_on_fresh_lock() {
        let (dir, folder) = folder().await;
        let store = RosterStore::new(
            ".teamfolder",
            "roster.json",
            merge_with(Duration::from_millis(40), Duration::from_secs(3600)),
        );
        std::fs::create_dir(dir.path().join(".teamfolder")).unwrap();
        std::fs::write(dir.path().join(".teamfolder/roster.json.lock"), "other").unwrap();

        let err = store
            .write(&folder, &TeamRoster::bootstrap(&identity("Ada"), "1.0"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::WriteConflict { .. }));
        assert_eq!(store.load(&folder).await.unwrap(), RosterLoad::Missing);
        assert_eq!(
            std::fs::read_to_string(dir.path().join(".teamfolder/roster.json.lock")).unwrap(),
            "other"
        );
    }

    #[tokio::test]
    async fn test_merge_write_breaks_stale_lock() {
        let (dir, folder) = folder().await;
        let store = RosterStore::new(
            ".teamfolder",
            "roster.json",
            merge_with(Duration::from_secs(10), Duration::ZERO),
        );
        std::fs::create_dir(dir.path().join(".teamfolder")).unwrap();
        std::fs::write(dir.path().join(".teamfolder/roster.json.lock"), "crashed").unwrap();

        store
            .write(&folder, &TeamRoster::bootstrap(&identity("Ada"), "1.0"))
            .await
            .unwrap();
        assert_eq!(metadata_names(&dir), ["roster.json"]);
    }

    #[tokio::test]
    async fn test_write_sweeps_abandoned_staging_files() {
        let (dir, folder) = folder().await;
        let store = RosterStore::new(
            ".teamfolder",
            "roster.json",
            merge_with(Duration::from_secs(10), Duration::ZERO),
        );
        std::fs::create_dir(dir.path().join(".teamfolder")).unwrap();
        std::fs::write(dir.path().join(".teamfolder/roster.json.0badc0de.tmp"), "{").unwrap();
        std::fs::write(dir.path().join(".teamfolder/notes.tmp"), "keep").unwrap();

        store
            .write(&folder, &TeamRoster::bootstrap(&identity("Ada"), "1.0"))
            .await
            .unwrap();
        assert_eq!(metadata_names(&dir), ["notes.tmp", "roster.json"]);
    }

    #[tokio::test]
    async fn test_backup_corrupted_sweeps_abandoned_staging_files() {
        let (dir, folder) = folder().await;
        let store = RosterStore::new(
            ".teamfolder",
            "roster.json",
            merge_with(Duration::from_secs(10), Duration::ZERO),
        );
        std::fs::create_dir(dir.path().join(".teamfolder")).unwrap();
        std::fs::write(dir.path().join(".teamfolder/roster.json"), "{ broken").unwrap();
        std::fs::write(dir.path().join(".teamfolder/roster.json.0badc0de.tmp"), "{").unwrap();

        let backup = store.backup_corrupted(&folder).await.unwrap().unwrap();
        assert_eq!(metadata_names(&dir), [backup]);
    }

    #[tokio::test]
    async fn test_fresh_staging_files_survive_sweep() {
        let (dir, folder) = folder().await;
        let store = RosterStore::new(".teamfolder", "roster.json", MERGE);
        std::fs::create_dir(dir.path().join(".teamfolder")).unwrap();
        std::fs::write(dir.path().join(".teamfolder/roster.json.feedface.tmp"), "{").unwrap();

        store
            .write(&folder, &TeamRoster::bootstrap(&identity("Ada"), "1.0"))
            .await
            .unwrap();
        assert_eq!(
            metadata_names(&dir),
            ["roster.json", "roster.json.feedface.tmp"]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_bootstraps_keep_one_creator() {
        let (_dir, folder) = folder().await;
        let store = RosterStore::new(".teamfolder", "roster.json", MERGE);
        let ada = identity("Ada");
        let bob = identity("Bob");

        let roster_a = TeamRoster::bootstrap(&ada, "1.0");
        let roster_b = TeamRoster::bootstrap(&bob, "1.0");
        let (a, b) = tokio::join!(
            store.write(&folder, &roster_a),
            store.write(&folder, &roster_b),
        );
        a.unwrap();
        b.unwrap();

        let roster = store.read(&folder).await.unwrap().unwrap();
        assert_eq!(roster.member_count(), 2);
        assert_eq!(roster.revision, 2);
        assert!(roster.check_invariants().is_ok());
        assert_eq!(roster.users.iter().filter(|u| u.is_creator).count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_merge_writers_never_lose_a_member() {
        const WRITERS: usize = 12;

        for round in 0..5 {
            let (_dir, folder) = folder().await;
            let store = RosterStore::new(".teamfolder", "roster.json", MERGE);
            let base = store
                .write(&folder, &TeamRoster::bootstrap(&identity("Ada"), "1.0"))
                .await
                .unwrap();

            let barrier = std::sync::Arc::new(tokio::sync::Barrier::new(WRITERS));
            let mut handles = Vec::new();
            for i in 0..WRITERS {
                let (folder, store, barrier) = (folder.clone(), store.clone(), barrier.clone());
                let mut roster = base.clone();
                let member = identity(&format!("Member {i}"));
                roster.add_member(&member, Role::Recruiter);
                handles.push(tokio::spawn(async move {
                    barrier.wait().await;
                    (member.id, store.write(&folder, &roster).await)
                }));
            }

            let mut written = Vec::new();
            for handle in handles {
                let (id, result) = handle.await.unwrap();
                match result {
                    Ok(document) => {
                        assert!(document.member(id).is_some());
                        written.push(id);
                    }
                    Err(e) => panic!("round {round}: writer failed: {e}"),
                }
            }

            let roster = store.read(&folder).await.unwrap().unwrap();
            for id in &written {
                assert!(roster.member(*id).is_some(), "round {round}: member {id} was lost");
            }
            assert_eq!(roster.member_count(), WRITERS + 1);
            assert_eq!(roster.revision, base.revision + WRITERS as u64);
            assert!(roster.check_invariants().is_ok());
        }
    }
}
