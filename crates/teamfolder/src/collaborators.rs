//! Interfaces the coordinator consumes from the surrounding application.
//!
//! The coordinator never renders anything. It reports progress through a
//! [`Notifier`], asks the user through [`Prompts`], and hands the folder to a
//! [`DataSync`] hook once a join or conversion succeeded.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::analyzer::FolderClassification;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::folder::FolderHandle;
use crate::identity::NewIdentity;

/// Severity of a user notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotifyLevel {
    /// Neutral information.
    Info,
    /// An operation completed.
    Success,
    /// Something needs attention but nothing failed.
    Warning,
    /// An operation failed.
    Error,
}

/// Answer to a yes/no prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Go ahead.
    Confirm,
    /// Explicitly refused.
    Decline,
    /// The prompt was dismissed.
    Cancel,
}

/// Answer to the "folder has unrecognized content" prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmbiguousChoice {
    /// Bootstrap a new team in the folder anyway.
    UseAsNewTeam,
    /// Leave the folder alone.
    Abort,
}

/// Notification sink.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Show `message` to the user.
    async fn notify(&self, message: &str, level: NotifyLevel);
}

/// Interactive prompts. Every method is a suspension point and may be cancelled.
#[async_trait]
pub trait Prompts: Send + Sync {
    /// Collect identity details; `None` if cancelled.
    async fn ask_identity(&self) -> Option<NewIdentity>;

    /// Ask whether to join the team described by `classification`.
    async fn confirm_join(&self, classification: &FolderClassification) -> Decision;

    /// Ask what to do with a non-empty folder that holds nothing recognized.
    async fn resolve_ambiguous_folder(
        &self,
        classification: &FolderClassification,
    ) -> AmbiguousChoice;
}

/// Outcome of a data-sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Records copied into the team folder.
    pub copied: usize,
    /// Records already present with identical content.
    pub unchanged: usize,
    /// Records present with different content; left untouched.
    pub conflicts: usize,
}

/// One-way hook that pushes locally held records into a team folder.
#[async_trait]
pub trait DataSync: Send + Sync {
    /// Push local records into `folder`.
    ///
    /// # Errors
    ///
    /// Fails if records cannot be read or written.
    async fn push_local_records_to_folder(&self, folder: &dyn FolderHandle) -> Result<SyncReport>;
}

/// Notifier that forwards to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, message: &str, level: NotifyLevel) {
        match level {
            NotifyLevel::Info | NotifyLevel::Success => info!("{message}"),
            NotifyLevel::Warning => warn!("{message}"),
            NotifyLevel::Error => error!("{message}"),
        }
    }
}

/// Sync hook that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSync;

#[async_trait]
impl DataSync for NoSync {
    async fn push_local_records_to_folder(&self, folder: &dyn FolderHandle) -> Result<SyncReport> {
        debug!("Data sync disabled; nothing pushed to {}", folder.name());
        Ok(SyncReport::default())
    }
}

/// Copies files from a local records directory into the matching domain
/// subfolders of the team folder.
///
/// Create-only: files already present are never overwritten and nothing is
/// deleted.
#[derive(Debug, Clone)]
pub struct LocalRecordsSync {
    source: PathBuf,
    domain_subfolders: Vec<String>,
}

impl LocalRecordsSync {
    /// Sync from `source`, looking only at `domain_subfolders`.
    #[must_use]
    pub fn new(source: impl Into<PathBuf>, domain_subfolders: Vec<String>) -> Self {
        Self {
            source: source.into(),
            domain_subfolders,
        }
    }

    /// Build the sync hook the configuration asks for.
    #[must_use]
    pub fn from_config(config: &Config) -> Box<dyn DataSync> {
        match (&config.sync.local_records_dir, config.sync.enabled) {
            (Some(dir), true) => Box::new(Self::new(dir, config.folders.domain_subfolders.clone())),
            _ => Box::new(NoSync),
        }
    }

    async fn local_files(dir: &Path) -> Result<Vec<String>> {
        let mut reader = match tokio::fs::read_dir(dir).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::folder_io(dir, e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| Error::folder_io(dir, e))?
        {
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .map_err(|e| Error::folder_io(entry.path(), e))?;
            if is_file {
                files.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl DataSync for LocalRecordsSync {
    async fn push_local_records_to_folder(&self, folder: &dyn FolderHandle) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        for domain in &self.domain_subfolders {
            let source_dir = self.source.join(domain);
            let files = Self::local_files(&source_dir).await?;
            if files.is_empty() {
                continue;
            }
            folder.create_dir(domain).await?;

            for file in files {
                let path = source_dir.join(&file);
                let local = tokio::fs::read(&path)
                    .await
                    .map_err(|e| Error::folder_io(&path, e))?;

                match folder.read_file(domain, &file).await? {
                    Some(remote) if blake3::hash(&remote) == blake3::hash(&local) => {
                        report.unchanged += 1;
                    }
                    Some(_) => {
                        warn!("{domain}/{file} differs in {}; not overwritten", folder.name());
                        report.conflicts += 1;
                    }
                    None => {
                        folder.write_file(domain, &file, &local).await?;
                        report.copied += 1;
                    }
                }
            }
        }

        info!(
            "Synced local records to {}: {} copied, {} unchanged, {} conflicts",
            folder.name(),
            report.copied,
            report.unchanged,
            report.conflicts
        );
        Ok(report)
    }
}

/// Scripted collaborators for unit tests.
#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Default)]
    pub(crate) struct RecordingNotifier {
        pub(crate) messages: Mutex<Vec<(String, NotifyLevel)>>,
    }

    impl RecordingNotifier {
        pub(crate) fn count(&self, level: NotifyLevel) -> usize {
            self.messages
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, l)| *l == level)
                .count()
        }

        pub(crate) fn contains(&self, needle: &str) -> bool {
            self.messages
                .lock()
                .unwrap()
                .iter()
                .any(|(m, _)| m.contains(needle))
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, message: &str, level: NotifyLevel) {
            self.messages
                .lock()
                .unwrap()
                .push((message.to_string(), level));
        }
    }

    /// Answers prompts from queues; an empty queue means the user cancelled.
    #[derive(Debug, Default)]
    pub(crate) struct ScriptedPrompts {
        identities: Mutex<VecDeque<NewIdentity>>,
        decisions: Mutex<VecDeque<Decision>>,
        choices: Mutex<VecDeque<AmbiguousChoice>>,
        pub(crate) join_prompts: AtomicUsize,
        pub(crate) ambiguous_prompts: AtomicUsize,
    }

    impl ScriptedPrompts {
        pub(crate) fn with_identity(self, details: NewIdentity) -> Self {
            self.identities.lock().unwrap().push_back(details);
            self
        }

        pub(crate) fn with_decision(self, decision: Decision) -> Self {
            self.decisions.lock().unwrap().push_back(decision);
            self
        }

        pub(crate) fn with_choice(self, choice: AmbiguousChoice) -> Self {
            self.choices.lock().unwrap().push_back(choice);
            self
        }
    }

    #[async_trait]
    impl Prompts for ScriptedPrompts {
        async fn ask_identity(&self) -> Option<NewIdentity> {
            self.identities.lock().unwrap().pop_front()
        }

        async fn confirm_join(&self, _classification: &FolderClassification) -> Decision {
            self.join_prompts.fetch_add(1, Ordering::SeqCst);
            self.decisions
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Decision::Cancel)
        }

        async fn resolve_ambiguous_folder(
            &self,
            _classification: &FolderClassification,
        ) -> AmbiguousChoice {
            self.ambiguous_prompts.fetch_add(1, Ordering::SeqCst);
            self.choices
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(AmbiguousChoice::Abort)
        }
    }

    #[derive(Debug, Default)]
    pub(crate) struct CountingSync {
        pub(crate) calls: AtomicUsize,
    }

    #[async_trait]
    impl DataSync for CountingSync {
        async fn push_local_records_to_folder(
            &self,
            _folder: &dyn FolderHandle,
        ) -> Result<SyncReport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(SyncReport::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::folder::LocalFolder;

    #[tokio::test]
    async fn test_no_sync_reports_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let folder = LocalFolder::open(dir.path()).await.unwrap();
        let report = NoSync.push_local_records_to_folder(&folder).await.unwrap();
        assert_eq!(report, SyncReport::default());
    }

    #[tokio::test]
    async fn test_local_records_sync_is_create_only() {
        let local = tempfile::tempdir().unwrap();
        std::fs::create_dir(local.path().join("records")).unwrap();
        std::fs::write(local.path().join("records/a.json"), "{\"a\":1}").unwrap();
        std::fs::write(local.path().join("records/b.json"), "{\"b\":1}").unwrap();
        std::fs::write(local.path().join("records/c.json"), "{\"c\":1}").unwrap();
        std::fs::create_dir(local.path().join("unrelated")).unwrap();
        std::fs::write(local.path().join("unrelated/x.json"), "{}").unwrap();

        let team = tempfile::tempdir().unwrap();
        std::fs::create_dir(team.path().join("records")).unwrap();
        std::fs::write(team.path().join("records/b.json"), "{\"b\":1}").unwrap();
        std::fs::write(team.path().join("records/c.json"), "{\"c\":2}").unwrap();
        let folder = LocalFolder::open(team.path()).await.unwrap();

        let sync = LocalRecordsSync::new(local.path(), vec!["records".to_string(), "tasks".to_string()]);
        let report = sync.push_local_records_to_folder(&folder).await.unwrap();

        assert_eq!(
            report,
            SyncReport {
                copied: 1,
                unchanged: 1,
                conflicts: 1
            }
        );
        assert_eq!(
            std::fs::read_to_string(team.path().join("records/c.json")).unwrap(),
            "{\"c\":2}"
        );
        assert!(team.path().join("records/a.json").exists());
        assert!(!team.path().join("unrelated").exists());
        assert!(!team.path().join("tasks").exists());
    }
}
