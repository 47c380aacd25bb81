//! Folder classification.
//!
//! Before anything is written, a selected folder is inspected and put into
//! one of a few categories. Classification only reads.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::folder::FolderHandle;
use crate::roster::{MembershipEntry, RosterLoad, RosterStore, TeamRoster, UserSnapshot};

/// Category of a selected folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FolderKind {
    /// No entries at all.
    New,
    /// Holds a readable roster.
    ExistingTeam,
    /// Holds record folders but no roster.
    DataOnly,
    /// Holds something, but nothing recognized.
    UnknownNonempty,
    /// Holds a roster document that does not parse.
    CorruptTeam,
}

impl std::fmt::Display for FolderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::ExistingTeam => write!(f, "existing-team"),
            Self::DataOnly => write!(f, "data-only"),
            Self::UnknownNonempty => write!(f, "unknown-nonempty"),
            Self::CorruptTeam => write!(f, "corrupt-team"),
        }
    }
}

/// What a folder contains, computed fresh on every selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderClassification {
    /// Display name of the folder.
    pub folder_name: String,
    /// The folder has no entries.
    pub is_empty: bool,
    /// A roster was found and parsed.
    pub has_roster_data: bool,
    /// At least one domain subfolder exists.
    pub has_domain_data: bool,
    /// Members listed in the roster.
    pub members: Vec<MembershipEntry>,
    /// Roster creator.
    pub creator: Option<UserSnapshot>,
    /// Roster `lastActivity`.
    pub last_activity: Option<DateTime<Utc>>,
    /// Domain subfolders present.
    pub domain_types: Vec<String>,
    /// Parser message for an unreadable roster.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roster_error: Option<String>,
    /// Derived category.
    pub result_type: FolderKind,
    /// The parsed roster, kept for the coordinator.
    #[serde(skip)]
    pub roster: Option<TeamRoster>,
}

impl FolderClassification {
    /// Whether the roster lists `id`.
    #[must_use]
    pub fn has_member(&self, id: uuid::Uuid) -> bool {
        self.members.iter().any(|m| m.id == id)
    }
}

/// Inspects folders and classifies them.
#[derive(Debug, Clone)]
pub struct FolderAnalyzer {
    store: RosterStore,
    domain_subfolders: Vec<String>,
    lenient_parse: bool,
}

impl FolderAnalyzer {
    /// Create an analyzer.
    #[must_use]
    pub fn new(store: RosterStore, domain_subfolders: Vec<String>, lenient_parse: bool) -> Self {
        Self {
            store,
            domain_subfolders,
            lenient_parse,
        }
    }

    /// Create an analyzer from configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            RosterStore::from_config(config),
            config.folders.domain_subfolders.clone(),
            config.roster.lenient_parse,
        )
    }

    /// Classify `folder`.
    ///
    /// # Errors
    ///
    /// Fails if the folder (or its roster document) cannot be read; no
    /// classification is guessed in that case.
    pub async fn classify(&self, folder: &dyn FolderHandle) -> Result<FolderClassification> {
        let entries = folder.entries().await?;
        let is_empty = entries.is_empty();

        let has_metadata_dir = entries
            .iter()
            .any(|e| e.is_dir() && e.name == self.store.metadata_dir());

        let mut roster = None;
        let mut roster_error = None;
        if has_metadata_dir {
            match self.store.load(folder).await? {
                RosterLoad::Loaded { roster: found, .. } => roster = Some(found),
                RosterLoad::Missing => {
                    debug!("{} has a metadata folder but no roster", folder.name());
                }
                RosterLoad::Corrupted { message } if self.lenient_parse => {
                    warn!(
                        "Ignoring unreadable roster in {}: {message}",
                        folder.name()
                    );
                }
                RosterLoad::Corrupted { message } => roster_error = Some(message),
            }
        }

        let domain_types: Vec<String> = entries
            .iter()
            .filter(|e| e.is_dir() && self.domain_subfolders.contains(&e.name))
            .map(|e| e.name.clone())
            .collect();

        let has_roster_data = roster.is_some();
        let has_domain_data = !domain_types.is_empty();

        let result_type = if is_empty {
            FolderKind::New
        } else if has_roster_data {
            FolderKind::ExistingTeam
        } else if roster_error.is_some() {
            FolderKind::CorruptTeam
        } else if has_domain_data {
            FolderKind::DataOnly
        } else {
            FolderKind::UnknownNonempty
        };

        info!(
            "Classified {} as {result_type} ({} entries)",
            folder.name(),
            entries.len()
        );

        Ok(FolderClassification {
            folder_name: folder.name().to_string(),
            is_empty,
            has_roster_data,
            has_domain_data,
            members: roster.as_ref().map(|r| r.users.clone()).unwrap_or_default(),
            creator: roster.as_ref().map(|r| r.creator.clone()),
            last_activity: roster.as_ref().map(|r| r.last_activity),
            domain_types,
            roster_error,
            result_type,
            roster,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::folder::LocalFolder;
    use crate::identity::{NewIdentity, UserIdentity};
    use crate::roster::WriteMode;

    fn analyzer(lenient: bool) -> FolderAnalyzer {
        let mut config = Config::default();
        config.roster.lenient_parse = lenient;
        FolderAnalyzer::from_config(&config)
    }

    async fn open(dir: &tempfile::TempDir) -> LocalFolder {
        LocalFolder::open(dir.path()).await.unwrap()
    }

    #[tokio::test]
    async fn test_empty_folder_is_new() {
        let dir = tempfile::tempdir().unwrap();
        let c = analyzer(false).classify(&open(&dir).await).await.unwrap();

        assert!(c.is_empty);
        assert_eq!(c.result_type, FolderKind::New);
        assert!(c.members.is_empty());
        assert!(c.creator.is_none());
    }

    #[tokio::test]
    async fn test_metadata_with_roster_is_existing_team() {
        let dir = tempfile::tempdir().unwrap();
        let folder = open(&dir).await;
        let ada = UserIdentity::new(NewIdentity::named("Ada")).unwrap();
        RosterStore::new(".teamfolder", "roster.json", WriteMode::Overwrite)
            .write(&folder, &TeamRoster::bootstrap(&ada, "1.0"))
            .await
            .unwrap();

        let c = analyzer(false).classify(&folder).await.unwrap();
        assert_eq!(c.result_type, FolderKind::ExistingTeam);
        assert!(c.has_roster_data);
        assert!(!c.has_domain_data);
        assert_eq!(c.members.len(), 1);
        assert!(c.has_member(ada.id));
        assert_eq!(c.creator.unwrap().id, ada.id);
        assert!(c.last_activity.is_some());
        assert!(c.roster.is_some());
    }

    #[tokio::test]
    async fn test_domain_folders_only_is_data_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("records")).unwrap();
        std::fs::create_dir(dir.path().join("tasks")).unwrap();

        let c = analyzer(false).classify(&open(&dir).await).await.unwrap();
        assert_eq!(c.result_type, FolderKind::DataOnly);
        assert!(c.has_domain_data);
        assert_eq!(c.domain_types, vec!["records".to_string(), "tasks".to_string()]);
    }

    #[tokio::test]
    async fn test_unrelated_file_is_unknown_nonempty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("readme.txt"), "hello").unwrap();

        let c = analyzer(false).classify(&open(&dir).await).await.unwrap();
        assert_eq!(c.result_type, FolderKind::UnknownNonempty);
        assert!(!c.is_empty);
    }

    #[tokio::test]
    async fn test_domain_named_file_is_not_domain_data() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("records"), "not a folder").unwrap();

        let c = analyzer(false).classify(&open(&dir).await).await.unwrap();
        assert_eq!(c.result_type, FolderKind::UnknownNonempty);
    }

    #[tokio::test]
    async fn test_metadata_without_roster_and_domain_is_data_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".teamfolder")).unwrap();
        std::fs::create_dir(dir.path().join("projects")).unwrap();

        let c = analyzer(false).classify(&open(&dir).await).await.unwrap();
        assert_eq!(c.result_type, FolderKind::DataOnly);
        assert!(!c.has_roster_data);
    }

    #[tokio::test]
    async fn test_corrupted_roster_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".teamfolder")).unwrap();
        std::fs::write(dir.path().join(".teamfolder/roster.json"), "[1, 2").unwrap();
        std::fs::create_dir(dir.path().join("records")).unwrap();

        let c = analyzer(false).classify(&open(&dir).await).await.unwrap();
        assert_eq!(c.result_type, FolderKind::CorruptTeam);
        assert!(c.roster_error.is_some());
    }

    #[tokio::test]
    async fn test_lenient_parse_treats_corrupted_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".teamfolder")).unwrap();
        std::fs::write(dir.path().join(".teamfolder/roster.json"), "[1, 2").unwrap();
        std::fs::create_dir(dir.path().join("records")).unwrap();

        let c = analyzer(true).classify(&open(&dir).await).await.unwrap();
        assert_eq!(c.result_type, FolderKind::DataOnly);
        assert!(c.roster_error.is_none());
    }

    #[tokio::test]
    async fn test_unreadable_folder_is_hard_failure() {
        let dir = tempfile::tempdir().unwrap();
        let team = dir.path().join("team");
        std::fs::create_dir(&team).unwrap();
        let folder = LocalFolder::open(&team).await.unwrap();
        std::fs::remove_dir(&team).unwrap();

        assert!(analyzer(false).classify(&folder).await.is_err());
    }

    #[test]
    fn test_kind_display_matches_serde() {
        for kind in [
            FolderKind::New,
            FolderKind::ExistingTeam,
            FolderKind::DataOnly,
            FolderKind::UnknownNonempty,
            FolderKind::CorruptTeam,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{kind}\""));
        }
    }
}
