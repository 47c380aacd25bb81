//! Durable, device-local user identity.
//!
//! The identity is created once per device profile and is the join key used
//! inside every team roster. It never talks to a team folder; the coordinator
//! reads it, hands it to the roster logic, and records folder access back here.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::collaborators::{Notifier, NotifyLevel, Prompts};
use crate::error::{Error, Result};

const BACKUP_DATE_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Role a user holds, either locally or within a team roster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full control of the team folder.
    Admin,
    /// Manages pipelines and members.
    Manager,
    /// Regular team member.
    #[default]
    Recruiter,
    /// Read-only access.
    Viewer,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::Manager => write!(f, "manager"),
            Self::Recruiter => write!(f, "recruiter"),
            Self::Viewer => write!(f, "viewer"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "manager" => Ok(Self::Manager),
            "recruiter" => Ok(Self::Recruiter),
            "viewer" => Ok(Self::Viewer),
            other => Err(Error::invalid_identity(format!("unknown role '{other}'"))),
        }
    }
}

/// One team folder this identity has touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderAccessRecord {
    /// Display name of the team folder.
    pub folder_name: String,
    /// Role granted within that folder's roster.
    pub role: Role,
    /// When this identity first joined the folder.
    pub joined_at: DateTime<Utc>,
    /// Whether this identity bootstrapped the folder.
    pub is_creator: bool,
}

/// The local user identity document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    /// Globally unique id; never changes after creation.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Contact email.
    #[serde(default)]
    pub email: String,
    /// Local role preference.
    #[serde(default)]
    pub role: Role,
    /// Company or agency name.
    #[serde(default)]
    pub company: String,
    /// When the identity was created.
    pub created: DateTime<Utc>,
    /// Last time the identity was used.
    pub last_active: DateTime<Utc>,
    /// Append-only history of folders this identity has joined.
    #[serde(default)]
    pub folder_access: Vec<FolderAccessRecord>,
}

/// Details collected from the user when creating an identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewIdentity {
    /// Required display name.
    pub name: String,
    /// Optional email.
    pub email: Option<String>,
    /// Optional role; defaults to recruiter.
    pub role: Option<Role>,
    /// Optional company.
    pub company: Option<String>,
}

impl NewIdentity {
    /// Details with only a name set.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl UserIdentity {
    /// Build a fresh identity from user-supplied details.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentity`] if the name is empty or whitespace.
    pub fn new(details: NewIdentity) -> Result<Self> {
        let name = details.name.trim();
        if name.is_empty() {
            return Err(Error::invalid_identity("name must not be empty"));
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: details.email.unwrap_or_default().trim().to_string(),
            role: details.role.unwrap_or_default(),
            company: details.company.unwrap_or_default().trim().to_string(),
            created: now,
            last_active: now,
            folder_access: Vec::new(),
        })
    }

    /// The access record for a folder, if this identity has joined it.
    #[must_use]
    pub fn access_for(&self, folder_name: &str) -> Option<&FolderAccessRecord> {
        self.folder_access
            .iter()
            .find(|record| record.folder_name == folder_name)
    }

    /// Append a folder access record unless one exists for that folder.
    ///
    /// Returns `true` if a record was added.
    pub fn record_folder_access(&mut self, record: FolderAccessRecord) -> bool {
        if self.access_for(&record.folder_name).is_some() {
            return false;
        }
        self.folder_access.push(record);
        true
    }
}

/// File-backed store for the local identity document.
#[derive(Debug, Clone)]
pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    /// Create a store for the identity document at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the identity document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the identity, or `None` on first launch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IdentityCorrupted`] if the file exists but does not
    /// parse, or [`Error::IdentityRead`] if it cannot be read.
    pub fn load(&self) -> Result<Option<UserIdentity>> {
        if !self.path.exists() {
            info!("No identity file at {} (first launch)", self.path.display());
            return Ok(None);
        }

        let contents = fs::read_to_string(&self.path).map_err(|source| Error::IdentityRead {
            path: self.path.clone(),
            source,
        })?;

        match serde_json::from_str::<UserIdentity>(&contents) {
            Ok(identity) => {
                debug!("Loaded identity {}", identity.id);
                Ok(Some(identity))
            }
            Err(e) => {
                warn!("Identity file corrupted at {}: {e}", self.path.display());
                Err(Error::IdentityCorrupted {
                    path: self.path.clone(),
                    message: e.to_string(),
                })
            }
        }
    }

    /// Load the identity, failing if none exists yet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IdentityMissing`] when no identity has been created.
    pub fn require(&self) -> Result<UserIdentity> {
        self.load()?.ok_or(Error::IdentityMissing)
    }

    /// Create and persist a new identity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentity`] for a blank name, or a write error.
    pub fn create(&self, details: NewIdentity) -> Result<UserIdentity> {
        let identity = UserIdentity::new(details)?;
        self.save(&identity)?;
        info!("Created identity {} ({})", identity.id, identity.name);
        Ok(identity)
    }

    /// Collect identity details interactively, re-prompting until valid.
    ///
    /// Returns `Ok(None)` if the user cancels the prompt.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity cannot be saved.
    pub async fn create_interactive(
        &self,
        prompts: &dyn Prompts,
        notifier: &dyn Notifier,
    ) -> Result<Option<UserIdentity>> {
        loop {
            let Some(details) = prompts.ask_identity().await else {
                debug!("Identity creation cancelled");
                return Ok(None);
            };

            match self.create(details) {
                Ok(identity) => return Ok(Some(identity)),
                Err(Error::InvalidIdentity { message }) => {
                    notifier
                        .notify(&format!("Please enter a valid identity: {message}"), NotifyLevel::Warning)
                        .await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Persist the identity with a temp-file + fsync + rename write.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IdentityWrite`] if any step fails.
    pub fn save(&self, identity: &UserIdentity) -> Result<()> {
        let dir = self
            .path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

        fs::create_dir_all(&dir).map_err(|source| Error::IdentityWrite {
            path: dir.clone(),
            source,
        })?;

        let file_name = self
            .path
            .file_name()
            .map_or_else(|| "identity.json".into(), |n| n.to_string_lossy().into_owned());
        let temp_path = dir.join(format!("{file_name}.tmp.{}", std::process::id()));

        let json = serde_json::to_string_pretty(identity)?;

        {
            let write_err = |source| Error::IdentityWrite {
                path: temp_path.clone(),
                source,
            };
            let mut file = fs::File::create(&temp_path).map_err(write_err)?;
            file.write_all(json.as_bytes()).map_err(write_err)?;
            file.sync_all().map_err(write_err)?;
        }

        fs::rename(&temp_path, &self.path).map_err(|source| {
            if let Err(e) = fs::remove_file(&temp_path) {
                warn!("Failed to remove {}: {e}", temp_path.display());
            }
            Error::IdentityWrite {
                path: self.path.clone(),
                source,
            }
        })?;

        debug!("Saved identity {}", identity.id);
        Ok(())
    }

    /// Bump `last_active` to now and persist it on the blocking thread pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity cannot be saved.
    pub async fn touch_last_active(&self, identity: &mut UserIdentity) -> Result<()> {
        identity.last_active = Utc::now();
        let store = self.clone();
        let snapshot = identity.clone();
        tokio::task::spawn_blocking(move || store.save(&snapshot))
            .await
            .map_err(|e| Error::internal(format!("identity save task failed: {e}")))?
    }

    /// Move a corrupted identity file aside as `<file>.corrupted.<timestamp>`.
    ///
    /// Returns `None` without touching anything if there is no file or it
    /// loads fine.
    ///
    /// # Errors
    ///
    /// Returns an error if the rename fails.
    pub fn backup_corrupted(&self) -> Result<Option<PathBuf>> {
        if !matches!(self.load(), Err(Error::IdentityCorrupted { .. })) {
            return Ok(None);
        }

        let backup = self.move_aside("corrupted")?;
        warn!("Backed up corrupted identity to {}", backup.display());
        Ok(Some(backup))
    }

    /// Move the identity file aside as `<file>.retired.<timestamp>`, whatever
    /// its content, so the next launch starts a fresh identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the rename fails.
    pub fn retire(&self) -> Result<Option<PathBuf>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let backup = self.move_aside("retired")?;
        info!("Retired identity to {}", backup.display());
        Ok(Some(backup))
    }

    fn move_aside(&self, tag: &str) -> Result<PathBuf> {
        let timestamp = Utc::now().format(BACKUP_DATE_FORMAT);
        let mut backup = self.path.clone().into_os_string();
        backup.push(format!(".{tag}.{timestamp}"));
        let backup = PathBuf::from(backup);

        fs::rename(&self.path, &backup).map_err(|source| Error::IdentityWrite {
            path: backup.clone(),
            source,
        })?;
        Ok(backup)
    }
}
