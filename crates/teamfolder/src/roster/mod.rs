//! Team roster documents.
//!
//! A roster lists every known member of a team folder. It is created once,
//! on bootstrap, and afterwards only gains entries or has entries updated in
//! place. Member ids are the local identity ids, so at most one entry exists
//! per id, and exactly one entry (the first one written) is the creator.

pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::{Role, UserIdentity};

pub use store::{MergeOptions, RosterLoad, RosterStore, WriteMode};

/// Kind of folder a roster describes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FolderType {
    /// A team collaboration folder.
    #[default]
    Team,
    /// Written by an unknown or newer client.
    #[serde(other)]
    Unknown,
}

/// Membership status of a roster entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    /// Current member.
    #[default]
    Active,
    /// Former member, kept for history.
    Inactive,
}

/// The creator's identity as it was when the roster was bootstrapped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSnapshot {
    /// Identity id.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Contact email.
    #[serde(default)]
    pub email: String,
    /// Local role at the time.
    #[serde(default)]
    pub role: Role,
    /// Company.
    #[serde(default)]
    pub company: String,
    /// When the identity was created.
    pub created: DateTime<Utc>,
}

impl From<&UserIdentity> for UserSnapshot {
    fn from(identity: &UserIdentity) -> Self {
        Self {
            id: identity.id,
            name: identity.name.clone(),
            email: identity.email.clone(),
            role: identity.role,
            company: identity.company.clone(),
            created: identity.created,
        }
    }
}

/// One member's record within a roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipEntry {
    /// Identity id of the member.
    pub id: Uuid,
    /// Display name at join time.
    pub name: String,
    /// Contact email at join time.
    #[serde(default)]
    pub email: String,
    /// Role within this team.
    pub role: Role,
    /// Company at join time.
    #[serde(default)]
    pub company: String,
    /// When the member joined.
    pub joined_at: DateTime<Utc>,
    /// Last time the member connected.
    pub last_active: DateTime<Utc>,
    /// Whether this member bootstrapped the team.
    #[serde(default)]
    pub is_creator: bool,
    /// Membership status.
    #[serde(default)]
    pub status: MemberStatus,
    /// Who added this member, if it was not a self-join.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_by: Option<Uuid>,
}

impl MembershipEntry {
    /// Snapshot an identity into a new active entry.
    #[must_use]
    pub fn from_identity(
        identity: &UserIdentity,
        role: Role,
        is_creator: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: identity.id,
            name: identity.name.clone(),
            email: identity.email.clone(),
            role,
            company: identity.company.clone(),
            joined_at: now,
            last_active: now,
            is_creator,
            status: MemberStatus::Active,
            added_by: None,
        }
    }
}

/// The persisted team roster document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamRoster {
    /// When the team was bootstrapped.
    pub created: DateTime<Utc>,
    /// Snapshot of the bootstrapping identity.
    pub creator: UserSnapshot,
    /// Folder kind.
    #[serde(default)]
    pub folder_type: FolderType,
    /// Document format version.
    pub version: String,
    /// Write counter, bumped on every successful write.
    #[serde(default)]
    pub revision: u64,
    /// Last time any member connected.
    pub last_activity: DateTime<Utc>,
    /// Last time the document was written.
    pub last_updated: DateTime<Utc>,
    /// Identity id of the last writer.
    pub updated_by: Uuid,
    /// Team members, creator first.
    #[serde(default)]
    pub users: Vec<MembershipEntry>,
}

impl TeamRoster {
    /// A fresh roster whose only member is `creator`, as admin.
    #[must_use]
    pub fn bootstrap(creator: &UserIdentity, version: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            created: now,
            creator: UserSnapshot::from(creator),
            folder_type: FolderType::Team,
            version: version.into(),
            revision: 0,
            last_activity: now,
            last_updated: now,
            updated_by: creator.id,
            users: vec![MembershipEntry::from_identity(creator, Role::Admin, true, now)],
        }
    }

    /// Number of entries.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.users.len()
    }

    /// Number of active entries.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.users
            .iter()
            .filter(|u| u.status == MemberStatus::Active)
            .count()
    }

    /// Look up a member by identity id.
    #[must_use]
    pub fn member(&self, id: Uuid) -> Option<&MembershipEntry> {
        self.users.iter().find(|u| u.id == id)
    }

    /// The creator's entry.
    #[must_use]
    pub fn creator_entry(&self) -> Option<&MembershipEntry> {
        self.users.iter().find(|u| u.is_creator)
    }

    /// Append `identity` as a new member unless already present.
    ///
    /// Returns `false` when an entry with that id already exists.
    pub fn add_member(&mut self, identity: &UserIdentity, role: Role) -> bool {
        if self.member(identity.id).is_some() {
            return false;
        }
        let now = Utc::now();
        self.users
            .push(MembershipEntry::from_identity(identity, role, false, now));
        self.last_activity = now;
        true
    }

    /// Mark a member active now. Returns `false` if the id is unknown.
    pub fn touch_member(&mut self, id: Uuid) -> bool {
        let now = Utc::now();
        let Some(entry) = self.users.iter_mut().find(|u| u.id == id) else {
            return false;
        };
        entry.last_active = now;
        entry.status = MemberStatus::Active;
        self.last_activity = now;
        true
    }

    /// Stamp the document as written by `writer`.
    pub fn mark_updated(&mut self, writer: Uuid) {
        self.last_updated = Utc::now();
        self.updated_by = writer;
    }

    /// Merge this (local) roster onto the freshly read on-disk `base`.
    ///
    /// The result keeps the base's creation metadata and entry order. Entries
    /// only present locally are appended. For an id present in both, the entry
    /// with the newer `last_active` wins, but `is_creator` and `joined_at`
    /// always come from the base. A local entry can never become a second
    /// creator; if the base has no creator entry, the local creator is put
    /// first and its snapshot becomes the roster's creator.
    #[must_use]
    pub fn merge_onto(&self, base: &TeamRoster) -> TeamRoster {
        let mut merged = base.clone();
        let mut has_creator = base.creator_entry().is_some();

        for ours in &self.users {
            if let Some(theirs) = merged.users.iter_mut().find(|u| u.id == ours.id) {
                if ours.last_active > theirs.last_active {
                    let is_creator = theirs.is_creator;
                    let joined_at = theirs.joined_at;
                    *theirs = ours.clone();
                    theirs.is_creator = is_creator;
                    theirs.joined_at = joined_at;
                }
            } else {
                let mut entry = ours.clone();
                if entry.is_creator && !has_creator {
                    has_creator = true;
                    merged.creator = self.creator.clone();
                    merged.users.insert(0, entry);
                } else {
                    entry.is_creator = false;
                    merged.users.push(entry);
                }
            }
        }

        merged.last_activity = merged.last_activity.max(self.last_activity);
        merged.last_updated = self.last_updated;
        merged.updated_by = self.updated_by;
        merged.version.clone_from(&self.version);
        merged
    }

    /// Check the roster invariants: unique ids and exactly one creator, first.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated invariant.
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        let mut seen = std::collections::HashSet::new();
        for entry in &self.users {
            if !seen.insert(entry.id) {
                return Err(format!("duplicate member id {}", entry.id));
            }
        }

        let creators = self.users.iter().filter(|u| u.is_creator).count();
        if creators != 1 {
            return Err(format!("expected exactly one creator, found {creators}"));
        }
        if !self.users.first().is_some_and(|u| u.is_creator) {
            return Err("creator is not the first entry".to_string());
        }
        Ok(())
    }
}
