//! The collaboration state machine.
//!
//! ```text
//! Unconnected -> Classifying -> { Bootstrapping | Joining | Converting | AwaitingDecision }
//!             -> Connected -> { Disconnected | Error }
//! ```
//!
//! A coordinator owns one local identity and at most one team folder handle.
//! Every operation takes `&mut self`, so only one classification or join flow
//! runs at a time per coordinator. Prompts are awaited before any write, which
//! makes them the only points where a flow can be cancelled.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::analyzer::{FolderAnalyzer, FolderClassification, FolderKind};
use crate::collaborators::{
    AmbiguousChoice, DataSync, Decision, NoSync, Notifier, NotifyLevel, Prompts, SyncReport,
    TracingNotifier,
};
use crate::config::{Config, ROSTER_FORMAT_VERSION};
use crate::error::{Error, Result};
use crate::folder::FolderHandle;
use crate::identity::{FolderAccessRecord, IdentityStore, Role, UserIdentity};
use crate::roster::{RosterLoad, RosterStore, TeamRoster};

/// Where the coordinator is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorState {
    /// No folder selected.
    Unconnected,
    /// Inspecting a freshly selected folder.
    Classifying,
    /// Creating a new team in an empty (or approved) folder.
    Bootstrapping,
    /// Joining an existing team.
    Joining,
    /// Turning a folder of records into a team folder.
    Converting,
    /// Waiting for the user to decide about an unrecognized folder.
    AwaitingDecision,
    /// Connected to a team folder.
    Connected {
        /// Folder display name.
        folder_name: String,
        /// Members in the roster as last written.
        member_count: usize,
    },
    /// The folder became unreachable after connecting.
    Disconnected {
        /// Folder display name.
        folder_name: String,
        /// Why the connection was lost.
        reason: String,
    },
    /// The last flow failed.
    Error {
        /// Failure description.
        message: String,
    },
}

impl std::fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unconnected => write!(f, "unconnected"),
            Self::Classifying => write!(f, "classifying"),
            Self::Bootstrapping => write!(f, "bootstrapping"),
            Self::Joining => write!(f, "joining"),
            Self::Converting => write!(f, "converting"),
            Self::AwaitingDecision => write!(f, "awaiting decision"),
            Self::Connected {
                folder_name,
                member_count,
            } => write!(f, "connected to '{folder_name}' ({member_count} members)"),
            Self::Disconnected {
                folder_name,
                reason,
            } => write!(f, "disconnected from '{folder_name}': {reason}"),
            Self::Error { message } => write!(f, "failed: {message}"),
        }
    }
}

impl CoordinatorState {
    /// Whether a new folder may be selected from this state.
    #[must_use]
    pub fn accepts_selection(&self) -> bool {
        matches!(
            self,
            Self::Unconnected | Self::Disconnected { .. } | Self::Error { .. }
        )
    }

    /// Whether a team folder is connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }
}

/// How a folder selection ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectOutcome {
    /// A new team was bootstrapped.
    Created {
        /// Roster as written.
        roster: TeamRoster,
    },
    /// A folder of records became a team folder.
    Converted {
        /// Roster as written.
        roster: TeamRoster,
        /// Sync result, `None` if the sync hook failed.
        sync: Option<SyncReport>,
    },
    /// The identity joined an existing team.
    Joined {
        /// Roster as written.
        roster: TeamRoster,
        /// Sync result, `None` if the sync hook failed.
        sync: Option<SyncReport>,
    },
    /// The identity was already a member.
    Reconnected {
        /// Roster as written.
        roster: TeamRoster,
    },
    /// The user declined to join.
    Declined,
    /// The user dismissed a prompt.
    Cancelled,
    /// The user chose not to use an unrecognized folder.
    Aborted,
}

impl ConnectOutcome {
    /// The written roster, if the selection connected.
    #[must_use]
    pub fn roster(&self) -> Option<&TeamRoster> {
        match self {
            Self::Created { roster }
            | Self::Converted { roster, .. }
            | Self::Joined { roster, .. }
            | Self::Reconnected { roster } => Some(roster),
            Self::Declined | Self::Cancelled | Self::Aborted => None,
        }
    }

    /// Whether the selection ended connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.roster().is_some()
    }
}

/// Drives folder selection for one local identity.
pub struct Coordinator {
    config: Config,
    analyzer: FolderAnalyzer,
    store: RosterStore,
    identity_store: IdentityStore,
    identity: UserIdentity,
    prompts: Arc<dyn Prompts>,
    notifier: Arc<dyn Notifier>,
    sync: Arc<dyn DataSync>,
    state: CoordinatorState,
    folder: Option<Box<dyn FolderHandle>>,
    roster: Option<TeamRoster>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("identity", &self.identity.id)
            .field("state", &self.state)
            .field("folder", &self.folder.as_ref().map(|h| h.root().to_path_buf()))
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    /// Create a coordinator for `identity`, persisted through `identity_store`.
    ///
    /// Notifications go to `tracing` and the sync hook is a no-op until
    /// replaced with [`with_notifier`](Self::with_notifier) and
    /// [`with_sync`](Self::with_sync).
    #[must_use]
    pub fn new(
        config: Config,
        identity_store: IdentityStore,
        identity: UserIdentity,
        prompts: Arc<dyn Prompts>,
    ) -> Self {
        Self {
            analyzer: FolderAnalyzer::from_config(&config),
            store: RosterStore::from_config(&config),
            config,
            identity_store,
            identity,
            prompts,
            notifier: Arc::new(TracingNotifier),
            sync: Arc::new(NoSync),
            state: CoordinatorState::Unconnected,
            folder: None,
            roster: None,
        }
    }

    /// Replace the notification sink.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Replace the data-sync hook.
    #[must_use]
    pub fn with_sync(mut self, sync: Arc<dyn DataSync>) -> Self {
        self.sync = sync;
        self
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> &CoordinatorState {
        &self.state
    }

    /// The local identity, including its folder access history.
    #[must_use]
    pub fn identity(&self) -> &UserIdentity {
        &self.identity
    }

    /// The roster as last written by this coordinator.
    #[must_use]
    pub fn roster(&self) -> Option<&TeamRoster> {
        self.roster.as_ref()
    }

    /// The connected folder, if any.
    #[must_use]
    pub fn folder(&self) -> Option<&dyn FolderHandle> {
        self.folder.as_deref()
    }

    /// Select a team folder and run whichever flow its classification calls for.
    ///
    /// Declining, cancelling and aborting are reported as outcomes and leave
    /// the coordinator [`Unconnected`](CoordinatorState::Unconnected).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] if a folder is already connected.
    /// Any other failure moves the coordinator to
    /// [`Error`](CoordinatorState::Error) and discards the handle.
    pub async fn select_folder(&mut self, folder: Box<dyn FolderHandle>) -> Result<ConnectOutcome> {
        if !self.state.accepts_selection() {
            return Err(Error::invalid_transition("select a folder", &self.state));
        }

        self.folder = None;
        self.roster = None;
        self.state = CoordinatorState::Classifying;
        info!("Selected team folder {}", folder.root().display());

        match self.run_selection(folder.as_ref()).await {
            Ok(outcome) => {
                if let Some(roster) = outcome.roster() {
                    self.state = CoordinatorState::Connected {
                        folder_name: folder.name().to_string(),
                        member_count: roster.member_count(),
                    };
                    self.roster = Some(roster.clone());
                    self.folder = Some(folder);
                } else {
                    self.state = CoordinatorState::Unconnected;
                }
                Ok(outcome)
            }
            Err(e) => {
                warn!("Folder selection failed: {e}");
                self.state = CoordinatorState::Error {
                    message: e.to_string(),
                };
                let level = if e.is_transient() {
                    NotifyLevel::Warning
                } else {
                    NotifyLevel::Error
                };
                self.notifier
                    .notify(&format!("{e}. {}", e.recovery_hint()), level)
                    .await;
                Err(e)
            }
        }
    }

    async fn run_selection(&mut self, folder: &dyn FolderHandle) -> Result<ConnectOutcome> {
        let classification = self.analyzer.classify(folder).await?;

        match classification.result_type {
            FolderKind::New => {
                self.state = CoordinatorState::Bootstrapping;
                let roster = self.bootstrap(folder).await?;
                self.notifier
                    .notify(
                        &format!("Created team folder '{}'. You are the admin.", folder.name()),
                        NotifyLevel::Success,
                    )
                    .await;
                Ok(ConnectOutcome::Created { roster })
            }
            FolderKind::ExistingTeam if classification.has_member(self.identity.id) => {
                let roster = self.reconnect(folder, &classification).await?;
                self.notifier
                    .notify(
                        &format!(
                            "Welcome back to '{}'! {} team members.",
                            folder.name(),
                            roster.member_count()
                        ),
                        NotifyLevel::Success,
                    )
                    .await;
                Ok(ConnectOutcome::Reconnected { roster })
            }
            FolderKind::ExistingTeam => {
                self.state = CoordinatorState::Joining;
                match self.prompts.confirm_join(&classification).await {
                    Decision::Confirm => {}
                    Decision::Decline => {
                        info!("Declined to join {}", folder.name());
                        return Ok(ConnectOutcome::Declined);
                    }
                    Decision::Cancel => return Ok(ConnectOutcome::Cancelled),
                }

                let roster = self.join(folder, &classification).await?;
                let sync = self.run_sync(folder).await;
                self.notifier
                    .notify(
                        &format!(
                            "Joined '{}' with {} team members.",
                            folder.name(),
                            roster.member_count()
                        ),
                        NotifyLevel::Success,
                    )
                    .await;
                Ok(ConnectOutcome::Joined { roster, sync })
            }
            FolderKind::DataOnly => {
                self.state = CoordinatorState::Converting;
                let roster = self.bootstrap(folder).await?;
                let sync = self.run_sync(folder).await;
                self.notifier
                    .notify(
                        &format!(
                            "Converted '{}' into a team folder ({} existing record folders).",
                            folder.name(),
                            classification.domain_types.len()
                        ),
                        NotifyLevel::Success,
                    )
                    .await;
                Ok(ConnectOutcome::Converted { roster, sync })
            }
            FolderKind::UnknownNonempty => {
                self.state = CoordinatorState::AwaitingDecision;
                self.notifier
                    .notify(
                        &format!(
                            "'{}' contains files this app does not recognize.",
                            folder.name()
                        ),
                        NotifyLevel::Warning,
                    )
                    .await;

                match self.prompts.resolve_ambiguous_folder(&classification).await {
                    AmbiguousChoice::UseAsNewTeam => {
                        self.state = CoordinatorState::Bootstrapping;
                        let roster = self.bootstrap(folder).await?;
                        self.notifier
                            .notify(
                                &format!("Created team folder '{}'.", folder.name()),
                                NotifyLevel::Success,
                            )
                            .await;
                        Ok(ConnectOutcome::Created { roster })
                    }
                    AmbiguousChoice::Abort => {
                        info!("Left {} untouched", folder.name());
                        Ok(ConnectOutcome::Aborted)
                    }
                }
            }
            FolderKind::CorruptTeam => Err(Error::RosterCorrupted {
                path: self.store.document_path(folder),
                message: classification
                    .roster_error
                    .unwrap_or_else(|| "unreadable roster".to_string()),
            }),
        }
    }

    /// Create the record skeleton and a roster with this identity as creator.
    async fn bootstrap(&mut self, folder: &dyn FolderHandle) -> Result<TeamRoster> {
        let mut created = 0;
        for name in &self.config.folders.domain_subfolders {
            if folder.create_dir(name).await? {
                created += 1;
            }
        }
        debug!("Created {created} record folders in {}", folder.name());

        let roster = TeamRoster::bootstrap(&self.identity, ROSTER_FORMAT_VERSION);
        let written = self.store.write(folder, &roster).await?;

        let (role, is_creator) = written
            .member(self.identity.id)
            .map_or((Role::Admin, true), |entry| (entry.role, entry.is_creator));
        if !is_creator {
            warn!(
                "Another member bootstrapped {} concurrently; joined as a member",
                folder.name()
            );
        }
        self.record_access(folder, role, is_creator).await?;
        Ok(written)
    }

    /// Refresh this identity's `last_active` in a roster it already belongs to.
    async fn reconnect(
        &mut self,
        folder: &dyn FolderHandle,
        classification: &FolderClassification,
    ) -> Result<TeamRoster> {
        let mut roster = classification
            .roster
            .clone()
            .ok_or_else(|| Error::internal("existing team classified without a roster"))?;

        roster.touch_member(self.identity.id);
        roster.mark_updated(self.identity.id);
        let written = self.store.write(folder, &roster).await?;

        let (role, is_creator) = written
            .member(self.identity.id)
            .map_or((Role::default(), false), |entry| (entry.role, entry.is_creator));
        self.record_access(folder, role, is_creator).await?;
        Ok(written)
    }

    /// Append this identity to a freshly re-read roster.
    async fn join(
        &mut self,
        folder: &dyn FolderHandle,
        classification: &FolderClassification,
    ) -> Result<TeamRoster> {
        let mut roster = match self.store.load(folder).await? {
            RosterLoad::Loaded { roster, .. } => roster,
            RosterLoad::Missing => classification
                .roster
                .clone()
                .ok_or_else(|| Error::internal("existing team classified without a roster"))?,
            RosterLoad::Corrupted { message } => {
                return Err(Error::RosterCorrupted {
                    path: self.store.document_path(folder),
                    message,
                });
            }
        };

        let role = self.config.roster.default_member_role;
        if !roster.add_member(&self.identity, role) {
            debug!("{} already listed in {}", self.identity.id, folder.name());
            roster.touch_member(self.identity.id);
        }
        roster.mark_updated(self.identity.id);
        let written = self.store.write(folder, &roster).await?;

        let (role, is_creator) = written
            .member(self.identity.id)
            .map_or((role, false), |entry| (entry.role, entry.is_creator));
        self.record_access(folder, role, is_creator).await?;
        Ok(written)
    }

    async fn record_access(
        &mut self,
        folder: &dyn FolderHandle,
        role: Role,
        is_creator: bool,
    ) -> Result<()> {
        let added = self.identity.record_folder_access(FolderAccessRecord {
            folder_name: folder.name().to_string(),
            role,
            joined_at: chrono::Utc::now(),
            is_creator,
        });
        if added {
            debug!("Recorded access to {} as {role}", folder.name());
        }
        self.identity_store
            .touch_last_active(&mut self.identity)
            .await
    }

    /// Run the data-sync hook; failures are reported but not fatal.
    async fn run_sync(&self, folder: &dyn FolderHandle) -> Option<SyncReport> {
        match self.sync.push_local_records_to_folder(folder).await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!("Data sync to {} failed: {e}", folder.name());
                self.notifier
                    .notify(
                        &format!("Connected, but local records were not synced: {e}"),
                        NotifyLevel::Warning,
                    )
                    .await;
                None
            }
        }
    }

    /// Verify the connected folder is still reachable.
    ///
    /// On failure the coordinator moves to
    /// [`Disconnected`](CoordinatorState::Disconnected) and drops the handle;
    /// the identity and its folder history are kept. Returns whether the
    /// coordinator is still connected.
    pub async fn check_connection(&mut self) -> bool {
        let Some(folder) = self.folder.as_ref() else {
            return false;
        };

        match folder.probe().await {
            Ok(()) => true,
            Err(e) => {
                let folder_name = folder.name().to_string();
                warn!("Lost access to {folder_name}: {e}");
                self.notifier
                    .notify(
                        &format!("Lost access to '{folder_name}'. {}", e.recovery_hint()),
                        NotifyLevel::Warning,
                    )
                    .await;
                self.state = CoordinatorState::Disconnected {
                    folder_name,
                    reason: e.to_string(),
                };
                self.folder = None;
                self.roster = None;
                false
            }
        }
    }

    /// Re-read the connected folder's roster.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] when not connected, or a read error.
    pub async fn refresh_roster(&mut self) -> Result<Option<TeamRoster>> {
        let Some(folder) = self.folder.as_deref() else {
            return Err(Error::invalid_transition("refresh the roster", &self.state));
        };

        let roster = self.store.read(folder).await?;
        if let Some(roster) = &roster {
            self.state = CoordinatorState::Connected {
                folder_name: folder.name().to_string(),
                member_count: roster.member_count(),
            };
        }
        self.roster.clone_from(&roster);
        Ok(roster)
    }

    /// Clear an `Error` or `Disconnected` state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] while connected; use
    /// [`disconnect`](Self::disconnect) instead.
    pub fn reset(&mut self) -> Result<()> {
        if self.state.is_connected() {
            return Err(Error::invalid_transition("reset", &self.state));
        }
        self.folder = None;
        self.roster = None;
        self.state = CoordinatorState::Unconnected;
        Ok(())
    }

    /// Drop the folder handle and return to `Unconnected`.
    pub fn disconnect(&mut self) {
        if let Some(folder) = self.folder.take() {
            info!("Disconnected from {}", folder.name());
        }
        self.roster = None;
        self.state = CoordinatorState::Unconnected;
    }
}
