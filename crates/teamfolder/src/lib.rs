//! `teamfolder` - team collaboration over a shared folder
//!
//! A team folder is an ordinary directory (a synced drive, a network share)
//! that holds a roster document listing its members next to a fixed set of
//! record subfolders. This library classifies a selected folder, then creates
//! a team in it, joins the team, reconnects to it, or converts existing
//! records into one, while keeping a small local identity document per user.
//!
//! The entry point is [`Coordinator`]; the user-facing side (prompts,
//! notifications, record sync) plugs in through the traits in
//! [`collaborators`].

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod analyzer;
pub mod cli;
pub mod collaborators;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod folder;
pub mod identity;
pub mod logging;
pub mod roster;

pub use analyzer::{FolderAnalyzer, FolderClassification, FolderKind};
pub use collaborators::{
    AmbiguousChoice, DataSync, Decision, LocalRecordsSync, NoSync, Notifier, NotifyLevel, Prompts,
    SyncReport, TracingNotifier,
};
pub use config::Config;
pub use coordinator::{ConnectOutcome, Coordinator, CoordinatorState};
pub use error::{Error, Result};
pub use folder::{FolderHandle, LocalFolder};
pub use identity::{FolderAccessRecord, IdentityStore, NewIdentity, Role, UserIdentity};
pub use logging::init_logging;
pub use roster::{
    MembershipEntry, MergeOptions, RosterLoad, RosterStore, TeamRoster, WriteMode,
};
