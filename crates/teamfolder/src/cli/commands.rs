//! CLI command definitions.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::identity::{NewIdentity, Role};

/// Local identity commands.
#[derive(Debug, Subcommand)]
pub enum IdentityCommand {
    /// Show the local identity and its folder history
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Create the local identity
    Init(InitArgs),

    /// Move a corrupted identity file aside so a new one can be created
    Reset {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Identity details for `identity init`.
#[derive(Debug, Args)]
pub struct InitArgs {
    /// Display name (prompted for when omitted)
    #[arg(short, long)]
    pub name: Option<String>,

    /// Contact email
    #[arg(short, long)]
    pub email: Option<String>,

    /// Default role
    #[arg(short, long, value_enum)]
    pub role: Option<RoleArg>,

    /// Company or team name
    #[arg(long)]
    pub company: Option<String>,
}

impl InitArgs {
    /// Identity details if a name was given on the command line.
    #[must_use]
    pub fn details(&self) -> Option<NewIdentity> {
        let name = self.name.clone()?;
        Some(NewIdentity {
            name,
            email: self.email.clone(),
            role: self.role.map(Role::from),
            company: self.company.clone(),
        })
    }
}

/// Arguments for commands that only read a folder.
#[derive(Debug, Args)]
pub struct FolderArgs {
    /// Team folder path
    #[arg(value_name = "DIR")]
    pub dir: PathBuf,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// `connect` arguments.
#[derive(Debug, Args)]
pub struct ConnectCommand {
    /// Team folder path
    #[arg(value_name = "DIR")]
    pub dir: PathBuf,

    /// Join an existing team without asking
    #[arg(short, long)]
    pub yes: bool,

    /// Use a folder with unrecognized content as a new team without asking
    #[arg(long)]
    pub as_new: bool,

    /// Push records from this directory after joining or converting
    #[arg(long, value_name = "DIR")]
    pub records: Option<PathBuf>,
}

/// `repair` arguments.
#[derive(Debug, Args)]
pub struct RepairCommand {
    /// Team folder path
    #[arg(value_name = "DIR")]
    pub dir: PathBuf,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Role argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RoleArg {
    /// Full control
    Admin,
    /// Manages projects
    Manager,
    /// Works records
    Recruiter,
    /// Read-only
    Viewer,
}

impl From<RoleArg> for Role {
    fn from(arg: RoleArg) -> Self {
        match arg {
            RoleArg::Admin => Self::Admin,
            RoleArg::Manager => Self::Manager,
            RoleArg::Recruiter => Self::Recruiter,
            RoleArg::Viewer => Self::Viewer,
        }
    }
}
