//! Command-line interface for teamfolder.
//!
//! This module provides the CLI structure and the terminal implementations of
//! the coordinator's prompts and notifications for the `teamfolder` binary.

mod commands;
mod prompts;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    ConfigCommand, ConnectCommand, FolderArgs, IdentityCommand, InitArgs, RepairCommand, RoleArg,
};
pub use prompts::{ConsoleNotifier, TerminalPrompts};

/// teamfolder - Collaborate through a shared folder
///
/// Point it at a synced or network folder to create a team there, join the
/// team that already lives there, or turn a folder of records into a team.
#[derive(Debug, Parser)]
#[command(name = "teamfolder")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage the local identity
    #[command(subcommand)]
    Identity(IdentityCommand),

    /// Classify a folder without changing it
    Inspect(FolderArgs),

    /// Create, join, reconnect to, or convert a team folder
    Connect(ConnectCommand),

    /// List the members of a team folder
    Roster(FolderArgs),

    /// Move a corrupted roster aside so the folder can be used again
    Repair(RepairCommand),

    /// View configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}
