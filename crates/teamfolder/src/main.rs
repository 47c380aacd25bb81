//! `teamfolder` - CLI for folder-backed team collaboration
//!
//! This binary manages the local identity and connects it to team folders.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;

use teamfolder::cli::{
    Cli, Command, ConfigCommand, ConnectCommand, ConsoleNotifier, FolderArgs, IdentityCommand,
    InitArgs, RepairCommand, TerminalPrompts,
};
use teamfolder::{
    init_logging, Config, ConnectOutcome, Coordinator, DataSync, FolderAnalyzer, FolderHandle,
    IdentityStore, LocalFolder, LocalRecordsSync, RosterLoad, RosterStore, TeamRoster, UserIdentity,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    match cli.command {
        Command::Config(cmd) => handle_config(cli.config, cmd),
        Command::Identity(cmd) => handle_identity(&Config::load_from(cli.config)?, cmd).await,
        Command::Inspect(args) => handle_inspect(&Config::load_from(cli.config)?, &args).await,
        Command::Connect(cmd) => handle_connect(Config::load_from(cli.config)?, cmd).await,
        Command::Roster(args) => handle_roster(&Config::load_from(cli.config)?, &args).await,
        Command::Repair(cmd) => handle_repair(&Config::load_from(cli.config)?, &cmd).await,
    }
}

async fn handle_identity(config: &Config, cmd: IdentityCommand) -> anyhow::Result<()> {
    let store = IdentityStore::new(config.identity_path());

    match cmd {
        IdentityCommand::Show { json } => match store.load()? {
            Some(identity) if json => println!("{}", serde_json::to_string_pretty(&identity)?),
            Some(identity) => print_identity(&identity),
            None => {
                println!("No identity at {}", store.path().display());
                println!("Create one with `teamfolder identity init --name <NAME>`.");
            }
        },
        IdentityCommand::Init(args) => {
            if let Some(existing) = store.load()? {
                bail!(
                    "an identity already exists for {} ({})",
                    existing.name,
                    existing.id
                );
            }
            let identity = create_identity(&store, &args).await?;
            println!("Created identity {} ({})", identity.name, identity.id);
        }
        IdentityCommand::Reset { yes } => {
            if !yes {
                println!(
                    "This moves {} aside; a new identity will not be a member of your current teams.",
                    store.path().display()
                );
                println!("Use --yes to confirm.");
                return Ok(());
            }
            if let Some(backup) = store.backup_corrupted()? {
                println!("Moved damaged identity to {}", backup.display());
            } else if let Some(backup) = store.retire()? {
                println!("Moved identity to {}", backup.display());
            } else {
                println!("No identity file to reset.");
            }
        }
    }
    Ok(())
}

async fn create_identity(store: &IdentityStore, args: &InitArgs) -> anyhow::Result<UserIdentity> {
    if let Some(details) = args.details() {
        return Ok(store.create(details)?);
    }
    store
        .create_interactive(&TerminalPrompts::stdin(), &ConsoleNotifier)
        .await?
        .context("identity creation cancelled")
}

fn print_identity(identity: &UserIdentity) {
    println!("Identity");
    println!("========");
    println!("  Id:           {}", identity.id);
    println!("  Name:         {}", identity.name);
    if !identity.email.is_empty() {
        println!("  Email:        {}", identity.email);
    }
    if !identity.company.is_empty() {
        println!("  Company:      {}", identity.company);
    }
    println!("  Role:         {}", identity.role);
    println!("  Created:      {}", identity.created.to_rfc3339());
    println!("  Last active:  {}", identity.last_active.to_rfc3339());
    println!();
    println!("Team folders ({})", identity.folder_access.len());
    for access in &identity.folder_access {
        println!(
            "  {:<24} {:<10} joined {}{}",
            access.folder_name,
            access.role.to_string(),
            access.joined_at.format("%Y-%m-%d"),
            if access.is_creator { " (creator)" } else { "" }
        );
    }
}

async fn handle_inspect(config: &Config, args: &FolderArgs) -> anyhow::Result<()> {
    let folder = LocalFolder::open(&args.dir).await?;
    let classification = FolderAnalyzer::from_config(config).classify(&folder).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&classification)?);
        return Ok(());
    }

    println!("Folder:        {}", args.dir.display());
    println!("Kind:          {}", classification.result_type);
    println!("Empty:         {}", classification.is_empty);
    println!("Roster:        {}", classification.has_roster_data);
    if let Some(error) = &classification.roster_error {
        println!("Roster error:  {error}");
    }
    if !classification.domain_types.is_empty() {
        let mut dirs = Vec::new();
        for name in &classification.domain_types {
            let count = folder.dir_entries(name).await?.len();
            dirs.push(format!("{name} ({count})"));
        }
        println!("Record dirs:   {}", dirs.join(", "));
    }
    if let Some(creator) = &classification.creator {
        println!("Creator:       {}", creator.name);
        println!("Members:       {}", classification.members.len());
    }
    if let Some(last) = classification.last_activity {
        println!("Last activity: {}", last.to_rfc3339());
    }

    let store = IdentityStore::new(config.identity_path());
    if let Ok(Some(identity)) = store.load() {
        println!(
            "You:           {}",
            if classification.has_member(identity.id) {
                "member"
            } else {
                "not a member"
            }
        );
    }
    Ok(())
}

async fn handle_connect(mut config: Config, cmd: ConnectCommand) -> anyhow::Result<()> {
    if let Some(records) = cmd.records {
        config.sync.enabled = true;
        config.sync.local_records_dir = Some(records);
    }

    let prompts = Arc::new(
        TerminalPrompts::stdin()
            .with_assume_yes(cmd.yes)
            .with_use_as_new(cmd.as_new),
    );

    let store = IdentityStore::new(config.identity_path());
    let identity = match store.load()? {
        Some(identity) => identity,
        None => {
            println!("No identity yet; let's create one.");
            store
                .create_interactive(prompts.as_ref(), &ConsoleNotifier)
                .await?
                .context("identity creation cancelled")?
        }
    };

    let folder = LocalFolder::open(&cmd.dir).await?;
    let sync: Arc<dyn DataSync> = Arc::from(LocalRecordsSync::from_config(&config));
    let mut coordinator = Coordinator::new(config, store, identity, prompts)
        .with_notifier(Arc::new(ConsoleNotifier))
        .with_sync(sync);

    match coordinator.select_folder(Box::new(folder)).await? {
        ConnectOutcome::Created { roster } => print_members(&roster),
        ConnectOutcome::Converted { roster, sync } | ConnectOutcome::Joined { roster, sync } => {
            print_members(&roster);
            if let Some(report) = sync {
                println!(
                    "Records synced: {} copied, {} unchanged, {} conflicts",
                    report.copied, report.unchanged, report.conflicts
                );
            }
        }
        ConnectOutcome::Reconnected { .. } => {}
        ConnectOutcome::Declined => println!("Not joined."),
        ConnectOutcome::Cancelled => println!("Cancelled."),
        ConnectOutcome::Aborted => println!("Folder left unchanged."),
    }
    Ok(())
}

async fn handle_roster(config: &Config, args: &FolderArgs) -> anyhow::Result<()> {
    let folder = LocalFolder::open(&args.dir).await?;
    let store = RosterStore::from_config(config);

    let Some(roster) = store.read(&folder).await? else {
        bail!("{} is not a team folder", args.dir.display());
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&roster)?);
    } else {
        print_members(&roster);
    }
    Ok(())
}

fn print_members(roster: &TeamRoster) {
    println!(
        "{} members ({} active), revision {}",
        roster.member_count(),
        roster.active_count(),
        roster.revision
    );
    for member in &roster.users {
        println!(
            "  {:<24} {:<10} last active {}{}",
            member.name,
            member.role.to_string(),
            member.last_active.format("%Y-%m-%d %H:%M"),
            if member.is_creator { " (creator)" } else { "" }
        );
    }
}

async fn handle_repair(config: &Config, cmd: &RepairCommand) -> anyhow::Result<()> {
    let folder = LocalFolder::open(&cmd.dir).await?;
    let store = RosterStore::from_config(config);

    match store.load(&folder).await? {
        RosterLoad::Corrupted { message } => {
            println!("Roster is unreadable: {message}");
            if !cmd.yes {
                println!("Use --yes to move it aside. The folder can then be converted into a new team.");
                return Ok(());
            }
            if let Some(backup) = store.backup_corrupted(&folder).await? {
                println!("Moved roster to {backup}");
            }
        }
        RosterLoad::Loaded { roster, .. } => {
            println!("Roster is readable ({} members); nothing to repair.", roster.member_count());
        }
        RosterLoad::Missing => println!("No roster in {}; nothing to repair.", cmd.dir.display()),
    }
    Ok(())
}

fn handle_config(config_path: Option<std::path::PathBuf>, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            let config = Config::load_from(config_path)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Identity]");
                println!("  Path:               {}", config.identity_path().display());
                println!();
                println!("[Folders]");
                println!("  Metadata dir:       {}", config.folders.metadata_dir);
                println!("  Roster file:        {}", config.folders.roster_file);
                println!(
                    "  Record dirs:        {}",
                    config.folders.domain_subfolders.join(", ")
                );
                println!();
                println!("[Roster]");
                println!("  Merge on write:     {}", config.roster.merge_on_write);
                println!("  Write attempts:     {}", config.roster.max_write_attempts);
                println!("  Retry backoff (ms): {}", config.roster.retry_backoff_ms);
                println!("  Lenient parse:      {}", config.roster.lenient_parse);
                println!("  New member role:    {}", config.roster.default_member_role);
                println!();
                println!("[Sync]");
                println!("  Enabled:            {}", config.sync.enabled);
                if let Some(dir) = &config.sync.local_records_dir {
                    println!("  Local records:      {}", dir.display());
                }
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file
                .or(config_path)
                .unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
