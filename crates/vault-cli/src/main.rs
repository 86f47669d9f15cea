//! DBA Vault CLI - manage encrypted password databases from the terminal
//!
//! Every command works on the storage directory shared with other front ends.
//! Passwords come from `--password` / `DBA_VAULT_PASSWORD` or an interactive prompt.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// DBA Vault - encrypted multi-database password manager
#[derive(Parser, Debug)]
#[command(name = "dba-vault")]
#[command(author = "Symbia Labs")]
#[command(version)]
#[command(about = "DBA Vault - encrypted multi-database password manager")]
struct Args {
    /// Storage directory (defaults to the platform data directory)
    #[arg(long, global = true, env = "DBA_VAULT_DIR")]
    dir: Option<PathBuf>,

    /// Database password; prompted for when absent
    #[arg(long, global = true, env = "DBA_VAULT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List databases in the storage directory
    List,
    /// Create a new, empty database
    Create { name: String },
    /// Show the records of a database (defaults to the last one opened)
    Show {
        name: Option<String>,
        /// Print record passwords too
        #[arg(long)]
        reveal: bool,
    },
    /// Add or replace a record
    Put {
        name: String,
        key: String,
        #[arg(long, default_value = "")]
        username: String,
        #[arg(long, default_value = "")]
        email: String,
        /// Record password; prompted for when absent
        #[arg(long)]
        secret: Option<String>,
        #[arg(long, default_value = "")]
        comment: String,
        /// Use the email address as login
        #[arg(long)]
        copy_email: bool,
        /// Files to attach to the record
        #[arg(long = "attach")]
        attachments: Vec<PathBuf>,
    },
    /// Remove a record
    Remove { name: String, key: String },
    /// Rename a database
    Rename { name: String, new_name: String },
    /// Change the password of a database
    Passwd { name: String },
    /// Delete a database
    Delete {
        name: String,
        /// Do not ask for confirmation
        #[arg(long)]
        yes: bool,
    },
    /// Copy a database file out of storage
    Export {
        name: String,
        /// File or directory; defaults to the configured export directory
        destination: Option<PathBuf>,
    },
    /// Copy an external .dba file into storage
    Import { file: PathBuf },
    /// Install a database from a legacy .db/.bin archive
    ImportLegacy { archive: PathBuf },
    /// Show or change settings
    Config {
        /// Default export directory
        #[arg(long, conflicts_with = "clear_export_dir")]
        export_dir: Option<PathBuf>,
        #[arg(long)]
        clear_export_dir: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let mut app = commands::App::load(args.dir, args.password).await?;

    match args.command {
        Command::List => app.list().await,
        Command::Create { name } => app.create(name).await,
        Command::Show { name, reveal } => app.show(name, reveal).await,
        Command::Put {
            name,
            key,
            username,
            email,
            secret,
            comment,
            copy_email,
            attachments,
        } => {
            let entry = commands::NewRecord {
                key,
                username,
                email,
                secret,
                comment,
                copy_email,
                attachments,
            };
            app.put(name, entry).await
        }
        Command::Remove { name, key } => app.remove(name, key).await,
        Command::Rename { name, new_name } => app.rename(name, new_name).await,
        Command::Passwd { name } => app.passwd(name).await,
        Command::Delete { name, yes } => app.delete(name, yes).await,
        Command::Export { name, destination } => app.export(name, destination).await,
        Command::Import { file } => app.import(file).await,
        Command::ImportLegacy { archive } => app.import_legacy(archive).await,
        Command::Config {
            export_dir,
            clear_export_dir,
        } => app.config(export_dir, clear_export_dir).await,
    }
}
