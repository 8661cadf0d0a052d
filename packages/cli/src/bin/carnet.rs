use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use std::process;

mod cli;

use carnet_core::CarnetConfig;
use carnet_journal::Journal;
use cli::backup::BackupCommands;
use cli::encryption::EncryptionCommands;
use cli::mood::MoodCommands;
use cli::notes::NoteCommands;

#[derive(Parser)]
#[command(name = "carnet")]
#[command(about = "Carnet - private wellness journal")]
#[command(version)]
struct Cli {
    /// Data directory (overrides CARNET_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record and review mood entries
    #[command(subcommand)]
    Mood(MoodCommands),
    /// Write and read free-form notes
    #[command(subcommand)]
    Note(NoteCommands),
    /// Manage database backups
    #[command(subcommand)]
    Backup(BackupCommands),
    /// Manage at-rest encryption of notes
    #[command(subcommand)]
    Encryption(EncryptionCommands),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = CarnetConfig::from_env()?;
    if let Some(data_dir) = cli.data_dir {
        let keep_count = config.backup_keep_count;
        let enable_wal = config.enable_wal;
        config = CarnetConfig::with_data_dir(data_dir);
        config.backup_keep_count = keep_count;
        config.enable_wal = enable_wal;
    }

    let journal = Journal::open(config).await?;
    let output = cli::utils::Output::new(cli.json);

    let result = match cli.command {
        Commands::Mood(command) => {
            cli::mood::handle_mood_command(&journal, &output, command).await
        }
        Commands::Note(command) => {
            cli::notes::handle_note_command(&journal, &output, command).await
        }
        Commands::Backup(command) => {
            cli::backup::handle_backup_command(&journal, &output, command).await
        }
        Commands::Encryption(command) => {
            cli::encryption::handle_encryption_command(&journal, &output, command).await
        }
    };

    journal.close().await;
    result
}
