// ABOUTME: CLI commands for database backups
// ABOUTME: Create, list, inspect, restore, delete, prune and automatic backups

use carnet_journal::Journal;
use carnet_storage::{BackupInfo, MANUAL_BACKUP_PREFIX};
use clap::Subcommand;
use colored::*;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, ContentArrangement, Table};

use super::utils::{confirm, print_cancelled, resolve_backup_path, Output};

#[derive(Subcommand)]
pub enum BackupCommands {
    /// Back up the journal database now
    Create {
        /// Artifact name prefix
        #[arg(short, long, default_value = MANUAL_BACKUP_PREFIX)]
        prefix: String,
    },
    /// List backups, newest first
    List,
    /// Show details of one backup
    Info {
        /// Backup file name or path
        backup: String,
    },
    /// Replace the journal database with a backup
    Restore {
        /// Backup file name or path
        backup: String,
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Delete one backup
    Delete {
        /// Backup file name or path
        backup: String,
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Delete all but the newest backups
    Clean {
        /// Backups to keep (defaults to the configured retention)
        #[arg(short, long)]
        keep: Option<usize>,
    },
    /// Take an automatic backup and apply retention
    Auto,
}

pub async fn handle_backup_command(
    journal: &Journal,
    output: &Output,
    command: BackupCommands,
) -> anyhow::Result<()> {
    match command {
        BackupCommands::Create { prefix } => create_backup(journal, output, &prefix).await,
        BackupCommands::List => list_backups(journal, output).await,
        BackupCommands::Info { backup } => backup_info(journal, output, &backup).await,
        BackupCommands::Restore { backup, yes } => {
            restore_backup(journal, output, &backup, yes).await
        }
        BackupCommands::Delete { backup, yes } => {
            delete_backup(journal, output, &backup, yes).await
        }
        BackupCommands::Clean { keep } => {
            let keep = keep.unwrap_or(journal.config().backup_keep_count);
            clean_backups(journal, output, keep).await
        }
        BackupCommands::Auto => auto_backup(journal, output).await,
    }
}

async fn create_backup(journal: &Journal, output: &Output, prefix: &str) -> anyhow::Result<()> {
    let path = journal.backups().create_backup(prefix).await?;

    if output.is_json() {
        return output.print_json(&serde_json::json!({ "backup_path": path }));
    }

    println!("{} {}", "Backup created:".green(), path.display());
    Ok(())
}

async fn list_backups(journal: &Journal, output: &Output) -> anyhow::Result<()> {
    let backups = journal.backups().list_backups().await?;

    if output.is_json() {
        return output.print_json(&backups);
    }

    if backups.is_empty() {
        println!("{}", "No backups found".yellow());
        println!("{}", "Use 'carnet backup create' to make one".dimmed());
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec!["Name", "Created", "Size (MB)"]);

    for backup in &backups {
        table.add_row(vec![
            backup.name.clone(),
            backup.created_display(),
            format!("{:.2}", backup.size_mb),
        ]);
    }

    println!("{}", table);
    println!(
        "Total: {} backups in {}",
        backups.len().to_string().cyan(),
        journal.backups().backup_dir().display()
    );
    Ok(())
}

async fn backup_info(journal: &Journal, output: &Output, backup: &str) -> anyhow::Result<()> {
    let path = resolve_backup_path(journal.backups().backup_dir(), backup);
    let info = journal
        .backups()
        .backup_info(&path)
        .await
        .ok_or_else(|| anyhow::anyhow!("Backup not found: {}", path.display()))?;

    if output.is_json() {
        return output.print_json(&info);
    }

    print_backup_details(&info);
    Ok(())
}

fn print_backup_details(info: &BackupInfo) {
    println!("{:<12} {}", "Name:".cyan(), info.name);
    println!("{:<12} {}", "Path:".cyan(), info.path.display());
    println!("{:<12} {}", "Created:".cyan(), info.created_display());
    println!(
        "{:<12} {} bytes ({:.2} MB)",
        "Size:".cyan(),
        info.size_bytes,
        info.size_mb
    );
}

async fn restore_backup(
    journal: &Journal,
    output: &Output,
    backup: &str,
    yes: bool,
) -> anyhow::Result<()> {
    let path = resolve_backup_path(journal.backups().backup_dir(), backup);

    if !output.is_json() {
        println!(
            "{}",
            "Restoring replaces the current journal. A safety backup is taken first."
                .yellow()
        );
    }
    if !confirm(&format!("Restore {}?", path.display()), yes)? {
        print_cancelled();
        return Ok(());
    }

    journal.backups().restore_backup(&path).await?;

    if output.is_json() {
        return output.print_json(&serde_json::json!({ "restored_from": path }));
    }

    println!("{} {}", "Journal restored from".green(), path.display());
    Ok(())
}

async fn delete_backup(
    journal: &Journal,
    output: &Output,
    backup: &str,
    yes: bool,
) -> anyhow::Result<()> {
    let path = resolve_backup_path(journal.backups().backup_dir(), backup);

    if !confirm(&format!("Delete {}?", path.display()), yes)? {
        print_cancelled();
        return Ok(());
    }

    journal.backups().delete_backup(&path).await?;

    if output.is_json() {
        return output.print_json(&serde_json::json!({ "deleted": path }));
    }

    println!("{} {}", "Backup deleted:".green(), path.display());
    Ok(())
}

async fn clean_backups(journal: &Journal, output: &Output, keep: usize) -> anyhow::Result<()> {
    let deleted = journal.backups().clean_old_backups(keep).await?;

    if output.is_json() {
        return output.print_json(&serde_json::json!({ "deleted_old_backups": deleted }));
    }

    println!(
        "{} {} old backup(s) deleted, keeping {}",
        "Done:".green(),
        deleted,
        keep
    );
    Ok(())
}

async fn auto_backup(journal: &Journal, output: &Output) -> anyhow::Result<()> {
    let report = journal.startup_backup().await;

    if output.is_json() {
        return output.print_json(&report);
    }

    if !report.success {
        anyhow::bail!(
            "Automatic backup failed: {}",
            report.error.unwrap_or_default()
        );
    }

    println!(
        "{} {}",
        "Backup created:".green(),
        report.backup_path.unwrap_or_default()
    );
    println!(
        "{} old backup(s) deleted, {} kept",
        report.deleted_old_backups, report.total_backups
    );
    Ok(())
}
