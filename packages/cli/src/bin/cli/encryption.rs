// ABOUTME: CLI commands for at-rest encryption of notes
// ABOUTME: Status, enable and disable with backups and per-row diagnostics

use carnet_journal::Journal;
use carnet_security::{EncryptionState, ToggleReport};
use clap::Subcommand;
use colored::*;

use super::utils::{confirm, print_cancelled, Output};

#[derive(Subcommand)]
pub enum EncryptionCommands {
    /// Show whether notes are encrypted and where the key lives
    Status,
    /// Encrypt all existing notes and every future note
    Enable {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Decrypt all notes and store them in plain text again
    Disable {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

pub async fn handle_encryption_command(
    journal: &Journal,
    output: &Output,
    command: EncryptionCommands,
) -> anyhow::Result<()> {
    match command {
        EncryptionCommands::Status => status_command(journal, output),
        EncryptionCommands::Enable { yes } => enable_command(journal, output, yes).await,
        EncryptionCommands::Disable { yes } => disable_command(journal, output, yes).await,
    }
}

fn status_command(journal: &Journal, output: &Output) -> anyhow::Result<()> {
    let status = journal.encryption().status();

    if output.is_json() {
        return output.print_json(&status);
    }

    println!("{}", "Encryption Status".bold().cyan());
    println!();
    match status.state {
        EncryptionState::Enabled => {
            println!("{:<10} {}", "State:".cyan(), "enabled".green().bold())
        }
        EncryptionState::Disabled => {
            println!("{:<10} {}", "State:".cyan(), "disabled".yellow())
        }
    }
    let key_note = if status.key_present {
        "".normal()
    } else {
        " (not generated yet)".dimmed()
    };
    println!("{:<10} {}{}", "Key:".cyan(), status.key_path.display(), key_note);

    if status.state == EncryptionState::Enabled {
        println!();
        println!("{}", "⚠ Keep a copy of the key file somewhere safe.".yellow().bold());
        println!("  Without it, encrypted notes cannot be recovered.");
    }
    Ok(())
}

async fn enable_command(journal: &Journal, output: &Output, yes: bool) -> anyhow::Result<()> {
    if journal.encryption().is_enabled() {
        anyhow::bail!("Encryption is already enabled");
    }

    if !output.is_json() {
        println!("{}", "⚠ ENCRYPTION WARNING:".yellow().bold());
        println!("  • A backup is taken before any note is changed");
        println!("  • Notes become unreadable without the key file");
        println!(
            "  • Key file: {}",
            journal.config().key_path.display().to_string().yellow()
        );
        println!();
    }
    if !confirm("Encrypt all notes now?", yes)? {
        print_cancelled();
        return Ok(());
    }

    let report = journal.encryption().enable().await;
    print_report(output, &report, "encrypted")
}

async fn disable_command(journal: &Journal, output: &Output, yes: bool) -> anyhow::Result<()> {
    if !journal.encryption().is_enabled() {
        anyhow::bail!("Encryption is not enabled");
    }

    if !output.is_json() {
        println!("{}", "⚠ Notes will be stored in plain text.".yellow().bold());
        println!();
    }
    if !confirm("Decrypt all notes now?", yes)? {
        print_cancelled();
        return Ok(());
    }

    let report = journal.encryption().disable().await;
    print_report(output, &report, "decrypted")
}

fn print_report(output: &Output, report: &ToggleReport, verb: &str) -> anyhow::Result<()> {
    if output.is_json() {
        output.print_json(report)?;
    } else if report.success {
        let counts = report
            .migrated_records
            .or(report.decrypted_records)
            .unwrap_or_default();
        println!(
            "{} {} mood note(s) and {} note(s) {}",
            "✓".green().bold(),
            counts.mood_notes,
            counts.notes,
            verb
        );
        if let Some(path) = &report.backup_path {
            println!("  Backup: {}", path);
        }
        for batch in &report.batches {
            if !batch.skipped.is_empty() {
                println!(
                    "  {} {}: {} row(s) already in place",
                    "•".dimmed(),
                    batch.column,
                    batch.skipped.len()
                );
            }
            for failure in &batch.failed {
                println!(
                    "  {} {} row {} left unchanged: {}",
                    "✗".red(),
                    batch.column,
                    failure.id,
                    failure.reason
                );
            }
        }
    }

    if !report.success {
        anyhow::bail!(
            "{}",
            report.error.clone().unwrap_or_else(|| "unknown error".to_string())
        );
    }
    Ok(())
}
