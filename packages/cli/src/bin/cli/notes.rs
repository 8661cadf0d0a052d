// ABOUTME: CLI commands for free-form notes
// ABOUTME: Writes a note (prompting when no text is given) and lists notes

use carnet_journal::Journal;
use clap::Subcommand;
use colored::*;
use inquire::Text;
use tracing::warn;

use super::utils::{format_timestamp, Output};

#[derive(Subcommand)]
pub enum NoteCommands {
    /// Write a note
    Add {
        /// Note text; prompted for when omitted
        content: Option<String>,
    },
    /// Show notes, newest first
    List,
}

pub async fn handle_note_command(
    journal: &Journal,
    output: &Output,
    command: NoteCommands,
) -> anyhow::Result<()> {
    match command {
        NoteCommands::Add { content } => add_note(journal, output, content).await,
        NoteCommands::List => list_notes(journal, output).await,
    }
}

async fn add_note(
    journal: &Journal,
    output: &Output,
    content: Option<String>,
) -> anyhow::Result<()> {
    let content = match content {
        Some(content) => content,
        None => Text::new("Your note:").prompt()?,
    };

    let report = journal.startup_backup().await;
    if !report.success {
        warn!(
            "Automatic backup skipped: {}",
            report.error.as_deref().unwrap_or("unknown error")
        );
    }

    let safety = journal.screen_message(&content);
    let id = journal.add_note(&content).await?;

    if output.is_json() {
        return output.print_json(&serde_json::json!({ "id": id, "safety_message": safety }));
    }

    println!("{}", "Note saved".green());
    if let Some(message) = safety {
        println!();
        println!("{}", message.yellow().bold());
    }
    Ok(())
}

async fn list_notes(journal: &Journal, output: &Output) -> anyhow::Result<()> {
    let notes = journal.notes().await?;

    if output.is_json() {
        return output.print_json(&notes);
    }

    if notes.is_empty() {
        println!("{}", "No notes yet".yellow());
        return Ok(());
    }

    for note in &notes {
        println!("{}", format_timestamp(&note.created_at).cyan().bold());
        println!("{}", note.content);
        println!();
    }
    println!("Total: {} notes", notes.len().to_string().cyan());
    Ok(())
}
