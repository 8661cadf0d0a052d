// ABOUTME: CLI commands for mood entries
// ABOUTME: Records a mood with optional notes and lists the history

use carnet_journal::{Journal, MoodCreateInput};
use clap::Subcommand;
use colored::*;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, ContentArrangement, Table};
use tracing::warn;

use super::utils::{format_timestamp, truncate, Output};

#[derive(Subcommand)]
pub enum MoodCommands {
    /// Record how you feel right now
    Add {
        /// Mood from 1 (very low) to 10 (excellent)
        #[arg(short, long)]
        value: i64,
        /// Main emotion
        #[arg(short, long)]
        emotion: Option<String>,
        /// Motivation level or context
        #[arg(short, long)]
        motivation: Option<String>,
        /// Comma-separated tags
        #[arg(short, long, value_delimiter = ',')]
        tags: Vec<String>,
        /// Free-text notes
        #[arg(short, long)]
        notes: Option<String>,
    },
    /// Show recorded moods, newest first
    List,
}

pub async fn handle_mood_command(
    journal: &Journal,
    output: &Output,
    command: MoodCommands,
) -> anyhow::Result<()> {
    match command {
        MoodCommands::Add {
            value,
            emotion,
            motivation,
            tags,
            notes,
        } => {
            add_mood(
                journal,
                output,
                MoodCreateInput {
                    mood_value: value,
                    emotion,
                    motivation,
                    tags,
                    notes,
                },
            )
            .await
        }
        MoodCommands::List => list_moods(journal, output).await,
    }
}

async fn add_mood(
    journal: &Journal,
    output: &Output,
    input: MoodCreateInput,
) -> anyhow::Result<()> {
    let report = journal.startup_backup().await;
    if !report.success {
        warn!(
            "Automatic backup skipped: {}",
            report.error.as_deref().unwrap_or("unknown error")
        );
    }

    let safety = input
        .notes
        .as_deref()
        .and_then(|notes| journal.screen_message(notes));

    let id = journal.save_mood(input).await?;

    if output.is_json() {
        return output.print_json(&serde_json::json!({ "id": id, "safety_message": safety }));
    }

    println!("{}", "Mood saved".green());
    if let Some(message) = safety {
        println!();
        println!("{}", message.yellow().bold());
    }
    Ok(())
}

async fn list_moods(journal: &Journal, output: &Output) -> anyhow::Result<()> {
    let entries = journal.mood_history().await?;

    if output.is_json() {
        return output.print_json(&entries);
    }

    if entries.is_empty() {
        println!("{}", "No mood entries yet".yellow());
        println!("{}", "Use 'carnet mood add --value 7' to record one".dimmed());
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec!["Date", "Mood", "Emotion", "Motivation", "Tags", "Notes"]);

    for entry in &entries {
        table.add_row(vec![
            format_timestamp(&entry.created_at),
            format!("{}/10", entry.mood_value),
            entry.emotion.clone().unwrap_or_default(),
            entry.motivation.clone().unwrap_or_default(),
            entry.tags.join(", "),
            truncate(&entry.notes, 40),
        ]);
    }

    println!("{}", table);
    println!("Total: {} entries", entries.len().to_string().cyan());
    Ok(())
}
