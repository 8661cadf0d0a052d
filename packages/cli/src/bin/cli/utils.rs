// ABOUTME: Shared helpers for CLI commands
// ABOUTME: JSON/human output switch, confirmations, backup path resolution, text shaping

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use colored::*;
use inquire::Confirm;
use serde::Serialize;

/// Chooses between JSON and human-readable output
pub struct Output {
    json: bool,
}

impl Output {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    pub fn is_json(&self) -> bool {
        self.json
    }

    pub fn print_json<T: Serialize>(&self, value: &T) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

/// Ask for confirmation unless `skip` is set
pub fn confirm(prompt: &str, skip: bool) -> anyhow::Result<bool> {
    if skip {
        return Ok(true);
    }
    Ok(Confirm::new(prompt).with_default(false).prompt()?)
}

pub fn print_cancelled() {
    println!("{}", "Operation cancelled".yellow());
}

/// Accept either a path or a bare artifact name from the backup directory
pub fn resolve_backup_path(backup_dir: &Path, arg: &str) -> PathBuf {
    let path = PathBuf::from(arg);
    if path.components().count() == 1 && !path.exists() {
        backup_dir.join(path)
    } else {
        path
    }
}

pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M")
        .to_string()
}

/// Shorten to `max_chars` characters, ending with an ellipsis
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
