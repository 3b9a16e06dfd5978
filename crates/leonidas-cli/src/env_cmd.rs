//! `leonidas env` — inspect or roll back credential records.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;

use leonidas_bot::configurator::undo_last_record;
use leonidas_core::config::load_config;
use leonidas_core::envfile::{EnvFileStore, SessionEnv};
use leonidas_core::utils::mask_secret;

use crate::helpers;

#[derive(Subcommand)]
pub enum EnvCommands {
    /// List credential records (secrets masked)
    Show {
        /// Env file to read (defaults to `agent.envFile`)
        #[arg(short, long)]
        file: Option<String>,
    },
    /// Remove the most recent credential record
    Undo {
        /// Env file to edit (defaults to `agent.envFile`)
        #[arg(short, long)]
        file: Option<String>,
    },
}

pub async fn dispatch(action: EnvCommands) -> Result<()> {
    match action {
        EnvCommands::Show { file } => show(&resolve_path(file.as_deref())).await,
        EnvCommands::Undo { file } => undo(&resolve_path(file.as_deref())).await,
    }
}

fn resolve_path(file: Option<&str>) -> PathBuf {
    match file {
        Some(path) => helpers::expand_tilde(path),
        None => load_config(None).agent.env_file_path(),
    }
}

async fn show(path: &Path) -> Result<()> {
    let store = EnvFileStore::new(path);
    let records = store
        .records()
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;

    println!();
    println!("  {} {}", "Env file:".bold(), path.display());
    if records.is_empty() {
        println!("  {}", "(no credential records)".dimmed());
    }
    for (i, record) in records.iter().enumerate() {
        println!(
            "  {:>3}. {}  {}",
            i + 1,
            mask_secret(&record.api_key),
            record.session_id.dimmed()
        );
    }
    println!();
    Ok(())
}

async fn undo(path: &Path) -> Result<()> {
    let store = EnvFileStore::new(path);
    let message = undo_last_record(&store, &SessionEnv::new())
        .await
        .with_context(|| format!("failed to edit {}", path.display()))?;
    println!("  {} {}", "✓".green(), message);
    Ok(())
}
