//! Shared CLI helpers — path expansion, banner, status marks.

use std::path::PathBuf;

use colored::Colorize;

/// Expand `~` at the start of a path to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_next::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs_next::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

/// Print the banner shown when the gateway starts.
pub fn print_banner() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        "{}  v{}",
        "⚔ Leonidas".cyan().bold(),
        version.dimmed()
    );
}

/// `✓` when present, a red note otherwise.
pub fn presence(ok: bool, missing: &str) -> String {
    if ok {
        "✓".green().to_string()
    } else {
        format!("({missing})").red().to_string()
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
