//! Utility helpers — path resolution, identifiers, string manipulation.

use std::path::PathBuf;

use uuid::Uuid;

/// Get the Leonidas data directory (e.g. `~/.leonidas/`).
pub fn get_data_path() -> PathBuf {
    let home = home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".leonidas")
}

/// Generate an opaque session identifier (UUID v4, hyphenated).
///
/// Used for env-file records and discussion thread names.
pub fn generate_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// Whether `s` looks like an identifier produced by [`generate_session_id`].
pub fn is_session_id(s: &str) -> bool {
    Uuid::parse_str(s)
        .map(|u| u.get_version_num() == 4 && s.len() == 36)
        .unwrap_or(false)
}

/// Mask a secret for display, keeping the first four characters.
pub fn mask_secret(s: &str) -> String {
    let count = s.chars().count();
    if count <= 4 {
        return "*".repeat(count);
    }
    let head: String = s.chars().take(4).collect();
    format!("{head}{}", "*".repeat(count - 4))
}

/// Expand `~` to the home directory in a path string.
pub fn expand_home(path: &str) -> PathBuf {
    if path.starts_with("~/") || path == "~" {
        let home = home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(path.get(2..).unwrap_or(""))
    } else {
        PathBuf::from(path)
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| std::env::var("USERPROFILE").ok().map(PathBuf::from))
}
