//! Env-file credential store.
//!
//! File format: plain `KEY=VALUE` lines, appended only. Each configuration
//! produces one record of two lines:
//!
//! ```text
//! OPENAI_API_KEY=sk-...
//! TERMINAL_THREAD_ID=6f1c2a9e-...
//! ```
//!
//! Appends and the undo rewrite hold the store's writer lock, and a record is
//! written with a single `write_all`, so concurrent configurations never
//! interleave their lines.

use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::BridgeResult;
use crate::utils;

/// Key holding the user's API credential.
pub const API_KEY_VAR: &str = "OPENAI_API_KEY";

/// Key holding the generated session identifier.
pub const SESSION_ID_VAR: &str = "TERMINAL_THREAD_ID";

// ─────────────────────────────────────────────
// CredentialRecord
// ─────────────────────────────────────────────

/// One configuration event: a secret plus a fresh session identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialRecord {
    pub api_key: String,
    pub session_id: String,
}

impl CredentialRecord {
    /// Build a record with a newly generated session identifier.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            session_id: utils::generate_session_id(),
        }
    }

    /// The record as it is written to disk (two lines, trailing newline).
    pub fn to_lines(&self) -> String {
        format!(
            "{API_KEY_VAR}={}\n{SESSION_ID_VAR}={}\n",
            self.api_key, self.session_id
        )
    }

    /// The record as key/value pairs.
    pub fn vars(&self) -> [(&'static str, &str); 2] {
        [
            (API_KEY_VAR, self.api_key.as_str()),
            (SESSION_ID_VAR, self.session_id.as_str()),
        ]
    }
}

/// Lines dropped by [`EnvFileStore::remove_last_record`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemovedLines(pub Vec<String>);

// ─────────────────────────────────────────────
// EnvFileStore
// ─────────────────────────────────────────────

/// Append-only `KEY=VALUE` file with a single-writer lock.
pub struct EnvFileStore {
    path: PathBuf,
    writer: Mutex<()>,
}

impl EnvFileStore {
    /// Create a store for `path`. The file is created on first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: Mutex::new(()),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record.
    pub async fn append(&self, record: &CredentialRecord) -> BridgeResult<()> {
        let _guard = self.writer.lock().await;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .await?;

        // Start the record on a fresh line even if the file lacks a final newline
        let needs_newline = if file.metadata().await?.len() == 0 {
            false
        } else {
            file.seek(SeekFrom::End(-1)).await?;
            let mut last = [0u8; 1];
            file.read_exact(&mut last).await?;
            last[0] != b'\n'
        };

        let mut buf = String::new();
        if needs_newline {
            buf.push('\n');
        }
        buf.push_str(&record.to_lines());

        file.write_all(buf.as_bytes()).await?;
        file.flush().await?;

        info!(
            path = %self.path.display(),
            session_id = %record.session_id,
            "appended credential record"
        );
        Ok(())
    }

    /// Remove the most recent record.
    ///
    /// If the file ends with a complete record (`OPENAI_API_KEY` followed by
    /// `TERMINAL_THREAD_ID`) both lines go; otherwise only the last line.
    /// Returns `None` when there was nothing to remove.
    pub async fn remove_last_record(&self) -> BridgeResult<Option<RemovedLines>> {
        let _guard = self.writer.lock().await;

        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut lines: Vec<&str> = content.lines().collect();
        if lines.is_empty() {
            return Ok(None);
        }

        let n = lines.len();
        let drop = if n >= 2
            && lines[n - 1].starts_with(&format!("{SESSION_ID_VAR}="))
            && lines[n - 2].starts_with(&format!("{API_KEY_VAR}="))
        {
            2
        } else {
            1
        };

        let removed: Vec<String> = lines.split_off(n - drop).into_iter().map(String::from).collect();

        let mut rewritten = lines.join("\n");
        if !rewritten.is_empty() {
            rewritten.push('\n');
        }
        tokio::fs::write(&self.path, rewritten).await?;

        debug!(path = %self.path.display(), removed = removed.len(), "removed trailing lines");
        Ok(Some(RemovedLines(removed)))
    }

    /// All complete records, oldest first.
    pub async fn records(&self) -> BridgeResult<Vec<CredentialRecord>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(parse_records(&content))
    }

    /// The newest complete record, if any.
    pub async fn last_record(&self) -> BridgeResult<Option<CredentialRecord>> {
        Ok(self.records().await?.pop())
    }
}

/// Pair up `OPENAI_API_KEY` lines with the `TERMINAL_THREAD_ID` line that follows.
fn parse_records(content: &str) -> Vec<CredentialRecord> {
    let mut records = Vec::new();
    let mut pending: Option<String> = None;

    for line in content.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match key.trim() {
            API_KEY_VAR => pending = Some(value.to_string()),
            SESSION_ID_VAR => {
                if let Some(api_key) = pending.take() {
                    records.push(CredentialRecord {
                        api_key,
                        session_id: value.to_string(),
                    });
                }
            }
            _ => {}
        }
    }

    records
}

// ─────────────────────────────────────────────
// SessionEnv
// ─────────────────────────────────────────────

/// In-process mirror of the latest credential record.
///
/// Shared by the dispatcher and its workers instead of mutating the OS
/// environment from concurrent tasks. The container launcher exports these
/// values to the child explicitly.
#[derive(Clone, Default)]
pub struct SessionEnv {
    vars: Arc<RwLock<HashMap<String, String>>>,
}

impl SessionEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirror a record's values, replacing older ones.
    pub fn apply(&self, record: &CredentialRecord) {
        let mut vars = self.vars.write().unwrap_or_else(|e| e.into_inner());
        for (key, value) in record.vars() {
            vars.insert(key.to_string(), value.to_string());
        }
    }

    /// Reset to `record`, or clear when there is none.
    pub fn reset_to(&self, record: Option<&CredentialRecord>) {
        {
            let mut vars = self.vars.write().unwrap_or_else(|e| e.into_inner());
            vars.remove(API_KEY_VAR);
            vars.remove(SESSION_ID_VAR);
        }
        if let Some(r) = record {
            self.apply(r);
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let vars = self.vars.read().unwrap_or_else(|e| e.into_inner());
        vars.get(key).cloned()
    }

    /// Sorted copy of all values.
    pub fn snapshot(&self) -> Vec<(String, String)> {
        let vars = self.vars.read().unwrap_or_else(|e| e.into_inner());
        let mut pairs: Vec<(String, String)> =
            vars.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        pairs.sort();
        pairs
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn store_in(dir: &tempfile::TempDir) -> EnvFileStore {
        EnvFileStore::new(dir.path().join("agent").join(".env"))
    }

    #[test]
    fn test_record_lines() {
        let record = CredentialRecord {
            api_key: "sk-test123".into(),
            session_id: "abc".into(),
        };
        assert_eq!(
            record.to_lines(),
            "OPENAI_API_KEY=sk-test123\nTERMINAL_THREAD_ID=abc\n"
        );
    }

    #[test]
    fn test_new_record_has_session_id() {
        let record = CredentialRecord::new("sk-x");
        assert!(utils::is_session_id(&record.session_id));
    }

    #[tokio::test]
    async fn test_append_creates_file_and_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let record = CredentialRecord::new("sk-test123");
        store.append(&record).await.unwrap();

        let content = std::fs::read_to_string(store.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "OPENAI_API_KEY=sk-test123");
        let id = lines[1].strip_prefix("TERMINAL_THREAD_ID=").unwrap();
        assert!(utils::is_session_id(id));
    }

    #[tokio::test]
    async fn test_append_preserves_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "EXISTING=1").unwrap();
        let store = EnvFileStore::new(&path);

        store.append(&CredentialRecord::new("sk-a")).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "EXISTING=1");
        assert_eq!(lines[1], "OPENAI_API_KEY=sk-a");
        assert_eq!(lines.len(), 3);
    }

    #[tokio::test]
    async fn test_append_after_large_unterminated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        let mut existing = "PADDING=".to_string();
        existing.push_str(&"x".repeat(256 * 1024));
        std::fs::write(&path, &existing).unwrap();
        let store = EnvFileStore::new(&path);

        store.append(&CredentialRecord::new("sk-big")).await.unwrap();
        store.append(&CredentialRecord::new("sk-next")).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with(&existing));
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[1], "OPENAI_API_KEY=sk-big");
        assert_eq!(lines[3], "OPENAI_API_KEY=sk-next");
    }

    #[tokio::test]
    async fn test_repeated_appends_accumulate() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        store.append(&CredentialRecord::new("sk-1")).await.unwrap();
        store.append(&CredentialRecord::new("sk-2")).await.unwrap();

        let records = store.records().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].api_key, "sk-1");
        assert_eq!(records[1].api_key, "sk-2");
        assert_ne!(records[0].session_id, records[1].session_id);
    }

    #[tokio::test]
    async fn test_concurrent_appends_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(store_in(&dir));

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .append(&CredentialRecord::new(format!("sk-{i}")))
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let content = std::fs::read_to_string(store.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 32);
        for pair in lines.chunks(2) {
            assert!(pair[0].starts_with("OPENAI_API_KEY=sk-"));
            assert!(pair[1].starts_with("TERMINAL_THREAD_ID="));
        }
        assert_eq!(store.records().await.unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_remove_last_record_drops_pair() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.append(&CredentialRecord::new("sk-1")).await.unwrap();
        store.append(&CredentialRecord::new("sk-2")).await.unwrap();

        let removed = store.remove_last_record().await.unwrap().unwrap();
        assert_eq!(removed.0.len(), 2);
        assert_eq!(removed.0[0], "OPENAI_API_KEY=sk-2");

        let last = store.last_record().await.unwrap().unwrap();
        assert_eq!(last.api_key, "sk-1");
    }

    #[tokio::test]
    async fn test_remove_last_record_single_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "A=1\nB=2\n").unwrap();
        let store = EnvFileStore::new(&path);

        let removed = store.remove_last_record().await.unwrap().unwrap();
        assert_eq!(removed.0, vec!["B=2".to_string()]);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "A=1\n");
    }

    #[tokio::test]
    async fn test_remove_last_record_empty_or_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.remove_last_record().await.unwrap().is_none());

        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "").unwrap();
        assert!(store.remove_last_record().await.unwrap().is_none());
    }

    #[test]
    fn test_parse_records_skips_orphans() {
        let content = "TERMINAL_THREAD_ID=orphan\n# comment\nOPENAI_API_KEY=k1\nOTHER=x\nTERMINAL_THREAD_ID=t1\n";
        let records = parse_records(content);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].api_key, "k1");
        assert_eq!(records[0].session_id, "t1");
    }

    #[test]
    fn test_session_env_apply_and_reset() {
        let env = SessionEnv::new();
        let r1 = CredentialRecord::new("sk-test123");
        env.apply(&r1);
        assert_eq!(env.get(API_KEY_VAR).as_deref(), Some("sk-test123"));
        assert_eq!(env.get(SESSION_ID_VAR), Some(r1.session_id.clone()));

        env.reset_to(None);
        assert!(env.get(API_KEY_VAR).is_none());
        assert!(env.snapshot().is_empty());
    }
}
