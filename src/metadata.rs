//! Durable per-source progress store.
//!
//! A small JSON document mapping each configured user and list to its
//! watermark (and, for lists, the lazily resolved display name). Read once
//! at startup and rewritten atomically after every source task has settled,
//! so a crash mid-run can lose progress but never persist a half-updated
//! watermark.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Cursor marking the newest successfully archived content for a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Watermark {
    pub last_seen_id: String,
    pub last_seen_timestamp: DateTime<FixedOffset>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceState {
    /// Display name; populated lazily for lists, unused for users.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watermark: Option<Watermark>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct MetadataDoc {
    users: BTreeMap<String, SourceState>,
    lists: BTreeMap<String, SourceState>,
}

#[derive(Debug)]
pub struct MetadataStore {
    path: PathBuf,
    doc: MetadataDoc,
}

impl MetadataStore {
    /// Load the store from disk, starting empty when the file does not
    /// exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed;
    /// the caller treats that as fatal rather than silently discarding
    /// watermarks.
    pub async fn load(path: &Path) -> Result<Self> {
        let doc = match tokio::fs::read(path).await {
            Ok(raw) => serde_json::from_slice(&raw)
                .with_context(|| format!("Failed to parse metadata file {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => MetadataDoc::default(),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read metadata file {}", path.display()))
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            doc,
        })
    }

    pub fn user_state(&self, screen_name: &str) -> SourceState {
        self.doc.users.get(screen_name).cloned().unwrap_or_default()
    }

    pub fn list_state(&self, list_id: &str) -> SourceState {
        self.doc.lists.get(list_id).cloned().unwrap_or_default()
    }

    pub fn set_user_state(&mut self, screen_name: &str, state: SourceState) {
        self.doc.users.insert(screen_name.to_string(), state);
    }

    pub fn set_list_state(&mut self, list_id: &str, state: SourceState) {
        self.doc.lists.insert(list_id.to_string(), state);
    }

    /// Persist the store, replacing the previous file atomically via a
    /// temp file in the same directory.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization, the temp-file write, or the
    /// rename fails.
    pub fn save(&self) -> Result<()> {
        let body = serde_json::to_vec_pretty(&self.doc).context("Failed to serialize metadata")?;

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create metadata directory {}", dir.display()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .context("Failed to create temporary metadata file")?;
        tmp.write_all(&body)
            .context("Failed to write temporary metadata file")?;
        tmp.persist(&self.path)
            .with_context(|| format!("Failed to replace metadata file {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn watermark(id: &str, rfc3339: &str) -> Watermark {
        Watermark {
            last_seen_id: id.to_string(),
            last_seen_timestamp: DateTime::parse_from_rfc3339(rfc3339).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_load_missing_file_starts_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = MetadataStore::load(&dir.path().join("metadata.json"))
            .await
            .unwrap();
        assert_eq!(store.user_state("alice"), SourceState::default());
        assert_eq!(store.list_state("42"), SourceState::default());
    }

    #[tokio::test]
    async fn test_save_and_reload_round_trips() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("metadata.json");

        let mut store = MetadataStore::load(&path).await.unwrap();
        store.set_user_state(
            "alice",
            SourceState {
                name: None,
                watermark: Some(watermark("1001", "2018-10-10T20:19:24+00:00")),
            },
        );
        store.set_list_state(
            "42",
            SourceState {
                name: Some("Nature photographers".to_string()),
                watermark: None,
            },
        );
        store.save().unwrap();

        let reloaded = MetadataStore::load(&path).await.unwrap();
        assert_eq!(
            reloaded.user_state("alice").watermark.unwrap().last_seen_id,
            "1001"
        );
        assert_eq!(
            reloaded.list_state("42").name.as_deref(),
            Some("Nature photographers")
        );
    }

    #[tokio::test]
    async fn test_load_rejects_corrupt_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("metadata.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();
        assert!(MetadataStore::load(&path).await.is_err());
    }

    #[test]
    fn test_watermark_serializes_as_rfc3339() {
        let wm = watermark("99", "2024-01-15T12:00:00+00:00");
        let json = serde_json::to_string(&wm).unwrap();
        assert!(json.contains("\"lastSeenId\":\"99\""));
        assert!(json.contains("2024-01-15T12:00:00+00:00"));
    }
}
