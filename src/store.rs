// src/store.rs
//! Seen-set persistence: a pretty-printed JSON array on disk.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::listing::SeenRecord;

pub const DEFAULT_SEEN_PATH: &str = "seen.json";

#[derive(Debug, Clone)]
pub struct SeenStore {
    path: PathBuf,
}

impl SeenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the file with an empty array if it doesn't exist yet.
    pub async fn ensure_exists(&self) -> Result<()> {
        if fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(());
        }
        fs::write(&self.path, b"[]")
            .await
            .with_context(|| format!("creating seen file {}", self.path.display()))
    }

    /// Missing, empty or malformed files all load as an empty set. Inside a
    /// valid array, records that can't be read are dropped one by one.
    pub async fn load(&self) -> Vec<SeenRecord> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(s) => s,
            Err(e) => {
                tracing::debug!(path = %self.path.display(), error = %e, "seen file not readable");
                return Vec::new();
            }
        };
        if raw.trim().is_empty() {
            return Vec::new();
        }
        let entries: Vec<serde_json::Value> = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "⚠️ seen file invalid, starting empty");
                return Vec::new();
            }
        };
        entries
            .into_iter()
            .enumerate()
            .filter_map(|(i, entry)| match SeenRecord::deserialize(entry) {
                Ok(rec) => Some(rec),
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), index = i, error = %e, "⚠️ dropping unreadable seen record");
                    None
                }
            })
            .collect()
    }

    /// Overwrite the file with the full sequence. Writes to a sibling temp
    /// file first and renames it into place.
    pub async fn save(&self, records: &[SeenRecord]) -> Result<()> {
        let body = serde_json::to_vec_pretty(records).context("serializing seen set")?;
        let tmp = self.tmp_path();
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        fs::write(&tmp, body)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| DEFAULT_SEEN_PATH.into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: &str, title: &str) -> SeenRecord {
        SeenRecord {
            time: "2025-09-06 09:00:00".into(),
            source_tag: "Lancers_web".into(),
            id: id.into(),
            kind: "プロジェクト".into(),
            title: title.into(),
            url: format!("https://www.lancers.jp/work/detail/{id}"),
            price: "N/A".into(),
        }
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SeenStore::new(dir.path().join("nope.json"));
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn corrupt_and_blank_files_load_empty() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("seen.json");

        std::fs::write(&p, "{ not json").unwrap();
        assert!(SeenStore::new(&p).load().await.is_empty());

        std::fs::write(&p, "   \n").unwrap();
        assert!(SeenStore::new(&p).load().await.is_empty());

        // valid JSON, wrong shape
        std::fs::write(&p, r#"{"id": "1"}"#).unwrap();
        assert!(SeenStore::new(&p).load().await.is_empty());
    }

    #[tokio::test]
    async fn one_bad_record_does_not_discard_the_history() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("seen.json");
        std::fs::write(
            &p,
            r#"[
  {"time": "t1", "dtype": "Lancers_web", "id": "1", "type": "プロジェクト",
   "title": "a", "url": "u1", "price": "N/A"},
  {"time": "t2", "dtype": "CW_web", "id": 2, "type": "not_specified",
   "title": null, "url": "u2", "price": "discuss"},
  {"time": "t3", "dtype": "CW_web", "title": "no id at all"}
]"#,
        )
        .unwrap();

        let ids: Vec<String> = SeenStore::new(&p).load().await.into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn save_is_pretty_and_keeps_japanese_unescaped() {
        let dir = tempfile::tempdir().unwrap();
        let store = SeenStore::new(dir.path().join("seen.json"));
        store.save(&[rec("1", "ホームページ制作")]).await.unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("ホームページ制作"));
        assert!(raw.contains("\n  {"), "expected 2-space indent, got {raw}");
        assert!(!dir.path().join("seen.json.tmp").exists());

        let back = store.load().await;
        assert_eq!(back, vec![rec("1", "ホームページ制作")]);
    }

    #[tokio::test]
    async fn ensure_exists_does_not_clobber() {
        let dir = tempfile::tempdir().unwrap();
        let store = SeenStore::new(dir.path().join("seen.json"));
        store.ensure_exists().await.unwrap();
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), "[]");

        store.save(&[rec("7", "t")]).await.unwrap();
        store.ensure_exists().await.unwrap();
        assert_eq!(store.load().await.len(), 1);
    }
}
