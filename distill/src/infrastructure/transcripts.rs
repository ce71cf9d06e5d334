// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Directory of session transcripts, one file per session
//!
//! The file stem is the session id; the modification time is the session
//! date.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use crate::domain::Transcript;
use crate::infrastructure::file_lock::blocking;
use crate::infrastructure::repository::TranscriptSource;

const EXTENSIONS: &[&str] = &["txt", "md", "log", "jsonl"];

pub struct DirectoryTranscriptSource {
    dir: PathBuf,
}

impl DirectoryTranscriptSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn session_files(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
        let entries = std::fs::read_dir(dir).with_context(|| format!("Failed to read transcripts dir {:?}", dir))?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let known = path
                .extension()
                .and_then(|e| e.to_str())
                .map_or(false, |e| EXTENSIONS.contains(&e));
            if !path.is_file() || !known {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                files.push((stem.to_string(), path.clone()));
            }
        }
        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl TranscriptSource for DirectoryTranscriptSource {
    async fn list_sessions(&self) -> Result<Vec<String>> {
        let dir = self.dir.clone();
        let files = blocking(move || Self::session_files(&dir)).await?;
        let mut ids: Vec<String> = files.into_iter().map(|(id, _)| id).collect();
        ids.dedup();
        Ok(ids)
    }

    async fn load(&self, session_id: &str) -> Result<Option<Transcript>> {
        let dir = self.dir.clone();
        let session_id = session_id.to_string();
        blocking(move || {
            let Some((_, path)) = Self::session_files(&dir)?.into_iter().find(|(id, _)| *id == session_id) else {
                return Ok(None);
            };
            let content = std::fs::read_to_string(&path).with_context(|| format!("Failed to read {:?}", path))?;
            let date = std::fs::metadata(&path)
                .and_then(|m| m.modified())
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            Ok(Some(Transcript {
                session_id,
                date,
                content,
            }))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lists_and_loads_known_extensions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("s-002.log"), "error: boom").unwrap();
        std::fs::write(dir.path().join("s-001.txt"), "all good").unwrap();
        std::fs::write(dir.path().join("notes.png"), "binary").unwrap();

        let source = DirectoryTranscriptSource::new(dir.path());
        assert_eq!(source.list_sessions().await.unwrap(), vec!["s-001", "s-002"]);

        let transcript = source.load("s-002").await.unwrap().unwrap();
        assert_eq!(transcript.content, "error: boom");
        assert!(source.load("missing").await.unwrap().is_none());
    }
}
