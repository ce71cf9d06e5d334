// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! File-backed rule store
//!
//! Layout under the state directory:
//!
//! ```text
//! rules.json      current RuleDocument (replaced atomically per commit)
//! commits.jsonl   one RuleCommit per line, append-only
//! .rules.lock     advisory lock held for the read-check-write window
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::domain::{CommitId, RuleChange, RuleCommit, RuleDocument};
use crate::infrastructure::file_lock::{blocking, write_atomic, StateLock};
use crate::infrastructure::repository::{prepare_commit, RuleStore, RuleStoreError};

const DOCUMENT_FILE: &str = "rules.json";
const COMMIT_LOG_FILE: &str = "commits.jsonl";
const LOCK_FILE: &str = ".rules.lock";

#[derive(Clone)]
pub struct FileRuleStore {
    dir: PathBuf,
    max_active: usize,
}

impl FileRuleStore {
    pub fn new(dir: impl Into<PathBuf>, max_active: usize) -> Self {
        Self {
            dir: dir.into(),
            max_active,
        }
    }

    fn read_document(dir: &Path) -> Result<RuleDocument> {
        let path = dir.join(DOCUMENT_FILE);
        if !path.exists() {
            return Ok(RuleDocument::default());
        }
        let content = std::fs::read_to_string(&path).with_context(|| format!("Failed to read {:?}", path))?;
        serde_json::from_str(&content).with_context(|| format!("Corrupt rule document {:?}", path))
    }

    fn read_commits(dir: &Path) -> Result<Vec<RuleCommit>> {
        let path = dir.join(COMMIT_LOG_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = std::fs::File::open(&path).with_context(|| format!("Failed to open {:?}", path))?;
        let mut commits = Vec::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let commit: RuleCommit = serde_json::from_str(&line)
                .with_context(|| format!("Corrupt commit at {:?}:{}", path, line_no + 1))?;
            commits.push(commit);
        }
        Ok(commits)
    }

    fn append_commit(dir: &Path, commit: &RuleCommit) -> Result<()> {
        let path = dir.join(COMMIT_LOG_FILE);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open {:?}", path))?;
        let mut line = serde_json::to_string(commit)?;
        line.push('\n');
        file.write_all(line.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }
}

#[async_trait]
impl RuleStore for FileRuleStore {
    async fn load(&self) -> Result<RuleDocument, RuleStoreError> {
        let dir = self.dir.clone();
        Ok(blocking(move || Self::read_document(&dir)).await?)
    }

    async fn commit(
        &self,
        expected_version: u64,
        message: &str,
        changes: Vec<RuleChange>,
    ) -> Result<RuleCommit, RuleStoreError> {
        let dir = self.dir.clone();
        let max_active = self.max_active;
        let message = message.to_string();

        blocking(move || {
            let _lock = StateLock::acquire(&dir.join(LOCK_FILE))?;
            let current = Self::read_document(&dir)?;
            let prepared = prepare_commit(&current, expected_version, &message, changes, max_active);
            let (document, commit) = match prepared {
                Ok(prepared) => prepared,
                Err(e) => return Ok(Err(e)),
            };

            write_atomic(&dir.join(DOCUMENT_FILE), &serde_json::to_vec_pretty(&document)?)?;
            Self::append_commit(&dir, &commit)?;
            debug!(commit_id = %commit.id, version = commit.version, "Rule store commit written");
            Ok(Ok(commit))
        })
        .await?
    }

    async fn history(&self, limit: usize) -> Result<Vec<RuleCommit>, RuleStoreError> {
        let dir = self.dir.clone();
        let commits = blocking(move || Self::read_commits(&dir)).await?;
        Ok(commits.into_iter().rev().take(limit).collect())
    }

    async fn find_commit(&self, id: CommitId) -> Result<Option<RuleCommit>, RuleStoreError> {
        let dir = self.dir.clone();
        let commits = blocking(move || Self::read_commits(&dir)).await?;
        Ok(commits.into_iter().find(|c| c.id == id))
    }
}
