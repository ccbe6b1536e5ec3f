// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transfer codec for build input and output files.
//!
//! Files travel the wire as base64-embedded payloads. Content buffers are
//! memory-resident only for the duration of a transfer: callers free them
//! immediately after persisting to disk or handing to the network layer,
//! because bundles can be large and many builds are in flight.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("error reading {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("error writing {path}: {source}")]
    Write { path: PathBuf, source: std::io::Error },

    #[error("error creating folder {path}: {source}")]
    CreateDir { path: PathBuf, source: std::io::Error },

    #[error("invalid base64 content for {path}: {source}")]
    Decode { path: PathBuf, source: base64::DecodeError },

    #[error("no content staged for {path}")]
    NoContent { path: PathBuf },
}

/// A file participating in a build, optionally carrying its base64 content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    /// Local path (absolute on whichever side staged the file).
    pub path: PathBuf,
    /// Platform group; `None` means the file is shared by all platforms.
    pub group: Option<String>,
    /// Base64 content, present only mid-transfer.
    pub content: Option<String>,
}

/// Wire/disk form of a [`FileRef`]. Carries the file *name* only; server
/// filesystem layout never leaks to peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePayload {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl FileRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), group: None, content: None }
    }

    pub fn with_group(path: impl Into<PathBuf>, group: impl Into<String>) -> Self {
        Self { path: path.into(), group: Some(group.into()), content: None }
    }

    /// File name without any directory components.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
    }

    pub fn to_payload(&self, include_content: bool) -> FilePayload {
        FilePayload {
            file: self.name(),
            group: self.group.clone(),
            content: if include_content { self.content.clone() } else { None },
        }
    }

    pub fn from_payload(payload: FilePayload) -> Self {
        Self { path: PathBuf::from(payload.file), group: payload.group, content: payload.content }
    }

    /// Load the file from disk and stage its base64 content.
    async fn load(&mut self) -> Result<(), FileError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|source| FileError::Read { path: self.path.clone(), source })?;
        self.content = Some(BASE64.encode(bytes));
        Ok(())
    }
}

/// Load the contents of every file concurrently, fail-fast on the first
/// error. Staged content survives on files that loaded before the failure;
/// callers free the batch on either outcome.
pub async fn read_contents(files: &mut [FileRef]) -> Result<(), FileError> {
    try_join_all(files.iter_mut().map(|f| f.load())).await?;
    Ok(())
}

/// Persist staged contents under `dir`, flattening each file to its
/// basename. Each file's path is rewritten to its new location and its
/// content buffer is released as soon as it lands on disk (unless
/// `keep_content` is set, for when the same buffers are still due on the
/// wire).
pub async fn write_contents(
    dir: &Path,
    files: &mut [FileRef],
    keep_content: bool,
) -> Result<(), FileError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| FileError::CreateDir { path: dir.to_path_buf(), source })?;
    for file in files.iter_mut() {
        let target = dir.join(file.name());
        let encoded = file
            .content
            .as_deref()
            .ok_or_else(|| FileError::NoContent { path: file.path.clone() })?;
        let bytes = BASE64
            .decode(encoded)
            .map_err(|source| FileError::Decode { path: file.path.clone(), source })?;
        tokio::fs::write(&target, bytes)
            .await
            .map_err(|source| FileError::Write { path: target.clone(), source })?;
        file.path = target;
        if !keep_content {
            file.content = None;
        }
    }
    Ok(())
}

/// Release all staged content buffers.
pub fn free_contents(files: &mut [FileRef]) {
    for file in files.iter_mut() {
        file.content = None;
    }
}

/// Total staged content bytes across a batch (for transfer-size log lines).
pub fn staged_len(files: &[FileRef]) -> usize {
    files.iter().filter_map(|f| f.content.as_ref().map(String::len)).sum()
}

/// The subset of a shared file set visible to one platform: files tagged
/// with that platform's group plus all ungrouped files.
pub fn partition_for_platform(files: &[FileRef], platform: &str) -> Vec<FileRef> {
    files
        .iter()
        .filter(|f| f.group.as_deref().map_or(true, |g| g == platform))
        .cloned()
        .collect()
}

#[cfg(test)]
#[path = "files_tests.rs"]
mod tests;
