// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retention pruning of per-build directories.
//!
//! Both the server's builds root and an agent's work folder accumulate one
//! directory per build; the retention policy keeps the most recent N and
//! removes the rest.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Remove all but the `keep` most recently modified directories directly
/// under `root`, returning the removed paths. `keep == 0` disables pruning.
pub async fn prune_oldest(root: &Path, keep: usize) -> std::io::Result<Vec<PathBuf>> {
    if keep == 0 {
        return Ok(Vec::new());
    }

    let mut dirs: Vec<(PathBuf, SystemTime)> = Vec::new();
    let mut entries = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    while let Some(entry) = entries.next_entry().await? {
        let meta = entry.metadata().await?;
        if meta.is_dir() {
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            dirs.push((entry.path(), modified));
        }
    }

    // Newest first; everything past the keep window goes
    dirs.sort_by(|a, b| b.1.cmp(&a.1));
    let mut pruned = Vec::new();
    for (path, _) in dirs.into_iter().skip(keep) {
        tokio::fs::remove_dir_all(&path).await?;
        pruned.push(path);
    }
    Ok(pruned)
}

#[cfg(test)]
#[path = "retention_tests.rs"]
mod tests;
