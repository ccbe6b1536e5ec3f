// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Work folder management for the two folder modes.
//!
//! Wipe mode recreates a per-build folder from scratch; reuse mode keeps
//! one shared folder and only guarantees it exists. The two modes are a
//! per-agent configuration and are never mixed per build.

use std::path::{Path, PathBuf};

/// Prepare the working folder for one build and return its path.
///
/// In wipe mode this is `<work_root>/<label>`, emptied if it already
/// existed; in reuse mode it is `<work_root>` itself, created if missing.
pub async fn prepare(
    work_root: &Path,
    label: &str,
    reuse: bool,
) -> std::io::Result<PathBuf> {
    if reuse {
        tokio::fs::create_dir_all(work_root).await?;
        return Ok(work_root.to_path_buf());
    }

    let dir = work_root.join(label);
    match tokio::fs::remove_dir_all(&dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    tokio::fs::create_dir_all(&dir).await?;
    Ok(dir)
}

#[cfg(test)]
#[path = "workspace_tests.rs"]
mod tests;
