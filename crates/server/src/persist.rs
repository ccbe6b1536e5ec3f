// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON persistence: one directory per root build.
//!
//! Layout under the configured builds root:
//!
//! ```text
//! <builds_root>/<label>/build.json              master, children nested
//! <builds_root>/<label>/build.<platform>.json   one per child
//! <builds_root>/<label>/input/                  uploaded input files
//! ```
//!
//! Persistence is best-effort: a failed save means state would not survive a
//! restart, never that the in-memory process stops.

use crate::coordinator::SharedCoordinator;
use foundry_core::{Build, BuildPayload, Clock, Message, Priority, Sender};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("error writing {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("error encoding {path}: {source}")]
    Encode { path: PathBuf, source: serde_json::Error },

    #[error("error parsing {path}: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
}

/// Directory holding everything for one root build.
pub fn root_dir(builds_root: &Path, label: &str) -> PathBuf {
    builds_root.join(label)
}

/// Input-file directory for one root build.
pub fn input_dir(builds_root: &Path, label: &str) -> PathBuf {
    root_dir(builds_root, label).join("input")
}

async fn write_json(path: &Path, payload: &BuildPayload) -> Result<(), PersistError> {
    let json = serde_json::to_vec_pretty(payload)
        .map_err(|source| PersistError::Encode { path: path.to_path_buf(), source })?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| PersistError::Io { path: parent.to_path_buf(), source })?;
    }
    tokio::fs::write(path, json)
        .await
        .map_err(|source| PersistError::Io { path: path.to_path_buf(), source })?;
    Ok(())
}

/// Persist a root build (children nested, no file content).
pub async fn save_root(
    builds_root: &Path,
    label: &str,
    payload: &BuildPayload,
) -> Result<PathBuf, PersistError> {
    let path = root_dir(builds_root, label).join("build.json");
    write_json(&path, payload).await?;
    Ok(path)
}

/// Persist one child build under its root's directory.
pub async fn save_child(
    builds_root: &Path,
    root_label: &str,
    platform: &str,
    payload: &BuildPayload,
) -> Result<PathBuf, PersistError> {
    let path = root_dir(builds_root, root_label).join(format!("build.{platform}.json"));
    write_json(&path, payload).await?;
    Ok(path)
}

/// Load every persisted root build, oldest directory first. Parse failures
/// surface per-file so one corrupt build cannot hide the rest.
pub async fn load_all(
    builds_root: &Path,
) -> std::io::Result<Vec<(PathBuf, Result<BuildPayload, PersistError>)>> {
    let mut paths = Vec::new();
    let mut entries = match tokio::fs::read_dir(builds_root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    while let Some(entry) = entries.next_entry().await? {
        let candidate = entry.path().join("build.json");
        if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
            paths.push(candidate);
        }
    }
    paths.sort();

    let mut loaded = Vec::new();
    for path in paths {
        let result = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<BuildPayload>(&bytes)
                .map_err(|source| PersistError::Parse { path: path.clone(), source }),
            Err(source) => Err(PersistError::Io { path: path.clone(), source }),
        };
        loaded.push((path, result));
    }
    Ok(loaded)
}

/// Best-effort reload of previously persisted builds into the registry, so
/// a restart does not lose visibility into prior builds. Failures are
/// logged, never fatal.
pub async fn reload_into(coordinator: &SharedCoordinator, clock: &impl Clock) {
    let builds_root = coordinator.lock().config.builds_root.clone();
    let loaded = match load_all(&builds_root).await {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::warn!(error = %e, "could not scan builds root");
            return;
        }
    };

    let mut restored = 0usize;
    let mut state = coordinator.lock();
    for (path, result) in loaded {
        match result {
            Ok(payload) => {
                let (build, children) = Build::from_payload(payload);
                if !state.registry.contains(&build.id) {
                    state.registry.insert_tree(build, children);
                    restored += 1;
                }
            }
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "skipping unreadable build");
                let msg = Message::new(
                    Sender::Server,
                    Priority::Debug,
                    format!("an error occurred while reading a previous build from the disk\n{e}"),
                    clock.epoch_ms(),
                );
                state.log(msg);
            }
        }
    }
    if restored > 0 {
        let msg = Message::new(
            Sender::Server,
            Priority::Debug,
            format!("{restored} previous build(s) were successfully read from the disk"),
            clock.epoch_ms(),
        );
        state.log(msg);
    }
}

/// Fire-and-forget save of a root build's state. A failed write is reported
/// in the server log and dropped; it only means the state would not
/// survive a crash.
pub fn spawn_save(coordinator: &SharedCoordinator, label: String, payload: BuildPayload) {
    let coordinator = coordinator.clone();
    tokio::spawn(async move {
        let builds_root = coordinator.lock().config.builds_root.clone();
        if let Err(e) = save_root(&builds_root, &label, &payload).await {
            tracing::warn!(error = %e, "state save failed");
            let msg = Message::new(
                Sender::Server,
                Priority::Debug,
                format!("error while saving build.json for {label}:\n{e}"),
                foundry_core::SystemClock.epoch_ms(),
            );
            coordinator.lock().log(msg);
        }
    });
}

/// Fire-and-forget save of one child build's sidecar file.
pub fn spawn_save_child(
    coordinator: &SharedCoordinator,
    root_label: String,
    platform: String,
    payload: BuildPayload,
) {
    let coordinator = coordinator.clone();
    tokio::spawn(async move {
        let builds_root = coordinator.lock().config.builds_root.clone();
        if let Err(e) = save_child(&builds_root, &root_label, &platform, &payload).await {
            tracing::warn!(error = %e, "child state save failed");
        }
    });
}

#[cfg(test)]
#[path = "persist_tests.rs"]
mod tests;
