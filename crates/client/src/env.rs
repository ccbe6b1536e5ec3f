// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the client crate.

use foundry_core::FileRef;
use std::collections::HashMap;
use std::path::PathBuf;

/// Client configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Coordinator address.
    pub server_addr: String,
    /// Platforms to build for.
    pub platforms: Vec<String>,
    /// Input files, optionally tagged with a platform group.
    pub files: Vec<FileRef>,
    /// Human-facing build number.
    pub number: Option<String>,
    /// Application name (primary artifacts are renamed after it).
    pub name: Option<String>,
    pub build_mode: String,
    /// Bundle identifier override.
    pub bundle_id: Option<String>,
    /// When set, artifacts are returned and saved under this directory.
    pub save_dir: Option<PathBuf>,
    /// Retention for the local output directory, 0 = unlimited.
    pub keep: usize,
    /// Arbitrary options handed through to platform hooks.
    pub extra: HashMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:8300".to_string(),
            platforms: Vec::new(),
            files: Vec::new(),
            number: None,
            name: None,
            build_mode: "release".to_string(),
            bundle_id: None,
            save_dir: None,
            keep: 0,
            extra: HashMap::new(),
        }
    }
}

impl ClientConfig {
    /// Resolve configuration from `FOUNDRY_*` environment variables.
    ///
    /// Shared inputs come from `FOUNDRY_FILES`; per-platform groups from
    /// `FOUNDRY_FILES_<PLATFORM>` (e.g. `FOUNDRY_FILES_ANDROID`).
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let platforms = std::env::var("FOUNDRY_BUILD_PLATFORMS")
            .map(|s| split_list(&s))
            .unwrap_or_default();
        let files = group_files(
            &std::env::var("FOUNDRY_FILES").unwrap_or_default(),
            &platforms
                .iter()
                .map(|p| {
                    let key = format!("FOUNDRY_FILES_{}", p.to_uppercase());
                    (p.clone(), std::env::var(key).unwrap_or_default())
                })
                .collect::<Vec<_>>(),
        );
        Self {
            server_addr: std::env::var("FOUNDRY_SERVER").unwrap_or(defaults.server_addr),
            platforms,
            files,
            number: std::env::var("FOUNDRY_BUILD_NUMBER").ok(),
            name: std::env::var("FOUNDRY_APP_NAME").ok(),
            build_mode: std::env::var("FOUNDRY_BUILD_MODE").unwrap_or(defaults.build_mode),
            bundle_id: std::env::var("FOUNDRY_BUNDLE_ID").ok(),
            save_dir: std::env::var("FOUNDRY_SAVE_DIR").map(PathBuf::from).ok(),
            keep: std::env::var("FOUNDRY_KEEP")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.keep),
            extra: HashMap::new(),
        }
    }
}

/// Parse the shared file list plus one list per platform group into tagged
/// file references.
pub fn group_files(shared: &str, groups: &[(String, String)]) -> Vec<FileRef> {
    let mut files: Vec<FileRef> = split_list(shared).into_iter().map(FileRef::new).collect();
    for (platform, list) in groups {
        files.extend(
            split_list(list)
                .into_iter()
                .map(|path| FileRef::with_group(path, platform.clone())),
        );
    }
    files
}

fn split_list(s: &str) -> Vec<String> {
    s.split([',', ';'])
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}
