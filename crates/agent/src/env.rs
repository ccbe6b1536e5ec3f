// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the agent crate.

use std::path::PathBuf;

/// Agent configuration, resolved once at startup and passed down.
///
/// The work folder runs in one of two mutually exclusive modes, never mixed
/// per build: wipe mode gives every build a fresh sub-folder named after
/// its label; reuse mode keeps one shared folder across builds and relies
/// on the workspace-reset stage to avoid cross-build contamination.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Coordinator address.
    pub server_addr: String,
    /// Display name reported at registration.
    pub name: String,
    /// Platforms this agent can build.
    pub platforms: Vec<String>,
    /// Root of the agent's working folders.
    pub work_root: PathBuf,
    /// Keep one shared work folder across builds instead of wiping.
    pub reuse_work_folder: bool,
    /// Retention: keep the N most recent per-build work folders, 0 = all.
    pub keep: usize,
    /// Toolchain build command template: `{platform}`, `{args}`, `{mode}`.
    pub build_command: String,
    /// Toolchain scaffold command template: `{platform}`.
    pub platform_add_command: String,
    /// Archive extraction command template: `{archive}`, `{dest}`.
    pub extract_command: String,
    /// Delay between reconnect attempts.
    pub reconnect_delay_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:8300".to_string(),
            name: "agent".to_string(),
            platforms: vec!["android".to_string(), "wp8".to_string()],
            work_root: PathBuf::from("work"),
            reuse_work_folder: false,
            keep: 0,
            build_command: "cordova build {platform} {args} --{mode}".to_string(),
            platform_add_command: "cordova platform add {platform}".to_string(),
            extract_command: "unzip -o {archive} -d {dest}".to_string(),
            reconnect_delay_ms: 500,
        }
    }
}

impl AgentConfig {
    /// Resolve configuration from `FOUNDRY_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server_addr: std::env::var("FOUNDRY_SERVER").unwrap_or(defaults.server_addr),
            name: std::env::var("FOUNDRY_AGENT_NAME").unwrap_or(defaults.name),
            platforms: std::env::var("FOUNDRY_AGENT_PLATFORMS")
                .map(|s| split_list(&s))
                .unwrap_or(defaults.platforms),
            work_root: std::env::var("FOUNDRY_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_root),
            reuse_work_folder: std::env::var("FOUNDRY_REUSE_WORKFOLDER")
                .map(|s| s == "1" || s.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.reuse_work_folder),
            keep: env_parse("FOUNDRY_KEEP", defaults.keep),
            build_command: std::env::var("FOUNDRY_BUILD_COMMAND").unwrap_or(defaults.build_command),
            platform_add_command: std::env::var("FOUNDRY_PLATFORM_ADD_COMMAND")
                .unwrap_or(defaults.platform_add_command),
            extract_command: std::env::var("FOUNDRY_EXTRACT_COMMAND")
                .unwrap_or(defaults.extract_command),
            reconnect_delay_ms: env_parse("FOUNDRY_RECONNECT_DELAY_MS", defaults.reconnect_delay_ms),
        }
    }
}

/// Split a `,`/`;`-separated platform list, dropping empty entries.
pub fn split_list(s: &str) -> Vec<String> {
    s.split([',', ';'])
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::split_list;

    #[yare::parameterized(
        commas     = { "android,ios", &["android", "ios"] },
        semicolons = { "android;wp8", &["android", "wp8"] },
        spaces     = { " android , ios ", &["android", "ios"] },
        empties    = { "android,,ios,", &["android", "ios"] },
        single     = { "ios", &["ios"] },
    )]
    fn split_list_cases(input: &str, expected: &[&str]) {
        assert_eq!(split_list(input), expected);
    }
}
