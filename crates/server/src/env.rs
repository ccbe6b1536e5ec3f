// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the server crate.

use std::path::PathBuf;
use std::time::Duration;

/// Server configuration, resolved once at startup and passed down.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP listen address.
    pub listen: String,
    /// Root folder holding one directory per root build.
    pub builds_root: PathBuf,
    /// Retention: keep the N most recent build folders, 0 = unlimited.
    pub keep: usize,
    /// Bound on the recent-log ring shared with dashboards.
    pub log_ring_cap: usize,
    /// Scheduler tick interval.
    pub queue_tick_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8300".to_string(),
            builds_root: PathBuf::from("builds"),
            keep: 0,
            log_ring_cap: 1000,
            queue_tick_ms: 1000,
        }
    }
}

impl ServerConfig {
    /// Resolve configuration from `FOUNDRY_*` environment variables,
    /// falling back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            listen: std::env::var("FOUNDRY_LISTEN").unwrap_or(defaults.listen),
            builds_root: std::env::var("FOUNDRY_BUILDS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.builds_root),
            keep: env_parse("FOUNDRY_KEEP", defaults.keep),
            log_ring_cap: env_parse("FOUNDRY_LOG_RING", defaults.log_ring_cap),
            queue_tick_ms: env_parse("FOUNDRY_QUEUE_TICK_MS", defaults.queue_tick_ms),
        }
    }
}

/// Handshake timeout: how long a fresh connection may stay silent before
/// its accept slot is reclaimed.
pub fn handshake_timeout() -> Duration {
    Duration::from_millis(env_parse("FOUNDRY_HANDSHAKE_TIMEOUT_MS", 5000))
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}
