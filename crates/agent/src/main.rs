// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! foundry-agent: the build worker daemon.

use foundry_agent::{AgentConfig, AgentWorker};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AgentConfig::from_env();
    tracing::info!(
        server = %config.server_addr,
        platforms = ?config.platforms,
        "starting foundry-agent"
    );
    AgentWorker::new(config).run().await;
}
