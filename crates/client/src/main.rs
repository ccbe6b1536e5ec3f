// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! foundry-client: submit a build and wait for its artifacts.

use foundry_client::{ClientConfig, ClientWorker};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = ClientConfig::from_env();
    match ClientWorker::new(config).run().await {
        Ok(summary) if summary.failed == 0 => std::process::ExitCode::SUCCESS,
        Ok(summary) => {
            tracing::error!(failed = summary.failed, "some platform builds failed");
            std::process::ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!(error = %e, "build request failed");
            std::process::ExitCode::FAILURE
        }
    }
}
