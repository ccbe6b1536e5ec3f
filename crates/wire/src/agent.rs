// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent namespace: frames between the server and a build agent.

use foundry_core::{AgentId, BuildId, BuildPayload, Message};
use serde::{Deserialize, Serialize};

/// Frames an agent sends to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AgentToServer {
    /// Declare identity and platform capabilities on connect.
    #[serde(rename = "agent:register")]
    Register {
        id: AgentId,
        name: String,
        platforms: Vec<String>,
    },

    /// A dispatched build started executing.
    #[serde(rename = "agent:building")]
    Building { build_id: BuildId },

    /// Artifacts are being transferred back.
    #[serde(rename = "agent:uploading")]
    Uploading { build_id: BuildId },

    /// Build finished; payload carries output file names and content.
    #[serde(rename = "agent:build-success")]
    BuildSuccess { build: BuildPayload },

    /// Build failed; payload identifies the build (no artifacts).
    #[serde(rename = "agent:build-failed")]
    BuildFailed { build: BuildPayload },

    #[serde(rename = "log")]
    Log { message: Message },
}

/// Frames the server sends to an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerToAgent {
    /// Dispatch one child build, input file names and base64 content
    /// included.
    #[serde(rename = "build")]
    Build { build: BuildPayload },

    /// Cooperatively cancel the named build.
    #[serde(rename = "cancel")]
    Cancel { build_id: BuildId },

    #[serde(rename = "log")]
    Log { message: Message },
}
