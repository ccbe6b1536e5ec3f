// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client namespace: frames between the server and a requesting client.

use foundry_core::{BuildId, BuildPayload, ClientId, Message};
use serde::{Deserialize, Serialize};

/// Frames a client sends to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientToServer {
    /// Identify the requester and whether it wants artifacts returned as
    /// well as stored server-side.
    #[serde(rename = "client:register")]
    Register { id: ClientId, save: bool },

    /// Announce a build: master payload, no file content yet.
    #[serde(rename = "client:register-build")]
    RegisterBuild { build: BuildPayload },

    /// Deliver the input files for a previously registered build.
    #[serde(rename = "client:upload-build")]
    UploadBuild { build: BuildPayload },

    /// Abandon a build that cannot proceed (e.g. upload failed client-side).
    #[serde(rename = "client:fail-build")]
    FailBuild { build_id: BuildId },

    #[serde(rename = "log")]
    Log { message: Message },
}

/// Frames the server sends to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerToClient {
    /// One platform build finished; artifacts attached when the client
    /// registered with `save`.
    #[serde(rename = "build-success")]
    BuildSuccess { build: BuildPayload },

    #[serde(rename = "build-failed")]
    BuildFailed { build: BuildPayload },

    #[serde(rename = "log")]
    Log { message: Message },
}
