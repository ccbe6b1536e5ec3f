// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Observer namespace: dashboards watching status, news and logs.

use foundry_core::{AgentId, BuildId, BuildPayload, Message};
use serde::{Deserialize, Serialize};

/// Frames an observer sends to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ObserverToServer {
    /// Request a full status snapshot.
    #[serde(rename = "observer:refresh")]
    Refresh,

    /// Re-queue a finished or stuck build.
    #[serde(rename = "observer:rebuild")]
    Rebuild { build_id: BuildId },

    /// Cancel a build on the user's behalf.
    #[serde(rename = "observer:cancel")]
    Cancel { build_id: BuildId },
}

/// Frames the server sends to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerToObserver {
    /// Incremental event: something about `what` changed.
    #[serde(rename = "news")]
    News {
        kind: String,
        what: String,
        obj: serde_json::Value,
    },

    /// Full state snapshot, answering a refresh.
    #[serde(rename = "status")]
    Status { snapshot: StatusSnapshot },

    #[serde(rename = "log")]
    Log { message: Message },
}

/// Connected-agent summary for dashboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub id: AgentId,
    pub name: String,
    pub platforms: Vec<String>,
    /// Build the agent is working on, `None` when idle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub busy: Option<BuildId>,
}

/// Everything a freshly connected dashboard needs to render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Root builds with nested children, no file content.
    pub builds: Vec<BuildPayload>,
    pub agents: Vec<AgentInfo>,
    /// Build ids currently waiting for capacity, queue order.
    pub queue: Vec<BuildId>,
    /// Recent log ring, newest first.
    pub logs: Vec<Message>,
}
