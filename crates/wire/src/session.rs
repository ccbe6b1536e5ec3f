// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection handshake: each peer opens by declaring its role.

use serde::{Deserialize, Serialize};

/// The three protocol namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// A build worker offering platform capacity.
    Agent,
    /// A requester submitting builds.
    Client,
    /// A dashboard watching status and logs.
    Observer,
}

foundry_core::simple_display! {
    Role {
        Agent => "agent",
        Client => "client",
        Observer => "observer",
    }
}

/// First frame on every connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    pub role: Role,
}
