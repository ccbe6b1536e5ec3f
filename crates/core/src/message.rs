// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prioritized log lines with sender/build attribution.
//!
//! A [`Message`] is the unit of user-visible logging: it renders on the
//! console, is appended to the owning build's log, and travels over the wire
//! to dashboards and the requesting client. This is deliberately separate
//! from `tracing`, which carries operational diagnostics only.

use crate::build::BuildId;
use serde::{Deserialize, Serialize};

/// Message priority, highest urgency first.
///
/// `BuildOutput` is the distinguished raw toolchain output level: it renders
/// without the structured sender/build prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Error,
    Warning,
    Status,
    Info,
    BuildOutput,
    Debug,
}

impl Priority {
    /// Numeric level, 1 = error .. 6 = debug.
    pub fn level(self) -> u8 {
        match self {
            Priority::Error => 1,
            Priority::Warning => 2,
            Priority::Status => 3,
            Priority::Info => 4,
            Priority::BuildOutput => 5,
            Priority::Debug => 6,
        }
    }
}

crate::simple_display! {
    Priority {
        Error => "error",
        Warning => "warning",
        Status => "status",
        Info => "info",
        BuildOutput => "build_output",
        Debug => "debug",
    }
}

/// Which component emitted a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    /// The coordinator itself
    Server,
    /// The server-side representative of an agent connection
    AgentSession,
    /// The server-side representative of a client connection
    ClientSession,
    /// The remote agent worker process
    AgentWorker,
    /// The remote client worker process
    ClientWorker,
}

impl Sender {
    /// Console signature, matching the component that speaks.
    pub fn signature(self) -> &'static str {
        match self {
            Sender::Server => "[S] Server",
            Sender::AgentSession => "[SA] Server",
            Sender::ClientSession => "[SC] Server",
            Sender::AgentWorker => "[AW] Agent",
            Sender::ClientWorker => "[CW] Client",
        }
    }
}

crate::simple_display! {
    Sender {
        Server => "server",
        AgentSession => "agent_session",
        ClientSession => "client_session",
        AgentWorker => "agent_worker",
        ClientWorker => "client_worker",
    }
}

/// A structured, prioritized log line.
///
/// Immutable once constructed; the only mutation in its lifetime is the
/// construction-time backtrace augmentation applied when the text matches a
/// known process-failure pattern (a diagnostic aid, not business logic).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub at_ms: u64,
    pub priority: Priority,
    pub sender: Sender,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_id: Option<BuildId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_number: Option<String>,
    pub text: String,
}

impl Message {
    pub fn new(sender: Sender, priority: Priority, text: impl Into<String>, at_ms: u64) -> Self {
        Self {
            at_ms,
            priority,
            sender,
            sender_id: None,
            sender_name: None,
            build_id: None,
            build_number: None,
            text: augment_process_failure(text.into()),
        }
    }

    crate::setters! {
        option {
            sender_id: String,
            sender_name: String,
            build_number: String,
        }
    }

    pub fn build_id(mut self, id: impl Into<BuildId>) -> Self {
        self.build_id = Some(id.into());
        self
    }

    /// Render for the console.
    ///
    /// Raw build output is passed through verbatim; everything else gets the
    /// `[sig] @sender about #build:` prefix.
    pub fn render(&self) -> String {
        if self.priority == Priority::BuildOutput {
            return self.text.clone();
        }
        let mut out = String::from(self.sender.signature());
        if let Some(who) = self.sender_name.as_deref().or(self.sender_id.as_deref()) {
            out.push_str(" @");
            out.push_str(who);
        }
        if let Some(what) =
            self.build_number.as_deref().or(self.build_id.as_ref().map(|id| id.as_str()))
        {
            out.push_str(" about #");
            out.push_str(what);
        }
        out.push_str(": ");
        out.push_str(&self.text);
        out
    }
}

/// Append a captured backtrace when the text reports a failed external
/// process, so the origin of the report survives into forwarded logs.
fn augment_process_failure(text: String) -> String {
    if text.to_ascii_lowercase().contains("command failed") {
        let trace = std::backtrace::Backtrace::force_capture();
        format!("{text}\n{trace}")
    } else {
        text
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
