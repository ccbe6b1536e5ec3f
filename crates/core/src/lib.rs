// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! foundry-core: shared domain types for the Foundry build farm.
//!
//! Holds the build entity and its status lattice, the log message type,
//! the file transfer codec, and the small ambient helpers (clock, ids,
//! retention pruning) used by both the server and the worker crates.

pub mod macros;

pub mod build;
pub mod clock;
pub mod files;
pub mod id;
pub mod message;
pub mod retention;
pub mod time_fmt;

#[cfg(any(test, feature = "test-support"))]
pub use build::BuildBuilder;
pub use build::{Build, BuildConfig, BuildId, BuildPayload, BuildStatus, SerializeOpts};
pub use clock::{Clock, FakeClock, SystemClock};
pub use files::{partition_for_platform, FileError, FilePayload, FileRef};
pub use id::{short, AgentId, ClientId};
pub use message::{Message, Priority, Sender};
pub use retention::prune_oldest;
pub use time_fmt::format_elapsed_ms;
