// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire protocol binding the build server, agents, clients and observers.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload. Each
//! connection opens with a [`Hello`] frame declaring its role; every frame
//! after that belongs to the role's namespace.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod agent;
mod client;
mod frame;
mod observer;
mod session;

pub use agent::{AgentToServer, ServerToAgent};
pub use client::{ClientToServer, ServerToClient};
pub use frame::{
    decode, encode, read_frame, read_frame_timeout, read_message, write_frame, write_message,
    ProtocolError, MAX_FRAME_LEN,
};
pub use observer::{AgentInfo, ObserverToServer, ServerToObserver, StatusSnapshot};
pub use session::{Hello, Role};
