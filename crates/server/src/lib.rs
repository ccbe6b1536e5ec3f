// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! foundry-server: the build farm coordinator.
//!
//! Owns the build registry, the scheduling queue, the per-platform agent
//! worklists and all live sessions. One listener task accepts connections;
//! each connection gets a reader task and a writer task, and every state
//! mutation goes through the single coordinator lock.

pub mod coordinator;
pub mod env;
pub mod listener;
pub mod persist;
pub mod registry;
pub mod scheduler;
pub mod sessions;

pub use coordinator::{Coordinator, SessionId, SharedCoordinator};
pub use env::ServerConfig;
pub use listener::Listener;
pub use registry::BuildRegistry;

use foundry_core::{Clock, Message, Priority, Sender, SystemClock};

/// Bring the server up: reload persisted builds, bind the listener, start
/// the scheduler tick, and serve until the process ends.
pub async fn run(config: ServerConfig) -> Result<(), std::io::Error> {
    let coordinator = Coordinator::shared(config.clone());
    persist::reload_into(&coordinator, &SystemClock).await;

    let listener = Listener::bind(&config.listen, coordinator.clone()).await?;
    {
        let mut state = coordinator.lock();
        let addr = listener.local_addr().map(|a| a.to_string()).unwrap_or(config.listen.clone());
        let msg = Message::new(
            Sender::Server,
            Priority::Info,
            format!("listening on {addr}"),
            SystemClock.epoch_ms(),
        );
        state.log(msg);
    }

    let _scheduler = scheduler::spawn(coordinator.clone());
    listener.run().await;
    Ok(())
}
