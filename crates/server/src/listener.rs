// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener task: accepts connections, runs the role handshake, and wires
//! up one reader loop plus one writer task per connection.
//!
//! Connections are handled in spawned tasks so a slow peer never blocks the
//! accept loop or the scheduler.

use crate::coordinator::{SessionId, SharedCoordinator};
use crate::env::handshake_timeout;
use crate::sessions;
use foundry_wire::{read_frame_timeout, write_frame, Hello, ProtocolError, Role};
use serde::Serialize;
use tokio::io::AsyncWrite;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error};

pub struct Listener {
    tcp: TcpListener,
    coordinator: SharedCoordinator,
}

impl Listener {
    /// Bind the coordinator's TCP endpoint.
    pub async fn bind(addr: &str, coordinator: SharedCoordinator) -> std::io::Result<Self> {
        let tcp = TcpListener::bind(addr).await?;
        Ok(Self { tcp, coordinator })
    }

    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.tcp.local_addr().ok()
    }

    /// Accept connections until the process ends, spawning a task per
    /// connection.
    pub async fn run(self) {
        loop {
            match self.tcp.accept().await {
                Ok((stream, addr)) => {
                    debug!(%addr, "connection accepted");
                    let coordinator = self.coordinator.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, coordinator).await {
                            log_connection_error(e);
                        }
                    });
                }
                Err(e) => error!(error = %e, "accept error"),
            }
        }
    }
}

fn log_connection_error(e: ProtocolError) {
    match e {
        ProtocolError::ConnectionClosed => debug!("peer disconnected"),
        ProtocolError::Timeout => debug!("handshake timeout"),
        _ => error!(error = %e, "connection error"),
    }
}

/// Handshake and dispatch one connection to its namespace handler.
async fn handle_connection(
    stream: tokio::net::TcpStream,
    coordinator: SharedCoordinator,
) -> Result<(), ProtocolError> {
    let (mut reader, writer) = stream.into_split();
    let hello: Hello = read_frame_timeout(&mut reader, handshake_timeout()).await?;
    let session = SessionId::new();
    debug!(session = %session, role = %hello.role, "session started");

    match hello.role {
        Role::Agent => {
            let (tx, rx) = mpsc::unbounded_channel();
            spawn_writer(writer, rx);
            sessions::agent::serve(reader, session, tx, coordinator).await;
        }
        Role::Client => {
            let (tx, rx) = mpsc::unbounded_channel();
            spawn_writer(writer, rx);
            sessions::client::serve(reader, session, tx, coordinator).await;
        }
        Role::Observer => {
            let (tx, rx) = mpsc::unbounded_channel();
            spawn_writer(writer, rx);
            sessions::observer::serve(reader, session, tx, coordinator).await;
        }
    }
    Ok(())
}

/// Drain a session's outbound queue onto its socket. Pre-serialized frames
/// keep the coordinator lock out of the write path entirely.
fn spawn_writer<W, T>(mut writer: W, mut rx: mpsc::UnboundedReceiver<T>)
where
    W: AsyncWrite + Unpin + Send + 'static,
    T: Serialize + Send + Sync + 'static,
{
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = write_frame(&mut writer, &frame).await {
                debug!(error = %e, "writer task ending");
                break;
            }
        }
    });
}
