// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server-side observer session: status snapshots, rebuild and cancel
//! requests from dashboards.

use crate::coordinator::{
    update_status_and_persist, ObserverHandle, SessionId, SharedCoordinator,
};
use foundry_core::{
    BuildId, BuildStatus, Clock, Message, Priority, Sender, SerializeOpts, SystemClock,
};
use foundry_wire::{
    read_frame, ObserverToServer, ProtocolError, ServerToAgent, ServerToClient, ServerToObserver,
};
use tokio::io::AsyncRead;
use tokio::sync::mpsc::UnboundedSender;

/// Drive one observer connection until it closes. A fresh observer gets a
/// full snapshot immediately, as if it had asked to refresh.
pub async fn serve<R: AsyncRead + Unpin>(
    mut reader: R,
    session: SessionId,
    tx: UnboundedSender<ServerToObserver>,
    coordinator: SharedCoordinator,
) {
    {
        let mut state = coordinator.lock();
        state.register_observer(ObserverHandle { session: session.clone(), tx: tx.clone() });
        let snapshot = state.snapshot();
        let _ = tx.send(ServerToObserver::Status { snapshot });
    }

    loop {
        match read_frame::<_, ObserverToServer>(&mut reader).await {
            Ok(frame) => handle_frame(frame, &tx, &coordinator),
            Err(ProtocolError::ConnectionClosed) => break,
            Err(e) => {
                tracing::warn!(session = %session, error = %e, "observer connection error");
                break;
            }
        }
    }
    coordinator.lock().remove_observer(&session);
}

fn handle_frame(
    frame: ObserverToServer,
    tx: &UnboundedSender<ServerToObserver>,
    coordinator: &SharedCoordinator,
) {
    match frame {
        ObserverToServer::Refresh => {
            let snapshot = coordinator.lock().snapshot();
            let _ = tx.send(ServerToObserver::Status { snapshot });
        }
        ObserverToServer::Rebuild { build_id } => on_rebuild(&build_id, coordinator),
        ObserverToServer::Cancel { build_id } => on_cancel(&build_id, coordinator),
    }
}

/// Re-queue a build: its children when a master was named, the build
/// itself otherwise.
fn on_rebuild(build_id: &BuildId, coordinator: &SharedCoordinator) {
    let clock = SystemClock;
    let now = clock.epoch_ms();
    let targets = {
        let mut state = coordinator.lock();
        let Some(build) = state.registry.get(build_id) else {
            return;
        };
        let targets = if build.children.is_empty() {
            vec![build.id.clone()]
        } else {
            build.children.clone()
        };
        let msg = Message::new(
            Sender::Server,
            Priority::Status,
            "This build has been rescheduled for rebuild".to_string(),
            now,
        )
        .build_id(build_id.clone());
        state.log(msg);
        targets
    };
    for target in targets {
        update_status_and_persist(coordinator, &target, BuildStatus::Queued, now);
        coordinator.lock().enqueue(target);
    }
}

/// Cancel on the user's behalf: cooperative stage-granularity cancellation
/// on the agent, immediate removal from the queue, and a failure report to
/// the requester.
fn on_cancel(build_id: &BuildId, coordinator: &SharedCoordinator) {
    let clock = SystemClock;
    let now = clock.epoch_ms();
    let targets = {
        let state = coordinator.lock();
        let Some(build) = state.registry.get(build_id) else {
            return;
        };
        if build.children.is_empty() {
            vec![build.id.clone()]
        } else {
            build.children.clone()
        }
    };

    for target in &targets {
        update_status_and_persist(coordinator, target, BuildStatus::Cancelled, now);
    }

    let mut state = coordinator.lock();
    for target in &targets {
        state.dequeue_build(target);

        // Best-effort remote termination of the active external process
        let busy_session = state
            .agents()
            .find(|a| a.busy.as_ref() == Some(target))
            .map(|a| a.session.clone());
        if let Some(session) = busy_session {
            if let Some(agent) = state.agent_mut(&session) {
                let _ = agent.tx.send(ServerToAgent::Cancel { build_id: target.clone() });
                agent.busy = None;
            }
        }
    }

    let client_tx = state.client_for_build(build_id).map(|c| c.tx.clone());
    if let Some(tx) = client_tx {
        if let Some(payload) =
            state.registry.payload(build_id, SerializeOpts::STATUS, SerializeOpts::STATUS)
        {
            let _ = tx.send(ServerToClient::BuildFailed { build: payload });
        }
    }
    let msg = Message::new(
        Sender::Server,
        Priority::Error,
        "The build has been cancelled on user's request".to_string(),
        now,
    )
    .build_id(build_id.clone());
    state.log(msg);
}
