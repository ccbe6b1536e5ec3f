// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server-side agent session: registration, result intake, disconnect
//! recovery.

use crate::coordinator::{
    fail_build, update_status_and_persist, AgentHandle, SessionId, SharedCoordinator,
};
use crate::persist;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use foundry_core::{
    files, BuildId, BuildPayload, BuildStatus, Clock, FileRef, Message, Priority, Sender,
    SerializeOpts, SystemClock,
};
use foundry_wire::{read_frame, AgentToServer, ProtocolError, ServerToAgent, ServerToClient};
use tokio::io::AsyncRead;
use tokio::sync::mpsc::UnboundedSender;

/// Drive one agent connection until it closes, then run disconnect
/// recovery.
pub async fn serve<R: AsyncRead + Unpin>(
    mut reader: R,
    session: SessionId,
    tx: UnboundedSender<ServerToAgent>,
    coordinator: SharedCoordinator,
) {
    loop {
        match read_frame::<_, AgentToServer>(&mut reader).await {
            Ok(frame) => handle_frame(frame, &session, &tx, &coordinator).await,
            Err(ProtocolError::ConnectionClosed) => break,
            Err(e) => {
                tracing::warn!(session = %session, error = %e, "agent connection error");
                break;
            }
        }
    }
    on_disconnect(&session, &coordinator);
}

async fn handle_frame(
    frame: AgentToServer,
    session: &SessionId,
    tx: &UnboundedSender<ServerToAgent>,
    coordinator: &SharedCoordinator,
) {
    let clock = SystemClock;
    match frame {
        AgentToServer::Register { id, name, platforms } => {
            let mut state = coordinator.lock();
            let handle = AgentHandle {
                session: session.clone(),
                id: id.clone(),
                name,
                platforms,
                busy: None,
                tx: tx.clone(),
            };
            let info = handle.info();
            state.register_agent(handle);
            let msg = Message::new(
                Sender::Server,
                Priority::Debug,
                format!(
                    "An agent with id {id} has just connected supporting the platforms [{}]",
                    info.platforms.join(", ")
                ),
                clock.epoch_ms(),
            );
            state.log(msg);
            if let Ok(obj) = serde_json::to_value(&info) {
                state.news("connected", "agent", obj);
            }
        }

        AgentToServer::Building { build_id } => {
            update_status_and_persist(coordinator, &build_id, BuildStatus::Building, clock.epoch_ms());
        }

        AgentToServer::Uploading { build_id } => {
            update_status_and_persist(coordinator, &build_id, BuildStatus::Uploading, clock.epoch_ms());
        }

        AgentToServer::BuildSuccess { build } => {
            on_build_success(session, build, coordinator).await;
        }

        AgentToServer::BuildFailed { build } => {
            on_build_failed(session, build, coordinator);
        }

        AgentToServer::Log { mut message } => {
            // Stamp forwarded messages with the server's clock
            message.at_ms = clock.epoch_ms();
            coordinator.lock().log_to_client(message);
        }
    }
}

/// Result intake for a successful build: persist renamed artifacts, settle
/// master bookkeeping, forward to the requester, free memory, prune per
/// retention policy, and free the agent for new work.
async fn on_build_success(
    session: &SessionId,
    payload: BuildPayload,
    coordinator: &SharedCoordinator,
) {
    let clock = SystemClock;
    let prepared = {
        let mut state = coordinator.lock();
        let Some(build) = state.registry.get(&payload.id) else {
            let msg = Message::new(
                Sender::AgentSession,
                Priority::Error,
                format!("Build with id {} is not defined on the server", payload.id),
                clock.epoch_ms(),
            );
            state.log(msg);
            return;
        };
        let build_id = build.id.clone();
        let number = build.conf.number.clone();
        let root_label = state
            .registry
            .root_of(&build_id)
            .map(|r| r.label())
            .unwrap_or_else(|| payload.id.to_string());
        let dir = persist::root_dir(&state.config.builds_root, &root_label);

        // Artifacts land under the root build's folder with numbered names
        let outputs: Vec<FileRef> = payload
            .output_files
            .clone()
            .unwrap_or_default()
            .into_iter()
            .map(|p| {
                let mut file = FileRef::from_payload(p);
                if let Some(number) = &number {
                    file.path = format!("{number}.{}", file.name()).into();
                }
                file
            })
            .collect();

        let msg = Message::new(
            Sender::AgentSession,
            Priority::Info,
            "Files received. Storing them on the server".to_string(),
            clock.epoch_ms(),
        )
        .build_id(build_id.clone());
        let msg = match &number {
            Some(n) => msg.build_number(n.clone()),
            None => msg,
        };
        state.log(msg);
        (build_id, dir, root_label, outputs)
    };
    let (build_id, dir, root_label, mut outputs) = prepared;

    // Keep content: the same buffers may still be owed to the client
    if let Err(e) = files::write_contents(&dir, &mut outputs, true).await {
        files::free_contents(&mut outputs);
        release_agent(session, coordinator);
        fail_build(
            coordinator,
            &build_id,
            Sender::AgentSession,
            format!("error saving build output files on the server\n{e}"),
            clock.epoch_ms(),
        );
        return;
    }

    let now = clock.epoch_ms();
    {
        let mut state = coordinator.lock();
        if let Some(build) = state.registry.get_mut(&build_id) {
            build.output_files = outputs
                .iter()
                .map(|f| FileRef { path: f.path.clone(), group: f.group.clone(), content: None })
                .collect();
            build.mark_completed(now);
        }
    }
    update_status_and_persist(coordinator, &build_id, BuildStatus::Success, now);

    {
        let mut state = coordinator.lock();
        let master_id = state.registry.get(&build_id).and_then(|b| b.master_id.clone());
        if let Some(master_id) = &master_id {
            if state.registry.all_children_terminal(master_id) {
                if let Some(master) = state.registry.get_mut(master_id) {
                    master.mark_completed(now);
                }
                // The final sibling also delivers the master's state dump
                if let Some(master_payload) = state.registry.payload(
                    master_id,
                    SerializeOpts::PERSIST,
                    SerializeOpts { platforms: false, ..SerializeOpts::PERSIST },
                ) {
                    if let Ok(json) = serde_json::to_vec_pretty(&master_payload) {
                        outputs.push(FileRef {
                            path: "build.json".into(),
                            group: None,
                            content: Some(BASE64.encode(json)),
                        });
                    }
                }
            }
        }

        let client = state.client_for_build(&build_id).map(|c| (c.save, c.tx.clone()));
        if let Some((save, client_tx)) = client {
            if save {
                let msg = Message::new(
                    Sender::AgentSession,
                    Priority::Info,
                    "Also sending the output files to the client".to_string(),
                    now,
                )
                .build_id(build_id.clone());
                state.log(msg);
            }
            if let Some(build) = state.registry.get(&build_id) {
                let mut result = build.to_payload(SerializeOpts::STATUS);
                result.output_files =
                    Some(outputs.iter().map(|f| f.to_payload(save)).collect());
                let _ = client_tx.send(ServerToClient::BuildSuccess { build: result });
            }
        }

        let msg = Message::new(
            Sender::AgentSession,
            Priority::Info,
            "Build done, ready for a new one.".to_string(),
            now,
        )
        .build_id(build_id.clone());
        state.log(msg);

        if let Some(child_payload) = state.registry.payload(
            &build_id,
            SerializeOpts::PERSIST,
            SerializeOpts::PERSIST,
        ) {
            if let Some(platform) = state.registry.get(&build_id).and_then(|b| b.platform()) {
                persist::spawn_save_child(
                    coordinator,
                    root_label.clone(),
                    platform.to_string(),
                    child_payload,
                );
            }
        }
    }
    files::free_contents(&mut outputs);
    release_agent(session, coordinator);

    apply_retention(coordinator, &build_id).await;
}

/// Result intake for a failed build: settle bookkeeping and free the agent.
/// No automatic retry.
fn on_build_failed(session: &SessionId, payload: BuildPayload, coordinator: &SharedCoordinator) {
    let clock = SystemClock;
    let now = clock.epoch_ms();
    let found = {
        let mut state = coordinator.lock();
        match state.registry.get(&payload.id) {
            Some(build) => Some((build.id.clone(), build.status)),
            None => {
                let msg = Message::new(
                    Sender::AgentSession,
                    Priority::Error,
                    format!(
                        "The build {} was requested to be failing but we couldn't identify such build",
                        payload.id
                    ),
                    now,
                );
                state.log(msg);
                None
            }
        }
    };
    let Some((build_id, status)) = found else {
        return;
    };

    if status != BuildStatus::Failed {
        update_status_and_persist(coordinator, &build_id, BuildStatus::Failed, now);
        release_agent(session, coordinator);
    }

    let mut state = coordinator.lock();
    if let Some(build) = state.registry.get_mut(&build_id) {
        build.mark_completed(now);
    }
    let master_id = state.registry.get(&build_id).and_then(|b| b.master_id.clone());
    if let Some(master_id) = master_id {
        if state.registry.all_children_terminal(&master_id) {
            if let Some(master) = state.registry.get_mut(&master_id) {
                master.mark_completed(now);
            }
        }
    }

    let client_tx = state.client_for_build(&build_id).map(|c| c.tx.clone());
    if let Some(tx) = client_tx {
        if let Some(result) =
            state.registry.payload(&build_id, SerializeOpts::STATUS, SerializeOpts::STATUS)
        {
            let _ = tx.send(ServerToClient::BuildFailed { build: result });
        }
    }

    let root_label = state.registry.root_of(&build_id).map(|r| r.label());
    if let (Some(root_label), Some(child_payload)) = (
        root_label,
        state.registry.payload(&build_id, SerializeOpts::PERSIST, SerializeOpts::PERSIST),
    ) {
        if let Some(platform) = state.registry.get(&build_id).and_then(|b| b.platform()) {
            persist::spawn_save_child(
                coordinator,
                root_label,
                platform.to_string(),
                child_payload,
            );
        }
    }
}

/// Disconnect is an infrastructure fault, not a build defect: an in-flight
/// build goes back on the queue instead of failing.
fn on_disconnect(session: &SessionId, coordinator: &SharedCoordinator) {
    let clock = SystemClock;
    let now = clock.epoch_ms();
    let requeue = {
        let mut state = coordinator.lock();
        let Some(handle) = state.remove_agent(session) else {
            return;
        };
        let info = handle.info();
        let msg = Message::new(
            Sender::Server,
            Priority::Debug,
            format!("The agent with id {} has disconnected. Bye!", handle.id),
            now,
        );
        state.log(msg);
        if let Ok(obj) = serde_json::to_value(&info) {
            state.news("disconnected", "agent", obj);
        }

        handle.busy.map(|build_id| {
            let platform = state
                .registry
                .get(&build_id)
                .and_then(|b| b.platform().map(str::to_string))
                .unwrap_or_else(|| "unknown".to_string());
            let msg = Message::new(
                Sender::Server,
                Priority::Warning,
                format!(
                    "the agent {} has been disconnected. The build on {platform} will be added back to queue",
                    handle.name
                ),
                now,
            )
            .build_id(build_id.clone());
            state.log(msg);
            build_id
        })
    };

    if let Some(build_id) = requeue {
        update_status_and_persist(coordinator, &build_id, BuildStatus::Queued, now);
        coordinator.lock().enqueue(build_id);
    }
}

fn release_agent(session: &SessionId, coordinator: &SharedCoordinator) {
    let mut state = coordinator.lock();
    if let Some(agent) = state.agent_mut(session) {
        agent.busy = None;
        let info = agent.info();
        if let Ok(obj) = serde_json::to_value(&info) {
            state.news("agent-status", "agent", obj);
        }
    }
}

/// Prune the oldest build folders beyond the retention window; builds whose
/// folders were removed leave every registry as `deleted`.
async fn apply_retention(coordinator: &SharedCoordinator, context_build: &BuildId) {
    let clock = SystemClock;
    let (builds_root, keep) = {
        let state = coordinator.lock();
        (state.config.builds_root.clone(), state.config.keep)
    };
    match foundry_core::prune_oldest(&builds_root, keep).await {
        Ok(pruned) => {
            let mut state = coordinator.lock();
            for path in pruned {
                let label = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                if let Some(id) = state.registry.root_by_label(&label).map(|b| b.id.clone()) {
                    state.delete_build(&id);
                }
            }
        }
        Err(e) => {
            let mut state = coordinator.lock();
            let msg = Message::new(
                Sender::AgentSession,
                Priority::Debug,
                format!(
                    "Error while cleaning up last {keep} folders in the server builds folder {}:\n{e}",
                    builds_root.display()
                ),
                clock.epoch_ms(),
            )
            .build_id(context_build.clone());
            state.log(msg);
        }
    }
}
