// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server-side client session: build registration, file intake, force-fail.

use crate::coordinator::{
    fail_build, update_status_and_persist, ClientHandle, SessionId, SharedCoordinator,
};
use crate::persist;
use foundry_core::{
    files, Build, BuildId, BuildPayload, BuildStatus, Clock, Message, Priority, Sender,
    SystemClock,
};
use foundry_wire::{read_frame, ClientToServer, ProtocolError, ServerToClient};
use tokio::io::AsyncRead;
use tokio::sync::mpsc::UnboundedSender;

/// Drive one client connection until it closes.
pub async fn serve<R: AsyncRead + Unpin>(
    mut reader: R,
    session: SessionId,
    tx: UnboundedSender<ServerToClient>,
    coordinator: SharedCoordinator,
) {
    loop {
        match read_frame::<_, ClientToServer>(&mut reader).await {
            Ok(frame) => handle_frame(frame, &session, &tx, &coordinator).await,
            Err(ProtocolError::ConnectionClosed) => break,
            Err(e) => {
                tracing::warn!(session = %session, error = %e, "client connection error");
                break;
            }
        }
    }
    on_disconnect(&session, &coordinator);
}

async fn handle_frame(
    frame: ClientToServer,
    session: &SessionId,
    tx: &UnboundedSender<ServerToClient>,
    coordinator: &SharedCoordinator,
) {
    let clock = SystemClock;
    match frame {
        ClientToServer::Register { id, save } => {
            let mut state = coordinator.lock();
            state.register_client(ClientHandle {
                session: session.clone(),
                id: id.clone(),
                save,
                tx: tx.clone(),
            });
            let msg = Message::new(
                Sender::Server,
                Priority::Debug,
                format!("A client with id {id} has just connected. Welcome!"),
                clock.epoch_ms(),
            );
            state.log(msg);
        }

        ClientToServer::RegisterBuild { build } => {
            on_register_build(session, build, tx, coordinator);
        }

        ClientToServer::UploadBuild { build } => {
            on_upload_build(build, coordinator).await;
        }

        ClientToServer::FailBuild { build_id } => {
            on_fail_build(&build_id, coordinator);
        }

        ClientToServer::Log { mut message } => {
            message.at_ms = clock.epoch_ms();
            coordinator.lock().log(message);
        }
    }
}

/// Register a master build plus one child per requested platform. The
/// requester's initial status is applied as-is; platforms without any
/// registered capability get a warning but still queue and wait.
fn on_register_build(
    session: &SessionId,
    payload: BuildPayload,
    tx: &UnboundedSender<ServerToClient>,
    coordinator: &SharedCoordinator,
) {
    let clock = SystemClock;
    let now = clock.epoch_ms();

    if payload.conf.platforms.is_empty() {
        let mut state = coordinator.lock();
        let msg = Message::new(
            Sender::ClientSession,
            Priority::Error,
            "The client requested a build but didn't specify any platforms to build against"
                .to_string(),
            now,
        );
        state.log(msg);
        let _ = tx.send(ServerToClient::BuildFailed { build: payload });
        return;
    }

    let (master_id, initial_status) = {
        let mut state = coordinator.lock();
        let initial_status = payload.status;
        let (mut master, _) = Build::from_payload(payload);
        master.started_at_ms = Some(now);
        master.files = Vec::new();
        let master_id = master.id.clone();
        let platforms = master.conf.platforms.clone();

        for platform in &platforms {
            if !state.has_capability(platform) {
                let msg = Message::new(
                    Sender::ClientSession,
                    Priority::Warning,
                    format!(
                        "The client requested a build on platform '{platform}', but there is no agent connected yet on that platform."
                    ),
                    now,
                )
                .build_id(master_id.clone());
                state.log(msg);
            }
        }

        let children: Vec<Build> = platforms
            .iter()
            .map(|platform| {
                let mut child = Build::new(master.conf.child_for(platform));
                child.started_at_ms = Some(now);
                child.status = initial_status;
                child
            })
            .collect();

        let label = master.label();
        state.registry.insert_tree(master, children);
        state.set_origin(master_id.clone(), session.clone());

        let msg = Message::new(
            Sender::ClientSession,
            Priority::Info,
            format!("The build '{label}' has been registered on: {}", platforms.join(",")),
            now,
        )
        .build_id(master_id.clone());
        state.log(msg);
        (master_id, initial_status)
    };
    update_status_and_persist(coordinator, &master_id, initial_status, now);
}

/// File intake: persist the upload, partition the shared set per platform,
/// and enqueue every child.
async fn on_upload_build(payload: BuildPayload, coordinator: &SharedCoordinator) {
    let clock = SystemClock;
    let prepared = {
        let mut state = coordinator.lock();
        let Some(build) = state.registry.get(&payload.id) else {
            let msg = Message::new(
                Sender::ClientSession,
                Priority::Error,
                "upload-build: The client said it is uploading a build that was never registered"
                    .to_string(),
                clock.epoch_ms(),
            );
            state.log(msg);
            return;
        };
        let build_id = build.id.clone();
        let input_dir = persist::input_dir(&state.config.builds_root, &build.label());
        let incoming: Vec<foundry_core::FileRef> = payload
            .files
            .unwrap_or_default()
            .into_iter()
            .map(foundry_core::FileRef::from_payload)
            .collect();
        (build_id, input_dir, incoming)
    };
    let (build_id, input_dir, mut incoming) = prepared;

    // Content buffers are released file-by-file as they land on disk
    if let Err(e) = files::write_contents(&input_dir, &mut incoming, false).await {
        fail_build(
            coordinator,
            &build_id,
            Sender::ClientSession,
            format!("The uploaded files could not be saved on the server:\n{e}"),
            clock.epoch_ms(),
        );
        return;
    }

    let now = clock.epoch_ms();
    let to_enqueue = {
        let mut state = coordinator.lock();
        let Some(build) = state.registry.get_mut(&build_id) else {
            return;
        };
        build.files = incoming.clone();
        let platforms_msg = build.conf.platforms.join(",");
        let children = build.children.clone();

        let msg = Message::new(
            Sender::ClientSession,
            Priority::Status,
            format!("Build has been queued on platforms: {platforms_msg}"),
            now,
        )
        .build_id(build_id.clone());
        state.log(msg);

        let mut to_enqueue = Vec::new();
        for child_id in children {
            let Some(child) = state.registry.get_mut(&child_id) else {
                continue;
            };
            let platform = child.platform().unwrap_or_default().to_string();
            child.files = files::partition_for_platform(&incoming, &platform);
            to_enqueue.push((child_id, platform));
        }
        to_enqueue
    };

    update_status_and_persist(coordinator, &build_id, BuildStatus::Queued, now);
    for (child_id, platform) in to_enqueue {
        update_status_and_persist(coordinator, &child_id, BuildStatus::Queued, now);
        let mut state = coordinator.lock();
        state.enqueue(child_id.clone());
        let msg = Message::new(
            Sender::ClientSession,
            Priority::Info,
            format!("build queued on {platform}"),
            now,
        )
        .build_id(child_id);
        state.log(msg);
    }
}

/// Force-fail a build and all its children without going through the
/// pipeline (used when the upload itself could not proceed).
fn on_fail_build(build_id: &BuildId, coordinator: &SharedCoordinator) {
    let clock = SystemClock;
    let now = clock.epoch_ms();
    let targets = {
        let state = coordinator.lock();
        let Some(build) = state.registry.get(build_id) else {
            return;
        };
        let mut targets = build.children.clone();
        if targets.is_empty() {
            targets.push(build.id.clone());
        }
        targets
    };
    for target in targets {
        update_status_and_persist(coordinator, &target, BuildStatus::Failed, now);
        coordinator.lock().dequeue_build(&target);
    }
}

fn on_disconnect(session: &SessionId, coordinator: &SharedCoordinator) {
    let clock = SystemClock;
    let mut state = coordinator.lock();
    if let Some(handle) = state.remove_client(session) {
        let msg = Message::new(
            Sender::Server,
            Priority::Debug,
            format!("The client with id {} has disconnected. Bye!", handle.id),
            clock.epoch_ms(),
        );
        state.log(msg);
    }
}
