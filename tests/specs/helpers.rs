// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures: an in-process server plus scripted wire peers.

use foundry_core::{Build, BuildConfig, BuildId, BuildPayload, BuildStatus, SerializeOpts};
use foundry_server::{Coordinator, Listener, ServerConfig, SharedCoordinator};
use foundry_wire::{
    read_frame, write_frame, AgentToServer, ClientToServer, Hello, ObserverToServer, Role,
    ServerToAgent, ServerToClient, ServerToObserver,
};
use std::net::SocketAddr;
use std::path::Path;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

pub async fn start_server(builds_root: &Path) -> (SocketAddr, SharedCoordinator) {
    let config = ServerConfig {
        listen: "127.0.0.1:0".to_string(),
        builds_root: builds_root.to_path_buf(),
        keep: 0,
        log_ring_cap: 200,
        queue_tick_ms: 20,
    };
    let coordinator = Coordinator::shared(config);
    let listener = Listener::bind("127.0.0.1:0", coordinator.clone()).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(listener.run());
    (addr, coordinator)
}

/// Poll until `predicate` holds; panics after ~2 seconds.
pub async fn wait_until(what: &str, mut predicate: impl FnMut() -> bool) {
    for _ in 0..200 {
        if predicate() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {what}");
}

pub struct WirePeer {
    pub reader: OwnedReadHalf,
    pub writer: OwnedWriteHalf,
}

impl WirePeer {
    pub async fn connect(addr: SocketAddr, role: Role) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        write_frame(&mut writer, &Hello { role }).await.unwrap();
        Self { reader, writer }
    }
}

/// A scripted agent speaking the agent namespace.
pub struct WireAgent {
    peer: WirePeer,
}

impl WireAgent {
    pub async fn connect(
        addr: SocketAddr,
        coordinator: &SharedCoordinator,
        name: &str,
        platforms: &[&str],
    ) -> Self {
        let before = coordinator.lock().agents().count();
        let mut peer = WirePeer::connect(addr, Role::Agent).await;
        write_frame(
            &mut peer.writer,
            &AgentToServer::Register {
                id: foundry_core::AgentId::new(),
                name: name.to_string(),
                platforms: platforms.iter().map(|p| p.to_string()).collect(),
            },
        )
        .await
        .unwrap();
        let registered = {
            let coordinator = coordinator.clone();
            move || coordinator.lock().agents().count() == before + 1
        };
        wait_until("agent registration", registered).await;
        Self { peer }
    }

    pub async fn send(&mut self, frame: AgentToServer) {
        write_frame(&mut self.peer.writer, &frame).await.unwrap();
    }

    /// Next non-log frame from the server.
    pub async fn recv(&mut self) -> ServerToAgent {
        loop {
            match read_frame::<_, ServerToAgent>(&mut self.peer.reader).await.unwrap() {
                ServerToAgent::Log { .. } => continue,
                frame => return frame,
            }
        }
    }
}

/// A scripted client speaking the client namespace.
pub struct WireClient {
    peer: WirePeer,
}

impl WireClient {
    pub async fn connect(addr: SocketAddr, save: bool) -> Self {
        let mut peer = WirePeer::connect(addr, Role::Client).await;
        write_frame(
            &mut peer.writer,
            &ClientToServer::Register { id: foundry_core::ClientId::new(), save },
        )
        .await
        .unwrap();
        Self { peer }
    }

    pub async fn send(&mut self, frame: ClientToServer) {
        write_frame(&mut self.peer.writer, &frame).await.unwrap();
    }

    /// Next build result (logs skipped).
    pub async fn recv_result(&mut self) -> ServerToClient {
        loop {
            match read_frame::<_, ServerToClient>(&mut self.peer.reader).await.unwrap() {
                ServerToClient::Log { .. } => continue,
                frame => return frame,
            }
        }
    }
}

/// A scripted observer speaking the observer namespace.
pub struct WireObserver {
    peer: WirePeer,
}

impl WireObserver {
    pub async fn connect(addr: SocketAddr) -> Self {
        Self { peer: WirePeer::connect(addr, Role::Observer).await }
    }

    pub async fn send(&mut self, frame: ObserverToServer) {
        write_frame(&mut self.peer.writer, &frame).await.unwrap();
    }

    pub async fn recv(&mut self) -> ServerToObserver {
        read_frame(&mut self.peer.reader).await.unwrap()
    }
}

/// Register a build for `platforms` and upload staged input files.
/// Returns the master id once every child is queued.
pub async fn submit_build(
    client: &mut WireClient,
    coordinator: &SharedCoordinator,
    number: &str,
    platforms: &[&str],
    files: Vec<foundry_core::FileRef>,
) -> BuildId {
    let conf =
        BuildConfig::new(platforms.iter().map(|p| p.to_string()).collect()).number(number);
    let mut master = Build::new(conf);
    master.status = BuildStatus::Uploading;
    master.files = files;
    let master_id = master.id.clone();

    client
        .send(ClientToServer::RegisterBuild { build: master.to_payload(SerializeOpts::STATUS) })
        .await;
    {
        let coordinator = coordinator.clone();
        let master_id = master_id.clone();
        wait_until("build registration", move || {
            coordinator.lock().registry.contains(&master_id)
        })
        .await;
    }

    client
        .send(ClientToServer::UploadBuild { build: master.to_payload(SerializeOpts::DISPATCH) })
        .await;
    let expected = platforms.len();
    {
        let coordinator = coordinator.clone();
        wait_until("children queued", move || coordinator.lock().queue.len() == expected).await;
    }
    master_id
}

/// The child build id for one platform of a master.
pub fn child_of(coordinator: &SharedCoordinator, master: &BuildId, platform: &str) -> BuildId {
    let state = coordinator.lock();
    let master = state.registry.get(master).expect("master registered");
    master
        .children
        .iter()
        .find(|id| {
            state
                .registry
                .get(id)
                .and_then(|b| b.platform())
                .map(|p| p == platform)
                .unwrap_or(false)
        })
        .cloned()
        .expect("child for platform")
}

pub fn status_of(coordinator: &SharedCoordinator, id: &BuildId) -> BuildStatus {
    coordinator.lock().registry.get(id).expect("build exists").status
}

/// A small staged input file, base64 content included.
pub fn staged_file(name: &str, group: Option<&str>, data: &[u8]) -> foundry_core::FileRef {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    foundry_core::FileRef {
        path: name.into(),
        group: group.map(String::from),
        content: Some(STANDARD.encode(data)),
    }
}

/// An agent-side result payload carrying one artifact.
pub fn success_payload(build_id: &BuildId, artifact: &str, data: &[u8]) -> BuildPayload {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    let mut build = Build::with_id(build_id.clone(), BuildConfig::default());
    build.status = BuildStatus::Building;
    let mut payload = build.to_payload(SerializeOpts::STATUS);
    payload.output_files = Some(vec![foundry_core::FilePayload {
        file: artifact.to_string(),
        group: None,
        content: Some(STANDARD.encode(data)),
    }]);
    payload
}
