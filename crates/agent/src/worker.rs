// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The agent worker: connection lifecycle and build execution driver.

use crate::env::AgentConfig;
use crate::hooks::hooks_for;
use crate::pipeline::{BuildPipeline, PipelineError};
use foundry_core::{
    files, AgentId, Build, BuildId, BuildStatus, Clock, FileRef, Message, Priority, Sender,
    SerializeOpts, SystemClock,
};
use foundry_wire::{read_frame, write_frame, AgentToServer, Hello, ProtocolError, Role, ServerToAgent};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

/// Outbound channel to the server plus console mirroring. Cheap to clone;
/// every pipeline stage logs through this.
#[derive(Clone)]
pub struct ServerLink {
    tx: mpsc::UnboundedSender<AgentToServer>,
}

impl ServerLink {
    pub fn new(tx: mpsc::UnboundedSender<AgentToServer>) -> Self {
        Self { tx }
    }

    pub fn send(&self, frame: AgentToServer) {
        let _ = self.tx.send(frame);
    }

    /// Log a build-scoped line to the console and forward it to the server.
    pub fn log(&self, build: &Build, priority: Priority, text: impl Into<String>) {
        let mut message =
            Message::new(Sender::AgentWorker, priority, text, SystemClock.epoch_ms())
                .build_id(build.id.clone());
        if let Some(number) = &build.conf.number {
            message = message.build_number(number.clone());
        }
        println!("{}", message.render());
        self.send(AgentToServer::Log { message });
    }
}

/// The build currently executing on this worker.
struct ActiveBuild {
    id: BuildId,
    token: tokio_util::sync::CancellationToken,
}

type ActiveSlot = Arc<Mutex<Option<ActiveBuild>>>;

pub struct AgentWorker {
    config: AgentConfig,
    id: AgentId,
}

impl AgentWorker {
    pub fn new(config: AgentConfig) -> Self {
        Self { config, id: AgentId::new() }
    }

    /// Connect-and-serve forever, reconnecting after every disconnect.
    pub async fn run(self) {
        loop {
            match TcpStream::connect(&self.config.server_addr).await {
                Ok(stream) => {
                    println!(
                        "AgentWorker connected! Supporting platforms: {}",
                        self.config.platforms.join(", ")
                    );
                    if let Err(e) = self.serve_connection(stream).await {
                        tracing::debug!(error = %e, "connection ended");
                    }
                    println!(
                        "AgentWorker disconnected! Affected platforms: {}",
                        self.config.platforms.join(", ")
                    );
                }
                Err(e) => {
                    tracing::debug!(error = %e, "connect failed, will retry");
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(self.config.reconnect_delay_ms))
                .await;
        }
    }

    async fn serve_connection(&self, stream: TcpStream) -> Result<(), ProtocolError> {
        let (mut reader, mut writer) = stream.into_split();
        write_frame(&mut writer, &Hello { role: Role::Agent }).await?;

        let (tx, mut rx) = mpsc::unbounded_channel::<AgentToServer>();
        tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if write_frame(&mut writer, &frame).await.is_err() {
                    break;
                }
            }
        });

        let link = ServerLink::new(tx);
        link.send(AgentToServer::Register {
            id: self.id.clone(),
            name: self.config.name.clone(),
            platforms: self.config.platforms.clone(),
        });

        let active: ActiveSlot = Arc::new(Mutex::new(None));
        loop {
            match read_frame::<_, ServerToAgent>(&mut reader).await {
                Ok(ServerToAgent::Build { build }) => {
                    let config = self.config.clone();
                    let link = link.clone();
                    let active = active.clone();
                    tokio::spawn(async move {
                        run_build(config, link, active, build).await;
                    });
                }
                Ok(ServerToAgent::Cancel { build_id }) => {
                    let slot = active.lock();
                    if let Some(current) = slot.as_ref() {
                        if current.id == build_id {
                            current.token.cancel();
                        }
                    }
                }
                Ok(ServerToAgent::Log { message }) => {
                    println!("{}", message.render());
                }
                Err(ProtocolError::ConnectionClosed) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }
}

/// Execute one dispatched build through the pipeline and report the result.
async fn run_build(
    config: AgentConfig,
    link: ServerLink,
    active: ActiveSlot,
    payload: foundry_core::BuildPayload,
) {
    let (mut build, _) = Build::from_payload(payload);
    let Some(platform) = build.platform().map(str::to_string) else {
        build_failed(
            &link,
            &mut build,
            "No platform was specified for the requested build!".to_string(),
            &config.work_root,
        )
        .await;
        return;
    };
    if !config.platforms.contains(&platform) {
        build_failed(
            &link,
            &mut build,
            format!(
                "Platform '{platform}' was requested for this build but this agent doesn't support it!"
            ),
            &config.work_root,
        )
        .await;
        return;
    }
    let Some(hooks) = hooks_for(&platform) else {
        build_failed(
            &link,
            &mut build,
            format!("No build sequence is available for platform '{platform}'"),
            &config.work_root,
        )
        .await;
        return;
    };

    link.send(AgentToServer::Building { build_id: build.id.clone() });
    build.status = BuildStatus::Building;

    let token = tokio_util::sync::CancellationToken::new();
    *active.lock() = Some(ActiveBuild { id: build.id.clone(), token: token.clone() });

    let mut pipeline = BuildPipeline::new(config.clone(), build, link.clone(), token.clone());
    let result = pipeline.run(hooks.as_ref()).await;
    let work_dir = pipeline.work_dir().to_path_buf();
    let mut build = pipeline.into_build();
    match result {
        Ok(artifacts) => {
            upload_success(&link, build, artifacts, &work_dir).await;
        }
        Err(PipelineError::Cancelled) => {
            // Cancellation was user-requested; the server already knows
        }
        Err(e) => {
            build_failed(&link, &mut build, e.to_string(), &work_dir).await;
        }
    }
    *active.lock() = None;
}

/// Transfer artifacts back to the server, then release local buffers and
/// leave a state dump beside the work folder.
async fn upload_success(link: &ServerLink, mut build: Build, mut artifacts: Vec<FileRef>, work_dir: &Path) {
    link.send(AgentToServer::Uploading { build_id: build.id.clone() });

    if let Err(e) = files::read_contents(&mut artifacts).await {
        files::free_contents(&mut artifacts);
        build_failed(link, &mut build, format!("{e}"), work_dir).await;
        return;
    }

    let size = files::staged_len(&artifacts);
    if size > 0 {
        link.log(
            &build,
            Priority::Info,
            format!("Uploading results file(s) to the build server... ({size} bytes)"),
        );
    }

    let mut payload = build.to_payload(SerializeOpts::STATUS);
    payload.output_files = Some(
        artifacts
            .iter()
            .map(|f| artifact_payload(f, build.conf.name.as_deref()))
            .collect(),
    );
    link.send(AgentToServer::BuildSuccess { build: payload });
    files::free_contents(&mut artifacts);
    build.output_files = artifacts;

    save_local_state(&build, work_dir).await;
}

/// Primary artifacts are renamed after the configured application name;
/// logs and secondary files keep their own names.
fn artifact_payload(file: &FileRef, app_name: Option<&str>) -> foundry_core::FilePayload {
    let mut payload = file.to_payload(true);
    if let Some(name) = app_name {
        if let Some(ext) = file.path.extension().and_then(|e| e.to_str()) {
            if matches!(ext, "ipa" | "apk" | "xap") {
                payload.file = format!("{name}.{ext}");
            }
        }
    }
    payload
}

/// The single agent-side failure funnel: log with context, free memory,
/// persist local state, notify the server once.
async fn build_failed(link: &ServerLink, build: &mut Build, error: String, work_dir: &Path) {
    if build.status == BuildStatus::Cancelled {
        return;
    }
    build.status = BuildStatus::Failed;
    link.log(build, Priority::Error, error);
    link.log(
        build,
        Priority::Error,
        format!(
            "*** BUILD FAILED on {} ***",
            build.platform().unwrap_or("unknown platform")
        ),
    );
    files::free_contents(&mut build.files);
    save_local_state(build, work_dir).await;
    link.send(AgentToServer::BuildFailed { build: build.to_payload(SerializeOpts::STATUS) });
}

/// Keep a `build.<platform>.json` dump in the work folder for post-mortems.
async fn save_local_state(build: &Build, work_dir: &Path) {
    let Some(platform) = build.platform() else {
        return;
    };
    let path = work_dir.join(format!("build.{platform}.json"));
    let payload = build.to_payload(SerializeOpts::PERSIST);
    match serde_json::to_vec_pretty(&payload) {
        Ok(json) => {
            if let Err(e) = tokio::fs::write(&path, json).await {
                tracing::debug!(path = %path.display(), error = %e, "could not save local build state");
            }
        }
        Err(e) => tracing::debug!(error = %e, "could not encode local build state"),
    }
}
