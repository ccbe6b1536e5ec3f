// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The client worker: submit, upload, await results, save artifacts.

use crate::env::ClientConfig;
use foundry_core::{
    files, format_elapsed_ms, Build, BuildConfig, BuildPayload, BuildStatus, ClientId, Clock,
    FileError, FileRef, Message, Priority, Sender, SerializeOpts, SystemClock,
};
use foundry_wire::{
    read_frame, write_frame, ClientToServer, Hello, ProtocolError, Role, ServerToClient,
};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("no platforms requested")]
    NoPlatforms,

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("error reading the input files\n{0}")]
    Inputs(#[from] FileError),
}

/// What happened to each requested platform build.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
}

pub struct ClientWorker {
    config: ClientConfig,
    id: ClientId,
}

impl ClientWorker {
    pub fn new(config: ClientConfig) -> Self {
        Self { config, id: ClientId::new() }
    }

    /// Submit one multi-platform build and wait for every platform to
    /// reach a terminal state.
    pub async fn run(mut self) -> Result<RunSummary, ClientError> {
        let clock = SystemClock;
        if self.config.platforms.is_empty() {
            return Err(ClientError::NoPlatforms);
        }

        let stream = TcpStream::connect(&self.config.server_addr).await.map_err(|e| {
            ClientError::Protocol(ProtocolError::Io(e))
        })?;
        let (mut reader, mut writer) = stream.into_split();
        write_frame(&mut writer, &Hello { role: Role::Client }).await?;

        let (tx, mut rx) = mpsc::unbounded_channel::<ClientToServer>();
        tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if write_frame(&mut writer, &frame).await.is_err() {
                    break;
                }
            }
        });

        let save = self.config.save_dir.is_some();
        let _ = tx.send(ClientToServer::Register { id: self.id.clone(), save });

        // The master build: platforms only, file content follows separately
        let mut conf = BuildConfig::new(self.config.platforms.clone())
            .build_mode(self.config.build_mode.clone())
            .save(save)
            .extra(self.config.extra.clone());
        conf.number = self.config.number.clone();
        conf.name = self.config.name.clone();
        conf.bundle_id = self.config.bundle_id.clone();

        let mut build = Build::new(conf);
        build.status = BuildStatus::Uploading;
        build.started_at_ms = Some(clock.epoch_ms());
        build.files = std::mem::take(&mut self.config.files);

        self.log(&tx, &build, Priority::Info, format!(
            "The build is requested on {}",
            self.config.platforms.join(",")
        ));
        let _ = tx.send(ClientToServer::RegisterBuild {
            build: build.to_payload(SerializeOpts::STATUS),
        });

        self.log(&tx, &build, Priority::Info, format!(
            "Reading {} file(s)...",
            build.files.len()
        ));
        if let Err(e) = files::read_contents(&mut build.files).await {
            files::free_contents(&mut build.files);
            let _ = tx.send(ClientToServer::FailBuild { build_id: build.id.clone() });
            return Err(e.into());
        }

        let size = files::staged_len(&build.files);
        if size > 0 {
            self.log(&tx, &build, Priority::Info, format!(
                "Uploading files to the build server... ({size} bytes)"
            ));
        }
        let _ = tx.send(ClientToServer::UploadBuild {
            build: build.to_payload(SerializeOpts::DISPATCH),
        });
        files::free_contents(&mut build.files);

        // Wait for one terminal result per requested platform
        let mut summary = RunSummary::default();
        let expected = self.config.platforms.len();
        while summary.succeeded + summary.failed < expected {
            match read_frame::<_, ServerToClient>(&mut reader).await {
                Ok(ServerToClient::Log { message }) => println!("{}", message.render()),
                Ok(ServerToClient::BuildSuccess { build }) => {
                    self.on_build_success(&build).await;
                    summary.succeeded += 1;
                }
                Ok(ServerToClient::BuildFailed { .. }) => {
                    summary.failed += 1;
                }
                Err(ProtocolError::ConnectionClosed) => break,
                Err(e) => return Err(e.into()),
            }
        }
        println!("Client is disconnecting from the server since the build tasks completed.");
        Ok(summary)
    }

    /// Save returned artifacts (when asked for) and report the duration.
    async fn on_build_success(&self, payload: &BuildPayload) {
        if let Some(save_dir) = &self.config.save_dir {
            let target = save_dir.join(payload.id.as_str());
            let mut outputs: Vec<FileRef> = payload
                .output_files
                .clone()
                .unwrap_or_default()
                .into_iter()
                .filter(|f| f.content.is_some())
                .map(FileRef::from_payload)
                .collect();
            if let Err(e) = files::write_contents(&target, &mut outputs, false).await {
                tracing::warn!(error = %e, "could not save build output files");
            } else if let Err(e) = foundry_core::prune_oldest(save_dir, self.config.keep).await {
                tracing::debug!(error = %e, "output retention pruning failed");
            }
        }
        let took = payload.duration_ms.map(format_elapsed_ms);
        println!(
            "Build done! It took {}.",
            took.unwrap_or_else(|| "an unknown amount of time".to_string())
        );
    }

    fn log(
        &self,
        tx: &mpsc::UnboundedSender<ClientToServer>,
        build: &Build,
        priority: Priority,
        text: String,
    ) {
        let mut message = Message::new(Sender::ClientWorker, priority, text, SystemClock.epoch_ms())
            .build_id(build.id.clone());
        if let Some(number) = &build.conf.number {
            message = message.build_number(number.clone());
        }
        println!("{}", message.render());
        let _ = tx.send(ClientToServer::Log { message });
    }
}
