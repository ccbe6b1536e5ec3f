// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Whole-farm spec: the real client worker against the real server with a
//! scripted agent, scheduler ticking on its own.

use super::helpers::*;
use foundry_agent::{AgentConfig, AgentWorker};
use foundry_client::{ClientConfig, ClientWorker};
use foundry_core::{BuildStatus, FileRef};
use foundry_server::scheduler;
use foundry_wire::{AgentToServer, ServerToAgent};

#[tokio::test]
async fn client_worker_round_trip_saves_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let builds_root = dir.path().join("server");
    let save_dir = dir.path().join("client-out");
    let input = dir.path().join("www.zip");
    tokio::fs::write(&input, b"bundle-bytes").await.unwrap();

    let (addr, coordinator) = start_server(&builds_root).await;
    let _scheduler = scheduler::spawn(coordinator.clone());

    // A scripted agent that succeeds every dispatched build
    let mut agent = WireAgent::connect(addr, &coordinator, "droid", &["android"]).await;
    tokio::spawn(async move {
        loop {
            if let ServerToAgent::Build { build } = agent.recv().await {
                agent.send(AgentToServer::Building { build_id: build.id.clone() }).await;
                agent.send(AgentToServer::Uploading { build_id: build.id.clone() }).await;
                agent
                    .send(AgentToServer::BuildSuccess {
                        build: success_payload(&build.id, "app-release.apk", b"apk-bytes"),
                    })
                    .await;
            }
        }
    });

    let config = ClientConfig {
        server_addr: addr.to_string(),
        platforms: vec!["android".to_string()],
        files: vec![FileRef::new(&input)],
        number: Some("51".to_string()),
        save_dir: Some(save_dir.clone()),
        ..ClientConfig::default()
    };
    let summary = ClientWorker::new(config).run().await.unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 0);

    // Server-side state settled
    {
        let state = coordinator.lock();
        let master = state.registry.root_by_label("51").expect("master registered");
        assert_eq!(master.status, BuildStatus::Success);
    }
    // The artifact came back and was saved under the child build's folder
    let mut saved = Vec::new();
    let mut outer = tokio::fs::read_dir(&save_dir).await.unwrap();
    while let Some(entry) = outer.next_entry().await.unwrap() {
        let mut inner = tokio::fs::read_dir(entry.path()).await.unwrap();
        while let Some(file) = inner.next_entry().await.unwrap() {
            saved.push(file.file_name().to_string_lossy().into_owned());
        }
    }
    assert_eq!(saved, vec!["51.android.app-release.apk"]);

    // And persisted server-side too
    let stored = builds_root.join("51").join("51.android.app-release.apk");
    assert_eq!(tokio::fs::read(&stored).await.unwrap(), b"apk-bytes");
    assert!(builds_root.join("51").join("build.json").exists());
}

#[tokio::test]
async fn real_agent_worker_runs_the_whole_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let builds_root = dir.path().join("server");
    let work_root = dir.path().join("agent-work");
    let input = dir.path().join("www.zip");
    tokio::fs::write(&input, b"bundle-bytes").await.unwrap();

    let (addr, coordinator) = start_server(&builds_root).await;
    let _scheduler = scheduler::spawn(coordinator.clone());

    // A real agent worker with shell stand-ins for the native toolchain
    let agent_config = AgentConfig {
        server_addr: addr.to_string(),
        name: "pipeline-rig".to_string(),
        platforms: vec!["android".to_string()],
        work_root: work_root.clone(),
        build_command: "touch platforms/{platform}/app-release.apk".to_string(),
        platform_add_command: "mkdir -p platforms/{platform}".to_string(),
        extract_command: "true".to_string(),
        ..AgentConfig::default()
    };
    let _agent = tokio::spawn(AgentWorker::new(agent_config).run());
    {
        let coordinator = coordinator.clone();
        wait_until("agent worker registered", move || {
            coordinator.lock().agents().count() == 1
        })
        .await;
    }

    let config = ClientConfig {
        server_addr: addr.to_string(),
        platforms: vec!["android".to_string()],
        files: vec![FileRef::new(&input)],
        number: Some("52".to_string()),
        ..ClientConfig::default()
    };
    let summary = ClientWorker::new(config).run().await.unwrap();
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 0);

    // The pipeline ran in a per-build work folder: inputs materialized,
    // scaffold added, artifact produced, state dump left behind
    let work_dir = work_root.join("52.android");
    assert_eq!(tokio::fs::read(work_dir.join("www.zip")).await.unwrap(), b"bundle-bytes");
    assert!(work_dir.join("platforms/android/app-release.apk").exists());
    assert!(work_dir.join("build.android.json").exists());

    // And the server stored the renamed artifact
    let stored = builds_root.join("52").join("52.android.app-release.apk");
    assert!(stored.exists());
    let state = coordinator.lock();
    let master = state.registry.root_by_label("52").expect("master registered");
    assert_eq!(master.status, BuildStatus::Success);
}
