// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduling and result-intake specs.

use super::helpers::*;
use foundry_core::BuildStatus;
use foundry_server::scheduler;
use foundry_wire::{AgentToServer, ServerToAgent, ServerToClient};

#[tokio::test]
async fn android_child_builds_while_ios_waits() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, coordinator) = start_server(dir.path()).await;

    let mut agent_one = WireAgent::connect(addr, &coordinator, "droid-1", &["android"]).await;
    let _agent_two = WireAgent::connect(addr, &coordinator, "droid-2", &["android"]).await;
    let mut client = WireClient::connect(addr, false).await;

    let master = submit_build(
        &mut client,
        &coordinator,
        "31",
        &["android", "ios"],
        vec![staged_file("www.zip", None, b"shared")],
    )
    .await;
    let android = child_of(&coordinator, &master, "android");
    let ios = child_of(&coordinator, &master, "ios");

    scheduler::run_once(&coordinator).await;

    // The android child was dispatched to the first idle android agent
    let ServerToAgent::Build { build } = agent_one.recv().await else {
        panic!("expected a dispatch frame");
    };
    assert_eq!(build.id, android);

    agent_one.send(AgentToServer::Building { build_id: android.clone() }).await;
    {
        let coordinator = coordinator.clone();
        let android = android.clone();
        wait_until("android child building", move || {
            coordinator.lock().registry.get(&android).map(|b| b.status)
                == Some(BuildStatus::Building)
        })
        .await;
    }

    // The ios child has no capacity and stays queued; the master reports
    // its least-finished child
    assert_eq!(status_of(&coordinator, &ios), BuildStatus::Queued);
    assert_eq!(status_of(&coordinator, &master), BuildStatus::Building);
    assert!(coordinator.lock().queue.contains(&ios));
}

#[tokio::test]
async fn grouped_files_reach_only_their_platform() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, coordinator) = start_server(dir.path()).await;

    let mut agent = WireAgent::connect(addr, &coordinator, "droid", &["android"]).await;
    let mut client = WireClient::connect(addr, false).await;

    let master = submit_build(
        &mut client,
        &coordinator,
        "32",
        &["android", "ios"],
        vec![
            staged_file("www.zip", None, b"shared"),
            staged_file("droid.zip", Some("android"), b"android-only"),
            staged_file("cupertino.zip", Some("ios"), b"ios-only"),
        ],
    )
    .await;
    let android = child_of(&coordinator, &master, "android");

    scheduler::run_once(&coordinator).await;

    let ServerToAgent::Build { build } = agent.recv().await else {
        panic!("expected a dispatch frame");
    };
    assert_eq!(build.id, android);
    let mut names: Vec<String> =
        build.files.unwrap().into_iter().map(|f| f.file).collect();
    names.sort();
    assert_eq!(names, vec!["droid.zip", "www.zip"]);
}

#[tokio::test]
async fn successful_result_is_stored_renamed_and_forwarded() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, coordinator) = start_server(dir.path()).await;

    let mut agent = WireAgent::connect(addr, &coordinator, "droid", &["android"]).await;
    let mut client = WireClient::connect(addr, true).await;

    let master = submit_build(
        &mut client,
        &coordinator,
        "33",
        &["android"],
        vec![staged_file("www.zip", None, b"shared")],
    )
    .await;
    let android = child_of(&coordinator, &master, "android");

    scheduler::run_once(&coordinator).await;
    let ServerToAgent::Build { .. } = agent.recv().await else {
        panic!("expected a dispatch frame");
    };

    agent.send(AgentToServer::Building { build_id: android.clone() }).await;
    agent.send(AgentToServer::Uploading { build_id: android.clone() }).await;
    agent
        .send(AgentToServer::BuildSuccess {
            build: success_payload(&android, "app-release.apk", b"apk-bytes"),
        })
        .await;

    let ServerToClient::BuildSuccess { build } = client.recv_result().await else {
        panic!("expected a success result");
    };
    assert_eq!(build.id, android);
    // The requester registered with save, so content comes back
    let outputs = build.output_files.unwrap();
    assert!(outputs.iter().any(|f| f.content.is_some()));

    {
        let coordinator = coordinator.clone();
        let android = android.clone();
        wait_until("child success", move || {
            coordinator.lock().registry.get(&android).map(|b| b.status)
                == Some(BuildStatus::Success)
        })
        .await;
    }
    assert_eq!(status_of(&coordinator, &master), BuildStatus::Success);

    // Artifact stored server-side under the root label, renamed after the
    // platform-qualified build number
    let stored = dir.path().join("33").join("33.android.app-release.apk");
    assert_eq!(tokio::fs::read(&stored).await.unwrap(), b"apk-bytes");

    // The agent is idle again and durations were recorded
    let state = coordinator.lock();
    assert!(state.agents().all(|a| a.busy.is_none()));
    assert!(state.registry.get(&android).unwrap().duration_ms.is_some());
}

#[tokio::test]
async fn failed_sibling_fails_the_master_once_all_terminal() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, coordinator) = start_server(dir.path()).await;

    let mut droid = WireAgent::connect(addr, &coordinator, "droid", &["android"]).await;
    let mut mac = WireAgent::connect(addr, &coordinator, "mac", &["ios"]).await;
    let mut client = WireClient::connect(addr, false).await;

    let master = submit_build(
        &mut client,
        &coordinator,
        "34",
        &["android", "ios"],
        vec![staged_file("www.zip", None, b"shared")],
    )
    .await;
    let android = child_of(&coordinator, &master, "android");
    let ios = child_of(&coordinator, &master, "ios");

    scheduler::run_once(&coordinator).await;
    let ServerToAgent::Build { .. } = droid.recv().await else {
        panic!("expected android dispatch");
    };
    let ServerToAgent::Build { .. } = mac.recv().await else {
        panic!("expected ios dispatch");
    };

    droid
        .send(AgentToServer::BuildSuccess {
            build: success_payload(&android, "app-release.apk", b"apk"),
        })
        .await;
    let ServerToClient::BuildSuccess { .. } = client.recv_result().await else {
        panic!("expected android success first");
    };

    let failed = success_payload(&ios, "unused", b"");
    let failed = foundry_core::BuildPayload { output_files: None, ..failed };
    mac.send(AgentToServer::BuildFailed { build: failed }).await;
    let ServerToClient::BuildFailed { build } = client.recv_result().await else {
        panic!("expected ios failure");
    };
    assert_eq!(build.id, ios);

    {
        let coordinator = coordinator.clone();
        let master = master.clone();
        wait_until("master failed", move || {
            coordinator.lock().registry.get(&master).map(|b| b.status)
                == Some(BuildStatus::Failed)
        })
        .await;
    }
    // The failed child produced no artifacts, and both children completed
    let state = coordinator.lock();
    assert!(state.registry.get(&ios).unwrap().output_files.is_empty());
    assert!(state.registry.get(&master).unwrap().completed_at_ms.is_some());
}
