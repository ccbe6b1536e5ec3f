// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Disconnect recovery, cancellation and observer specs.

use super::helpers::*;
use foundry_core::BuildStatus;
use foundry_server::scheduler;
use foundry_wire::{AgentToServer, ObserverToServer, ServerToAgent, ServerToObserver};

#[tokio::test]
async fn agent_disconnect_requeues_the_build_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, coordinator) = start_server(dir.path()).await;

    let mut agent = WireAgent::connect(addr, &coordinator, "droid", &["android"]).await;
    let mut client = WireClient::connect(addr, false).await;

    let master = submit_build(
        &mut client,
        &coordinator,
        "41",
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
    {
        let coordinator = coordinator.clone();
        let android = android.clone();
        wait_until("building", move || {
            coordinator.lock().registry.get(&android).map(|b| b.status)
                == Some(BuildStatus::Building)
        })
        .await;
    }

    // Infrastructure fault, not a build defect
    drop(agent);
    {
        let coordinator = coordinator.clone();
        let android = android.clone();
        wait_until("requeued", move || {
            coordinator.lock().registry.get(&android).map(|b| b.status)
                == Some(BuildStatus::Queued)
        })
        .await;
    }

    let state = coordinator.lock();
    assert_eq!(state.queue.iter().filter(|q| **q == android).count(), 1);
    assert_eq!(state.agents().count(), 0);
}

#[tokio::test]
async fn requeued_build_reaches_a_reconnected_agent() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, coordinator) = start_server(dir.path()).await;

    let mut agent = WireAgent::connect(addr, &coordinator, "droid", &["android"]).await;
    let mut client = WireClient::connect(addr, false).await;

    let master = submit_build(
        &mut client,
        &coordinator,
        "42",
        &["android"],
        vec![staged_file("www.zip", None, b"shared")],
    )
    .await;
    let android = child_of(&coordinator, &master, "android");

    scheduler::run_once(&coordinator).await;
    let ServerToAgent::Build { .. } = agent.recv().await else {
        panic!("expected first dispatch");
    };
    drop(agent);
    {
        let coordinator = coordinator.clone();
        let android = android.clone();
        wait_until("requeued", move || coordinator.lock().queue.contains(&android)).await;
    }

    let mut replacement = WireAgent::connect(addr, &coordinator, "droid-2", &["android"]).await;
    scheduler::run_once(&coordinator).await;
    let ServerToAgent::Build { build } = replacement.recv().await else {
        panic!("expected a re-dispatch");
    };
    assert_eq!(build.id, android);
}

#[tokio::test]
async fn observer_cancel_reaches_agent_and_requester() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, coordinator) = start_server(dir.path()).await;

    let mut agent = WireAgent::connect(addr, &coordinator, "droid", &["android"]).await;
    let mut client = WireClient::connect(addr, false).await;
    let mut observer = WireObserver::connect(addr).await;
    let ServerToObserver::Status { .. } = observer.recv().await else {
        panic!("fresh observers get a snapshot");
    };

    let master = submit_build(
        &mut client,
        &coordinator,
        "43",
        &["android"],
        vec![staged_file("www.zip", None, b"shared")],
    )
    .await;
    let android = child_of(&coordinator, &master, "android");

    scheduler::run_once(&coordinator).await;
    let ServerToAgent::Build { .. } = agent.recv().await else {
        panic!("expected a dispatch frame");
    };

    observer.send(ObserverToServer::Cancel { build_id: master.clone() }).await;
    {
        let coordinator = coordinator.clone();
        let android = android.clone();
        wait_until("cancelled", move || {
            coordinator.lock().registry.get(&android).map(|b| b.status)
                == Some(BuildStatus::Cancelled)
        })
        .await;
    }

    // The agent receives the cooperative cancel for its in-flight build
    let frame = agent.recv().await;
    assert!(matches!(frame, ServerToAgent::Cancel { build_id } if build_id == android));

    // The master summarizes its cancelled children and the slot is free
    assert_eq!(status_of(&coordinator, &master), BuildStatus::Cancelled);
    let state = coordinator.lock();
    assert!(state.agents().all(|a| a.busy.is_none()));
    assert!(!state.queue.contains(&android));
}

#[tokio::test]
async fn observer_rebuild_requeues_children() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, coordinator) = start_server(dir.path()).await;

    let mut agent = WireAgent::connect(addr, &coordinator, "droid", &["android"]).await;
    let mut client = WireClient::connect(addr, false).await;
    let mut observer = WireObserver::connect(addr).await;
    let ServerToObserver::Status { .. } = observer.recv().await else {
        panic!("fresh observers get a snapshot");
    };

    let master = submit_build(
        &mut client,
        &coordinator,
        "44",
        &["android"],
        vec![staged_file("www.zip", None, b"shared")],
    )
    .await;
    let android = child_of(&coordinator, &master, "android");

    scheduler::run_once(&coordinator).await;
    let ServerToAgent::Build { .. } = agent.recv().await else {
        panic!("expected a dispatch frame");
    };
    agent
        .send(AgentToServer::BuildSuccess {
            build: success_payload(&android, "app-release.apk", b"apk"),
        })
        .await;
    {
        let coordinator = coordinator.clone();
        let android = android.clone();
        wait_until("success", move || {
            coordinator.lock().registry.get(&android).map(|b| b.status)
                == Some(BuildStatus::Success)
        })
        .await;
    }

    observer.send(ObserverToServer::Rebuild { build_id: master.clone() }).await;
    {
        let coordinator = coordinator.clone();
        let android = android.clone();
        wait_until("requeued for rebuild", move || {
            coordinator.lock().queue.contains(&android)
        })
        .await;
    }
    assert_eq!(status_of(&coordinator, &android), BuildStatus::Queued);
    assert_eq!(status_of(&coordinator, &master), BuildStatus::Queued);
}

#[tokio::test]
async fn snapshot_reflects_live_state() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, coordinator) = start_server(dir.path()).await;

    let _agent = WireAgent::connect(addr, &coordinator, "droid", &["android", "ios"]).await;
    let mut client = WireClient::connect(addr, false).await;
    let master = submit_build(
        &mut client,
        &coordinator,
        "45",
        &["android"],
        vec![staged_file("www.zip", None, b"shared")],
    )
    .await;

    let mut observer = WireObserver::connect(addr).await;
    let ServerToObserver::Status { snapshot } = observer.recv().await else {
        panic!("fresh observers get a snapshot");
    };

    assert_eq!(snapshot.agents.len(), 1);
    assert_eq!(snapshot.agents[0].platforms, vec!["android", "ios"]);
    assert_eq!(snapshot.builds.len(), 1);
    assert_eq!(snapshot.builds[0].id, master);
    assert_eq!(snapshot.queue.len(), 1);
    assert!(!snapshot.logs.is_empty());
    // Snapshots never carry file content
    assert!(snapshot.builds[0].files.is_none());
}
