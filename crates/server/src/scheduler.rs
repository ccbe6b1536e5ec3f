// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue scheduler: matches queued builds to idle capacity on a fixed tick.
//!
//! Dequeues from the head of the FIFO; the first idle agent on the
//! platform's worklist wins. When the head build finds no capacity it is
//! pushed back and the pass ends: builds behind it wait for the next tick
//! even if capacity exists for them. That stop-at-first-miss pass is
//! long-standing observable behavior and is pinned by tests.

use crate::coordinator::{
    fail_build, update_status_and_persist, Coordinator, SessionId, SharedCoordinator,
};
use foundry_core::{
    files, BuildId, BuildStatus, Clock, Message, Priority, Sender, SerializeOpts, SystemClock,
};
use foundry_wire::ServerToAgent;
use std::time::Duration;
use tokio::task::JoinHandle;

/// A build matched to an idle agent during one queue pass. The agent is
/// already marked busy; the file transfer happens afterwards, outside the
/// coordinator lock.
pub struct DispatchPlan {
    pub session: SessionId,
    pub build_id: BuildId,
}

/// One scheduling pass over the queue. Must run under the coordinator lock
/// so that busy-marking and agent selection are atomic.
pub fn process_queue(state: &mut Coordinator) -> Vec<DispatchPlan> {
    let mut plans = Vec::new();
    while let Some(build_id) = state.queue.pop_front() {
        let platform = state
            .registry
            .get(&build_id)
            .and_then(|b| b.platform().map(str::to_string));
        let Some(platform) = platform else {
            // Deleted while queued; drop the entry
            continue;
        };
        match state.idle_agent_for(&platform) {
            Some(session) => {
                if let Some(agent) = state.agent_mut(&session) {
                    agent.busy = Some(build_id.clone());
                }
                plans.push(DispatchPlan { session, build_id });
            }
            None => {
                state.queue.push_back(build_id);
                break;
            }
        }
    }
    plans
}

/// Stream a planned build to its agent: load input contents, base64 them
/// into one dispatch frame, send, and free the buffers regardless of
/// outcome.
pub async fn dispatch(coordinator: &SharedCoordinator, plan: DispatchPlan) {
    let clock = SystemClock;
    let prepared = {
        let mut state = coordinator.lock();
        let Some(build) = state.registry.get(&plan.build_id) else {
            if let Some(agent) = state.agent_mut(&plan.session) {
                agent.busy = None;
            }
            return;
        };
        let payload = build.to_payload(SerializeOpts::STATUS);
        let files = build.files.clone();
        let platform = build.platform().unwrap_or("unknown").to_string();
        let number = build.conf.number.clone();

        let Some(agent) = state.agent(&plan.session) else {
            // Agent vanished between selection and dispatch; recycle
            state.enqueue(plan.build_id.clone());
            return;
        };
        let tx = agent.tx.clone();
        let agent_name = agent.name.clone();

        let msg = Message::new(
            Sender::AgentSession,
            Priority::Debug,
            format!("Downloading {} file(s) from the server...", files.len()),
            clock.epoch_ms(),
        )
        .build_id(plan.build_id.clone());
        state.log(msg);
        (files, tx, payload, platform, number, agent_name)
    };
    let (mut input_files, tx, mut payload, platform, number, agent_name) = prepared;

    update_status_and_persist(coordinator, &plan.build_id, BuildStatus::Uploading, clock.epoch_ms());

    if let Err(e) = files::read_contents(&mut input_files).await {
        files::free_contents(&mut input_files);
        release_agent(coordinator, &plan.session);
        fail_build(
            coordinator,
            &plan.build_id,
            Sender::AgentSession,
            format!(
                "error while reading input files on the server for sending them to the agent worker:\n{e}"
            ),
            clock.epoch_ms(),
        );
        return;
    }

    let size = files::staged_len(&input_files);
    {
        let mut state = coordinator.lock();
        let mut msg = Message::new(
            Sender::AgentSession,
            Priority::Info,
            format!("sending build to agent {agent_name} on platform {platform}... ({size} bytes)"),
            clock.epoch_ms(),
        )
        .build_id(plan.build_id.clone());
        if let Some(number) = number {
            msg = msg.build_number(number);
        }
        state.log(msg);
    }

    // Only file names cross the wire, never server filesystem layout
    payload.files = Some(input_files.iter().map(|f| f.to_payload(true)).collect());
    files::free_contents(&mut input_files);
    let _ = tx.send(ServerToAgent::Build { build: payload });
}

fn release_agent(coordinator: &SharedCoordinator, session: &SessionId) {
    let mut state = coordinator.lock();
    if let Some(agent) = state.agent_mut(session) {
        agent.busy = None;
        let info = agent.info();
        if let Ok(obj) = serde_json::to_value(&info) {
            state.news("agent-status", "agent", obj);
        }
    }
}

/// One tick: plan under the lock, then stream each dispatch.
pub async fn run_once(coordinator: &SharedCoordinator) {
    let plans = {
        let mut state = coordinator.lock();
        process_queue(&mut state)
    };
    for plan in plans {
        dispatch(coordinator, plan).await;
    }
}

/// Start the fixed-interval scheduler task.
pub fn spawn(coordinator: SharedCoordinator) -> JoinHandle<()> {
    tokio::spawn(async move {
        let tick_ms = coordinator.lock().config.queue_tick_ms.max(1);
        let mut interval = tokio::time::interval(Duration::from_millis(tick_ms));
        loop {
            interval.tick().await;
            run_once(&coordinator).await;
        }
    })
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
