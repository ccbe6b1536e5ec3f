// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared coordinator state and the single mutation funnel.
//!
//! Every registry, the queue, the worklists and all live session handles sit
//! behind one mutex. Lock scopes stay small and never span disk or network
//! I/O: handlers compute under the lock, then perform I/O outside it.

use crate::env::ServerConfig;
use crate::registry::BuildRegistry;
use foundry_core::{
    AgentId, BuildId, BuildPayload, BuildStatus, ClientId, Message, Priority, Sender,
    SerializeOpts,
};
use foundry_wire::{AgentInfo, ServerToAgent, ServerToClient, ServerToObserver, StatusSnapshot};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

foundry_core::define_id! {
    /// Connection-scoped identifier; one per live socket.
    pub struct SessionId("ses-");
}

/// Server-side representative of one connected agent.
pub struct AgentHandle {
    pub session: SessionId,
    pub id: AgentId,
    pub name: String,
    pub platforms: Vec<String>,
    /// Build currently assigned, `None` when idle.
    pub busy: Option<BuildId>,
    pub tx: UnboundedSender<ServerToAgent>,
}

impl AgentHandle {
    pub fn info(&self) -> AgentInfo {
        AgentInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            platforms: self.platforms.clone(),
            busy: self.busy.clone(),
        }
    }
}

/// Server-side representative of one connected client.
pub struct ClientHandle {
    pub session: SessionId,
    pub id: ClientId,
    /// Whether the requester wants artifacts returned as well as stored.
    pub save: bool,
    pub tx: UnboundedSender<ServerToClient>,
}

/// Server-side representative of one connected dashboard.
pub struct ObserverHandle {
    pub session: SessionId,
    pub tx: UnboundedSender<ServerToObserver>,
}

/// A root build whose state changed and should be persisted. Computed under
/// the lock, written outside it.
pub struct PersistRequest {
    pub label: String,
    pub payload: BuildPayload,
}

pub type SharedCoordinator = Arc<Mutex<Coordinator>>;

pub struct Coordinator {
    pub config: ServerConfig,
    pub registry: BuildRegistry,
    /// FIFO of schedulable child builds waiting for capacity.
    pub queue: VecDeque<BuildId>,
    agents: HashMap<SessionId, AgentHandle>,
    /// Platform → agent sessions able to build it, registration order.
    worklists: HashMap<String, Vec<SessionId>>,
    clients: HashMap<SessionId, ClientHandle>,
    observers: HashMap<SessionId, ObserverHandle>,
    /// Root build id → client session that requested it.
    origins: HashMap<BuildId, SessionId>,
    /// Recent-log ring, newest first, bounded by `config.log_ring_cap`.
    logs: VecDeque<Message>,
}

impl Coordinator {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            registry: BuildRegistry::default(),
            queue: VecDeque::new(),
            agents: HashMap::new(),
            worklists: HashMap::new(),
            clients: HashMap::new(),
            observers: HashMap::new(),
            origins: HashMap::new(),
            logs: VecDeque::new(),
        }
    }

    pub fn shared(config: ServerConfig) -> SharedCoordinator {
        Arc::new(Mutex::new(Self::new(config)))
    }

    // ── logging & broadcast ──────────────────────────────────────────────

    /// Record a message: console, the owning build's log, the bounded
    /// recent-log ring, and every connected observer.
    pub fn log(&mut self, message: Message) {
        println!("{}", message.render());
        if let Some(build_id) = message.build_id.clone() {
            if let Some(build) = self.registry.get_mut(&build_id) {
                build.push_log(message.clone());
            }
        }
        self.logs.push_front(message.clone());
        self.logs.truncate(self.config.log_ring_cap);
        self.broadcast(ServerToObserver::Log { message });
    }

    /// Record a message and forward it to the client that owns the build.
    pub fn log_to_client(&mut self, message: Message) {
        let target = message
            .build_id
            .as_ref()
            .and_then(|id| self.client_for_build(id))
            .map(|c| c.tx.clone());
        self.log(message.clone());
        if let Some(tx) = target {
            let _ = tx.send(ServerToClient::Log { message });
        }
    }

    /// Broadcast a `{kind, what, obj}` news event to all observers.
    pub fn news(&mut self, kind: &str, what: &str, obj: serde_json::Value) {
        self.broadcast(ServerToObserver::News {
            kind: kind.to_string(),
            what: what.to_string(),
            obj,
        });
    }

    fn broadcast(&mut self, frame: ServerToObserver) {
        self.observers.retain(|_, o| o.tx.send(frame.clone()).is_ok());
    }

    pub fn recent_logs(&self) -> Vec<Message> {
        self.logs.iter().cloned().collect()
    }

    // ── agents ───────────────────────────────────────────────────────────

    /// Add an agent to the registry and to one worklist per declared
    /// platform (deduplicated, order preserved).
    pub fn register_agent(&mut self, mut handle: AgentHandle) {
        let mut seen = Vec::new();
        for platform in handle.platforms.drain(..) {
            if !seen.contains(&platform) {
                seen.push(platform);
            }
        }
        handle.platforms = seen;
        for platform in &handle.platforms {
            self.worklists
                .entry(platform.clone())
                .or_default()
                .push(handle.session.clone());
        }
        self.agents.insert(handle.session.clone(), handle);
    }

    pub fn agent(&self, session: &SessionId) -> Option<&AgentHandle> {
        self.agents.get(session)
    }

    pub fn agent_mut(&mut self, session: &SessionId) -> Option<&mut AgentHandle> {
        self.agents.get_mut(session)
    }

    pub fn agents(&self) -> impl Iterator<Item = &AgentHandle> {
        self.agents.values()
    }

    /// Remove an agent from the registry and every worklist.
    pub fn remove_agent(&mut self, session: &SessionId) -> Option<AgentHandle> {
        let handle = self.agents.remove(session)?;
        for platform in &handle.platforms {
            if let Some(list) = self.worklists.get_mut(platform) {
                list.retain(|s| s != session);
            }
        }
        Some(handle)
    }

    /// First idle agent able to build `platform`, in registration order.
    pub fn idle_agent_for(&self, platform: &str) -> Option<SessionId> {
        self.worklists.get(platform)?.iter().find_map(|session| {
            let agent = self.agents.get(session)?;
            agent.busy.is_none().then(|| session.clone())
        })
    }

    /// Whether any agent declares capability for `platform`.
    pub fn has_capability(&self, platform: &str) -> bool {
        self.worklists.get(platform).is_some_and(|l| !l.is_empty())
    }

    // ── clients & observers ──────────────────────────────────────────────

    pub fn register_client(&mut self, handle: ClientHandle) {
        self.clients.insert(handle.session.clone(), handle);
    }

    pub fn remove_client(&mut self, session: &SessionId) -> Option<ClientHandle> {
        self.clients.remove(session)
    }

    pub fn client(&self, session: &SessionId) -> Option<&ClientHandle> {
        self.clients.get(session)
    }

    /// The client session that originated a build (resolved through the
    /// build's root).
    pub fn client_for_build(&self, id: &BuildId) -> Option<&ClientHandle> {
        let root = self.registry.root_of(id)?;
        let session = self.origins.get(&root.id)?;
        self.clients.get(session)
    }

    /// Remember which client session requested a root build.
    pub fn set_origin(&mut self, root: BuildId, session: SessionId) {
        self.origins.insert(root, session);
    }

    pub fn register_observer(&mut self, handle: ObserverHandle) {
        self.observers.insert(handle.session.clone(), handle);
    }

    pub fn remove_observer(&mut self, session: &SessionId) {
        self.observers.remove(session);
    }

    // ── queue ────────────────────────────────────────────────────────────

    /// Queue a build for scheduling. A build is never queued twice.
    pub fn enqueue(&mut self, id: BuildId) {
        if !self.queue.contains(&id) {
            self.queue.push_back(id);
        }
    }

    pub fn dequeue_build(&mut self, id: &BuildId) {
        self.queue.retain(|q| q != id);
    }

    // ── status funnel ────────────────────────────────────────────────────

    /// The single authorized place build status changes flow through.
    ///
    /// Applies the status, recomputes masters, logs the platform transition
    /// on the master, and broadcasts the new state to observers. Returns
    /// the persistence work the caller should spawn, if any.
    pub fn update_build_status(
        &mut self,
        id: &BuildId,
        status: BuildStatus,
        now_ms: u64,
    ) -> Option<PersistRequest> {
        let Some(build) = self.registry.get(id) else {
            let msg = Message::new(
                Sender::Server,
                Priority::Error,
                format!("Build not found with id: {id}"),
                now_ms,
            );
            self.log(msg);
            return None;
        };

        if build.master_id.is_some() && build.status != status {
            let platform = build.platform().unwrap_or("unknown").to_string();
            let master = self.registry.root_of(id).map(|m| (m.id.clone(), m.label()));
            if let Some((master_id, master_label)) = master {
                let msg = Message::new(
                    Sender::Server,
                    Priority::Status,
                    format!("Platform {platform} update status: {status}"),
                    now_ms,
                )
                .build_id(master_id)
                .build_number(master_label);
                self.log(msg);
            }
        }

        let persist_root = self.registry.update_status(id, status);
        let request = persist_root.and_then(|root_id| {
            let payload = self.registry.payload(
                &root_id,
                SerializeOpts::PERSIST,
                SerializeOpts { platforms: false, ..SerializeOpts::PERSIST },
            )?;
            let label = self.registry.get(&root_id)?.label();
            Some(PersistRequest { label, payload })
        });

        if let Some(payload) = self.registry.payload(
            id,
            SerializeOpts { platforms: true, ..SerializeOpts::STATUS },
            SerializeOpts::STATUS,
        ) {
            if let Ok(obj) = serde_json::to_value(&payload) {
                self.news(&status.to_string(), "build", obj);
            }
        }
        request
    }

    /// Remove a build from every registry and from the queue. `deleted` is
    /// a pseudo-status that erases rather than persists.
    pub fn delete_build(&mut self, id: &BuildId) {
        let removed = self.registry.remove_tree(id);
        for gone in &removed {
            self.dequeue_build(gone);
            self.origins.remove(gone);
        }
        if !removed.is_empty() {
            self.news("deleted", "build", serde_json::json!({ "id": id.as_str() }));
        }
    }

    // ── snapshot ─────────────────────────────────────────────────────────

    /// Full state for a freshly connected or refreshing dashboard.
    pub fn snapshot(&self) -> StatusSnapshot {
        let builds = self
            .registry
            .roots()
            .filter_map(|b| {
                self.registry.payload(
                    &b.id,
                    SerializeOpts { platforms: true, ..SerializeOpts::STATUS },
                    SerializeOpts::STATUS,
                )
            })
            .collect();
        StatusSnapshot {
            builds,
            agents: self.agents.values().map(AgentHandle::info).collect(),
            queue: self.queue.iter().cloned().collect(),
            logs: self.recent_logs(),
        }
    }
}

/// Apply a status change and spawn the resulting state save, if any.
pub fn update_status_and_persist(
    coordinator: &SharedCoordinator,
    id: &BuildId,
    status: BuildStatus,
    now_ms: u64,
) {
    let request = coordinator.lock().update_build_status(id, status, now_ms);
    if let Some(PersistRequest { label, payload }) = request {
        crate::persist::spawn_save(coordinator, label, payload);
    }
}

/// The single server-side failure funnel: log with context, mark the build
/// failed, persist, and notify the requesting client.
pub fn fail_build(
    coordinator: &SharedCoordinator,
    id: &BuildId,
    sender: Sender,
    context: String,
    now_ms: u64,
) {
    let client_tx = {
        let mut state = coordinator.lock();
        let number = state.registry.get(id).and_then(|b| b.conf.number.clone());
        let mut msg =
            Message::new(sender, Priority::Error, context, now_ms).build_id(id.clone());
        if let Some(number) = number {
            msg = msg.build_number(number);
        }
        state.log(msg);
        state.client_for_build(id).map(|c| c.tx.clone())
    };
    update_status_and_persist(coordinator, id, BuildStatus::Failed, now_ms);
    if let Some(tx) = client_tx {
        let payload = coordinator.lock().registry.payload(
            id,
            SerializeOpts::STATUS,
            SerializeOpts::STATUS,
        );
        if let Some(payload) = payload {
            let _ = tx.send(ServerToClient::BuildFailed { build: payload });
        }
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
