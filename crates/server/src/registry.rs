// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory build registry.
//!
//! All builds, masters and children alike, live in one map keyed by id, so
//! lookup cost does not depend on hierarchy depth. Master/child structure is
//! kept as id references and resolved on demand.

use foundry_core::{Build, BuildId, BuildPayload, BuildStatus, SerializeOpts};
use std::collections::HashMap;

#[derive(Default)]
pub struct BuildRegistry {
    builds: HashMap<BuildId, Build>,
    /// Root build ids in insertion order, for stable listings.
    roots: Vec<BuildId>,
}

impl BuildRegistry {
    pub fn get(&self, id: &BuildId) -> Option<&Build> {
        self.builds.get(id)
    }

    pub fn get_mut(&mut self, id: &BuildId) -> Option<&mut Build> {
        self.builds.get_mut(id)
    }

    pub fn contains(&self, id: &BuildId) -> bool {
        self.builds.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.builds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builds.is_empty()
    }

    pub fn roots(&self) -> impl Iterator<Item = &Build> {
        self.roots.iter().filter_map(|id| self.builds.get(id))
    }

    /// Register a master build together with its per-platform children.
    pub fn insert_tree(&mut self, mut master: Build, children: Vec<Build>) {
        for child in &children {
            if !master.children.contains(&child.id) {
                master.children.push(child.id.clone());
            }
        }
        self.roots.push(master.id.clone());
        for mut child in children {
            child.master_id = Some(master.id.clone());
            self.builds.insert(child.id.clone(), child);
        }
        self.builds.insert(master.id.clone(), master);
    }

    /// Set a build's status and propagate to its master.
    ///
    /// The master's status is recomputed as the maximum-priority status
    /// among its children; the recomputation recurses upward but only while
    /// something actually changed. Returns the id of the root build whose
    /// status changed (the caller persists that one), or `None` when no
    /// root-level change happened.
    pub fn update_status(&mut self, id: &BuildId, status: BuildStatus) -> Option<BuildId> {
        let build = self.builds.get_mut(id)?;
        let changed = build.status != status;
        build.status = status;
        let master_id = build.master_id.clone();

        match master_id {
            Some(master_id) => {
                let summary = self.summarize_children(&master_id)?;
                let master = self.builds.get(&master_id)?;
                if master.status != summary {
                    self.update_status(&master_id, summary)
                } else {
                    None
                }
            }
            None => changed.then(|| id.clone()),
        }
    }

    fn summarize_children(&self, master_id: &BuildId) -> Option<BuildStatus> {
        let master = self.builds.get(master_id)?;
        let statuses = master
            .children
            .iter()
            .filter_map(|id| self.builds.get(id))
            .map(|b| b.status);
        Some(BuildStatus::max_priority(statuses))
    }

    /// True when every child of `master_id` reached a terminal status.
    pub fn all_children_terminal(&self, master_id: &BuildId) -> bool {
        match self.builds.get(master_id) {
            Some(master) => master
                .children
                .iter()
                .filter_map(|id| self.builds.get(id))
                .all(|b| b.status.is_terminal()),
            None => false,
        }
    }

    /// Remove a build from the registry. Removing a master removes its
    /// children; removing a child detaches it from its master. Returns all
    /// removed ids.
    pub fn remove_tree(&mut self, id: &BuildId) -> Vec<BuildId> {
        let Some(build) = self.builds.remove(id) else {
            return Vec::new();
        };
        let mut removed = vec![build.id.clone()];

        for child_id in &build.children {
            if self.builds.remove(child_id).is_some() {
                removed.push(child_id.clone());
            }
        }
        if let Some(master_id) = &build.master_id {
            if let Some(master) = self.builds.get_mut(master_id) {
                master.children.retain(|c| c != id);
            }
        }
        self.roots.retain(|r| r != id);
        removed
    }

    /// The root of a build's tree: its master when it has one, itself
    /// otherwise.
    pub fn root_of(&self, id: &BuildId) -> Option<&Build> {
        let build = self.builds.get(id)?;
        match &build.master_id {
            Some(master_id) => self.builds.get(master_id),
            None => Some(build),
        }
    }

    /// Serialize a build, nesting child payloads when `opts.platforms` is
    /// set.
    pub fn payload(
        &self,
        id: &BuildId,
        opts: SerializeOpts,
        child_opts: SerializeOpts,
    ) -> Option<BuildPayload> {
        let build = self.builds.get(id)?;
        let mut payload = build.to_payload(opts);
        if opts.platforms && !build.children.is_empty() {
            payload.platforms = Some(
                build
                    .children
                    .iter()
                    .filter_map(|child_id| self.builds.get(child_id))
                    .map(|child| child.to_payload(child_opts))
                    .collect(),
            );
        }
        Some(payload)
    }

    /// Find a root build by its directory label (used when retention
    /// pruning maps removed folders back to builds).
    pub fn root_by_label(&self, label: &str) -> Option<&Build> {
        self.roots().find(|b| b.label() == label)
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
