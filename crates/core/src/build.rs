// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Build entity and status lattice.
//!
//! A *master* build represents a multi-platform request and owns one *child*
//! build per requested platform. Only children carry a concrete platform and
//! are scheduled; the master's status is always derived from its children.

use crate::files::{FilePayload, FileRef};
use crate::message::Message;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

crate::define_id! {
    /// Short unique token identifying a build, master or child.
    pub struct BuildId("bld-");
}

/// Build status, ordered by business priority: a master always reflects the
/// least-finished / most-problematic status among its children, which is the
/// maximum under this ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Unknown,
    Cancelled,
    Success,
    Planned,
    Queued,
    Uploading,
    Building,
    Failed,
}

impl BuildStatus {
    /// Position in the priority order; higher outranks lower when a master
    /// summarizes its children.
    pub fn priority(self) -> u8 {
        match self {
            BuildStatus::Unknown => 0,
            BuildStatus::Cancelled => 1,
            BuildStatus::Success => 2,
            BuildStatus::Planned => 3,
            BuildStatus::Queued => 4,
            BuildStatus::Uploading => 5,
            BuildStatus::Building => 6,
            BuildStatus::Failed => 7,
        }
    }

    /// Terminal statuses end a build's lifecycle; everything else may still
    /// make progress.
    pub fn is_terminal(self) -> bool {
        matches!(self, BuildStatus::Cancelled | BuildStatus::Success | BuildStatus::Failed)
    }

    /// The maximum-priority status of a set, or `Unknown` for an empty set.
    pub fn max_priority(statuses: impl IntoIterator<Item = BuildStatus>) -> BuildStatus {
        statuses
            .into_iter()
            .max_by_key(|s| s.priority())
            .unwrap_or(BuildStatus::Unknown)
    }
}

crate::simple_display! {
    BuildStatus {
        Unknown => "unknown",
        Cancelled => "cancelled",
        Success => "success",
        Planned => "planned",
        Queued => "queued",
        Uploading => "uploading",
        Building => "building",
        Failed => "failed",
    }
}

fn default_build_mode() -> String {
    "release".to_string()
}

/// Requester-supplied build options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Concrete platform, set on child builds only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    /// Requested platform list, set on the master build.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub platforms: Vec<String>,
    /// Human-facing build number; children carry it platform-qualified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    /// Application name, used to rename primary artifacts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default = "default_build_mode")]
    pub build_mode: String,
    /// Whether the requester wants artifacts returned as well as stored.
    #[serde(default)]
    pub save: bool,
    /// Bundle identifier override applied to the project manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_id: Option<String>,
    /// Per-platform bundle identifier overrides, taking precedence over
    /// `bundle_id`.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub platform_bundle_ids: HashMap<String, String>,
    /// Arbitrary key/value options (signing identities, device targets, ...)
    /// consumed by platform hook providers.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            platform: None,
            platforms: Vec::new(),
            number: None,
            name: None,
            build_mode: default_build_mode(),
            save: false,
            bundle_id: None,
            platform_bundle_ids: HashMap::new(),
            extra: HashMap::new(),
        }
    }
}

impl BuildConfig {
    pub fn new(platforms: Vec<String>) -> Self {
        Self { platforms, ..Self::default() }
    }

    crate::setters! {
        into {
            build_mode: String,
        }
        set {
            save: bool,
            extra: HashMap<String, String>,
        }
        option {
            number: String,
            name: String,
            bundle_id: String,
        }
    }

    /// Effective bundle identifier for a platform: the per-platform override
    /// wins over the shared one.
    pub fn bundle_id_for(&self, platform: &str) -> Option<&str> {
        self.platform_bundle_ids
            .get(platform)
            .map(String::as_str)
            .or(self.bundle_id.as_deref())
    }

    /// Derive the configuration for one platform's child build: the platform
    /// becomes concrete and the build number is platform-qualified.
    pub fn child_for(&self, platform: &str) -> BuildConfig {
        let mut conf = self.clone();
        conf.platform = Some(platform.to_string());
        conf.platforms = Vec::new();
        conf.number = self.number.as_ref().map(|n| format!("{n}.{platform}"));
        conf
    }
}

/// Flags selecting what a serialized build carries.
///
/// Status broadcasts must never include file content (bandwidth, memory);
/// agent dispatch and client result delivery must.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SerializeOpts {
    pub files: bool,
    pub output_files: bool,
    pub platforms: bool,
    pub logs: bool,
    pub content: bool,
}

impl SerializeOpts {
    /// Status broadcast: configuration and id only.
    pub const STATUS: SerializeOpts =
        SerializeOpts { files: false, output_files: false, platforms: false, logs: false, content: false };

    /// Hand-off to an agent: input file names plus content.
    pub const DISPATCH: SerializeOpts =
        SerializeOpts { files: true, output_files: false, platforms: false, logs: false, content: true };

    /// Disk persistence: everything except content.
    pub const PERSIST: SerializeOpts =
        SerializeOpts { files: true, output_files: true, platforms: true, logs: true, content: false };
}

/// The unit of work.
#[derive(Debug, Clone)]
pub struct Build {
    pub id: BuildId,
    /// Owning multi-platform build, set on children.
    pub master_id: Option<BuildId>,
    pub conf: BuildConfig,
    pub status: BuildStatus,
    /// Child build ids, one per platform, in request order. Master only.
    pub children: Vec<BuildId>,
    pub files: Vec<FileRef>,
    pub output_files: Vec<FileRef>,
    /// Ordered log, newest first.
    pub logs: VecDeque<Message>,
    pub started_at_ms: Option<u64>,
    pub completed_at_ms: Option<u64>,
    pub duration_ms: Option<u64>,
}

impl Build {
    pub fn new(conf: BuildConfig) -> Self {
        Self::with_id(BuildId::new(), conf)
    }

    pub fn with_id(id: BuildId, conf: BuildConfig) -> Self {
        Self {
            id,
            master_id: None,
            conf,
            status: BuildStatus::Unknown,
            children: Vec::new(),
            files: Vec::new(),
            output_files: Vec::new(),
            logs: VecDeque::new(),
            started_at_ms: None,
            completed_at_ms: None,
            duration_ms: None,
        }
    }

    /// Directory / display label: the configured build number when present,
    /// the id otherwise.
    pub fn label(&self) -> String {
        self.conf
            .number
            .clone()
            .unwrap_or_else(|| self.id.to_string())
    }

    /// The concrete platform of a child build.
    pub fn platform(&self) -> Option<&str> {
        self.conf.platform.as_deref()
    }

    /// A build is schedulable when it names exactly one concrete platform.
    pub fn is_schedulable(&self) -> bool {
        self.conf.platform.is_some() && self.children.is_empty()
    }

    /// Append a message, newest first.
    pub fn push_log(&mut self, message: Message) {
        self.logs.push_front(message);
    }

    /// Record completion bookkeeping against the recorded start time.
    pub fn mark_completed(&mut self, now_ms: u64) {
        self.completed_at_ms = Some(now_ms);
        self.duration_ms = self.started_at_ms.map(|s| now_ms.saturating_sub(s));
    }

    /// Produce the wire/disk representation selected by `opts`. Children are
    /// attached by the caller (only the registry can see them).
    pub fn to_payload(&self, opts: SerializeOpts) -> BuildPayload {
        BuildPayload {
            id: self.id.clone(),
            master_id: self.master_id.clone(),
            conf: self.conf.clone(),
            status: self.status,
            started_at_ms: self.started_at_ms,
            completed_at_ms: self.completed_at_ms,
            duration_ms: self.duration_ms,
            files: opts
                .files
                .then(|| self.files.iter().map(|f| f.to_payload(opts.content)).collect()),
            output_files: opts
                .output_files
                .then(|| self.output_files.iter().map(|f| f.to_payload(opts.content)).collect()),
            platforms: None,
            logs: opts.logs.then(|| self.logs.iter().cloned().collect()),
        }
    }

    /// Reconstruct a build (and any nested children) from its wire form.
    pub fn from_payload(payload: BuildPayload) -> (Build, Vec<Build>) {
        let children_payloads = payload.platforms.unwrap_or_default();
        let mut build = Build::with_id(payload.id, payload.conf);
        build.master_id = payload.master_id;
        build.status = payload.status;
        build.started_at_ms = payload.started_at_ms;
        build.completed_at_ms = payload.completed_at_ms;
        build.duration_ms = payload.duration_ms;
        build.files = payload
            .files
            .unwrap_or_default()
            .into_iter()
            .map(FileRef::from_payload)
            .collect();
        build.output_files = payload
            .output_files
            .unwrap_or_default()
            .into_iter()
            .map(FileRef::from_payload)
            .collect();
        build.logs = payload.logs.unwrap_or_default().into();

        let mut children = Vec::new();
        for child_payload in children_payloads {
            let (mut child, _) = Build::from_payload(child_payload);
            child.master_id = Some(build.id.clone());
            build.children.push(child.id.clone());
            children.push(child);
        }
        (build, children)
    }
}

/// Wire and disk representation of a [`Build`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildPayload {
    pub id: BuildId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_id: Option<BuildId>,
    pub conf: BuildConfig,
    pub status: BuildStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<FilePayload>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_files: Option<Vec<FilePayload>>,
    /// Nested per-platform child builds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platforms: Option<Vec<BuildPayload>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<Vec<Message>>,
}

crate::builder! {
    pub struct BuildBuilder => Build {
        into {
            id: BuildId = "bld-test",
        }
        set {
            conf: BuildConfig = BuildConfig::default(),
            status: BuildStatus = BuildStatus::Unknown,
            children: Vec<BuildId> = Vec::new(),
            files: Vec<FileRef> = Vec::new(),
            output_files: Vec<FileRef> = Vec::new(),
            logs: VecDeque<Message> = VecDeque::new(),
        }
        option {
            master_id: BuildId = None,
            started_at_ms: u64 = None,
            completed_at_ms: u64 = None,
            duration_ms: u64 = None,
        }
    }
}

#[cfg(test)]
#[path = "build_tests.rs"]
mod tests;
