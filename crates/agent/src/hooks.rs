// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Platform extension points for the generic build pipeline.
//!
//! Every platform build runs the same stage sequence; the differences live
//! behind [`PlatformHooks`]. Hooks are injected once per build through
//! [`hooks_for`]; there is no runtime hook mutation.

use crate::worker::ServerLink;
use async_trait::async_trait;
use foundry_core::Build;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct HookError(pub String);

impl HookError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// What a hook provider sees of the running pipeline.
pub struct HookContext<'a> {
    pub work_dir: &'a Path,
    pub build: &'a Build,
    pub link: &'a ServerLink,
}

/// Decision returned by [`PlatformHooks::pre_build`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreBuild {
    /// Whether the standard toolchain invocation runs at all.
    pub run_standard: bool,
    /// Extra arguments substituted into the build command template.
    pub extra_args: String,
}

impl PreBuild {
    /// Run the standard build with no extra arguments.
    pub fn standard() -> Self {
        Self { run_standard: true, extra_args: String::new() }
    }

    /// Run the standard build with extra command arguments.
    pub fn with_args(args: impl Into<String>) -> Self {
        Self { run_standard: true, extra_args: args.into() }
    }

    /// Skip the standard build invocation entirely.
    pub fn skip() -> Self {
        Self { run_standard: false, extra_args: String::new() }
    }
}

/// Extension hooks a platform provider supplies to the pipeline.
///
/// `files_done` and `pre_build` default to no-ops; `build_done` has no
/// sensible default because only the platform knows what its artifacts
/// look like.
#[async_trait]
pub trait PlatformHooks: Send + Sync {
    /// Inspect or mutate the working folder after extraction, before the
    /// scaffold check.
    async fn files_done(&self, _cx: &HookContext<'_>) -> Result<(), HookError> {
        Ok(())
    }

    /// Decide whether the standard build invocation runs and with which
    /// extra arguments.
    async fn pre_build(&self, _cx: &HookContext<'_>) -> Result<PreBuild, HookError> {
        Ok(PreBuild::standard())
    }

    /// Inspect the produced artifacts: return the globs (relative to the
    /// working folder) enumerating the output files.
    async fn build_done(&self, cx: &HookContext<'_>) -> Result<Vec<String>, HookError>;
}

/// Resolve the hook provider for a platform. `None` means the platform is
/// not supported by this worker.
pub fn hooks_for(platform: &str) -> Option<Box<dyn PlatformHooks>> {
    match platform {
        "android" => Some(Box::new(crate::platforms::android::AndroidHooks)),
        "ios" => Some(Box::new(crate::platforms::ios::IosHooks)),
        "wp8" => Some(Box::new(crate::platforms::wp8::Wp8Hooks)),
        _ => None,
    }
}
