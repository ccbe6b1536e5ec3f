// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Archive extraction via a configured external tool.
//!
//! Which tool does the work (unzip, 7z, ...) is an external concern; this
//! module only substitutes the archive and destination into the configured
//! command template and runs it.

use crate::toolchain::{self, ToolchainError};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("{0}")]
    Tool(#[from] ToolchainError),

    #[error("extracting {archive} failed with exit code {code}")]
    Failed { archive: PathBuf, code: i32 },
}

/// Extraction tool configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Archiver {
    extract_command: String,
}

impl Archiver {
    /// `extract_command` is a template with `{archive}` and `{dest}`
    /// placeholders.
    pub fn new(extract_command: impl Into<String>) -> Self {
        Self { extract_command: extract_command.into() }
    }

    /// Extract one archive into `dest`.
    pub async fn extract(
        &self,
        archive: &Path,
        dest: &Path,
        token: &CancellationToken,
    ) -> Result<(), ArchiveError> {
        let command = self
            .extract_command
            .replace("{archive}", &archive.display().to_string())
            .replace("{dest}", &dest.display().to_string());
        let result = toolchain::run_streaming(&command, dest, None, token, |line| {
            tracing::debug!(line = line.text(), "extract");
        })
        .await?;
        match result.exit_code {
            Some(0) => Ok(()),
            code => Err(ArchiveError::Failed {
                archive: archive.to_path_buf(),
                code: code.unwrap_or(-1),
            }),
        }
    }
}

#[cfg(test)]
#[path = "archive_tests.rs"]
mod tests;
