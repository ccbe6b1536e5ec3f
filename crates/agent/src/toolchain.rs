// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! External toolchain invoker.
//!
//! Runs a shell command in a working directory, streaming stdout and stderr
//! line by line as they arrive, optionally teeing everything to a log file.
//! The caller decides what the exit code and output mean; this module only
//! executes and reports.

use std::path::Path;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error("error starting command: {0}")]
    Spawn(std::io::Error),

    #[error("I/O error while running command: {0}")]
    Io(#[from] std::io::Error),

    #[error("command cancelled")]
    Cancelled,
}

/// One line of subprocess output, tagged by stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    Stdout(String),
    Stderr(String),
}

impl OutputLine {
    pub fn text(&self) -> &str {
        match self {
            OutputLine::Stdout(s) | OutputLine::Stderr(s) => s,
        }
    }
}

/// Outcome of a completed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecResult {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

/// Run `command` through the shell in `cwd`, delivering each output line to
/// `on_line` as it arrives and appending everything to `tee` when given.
///
/// Cancellation kills the child process (best effort) and reports
/// [`ToolchainError::Cancelled`].
pub async fn run_streaming(
    command: &str,
    cwd: &Path,
    tee: Option<&Path>,
    token: &CancellationToken,
    mut on_line: impl FnMut(OutputLine),
) -> Result<ExecResult, ToolchainError> {
    let mut child = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(ToolchainError::Spawn)?;

    let mut tee_file = match tee {
        Some(path) => Some(
            tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await?,
        ),
        None => None,
    };

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let mut out_lines = stdout.map(|s| BufReader::new(s).lines());
    let mut err_lines = stderr.map(|s| BufReader::new(s).lines());
    let mut out_done = out_lines.is_none();
    let mut err_done = err_lines.is_none();

    while !(out_done && err_done) {
        tokio::select! {
            _ = token.cancelled() => {
                let _ = child.start_kill();
                return Err(ToolchainError::Cancelled);
            }
            line = next(&mut out_lines), if !out_done => match line? {
                Some(text) => {
                    write_tee(&mut tee_file, &text).await;
                    on_line(OutputLine::Stdout(text));
                }
                None => out_done = true,
            },
            line = next(&mut err_lines), if !err_done => match line? {
                Some(text) => {
                    write_tee(&mut tee_file, &text).await;
                    on_line(OutputLine::Stderr(text));
                }
                None => err_done = true,
            },
        }
    }

    let status = tokio::select! {
        _ = token.cancelled() => {
            let _ = child.start_kill();
            return Err(ToolchainError::Cancelled);
        }
        status = child.wait() => status?,
    };
    Ok(ExecResult { exit_code: status.code() })
}

async fn next(
    lines: &mut Option<tokio::io::Lines<BufReader<impl tokio::io::AsyncRead + Unpin>>>,
) -> std::io::Result<Option<String>> {
    match lines {
        Some(lines) => lines.next_line().await,
        None => Ok(None),
    }
}

async fn write_tee(tee: &mut Option<tokio::fs::File>, line: &str) {
    if let Some(file) = tee {
        if file.write_all(line.as_bytes()).await.is_err()
            || file.write_all(b"\n").await.is_err()
        {
            tracing::warn!("tee write failed, dropping log file");
            *tee = None;
        }
    }
}

#[cfg(test)]
#[path = "toolchain_tests.rs"]
mod tests;
