// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The generic build pipeline every platform build runs through.
//!
//! A strictly ordered stage sequence with three platform hook points.
//! Cancellation is cooperative: the token is checked before every stage, so
//! a cancel takes effect with stage granularity, never mid-stage rollback.
//! Any stage failure short-circuits the rest; retries only ever happen by
//! the build being re-queued server-side.

use crate::archive::Archiver;
use crate::env::AgentConfig;
use crate::hooks::{HookContext, HookError, PlatformHooks};
use crate::toolchain::{self, OutputLine, ToolchainError};
use crate::worker::ServerLink;
use crate::workspace;
use foundry_core::{files, Build, FileError, FileRef, Priority};
use regex::Regex;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("build cancelled")]
    Cancelled,

    #[error("error creating the working folder {path}: {source}")]
    Workspace { path: PathBuf, source: std::io::Error },

    #[error("error while saving files on agent worker:\n{0}")]
    Materialize(#[from] FileError),

    #[error("error extracting archive files\n{0}")]
    Extract(String),

    #[error("{0}")]
    Hook(#[from] HookError),

    #[error("error rewriting bundle id in {path}: {source}")]
    Configure { path: PathBuf, source: std::io::Error },

    #[error("error starting build\n{0}")]
    ToolchainSpawn(String),

    #[error("child process exited with code {0}")]
    ToolchainExit(i32),

    #[error("build output reported failure")]
    ToolchainFailed,

    #[error("error collecting output files: {0}")]
    Artifacts(String),
}

pub struct BuildPipeline {
    config: AgentConfig,
    build: Build,
    work_dir: PathBuf,
    link: ServerLink,
    token: CancellationToken,
    archiver: Archiver,
}

impl BuildPipeline {
    pub fn new(
        config: AgentConfig,
        build: Build,
        link: ServerLink,
        token: CancellationToken,
    ) -> Self {
        let work_dir = if config.reuse_work_folder {
            config.work_root.clone()
        } else {
            config.work_root.join(build.label())
        };
        let archiver = Archiver::new(config.extract_command.clone());
        Self { config, build, work_dir, link, token, archiver }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn into_build(self) -> Build {
        self.build
    }

    fn guard(&self) -> Result<(), PipelineError> {
        if self.token.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn context(&self) -> HookContext<'_> {
        HookContext { work_dir: &self.work_dir, build: &self.build, link: &self.link }
    }

    /// Run all stages in order; returns the output artifacts on success.
    pub async fn run(&mut self, hooks: &dyn PlatformHooks) -> Result<Vec<FileRef>, PipelineError> {
        self.guard()?;
        self.reset_workspace().await?;
        self.guard()?;
        self.materialize_inputs().await?;
        self.guard()?;
        self.extract_archives().await?;
        self.guard()?;
        hooks.files_done(&self.context()).await?;
        self.guard()?;
        self.ensure_scaffold().await?;
        self.guard()?;
        self.configure_bundle_id().await?;
        self.guard()?;
        let pre = hooks.pre_build(&self.context()).await?;
        if pre.run_standard {
            self.guard()?;
            self.invoke_toolchain(&pre.extra_args).await?;
        }
        self.guard()?;
        let globs = hooks.build_done(&self.context()).await?;
        self.collect_artifacts(&globs)
    }

    /// Stage 1: workspace reset. Wipe mode recreates the per-build folder
    /// and prunes the oldest siblings per retention policy; reuse mode only
    /// guarantees the shared folder exists.
    async fn reset_workspace(&mut self) -> Result<(), PipelineError> {
        if !self.config.reuse_work_folder {
            if let Err(e) =
                foundry_core::prune_oldest(&self.config.work_root, self.config.keep).await
            {
                self.link.log(
                    &self.build,
                    Priority::Debug,
                    format!(
                        "Error while cleaning up last {} folders in the agent working folder {}:\n{e}",
                        self.config.keep,
                        self.config.work_root.display()
                    ),
                );
            }
        }
        self.work_dir = workspace::prepare(
            &self.config.work_root,
            &self.build.label(),
            self.config.reuse_work_folder,
        )
        .await
        .map_err(|source| PipelineError::Workspace {
            path: self.config.work_root.clone(),
            source,
        })?;
        Ok(())
    }

    /// Stage 2: write the staged input files into the working folder.
    async fn materialize_inputs(&mut self) -> Result<(), PipelineError> {
        files::write_contents(&self.work_dir, &mut self.build.files, false).await?;
        Ok(())
    }

    /// Stage 3: extract every input archive concurrently. The stage is a
    /// join point: the first failure aborts the rest and fails the build.
    async fn extract_archives(&mut self) -> Result<(), PipelineError> {
        let platform = self.build.platform().unwrap_or("unknown");
        self.link.log(
            &self.build,
            Priority::Info,
            format!("extracting archives for {platform}..."),
        );

        let mut set = tokio::task::JoinSet::new();
        for file in &self.build.files {
            self.link.log(
                &self.build,
                Priority::Debug,
                format!("extracting {} to {}", file.path.display(), self.work_dir.display()),
            );
            let archiver = self.archiver.clone();
            let path = file.path.clone();
            let dest = self.work_dir.clone();
            let token = self.token.clone();
            set.spawn(async move { archiver.extract(&path, &dest, &token).await });
        }

        while let Some(joined) = set.join_next().await {
            let failed = match joined {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(e) => Some(e.to_string()),
            };
            if let Some(error) = failed {
                set.abort_all();
                return Err(PipelineError::Extract(error));
            }
        }
        Ok(())
    }

    /// Stage 5: make sure the platform's native project scaffold exists,
    /// invoking the toolchain's platform-add step when it does not. Keeps
    /// the pipeline idempotent across cold and warm working folders.
    async fn ensure_scaffold(&self) -> Result<(), PipelineError> {
        let Some(platform) = self.build.platform() else {
            return Ok(());
        };
        let scaffold = self.work_dir.join("platforms").join(platform);
        if tokio::fs::try_exists(&scaffold).await.unwrap_or(false) {
            return Ok(());
        }

        let command = self.config.platform_add_command.replace("{platform}", platform);
        self.link.log(
            &self.build,
            Priority::Info,
            format!("platform scaffold missing, running: {command}"),
        );
        let result =
            toolchain::run_streaming(&command, &self.work_dir, None, &self.token, |line| {
                self.emit_line(&line)
            })
            .await
            .map_err(map_tool)?;
        match result.exit_code {
            Some(0) => Ok(()),
            code => Err(PipelineError::ToolchainExit(code.unwrap_or(-1))),
        }
    }

    /// Stage 6: apply the bundle identifier override by rewriting the
    /// widget id attribute in the project manifest.
    async fn configure_bundle_id(&self) -> Result<(), PipelineError> {
        let Some(platform) = self.build.platform() else {
            return Ok(());
        };
        let Some(bundle_id) = self.build.conf.bundle_id_for(platform).map(str::to_string) else {
            return Ok(());
        };

        let manifest = self.work_dir.join("config.xml");
        self.link.log(
            &self.build,
            Priority::Info,
            format!("Changing bundle id to {bundle_id} in config.xml"),
        );
        let data = tokio::fs::read_to_string(&manifest)
            .await
            .map_err(|source| PipelineError::Configure { path: manifest.clone(), source })?;

        let re = match Regex::new(r#"<widget id=("|').*?("|')"#) {
            Ok(re) => re,
            Err(e) => {
                return Err(PipelineError::Configure {
                    path: manifest,
                    source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
                })
            }
        };
        let replacement = format!("<widget id=\"{bundle_id}\"");
        let updated = re.replace_all(&data, regex::NoExpand(&replacement)).into_owned();

        tokio::fs::write(&manifest, updated)
            .await
            .map_err(|source| PipelineError::Configure { path: manifest, source })?;
        Ok(())
    }

    /// Stage 8: the external build command, streamed into the log and teed
    /// to a platform log file.
    async fn invoke_toolchain(&self, extra_args: &str) -> Result<(), PipelineError> {
        let platform = self.build.platform().unwrap_or("unknown").to_string();
        let command = self
            .config
            .build_command
            .replace("{platform}", &platform)
            .replace("{args}", extra_args)
            .replace("{mode}", &self.build.conf.build_mode);

        self.link.log(&self.build, Priority::Info, format!("building {platform}..."));
        self.link.log(&self.build, Priority::Status, format!("Executing {command}"));

        let tee = self.work_dir.join(format!("build.{platform}.log"));
        let mut saw_failure_marker = false;
        let result = toolchain::run_streaming(
            &command,
            &self.work_dir,
            Some(&tee),
            &self.token,
            |line| {
                if let OutputLine::Stderr(text) = &line {
                    if text.contains("BUILD FAILED") {
                        saw_failure_marker = true;
                    }
                }
                self.emit_line(&line);
            },
        )
        .await
        .map_err(map_tool)?;

        if saw_failure_marker {
            return Err(PipelineError::ToolchainFailed);
        }
        match result.exit_code {
            // Exit code 1 comes from the grep tail of piped build commands
            Some(0) | Some(1) => Ok(()),
            code => Err(PipelineError::ToolchainExit(code.unwrap_or(-1))),
        }
    }

    /// Resolve the hook-provided artifact globs against the working folder.
    fn collect_artifacts(&self, globs: &[String]) -> Result<Vec<FileRef>, PipelineError> {
        let mut found = Vec::new();
        for pattern in globs {
            let absolute = self.work_dir.join(pattern).display().to_string();
            let paths =
                glob::glob(&absolute).map_err(|e| PipelineError::Artifacts(e.to_string()))?;
            for entry in paths {
                match entry {
                    Ok(path) if path.is_file() => found.push(FileRef::new(path)),
                    Ok(_) => {}
                    Err(e) => return Err(PipelineError::Artifacts(e.to_string())),
                }
            }
        }
        if found.is_empty() {
            return Err(PipelineError::Artifacts(format!(
                "no output files matched {globs:?}"
            )));
        }
        Ok(found)
    }

    fn emit_line(&self, line: &OutputLine) {
        match line {
            OutputLine::Stdout(text) => {
                self.link.log(&self.build, Priority::BuildOutput, text.clone())
            }
            OutputLine::Stderr(text) => self.link.log(&self.build, Priority::Error, text.clone()),
        }
    }
}

fn map_tool(e: ToolchainError) -> PipelineError {
    match e {
        ToolchainError::Cancelled => PipelineError::Cancelled,
        other => PipelineError::ToolchainSpawn(other.to_string()),
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
