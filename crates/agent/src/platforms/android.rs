// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Android build hooks.

use crate::hooks::{HookContext, HookError, PlatformHooks, PreBuild};
use async_trait::async_trait;
use foundry_core::Priority;

pub struct AndroidHooks;

#[async_trait]
impl PlatformHooks for AndroidHooks {
    /// Remove APKs left over from a previous run of a reused work folder;
    /// they would otherwise be reported as fresh artifacts.
    async fn files_done(&self, cx: &HookContext<'_>) -> Result<(), HookError> {
        let stale = stale_apks(cx)?;
        if stale.is_empty() {
            return Ok(());
        }
        cx.link.log(
            cx.build,
            Priority::Info,
            format!(
                "Deleting existing apks:\n{}",
                stale.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join("\n")
            ),
        );
        for apk in stale {
            tokio::fs::remove_file(&apk)
                .await
                .map_err(|e| HookError::new(format!("error deleting {}: {e}", apk.display())))?;
        }
        Ok(())
    }

    /// The android toolchain expects the assets folder to exist even on a
    /// freshly added scaffold.
    async fn pre_build(&self, cx: &HookContext<'_>) -> Result<PreBuild, HookError> {
        let assets = cx.work_dir.join("platforms/android/assets/www");
        cx.link.log(
            cx.build,
            Priority::Info,
            format!("Ensuring android work folder {}", assets.display()),
        );
        tokio::fs::create_dir_all(&assets)
            .await
            .map_err(|e| HookError::new(format!("Error ensuring assets/www folder: {e}")))?;
        Ok(PreBuild::standard())
    }

    async fn build_done(&self, _cx: &HookContext<'_>) -> Result<Vec<String>, HookError> {
        Ok(vec!["platforms/android/**/*.apk".to_string()])
    }
}

fn stale_apks(cx: &HookContext<'_>) -> Result<Vec<std::path::PathBuf>, HookError> {
    let pattern = cx.work_dir.join("platforms/android/**/*.apk").display().to_string();
    let paths = glob::glob(&pattern).map_err(|e| HookError::new(e.to_string()))?;
    let mut found = Vec::new();
    for entry in paths {
        match entry {
            Ok(path) if path.is_file() => found.push(path),
            Ok(_) => {}
            Err(e) => return Err(HookError::new(e.to_string())),
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::ServerLink;
    use foundry_core::{Build, BuildConfig};

    fn context_parts() -> (Build, ServerLink) {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let build = Build::new(BuildConfig::default().child_for("android"));
        (build, ServerLink::new(tx))
    }

    #[tokio::test]
    async fn files_done_removes_stale_apks() {
        let dir = tempfile::tempdir().unwrap();
        let apk_dir = dir.path().join("platforms/android/app/build");
        tokio::fs::create_dir_all(&apk_dir).await.unwrap();
        let stale = apk_dir.join("app-release.apk");
        tokio::fs::write(&stale, b"old").await.unwrap();

        let (build, link) = context_parts();
        let cx = HookContext { work_dir: dir.path(), build: &build, link: &link };
        AndroidHooks.files_done(&cx).await.unwrap();

        assert!(!stale.exists());
    }

    #[tokio::test]
    async fn files_done_on_clean_folder_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let (build, link) = context_parts();
        let cx = HookContext { work_dir: dir.path(), build: &build, link: &link };
        AndroidHooks.files_done(&cx).await.unwrap();
    }

    #[tokio::test]
    async fn pre_build_ensures_assets_folder() {
        let dir = tempfile::tempdir().unwrap();
        let (build, link) = context_parts();
        let cx = HookContext { work_dir: dir.path(), build: &build, link: &link };

        let pre = AndroidHooks.pre_build(&cx).await.unwrap();

        assert!(pre.run_standard);
        assert!(dir.path().join("platforms/android/assets/www").is_dir());
    }

    #[tokio::test]
    async fn build_done_names_apk_glob() {
        let dir = tempfile::tempdir().unwrap();
        let (build, link) = context_parts();
        let cx = HookContext { work_dir: dir.path(), build: &build, link: &link };
        let globs = AndroidHooks.build_done(&cx).await.unwrap();
        assert_eq!(globs, vec!["platforms/android/**/*.apk"]);
    }
}
