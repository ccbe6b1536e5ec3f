// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! iOS build hooks.
//!
//! Signing configuration travels in the build's `extra` options:
//! `ios_skip_sign`, `ios_codesign_identity`, `ios_provisioning_path`.

use crate::hooks::{HookContext, HookError, PlatformHooks, PreBuild};
use async_trait::async_trait;
use foundry_core::Priority;

pub struct IosHooks;

fn skip_sign(cx: &HookContext<'_>) -> bool {
    cx.build
        .conf
        .extra
        .get("ios_skip_sign")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

#[async_trait]
impl PlatformHooks for IosHooks {
    /// When signing is skipped, neutralize the project's signing settings
    /// so xcodebuild does not demand an identity.
    async fn files_done(&self, cx: &HookContext<'_>) -> Result<(), HookError> {
        if !skip_sign(cx) {
            return Ok(());
        }
        let xcconfig = cx.work_dir.join("platforms/ios/cordova/build.xcconfig");
        cx.link.log(
            cx.build,
            Priority::Info,
            "Disabling code signing in build.xcconfig".to_string(),
        );
        if let Some(parent) = xcconfig.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| HookError::new(format!("error preparing {}: {e}", parent.display())))?;
        }
        tokio::fs::write(
            &xcconfig,
            "CODE_SIGN_IDENTITY=\nCODE_SIGNING_REQUIRED=NO\nPROVISIONING_PROFILE=\n",
        )
        .await
        .map_err(|e| {
            HookError::new(format!("Can't replace build.xcconfig at {}: {e}", xcconfig.display()))
        })?;
        Ok(())
    }

    /// Device builds only; signing identity and provisioning profile are
    /// appended when configured.
    async fn pre_build(&self, cx: &HookContext<'_>) -> Result<PreBuild, HookError> {
        if skip_sign(cx) {
            return Ok(PreBuild::with_args("--device"));
        }
        let mut args = String::from("--device");
        if let Some(identity) = cx.build.conf.extra.get("ios_codesign_identity") {
            args.push_str(&format!(" CODE_SIGN_IDENTITY='{identity}'"));
        }
        if let Some(profile) = cx.build.conf.extra.get("ios_provisioning_path") {
            args.push_str(&format!(" PROVISIONING_PROFILE='{profile}'"));
        }
        Ok(PreBuild::with_args(args))
    }

    async fn build_done(&self, _cx: &HookContext<'_>) -> Result<Vec<String>, HookError> {
        Ok(vec!["platforms/ios/build/**/*.ipa".to_string()])
    }
}
