// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Windows Phone build hooks: the default pipeline with xap artifacts.

use crate::hooks::{HookContext, HookError, PlatformHooks};
use async_trait::async_trait;

pub struct Wp8Hooks;

#[async_trait]
impl PlatformHooks for Wp8Hooks {
    async fn build_done(&self, _cx: &HookContext<'_>) -> Result<Vec<String>, HookError> {
        Ok(vec![
            "platforms/wp8/**/*.xap".to_string(),
            "build.wp8.log".to_string(),
        ])
    }
}
