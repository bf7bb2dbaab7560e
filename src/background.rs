//! 登录失败记录清理的后台任务。

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::auth::SessionRegistry;
use crate::config::LOGIN_PRUNE_INTERVAL_SECS;

pub fn spawn_background_tasks(sessions: Arc<SessionRegistry>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(LOGIN_PRUNE_INTERVAL_SECS));
        loop {
            interval.tick().await;
            sessions.prune_login_attempts().await;
            debug!("pruned stale login attempts");
        }
    });
}
