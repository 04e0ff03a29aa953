// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Relay dispatcher: runs one mode at a time and owns its lifecycle.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use chorus_core::{ChorusError, Notification, RelayMode};

use crate::context::RelayContext;
use crate::mirror::MirrorRunner;
use crate::notify::notify_operator;
use crate::playback::PlaybackRunner;

/// Observable dispatcher state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Idle,
    Running(RelayMode),
}

struct ActiveRun {
    mode: RelayMode,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct Dispatcher {
    ctx: Arc<RelayContext>,
    active: Mutex<Option<ActiveRun>>,
}

impl Dispatcher {
    pub fn new(ctx: Arc<RelayContext>) -> Self {
        Self {
            ctx,
            active: Mutex::new(None),
        }
    }

    pub fn context(&self) -> &Arc<RelayContext> {
        &self.ctx
    }

    pub async fn state(&self) -> DispatcherState {
        match self.active.lock().await.as_ref() {
            Some(run) if !run.task.is_finished() => DispatcherState::Running(run.mode),
            _ => DispatcherState::Idle,
        }
    }

    /// Connects the pool and starts relaying in `mode`.
    ///
    /// Fails when a mode is already running; the modes are mutually
    /// exclusive, so the running one must be stopped first.
    pub async fn start(&self, mode: RelayMode) -> Result<(), ChorusError> {
        let mut active = self.active.lock().await;
        if let Some(run) = active.as_ref()
            && !run.task.is_finished()
        {
            return Err(ChorusError::Internal(format!(
                "relay already running in {} mode",
                run.mode
            )));
        }

        let ctx = self.ctx.clone();
        ctx.set_enabled(true);
        let snapshot = ctx.refresh().await;
        let live = ctx.ensure_connections(&snapshot).await;
        let total = snapshot.accounts.iter().filter(|a| a.enabled).count();
        info!(mode = %mode, live, total, "relay starting");
        notify_operator(ctx.notifier.as_ref(), Notification::PoolStarted { live, total }).await;
        notify_operator(ctx.notifier.as_ref(), Notification::ModeStarted { mode }).await;

        let cancel = CancellationToken::new();
        let task = match mode {
            RelayMode::Playback => {
                let runner = PlaybackRunner::load(ctx.clone()).await;
                tokio::spawn(runner.run(cancel.clone()))
            }
            RelayMode::Mirror => tokio::spawn(MirrorRunner::new(ctx.clone()).run(cancel.clone())),
        };
        *active = Some(ActiveRun { mode, cancel, task });
        Ok(())
    }

    /// Stops relaying: in-flight sends finish, no new ones start, and the
    /// pool is torn down. Returns the mode that was running.
    pub async fn stop(&self) -> Option<RelayMode> {
        let run = self.active.lock().await.take();
        self.ctx.set_enabled(false);
        let run = run?;

        run.cancel.cancel();
        if let Err(e) = run.task.await
            && !e.is_cancelled()
        {
            warn!(mode = %run.mode, error = %e, "relay task ended abnormally");
        }

        self.ctx.pool.stop_all().await;
        notify_operator(self.ctx.notifier.as_ref(), Notification::PoolStopped).await;
        notify_operator(
            self.ctx.notifier.as_ref(),
            Notification::ModeStopped { mode: run.mode },
        )
        .await;
        info!(mode = %run.mode, "relay stopped");
        Some(run.mode)
    }
}
