// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Playback mode: accounts take turns posting the lines of a script.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use chorus_core::{Content, Notification, RelayCursor, RelayMode, Script};

use crate::context::RelayContext;
use crate::notify::notify_operator;
use crate::pacing::sleep_or_cancel;

pub struct PlaybackRunner {
    ctx: Arc<RelayContext>,
    cursor: RelayCursor,
}

impl PlaybackRunner {
    /// Creates a runner positioned at the persisted cursor (or the start
    /// when it cannot be loaded).
    pub async fn load(ctx: Arc<RelayContext>) -> Self {
        let cursor = match ctx.storage.load_cursor().await {
            Ok(cursor) => cursor,
            Err(e) => {
                warn!(error = %e, "could not load playback cursor, starting from the top");
                RelayCursor::default()
            }
        };
        Self { ctx, cursor }
    }

    pub fn cursor(&self) -> RelayCursor {
        self.cursor
    }

    /// Ticks until `cancel` fires, sleeping the inter-account delay
    /// between ticks.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(line = self.cursor.line_index, account = self.cursor.account_index, "playback started");
        while !cancel.is_cancelled() {
            self.tick(&cancel).await;
            if !sleep_or_cancel(self.ctx.pacing.inter_account, &cancel).await {
                break;
            }
        }
        info!("playback stopped");
    }

    async fn load_script(&self) -> Option<Script> {
        let scripts = match self.ctx.storage.load_scripts().await {
            Ok(scripts) => scripts,
            Err(e) => {
                warn!(error = %e, "could not load scripts, skipping tick");
                return None;
            }
        };
        let script = match &self.ctx.config.script_id {
            Some(id) => scripts.into_iter().find(|s| &s.id == id),
            None => scripts.into_iter().next(),
        };
        match script {
            Some(script) if !script.lines.is_empty() => Some(script),
            Some(script) => {
                warn!(script = %script.id, "script is empty, skipping tick");
                None
            }
            None => {
                warn!(script = ?self.ctx.config.script_id, "no script to play, skipping tick");
                None
            }
        }
    }

    /// One step: the account at the cursor posts the line at the cursor to
    /// each of its destinations, then the cursor advances and is persisted.
    pub async fn tick(&mut self, cancel: &CancellationToken) {
        let ctx = self.ctx.clone();
        if !ctx.is_enabled() {
            return;
        }

        let snapshot = ctx.refresh().await;
        ctx.ensure_connections(&snapshot).await;
        let eligible = ctx.eligible(&snapshot).await;

        let Some(script) = self.load_script().await else {
            return;
        };
        self.cursor = self.cursor.clamp(eligible.len(), script.lines.len());

        if eligible.is_empty() {
            warn!(line = self.cursor.line_index, "no eligible accounts, skipping line");
        } else {
            let line = &script.lines[self.cursor.line_index];
            let turn = &eligible[self.cursor.account_index];
            let content = Content::Text(line.clone());
            debug!(
                account = %turn.account.id,
                line = self.cursor.line_index,
                "playing script line"
            );

            for destination in &turn.account.destinations {
                if cancel.is_cancelled() || !ctx.is_enabled() {
                    return;
                }
                let Some(chat) = ctx
                    .prepare_destination(&turn.account, turn.conn.as_ref(), destination, &snapshot, cancel)
                    .await
                else {
                    continue;
                };
                ctx.send_to(
                    &turn.account,
                    turn.conn.as_ref(),
                    destination,
                    chat,
                    &content,
                    None,
                    RelayMode::Playback,
                    cancel,
                )
                .await;
                if !sleep_or_cancel(ctx.pacing.inter_message, cancel).await {
                    return;
                }
            }

            if !ctx.controller.is_disabled(&turn.account.id).await
                && let Err(e) = ctx
                    .storage
                    .save_script_cursor(&turn.account.id, self.cursor.line_index)
                    .await
            {
                warn!(account = %turn.account.id, error = %e, "could not record script position");
            }
        }

        let (next, wrapped) = self.cursor.advance(eligible.len(), script.lines.len());
        self.cursor = next;
        if wrapped {
            info!(script = %script.id, "script restarted");
            notify_operator(
                ctx.notifier.as_ref(),
                Notification::ScriptRestarted {
                    script: script.id.clone(),
                },
            )
            .await;
        }
        if let Err(e) = ctx.storage.save_cursor(self.cursor).await {
            warn!(error = %e, "could not persist playback cursor");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorus_config::model::{GenderConfig, RelayConfig};
    use chorus_core::StorageAdapter;
    use chorus_test_utils::{MemoryStorage, MockClient, RecordingNotifier, fixtures};

    async fn runner(
        storage: Arc<MemoryStorage>,
        client: Arc<MockClient>,
        notifier: Arc<RecordingNotifier>,
    ) -> PlaybackRunner {
        let config = RelayConfig {
            inter_message_delay_secs: 0.0,
            inter_account_delay_secs: 0.0,
            typing_min_ms: 0,
            typing_max_ms: 0,
            ..RelayConfig::default()
        };
        let ctx = Arc::new(
            RelayContext::new(config, &GenderConfig::default(), client, storage, notifier).unwrap(),
        );
        ctx.set_enabled(true);
        PlaybackRunner::load(ctx).await
    }

    #[tokio::test]
    async fn missing_script_skips_without_moving() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .save_account(&fixtures::account("+1", &["@a"]))
            .await
            .unwrap();
        let mut runner = runner(
            storage.clone(),
            Arc::new(MockClient::new()),
            Arc::new(RecordingNotifier::new()),
        )
        .await;
        runner.tick(&CancellationToken::new()).await;
        assert_eq!(runner.cursor(), RelayCursor::default());
        assert_eq!(storage.cursor_saves(), 0);
    }

    #[tokio::test]
    async fn no_eligible_accounts_advances_line_only() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .save_script("main", &["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        let mut runner = runner(
            storage.clone(),
            Arc::new(MockClient::new()),
            Arc::new(RecordingNotifier::new()),
        )
        .await;
        runner.tick(&CancellationToken::new()).await;
        assert_eq!(
            runner.cursor(),
            RelayCursor {
                line_index: 1,
                account_index: 0
            }
        );
        assert_eq!(storage.cursor().await, Some(runner.cursor()));
    }

    #[tokio::test]
    async fn out_of_range_cursor_is_clamped_on_load() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .save_script("main", &["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        storage
            .save_account(&fixtures::account("+1", &["@a"]))
            .await
            .unwrap();
        storage
            .save_cursor(RelayCursor {
                line_index: 5,
                account_index: 9,
            })
            .await
            .unwrap();
        let client = Arc::new(MockClient::new());
        let conn = client.connection("+1", 1).await;
        conn.with_chat("@a", 100).await;

        let mut runner = runner(storage, client, Arc::new(RecordingNotifier::new())).await;
        runner.tick(&CancellationToken::new()).await;
        let sent = conn.sent_to(100).await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message.content, Content::Text("b".into()));
    }
}
