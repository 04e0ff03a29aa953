// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mirror mode: messages observed in source chats are re-posted into the
//! destinations of the accounts watching them, reply chains included.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use chorus_core::{
    AccountId, ChatId, InboundMessage, MessageId, RelayMode, ThreadId, normalize_chat_ref,
};

use crate::context::{Eligible, RelayContext};
use crate::correlation::{CorrelationEntry, SourceKey};
use crate::history::HistoryEntry;

struct Reader {
    account: AccountId,
    handle: AbortHandle,
}

pub struct MirrorRunner {
    ctx: Arc<RelayContext>,
}

impl MirrorRunner {
    pub fn new(ctx: Arc<RelayContext>) -> Self {
        Self { ctx }
    }

    /// Attaches readers to every watched source and relays until `cancel`
    /// fires. Accounts are re-read every refresh interval.
    pub async fn run(self, cancel: CancellationToken) {
        let mut readers: HashMap<String, Reader> = HashMap::new();
        let mut consumers: JoinSet<String> = JoinSet::new();
        let period = self.ctx.config.refresh_interval().max(Duration::from_secs(1));
        let mut refresh = tokio::time::interval(period);
        refresh.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        self.ctx.history.restore().await;
        info!("mirror started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = refresh.tick() => {
                    self.attach(&mut readers, &mut consumers, &cancel).await;
                }
                Some(done) = consumers.join_next(), if !consumers.is_empty() => {
                    match done {
                        Ok(source) => debug!(source = %source, "reader detached"),
                        Err(e) if e.is_cancelled() => {}
                        Err(e) => warn!(error = %e, "reader task failed"),
                    }
                    readers.retain(|_, r| !r.handle.is_finished());
                }
            }
        }

        while consumers.join_next().await.is_some() {}
        info!("mirror stopped");
    }

    /// Makes the reader set match the current eligible watchers.
    async fn attach(
        &self,
        readers: &mut HashMap<String, Reader>,
        consumers: &mut JoinSet<String>,
        cancel: &CancellationToken,
    ) {
        let ctx = &self.ctx;
        if !ctx.is_enabled() {
            return;
        }
        let snapshot = ctx.refresh().await;
        ctx.ensure_connections(&snapshot).await;
        let eligible = ctx.eligible(&snapshot).await;

        // First eligible watcher per source, in storage order.
        let mut wanted: Vec<(String, String, Eligible)> = Vec::new();
        for candidate in &eligible {
            let Some(raw) = candidate.account.source_chat.as_deref() else {
                continue;
            };
            let key = normalize_chat_ref(raw);
            if !wanted.iter().any(|(k, _, _)| *k == key) {
                wanted.push((key, raw.to_string(), candidate.clone()));
            }
        }

        readers.retain(|source, reader| {
            let keep = !reader.handle.is_finished()
                && wanted.iter().any(|(k, _, _)| k == source)
                && watches(&eligible, &reader.account, source);
            if !keep {
                debug!(source = %source, account = %reader.account, "detaching reader");
                reader.handle.abort();
            }
            keep
        });

        for (key, raw, reader) in wanted {
            if readers.contains_key(&key) {
                continue;
            }
            let account = reader.account.id.clone();
            let source = match ctx.resolver.resolve(reader.conn.as_ref(), &raw).await {
                Ok(chat) => chat,
                Err(e) => {
                    ctx.controller.handle_failure(&account, &raw, &e).await;
                    continue;
                }
            };
            let rx = match reader.conn.subscribe(ctx.config.inbound_queue_capacity).await {
                Ok(rx) => rx,
                Err(e) => {
                    warn!(account = %account, source = %raw, error = %e, "could not subscribe to source");
                    continue;
                }
            };
            info!(account = %account, source = %raw, chat = %source, "reader attached");
            let handle = consumers.spawn(consume(
                ctx.clone(),
                key.clone(),
                source,
                rx,
                cancel.clone(),
            ));
            readers.insert(key, Reader { account, handle });
        }
    }
}

fn watches(eligible: &[Eligible], account: &AccountId, source: &str) -> bool {
    eligible.iter().any(|e| {
        &e.account.id == account
            && e.account
                .source_chat
                .as_deref()
                .is_some_and(|s| normalize_chat_ref(s) == source)
    })
}

/// Drains one source's inbound queue, each message in its own task.
async fn consume(
    ctx: Arc<RelayContext>,
    source_key: String,
    source_chat: ChatId,
    mut rx: mpsc::Receiver<InboundMessage>,
    cancel: CancellationToken,
) -> String {
    let mut inflight = JoinSet::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            message = rx.recv() => match message {
                Some(message) => {
                    let ctx = ctx.clone();
                    let source_key = source_key.clone();
                    let cancel = cancel.clone();
                    inflight.spawn(async move {
                        handle_message(&ctx, &source_key, source_chat, message, &cancel).await;
                    });
                }
                None => break,
            },
            Some(_) = inflight.join_next(), if !inflight.is_empty() => {}
        }
    }
    while inflight.join_next().await.is_some() {}
    source_key
}

/// One destination of a message and the accounts allowed to post there.
struct Route {
    destination: String,
    candidates: Vec<Eligible>,
    forced: bool,
}

async fn routes(
    ctx: &RelayContext,
    source_key: &str,
    message: &InboundMessage,
    eligible: Vec<Eligible>,
) -> Option<Vec<Route>> {
    if let Some(user) = message.sender
        && let Some(account) = ctx.pool.account_for_user(user).await
    {
        let Some(own) = eligible.into_iter().find(|e| e.account.id == account) else {
            debug!(account = %account, "sender account is not eligible, dropping message");
            return None;
        };
        return Some(
            own.account
                .destinations
                .iter()
                .map(|d| Route {
                    destination: d.clone(),
                    candidates: vec![own.clone()],
                    forced: true,
                })
                .collect(),
        );
    }

    let watchers: Vec<Eligible> = eligible
        .into_iter()
        .filter(|e| {
            e.account
                .source_chat
                .as_deref()
                .is_some_and(|s| normalize_chat_ref(s) == source_key)
        })
        .collect();

    let mut seen = HashSet::new();
    let mut routes = Vec::new();
    for watcher in &watchers {
        for destination in &watcher.account.destinations {
            let key = normalize_chat_ref(destination);
            if !seen.insert(key.clone()) {
                continue;
            }
            let candidates = watchers
                .iter()
                .filter(|w| {
                    w.account
                        .destinations
                        .iter()
                        .any(|d| normalize_chat_ref(d) == key)
                })
                .cloned()
                .collect();
            routes.push(Route {
                destination: destination.clone(),
                candidates,
                forced: false,
            });
        }
    }
    Some(routes)
}

/// Relays one observed message into every destination, sequentially.
async fn handle_message(
    ctx: &RelayContext,
    source_key: &str,
    source_chat: ChatId,
    message: InboundMessage,
    cancel: &CancellationToken,
) {
    if !ctx.is_enabled() || message.chat_id != source_chat {
        return;
    }
    let Some(content) = message.content.clone() else {
        debug!(chat = %message.chat_id, message = %message.message_id, "unsupported content, dropped");
        return;
    };
    let kind = content.kind();

    let snapshot = ctx.snapshot().await;
    let eligible = ctx.eligible(&snapshot).await;
    let Some(routes) = routes(ctx, source_key, &message, eligible).await else {
        return;
    };

    let key = SourceKey::new(message.chat_id, message.message_id);
    let parent = message.reply_to.map(|p| SourceKey::new(message.chat_id, p));
    let mut thread: Option<ThreadId> = match parent {
        Some(parent) => ctx.correlation.thread_of(parent).await,
        None => None,
    };

    for route in routes {
        if cancel.is_cancelled() || !ctx.is_enabled() {
            return;
        }
        let dest_key = normalize_chat_ref(&route.destination);
        let turn = if route.forced {
            let Some(own) = route.candidates.into_iter().next() else {
                continue;
            };
            ctx.selector.record(&dest_key, kind, &own.account.id).await;
            own
        } else {
            let ids: Vec<AccountId> = route.candidates.iter().map(|c| c.account.id.clone()).collect();
            let Some(chosen) = ctx.selector.pick(&dest_key, kind, &ids, None).await else {
                warn!(destination = %route.destination, "no account can post here, skipping");
                continue;
            };
            match route.candidates.into_iter().find(|c| c.account.id == chosen) {
                Some(turn) => turn,
                None => continue,
            }
        };

        let Some(chat) = ctx
            .prepare_destination(&turn.account, turn.conn.as_ref(), &route.destination, &snapshot, cancel)
            .await
        else {
            continue;
        };

        let reply_to = reply_target(ctx, parent, message.reply_text.as_deref(), chat, &mut thread).await;

        let Some(relayed) = ctx
            .send_to(
                &turn.account,
                turn.conn.as_ref(),
                &route.destination,
                chat,
                &content,
                reply_to,
                RelayMode::Mirror,
                cancel,
            )
            .await
        else {
            continue;
        };

        let thread = thread.get_or_insert_with(ThreadId::mint).clone();
        ctx.correlation
            .register(
                key,
                &thread,
                CorrelationEntry {
                    destination: chat,
                    account: turn.account.id.clone(),
                    relayed,
                },
            )
            .await;
        ctx.history
            .append(HistoryEntry {
                chat_id: chat,
                message_id: relayed,
                text: content.text().unwrap_or_default().to_string(),
                account: turn.account.id.clone(),
                thread,
                reply_to,
            })
            .await;
    }
}

/// The message in `chat` a reply should point at: the relayed copy of the
/// parent, else the most similar recent message. Adopts the match's thread
/// when none is known yet.
async fn reply_target(
    ctx: &RelayContext,
    parent: Option<SourceKey>,
    parent_text: Option<&str>,
    chat: ChatId,
    thread: &mut Option<ThreadId>,
) -> Option<MessageId> {
    let parent = parent?;
    if let Some(entry) = ctx.correlation.lookup(parent, chat).await {
        return Some(entry.relayed);
    }
    let matched = ctx.history.best_match(chat, parent_text?).await?;
    debug!(parent = %parent, chat = %chat, matched = %matched.message_id, "reply placed by text similarity");
    if thread.is_none() {
        *thread = Some(matched.thread.clone());
    }
    Some(matched.message_id)
}
