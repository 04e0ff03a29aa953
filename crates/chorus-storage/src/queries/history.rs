// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Destination history operations.

use chorus_core::{AccountId, ChatId, ChorusError, HistoryEntry, MessageId, ThreadId};
use rusqlite::params;

use crate::database::{Database, map_tr_err, now};

/// Append an entry, then prune its chat down to the newest `keep` rows.
pub async fn append_history(db: &Database, entry: &HistoryEntry, keep: usize) -> Result<(), ChorusError> {
    let entry = entry.clone();
    let keep = i64::try_from(keep.max(1)).unwrap_or(i64::MAX);
    let ts = now();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO destination_history
                    (chat_id, message_id, text, account_id, thread_id, reply_to, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    entry.chat_id.0,
                    entry.message_id.0,
                    entry.text,
                    entry.account.0,
                    entry.thread.0,
                    entry.reply_to.map(|m| m.0),
                    ts,
                ],
            )?;
            tx.execute(
                "DELETE FROM destination_history
                 WHERE chat_id = ?1 AND id NOT IN (
                    SELECT id FROM destination_history WHERE chat_id = ?1
                    ORDER BY id DESC LIMIT ?2
                 )",
                params![entry.chat_id.0, keep],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// The newest `per_chat` entries of every chat, oldest first within a chat.
pub async fn load_history(db: &Database, per_chat: usize) -> Result<Vec<HistoryEntry>, ChorusError> {
    let per_chat = i64::try_from(per_chat).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT chat_id, message_id, text, account_id, thread_id, reply_to
                 FROM (
                    SELECT *, ROW_NUMBER() OVER (PARTITION BY chat_id ORDER BY id DESC) AS age
                    FROM destination_history
                 )
                 WHERE age <= ?1
                 ORDER BY chat_id, id",
            )?;
            let rows = stmt.query_map(params![per_chat], |row| {
                Ok(HistoryEntry {
                    chat_id: ChatId(row.get(0)?),
                    message_id: MessageId(row.get(1)?),
                    text: row.get(2)?,
                    account: AccountId(row.get(3)?),
                    thread: ThreadId(row.get(4)?),
                    reply_to: row.get::<_, Option<i64>>(5)?.map(MessageId),
                })
            })?;
            rows.collect::<Result<Vec<_>, rusqlite::Error>>()
        })
        .await
        .map_err(map_tr_err)
}
