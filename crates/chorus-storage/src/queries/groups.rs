// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Managed destination group operations.

use chorus_core::{ChorusError, ManagedGroup};
use rusqlite::params;

use crate::database::{Database, map_tr_err};

pub async fn load_managed_groups(db: &Database) -> Result<Vec<ManagedGroup>, ChorusError> {
    db.connection()
        .call(|conn| {
            let mut stmt =
                conn.prepare("SELECT chat_ref, title, open FROM managed_groups ORDER BY rowid")?;
            let rows = stmt.query_map([], |row| {
                Ok(ManagedGroup {
                    chat_ref: row.get(0)?,
                    title: row.get(1)?,
                    open: row.get(2)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, rusqlite::Error>>()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn save_managed_group(db: &Database, group: &ManagedGroup) -> Result<(), ChorusError> {
    let group = group.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO managed_groups (chat_ref, title, open) VALUES (?1, ?2, ?3)
                 ON CONFLICT(chat_ref) DO UPDATE SET title = excluded.title, open = excluded.open",
                params![group.chat_ref, group.title, group.open],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn delete_managed_group(db: &Database, chat_ref: &str) -> Result<(), ChorusError> {
    let chat_ref = chat_ref.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM managed_groups WHERE chat_ref = ?1",
                params![chat_ref],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
