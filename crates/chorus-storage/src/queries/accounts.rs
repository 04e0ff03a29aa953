// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Account CRUD operations.

use chorus_core::{Account, AccountId, ChorusError};
use rusqlite::params;

use crate::database::{Database, map_tr_err, now};
use crate::models::AccountRow;

/// All accounts in insertion order.
pub async fn load_accounts(db: &Database) -> Result<Vec<Account>, ChorusError> {
    let rows = db
        .connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session, proxy_id, gender, enabled, source_chat, destinations, script_cursor
                 FROM accounts ORDER BY created_at, rowid",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(AccountRow {
                    id: row.get(0)?,
                    session: row.get(1)?,
                    proxy_id: row.get(2)?,
                    gender: row.get(3)?,
                    enabled: row.get(4)?,
                    source_chat: row.get(5)?,
                    destinations: row.get(6)?,
                    script_cursor: row.get(7)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, rusqlite::Error>>()
        })
        .await
        .map_err(map_tr_err)?;

    rows.into_iter().map(Account::try_from).collect()
}

/// Insert an account or replace every mutable column of an existing one.
pub async fn save_account(db: &Database, account: &Account) -> Result<(), ChorusError> {
    let row = AccountRow::from_account(account)?;
    let ts = now();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO accounts
                    (id, session, proxy_id, gender, enabled, source_chat, destinations,
                     script_cursor, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
                 ON CONFLICT(id) DO UPDATE SET
                    session = excluded.session,
                    proxy_id = excluded.proxy_id,
                    gender = excluded.gender,
                    enabled = excluded.enabled,
                    source_chat = excluded.source_chat,
                    destinations = excluded.destinations,
                    script_cursor = excluded.script_cursor,
                    updated_at = excluded.updated_at",
                params![
                    row.id,
                    row.session,
                    row.proxy_id,
                    row.gender,
                    row.enabled,
                    row.source_chat,
                    row.destinations,
                    row.script_cursor,
                    ts,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn delete_account(db: &Database, id: &AccountId) -> Result<(), ChorusError> {
    let id = id.0.clone();
    db.connection()
        .call(move |conn| {
            conn.execute("DELETE FROM accounts WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Update only the script position of an account.
pub async fn save_script_cursor(db: &Database, id: &AccountId, line: usize) -> Result<(), ChorusError> {
    let id = id.0.clone();
    let line = i64::try_from(line).unwrap_or(i64::MAX);
    let ts = now();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE accounts SET script_cursor = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, line, ts],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Update only the enabled flag of an account.
pub async fn set_account_enabled(db: &Database, id: &AccountId, enabled: bool) -> Result<(), ChorusError> {
    let id = id.0.clone();
    let ts = now();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE accounts SET enabled = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, enabled, ts],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
