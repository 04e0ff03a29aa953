// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Playback cursor persistence (single-row table).

use chorus_core::{ChorusError, RelayCursor};
use rusqlite::params;

use crate::database::{Database, map_tr_err, now};

/// The saved cursor, or `(0, 0)` when nothing was saved yet.
pub async fn load_cursor(db: &Database) -> Result<RelayCursor, ChorusError> {
    db.connection()
        .call(|conn| {
            let result = conn.query_row(
                "SELECT line_index, account_index FROM relay_cursor WHERE id = 1",
                [],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
            );
            match result {
                Ok((line, account)) => Ok(RelayCursor {
                    line_index: usize::try_from(line).unwrap_or(0),
                    account_index: usize::try_from(account).unwrap_or(0),
                }),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(RelayCursor::default()),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

pub async fn save_cursor(db: &Database, cursor: RelayCursor) -> Result<(), ChorusError> {
    let line = i64::try_from(cursor.line_index).unwrap_or(0);
    let account = i64::try_from(cursor.account_index).unwrap_or(0);
    let ts = now();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO relay_cursor (id, line_index, account_index, updated_at)
                 VALUES (1, ?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET
                    line_index = excluded.line_index,
                    account_index = excluded.account_index,
                    updated_at = excluded.updated_at",
                params![line, account, ts],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
