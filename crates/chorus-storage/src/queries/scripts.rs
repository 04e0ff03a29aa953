// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Playback script operations.

use chorus_core::{ChorusError, Script};
use rusqlite::params;

use crate::database::{Database, map_tr_err, now};
use crate::models::ScriptRow;

pub async fn load_scripts(db: &Database) -> Result<Vec<Script>, ChorusError> {
    let rows = db
        .connection()
        .call(|conn| {
            let mut stmt = conn.prepare("SELECT id, lines FROM scripts ORDER BY rowid")?;
            let rows = stmt.query_map([], |row| {
                Ok(ScriptRow {
                    id: row.get(0)?,
                    lines: row.get(1)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, rusqlite::Error>>()
        })
        .await
        .map_err(map_tr_err)?;

    rows.into_iter().map(Script::try_from).collect()
}

pub async fn save_script(db: &Database, id: &str, lines: &[String]) -> Result<(), ChorusError> {
    let id = id.to_string();
    let lines = serde_json::to_string(lines).map_err(|e| ChorusError::Storage {
        source: Box::new(e),
    })?;
    let ts = now();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO scripts (id, lines, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET lines = excluded.lines, updated_at = excluded.updated_at",
                params![id, lines, ts],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn delete_script(db: &Database, id: &str) -> Result<(), ChorusError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute("DELETE FROM scripts WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
