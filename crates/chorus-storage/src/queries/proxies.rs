// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Proxy CRUD operations.

use chorus_core::{ChorusError, Proxy};
use rusqlite::params;

use crate::database::{Database, map_tr_err, now};
use crate::models::ProxyRow;

pub async fn load_proxies(db: &Database) -> Result<Vec<Proxy>, ChorusError> {
    let rows = db
        .connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, scheme, host, port, username, password FROM proxies ORDER BY id",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(ProxyRow {
                    id: row.get(0)?,
                    scheme: row.get(1)?,
                    host: row.get(2)?,
                    port: row.get(3)?,
                    username: row.get(4)?,
                    password: row.get(5)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, rusqlite::Error>>()
        })
        .await
        .map_err(map_tr_err)?;

    rows.into_iter().map(Proxy::try_from).collect()
}

/// Insert a proxy and return the id it was assigned.
pub async fn add_proxy(db: &Database, proxy: &Proxy) -> Result<i64, ChorusError> {
    let scheme = proxy.scheme.to_string();
    let host = proxy.host.clone();
    let port = i64::from(proxy.port);
    let username = proxy.username.clone();
    let password = proxy.password.clone();
    let ts = now();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO proxies (scheme, host, port, username, password, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![scheme, host, port, username, password, ts],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Delete a proxy and detach it from every account in one transaction.
pub async fn delete_proxy(db: &Database, id: i64) -> Result<(), ChorusError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE accounts SET proxy_id = NULL WHERE proxy_id = ?1",
                params![id],
            )?;
            tx.execute("DELETE FROM proxies WHERE id = ?1", params![id])?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
