// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Single-instance guard for a database file.
//!
//! Two relays over one store would dial the same sessions twice. The guard
//! is an exclusive OS lock on `<database>.lock`, released when the process
//! exits or the guard is dropped.

use std::fs::{File, OpenOptions, TryLockError};
use std::path::PathBuf;

use chorus_core::ChorusError;
use tracing::debug;

/// Held for as long as this process owns the database.
#[derive(Debug)]
pub struct InstanceLock {
    file: File,
    path: PathBuf,
}

impl InstanceLock {
    /// Takes the lock next to `database_path`, failing at once when another
    /// process holds it.
    pub fn acquire(database_path: &str) -> Result<Self, ChorusError> {
        let path = PathBuf::from(format!("{database_path}.lock"));
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| storage_error(&path, e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| storage_error(&path, e))?;

        match file.try_lock() {
            Ok(()) => {
                debug!(path = %path.display(), "instance lock taken");
                Ok(Self { file, path })
            }
            Err(TryLockError::WouldBlock) => Err(ChorusError::AlreadyRunning {
                lock_path: path.display().to_string(),
            }),
            Err(TryLockError::Error(e)) => Err(storage_error(&path, e)),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn storage_error(path: &std::path::Path, e: std::io::Error) -> ChorusError {
    ChorusError::Storage {
        source: format!("lock file {}: {e}", path.display()).into(),
    }
}
