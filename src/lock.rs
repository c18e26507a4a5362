//! Deck-store lock serializing "check duplicate → deliver → persist".
//!
//! Two layers:
//!
//! - an in-process [`tokio::sync::Mutex`] shared by every clone of a
//!   [`DeckLock`], so concurrent tasks in one process queue up;
//! - an advisory lock file created with `create_new`, so a second
//!   `deckforge` process pointed at the same database waits too.
//!
//! The lock file holds an owner token (`<pid> <uuid>`). Acquisition polls
//! the file until `timeout`. A lock file older than `stale_after` is assumed
//! to belong to a crashed process and is removed, but only if its token has
//! not changed since it was judged stale. A [`DeckLockGuard`] removes the
//! file on drop only while the file still carries its own token, so a
//! holder whose lock was broken never deletes the next owner's lock.
//!
//! `stale_after` must exceed the longest time a holder keeps the lock;
//! `config::validate` enforces that against the deck API timeout.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Error, Debug)]
pub enum LockError {
    #[error("timed out after {waited:?} waiting for deck lock {path}")]
    Timeout { path: PathBuf, waited: Duration },

    #[error("deck lock I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Clone)]
pub struct DeckLock {
    path: PathBuf,
    timeout: Duration,
    stale_after: Duration,
    local: Arc<Mutex<()>>,
}

/// Held while the lock is owned. Removes the lock file on drop if it is
/// still ours.
pub struct DeckLockGuard {
    path: PathBuf,
    token: String,
    _local: OwnedMutexGuard<()>,
}

impl DeckLock {
    pub fn new(path: impl Into<PathBuf>, timeout: Duration, stale_after: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
            stale_after,
            local: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn acquire(&self) -> Result<DeckLockGuard, LockError> {
        let started = Instant::now();

        let local = tokio::time::timeout(self.timeout, self.local.clone().lock_owned())
            .await
            .map_err(|_| LockError::Timeout {
                path: self.path.clone(),
                waited: started.elapsed(),
            })?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| LockError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let token = format!("{} {}", std::process::id(), Uuid::new_v4());

        loop {
            let created = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.path)
                .await;

            match created {
                Ok(mut file) => {
                    let written = async {
                        file.write_all(token.as_bytes()).await?;
                        file.flush().await
                    }
                    .await;
                    if let Err(source) = written {
                        let _ = tokio::fs::remove_file(&self.path).await;
                        return Err(LockError::Io {
                            path: self.path.clone(),
                            source,
                        });
                    }
                    debug!(path = %self.path.display(), %token, "deck lock acquired");
                    return Ok(DeckLockGuard {
                        path: self.path.clone(),
                        token,
                        _local: local,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if self.break_if_stale().await {
                        continue;
                    }
                    if started.elapsed() >= self.timeout {
                        return Err(LockError::Timeout {
                            path: self.path.clone(),
                            waited: started.elapsed(),
                        });
                    }
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                Err(source) => {
                    return Err(LockError::Io {
                        path: self.path.clone(),
                        source,
                    })
                }
            }
        }
    }

    /// Remove the lock file if it is older than `stale_after` and its owner
    /// token is unchanged. Returns true if a file was removed.
    async fn break_if_stale(&self) -> bool {
        let Ok(owner) = tokio::fs::read_to_string(&self.path).await else {
            return false;
        };
        if !self.is_stale().await {
            return false;
        }
        // Another waiter may have broken it and taken a fresh lock meanwhile.
        match tokio::fs::read_to_string(&self.path).await {
            Ok(current) if current == owner => {
                warn!(path = %self.path.display(), owner = %owner.trim(), "breaking stale deck lock");
                tokio::fs::remove_file(&self.path).await.is_ok()
            }
            _ => false,
        }
    }

    async fn is_stale(&self) -> bool {
        tokio::fs::metadata(&self.path)
            .await
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .is_some_and(|age| age >= self.stale_after)
    }
}

impl DeckLockGuard {
    /// Owner token written into the lock file.
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl Drop for DeckLockGuard {
    fn drop(&mut self) {
        match std::fs::read_to_string(&self.path) {
            Ok(current) if current == self.token => {
                if let Err(e) = std::fs::remove_file(&self.path) {
                    warn!(path = %self.path.display(), error = %e, "failed to remove deck lock file");
                }
            }
            Ok(current) => warn!(
                path = %self.path.display(),
                owner = %current.trim(),
                "deck lock was taken over while held; leaving it in place"
            ),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %self.path.display(), "deck lock file vanished while held")
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read deck lock file")
            }
        }
    }
}
