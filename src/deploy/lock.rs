// ABOUTME: Deploy lock to prevent concurrent deployments of the same service.
// ABOUTME: Uses atomic file creation with lock info stored next to the deployment state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::ResourceName;

/// Failure to take or release the deploy lock.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("deploy lock held by {holder} (pid {pid}) since {started_at}; use --force to break it")]
    Held {
        holder: String,
        pid: u32,
        started_at: DateTime<Utc>,
    },

    #[error("lock file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("lock acquired by another process while breaking a stale lock")]
    Contended,
}

/// Distinguishes staging files created by one process.
static STAGING_SEQ: AtomicU64 = AtomicU64::new(0);

fn stale_after() -> chrono::Duration {
    chrono::Duration::hours(1)
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> LockError + use<> {
    let path = path.to_path_buf();
    move |source| LockError::Io { path, source }
}

/// Hidden file next to the lock, e.g. `.shop.lock.4242.0.tmp`.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{suffix}"))
}

/// Information about who holds a deploy lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// Hostname of the machine that holds the lock.
    pub holder: String,
    /// Process ID of the lock holder.
    pub pid: u32,
    /// When the lock was acquired.
    pub started_at: DateTime<Utc>,
    /// Service being deployed.
    pub service: String,
}

impl LockInfo {
    /// Create new lock info for the current process.
    pub fn new(service: &ResourceName) -> Self {
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            started_at: Utc::now(),
            service: service.to_string(),
        }
    }

    /// Check if this lock is stale (older than 1 hour).
    pub fn is_stale(&self) -> bool {
        Utc::now() - self.started_at >= stale_after()
    }

    /// Path to the lock file for a service.
    pub fn lock_path(state_dir: &Path, service: &ResourceName) -> PathBuf {
        state_dir.join(format!("{service}.lock"))
    }
}

/// A held deploy lock that releases on drop.
#[derive(Debug)]
pub struct DeployLock {
    path: PathBuf,
    released: bool,
}

impl DeployLock {
    /// Acquire the deploy lock for `service`.
    ///
    /// The lock file is published with a hard link, so it either does not
    /// exist or holds complete lock info, and two processes cannot both win.
    /// Stale locks (>1 hour) are broken with a warning; a live lock is only
    /// broken with `force`.
    pub fn acquire(
        state_dir: &Path,
        service: &ResourceName,
        force: bool,
    ) -> Result<Self, LockError> {
        fs::create_dir_all(state_dir).map_err(io_error(state_dir))?;

        let path = LockInfo::lock_path(state_dir, service);
        let info = LockInfo::new(service);

        if Self::try_create(&path, &info)? {
            return Ok(Self::held(path));
        }

        match fs::read(&path) {
            Ok(existing) => {
                Self::check_existing_lock(&path, &existing, force)?;
                tracing::debug!("Removing stale/forced lock at {}", path.display());
                Self::break_lock(&path, &existing)?;
            }
            // Released between our attempt and the read.
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => return Err(LockError::Io { path, source }),
        }

        if Self::try_create(&path, &info)? {
            Ok(Self::held(path))
        } else {
            Err(LockError::Contended)
        }
    }

    fn held(path: PathBuf) -> Self {
        Self {
            path,
            released: false,
        }
    }

    /// `Ok(false)` when the file already exists.
    fn try_create(path: &Path, info: &LockInfo) -> Result<bool, LockError> {
        let seq = STAGING_SEQ.fetch_add(1, Ordering::Relaxed);
        let staged = sibling(path, &format!("{}.{seq}.tmp", info.pid));

        let json = serde_json::to_vec(info).map_err(|e| io_error(&staged)(io::Error::other(e)))?;
        fs::write(&staged, json).map_err(io_error(&staged))?;

        let linked = fs::hard_link(&staged, path);
        if let Err(e) = fs::remove_file(&staged) {
            tracing::debug!("Failed to remove staged lock {}: {}", staged.display(), e);
        }
        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(io_error(path)(e)),
        }
    }

    /// Err when the existing lock must be respected.
    ///
    /// Lock info that cannot be parsed is trusted for as long as the file
    /// itself is younger than the stale threshold.
    fn check_existing_lock(path: &Path, content: &[u8], force: bool) -> Result<(), LockError> {
        let existing = match serde_json::from_slice::<LockInfo>(content) {
            Ok(existing) => existing,
            Err(_) if force => {
                tracing::warn!("Breaking lock with unreadable info at {}", path.display());
                return Ok(());
            }
            Err(_) => {
                let modified = fs::metadata(path)
                    .and_then(|m| m.modified())
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now());
                if Utc::now() - modified >= stale_after() {
                    tracing::warn!("Lock info corrupted and stale, breaking lock");
                    return Ok(());
                }
                return Err(LockError::Held {
                    holder: "unknown".to_string(),
                    pid: 0,
                    started_at: modified,
                });
            }
        };

        if force {
            tracing::warn!(
                "Breaking lock held by {} (pid {}) since {}",
                existing.holder,
                existing.pid,
                existing.started_at
            );
            Ok(())
        } else if existing.is_stale() {
            tracing::warn!(
                "Auto-breaking stale lock held by {} (pid {}) since {}",
                existing.holder,
                existing.pid,
                existing.started_at
            );
            Ok(())
        } else {
            Err(LockError::Held {
                holder: existing.holder,
                pid: existing.pid,
                started_at: existing.started_at,
            })
        }
    }

    /// Move the judged lock out of the way.
    ///
    /// If the file moved aside is not the one that was judged, another
    /// process broke it first and already holds a new lock: that lock is
    /// put back and the attempt fails as contended.
    fn break_lock(path: &Path, judged: &[u8]) -> Result<(), LockError> {
        let seq = STAGING_SEQ.fetch_add(1, Ordering::Relaxed);
        let aside = sibling(path, &format!("{}.{seq}.broken", std::process::id()));

        match fs::rename(path, &aside) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(io_error(path)(e)),
        }

        let moved = fs::read(&aside).unwrap_or_default();
        let result = if moved == judged {
            Ok(())
        } else {
            if let Err(e) = fs::hard_link(&aside, path) {
                tracing::warn!("Failed to restore lock {}: {}", path.display(), e);
            }
            Err(LockError::Contended)
        };
        if let Err(e) = fs::remove_file(&aside) {
            tracing::debug!("Failed to remove broken lock {}: {}", aside.display(), e);
        }
        result
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock.
    pub fn release(mut self) -> Result<(), LockError> {
        self.released = true;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(LockError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

impl Drop for DeployLock {
    fn drop(&mut self) {
        if !self.released
            && let Err(e) = fs::remove_file(&self.path)
            && e.kind() != io::ErrorKind::NotFound
        {
            tracing::warn!("Failed to release deploy lock {}: {}", self.path.display(), e);
        }
    }
}

/// Run `f` while holding the deploy lock. The lock is released even if `f` fails.
pub async fn with_lock<T, E, F, Fut>(
    state_dir: &Path,
    service: &ResourceName,
    force: bool,
    f: F,
) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: From<LockError>,
{
    let lock = DeployLock::acquire(state_dir, service, force)?;
    let result = f().await;
    if let Err(e) = lock.release() {
        tracing::warn!("Failed to release deploy lock: {}", e);
    }
    result
}
