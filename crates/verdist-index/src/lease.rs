//! Exclusive writer lease over an index directory.
//!
//! [`FileMetadataIndex`](crate::FileMetadataIndex) serializes writers per
//! file name only inside one process. The lease keeps a second writing
//! process off the same directory: the holder publishes a lease file with
//! an expiry and renews it in the background; anyone else fails to open
//! for writing until the lease is released or expires.
//!
//! # How It Works
//!
//! 1. The lease is written to a temp file, then hard-linked into place.
//!    The link fails if a lease already exists, so only one process wins.
//! 2. An existing lease past its expiry is taken over by removing it and
//!    linking again.
//! 3. The holder renews by atomically replacing the file, after checking
//!    that it still names the holder.
//! 4. Release (or drop) removes the file if it still names the holder.
//!
//! Takeover of an expired lease by two processes at once is not atomic;
//! the loser notices on its next renewal and logs the loss.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{IndexError, IndexResult};

/// Default lease lifetime.
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(30);

const LEASE_FILE: &str = "writer.lease";

/// Lease file contents.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseInfo {
    pub holder_id: String,
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl LeaseInfo {
    fn new(holder_id: &str, acquired_at: DateTime<Utc>, ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::seconds(30));
        Self {
            holder_id: holder_id.to_string(),
            pid: std::process::id(),
            acquired_at,
            expires_at: Utc::now() + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// A held writer lease. Dropping it releases the lease.
#[derive(Debug)]
pub struct WriterLease {
    path: PathBuf,
    info: LeaseInfo,
    renewer: JoinHandle<()>,
    released: bool,
}

impl WriterLease {
    /// Take the writer lease of the index rooted at `root`.
    ///
    /// Fails with [`IndexError::WriterLocked`] while another holder's lease
    /// is live.
    pub async fn acquire(root: &Path, ttl: Duration) -> IndexResult<Self> {
        let path = root.join(LEASE_FILE);
        let holder_id = Uuid::now_v7().to_string();
        let info = LeaseInfo::new(&holder_id, Utc::now(), ttl);

        if !try_link(&path, &info).await? {
            match read_lease(&path).await? {
                Some(existing) if !existing.is_expired() => return Err(locked(existing)),
                Some(existing) => warn!(
                    holder = %existing.holder_id,
                    pid = existing.pid,
                    expired_at = %existing.expires_at,
                    "taking over expired writer lease"
                ),
                None => {}
            }
            remove_if_present(&path).await?;
            if !try_link(&path, &info).await? {
                return match read_lease(&path).await? {
                    Some(existing) => Err(locked(existing)),
                    None => Err(IndexError::Io(std::io::Error::new(
                        ErrorKind::AlreadyExists,
                        "writer lease contended",
                    ))),
                };
            }
        }

        info!(holder = %holder_id, path = %path.display(), "writer lease acquired");
        let renewer = tokio::spawn(renew_loop(path.clone(), info.clone(), ttl));
        Ok(Self {
            path,
            info,
            renewer,
            released: false,
        })
    }

    pub fn holder_id(&self) -> &str {
        &self.info.holder_id
    }

    /// Release the lease now rather than on drop.
    pub async fn release(mut self) -> IndexResult<()> {
        self.renewer.abort();
        self.released = true;
        match read_lease(&self.path).await? {
            Some(current) if current.holder_id == self.info.holder_id => {
                remove_if_present(&self.path).await?;
                debug!(holder = %self.info.holder_id, "writer lease released");
            }
            _ => warn!(holder = %self.info.holder_id, "writer lease was no longer held at release"),
        }
        Ok(())
    }
}

impl Drop for WriterLease {
    fn drop(&mut self) {
        self.renewer.abort();
        if self.released {
            return;
        }
        let ours = std::fs::read(&self.path)
            .ok()
            .and_then(|data| serde_json::from_slice::<LeaseInfo>(&data).ok())
            .is_some_and(|current| current.holder_id == self.info.holder_id);
        if ours {
            if let Err(e) = std::fs::remove_file(&self.path) {
                warn!(path = %self.path.display(), error = %e, "failed to remove writer lease");
            }
        }
    }
}

fn locked(existing: LeaseInfo) -> IndexError {
    IndexError::WriterLocked {
        holder: existing.holder_id,
        pid: existing.pid,
        expires_at: existing.expires_at,
    }
}

async fn write_temp(path: &Path, info: &LeaseInfo) -> IndexResult<PathBuf> {
    let data =
        serde_json::to_vec_pretty(info).map_err(|e| IndexError::Serialization(e.to_string()))?;
    let tmp = path.with_file_name(format!(".{LEASE_FILE}.{}.tmp", Uuid::now_v7()));
    let mut file = fs::File::create(&tmp).await?;
    file.write_all(&data).await?;
    file.sync_all().await?;
    Ok(tmp)
}

/// Link a fresh lease into place. `false` if a lease already exists.
async fn try_link(path: &Path, info: &LeaseInfo) -> IndexResult<bool> {
    let tmp = write_temp(path, info).await?;
    let linked = match fs::hard_link(&tmp, path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.into()),
    };
    remove_if_present(&tmp).await?;
    linked
}

async fn read_lease(path: &Path) -> IndexResult<Option<LeaseInfo>> {
    let data = match fs::read(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    match serde_json::from_slice(&data) {
        Ok(info) => Ok(Some(info)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "unreadable writer lease, treating as expired");
            Ok(None)
        }
    }
}

async fn remove_if_present(path: &Path) -> IndexResult<()> {
    match fs::remove_file(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

/// Replace the lease with a renewed expiry. `false` if it is no longer ours.
async fn renew(path: &Path, held: &LeaseInfo, ttl: Duration) -> IndexResult<bool> {
    match read_lease(path).await? {
        Some(current) if current.holder_id == held.holder_id => {}
        _ => return Ok(false),
    }
    let renewed = LeaseInfo::new(&held.holder_id, held.acquired_at, ttl);
    let tmp = write_temp(path, &renewed).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        remove_if_present(&tmp).await?;
        return Err(e.into());
    }
    Ok(true)
}

async fn renew_loop(path: PathBuf, held: LeaseInfo, ttl: Duration) {
    let period = (ttl / 3).max(Duration::from_millis(10));
    loop {
        tokio::time::sleep(period).await;
        match renew(&path, &held, ttl).await {
            Ok(true) => debug!(holder = %held.holder_id, "writer lease renewed"),
            Ok(false) => {
                error!(holder = %held.holder_id, "writer lease lost to another process");
                break;
            }
            Err(e) => warn!(holder = %held.holder_id, error = %e, "writer lease renewal failed"),
        }
    }
}
