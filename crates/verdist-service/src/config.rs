//! Runtime budgets and switches for the services.

use std::time::Duration;

/// Default cap on a single upload: 32 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 32 << 20;

/// Bounded delay between a publish and its visibility to readers.
///
/// The index makes a publish visible to later reads in the same process
/// immediately. Readers in another process may trail by up to `max_delay`.
/// Consumers that must observe a specific publish poll every
/// `poll_interval` until the window closes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StalenessWindow {
    pub max_delay: Duration,
    pub poll_interval: Duration,
}

impl Default for StalenessWindow {
    fn default() -> Self {
        Self {
            max_delay: Duration::from_secs(2),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Settings shared by the ingest and consumer services.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Budget for each content store call.
    pub store_timeout: Duration,
    /// Budget for each metadata index call.
    pub index_timeout: Duration,
    /// Largest accepted upload body.
    pub max_upload_bytes: u64,
    /// Re-read and re-hash content after commit, before publishing.
    pub verify_after_write: bool,
    /// Re-hash content before serving it.
    pub verify_on_read: bool,
    pub staleness: StalenessWindow,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(30),
            index_timeout: Duration::from_secs(5),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            verify_after_write: true,
            verify_on_read: false,
            staleness: StalenessWindow::default(),
        }
    }
}
