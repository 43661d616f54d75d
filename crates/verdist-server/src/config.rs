use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use verdist_service::{ServiceConfig, StalenessWindow};

use crate::error::{ServerError, ServerResult};

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "VERDIST_";

/// Which backends hold content and metadata.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Content and index under `data_dir`, shareable between processes.
    #[default]
    Local,
    /// Process-local maps. Only useful when both services run in one process.
    Memory,
}

impl std::str::FromStr for StorageBackend {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "memory" => Ok(Self::Memory),
            other => Err(ServerError::Config(format!("unknown storage backend: {other}"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    pub ingest_addr: SocketAddr,
    pub consumer_addr: SocketAddr,
    /// Attach a permissive CORS layer to both routers.
    pub allow_cors: bool,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            ingest_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            consumer_addr: SocketAddr::from(([0, 0, 0, 0], 8081)),
            allow_cors: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            data_dir: PathBuf::from("./data"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_upload_bytes: u64,
    pub store_timeout_ms: u64,
    pub index_timeout_ms: u64,
    pub verify_after_write: bool,
    pub verify_on_read: bool,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        let service = ServiceConfig::default();
        Self {
            max_upload_bytes: service.max_upload_bytes,
            store_timeout_ms: service.store_timeout.as_millis() as u64,
            index_timeout_ms: service.index_timeout.as_millis() as u64,
            verify_after_write: service.verify_after_write,
            verify_on_read: service.verify_on_read,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StalenessConfig {
    pub max_delay_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for StalenessConfig {
    fn default() -> Self {
        let window = StalenessWindow::default();
        Self {
            max_delay_ms: window.max_delay.as_millis() as u64,
            poll_interval_ms: window.poll_interval.as_millis() as u64,
        }
    }
}

/// Configuration for a verdist deployment.
///
/// ```toml
/// [listen]
/// ingest_addr = "0.0.0.0:8080"
/// consumer_addr = "0.0.0.0:8081"
///
/// [storage]
/// backend = "local"
/// data_dir = "/var/lib/verdist"
///
/// [limits]
/// max_upload_bytes = 33554432
/// index_timeout_ms = 5000
///
/// [staleness]
/// max_delay_ms = 2000
/// ```
///
/// Every section and key is optional.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlPlaneConfig {
    pub listen: ListenConfig,
    pub storage: StorageConfig,
    pub limits: LimitsConfig,
    pub staleness: StalenessConfig,
}

impl ControlPlaneConfig {
    pub fn from_toml_str(s: &str) -> ServerResult<Self> {
        toml::from_str(s).map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> ServerResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Apply `VERDIST_*` variables from the process environment.
    pub fn with_env_overrides(mut self) -> ServerResult<Self> {
        self.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(self)
    }

    /// Apply overrides from `lookup`, which maps a variable name such as
    /// `VERDIST_DATA_DIR` to its value.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> ServerResult<()> {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(v) = get("INGEST_ADDR") {
            self.listen.ingest_addr = parse("INGEST_ADDR", &v)?;
        }
        if let Some(v) = get("CONSUMER_ADDR") {
            self.listen.consumer_addr = parse("CONSUMER_ADDR", &v)?;
        }
        if let Some(v) = get("ALLOW_CORS") {
            self.listen.allow_cors = parse("ALLOW_CORS", &v)?;
        }
        if let Some(v) = get("STORAGE_BACKEND") {
            self.storage.backend = v.parse()?;
        }
        if let Some(v) = get("DATA_DIR") {
            self.storage.data_dir = PathBuf::from(v);
        }
        if let Some(v) = get("MAX_UPLOAD_BYTES") {
            self.limits.max_upload_bytes = parse("MAX_UPLOAD_BYTES", &v)?;
        }
        if let Some(v) = get("STORE_TIMEOUT_MS") {
            self.limits.store_timeout_ms = parse("STORE_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("INDEX_TIMEOUT_MS") {
            self.limits.index_timeout_ms = parse("INDEX_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("VERIFY_ON_READ") {
            self.limits.verify_on_read = parse("VERIFY_ON_READ", &v)?;
        }
        if let Some(v) = get("STALENESS_MS") {
            self.staleness.max_delay_ms = parse("STALENESS_MS", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> ServerResult<()> {
        let fail = |msg: &str| Err(ServerError::Config(msg.to_string()));
        if self.limits.max_upload_bytes == 0 {
            return fail("limits.max_upload_bytes must be positive");
        }
        if self.limits.store_timeout_ms == 0 || self.limits.index_timeout_ms == 0 {
            return fail("store and index timeouts must be positive");
        }
        if self.staleness.poll_interval_ms == 0 {
            return fail("staleness.poll_interval_ms must be positive");
        }
        if self.listen.ingest_addr == self.listen.consumer_addr {
            return fail("ingest and consumer must listen on different addresses");
        }
        if self.storage.backend == StorageBackend::Local
            && self.storage.data_dir.as_os_str().is_empty()
        {
            return fail("storage.data_dir must be set for the local backend");
        }
        Ok(())
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            store_timeout: Duration::from_millis(self.limits.store_timeout_ms),
            index_timeout: Duration::from_millis(self.limits.index_timeout_ms),
            max_upload_bytes: self.limits.max_upload_bytes,
            verify_after_write: self.limits.verify_after_write,
            verify_on_read: self.limits.verify_on_read,
            staleness: StalenessWindow {
                max_delay: Duration::from_millis(self.staleness.max_delay_ms),
                poll_interval: Duration::from_millis(self.staleness.poll_interval_ms),
            },
        }
    }

    pub fn content_dir(&self) -> PathBuf {
        self.storage.data_dir.join("content")
    }

    pub fn index_dir(&self) -> PathBuf {
        self.storage.data_dir.join("index")
    }
}

fn parse<T>(name: &str, value: &str) -> ServerResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ServerError::Config(format!("{ENV_PREFIX}{name}={value}: {e}")))
}
