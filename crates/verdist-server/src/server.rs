use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tracing::info;
use verdist_index::{FileMetadataIndex, InMemoryMetadataIndex, MetadataIndex, DEFAULT_LEASE_TTL};
use verdist_service::{ConsumerService, IngestService, PublishFeed};
use verdist_store::{ContentStore, InMemoryContentStore, LocalContentStore};

use crate::config::{ControlPlaneConfig, StorageBackend};
use crate::error::{ServerError, ServerResult};
use crate::router::{consumer_router, ingest_router};

/// Which half of the control plane a process runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Role {
    /// Accepts uploads; holds the index's writer lease on local storage.
    Ingest,
    /// Serves reads; opens the local index read-only.
    Consumer,
    #[default]
    Both,
}

impl Role {
    pub fn writes(self) -> bool {
        matches!(self, Self::Ingest | Self::Both)
    }
}

/// Opened backends plus the services built on them.
///
/// Both services share one store, one index and one publish feed. In a
/// split deployment each process opens its own `ControlPlane` on the same
/// data directory with its [`Role`] and serves only its half. At most one
/// writing process can hold a local data directory at a time.
pub struct ControlPlane {
    config: ControlPlaneConfig,
    ingest: Arc<IngestService>,
    consumer: Arc<ConsumerService>,
    feed: PublishFeed,
}

impl ControlPlane {
    /// Validate `config` and open the configured backends for both roles.
    pub async fn open(config: ControlPlaneConfig) -> ServerResult<Self> {
        Self::open_as(config, Role::Both).await
    }

    /// Validate `config` and open the configured backends for `role`.
    pub async fn open_as(config: ControlPlaneConfig, role: Role) -> ServerResult<Self> {
        config.validate()?;

        let (store, index): (Arc<dyn ContentStore>, Arc<dyn MetadataIndex>) =
            match config.storage.backend {
                StorageBackend::Local => {
                    let store = LocalContentStore::open(config.content_dir()).await?;
                    let index = if role.writes() {
                        FileMetadataIndex::open_writer(config.index_dir(), DEFAULT_LEASE_TTL).await?
                    } else {
                        FileMetadataIndex::open_reader(config.index_dir()).await?
                    };
                    (Arc::new(store), Arc::new(index))
                }
                StorageBackend::Memory => (
                    Arc::new(InMemoryContentStore::new()),
                    Arc::new(InMemoryMetadataIndex::new()),
                ),
            };
        info!(
            ?role,
            backend = ?config.storage.backend,
            data_dir = %config.storage.data_dir.display(),
            "backends opened"
        );

        let service = config.service_config();
        let feed = PublishFeed::default();
        let ingest = IngestService::new(Arc::clone(&store), Arc::clone(&index), service.clone())
            .with_feed(feed.clone());
        let consumer = ConsumerService::new(store, index, service);

        Ok(Self {
            config,
            ingest: Arc::new(ingest),
            consumer: Arc::new(consumer),
            feed,
        })
    }

    pub fn config(&self) -> &ControlPlaneConfig {
        &self.config
    }

    pub fn ingest(&self) -> &Arc<IngestService> {
        &self.ingest
    }

    pub fn consumer(&self) -> &Arc<ConsumerService> {
        &self.consumer
    }

    pub fn feed(&self) -> &PublishFeed {
        &self.feed
    }

    pub fn ingest_router(&self) -> Router {
        ingest_router(Arc::clone(&self.ingest), self.config.listen.allow_cors)
    }

    pub fn consumer_router(&self) -> Router {
        consumer_router(Arc::clone(&self.consumer), self.config.listen.allow_cors)
    }

    pub async fn serve_ingest(&self) -> ServerResult<()> {
        serve("ingest", self.config.listen.ingest_addr, self.ingest_router()).await
    }

    pub async fn serve_consumer(&self) -> ServerResult<()> {
        serve("consumer", self.config.listen.consumer_addr, self.consumer_router()).await
    }

    /// Serve both routers until either fails.
    pub async fn serve_all(&self) -> ServerResult<()> {
        tokio::try_join!(self.serve_ingest(), self.serve_consumer())?;
        Ok(())
    }
}

async fn serve(service: &'static str, addr: SocketAddr, app: Router) -> ServerResult<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(service, addr = %listener.local_addr()?, "listening");
    axum::serve(listener, app).await.map_err(ServerError::Io)
}
