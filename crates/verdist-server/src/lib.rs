//! HTTP front ends for verdist.
//!
//! The ingest router accepts multipart uploads, the consumer router serves
//! content and metadata. The ingest router also streams accepted publishes
//! as server-sent events. They share nothing but the store and index behind
//! their services, so they can run in one process or in two.

pub mod api;
pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use api::{
    FilesResponse, HealthResponse, UpdatesQuery, UploadMetadata, UploadResponse, VersionsResponse,
    LAGGED_EVENT, PUBLISH_EVENT,
};
pub use config::{ControlPlaneConfig, StorageBackend};
pub use error::{ApiError, ErrorBody, ServerError, ServerResult};
pub use router::{consumer_router, ingest_router};
pub use server::{ControlPlane, Role};
