//! Ingest and consumer services for verdist.
//!
//! Both services are thin protocol layers over a shared
//! [`ContentStore`](verdist_store::ContentStore) and
//! [`MetadataIndex`](verdist_index::MetadataIndex). They never talk to each
//! other: anything the consumer can see was published through the index.
//!
//! # Publish protocol
//!
//! 1. Validate the file name and version token.
//! 2. Stream the body into a staged store write, hashing as it goes.
//! 3. Commit the staged bytes under the content address.
//! 4. Propose the record to the index.
//!
//! A failure after step 3 leaves orphaned content in the store. It is
//! logged and never deleted here.
//!
//! # Modules
//!
//! - [`config`]: [`ServiceConfig`] and [`StalenessWindow`]
//! - [`error`]: [`ServiceError`] and its [`ErrorKind`] classification
//! - [`feed`]: [`PublishFeed`] fan-out of accepted records
//! - [`ingest`]: [`IngestService`]
//! - [`consumer`]: [`ConsumerService`]

pub mod config;
pub mod consumer;
pub mod error;
pub mod feed;
pub mod ingest;

mod deadline;

pub use config::{ServiceConfig, StalenessWindow};
pub use consumer::{ConsumerService, ServedFile};
pub use error::{ErrorKind, ServiceError, ServiceResult};
pub use feed::{FeedFilter, FeedStream, PublishEvent, PublishFeed};
pub use ingest::{IngestService, UploadResult};
