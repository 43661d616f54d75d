//! Metadata index for verdist.
//!
//! The index is the single source of truth shared by the ingest and consumer
//! services. For every file name it keeps a [`FileFamily`]: the published
//! [`FileRecord`]s keyed by version, plus a [`LatestRegister`] naming the
//! highest published version.
//!
//! # Architecture
//!
//! - **Records** are immutable. Re-publishing a version with the same
//!   checksum is a [`PutOutcome::DuplicateVersion`]; with a different
//!   checksum it is a [`PutOutcome::Conflict`]. Neither changes the index.
//! - **The latest register** only moves forward under the version
//!   comparator, so its final value is the maximum published version no
//!   matter in which order concurrent publishes complete.
//! - **Publishing** inserts the record and advances the register in one
//!   critical section per file name. Different file names never contend.
//!
//! # Modules
//!
//! - [`error`]: Error types for index operations
//! - [`family`]: [`FileFamily`], [`LatestRegister`] and [`PutOutcome`]
//! - [`traits`]: The [`MetadataIndex`] trait
//! - [`memory`]: In-memory [`InMemoryMetadataIndex`]
//! - [`file`]: Directory-backed [`FileMetadataIndex`] shared across processes
//! - [`lease`]: [`WriterLease`] keeping a second writer off a directory
//!
//! [`FileRecord`]: verdist_types::FileRecord

pub mod error;
pub mod family;
pub mod file;
pub mod lease;
pub mod memory;
pub mod traits;

pub use error::{IndexError, IndexResult};
pub use family::{FileFamily, LatestRegister, PutOutcome};
pub use file::FileMetadataIndex;
pub use lease::{LeaseInfo, WriterLease, DEFAULT_LEASE_TTL};
pub use memory::InMemoryMetadataIndex;
pub use traits::MetadataIndex;
