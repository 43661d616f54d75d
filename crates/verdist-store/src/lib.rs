//! Immutable content storage for verdist.
//!
//! Uploaded bytes are streamed into a staging area while the caller computes
//! their checksum, then committed under a [`ContentAddress`] derived from
//! `(filename, version, checksum)`. The store hands back a [`ContentRef`]
//! locator, which is what the metadata index records.
//!
//! # Storage Backends
//!
//! All backends implement the [`ContentStore`] trait:
//!
//! - [`InMemoryContentStore`] -- `HashMap`-based store for tests and embedding
//! - [`LocalContentStore`] -- git-style fan-out directory on local disk
//!
//! # Design Rules
//!
//! 1. Content is immutable once committed. A commit onto an existing
//!    address keeps the existing bytes and discards the staged copy.
//! 2. Nothing is visible under an address until its commit returns.
//! 3. Concurrent reads are always safe (content never changes).
//! 4. The store never deletes committed content; retention is external.
//! 5. All I/O errors are propagated, never silently ignored.
//!
//! [`ContentAddress`]: verdist_types::ContentAddress
//! [`ContentRef`]: verdist_types::ContentRef

pub mod error;
pub mod local;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use local::LocalContentStore;
pub use memory::InMemoryContentStore;
pub use traits::{ContentStore, ContentWriter};
