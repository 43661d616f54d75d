//! Foundation types for verdist, a versioned file distribution control plane.
//!
//! Every other verdist crate depends on `verdist-types`.
//!
//! # Key Types
//!
//! - [`FileName`]: validated identifier of a family of versioned contents
//! - [`Version`]: version token with a total, transitive ordering
//! - [`Checksum`]: SHA-256 digest of raw file bytes
//! - [`ContentAddress`]: logical address of stored content (BLAKE3)
//! - [`ContentRef`]: opaque locator handed out by a content store
//! - [`FileRecord`]: one published (filename, version) entry

pub mod address;
pub mod checksum;
pub mod error;
pub mod name;
pub mod record;
pub mod version;

pub use address::{ContentAddress, ContentRef};
pub use checksum::{Checksum, ChecksumHasher};
pub use error::TypeError;
pub use name::FileName;
pub use record::{FileInfo, FileRecord};
pub use version::{compare_versions, Version};
