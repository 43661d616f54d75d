//! Error types for the ingest and consumer services.

use std::io;
use std::time::Duration;

use thiserror::Error;
use verdist_index::IndexError;
use verdist_store::StoreError;
use verdist_types::{Checksum, FileName, TypeError, Version};

/// Coarse classification of a [`ServiceError`].
///
/// Callers branch on the kind rather than on individual variants. Every
/// failure maps to exactly one kind, so none of them reaches a caller as an
/// undifferentiated failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed file name, version or upload body. Nothing was mutated.
    Validation,
    /// The version exists with different content.
    Conflict,
    /// The file or version is not in the index.
    NotFound,
    /// The index references content the store cannot produce intact.
    IntegrityFault,
    /// A store or index call exceeded its budget.
    Timeout,
    /// A store or index call failed outright.
    Unavailable,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation_error",
            Self::Conflict => "conflict",
            Self::NotFound => "not_found",
            Self::IntegrityFault => "integrity_fault",
            Self::Timeout => "timeout",
            Self::Unavailable => "unavailable",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by [`IngestService`](crate::IngestService) and
/// [`ConsumerService`](crate::ConsumerService).
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] TypeError),

    #[error("upload exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },

    #[error("failed to read upload body: {0}")]
    Body(#[source] io::Error),

    #[error("version {version} of {filename} already exists with checksum {existing}, upload has {proposed}")]
    Conflict {
        filename: FileName,
        version: Version,
        existing: Checksum,
        proposed: Checksum,
    },

    #[error("{filename} not found")]
    FileNotFound { filename: FileName },

    #[error("version {version} of {filename} not found")]
    VersionNotFound { filename: FileName, version: Version },

    #[error("integrity fault for {filename}@{version}: {reason}")]
    IntegrityFault {
        filename: FileName,
        version: Version,
        reason: String,
    },

    #[error("{operation} did not complete within {budget:?}")]
    Timeout {
        operation: &'static str,
        budget: Duration,
    },

    #[error("content store error: {0}")]
    Store(#[from] StoreError),

    #[error("metadata index error: {0}")]
    Index(#[from] IndexError),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) | Self::TooLarge { .. } | Self::Body(_) => ErrorKind::Validation,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::FileNotFound { .. } | Self::VersionNotFound { .. } => ErrorKind::NotFound,
            Self::IntegrityFault { .. }
            | Self::Store(StoreError::InvalidLocator(_))
            | Self::Index(IndexError::Corrupt { .. }) => ErrorKind::IntegrityFault,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Store(_) | Self::Index(_) => ErrorKind::Unavailable,
        }
    }

    /// Whether repeating the same call unchanged may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Timeout | ErrorKind::Unavailable)
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;
    use verdist_types::ContentRef;

    fn name() -> FileName {
        FileName::new("app").unwrap()
    }

    fn ver() -> Version {
        Version::new("1.0.0").unwrap()
    }

    #[test]
    fn kinds() {
        let bad_name = FileName::new("").unwrap_err();
        assert_eq!(ServiceError::from(bad_name).kind(), ErrorKind::Validation);
        assert_eq!(ServiceError::TooLarge { limit: 1 }.kind(), ErrorKind::Validation);
        assert_eq!(
            ServiceError::FileNotFound { filename: name() }.kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            ServiceError::VersionNotFound { filename: name(), version: ver() }.kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            ServiceError::Conflict {
                filename: name(),
                version: ver(),
                existing: Checksum::compute(b"a"),
                proposed: Checksum::compute(b"b"),
            }
            .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            ServiceError::Timeout { operation: "index.get_latest", budget: Duration::from_secs(1) }
                .kind(),
            ErrorKind::Timeout
        );
    }

    #[test]
    fn dependency_errors_split_by_cause() {
        let io = ServiceError::Store(StoreError::Io(io::Error::other("disk gone")));
        assert_eq!(io.kind(), ErrorKind::Unavailable);

        let locator = ServiceError::Store(StoreError::InvalidLocator(ContentRef::new("../x")));
        assert_eq!(locator.kind(), ErrorKind::IntegrityFault);

        let corrupt = ServiceError::Index(IndexError::Corrupt {
            filename: "app".into(),
            reason: "dangling".into(),
        });
        assert_eq!(corrupt.kind(), ErrorKind::IntegrityFault);
    }

    #[test]
    fn only_transient_failures_are_retryable() {
        assert!(ServiceError::Timeout { operation: "x", budget: Duration::ZERO }.is_retryable());
        assert!(ServiceError::Index(IndexError::LockPoisoned).is_retryable());
        assert!(!ServiceError::FileNotFound { filename: name() }.is_retryable());
        assert!(!ServiceError::IntegrityFault {
            filename: name(),
            version: ver(),
            reason: "missing".into()
        }
        .is_retryable());
    }

    #[test]
    fn kind_labels() {
        assert_eq!(ErrorKind::NotFound.to_string(), "not_found");
        assert_eq!(ErrorKind::IntegrityFault.as_str(), "integrity_fault");
    }
}
