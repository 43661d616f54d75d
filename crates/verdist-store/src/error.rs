use verdist_types::ContentRef;

/// Errors from content store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The locator was not issued by this store or is malformed.
    #[error("invalid content locator: {0}")]
    InvalidLocator(ContentRef),

    /// A writer was used after it was committed or aborted.
    #[error("content writer already finished")]
    WriterFinished,

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Lock poisoned by a panicking thread.
    #[error("store lock poisoned")]
    LockPoisoned,
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
