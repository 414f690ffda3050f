use thiserror::Error;

/// Main error type for rtsearch operations
#[derive(Error, Debug)]
pub enum RtSearchError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Segment I/O error: {0}")]
    SegmentIo(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Concurrent state violation: {0}")]
    ConcurrentState(String),

    #[error("Index is shut down")]
    ShutDown,

    #[error("Compaction failed: {0}")]
    Compaction(String),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for rtsearch operations
pub type Result<T> = std::result::Result<T, RtSearchError>;

impl RtSearchError {
    /// Check if this error indicates a transient failure that could be retried
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            RtSearchError::SegmentIo(_) | RtSearchError::Compaction(_)
        )
    }

    /// Internal invariant violations poison the engine instance
    pub fn is_fatal(&self) -> bool {
        matches!(self, RtSearchError::ConcurrentState(_))
    }
}
