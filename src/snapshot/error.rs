use thiserror::Error;

#[derive(Debug, Error)]
/// Errors returned when writing or reading a snapshot file.
pub enum SnapshotError {
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File shorter than the footer.
    #[error("snapshot truncated ({len} bytes)")]
    Truncated { len: usize },

    #[error("snapshot magic mismatch")]
    BadMagic,

    #[error("snapshot checksum mismatch")]
    ChecksumMismatch,

    /// Payload failed `rkyv` validation or encoding.
    #[error("snapshot codec error: {reason}")]
    Codec { reason: String },
}

pub type SnapshotResult<T> = Result<T, SnapshotError>;
