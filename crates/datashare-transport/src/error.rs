use std::path::PathBuf;

/// Error taxonomy shared by every datashare layer.
///
/// Each crate-specific error maps onto one of these classes so callers can
/// branch on the kind of failure without matching on every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Malformed or missing field, type mismatch, unknown request id.
    InvalidParameter,
    /// Socket failure, EOF, framing failure, end of result set.
    Io,
    /// Allocation failure for buffers or strings.
    OutOfMemory,
    /// Argument or cell size over a fixed limit.
    MaxExceeded,
    /// Rejected by the privilege collaborator.
    PermissionDenied,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorClass::InvalidParameter => "invalid parameter",
            ErrorClass::Io => "i/o error",
            ErrorClass::OutOfMemory => "out of memory",
            ErrorClass::MaxExceeded => "max exceeded",
            ErrorClass::PermissionDenied => "permission denied",
        };
        f.write_str(name)
    }
}

/// Errors that can occur in socket transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the stream before the requested bytes arrived.
    #[error("peer closed the stream ({transferred} of {expected} bytes transferred)")]
    PeerClosed { transferred: usize, expected: usize },

    /// Transient failures persisted past the retry budget.
    #[error("retry budget exhausted after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        source: std::io::Error,
    },

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },
}

impl TransportError {
    /// Taxonomy class of this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            TransportError::Bind { source, .. } | TransportError::Connect { source, .. }
                if source.kind() == std::io::ErrorKind::PermissionDenied =>
            {
                ErrorClass::PermissionDenied
            }
            TransportError::Io(source) if source.kind() == std::io::ErrorKind::OutOfMemory => {
                ErrorClass::OutOfMemory
            }
            TransportError::PathTooLong { .. } => ErrorClass::InvalidParameter,
            _ => ErrorClass::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
