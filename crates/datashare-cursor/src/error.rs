use datashare_transport::{ErrorClass, TransportError};

/// Errors raised by the result-set and value-list codecs and the cursor.
#[derive(Debug, thiserror::Error)]
pub enum CursorError {
    /// Bad argument, malformed layout, or a typed read against the wrong cell type.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The cursor cannot move past the last row.
    #[error("end of result set")]
    EndOfResultSet,

    /// A size exceeded its limit, or a caller buffer is smaller than the cell.
    #[error("size {size} exceeds limit {max}")]
    MaxExceeded { size: usize, max: usize },

    /// Allocating a buffer for a cell or offsets failed.
    #[error("out of memory allocating {0} bytes")]
    OutOfMemory(usize),

    /// Reading from the source stream failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Backing store I/O failed.
    #[error("backing store I/O error: {0}")]
    Store(#[from] std::io::Error),
}

impl CursorError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        CursorError::InvalidParameter(message.into())
    }

    /// Taxonomy class of this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            CursorError::InvalidParameter(_) => ErrorClass::InvalidParameter,
            CursorError::EndOfResultSet => ErrorClass::Io,
            CursorError::MaxExceeded { .. } => ErrorClass::MaxExceeded,
            CursorError::OutOfMemory(_) => ErrorClass::OutOfMemory,
            CursorError::Transport(err) => err.class(),
            CursorError::Store(_) => ErrorClass::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, CursorError>;

/// Allocate a zeroed buffer, reporting allocation failure instead of aborting.
pub(crate) fn alloc_buffer(size: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(size)
        .map_err(|_| CursorError::OutOfMemory(size))?;
    buf.resize(size, 0);
    Ok(buf)
}
