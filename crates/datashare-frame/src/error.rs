use datashare_transport::{ErrorClass, TransportError};

/// Errors that can occur while framing messages.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A length prefix was negative.
    #[error("negative length prefix ({0})")]
    NegativeLength(i32),

    /// A block claimed more bytes than the enclosing payload holds.
    #[error("truncated block (needed {needed} bytes, {available} available)")]
    Truncated { needed: usize, available: usize },

    /// Failure in the underlying socket I/O.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl FrameError {
    /// Taxonomy class of this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            FrameError::PayloadTooLarge { .. } => ErrorClass::MaxExceeded,
            FrameError::NegativeLength(_) | FrameError::Truncated { .. } => {
                ErrorClass::InvalidParameter
            }
            FrameError::Transport(err) => err.class(),
        }
    }

    /// True when the peer closed the stream.
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            FrameError::Transport(TransportError::PeerClosed { .. })
        )
    }

    /// True when the socket itself failed, as opposed to a message being
    /// refused before any byte was written.
    pub fn is_stream_failure(&self) -> bool {
        matches!(self, FrameError::Transport(_))
    }
}

impl From<std::io::Error> for FrameError {
    fn from(err: std::io::Error) -> Self {
        FrameError::Transport(TransportError::Io(err))
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
