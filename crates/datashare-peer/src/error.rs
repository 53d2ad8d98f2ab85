use std::time::Duration;

use datashare_transport::ErrorClass;

/// Errors that can occur in consumer and provider operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] datashare_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] datashare_frame::FrameError),

    /// Result-set or value-list codec error.
    #[error("codec error: {0}")]
    Cursor(#[from] datashare_cursor::CursorError),

    /// Bundle serialization/deserialization error.
    #[error("bundle error: {0}")]
    Bundle(#[from] serde_json::Error),

    /// Missing or malformed field, or an argument out of range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A request argument is larger than the fixed cap.
    #[error("argument size {size} exceeds limit {max}")]
    MaxExceeded { size: usize, max: usize },

    /// No pending request carries this id.
    #[error("unknown request id {0}")]
    UnknownRequest(i32),

    /// The peer process could not be launched.
    #[error("failed to launch provider {provider_id} after {attempts} attempts: {source}")]
    Launch {
        provider_id: String,
        attempts: u32,
        source: std::io::Error,
    },

    /// Readiness polling failed.
    #[error("poll failed: {0}")]
    Poll(std::io::Error),

    /// A response did not arrive in time.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

impl PeerError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        PeerError::InvalidParameter(message.into())
    }

    /// Taxonomy class of this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            PeerError::Transport(err) => err.class(),
            PeerError::Frame(err) => err.class(),
            PeerError::Cursor(err) => err.class(),
            PeerError::Bundle(_) | PeerError::InvalidParameter(_) | PeerError::UnknownRequest(_) => {
                ErrorClass::InvalidParameter
            }
            PeerError::MaxExceeded { .. } => ErrorClass::MaxExceeded,
            PeerError::Launch { source, .. }
                if source.kind() == std::io::ErrorKind::PermissionDenied =>
            {
                ErrorClass::PermissionDenied
            }
            PeerError::Launch { .. } | PeerError::Poll(_) | PeerError::Timeout(_) => ErrorClass::Io,
        }
    }

    /// True for failures that mean the channel itself is unusable.
    ///
    /// A frame rejected before any byte reached the socket leaves the
    /// channel intact.
    pub fn is_channel_failure(&self) -> bool {
        match self {
            PeerError::Transport(_) => true,
            PeerError::Frame(err) => err.is_stream_failure(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, PeerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_follow_taxonomy() {
        assert_eq!(
            PeerError::UnknownRequest(7).class(),
            ErrorClass::InvalidParameter
        );
        assert_eq!(
            PeerError::MaxExceeded { size: 2, max: 1 }.class(),
            ErrorClass::MaxExceeded
        );
        assert_eq!(
            PeerError::from(datashare_cursor::CursorError::EndOfResultSet).class(),
            ErrorClass::Io
        );
        let denied = PeerError::Launch {
            provider_id: "p".into(),
            attempts: 1,
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert_eq!(denied.class(), ErrorClass::PermissionDenied);
    }

    #[test]
    fn only_wire_errors_fail_the_channel() {
        let closed = PeerError::from(datashare_transport::TransportError::PeerClosed {
            transferred: 0,
            expected: 4,
        });
        assert!(closed.is_channel_failure());
        let broken = PeerError::from(datashare_frame::FrameError::from(std::io::Error::from(
            std::io::ErrorKind::BrokenPipe,
        )));
        assert!(broken.is_channel_failure());
        assert!(!PeerError::invalid("x").is_channel_failure());
    }

    #[test]
    fn oversize_frame_keeps_the_channel() {
        let oversize = PeerError::from(datashare_frame::FrameError::PayloadTooLarge {
            size: 300,
            max: 200,
        });
        assert!(!oversize.is_channel_failure());
        assert_eq!(oversize.class(), ErrorClass::MaxExceeded);
    }
}
