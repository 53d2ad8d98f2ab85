use std::fmt;
use std::io;

use datashare::memory::DatasetError;
use datashare_frame::FrameError;
use datashare_peer::PeerError;
use datashare_transport::{ErrorClass, TransportError};

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Transport(err) => transport_error(context, err),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn peer_error(context: &str, err: PeerError) -> CliError {
    match err {
        PeerError::Transport(err) => transport_error(context, err),
        PeerError::Frame(err) => frame_error(context, err),
        PeerError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        PeerError::Launch { .. } => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
        other => {
            let code = match other.class() {
                ErrorClass::InvalidParameter => USAGE,
                ErrorClass::MaxExceeded => DATA_INVALID,
                ErrorClass::PermissionDenied => PERMISSION_DENIED,
                ErrorClass::Io | ErrorClass::OutOfMemory => INTERNAL,
            };
            CliError::new(code, format!("{context}: {other}"))
        }
    }
}

pub fn dataset_error(context: &str, err: DatasetError) -> CliError {
    match err {
        DatasetError::Read { source, .. } => io_error(context, source),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn peer_errors_map_to_exit_codes() {
        assert_eq!(
            peer_error("x", PeerError::Timeout(Duration::from_secs(1))).code,
            TIMEOUT
        );
        assert_eq!(
            peer_error("x", PeerError::InvalidParameter("bad".into())).code,
            USAGE
        );
        assert_eq!(
            peer_error("x", PeerError::MaxExceeded { size: 2, max: 1 }).code,
            DATA_INVALID
        );
        let launch = PeerError::Launch {
            provider_id: "p".into(),
            attempts: 1,
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert_eq!(peer_error("x", launch).code, TRANSPORT_ERROR);
    }
}
