use std::io::{Read, Write};

use crate::error::Result;

/// A connected byte-stream socket. Implements `Read` and `Write`.
///
/// Every channel between a consumer and a provider owns one of these.
/// On Unix, this wraps a Unix domain socket stream.
pub struct IpcStream {
    inner: IpcStreamInner,
}

enum IpcStreamInner {
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl Read for IpcStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for IpcStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => stream.flush(),
        }
    }
}

impl IpcStream {
    /// Wrap an already connected Unix domain socket stream.
    #[cfg(unix)]
    pub fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: IpcStreamInner::Unix(stream),
        }
    }

    /// Create a connected pair of streams.
    ///
    /// This is the in-process form of socket handoff: one end is kept,
    /// the other is given to the peer.
    #[cfg(unix)]
    pub fn pair() -> Result<(Self, Self)> {
        let (left, right) = std::os::unix::net::UnixStream::pair()?;
        Ok((Self::from_unix(left), Self::from_unix(right)))
    }

    /// Set read timeout on the underlying stream.
    pub fn set_read_timeout(&self, timeout: Option<std::time::Duration>) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
        }
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<std::time::Duration>) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
        }
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => {
                let cloned = stream.try_clone()?;
                Ok(Self::from_unix(cloned))
            }
        }
    }

    /// Shut down both directions of the stream.
    ///
    /// Clones share the shutdown; a socket already disconnected by the
    /// peer is not an error.
    pub fn shutdown(&self) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => match stream.shutdown(std::net::Shutdown::Both) {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
                Err(err) => Err(err.into()),
            },
        }
    }

    /// Raw descriptor, for readiness polling.
    #[cfg(unix)]
    pub fn as_raw_fd(&self) -> std::os::fd::RawFd {
        use std::os::fd::AsRawFd;

        match &self.inner {
            IpcStreamInner::Unix(stream) => stream.as_raw_fd(),
        }
    }
}

impl std::fmt::Debug for IpcStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => {
                use std::os::fd::AsRawFd;
                f.debug_struct("IpcStream")
                    .field("type", &"unix")
                    .field("fd", &stream.as_raw_fd())
                    .finish()
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::io::{read_all, write_all};
    use crate::TransportError;

    #[test]
    fn pair_carries_bytes_both_ways() {
        let (mut left, mut right) = IpcStream::pair().unwrap();
        write_all(&mut left, b"ping").unwrap();
        let mut buf = [0u8; 4];
        read_all(&mut right, &mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        write_all(&mut right, b"pong").unwrap();
        read_all(&mut left, &mut buf).unwrap();
        assert_eq!(&buf, b"pong");
    }

    #[test]
    fn shutdown_makes_peer_see_eof() {
        let (left, mut right) = IpcStream::pair().unwrap();
        left.shutdown().unwrap();
        let mut buf = [0u8; 1];
        let err = read_all(&mut right, &mut buf).unwrap_err();
        assert!(matches!(err, TransportError::PeerClosed { .. }));
    }

    #[test]
    fn clone_shares_descriptor_target() {
        let (left, mut right) = IpcStream::pair().unwrap();
        let mut clone = left.try_clone().unwrap();
        assert_ne!(clone.as_raw_fd(), left.as_raw_fd());
        write_all(&mut clone, b"x").unwrap();
        let mut buf = [0u8; 1];
        read_all(&mut right, &mut buf).unwrap();
        assert_eq!(&buf, b"x");
    }
}
