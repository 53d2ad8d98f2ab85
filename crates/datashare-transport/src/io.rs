//! Exact-length reads and writes with a bounded retry budget.
//!
//! Both helpers either transfer the full buffer or fail. Interrupted calls
//! are retried, and reads additionally retry `WouldBlock` after a short
//! sleep. Every transient failure consumes one attempt from
//! [`RETRY_BUDGET`]; progress does not.

use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use tracing::trace;

use crate::error::{Result, TransportError};

/// Transient failures tolerated per call.
pub const RETRY_BUDGET: u32 = 10;

/// Pause before retrying a read that would block.
pub const WOULD_BLOCK_BACKOFF: Duration = Duration::from_millis(10);

/// Write all of `buf`, returning the number of bytes written.
pub fn write_all<W: Write + ?Sized>(writer: &mut W, buf: &[u8]) -> Result<usize> {
    let mut offset = 0usize;
    let mut attempts = 0u32;

    while offset < buf.len() {
        match writer.write(&buf[offset..]) {
            Ok(0) => {
                return Err(TransportError::PeerClosed {
                    transferred: offset,
                    expected: buf.len(),
                })
            }
            Ok(n) => offset += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => {
                attempts += 1;
                if attempts >= RETRY_BUDGET {
                    return Err(TransportError::RetriesExhausted {
                        attempts,
                        source: err,
                    });
                }
                trace!(attempts, "write interrupted, retrying");
            }
            Err(err) => return Err(TransportError::Io(err)),
        }
    }

    Ok(offset)
}

/// Fill all of `buf`, returning the number of bytes read.
///
/// A zero-byte read before `buf` is full means the peer closed the stream.
pub fn read_all<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut offset = 0usize;
    let mut attempts = 0u32;

    while offset < buf.len() {
        match reader.read(&mut buf[offset..]) {
            Ok(0) => {
                return Err(TransportError::PeerClosed {
                    transferred: offset,
                    expected: buf.len(),
                })
            }
            Ok(n) => offset += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => {
                attempts += 1;
                if attempts >= RETRY_BUDGET {
                    return Err(TransportError::RetriesExhausted {
                        attempts,
                        source: err,
                    });
                }
                trace!(attempts, "read interrupted, retrying");
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                attempts += 1;
                if attempts >= RETRY_BUDGET {
                    return Err(TransportError::RetriesExhausted {
                        attempts,
                        source: err,
                    });
                }
                trace!(attempts, "read would block, retrying");
                std::thread::sleep(WOULD_BLOCK_BACKOFF);
            }
            Err(err) => return Err(TransportError::Io(err)),
        }
    }

    Ok(offset)
}

/// Read a little-endian `i32`.
pub fn read_i32<R: Read + ?Sized>(reader: &mut R) -> Result<i32> {
    let mut buf = [0u8; 4];
    read_all(reader, &mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

/// Read a little-endian `i64`.
pub fn read_i64<R: Read + ?Sized>(reader: &mut R) -> Result<i64> {
    let mut buf = [0u8; 8];
    read_all(reader, &mut buf)?;
    Ok(i64::from_le_bytes(buf))
}
