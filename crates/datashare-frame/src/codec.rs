use bytes::{BufMut, BytesMut};

use crate::error::{FrameError, Result};

/// Envelope header: a 4-byte little-endian payload length.
pub const HEADER_SIZE: usize = 4;

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Encode a message envelope into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────────────┐
/// │ Length (4B)  │ Payload          │
/// │ i32 LE       │ (Length bytes)   │
/// └──────────────┴──────────────────┘
/// ```
pub fn encode_message(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > i32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: i32::MAX as usize,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_i32_le(payload.len() as i32);
    dst.put_slice(payload);
    Ok(())
}

/// Validate an envelope header and return the payload length it announces.
pub fn parse_header(header: [u8; HEADER_SIZE], max_payload: usize) -> Result<usize> {
    let len = i32::from_le_bytes(header);
    if len < 0 {
        return Err(FrameError::NegativeLength(len));
    }
    let len = len as usize;
    if len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: len,
            max: max_payload,
        });
    }
    Ok(len)
}

/// Configuration for message framing.
#[derive(Debug, Clone)]
pub struct MessageConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_length_matches_payload() {
        let mut buf = BytesMut::new();
        encode_message(b"hello", &mut buf).unwrap();

        assert_eq!(buf.len(), HEADER_SIZE + 5);
        assert_eq!(&buf[..HEADER_SIZE], &5i32.to_le_bytes());
        assert_eq!(&buf[HEADER_SIZE..], b"hello");
    }

    #[test]
    fn empty_payload_has_zero_length() {
        let mut buf = BytesMut::new();
        encode_message(b"", &mut buf).unwrap();
        assert_eq!(buf.as_ref(), &[0, 0, 0, 0]);
    }

    #[test]
    fn parse_header_rejects_negative_length() {
        let err = parse_header((-1i32).to_le_bytes(), DEFAULT_MAX_PAYLOAD).unwrap_err();
        assert!(matches!(err, FrameError::NegativeLength(-1)));
    }

    #[test]
    fn parse_header_caps_length() {
        let err = parse_header(1024i32.to_le_bytes(), 16).unwrap_err();
        assert!(matches!(
            err,
            FrameError::PayloadTooLarge {
                size: 1024,
                max: 16
            }
        ));
        assert_eq!(err.class(), datashare_transport::ErrorClass::MaxExceeded);
    }
}
