use std::io::Read;

use bytes::{Bytes, BytesMut};
use datashare_transport::{read_all, IpcStream};
use tracing::trace;

use crate::codec::{parse_header, MessageConfig, HEADER_SIZE};
use crate::error::Result;

/// Reads complete message envelopes from any `Read` stream.
///
/// Callers never see a partial payload: the length prefix is read first,
/// then exactly that many bytes.
pub struct MessageReader<T> {
    inner: T,
    config: MessageConfig,
}

impl<T: Read> MessageReader<T> {
    /// Create a new message reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, MessageConfig::default())
    }

    /// Create a new message reader with explicit configuration.
    pub fn with_config(inner: T, config: MessageConfig) -> Self {
        Self { inner, config }
    }

    /// Read the next complete message payload (blocking).
    pub fn recv_message(&mut self) -> Result<Bytes> {
        let mut header = [0u8; HEADER_SIZE];
        read_all(&mut self.inner, &mut header)?;
        let len = parse_header(header, self.config.max_payload_size)?;

        let mut payload = BytesMut::zeroed(len);
        read_all(&mut self.inner, &mut payload)?;
        trace!(size = len, "received message");
        Ok(payload.freeze())
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current reader configuration.
    pub fn config(&self) -> &MessageConfig {
        &self.config
    }
}

impl MessageReader<IpcStream> {
    /// Create a reader for `IpcStream` and apply the read timeout from config.
    pub fn with_config_ipc(inner: IpcStream, config: MessageConfig) -> Result<Self> {
        inner.set_read_timeout(config.read_timeout)?;
        Ok(Self::with_config(inner, config))
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, ErrorKind};

    use bytes::BufMut;
    use datashare_transport::TransportError;

    use super::*;
    use crate::codec::encode_message;
    use crate::error::FrameError;
    use crate::writer::MessageWriter;

    fn wire(payloads: &[&[u8]]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for payload in payloads {
            encode_message(payload, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    #[test]
    fn reads_messages_in_order() {
        let mut reader = MessageReader::new(Cursor::new(wire(&[b"one", b"", b"three"])));

        assert_eq!(reader.recv_message().unwrap().as_ref(), b"one");
        assert!(reader.recv_message().unwrap().is_empty());
        assert_eq!(reader.recv_message().unwrap().as_ref(), b"three");
    }

    #[test]
    fn byte_at_a_time_stream_still_yields_whole_message() {
        let reader = OneByte {
            bytes: wire(&[b"slow"]),
            pos: 0,
        };
        let mut reader = MessageReader::new(reader);
        assert_eq!(reader.recv_message().unwrap().as_ref(), b"slow");
    }

    #[test]
    fn eof_before_header_is_closed() {
        let mut reader = MessageReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.recv_message().unwrap_err();
        assert!(err.is_closed());
    }

    #[test]
    fn eof_mid_payload_is_closed() {
        let mut partial = BytesMut::new();
        partial.put_i32_le(16);
        partial.put_slice(b"only-part");

        let mut reader = MessageReader::new(Cursor::new(partial.to_vec()));
        let err = reader.recv_message().unwrap_err();
        assert!(matches!(
            err,
            FrameError::Transport(TransportError::PeerClosed {
                transferred: 9,
                expected: 16
            })
        ));
    }

    #[test]
    fn oversized_message_is_rejected_before_allocation() {
        let mut header = BytesMut::new();
        header.put_i32_le(1024);

        let cfg = MessageConfig {
            max_payload_size: 16,
            ..MessageConfig::default()
        };
        let mut reader = MessageReader::with_config(Cursor::new(header.to_vec()), cfg);
        let err = reader.recv_message().unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
    }

    #[test]
    fn interrupted_read_retries() {
        let reader = InterruptedOnce {
            interrupted: false,
            inner: Cursor::new(wire(&[b"ok"])),
        };
        let mut reader = MessageReader::new(reader);
        assert_eq!(reader.recv_message().unwrap().as_ref(), b"ok");
    }

    #[test]
    fn roundtrip_over_socket_pair() {
        let (left, right) = IpcStream::pair().unwrap();
        let mut writer = MessageWriter::new(left);
        let mut reader = MessageReader::with_config_ipc(right, MessageConfig::default()).unwrap();

        writer.send_message(b"ping").unwrap();
        writer.send_message(&[0xAB; 64 * 1024]).unwrap();

        assert_eq!(reader.recv_message().unwrap().as_ref(), b"ping");
        assert_eq!(reader.recv_message().unwrap().len(), 64 * 1024);
    }

    #[test]
    fn concurrent_writer_thread() {
        let (left, right) = IpcStream::pair().unwrap();
        let mut reader = MessageReader::new(right);

        let writer = std::thread::spawn(move || {
            let mut writer = MessageWriter::new(left);
            for i in 0..32 {
                writer.send_message(format!("msg-{i}").as_bytes()).unwrap();
            }
        });

        for i in 0..32 {
            let msg = reader.recv_message().unwrap();
            assert_eq!(msg.as_ref(), format!("msg-{i}").as_bytes());
        }
        writer.join().unwrap();
    }

    struct OneByte {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for OneByte {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct InterruptedOnce {
        interrupted: bool,
        inner: Cursor<Vec<u8>>,
    }

    impl Read for InterruptedOnce {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.inner.read(buf)
        }
    }
}
