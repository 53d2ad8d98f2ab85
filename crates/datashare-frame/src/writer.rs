use std::io::Write;

use bytes::BytesMut;
use datashare_transport::{write_all, IpcStream};
use tracing::trace;

use crate::codec::{encode_message, MessageConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete message envelopes to any `Write` stream.
pub struct MessageWriter<T> {
    inner: T,
    buf: BytesMut,
    config: MessageConfig,
}

impl<T: Write> MessageWriter<T> {
    /// Create a new message writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, MessageConfig::default())
    }

    /// Create a new message writer with explicit configuration.
    pub fn with_config(inner: T, config: MessageConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Frame `payload` and write it in full (blocking).
    pub fn send_message(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.config.max_payload_size,
            });
        }

        self.buf.clear();
        encode_message(payload, &mut self.buf)?;
        write_all(&mut self.inner, &self.buf)?;
        self.inner.flush()?;
        trace!(size = payload.len(), "sent message");
        Ok(())
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current writer configuration.
    pub fn config(&self) -> &MessageConfig {
        &self.config
    }
}

impl MessageWriter<IpcStream> {
    /// Create a writer for `IpcStream` and apply the write timeout from config.
    pub fn with_config_ipc(inner: IpcStream, config: MessageConfig) -> Result<Self> {
        inner.set_write_timeout(config.write_timeout)?;
        Ok(Self::with_config(inner, config))
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, ErrorKind};

    use datashare_transport::TransportError;

    use super::*;
    use crate::codec::HEADER_SIZE;
    use crate::reader::MessageReader;

    #[test]
    fn writes_length_prefixed_payload() {
        let mut writer = MessageWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.send_message(b"hello").unwrap();

        let wire = writer.into_inner().into_inner();
        assert_eq!(wire.len(), HEADER_SIZE + 5);
        assert_eq!(&wire[..HEADER_SIZE], &5i32.to_le_bytes());
    }

    #[test]
    fn written_messages_read_back() {
        let mut writer = MessageWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.send_message(b"a").unwrap();
        writer.send_message(b"bc").unwrap();

        let wire = writer.into_inner().into_inner();
        let mut reader = MessageReader::new(Cursor::new(wire));
        assert_eq!(reader.recv_message().unwrap().as_ref(), b"a");
        assert_eq!(reader.recv_message().unwrap().as_ref(), b"bc");
    }

    #[test]
    fn payload_too_large_rejected() {
        let cfg = MessageConfig {
            max_payload_size: 4,
            ..MessageConfig::default()
        };
        let mut writer = MessageWriter::with_config(Cursor::new(Vec::<u8>::new()), cfg);
        let err = writer.send_message(b"oversized").unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
        assert!(!err.is_stream_failure());
        assert!(writer.get_ref().get_ref().is_empty());
    }

    #[test]
    fn short_writes_are_completed() {
        let mut writer = MessageWriter::new(TwoBytesAtATime { data: Vec::new() });
        writer.send_message(b"partial").unwrap();
        assert_eq!(writer.into_inner().data.len(), HEADER_SIZE + 7);
    }

    #[test]
    fn zero_write_is_peer_closed() {
        let mut writer = MessageWriter::new(ZeroWriter);
        let err = writer.send_message(b"x").unwrap_err();
        assert!(err.is_closed());
        assert!(err.is_stream_failure());
    }

    #[test]
    fn write_to_closed_socket_fails() {
        let (left, right) = IpcStream::pair().unwrap();
        drop(right);
        let mut writer = MessageWriter::new(left);
        let err = writer.send_message(b"lost").unwrap_err();
        assert!(matches!(
            err,
            FrameError::Transport(TransportError::Io(e)) if e.kind() == ErrorKind::BrokenPipe
        ));
    }

    #[test]
    fn applies_write_timeout_for_ipc_stream() {
        let (left, _right) = IpcStream::pair().unwrap();
        let cfg = MessageConfig {
            write_timeout: Some(std::time::Duration::from_millis(10)),
            ..MessageConfig::default()
        };
        assert!(MessageWriter::with_config_ipc(left, cfg).is_ok());
    }

    struct TwoBytesAtATime {
        data: Vec<u8>,
    }

    impl Write for TwoBytesAtATime {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let n = buf.len().min(2);
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
