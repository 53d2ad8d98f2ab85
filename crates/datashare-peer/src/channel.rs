//! Watched sockets and the peer map.

use std::collections::HashMap;

use bytes::Bytes;
use datashare_frame::{MessageConfig, MessageReader, MessageWriter};
use datashare_transport::IpcStream;
use tracing::{debug, warn};

use crate::error::Result;
use crate::readiness::{Readiness, Token};

/// One connected socket registered for readiness.
pub struct Channel {
    peer_key: String,
    reader: MessageReader<IpcStream>,
    writer: MessageWriter<IpcStream>,
    token: Token,
}

impl Channel {
    /// Wrap `stream` and start watching it.
    pub fn open(
        peer_key: impl Into<String>,
        stream: IpcStream,
        config: &MessageConfig,
        readiness: &mut Readiness,
    ) -> Result<Self> {
        let reader_stream = stream.try_clone()?;
        let reader = MessageReader::with_config_ipc(reader_stream, config.clone())?;
        let writer = MessageWriter::with_config_ipc(stream, config.clone())?;
        let token = readiness.add(reader.get_ref().as_raw_fd());
        let peer_key = peer_key.into();
        debug!(peer = %peer_key, token = token.0, "channel opened");
        Ok(Self {
            peer_key,
            reader,
            writer,
            token,
        })
    }

    pub fn peer_key(&self) -> &str {
        &self.peer_key
    }

    pub(crate) fn set_peer_key(&mut self, peer_key: impl Into<String>) {
        self.peer_key = peer_key.into();
    }

    /// Readiness watch of this channel.
    pub fn token(&self) -> Token {
        self.token
    }

    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        Ok(self.writer.send_message(payload)?)
    }

    pub fn recv(&mut self) -> Result<Bytes> {
        Ok(self.reader.recv_message()?)
    }

    /// Shut the socket down and stop watching it.
    pub fn close(self, readiness: &mut Readiness) {
        readiness.remove(self.token);
        if let Err(err) = self.writer.get_ref().shutdown() {
            warn!(peer = %self.peer_key, error = %err, "socket shutdown failed");
        }
        debug!(peer = %self.peer_key, "channel closed");
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("peer_key", &self.peer_key)
            .field("token", &self.token)
            .field("stream", self.writer.get_ref())
            .finish()
    }
}

/// At most one channel per peer key.
#[derive(Debug, Default)]
pub struct ChannelMap {
    channels: HashMap<String, Channel>,
    keys: HashMap<Token, String>,
}

impl ChannelMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, peer_key: &str) -> bool {
        self.channels.contains_key(peer_key)
    }

    pub fn get_mut(&mut self, peer_key: &str) -> Option<&mut Channel> {
        self.channels.get_mut(peer_key)
    }

    /// Insert `channel`, returning the channel it displaced.
    pub fn insert(&mut self, channel: Channel) -> Option<Channel> {
        let key = channel.peer_key().to_string();
        self.keys.insert(channel.token(), key.clone());
        let displaced = self.channels.insert(key, channel);
        if let Some(old) = &displaced {
            self.keys.remove(&old.token());
        }
        displaced
    }

    pub fn remove(&mut self, peer_key: &str) -> Option<Channel> {
        let channel = self.channels.remove(peer_key)?;
        self.keys.remove(&channel.token());
        Some(channel)
    }

    /// Key of the channel watched by `token`.
    pub fn key_for(&self, token: Token) -> Option<&str> {
        self.keys.get(&token).map(String::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
