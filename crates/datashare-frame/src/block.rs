//! Block layout inside a message payload.
//!
//! A block is `[len: i32 LE][len bytes]`. Request payloads carry a bundle
//! block, optionally followed by an extra-data block; bulk payloads carry
//! `[count: i32 LE]` followed by `count` blocks. Response payloads carry a
//! bundle block followed by an operation-specific body.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Append one length-prefixed block.
pub fn put_block(dst: &mut BytesMut, block: &[u8]) -> Result<()> {
    if block.len() > i32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: block.len(),
            max: i32::MAX as usize,
        });
    }
    dst.reserve(4 + block.len());
    dst.put_i32_le(block.len() as i32);
    dst.put_slice(block);
    Ok(())
}

/// Read a little-endian `i32` from the front of `src`.
pub fn get_i32(src: &mut Bytes) -> Result<i32> {
    if src.remaining() < 4 {
        return Err(FrameError::Truncated {
            needed: 4,
            available: src.remaining(),
        });
    }
    Ok(src.get_i32_le())
}

/// Split one length-prefixed block off the front of `src`.
pub fn get_block(src: &mut Bytes) -> Result<Bytes> {
    let len = get_i32(src)?;
    if len < 0 {
        return Err(FrameError::NegativeLength(len));
    }
    let len = len as usize;
    if src.remaining() < len {
        return Err(FrameError::Truncated {
            needed: len,
            available: src.remaining(),
        });
    }
    Ok(src.split_to(len))
}

/// Bundle block plus optional extra-data block of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestBlocks {
    pub bundle: Bytes,
    pub extra: Option<Bytes>,
}

impl RequestBlocks {
    pub fn new(bundle: impl Into<Bytes>) -> Self {
        Self {
            bundle: bundle.into(),
            extra: None,
        }
    }

    pub fn with_extra(mut self, extra: impl Into<Bytes>) -> Self {
        self.extra = Some(extra.into());
        self
    }

    /// Encode as `[len][bundle]` and, if present, `[len][extra]`.
    pub fn encode(&self) -> Result<Bytes> {
        let extra_len = self.extra.as_ref().map_or(0, |extra| 4 + extra.len());
        let mut dst = BytesMut::with_capacity(4 + self.bundle.len() + extra_len);
        put_block(&mut dst, &self.bundle)?;
        if let Some(extra) = &self.extra {
            put_block(&mut dst, extra)?;
        }
        Ok(dst.freeze())
    }

    /// Decode a request payload; bytes after the bundle form the extra block.
    pub fn decode(mut payload: Bytes) -> Result<Self> {
        let bundle = get_block(&mut payload)?;
        let extra = if payload.has_remaining() {
            Some(get_block(&mut payload)?)
        } else {
            None
        };
        Ok(Self { bundle, extra })
    }
}

/// Encode `[count][len][bytes]...` for a bulk payload.
///
/// Reserved for bulk operations; none of the current request kinds sends one.
pub fn encode_bulk<I, B>(items: I) -> Result<Bytes>
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let mut body = BytesMut::new();
    let mut count = 0i32;
    for item in items {
        put_block(&mut body, item.as_ref())?;
        count = count.checked_add(1).ok_or(FrameError::PayloadTooLarge {
            size: count as usize + 1,
            max: i32::MAX as usize,
        })?;
    }

    let mut dst = BytesMut::with_capacity(4 + body.len());
    dst.put_i32_le(count);
    dst.put_slice(&body);
    Ok(dst.freeze())
}

/// Decode a bulk payload written by [`encode_bulk`].
pub fn decode_bulk(src: &mut Bytes) -> Result<Vec<Bytes>> {
    let count = get_i32(src)?;
    if count < 0 {
        return Err(FrameError::NegativeLength(count));
    }
    // Each block needs at least its 4-byte prefix.
    let plausible = (count as usize).min(src.remaining() / 4);
    let mut items = Vec::with_capacity(plausible);
    for _ in 0..count {
        items.push(get_block(src)?);
    }
    Ok(items)
}
