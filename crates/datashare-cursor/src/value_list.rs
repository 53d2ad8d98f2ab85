//! Paged string list carried by map "get" responses.
//!
//! Layout: `[count: i32]` then `count` repetitions of `[len: i32][bytes]`.
//! Strings carry no terminator.

use std::io::Read;

use bytes::{BufMut, Bytes, BytesMut};
use datashare_transport::read_all;
use tracing::debug;

use crate::error::{alloc_buffer, CursorError, Result};
use crate::page::PageWindow;

/// Largest accepted single value when decoding.
pub const MAX_VALUE_SIZE: usize = 16 * 1024 * 1024;

/// Serialize the `window` page of `values`.
pub fn encode_value_list<S: AsRef<str>>(values: &[S], window: PageWindow) -> Result<Bytes> {
    window.validate()?;
    let offset = usize::try_from(window.offset()).unwrap_or(usize::MAX);
    let n = window.len_of(values.len() as u64) as usize;
    let page = values.get(offset..offset + n).unwrap_or(&[]);

    let mut dst = BytesMut::new();
    dst.put_i32_le(n as i32);
    for value in page {
        let bytes = value.as_ref().as_bytes();
        let len = i32::try_from(bytes.len()).map_err(|_| CursorError::MaxExceeded {
            size: bytes.len(),
            max: i32::MAX as usize,
        })?;
        dst.put_i32_le(len);
        dst.put_slice(bytes);
    }
    debug!(total = values.len(), count = n, page = window.page_number, "encoded value list");
    Ok(dst.freeze())
}

/// Decode a value list. Nothing read so far is returned on failure.
pub fn decode_value_list<R: Read + ?Sized>(src: &mut R) -> Result<Vec<String>> {
    let count = read_i32(src)?;
    if count < 0 {
        return Err(CursorError::invalid(format!("negative value count {count}")));
    }
    let count = count as usize;

    let mut values = Vec::new();
    values
        .try_reserve_exact(count.min(1 << 16))
        .map_err(|_| CursorError::OutOfMemory(count))?;
    for _ in 0..count {
        let len = read_i32(src)?;
        if len < 0 {
            return Err(CursorError::invalid(format!("negative value length {len}")));
        }
        let len = len as usize;
        if len > MAX_VALUE_SIZE {
            return Err(CursorError::MaxExceeded {
                size: len,
                max: MAX_VALUE_SIZE,
            });
        }
        let mut buf = alloc_buffer(len)?;
        read_all(src, &mut buf)?;
        let value = String::from_utf8(buf)
            .map_err(|_| CursorError::invalid("value is not valid UTF-8"))?;
        values.push(value);
    }
    Ok(values)
}

fn read_i32<R: Read + ?Sized>(src: &mut R) -> Result<i32> {
    let mut buf = [0u8; 4];
    read_all(src, &mut buf)?;
    Ok(i32::from_le_bytes(buf))
}
