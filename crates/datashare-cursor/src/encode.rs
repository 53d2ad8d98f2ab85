//! Provider-side result-set encoder.
//!
//! Layout, all integers little-endian:
//! ```text
//! column_count        i32      (-1: query produced no rows, nothing follows)
//! column_types        i32 × column_count
//! column_names        ([len+1: i32][name bytes][NUL]) × column_count
//! total_name_bytes    i32      (sum of name lengths, NUL excluded)
//! row_count           i64      (rows in the page window)
//! rows                ([type: i32][size: i32][value bytes] × column_count) × row_count
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::cell::Value;
use crate::error::{CursorError, Result};
use crate::page::PageWindow;
use crate::source::RowSource;

/// Sentinel column count for a query that produced no rows.
pub const NO_DATA: i32 = -1;

/// Serialize the `window` page of `source`.
pub fn encode_result_set(source: &mut dyn RowSource, window: PageWindow) -> Result<Bytes> {
    window.validate()?;
    source.rewind()?;

    let mut dst = BytesMut::new();
    let Some(first) = source.next_row()? else {
        dst.put_i32_le(NO_DATA);
        debug!("result set has no rows");
        return Ok(dst.freeze());
    };

    let column_count = source.column_count();
    check_row_width(&first, column_count)?;
    dst.put_i32_le(to_i32(column_count)?);
    for value in &first {
        dst.put_i32_le(value.cell_type().code());
    }

    let mut total_name_bytes = 0usize;
    for index in 0..column_count {
        let name = source.column_name(index);
        dst.put_i32_le(to_i32(name.len() + 1)?);
        dst.put_slice(name.as_bytes());
        dst.put_u8(0);
        total_name_bytes += name.len();
    }
    dst.put_i32_le(to_i32(total_name_bytes)?);

    let mut ordinal = 1u64;
    let mut row_count = u64::from(window.contains(ordinal));
    while row_count < window.count_per_page as u64 {
        if source.next_row()?.is_none() {
            break;
        }
        ordinal += 1;
        if window.contains(ordinal) {
            row_count += 1;
        }
    }
    dst.put_i64_le(row_count as i64);

    source.rewind()?;
    let mut ordinal = 0u64;
    let mut written = 0u64;
    while written < row_count {
        let Some(row) = source.next_row()? else {
            return Err(CursorError::invalid(
                "row source ended early on second scan",
            ));
        };
        ordinal += 1;
        if !window.contains(ordinal) {
            continue;
        }
        check_row_width(&row, column_count)?;
        for value in &row {
            put_cell(&mut dst, value)?;
        }
        written += 1;
    }

    debug!(
        columns = column_count,
        rows = row_count,
        page = window.page_number,
        size = dst.len(),
        "encoded result set"
    );
    Ok(dst.freeze())
}

fn put_cell(dst: &mut BytesMut, value: &Value) -> Result<()> {
    dst.put_i32_le(value.cell_type().code());
    dst.put_i32_le(to_i32(value.wire_size())?);
    match value {
        Value::Integer(v) => dst.put_i64_le(*v),
        Value::Double(v) => dst.put_f64_le(*v),
        Value::Text(v) => {
            dst.put_slice(v.as_bytes());
            dst.put_u8(0);
        }
        Value::Blob(v) => dst.put_slice(v),
        Value::Null => {}
    }
    Ok(())
}

fn check_row_width(row: &[Value], column_count: usize) -> Result<()> {
    if row.len() != column_count {
        return Err(CursorError::invalid(format!(
            "row has {} values for {column_count} columns",
            row.len()
        )));
    }
    Ok(())
}

fn to_i32(size: usize) -> Result<i32> {
    i32::try_from(size).map_err(|_| CursorError::MaxExceeded {
        size,
        max: i32::MAX as usize,
    })
}
