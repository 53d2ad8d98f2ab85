//! Consumer-side result-set decoder and random-access cursor.
//!
//! Decoding streams the layout written by
//! [`encode_result_set`](crate::encode::encode_result_set) out of any
//! `Read` source while mirroring every byte into a [`BackingStore`], and
//! records where each row starts. Navigation and cell reads afterwards
//! only touch the store.

use std::io::{Read, Seek, SeekFrom, Write};

use datashare_transport::read_all;
use tracing::debug;

use crate::cell::{CellType, Value};
use crate::encode::NO_DATA;
use crate::error::{alloc_buffer, CursorError, Result};
use crate::store::{BackingStore, StoreKind};

/// Default cap on a single cell or column name.
pub const DEFAULT_MAX_CELL_SIZE: usize = 16 * 1024 * 1024;

/// Default cap on the number of columns.
pub const DEFAULT_MAX_COLUMNS: usize = 4096;

const COPY_CHUNK: usize = 8 * 1024;

/// Options applied while decoding a result set.
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    /// Where the decoded bytes are persisted.
    pub store: StoreKind,
    /// Largest accepted cell or column name, in bytes.
    pub max_cell_size: usize,
    /// Largest accepted column count.
    pub max_columns: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            store: StoreKind::Memory,
            max_cell_size: DEFAULT_MAX_CELL_SIZE,
            max_columns: DEFAULT_MAX_COLUMNS,
        }
    }
}

/// Where the cursor currently points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    BeforeFirst,
    OnRow(usize),
    Exhausted,
}

/// Seekable navigator over a decoded result set.
#[derive(Debug)]
pub struct ResultCursor {
    store: BackingStore,
    row_offsets: Vec<u64>,
    column_count: usize,
    col_type_offset: u64,
    col_name_offset: u64,
    current_offset: u64,
    position: Position,
    no_data: bool,
}

/// Copies exact-length fields from the source into the store.
struct Mirror<'a, R: Read + ?Sized> {
    src: &'a mut R,
    store: &'a mut BackingStore,
    offset: u64,
}

impl<R: Read + ?Sized> Mirror<'_, R> {
    fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        read_all(&mut *self.src, buf)?;
        self.store.write_all(buf)?;
        self.offset += buf.len() as u64;
        Ok(())
    }

    fn i32(&mut self) -> Result<i32> {
        let mut buf = [0u8; 4];
        self.fill(&mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }

    fn i64(&mut self) -> Result<i64> {
        let mut buf = [0u8; 8];
        self.fill(&mut buf)?;
        Ok(i64::from_le_bytes(buf))
    }

    fn copy(&mut self, mut remaining: usize) -> Result<()> {
        let mut chunk = [0u8; COPY_CHUNK];
        while remaining > 0 {
            let n = remaining.min(COPY_CHUNK);
            self.fill(&mut chunk[..n])?;
            remaining -= n;
        }
        Ok(())
    }

    fn size(&mut self, max: usize) -> Result<usize> {
        let size = self.i32()?;
        if size < 0 {
            return Err(CursorError::invalid(format!("negative size {size}")));
        }
        let size = size as usize;
        if size > max {
            return Err(CursorError::MaxExceeded { size, max });
        }
        Ok(size)
    }
}

/// Decode a result set from `src` into a cursor.
pub fn decode_result_set<R: Read + ?Sized>(
    src: &mut R,
    options: &DecodeOptions,
) -> Result<ResultCursor> {
    let mut store = options.store.open()?;
    let mut mirror = Mirror {
        src,
        store: &mut store,
        offset: 0,
    };

    let column_count = mirror.i32()?;
    if column_count == NO_DATA {
        debug!("decoded empty result set");
        return Ok(ResultCursor::empty(store));
    }
    if column_count < 0 {
        return Err(CursorError::invalid(format!(
            "negative column count {column_count}"
        )));
    }
    let column_count = column_count as usize;
    if column_count > options.max_columns {
        return Err(CursorError::MaxExceeded {
            size: column_count,
            max: options.max_columns,
        });
    }

    let col_type_offset = mirror.offset;
    for _ in 0..column_count {
        CellType::from_code(mirror.i32()?)?;
    }

    let col_name_offset = mirror.offset;
    for _ in 0..column_count {
        let len = mirror.size(options.max_cell_size)?;
        mirror.copy(len)?;
    }
    let _total_name_bytes = mirror.i32()?;

    let row_count = mirror.i64()?;
    if row_count < 0 {
        return Err(CursorError::invalid(format!("negative row count {row_count}")));
    }
    let row_count = usize::try_from(row_count).map_err(|_| CursorError::MaxExceeded {
        size: usize::MAX,
        max: usize::MAX,
    })?;

    let mut row_offsets = Vec::new();
    row_offsets
        .try_reserve_exact(row_count.min(1 << 16))
        .map_err(|_| CursorError::OutOfMemory(row_count.saturating_mul(8)))?;

    for _ in 0..row_count {
        row_offsets
            .try_reserve(1)
            .map_err(|_| CursorError::OutOfMemory(row_count.saturating_mul(8)))?;
        row_offsets.push(mirror.offset);
        for _ in 0..column_count {
            let cell_type = CellType::from_code(mirror.i32()?)?;
            let size = mirror.size(options.max_cell_size)?;
            cell_type.check_size(size)?;
            mirror.copy(size)?;
        }
    }
    let total = mirror.offset;
    store.flush()?;

    debug!(
        columns = column_count,
        rows = row_count,
        size = total,
        store = ?store.kind(),
        "decoded result set"
    );

    Ok(ResultCursor {
        store,
        row_offsets,
        column_count,
        col_type_offset,
        col_name_offset,
        current_offset: 0,
        position: Position::BeforeFirst,
        no_data: false,
    })
}

impl ResultCursor {
    fn empty(store: BackingStore) -> Self {
        Self {
            store,
            row_offsets: Vec::new(),
            column_count: 0,
            col_type_offset: 0,
            col_name_offset: 0,
            current_offset: 0,
            position: Position::BeforeFirst,
            no_data: true,
        }
    }

    /// True when the provider's query produced no rows at all, as opposed
    /// to a page window that selected none.
    pub fn is_no_data(&self) -> bool {
        self.no_data
    }

    pub fn column_count(&self) -> usize {
        self.column_count
    }

    /// Rows in this page.
    pub fn row_count(&self) -> usize {
        self.row_offsets.len()
    }

    pub fn position(&self) -> Position {
        self.position
    }

    fn move_to(&mut self, row: usize) {
        self.current_offset = self.row_offsets[row];
        self.position = Position::OnRow(row);
    }

    /// Move to the first row.
    pub fn step_first(&mut self) -> Result<()> {
        if self.row_offsets.is_empty() {
            return Err(CursorError::EndOfResultSet);
        }
        self.move_to(0);
        Ok(())
    }

    /// Move to the next row; fails with `EndOfResultSet` past the last one.
    pub fn step_next(&mut self) -> Result<()> {
        let next = match self.position {
            Position::BeforeFirst => 0,
            Position::OnRow(row) => row + 1,
            Position::Exhausted => return Err(CursorError::EndOfResultSet),
        };
        if next >= self.row_offsets.len() {
            if !self.row_offsets.is_empty() {
                self.position = Position::Exhausted;
            }
            return Err(CursorError::EndOfResultSet);
        }
        self.move_to(next);
        Ok(())
    }

    /// Move to the last row.
    pub fn step_last(&mut self) -> Result<()> {
        let Some(last) = self.row_offsets.len().checked_sub(1) else {
            return Err(CursorError::EndOfResultSet);
        };
        if self.position != Position::OnRow(last) {
            self.move_to(last);
        }
        Ok(())
    }

    /// Move to the previous row.
    pub fn step_previous(&mut self) -> Result<()> {
        match self.position {
            Position::OnRow(row) if row >= 1 => {
                self.move_to(row - 1);
                Ok(())
            }
            Position::Exhausted => self.step_last(),
            Position::OnRow(_) => Err(CursorError::invalid("already on the first row")),
            Position::BeforeFirst => Err(CursorError::invalid("cursor is before the first row")),
        }
    }

    fn check_column(&self, column: usize) -> Result<()> {
        if column >= self.column_count {
            return Err(CursorError::invalid(format!(
                "column {column} out of range ({} columns)",
                self.column_count
            )));
        }
        Ok(())
    }

    fn read_i32(&mut self) -> Result<i32> {
        let mut buf = [0u8; 4];
        read_all(&mut self.store, &mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }

    /// Seek to `column` of the current row and read its header, leaving
    /// the store positioned at the value bytes.
    fn locate_cell(&mut self, column: usize) -> Result<(CellType, usize)> {
        self.check_column(column)?;
        if !matches!(self.position, Position::OnRow(_)) {
            return Err(CursorError::invalid("cursor is not on a row"));
        }

        self.store.seek(SeekFrom::Start(self.current_offset))?;
        for _ in 0..column {
            let _cell_type = self.read_i32()?;
            let size = self.read_i32()?;
            self.store.seek(SeekFrom::Current(i64::from(size)))?;
        }
        let cell_type = CellType::from_code(self.read_i32()?)?;
        let size = self.read_i32()? as usize;
        Ok((cell_type, size))
    }

    fn locate_typed(&mut self, column: usize, expected: CellType) -> Result<usize> {
        let (cell_type, size) = self.locate_cell(column)?;
        if cell_type != expected {
            return Err(CursorError::invalid(format!(
                "column {column} holds {cell_type:?}, not {expected:?}"
            )));
        }
        Ok(size)
    }

    fn read_value_bytes(&mut self, size: usize) -> Result<Vec<u8>> {
        let mut buf = alloc_buffer(size)?;
        read_all(&mut self.store, &mut buf)?;
        Ok(buf)
    }

    /// Integer cell truncated to 32 bits.
    pub fn get_int_data(&mut self, column: usize) -> Result<i32> {
        Ok(self.get_int64_data(column)? as i32)
    }

    pub fn get_int64_data(&mut self, column: usize) -> Result<i64> {
        self.locate_typed(column, CellType::Integer)?;
        let mut buf = [0u8; 8];
        read_all(&mut self.store, &mut buf)?;
        Ok(i64::from_le_bytes(buf))
    }

    pub fn get_double_data(&mut self, column: usize) -> Result<f64> {
        self.locate_typed(column, CellType::Double)?;
        let mut buf = [0u8; 8];
        read_all(&mut self.store, &mut buf)?;
        Ok(f64::from_le_bytes(buf))
    }

    /// Text cell without its stored NUL terminator.
    pub fn get_text_data(&mut self, column: usize) -> Result<String> {
        let size = self.locate_typed(column, CellType::Text)?;
        let mut bytes = self.read_value_bytes(size)?;
        if bytes.last() == Some(&0) {
            bytes.pop();
        }
        String::from_utf8(bytes)
            .map_err(|_| CursorError::invalid(format!("column {column} is not valid UTF-8")))
    }

    /// Copy a blob cell into `buf`, returning its length.
    ///
    /// `buf` must hold at least [`get_column_item_size`](Self::get_column_item_size) bytes.
    pub fn get_blob_data(&mut self, column: usize, buf: &mut [u8]) -> Result<usize> {
        let size = self.locate_typed(column, CellType::Blob)?;
        if buf.len() < size {
            return Err(CursorError::MaxExceeded {
                size,
                max: buf.len(),
            });
        }
        read_all(&mut self.store, &mut buf[..size])?;
        Ok(size)
    }

    /// Blob cell as an owned buffer.
    pub fn get_blob(&mut self, column: usize) -> Result<Vec<u8>> {
        let size = self.locate_typed(column, CellType::Blob)?;
        self.read_value_bytes(size)
    }

    /// Stored size of a cell; text sizes include the NUL terminator.
    pub fn get_column_item_size(&mut self, column: usize) -> Result<usize> {
        Ok(self.locate_cell(column)?.1)
    }

    pub fn get_column_item_type(&mut self, column: usize) -> Result<CellType> {
        Ok(self.locate_cell(column)?.0)
    }

    /// Any cell as a dynamically typed value.
    pub fn get_value(&mut self, column: usize) -> Result<Value> {
        match self.get_column_item_type(column)? {
            CellType::Integer => self.get_int64_data(column).map(Value::Integer),
            CellType::Double => self.get_double_data(column).map(Value::Double),
            CellType::Text => self.get_text_data(column).map(Value::Text),
            CellType::Blob => self.get_blob(column).map(Value::Blob),
            CellType::Null => Ok(Value::Null),
        }
    }

    /// Column type as announced in the header (taken from the first row).
    pub fn get_column_type(&mut self, column: usize) -> Result<CellType> {
        self.check_column(column)?;
        self.store
            .seek(SeekFrom::Start(self.col_type_offset + 4 * column as u64))?;
        CellType::from_code(self.read_i32()?)
    }

    pub fn get_column_name(&mut self, column: usize) -> Result<String> {
        self.check_column(column)?;
        self.store.seek(SeekFrom::Start(self.col_name_offset))?;
        for _ in 0..column {
            let len = self.read_i32()?;
            self.store.seek(SeekFrom::Current(i64::from(len)))?;
        }
        let len = self.read_i32()? as usize;
        let mut bytes = self.read_value_bytes(len)?;
        if bytes.last() == Some(&0) {
            bytes.pop();
        }
        String::from_utf8(bytes)
            .map_err(|_| CursorError::invalid(format!("column {column} name is not valid UTF-8")))
    }

    /// All column names in order.
    pub fn column_names(&mut self) -> Result<Vec<String>> {
        (0..self.column_count)
            .map(|column| self.get_column_name(column))
            .collect()
    }

    /// Close the cursor, releasing its backing store.
    pub fn release(self) {
        debug!(rows = self.row_offsets.len(), "released result cursor");
    }
}
