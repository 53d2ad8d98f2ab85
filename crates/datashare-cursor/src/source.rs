use crate::cell::Value;
use crate::error::Result;

/// A live query result the provider encodes onto the wire.
///
/// The encoder scans the rows twice (once to count the page window, once
/// to write it), so sources must be able to rewind.
pub trait RowSource {
    /// Number of columns in every row.
    fn column_count(&self) -> usize;

    /// Name of column `index`.
    fn column_name(&self, index: usize) -> &str;

    /// Position before the first row.
    fn rewind(&mut self) -> Result<()>;

    /// Advance and return the next row, or `None` after the last one.
    fn next_row(&mut self) -> Result<Option<Vec<Value>>>;
}

/// Rows held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryRows {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    next: usize,
}

impl MemoryRows {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns,
            rows,
            next: 0,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }
}

impl RowSource for MemoryRows {
    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn column_name(&self, index: usize) -> &str {
        self.columns.get(index).map(String::as_str).unwrap_or("")
    }

    fn rewind(&mut self) -> Result<()> {
        self.next = 0;
        Ok(())
    }

    fn next_row(&mut self) -> Result<Option<Vec<Value>>> {
        let row = self.rows.get(self.next).cloned();
        if row.is_some() {
            self.next += 1;
        }
        Ok(row)
    }
}
