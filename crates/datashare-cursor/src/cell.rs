use serde::{Deserialize, Serialize};

use crate::error::{CursorError, Result};

/// Storage class of a cell, with its on-wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellType {
    Integer = 1,
    Double = 2,
    Text = 3,
    Blob = 4,
    Null = 5,
}

impl CellType {
    /// On-wire type code.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Parse an on-wire type code.
    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            1 => Ok(CellType::Integer),
            2 => Ok(CellType::Double),
            3 => Ok(CellType::Text),
            4 => Ok(CellType::Blob),
            5 => Ok(CellType::Null),
            other => Err(CursorError::invalid(format!("unknown cell type code {other}"))),
        }
    }

    /// Check a stored size against the fixed width of numeric and null cells.
    pub(crate) fn check_size(self, size: usize) -> Result<()> {
        let expected = match self {
            CellType::Integer => Some(std::mem::size_of::<i64>()),
            CellType::Double => Some(std::mem::size_of::<f64>()),
            CellType::Null => Some(0),
            CellType::Text => {
                if size == 0 {
                    return Err(CursorError::invalid("text cell without terminator"));
                }
                None
            }
            CellType::Blob => None,
        };
        match expected {
            Some(expected) if expected != size => Err(CursorError::invalid(format!(
                "{self:?} cell has size {size}, expected {expected}"
            ))),
            _ => Ok(()),
        }
    }
}

/// A single typed cell value.
///
/// Integers are always 64-bit on the wire; text is UTF-8 and stored with a
/// trailing NUL that never appears in the value itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Integer(i64),
    Double(f64),
    Text(String),
    Blob(Vec<u8>),
    Null,
}

impl Value {
    pub fn cell_type(&self) -> CellType {
        match self {
            Value::Integer(_) => CellType::Integer,
            Value::Double(_) => CellType::Double,
            Value::Text(_) => CellType::Text,
            Value::Blob(_) => CellType::Blob,
            Value::Null => CellType::Null,
        }
    }

    /// Size of the cell body on the wire.
    pub fn wire_size(&self) -> usize {
        match self {
            Value::Integer(_) => std::mem::size_of::<i64>(),
            Value::Double(_) => std::mem::size_of::<f64>(),
            Value::Text(text) => text.len() + 1,
            Value::Blob(blob) => blob.len(),
            Value::Null => 0,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Text(v) => f.write_str(v),
            Value::Blob(v) => write!(f, "<blob {} bytes>", v.len()),
            Value::Null => f.write_str("NULL"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_codes_match_wire_values() {
        for (ty, code) in [
            (CellType::Integer, 1),
            (CellType::Double, 2),
            (CellType::Text, 3),
            (CellType::Blob, 4),
            (CellType::Null, 5),
        ] {
            assert_eq!(ty.code(), code);
            assert_eq!(CellType::from_code(code).unwrap(), ty);
        }
        assert!(CellType::from_code(0).is_err());
        assert!(CellType::from_code(6).is_err());
    }

    #[test]
    fn wire_sizes_follow_storage_class() {
        assert_eq!(Value::Integer(7).wire_size(), 8);
        assert_eq!(Value::Double(0.5).wire_size(), 8);
        assert_eq!(Value::from("abc").wire_size(), 4);
        assert_eq!(Value::Blob(vec![1, 2]).wire_size(), 2);
        assert_eq!(Value::Null.wire_size(), 0);
    }

    #[test]
    fn fixed_width_sizes_are_enforced() {
        assert!(CellType::Integer.check_size(8).is_ok());
        assert!(CellType::Integer.check_size(4).is_err());
        assert!(CellType::Null.check_size(1).is_err());
        assert!(CellType::Text.check_size(0).is_err());
        assert!(CellType::Blob.check_size(0).is_ok());
    }

    #[test]
    fn json_values_map_to_cells() {
        let values: Vec<Value> = serde_json::from_str(r#"[1, 2.5, "x", null, [7, 8]]"#).unwrap();
        assert_eq!(
            values,
            vec![
                Value::Integer(1),
                Value::Double(2.5),
                Value::Text("x".into()),
                Value::Null,
                Value::Blob(vec![7, 8]),
            ]
        );
    }
}
