//! In-memory provider serving tables and maps from a JSON dataset.
//!
//! ```json
//! {
//!   "tables": {
//!     "contacts": { "columns": ["id", "name"], "rows": [[1, "ada"], [2, "grace"]] }
//!   },
//!   "maps": {
//!     "settings": { "theme": ["dark"] }
//!   }
//! }
//! ```
//!
//! The request's `data_id` names the table or map. Where clauses are a
//! single `column = literal` comparison and order clauses are
//! `column [ASC|DESC]`. Changes live only as long as the provider.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use datashare_cursor::{MemoryRows, Value};
use datashare_peer::{
    Bundle, DeleteRequest, InsertRequest, MapGetRequest, MapSetRequest, MapValueRequest,
    PeerError, ProviderHandler, RequestContext, Responder, Result as PeerResult, SelectRequest,
    UpdateRequest,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Errors loading a dataset.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("failed to read dataset {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid dataset JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("table {table}: {message}")]
    Table { table: String, message: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    fn validate(&self, name: &str) -> Result<(), DatasetError> {
        let fail = |message: String| DatasetError::Table {
            table: name.to_string(),
            message,
        };
        if self.columns.is_empty() {
            return Err(fail("no columns".to_string()));
        }
        for (index, column) in self.columns.iter().enumerate() {
            if column.is_empty() {
                return Err(fail(format!("column {index} has an empty name")));
            }
            if self.columns[..index].contains(column) {
                return Err(fail(format!("duplicate column {column}")));
            }
        }
        for (index, row) in self.rows.iter().enumerate() {
            if row.len() != self.columns.len() {
                return Err(fail(format!(
                    "row {index} has {} values, expected {}",
                    row.len(),
                    self.columns.len()
                )));
            }
        }
        Ok(())
    }
}

/// Tables and maps a [`MemoryProvider`] serves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub tables: BTreeMap<String, Table>,
    /// Map name to key to values.
    #[serde(default)]
    pub maps: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

impl Dataset {
    pub fn from_json(text: &str) -> Result<Self, DatasetError> {
        let dataset: Dataset = serde_json::from_str(text)?;
        for (name, table) in &dataset.tables {
            table.validate(name)?;
        }
        Ok(dataset)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| DatasetError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }
}

fn invalid(message: impl Into<String>) -> PeerError {
    PeerError::InvalidParameter(message.into())
}

/// Parse a clause literal: quoted text, `NULL`, an integer, a float, or
/// bare text.
pub fn parse_literal(raw: &str) -> Value {
    let raw = raw.trim();
    for quote in ['\'', '"'] {
        if let Some(inner) = raw
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return Value::Text(inner.to_string());
        }
    }
    if raw.eq_ignore_ascii_case("NULL") {
        return Value::Null;
    }
    if let Ok(int) = raw.parse::<i64>() {
        return Value::Integer(int);
    }
    if let Ok(double) = raw.parse::<f64>() {
        return Value::Double(double);
    }
    Value::Text(raw.to_string())
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Integer(int), Value::Double(double)) | (Value::Double(double), Value::Integer(int)) => {
            *int as f64 == *double
        }
        _ => left == right,
    }
}

fn compare_values(left: &Value, right: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Integer(_) | Value::Double(_) => 1,
            Value::Text(_) => 2,
            Value::Blob(_) => 3,
        }
    }
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
        (Value::Integer(a), Value::Double(b)) => (*a as f64).total_cmp(b),
        (Value::Double(a), Value::Integer(b)) => a.total_cmp(&(*b as f64)),
        (Value::Double(a), Value::Double(b)) => a.total_cmp(b),
        (Value::Text(a), Value::Text(b)) => a.cmp(b),
        (Value::Blob(a), Value::Blob(b)) => a.cmp(b),
        _ => rank(left).cmp(&rank(right)),
    }
}

/// A `column = literal` where clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub value: Value,
}

impl Filter {
    pub fn parse(clause: &str) -> PeerResult<Self> {
        let (column, literal) = clause
            .split_once('=')
            .ok_or_else(|| invalid(format!("unsupported where clause: {clause}")))?;
        let column = column.trim();
        if column.is_empty() || column.contains(char::is_whitespace) {
            return Err(invalid(format!("unsupported where clause: {clause}")));
        }
        Ok(Self {
            column: column.to_string(),
            value: parse_literal(literal),
        })
    }

    fn bind(clause: Option<&str>, table: &Table) -> PeerResult<Option<(usize, Value)>> {
        let Some(clause) = clause else {
            return Ok(None);
        };
        let filter = Self::parse(clause)?;
        let index = table
            .column_index(&filter.column)
            .ok_or_else(|| invalid(format!("no column named {}", filter.column)))?;
        Ok(Some((index, filter.value)))
    }
}

fn row_matches(row: &[Value], filter: &Option<(usize, Value)>) -> bool {
    match filter {
        Some((index, value)) => row.get(*index).is_some_and(|cell| values_equal(cell, value)),
        None => true,
    }
}

fn parse_order(clause: &str, table: &Table) -> PeerResult<(usize, bool)> {
    let mut words = clause.split_whitespace();
    let column = words
        .next()
        .ok_or_else(|| invalid("empty order clause"))?;
    let descending = match words.next() {
        None => false,
        Some(word) if word.eq_ignore_ascii_case("ASC") => false,
        Some(word) if word.eq_ignore_ascii_case("DESC") => true,
        Some(word) => return Err(invalid(format!("unsupported order direction {word}"))),
    };
    if words.next().is_some() {
        return Err(invalid(format!("unsupported order clause: {clause}")));
    }
    let index = table
        .column_index(column)
        .ok_or_else(|| invalid(format!("no column named {column}")))?;
    Ok((index, descending))
}

/// Serves a [`Dataset`] to consumers.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    dataset: Dataset,
    last_row_ids: HashMap<String, i64>,
}

impl MemoryProvider {
    pub fn new(dataset: Dataset) -> Self {
        Self {
            dataset,
            last_row_ids: HashMap::new(),
        }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    fn table(&self, name: &str) -> PeerResult<&Table> {
        self.dataset
            .tables
            .get(name)
            .ok_or_else(|| invalid(format!("no table named {name}")))
    }

    fn table_mut(&mut self, name: &str) -> PeerResult<&mut Table> {
        self.dataset
            .tables
            .get_mut(name)
            .ok_or_else(|| invalid(format!("no table named {name}")))
    }

    fn map_mut(&mut self, name: &str) -> PeerResult<&mut BTreeMap<String, Vec<String>>> {
        self.dataset
            .maps
            .get_mut(name)
            .ok_or_else(|| invalid(format!("no map named {name}")))
    }

    /// Rows of `table` answering `request`, projected and ordered.
    pub fn select_rows(&self, table: &str, request: &SelectRequest) -> PeerResult<MemoryRows> {
        let table = self.table(table)?;
        let mut projection = Vec::new();
        for column in &request.columns {
            if column == "*" {
                projection.extend(0..table.columns.len());
                continue;
            }
            let index = table
                .column_index(column)
                .ok_or_else(|| invalid(format!("no column named {column}")))?;
            projection.push(index);
        }

        let filter = Filter::bind(request.where_clause.as_deref(), table)?;
        let mut matched: Vec<&Vec<Value>> = table
            .rows
            .iter()
            .filter(|row| row_matches(row, &filter))
            .collect();
        if let Some(order) = request.order.as_deref() {
            let (index, descending) = parse_order(order, table)?;
            matched.sort_by(|a, b| {
                let ordering = compare_values(&a[index], &b[index]);
                if descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }

        let columns = projection
            .iter()
            .map(|&index| table.columns[index].clone())
            .collect();
        let rows = matched
            .into_iter()
            .map(|row| projection.iter().map(|&index| row[index].clone()).collect())
            .collect();
        Ok(MemoryRows::new(columns, rows))
    }

    /// Append a row built from `values`; missing columns are NULL.
    pub fn insert_row(&mut self, table_name: &str, values: &Bundle) -> PeerResult<i64> {
        let table = self.table_mut(table_name)?;
        let mut row = vec![Value::Null; table.columns.len()];
        for (column, raw) in values.iter_str() {
            let index = table
                .column_index(column)
                .ok_or_else(|| invalid(format!("no column named {column}")))?;
            row[index] = parse_literal(raw);
        }
        table.rows.push(row);
        let rows = table.rows.len() as i64;

        let last = self
            .last_row_ids
            .entry(table_name.to_string())
            .or_insert(rows - 1);
        *last += 1;
        debug!(table = table_name, row_id = *last, "row inserted");
        Ok(*last)
    }

    /// Set `values` on every matching row. Returns the number of rows changed.
    pub fn update_rows(
        &mut self,
        table_name: &str,
        values: &Bundle,
        where_clause: Option<&str>,
    ) -> PeerResult<usize> {
        let table = self.table_mut(table_name)?;
        let mut changes = Vec::new();
        for (column, raw) in values.iter_str() {
            let index = table
                .column_index(column)
                .ok_or_else(|| invalid(format!("no column named {column}")))?;
            changes.push((index, parse_literal(raw)));
        }
        let filter = Filter::bind(where_clause, table)?;

        let mut updated = 0;
        for row in table.rows.iter_mut().filter(|row| row_matches(row, &filter)) {
            for (index, value) in &changes {
                row[*index] = value.clone();
            }
            updated += 1;
        }
        debug!(table = table_name, updated, "rows updated");
        Ok(updated)
    }

    /// Delete every matching row. Returns the number of rows removed.
    pub fn delete_rows(&mut self, table_name: &str, where_clause: Option<&str>) -> PeerResult<usize> {
        let table = self.table_mut(table_name)?;
        let filter = Filter::bind(where_clause, table)?;
        let before = table.rows.len();
        table.rows.retain(|row| !row_matches(row, &filter));
        let deleted = before - table.rows.len();
        debug!(table = table_name, deleted, "rows deleted");
        Ok(deleted)
    }

    /// Values under `key`; an absent key has none.
    pub fn map_values(&self, map: &str, key: &str) -> PeerResult<Vec<String>> {
        let map = self
            .dataset
            .maps
            .get(map)
            .ok_or_else(|| invalid(format!("no map named {map}")))?;
        Ok(map.get(key).cloned().unwrap_or_default())
    }

    /// Replace the first `old_value` under `key` with `new_value`.
    pub fn map_replace(
        &mut self,
        map: &str,
        key: &str,
        old_value: &str,
        new_value: &str,
    ) -> PeerResult<()> {
        let slot = self
            .map_mut(map)?
            .get_mut(key)
            .and_then(|values| values.iter_mut().find(|value| *value == old_value))
            .ok_or_else(|| invalid(format!("{key} has no value {old_value}")))?;
        *slot = new_value.to_string();
        Ok(())
    }

    pub fn map_insert(&mut self, map: &str, key: &str, value: &str) -> PeerResult<()> {
        self.map_mut(map)?
            .entry(key.to_string())
            .or_default()
            .push(value.to_string());
        Ok(())
    }

    /// Remove every `value` under `key`; the key goes when it empties.
    pub fn map_delete(&mut self, map: &str, key: &str, value: &str) -> PeerResult<()> {
        let entries = self.map_mut(map)?;
        let values = entries
            .get_mut(key)
            .ok_or_else(|| invalid(format!("no key named {key}")))?;
        let before = values.len();
        values.retain(|existing| existing != value);
        if values.len() == before {
            return Err(invalid(format!("{key} has no value {value}")));
        }
        if values.is_empty() {
            entries.remove(key);
        }
        Ok(())
    }
}

impl ProviderHandler for MemoryProvider {
    fn on_select(
        &mut self,
        ctx: &RequestContext,
        request: &SelectRequest,
        responder: &mut Responder<'_>,
    ) -> PeerResult<()> {
        let mut rows = self.select_rows(&ctx.provider.data_id, request)?;
        responder.send_select_result(ctx.request_id, &mut rows)
    }

    fn on_insert(
        &mut self,
        ctx: &RequestContext,
        request: &InsertRequest,
        responder: &mut Responder<'_>,
    ) -> PeerResult<()> {
        let row_id = self.insert_row(&ctx.provider.data_id, &request.values)?;
        responder.send_insert_result(ctx.request_id, row_id)
    }

    fn on_update(
        &mut self,
        ctx: &RequestContext,
        request: &UpdateRequest,
        responder: &mut Responder<'_>,
    ) -> PeerResult<()> {
        self.update_rows(
            &ctx.provider.data_id,
            &request.values,
            request.where_clause.as_deref(),
        )?;
        responder.send_success(ctx.request_id)
    }

    fn on_delete(
        &mut self,
        ctx: &RequestContext,
        request: &DeleteRequest,
        responder: &mut Responder<'_>,
    ) -> PeerResult<()> {
        self.delete_rows(&ctx.provider.data_id, request.where_clause.as_deref())?;
        responder.send_success(ctx.request_id)
    }

    fn on_map_get(
        &mut self,
        ctx: &RequestContext,
        request: &MapGetRequest,
        responder: &mut Responder<'_>,
    ) -> PeerResult<()> {
        let values = self.map_values(&ctx.provider.data_id, &request.key)?;
        responder.send_map_get_result(ctx.request_id, &values)
    }

    fn on_map_set(
        &mut self,
        ctx: &RequestContext,
        request: &MapSetRequest,
        responder: &mut Responder<'_>,
    ) -> PeerResult<()> {
        self.map_replace(
            &ctx.provider.data_id,
            &request.key,
            &request.old_value,
            &request.new_value,
        )?;
        responder.send_success(ctx.request_id)
    }

    fn on_map_add(
        &mut self,
        ctx: &RequestContext,
        request: &MapValueRequest,
        responder: &mut Responder<'_>,
    ) -> PeerResult<()> {
        self.map_insert(&ctx.provider.data_id, &request.key, &request.value)?;
        responder.send_success(ctx.request_id)
    }

    fn on_map_remove(
        &mut self,
        ctx: &RequestContext,
        request: &MapValueRequest,
        responder: &mut Responder<'_>,
    ) -> PeerResult<()> {
        self.map_delete(&ctx.provider.data_id, &request.key, &request.value)?;
        responder.send_success(ctx.request_id)
    }
}
