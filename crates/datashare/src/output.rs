use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use datashare_cursor::{CursorError, ResultCursor, Value};
use datashare_peer::{Response, ResponsePayload};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// A response flattened for printing.
#[derive(Debug, Serialize)]
pub struct ResponseOutput {
    pub request_id: i32,
    pub operation: String,
    pub provider_id: String,
    pub data_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Vec<Value>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
}

impl ResponseOutput {
    pub fn from_response(response: Response) -> Result<Self, CursorError> {
        let mut out = Self {
            request_id: response.request_id,
            operation: response.kind.to_string(),
            provider_id: response.provider.provider_id,
            data_id: response.provider.data_id,
            success: response.provider_result,
            error: response.error,
            columns: None,
            rows: None,
            row_id: None,
            values: None,
        };
        match response.payload {
            ResponsePayload::Cursor(mut cursor) => {
                let (columns, rows) = collect_rows(&mut cursor)?;
                cursor.release();
                out.columns = Some(columns);
                out.rows = Some(rows);
            }
            ResponsePayload::RowId(row_id) => out.row_id = Some(row_id),
            ResponsePayload::Values(values) => out.values = Some(values),
            ResponsePayload::None => {}
        }
        Ok(out)
    }
}

/// Read every row of `cursor` from the first.
pub fn collect_rows(cursor: &mut ResultCursor) -> Result<(Vec<String>, Vec<Vec<Value>>), CursorError> {
    let columns = cursor.column_names()?;
    let mut rows = Vec::with_capacity(cursor.row_count());
    if cursor.row_count() == 0 {
        return Ok((columns, rows));
    }
    let width = cursor.column_count();
    cursor.step_first()?;
    loop {
        let row = (0..width)
            .map(|column| cursor.get_value(column))
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(row);
        match cursor.step_next() {
            Ok(()) => {}
            Err(CursorError::EndOfResultSet) => break,
            Err(err) => return Err(err),
        }
    }
    Ok((columns, rows))
}

pub fn render_response(out: &ResponseOutput, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => serde_json::to_string(out).unwrap_or_else(|_| "{}".to_string()),
        OutputFormat::Table => render_table(out),
        OutputFormat::Pretty => render_pretty(out),
    }
}

pub fn print_response(out: &ResponseOutput, format: OutputFormat) {
    println!("{}", render_response(out, format));
}

fn render_table(out: &ResponseOutput) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    if let (Some(columns), Some(rows)) = (&out.columns, &out.rows) {
        table.set_header(columns.clone());
        for row in rows {
            table.add_row(row.iter().map(Value::to_string).collect::<Vec<_>>());
        }
        return table.to_string();
    }
    if let Some(values) = &out.values {
        table.set_header(vec!["VALUE"]);
        for value in values {
            table.add_row(vec![value.clone()]);
        }
        return table.to_string();
    }

    table
        .set_header(vec!["REQUEST", "OPERATION", "RESULT", "DETAIL"])
        .add_row(vec![
            out.request_id.to_string(),
            out.operation.clone(),
            if out.success { "ok" } else { "failed" }.to_string(),
            detail(out),
        ]);
    table.to_string()
}

fn render_pretty(out: &ResponseOutput) -> String {
    let mut lines = vec![format!(
        "request={} operation={} provider={} data={} result={} {}",
        out.request_id,
        out.operation,
        out.provider_id,
        out.data_id,
        if out.success { "ok" } else { "failed" },
        detail(out)
    )
    .trim_end()
    .to_string()];
    if let (Some(columns), Some(rows)) = (&out.columns, &out.rows) {
        lines.push(columns.join("\t"));
        for row in rows {
            lines.push(
                row.iter()
                    .map(Value::to_string)
                    .collect::<Vec<_>>()
                    .join("\t"),
            );
        }
    }
    if let Some(values) = &out.values {
        lines.extend(values.iter().cloned());
    }
    lines.join("\n")
}

fn detail(out: &ResponseOutput) -> String {
    if let Some(error) = &out.error {
        return format!("error={error}");
    }
    if let Some(row_id) = out.row_id {
        return format!("row_id={row_id}");
    }
    if let Some(rows) = &out.rows {
        return format!("rows={}", rows.len());
    }
    if let Some(values) = &out.values {
        return format!("values={}", values.len());
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output() -> ResponseOutput {
        ResponseOutput {
            request_id: 9,
            operation: "select".into(),
            provider_id: "org.example.provider".into(),
            data_id: "contacts".into(),
            success: true,
            error: None,
            columns: Some(vec!["id".into(), "name".into()]),
            rows: Some(vec![vec![Value::Integer(1), Value::Text("ada".into())]]),
            row_id: None,
            values: None,
        }
    }

    #[test]
    fn json_skips_absent_fields() {
        let json = render_response(&output(), OutputFormat::Json);
        assert!(json.contains("\"rows\":[[1,\"ada\"]]"));
        assert!(!json.contains("row_id"));
        assert!(!json.contains("error"));
    }

    #[test]
    fn pretty_lists_rows_tab_separated() {
        let pretty = render_response(&output(), OutputFormat::Pretty);
        let lines: Vec<&str> = pretty.lines().collect();
        assert!(lines[0].contains("rows=1"));
        assert_eq!(lines[1], "id\tname");
        assert_eq!(lines[2], "1\tada");
    }

    #[test]
    fn table_reports_failures() {
        let mut out = output();
        out.columns = None;
        out.rows = None;
        out.success = false;
        out.error = Some("operation not supported".into());
        let table = render_response(&out, OutputFormat::Table);
        assert!(table.contains("REQUEST"));
        assert!(table.contains("failed"));
        assert!(render_response(&out, OutputFormat::Pretty)
            .ends_with("error=operation not supported"));
    }
}
