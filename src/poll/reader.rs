//! Decoding of poll exports into a plain string table.
//!
//! Two physical forms are accepted, chosen by file-name suffix: delimited text
//! (`.csv`) and anything calamine can open (`.xlsx`, `.xls`, `.ods`).

use crate::error::{RollCallError, RollCallResult};
use crate::headers::HeaderIndex;
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use std::io::Cursor;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollFormat {
    Csv,
    Spreadsheet,
}

impl PollFormat {
    pub fn from_file_name(file_name: &str) -> Self {
        if file_name.trim().to_lowercase().ends_with(".csv") {
            PollFormat::Csv
        } else {
            PollFormat::Spreadsheet
        }
    }
}

/// Header row plus data rows, every cell as trimmed text.
#[derive(Debug, Clone)]
pub struct PollTable {
    pub headers: Vec<String>,
    pub index: HeaderIndex,
    pub rows: Vec<Vec<String>>,
}

impl PollTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let index = HeaderIndex::new(headers.iter().enumerate());
        Self {
            headers,
            index,
            rows,
        }
    }

    /// Cell text, empty when the row is short.
    pub fn cell<'a>(&'a self, row: &'a [String], col: usize) -> &'a str {
        row.get(col).map(String::as_str).unwrap_or("")
    }
}

pub fn read_poll_table(bytes: &[u8], format: PollFormat) -> RollCallResult<PollTable> {
    let table = match format {
        PollFormat::Csv => read_csv(bytes)?,
        PollFormat::Spreadsheet => read_spreadsheet(bytes)?,
    };
    debug!(
        columns = table.headers.len(),
        rows = table.rows.len(),
        ?format,
        "decoded poll export"
    );
    Ok(table)
}

fn read_csv(bytes: &[u8]) -> RollCallResult<PollTable> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| RollCallError::Parse(e.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| RollCallError::Parse(e.to_string()))?;
        rows.push(record.iter().map(|c| c.trim().to_string()).collect());
    }

    Ok(PollTable::new(headers, rows))
}

fn read_spreadsheet(bytes: &[u8]) -> RollCallResult<PollTable> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| RollCallError::Parse(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| RollCallError::Parse("workbook has no worksheets".to_string()))?
        .map_err(|e| RollCallError::Parse(e.to_string()))?;

    let mut iter = range.rows();
    let headers: Vec<String> = match iter.next() {
        Some(header) => header.iter().map(cell_text).collect(),
        None => Vec::new(),
    };
    let rows = iter.map(|row| row.iter().map(cell_text).collect()).collect();

    Ok(PollTable::new(headers, rows))
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string().trim().to_string(),
    }
}
