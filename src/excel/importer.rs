//! Excel importer implementation - .xlsx bytes → in-memory workbook

use crate::error::{RollCallError, RollCallResult};
use crate::excel::model::{cell_position, Cell, CellStyle, CellValue, Sheet, Workbook};
use crate::excel::package::XlsxPackage;
use crate::excel::xml::{attr, local_name, XmlResult};
use calamine::{Data, Range, Reader, Xlsx};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use quick_xml::events::Event;
use std::io::Cursor;
use tracing::debug;

/// Excel importer for roster workbooks
pub struct ExcelImporter<'a> {
    bytes: &'a [u8],
}

impl<'a> ExcelImporter<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    /// Import every worksheet, in workbook order.
    ///
    /// The input buffer is only read; all later edits happen on the returned
    /// model, which keeps the package for export.
    pub fn import(&self) -> RollCallResult<Workbook> {
        let package = XlsxPackage::from_bytes(self.bytes)?;
        let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(self.bytes))
            .map_err(|e| RollCallError::MasterRead(e.to_string()))?;

        let mut sheets = Vec::with_capacity(package.sheets().len());
        for entry in package.sheets() {
            let range = workbook
                .worksheet_range(&entry.name)
                .map_err(|e| RollCallError::MasterRead(format!("{}: {}", entry.name, e)))?;
            // Formula cells are optional; a sheet without them reads as values only
            let formulas = workbook.worksheet_formula(&entry.name).ok();
            let formats = match package.part(&entry.part) {
                Some(xml) => cell_formats(xml)
                    .map_err(|e| RollCallError::MasterRead(format!("{}: {}", entry.part, e)))?,
                None => Vec::new(),
            };

            let sheet = self.process_sheet(&entry.name, &range, formulas.as_ref(), &formats);
            debug!(
                sheet = %entry.name,
                cells = sheet.cells().count(),
                "imported worksheet"
            );
            sheets.push(sheet);
        }

        Ok(Workbook {
            sheets,
            active: package.active_sheet(),
            package: Some(package),
        })
    }

    fn process_sheet(
        &self,
        sheet_name: &str,
        range: &Range<Data>,
        formula_range: Option<&Range<String>>,
        formats: &[((u32, u16), u32)],
    ) -> Sheet {
        let mut sheet = Sheet::new(sheet_name);

        // calamine ranges start at the first used cell, not at A1
        if let Some((row0, col0)) = range.start() {
            for (row, col, data) in range.used_cells() {
                let (row, col) = (row0 + row as u32, (col0 + col as u32) as u16);
                if let Some(cell) = self.convert_cell(data) {
                    sheet.set_value(row, col, cell.value);
                }
            }
        }

        if let Some(formulas) = formula_range {
            if let Some((row0, col0)) = formulas.start() {
                for (row, col, formula) in formulas.used_cells() {
                    if formula.is_empty() {
                        continue;
                    }
                    let (row, col) = (row0 + row as u32, (col0 + col as u32) as u16);
                    let cached = match sheet.value(row, col) {
                        CellValue::Empty => None,
                        other => Some(other.to_text()),
                    };
                    // calamine strips the leading '='
                    let formula = formula.trim_start_matches('=').to_string();
                    sheet.set_value(row, col, CellValue::Formula { formula, cached });
                }
            }
        }

        // Styled blanks become cells too, so appended rows can copy them
        for &((row, col), xf) in formats {
            sheet.set_style(row, col, CellStyle::with_xf(xf));
        }

        sheet.mark_clean();
        sheet
    }

    /// Convert one calamine cell. Empty cells yield `None`.
    ///
    /// Date-formatted numbers stay numbers: the serial is what the file
    /// holds, and the cell's own format record keeps displaying it as a date.
    fn convert_cell(&self, data: &Data) -> Option<Cell> {
        let value = match data {
            Data::Empty => return None,
            Data::String(s) => CellValue::Text(s.clone()),
            Data::Float(f) => CellValue::Number(*f),
            Data::Int(i) => CellValue::Number(*i as f64),
            Data::Bool(b) => CellValue::Bool(*b),
            Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
            Data::DateTimeIso(s) => match parse_iso(s) {
                Some(parsed) => CellValue::Date(parsed),
                None => CellValue::Text(s.clone()),
            },
            Data::DurationIso(s) => CellValue::Text(s.clone()),
            Data::Error(e) => CellValue::Text(e.to_string()),
        };
        Some(Cell::new(value))
    }
}

/// `((row, col), xf)` for every `<c>` with a non-default `s` attribute.
fn cell_formats(xml: &[u8]) -> XmlResult<Vec<((u32, u16), u32)>> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut formats = Vec::new();
    let (mut row, mut next_row, mut next_col) = (0u32, 0u32, 0u16);

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) => match local_name(e.name().as_ref()) {
                b"row" => {
                    row = attr(&e, b"r")
                        .and_then(|r| r.parse::<u32>().ok())
                        .and_then(|r| r.checked_sub(1))
                        .unwrap_or(next_row);
                    next_row = row + 1;
                    next_col = 0;
                }
                b"c" => {
                    let (r, c) = attr(&e, b"r")
                        .as_deref()
                        .and_then(cell_position)
                        .unwrap_or((row, next_col));
                    next_col = c.saturating_add(1);
                    if let Some(xf) = attr(&e, b"s").and_then(|s| s.parse::<u32>().ok()) {
                        if xf != 0 {
                            formats.push(((r, c), xf));
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(formats)
}

fn parse_iso(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}
