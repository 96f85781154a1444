//! Excel exporter implementation - edited workbook → patched .xlsx bytes
//!
//! The workbook's source package is copied part by part. Only worksheets
//! with recorded edits are rewritten, and inside them only the edited cells,
//! the `<dimension>` and the edited `<col>` widths change. New format records
//! go to the end of `cellXfs`.

use crate::error::{RollCallError, RollCallResult};
use crate::excel::model::{
    cell_position, column_letter, excel_serial, CellValue, Sheet, Workbook, DATE_FORMAT,
};
use crate::excel::styles::StyleTable;
use crate::excel::xml::{attr, attrs, element, local_name, rewrite, set_pair, XmlResult};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::QName;
use quick_xml::{Reader, Writer};
use std::collections::BTreeMap;
use std::iter::Peekable;
use tracing::{debug, warn};

/// Excel exporter for roster workbooks
pub struct ExcelExporter<'a> {
    workbook: &'a Workbook,
}

/// Value and format record index for one rewritten cell.
#[derive(Debug, Clone, PartialEq)]
struct CellPatch {
    value: CellValue,
    xf: u32,
}

/// Patched cells keyed by 1-based row, then 0-based column.
type RowPatches = BTreeMap<u32, BTreeMap<u16, CellPatch>>;

fn xml_error(part: &str, e: quick_xml::Error) -> RollCallError {
    RollCallError::Serialization(format!("Failed to rewrite {}: {}", part, e))
}

impl<'a> ExcelExporter<'a> {
    pub fn new(workbook: &'a Workbook) -> Self {
        Self { workbook }
    }

    /// Render the workbook to an .xlsx byte buffer
    pub fn export(&self) -> RollCallResult<Vec<u8>> {
        let source = self.workbook.package.as_ref().ok_or_else(|| {
            RollCallError::Serialization("workbook was not read from an .xlsx file".to_string())
        })?;
        let mut package = source.clone();

        let mut styles = match source.styles_part().and_then(|p| source.part(p)) {
            Some(xml) => Some(StyleTable::parse(xml).map_err(|e| xml_error("styles", e))?),
            None => None,
        };

        for (sheet, entry) in self.workbook.sheets.iter().zip(source.sheets()) {
            if !sheet.has_edits() {
                continue;
            }
            let rows = cell_patches(sheet, styles.as_mut())?;
            let widths: BTreeMap<u16, f64> = sheet.edited_widths().collect();
            let xml = source.part(&entry.part).ok_or_else(|| {
                RollCallError::Serialization(format!("missing worksheet part {}", entry.part))
            })?;
            let patched =
                patch_worksheet_xml(xml, &rows, &widths).map_err(|e| xml_error(&entry.part, e))?;
            debug!(
                sheet = %sheet.name,
                cells = rows.values().map(BTreeMap::len).sum::<usize>(),
                columns = widths.len(),
                "patched worksheet"
            );
            package.replace_part(&entry.part, patched)?;
        }

        if let (Some(styles), Some(part)) = (&styles, source.styles_part()) {
            if styles.is_modified() {
                let xml = source.part(part).unwrap_or_default();
                let rendered = styles.render(xml).map_err(|e| xml_error(part, e))?;
                package.replace_part(part, rendered)?;
            }
        }

        package.to_bytes()
    }
}

fn cell_patches(sheet: &Sheet, mut styles: Option<&mut StyleTable>) -> RollCallResult<RowPatches> {
    let mut rows = RowPatches::new();
    let mut warned = false;
    for (row, col) in sheet.edited_cells() {
        let Some(cell) = sheet.cell(row, col) else {
            continue;
        };
        let mut style = cell.style.clone();
        let value = match &cell.value {
            // A date is a serial number with a date format
            CellValue::Date(dt) => {
                let serial = excel_serial(dt).ok_or_else(|| {
                    RollCallError::Serialization(format!("Date out of range: {}", dt))
                })?;
                style.num_format.get_or_insert_with(|| DATE_FORMAT.to_string());
                CellValue::Number(serial)
            }
            other => other.clone(),
        };
        let xf = match styles.as_deref_mut() {
            Some(table) => table.resolve(&style),
            None => {
                if style.has_overrides() && !warned {
                    warn!(sheet = %sheet.name, "workbook has no styles part; formats not applied");
                    warned = true;
                }
                style.xf
            }
        };
        rows.entry(row + 1)
            .or_default()
            .insert(col, CellPatch { value, xf });
    }
    Ok(rows)
}

// ═══════════════════════════════════════════════════════════════════════════
// WORKSHEET XML
// ═══════════════════════════════════════════════════════════════════════════

fn patch_worksheet_xml(
    original: &[u8],
    rows: &RowPatches,
    widths: &BTreeMap<u16, f64>,
) -> XmlResult<Vec<u8>> {
    let mut reader = Reader::from_reader(original);
    let mut writer = Writer::new(Vec::with_capacity(original.len() + rows.len() * 128));
    let mut buf = Vec::new();
    let mut saw_cols = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Empty(e) if local_name(e.name().as_ref()) == b"dimension" => {
                let merged = merged_dimension(attr(&e, b"ref").as_deref(), rows);
                writer.write_event(Event::Empty(rewrite(&e, &[("ref", &merged)], &[])?))?;
            }
            Event::Start(e) if local_name(e.name().as_ref()) == b"cols" => {
                saw_cols = true;
                let cols = read_cols(&mut reader)?;
                write_cols(&mut writer, merge_cols(cols, widths))?;
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"cols" => {
                saw_cols = true;
                write_cols(&mut writer, merge_cols(Vec::new(), widths))?;
            }
            Event::Start(e) if local_name(e.name().as_ref()) == b"sheetData" => {
                // <cols> precedes <sheetData>
                if !saw_cols && !widths.is_empty() {
                    write_cols(&mut writer, merge_cols(Vec::new(), widths))?;
                }
                saw_cols = true;
                writer.write_event(Event::Start(e))?;
                patch_sheet_data(&mut reader, &mut writer, rows)?;
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"sheetData" => {
                if !saw_cols && !widths.is_empty() {
                    write_cols(&mut writer, merge_cols(Vec::new(), widths))?;
                }
                saw_cols = true;
                if rows.is_empty() {
                    writer.write_event(Event::Empty(e))?;
                } else {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    writer.write_event(Event::Start(e))?;
                    for (&row, cells) in rows {
                        write_new_row(&mut writer, row, cells)?;
                    }
                    writer.write_event(Event::End(BytesEnd::new(name)))?;
                }
            }
            Event::Eof => break,
            ev => writer.write_event(ev)?,
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}

type PendingRows<'p> = Peekable<std::collections::btree_map::Iter<'p, u32, BTreeMap<u16, CellPatch>>>;

fn patch_sheet_data<R: std::io::BufRead>(
    reader: &mut Reader<R>,
    writer: &mut Writer<Vec<u8>>,
    rows: &RowPatches,
) -> XmlResult<()> {
    let mut pending = rows.iter().peekable();
    let mut buf = Vec::new();
    let mut next_row = 1;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if local_name(e.name().as_ref()) == b"row" => {
                let row = row_number(&e, next_row);
                next_row = row + 1;
                flush_rows_before(writer, &mut pending, row)?;
                let row_attr = row.to_string();
                match take_row(&mut pending, row) {
                    Some(cells) => {
                        // spans would no longer cover inserted cells
                        let start = rewrite(&e, &[("r", &row_attr)], &["spans"])?;
                        writer.write_event(Event::Start(start))?;
                        patch_row(reader, writer, row, cells)?;
                    }
                    None if attr(&e, b"r").is_none() => {
                        writer.write_event(Event::Start(rewrite(&e, &[("r", &row_attr)], &[])?))?;
                    }
                    None => writer.write_event(Event::Start(e))?,
                }
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"row" => {
                let row = row_number(&e, next_row);
                next_row = row + 1;
                flush_rows_before(writer, &mut pending, row)?;
                let row_attr = row.to_string();
                match take_row(&mut pending, row) {
                    Some(cells) => {
                        let start = rewrite(&e, &[("r", &row_attr)], &["spans"])?;
                        let end = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                        writer.write_event(Event::Start(start))?;
                        for (&col, patch) in cells {
                            write_cell(writer, row, col, patch)?;
                        }
                        writer.write_event(Event::End(BytesEnd::new(end)))?;
                    }
                    None if attr(&e, b"r").is_none() => {
                        writer.write_event(Event::Empty(rewrite(&e, &[("r", &row_attr)], &[])?))?;
                    }
                    None => writer.write_event(Event::Empty(e))?,
                }
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"sheetData" => {
                for (&row, cells) in pending.by_ref() {
                    write_new_row(writer, row, cells)?;
                }
                writer.write_event(Event::End(e))?;
                return Ok(());
            }
            Event::Eof => return Err(unexpected_eof("sheetData")),
            ev => writer.write_event(ev)?,
        }
        buf.clear();
    }
}

fn patch_row<R: std::io::BufRead>(
    reader: &mut Reader<R>,
    writer: &mut Writer<Vec<u8>>,
    row: u32,
    cells: &BTreeMap<u16, CellPatch>,
) -> XmlResult<()> {
    let mut pending = cells.iter().peekable();
    let mut buf = Vec::new();
    let mut skip = Vec::new();
    let mut next_col = 0;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if local_name(e.name().as_ref()) == b"c" => {
                let col = cell_column(&e).unwrap_or(next_col);
                next_col = col.saturating_add(1);
                flush_cells_before(writer, &mut pending, row, col)?;
                if let Some(patch) = take_cell(&mut pending, col) {
                    write_cell(writer, row, col, patch)?;
                    let end = e.name().as_ref().to_vec();
                    reader.read_to_end_into(QName(&end), &mut skip)?;
                    skip.clear();
                } else {
                    writer.write_event(Event::Start(with_cell_ref(e, row, col)?))?;
                }
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"c" => {
                let col = cell_column(&e).unwrap_or(next_col);
                next_col = col.saturating_add(1);
                flush_cells_before(writer, &mut pending, row, col)?;
                match take_cell(&mut pending, col) {
                    Some(patch) => write_cell(writer, row, col, patch)?,
                    None => writer.write_event(Event::Empty(with_cell_ref(e, row, col)?))?,
                }
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"row" => {
                for (&col, patch) in pending.by_ref() {
                    write_cell(writer, row, col, patch)?;
                }
                writer.write_event(Event::End(e))?;
                return Ok(());
            }
            Event::Eof => return Err(unexpected_eof("row")),
            ev => writer.write_event(ev)?,
        }
        buf.clear();
    }
}

fn flush_rows_before(
    writer: &mut Writer<Vec<u8>>,
    pending: &mut PendingRows<'_>,
    row: u32,
) -> XmlResult<()> {
    while let Some((&next, cells)) = pending.next_if(|(&next, _)| next < row) {
        write_new_row(writer, next, cells)?;
    }
    Ok(())
}

fn take_row<'p>(
    pending: &mut PendingRows<'p>,
    row: u32,
) -> Option<&'p BTreeMap<u16, CellPatch>> {
    pending.next_if(|(&next, _)| next == row).map(|(_, cells)| cells)
}

fn flush_cells_before<'p>(
    writer: &mut Writer<Vec<u8>>,
    pending: &mut Peekable<impl Iterator<Item = (&'p u16, &'p CellPatch)>>,
    row: u32,
    col: u16,
) -> XmlResult<()> {
    while let Some((&next, patch)) = pending.next_if(|(&next, _)| next < col) {
        write_cell(writer, row, next, patch)?;
    }
    Ok(())
}

fn take_cell<'p>(
    pending: &mut Peekable<impl Iterator<Item = (&'p u16, &'p CellPatch)>>,
    col: u16,
) -> Option<&'p CellPatch> {
    pending.next_if(|(&next, _)| next == col).map(|(_, patch)| patch)
}

fn write_new_row(
    writer: &mut Writer<Vec<u8>>,
    row: u32,
    cells: &BTreeMap<u16, CellPatch>,
) -> XmlResult<()> {
    let start = element("row", &[("r".to_string(), row.to_string())]);
    writer.write_event(Event::Start(start))?;
    for (&col, patch) in cells {
        write_cell(writer, row, col, patch)?;
    }
    writer.write_event(Event::End(BytesEnd::new("row")))?;
    Ok(())
}

/// Text is written inline so the shared string table stays untouched.
fn write_cell(writer: &mut Writer<Vec<u8>>, row: u32, col: u16, patch: &CellPatch) -> XmlResult<()> {
    let mut pairs = vec![("r".to_string(), cell_ref(row, col))];
    if patch.xf != 0 {
        pairs.push(("s".to_string(), patch.xf.to_string()));
    }

    match &patch.value {
        CellValue::Empty => {
            writer.write_event(Event::Empty(element("c", &pairs)))?;
        }
        CellValue::Number(n) => {
            writer.write_event(Event::Start(element("c", &pairs)))?;
            write_text_element(writer, "v", &format_number(*n))?;
            writer.write_event(Event::End(BytesEnd::new("c")))?;
        }
        // Converted to a serial before patching
        CellValue::Date(dt) => {
            let serial = excel_serial(dt).unwrap_or_default();
            writer.write_event(Event::Start(element("c", &pairs)))?;
            write_text_element(writer, "v", &format_number(serial))?;
            writer.write_event(Event::End(BytesEnd::new("c")))?;
        }
        CellValue::Bool(b) => {
            set_pair(&mut pairs, "t", "b");
            writer.write_event(Event::Start(element("c", &pairs)))?;
            write_text_element(writer, "v", if *b { "1" } else { "0" })?;
            writer.write_event(Event::End(BytesEnd::new("c")))?;
        }
        CellValue::Text(s) => {
            set_pair(&mut pairs, "t", "inlineStr");
            writer.write_event(Event::Start(element("c", &pairs)))?;
            writer.write_event(Event::Start(BytesStart::new("is")))?;
            let mut t = BytesStart::new("t");
            if s.trim() != s {
                t.push_attribute(("xml:space", "preserve"));
            }
            writer.write_event(Event::Start(t))?;
            writer.write_event(Event::Text(BytesText::new(s)))?;
            writer.write_event(Event::End(BytesEnd::new("t")))?;
            writer.write_event(Event::End(BytesEnd::new("is")))?;
            writer.write_event(Event::End(BytesEnd::new("c")))?;
        }
        CellValue::Formula { formula, cached } => {
            let numeric = cached.as_deref().and_then(|c| c.parse::<f64>().ok());
            if cached.is_some() && numeric.is_none() {
                set_pair(&mut pairs, "t", "str");
            }
            writer.write_event(Event::Start(element("c", &pairs)))?;
            write_text_element(writer, "f", formula)?;
            if let Some(result) = cached {
                write_text_element(writer, "v", result)?;
            }
            writer.write_event(Event::End(BytesEnd::new("c")))?;
        }
    }
    Ok(())
}

fn write_text_element(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> XmlResult<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn with_cell_ref(e: BytesStart<'_>, row: u32, col: u16) -> XmlResult<BytesStart<'_>> {
    if attr(&e, b"r").is_some() {
        return Ok(e);
    }
    rewrite(&e, &[("r", &cell_ref(row, col))], &[])
}

// ═══════════════════════════════════════════════════════════════════════════
// COLUMNS
// ═══════════════════════════════════════════════════════════════════════════

fn read_cols<R: std::io::BufRead>(reader: &mut Reader<R>) -> XmlResult<Vec<Vec<(String, String)>>> {
    let mut buf = Vec::new();
    let mut cols = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if local_name(e.name().as_ref()) == b"col" => {
                cols.push(attrs(&e)?);
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"cols" => return Ok(cols),
            Event::Eof => return Err(unexpected_eof("cols")),
            _ => {}
        }
        buf.clear();
    }
}

fn col_bound(col: &[(String, String)], key: &str) -> Option<u32> {
    col.iter()
        .find(|(k, _)| k == key)
        .and_then(|(_, v)| v.parse().ok())
}

/// Apply width edits to `<col>` ranges, splitting a range around an edited
/// column so its neighbours keep their settings.
fn merge_cols(
    mut cols: Vec<Vec<(String, String)>>,
    widths: &BTreeMap<u16, f64>,
) -> Vec<Vec<(String, String)>> {
    for (&col, &width) in widths {
        let target = u32::from(col) + 1;
        let width = format_number(width);
        let found = cols.iter().position(|c| {
            matches!((col_bound(c, "min"), col_bound(c, "max")), (Some(min), Some(max)) if min <= target && target <= max)
        });

        match found {
            Some(i) => {
                let original = cols.remove(i);
                let (min, max) = (
                    col_bound(&original, "min").unwrap_or(target),
                    col_bound(&original, "max").unwrap_or(target),
                );
                let span = |lo: u32, hi: u32| {
                    let mut c = original.clone();
                    set_pair(&mut c, "min", &lo.to_string());
                    set_pair(&mut c, "max", &hi.to_string());
                    c
                };
                if min < target {
                    cols.push(span(min, target - 1));
                }
                let mut edited = span(target, target);
                set_pair(&mut edited, "width", &width);
                set_pair(&mut edited, "customWidth", "1");
                cols.push(edited);
                if target < max {
                    cols.push(span(target + 1, max));
                }
            }
            None => cols.push(vec![
                ("min".to_string(), target.to_string()),
                ("max".to_string(), target.to_string()),
                ("width".to_string(), width),
                ("customWidth".to_string(), "1".to_string()),
            ]),
        }
    }
    cols.sort_by_key(|c| col_bound(c, "min").unwrap_or(0));
    cols
}

fn write_cols(writer: &mut Writer<Vec<u8>>, cols: Vec<Vec<(String, String)>>) -> XmlResult<()> {
    if cols.is_empty() {
        return Ok(());
    }
    writer.write_event(Event::Start(BytesStart::new("cols")))?;
    for col in &cols {
        writer.write_event(Event::Empty(element("col", col)))?;
    }
    writer.write_event(Event::End(BytesEnd::new("cols")))?;
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
// REFERENCES
// ═══════════════════════════════════════════════════════════════════════════

/// `A1`-style reference for a 1-based row and 0-based column.
fn cell_ref(row: u32, col: u16) -> String {
    format!("{}{}", column_letter(col), row)
}

fn row_number(e: &BytesStart<'_>, implicit: u32) -> u32 {
    attr(e, b"r")
        .and_then(|r| r.parse().ok())
        .unwrap_or(implicit)
}

fn cell_column(e: &BytesStart<'_>) -> Option<u16> {
    attr(e, b"r")
        .as_deref()
        .and_then(cell_position)
        .map(|(_, col)| col)
}

/// The sheet's used range widened to cover every patched cell.
fn merged_dimension(existing: Option<&str>, rows: &RowPatches) -> String {
    // 1-based rows throughout, like the patches
    let position = |r: &str| cell_position(r).map(|(row, col)| (row + 1, col));
    let mut bounds: Option<((u32, u16), (u32, u16))> = existing.and_then(|r| {
        let mut ends = r.split(':');
        let start = position(ends.next()?)?;
        let end = ends.next().map_or(Some(start), position)?;
        Some((start, end))
    });
    for (&row, cells) in rows {
        for &col in cells.keys() {
            bounds = Some(match bounds {
                None => ((row, col), (row, col)),
                Some(((r0, c0), (r1, c1))) => {
                    ((r0.min(row), c0.min(col)), (r1.max(row), c1.max(col)))
                }
            });
        }
    }
    match bounds {
        Some((start, end)) if start == end => cell_ref(start.0, start.1),
        Some((start, end)) => format!("{}:{}", cell_ref(start.0, start.1), cell_ref(end.0, end.1)),
        None => existing.unwrap_or("A1").to_string(),
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn unexpected_eof(element: &str) -> quick_xml::Error {
    std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        format!("<{}> is not closed", element),
    )
    .into()
}
