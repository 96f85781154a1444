//! In-memory workbook model shared by the importer, the roster logic and the
//! exporter.
//!
//! Coordinates are 0-based (`row`, `col`) like calamine ranges; row 0 is the
//! spreadsheet's row 1.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use crate::excel::package::XlsxPackage;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

/// Number format for session dates in row 1 (e.g. `23-Jan`).
pub const SESSION_DATE_FORMAT: &str = "d-mmm";
pub const DATE_FORMAT: &str = "yyyy-mm-dd";
/// Plain integer format for attendance cells.
pub const INTEGER_FORMAT: &str = "0";

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDateTime),
    /// Formula text without the leading `=`, plus its last computed value.
    Formula {
        formula: String,
        cached: Option<String>,
    },
}

impl CellValue {
    /// Blank means no value or only whitespace.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Trimmed display text, the way a header or email cell is read.
    pub fn to_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.trim().to_string(),
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                format!("{}", *n as i64)
            }
            CellValue::Number(n) => n.to_string(),
            CellValue::Bool(b) => b.to_string().to_uppercase(),
            CellValue::Date(dt) if dt.time() == NaiveTime::MIN => {
                dt.date().format("%Y-%m-%d").to_string()
            }
            CellValue::Date(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            CellValue::Formula { cached, .. } => {
                cached.as_deref().unwrap_or_default().trim().to_string()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VAlign {
    Top,
    Center,
    Bottom,
}

/// Cell format: the workbook's own format record plus the attributes this
/// crate sets on top of it.
///
/// `xf` indexes the master's `cellXfs` table, so font, fill, border and
/// protection come from the file untouched. The override fields replace only
/// the number format and alignment of that record when the cell is written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CellStyle {
    pub xf: u32,
    pub num_format: Option<String>,
    pub h_align: Option<HAlign>,
    pub v_align: Option<VAlign>,
}

impl CellStyle {
    pub fn is_default(&self) -> bool {
        self == &CellStyle::default()
    }

    pub fn with_xf(xf: u32) -> Self {
        Self {
            xf,
            ..Self::default()
        }
    }

    /// True when the cell needs a format record other than `xf`.
    pub fn has_overrides(&self) -> bool {
        self.num_format.is_some() || self.h_align.is_some() || self.v_align.is_some()
    }

    /// Integer format, centred both ways, on the default format record.
    pub fn attendance() -> Self {
        let mut style = Self::default();
        style.apply_attendance();
        style
    }

    /// Integer format, centred both ways. Font, fill and border stay.
    pub fn apply_attendance(&mut self) {
        self.num_format = Some(INTEGER_FORMAT.to_string());
        self.h_align = Some(HAlign::Center);
        self.v_align = Some(VAlign::Center);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub value: CellValue,
    pub style: CellStyle,
}

impl Cell {
    pub fn new(value: CellValue) -> Self {
        Self {
            value,
            style: CellStyle::default(),
        }
    }
}

static EMPTY: CellValue = CellValue::Empty;

/// One worksheet. Every change that alters a cell or a column width is
/// recorded so the exporter rewrites only those parts of the file.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    cells: BTreeMap<(u32, u16), Cell>,
    column_widths: BTreeMap<u16, f64>,
    edited: BTreeSet<(u32, u16)>,
    edited_widths: BTreeSet<u16>,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cells: BTreeMap::new(),
            column_widths: BTreeMap::new(),
            edited: BTreeSet::new(),
            edited_widths: BTreeSet::new(),
        }
    }

    pub fn cell(&self, row: u32, col: u16) -> Option<&Cell> {
        self.cells.get(&(row, col))
    }

    pub fn value(&self, row: u32, col: u16) -> &CellValue {
        self.cells
            .get(&(row, col))
            .map(|c| &c.value)
            .unwrap_or(&EMPTY)
    }

    pub fn text(&self, row: u32, col: u16) -> String {
        self.value(row, col).to_text()
    }

    pub fn is_blank(&self, row: u32, col: u16) -> bool {
        self.value(row, col).is_blank()
    }

    /// Replace the value, keeping any style already on the cell.
    pub fn set_value(&mut self, row: u32, col: u16, value: CellValue) {
        let cell = self
            .cells
            .entry((row, col))
            .or_insert_with(|| Cell::new(CellValue::Empty));
        if cell.value != value {
            cell.value = value;
            self.edited.insert((row, col));
        }
    }

    /// Style of the cell, or the default style when there is no cell.
    pub fn style(&self, row: u32, col: u16) -> CellStyle {
        self.cells
            .get(&(row, col))
            .map(|c| c.style.clone())
            .unwrap_or_default()
    }

    pub fn set_style(&mut self, row: u32, col: u16, style: CellStyle) {
        let cell = self
            .cells
            .entry((row, col))
            .or_insert_with(|| Cell::new(CellValue::Empty));
        if cell.style != style {
            cell.style = style;
            self.edited.insert((row, col));
        }
    }

    /// Edit the style in place; the cell is recorded only if it changed.
    pub fn update_style(&mut self, row: u32, col: u16, edit: impl FnOnce(&mut CellStyle)) {
        let mut style = self.style(row, col);
        edit(&mut style);
        self.set_style(row, col, style);
    }

    /// Cells changed since import, in row-major order.
    pub fn edited_cells(&self) -> impl Iterator<Item = (u32, u16)> + '_ {
        self.edited.iter().copied()
    }

    pub fn edited_widths(&self) -> impl Iterator<Item = (u16, f64)> + '_ {
        self.edited_widths
            .iter()
            .filter_map(|&col| self.column_width(col).map(|w| (col, w)))
    }

    pub fn has_edits(&self) -> bool {
        !self.edited.is_empty() || !self.edited_widths.is_empty()
    }

    /// Forget recorded edits; the current state becomes the baseline.
    pub fn mark_clean(&mut self) {
        self.edited.clear();
        self.edited_widths.clear();
    }

    /// Cells of one row in column order.
    pub fn row_cells(&self, row: u32) -> impl Iterator<Item = (u16, &Cell)> {
        self.cells
            .range((Bound::Included((row, 0)), Bound::Included((row, u16::MAX))))
            .map(|(&(_, col), cell)| (col, cell))
    }

    pub fn cells(&self) -> impl Iterator<Item = ((u32, u16), &Cell)> {
        self.cells.iter().map(|(&pos, cell)| (pos, cell))
    }

    /// Last row holding any cell, styled-but-empty ones included.
    pub fn last_row(&self) -> Option<u32> {
        self.cells.keys().next_back().map(|&(row, _)| row)
    }

    /// Last row holding a non-blank value.
    pub fn last_value_row(&self) -> Option<u32> {
        self.cells
            .iter()
            .rev()
            .find(|(_, cell)| !cell.value.is_blank())
            .map(|(&(row, _), _)| row)
    }

    pub fn last_col(&self) -> Option<u16> {
        self.cells.keys().map(|&(_, col)| col).max()
    }

    /// Last column with a non-blank value in any of `rows`.
    pub fn last_value_col_in_rows(&self, rows: &[u32]) -> Option<u16> {
        rows.iter()
            .flat_map(|&row| {
                self.row_cells(row)
                    .filter(|(_, cell)| !cell.value.is_blank())
                    .map(|(col, _)| col)
            })
            .max()
    }

    pub fn set_column_width(&mut self, col: u16, width: f64) {
        if self.column_widths.insert(col, width) != Some(width) {
            self.edited_widths.insert(col);
        }
    }

    pub fn column_width(&self, col: u16) -> Option<f64> {
        self.column_widths.get(&col).copied()
    }

    pub fn column_widths(&self) -> impl Iterator<Item = (u16, f64)> + '_ {
        self.column_widths.iter().map(|(&col, &w)| (col, w))
    }

    /// Clone the full style of `src` onto `dst` for columns `0..=last_col`:
    /// the format record and any overrides. Values in `dst` are untouched.
    pub fn copy_row_style(&mut self, src: u32, dst: u32, last_col: u16) {
        let styles: Vec<(u16, CellStyle)> = self
            .row_cells(src)
            .filter(|(col, cell)| *col <= last_col && !cell.style.is_default())
            .map(|(col, cell)| (col, cell.style.clone()))
            .collect();
        for (col, style) in styles {
            self.set_style(dst, col, style);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
    /// Index of the tab that was selected when the file was saved.
    pub active: usize,
    /// The file the workbook was read from. Export patches this package.
    pub package: Option<XlsxPackage>,
}

impl Workbook {
    pub fn new(sheets: Vec<Sheet>) -> Self {
        Self {
            sheets,
            ..Self::default()
        }
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.sheets.iter().position(|s| s.name == name)
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }
}

/// Serials below this count from one day later: Excel keeps a 29 Feb 1900
/// that never existed at serial 60.
const FIRST_SERIAL_AFTER_LEAP_BUG: f64 = 61.0;

fn excel_epoch(before_leap_bug: bool) -> Option<NaiveDateTime> {
    let day = if before_leap_bug { 31 } else { 30 };
    NaiveDate::from_ymd_opt(1899, 12, day).map(|d| d.and_time(NaiveTime::MIN))
}

/// Excel serial number (1900 date system) for a timestamp.
pub fn excel_serial(dt: &NaiveDateTime) -> Option<f64> {
    let serial = |epoch: NaiveDateTime| (*dt - epoch).num_milliseconds() as f64 / 86_400_000.0;
    let modern = serial(excel_epoch(false)?);
    if modern >= FIRST_SERIAL_AFTER_LEAP_BUG {
        Some(modern)
    } else {
        Some(serial(excel_epoch(true)?))
    }
}

/// Calendar date for an Excel serial number; the time of day is dropped.
pub fn date_from_serial(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 || serial > 2_958_465.0 {
        return None;
    }
    let epoch = excel_epoch(serial < FIRST_SERIAL_AFTER_LEAP_BUG)?;
    let days = chrono::Duration::days(serial.floor() as i64);
    epoch.checked_add_signed(days).map(|dt| dt.date())
}

/// Convert column index to Excel column letter (0→A, 1→B, 25→Z, 26→AA, etc.)
pub fn column_letter(col: u16) -> String {
    let mut result = String::new();
    let mut num = col as u32;

    loop {
        let remainder = num % 26;
        result.insert(0, (b'A' + remainder as u8) as char);
        if num < 26 {
            break;
        }
        num = num / 26 - 1;
    }

    result
}

/// 0-based `(row, col)` of an `A1`-style reference.
pub fn cell_position(reference: &str) -> Option<(u32, u16)> {
    let digits = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, number) = reference.split_at(digits);
    let col = letters.bytes().try_fold(0u32, |acc, b| {
        b.is_ascii_alphabetic()
            .then(|| acc * 26 + u32::from(b.to_ascii_uppercase() - b'A' + 1))
    })?;
    let row: u32 = number.parse().ok()?;
    Some((row.checked_sub(1)?, u16::try_from(col.checked_sub(1)?).ok()?))
}
