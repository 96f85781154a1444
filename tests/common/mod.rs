//! Shared fixtures: roster workbooks built in memory and artifact readers.

#![allow(dead_code)]

use calamine::{open_workbook_from_rs, Data, Range, Reader, Xlsx};
use quick_xml::events::Event;
use rust_xlsxwriter::{Format, Formula, Workbook};
use std::io::{Cursor, Read};

/// Excel serial of 2025-01-21.
pub const LECTURE_1_SERIAL: f64 = 45678.0;

pub const FULL_NAME_COL: u16 = 0;
pub const SORTABLE_COL: u16 = 1;
pub const EMAIL_COL: u16 = 2;
pub const LECTURE_1_COL: u16 = 3;

/// One roster student: names, email and the current Lecture 1 cell.
pub struct Student<'a> {
    pub full_name: &'a str,
    pub sortable_name: &'a str,
    pub email: &'a str,
    pub lecture_1: Mark<'a>,
}

pub enum Mark<'a> {
    Blank,
    Number(f64),
    Text(&'a str),
}

pub fn student<'a>(email: &'a str, lecture_1: Mark<'a>) -> Student<'a> {
    Student {
        full_name: "",
        sortable_name: "",
        email,
        lecture_1,
    }
}

/// Roster sheet `Roster`:
///
/// | Full name | Sortable name | Email | 21-Jan    |
/// |           |               |       | Lecture 1 |
/// | one row per student                           |
///
/// plus a `Notes` sheet holding a formula.
pub fn master_xlsx(students: &[Student<'_>]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    let date_format = Format::new().set_num_format("d-mmm");

    let roster = workbook.add_worksheet();
    roster.set_name("Roster").unwrap();
    roster.write_string(0, FULL_NAME_COL, "Full name").unwrap();
    roster.write_string(0, SORTABLE_COL, "Sortable name").unwrap();
    roster.write_string(0, EMAIL_COL, "Email").unwrap();
    roster
        .write_number_with_format(0, LECTURE_1_COL, LECTURE_1_SERIAL, &date_format)
        .unwrap();
    roster.write_string(1, LECTURE_1_COL, "Lecture 1").unwrap();

    for (i, s) in students.iter().enumerate() {
        let row = 2 + i as u32;
        if !s.full_name.is_empty() {
            roster.write_string(row, FULL_NAME_COL, s.full_name).unwrap();
        }
        if !s.sortable_name.is_empty() {
            roster.write_string(row, SORTABLE_COL, s.sortable_name).unwrap();
        }
        roster.write_string(row, EMAIL_COL, s.email).unwrap();
        match s.lecture_1 {
            Mark::Blank => {}
            Mark::Number(n) => {
                roster.write_number(row, LECTURE_1_COL, n).unwrap();
            }
            Mark::Text(t) => {
                roster.write_string(row, LECTURE_1_COL, t).unwrap();
            }
        }
    }

    let notes = workbook.add_worksheet();
    notes.set_name("Notes").unwrap();
    notes.write_string(0, 0, "Total").unwrap();
    notes
        .write_formula(0, 1, Formula::new("=SUM(2,3)").set_result("5"))
        .unwrap();

    workbook.save_to_buffer().unwrap()
}

/// Decoded artifact with absolute-coordinate lookups.
pub struct Artifact {
    pub workbook: Xlsx<Cursor<Vec<u8>>>,
}

impl Artifact {
    pub fn open(bytes: Vec<u8>) -> Self {
        let workbook = open_workbook_from_rs(Cursor::new(bytes)).unwrap();
        Self { workbook }
    }

    pub fn range(&mut self, sheet: &str) -> Range<Data> {
        self.workbook.worksheet_range(sheet).unwrap()
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.workbook.sheet_names().to_vec()
    }
}

/// Cell at 0-based absolute coordinates, `Data::Empty` when unset.
pub fn cell(range: &Range<Data>, row: u32, col: u16) -> Data {
    range
        .get_value((row, col as u32))
        .cloned()
        .unwrap_or(Data::Empty)
}

/// Cell as text, trimmed; integral floats print without a fraction.
pub fn text(range: &Range<Data>, row: u32, col: u16) -> String {
    match cell(range, row, col) {
        Data::Empty => String::new(),
        Data::Float(f) if f.fract() == 0.0 => format!("{}", f as i64),
        Data::Int(i) => i.to_string(),
        other => other.to_string().trim().to_string(),
    }
}

/// Numeric cell value, if the cell is a number.
pub fn number(range: &Range<Data>, row: u32, col: u16) -> Option<f64> {
    match cell(range, row, col) {
        Data::Float(f) => Some(f),
        Data::Int(i) => Some(i as f64),
        _ => None,
    }
}

/// Row of `email` in the email column.
pub fn row_of(range: &Range<Data>, email: &str) -> Option<u32> {
    let (_, end) = (range.start()?, range.end()?);
    (0..=end.0).find(|&row| text(range, row, EMAIL_COL).eq_ignore_ascii_case(email))
}

/// Columns of row 2 whose text equals `label`.
pub fn label_columns(range: &Range<Data>, label: &str) -> Vec<u16> {
    let Some(end) = range.end() else {
        return Vec::new();
    };
    (0..=end.1 as u16)
        .filter(|&col| text(range, 1, col) == label)
        .collect()
}

/// Attendance mark as a number, whatever display format the cell carries.
pub fn mark(range: &Range<Data>, row: u32, col: u16) -> Option<f64> {
    match cell(range, row, col) {
        Data::DateTime(dt) => Some(dt.as_f64()),
        _ => number(range, row, col),
    }
}

/// Raw text of one zip part of an .xlsx file.
pub fn xlsx_part(bytes: &[u8], name: &str) -> String {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut file = archive.by_name(name).unwrap();
    let mut text = String::new();
    file.read_to_string(&mut text).unwrap();
    text
}

/// The element starting with `prefix`, up to its first `>`.
pub fn tag<'a>(xml: &'a str, prefix: &str) -> Option<&'a str> {
    let start = xml.find(prefix)?;
    let end = xml[start..].find('>')?;
    Some(&xml[start..=start + end])
}

/// The `<name ...>...</name>` block of `xml`.
pub fn block<'a>(xml: &'a str, name: &str) -> Option<&'a str> {
    let start = xml.find(&format!("<{name}"))?;
    let close = format!("</{name}>");
    let end = xml[start..].find(&close)?;
    Some(&xml[start..start + end + close.len()])
}

/// Attributes of each `cellXfs` record in a styles part.
pub fn cell_xfs(styles: &str) -> Vec<Vec<(String, String)>> {
    let mut reader = quick_xml::Reader::from_str(styles);
    let mut in_cell_xfs = false;
    let mut xfs = Vec::new();
    loop {
        match reader.read_event().unwrap() {
            Event::Start(e) if e.name().as_ref() == b"cellXfs" => in_cell_xfs = true,
            Event::End(e) if e.name().as_ref() == b"cellXfs" => in_cell_xfs = false,
            Event::Start(e) | Event::Empty(e) if in_cell_xfs && e.name().as_ref() == b"xf" => {
                let attrs = e
                    .attributes()
                    .map(|a| {
                        let a = a.unwrap();
                        (
                            String::from_utf8(a.key.as_ref().to_vec()).unwrap(),
                            a.decode_and_unescape_value(e.decoder()).unwrap().into_owned(),
                        )
                    })
                    .collect();
                xfs.push(attrs);
            }
            Event::Eof => break,
            _ => {}
        }
    }
    xfs
}

/// Value of `key` in one record from [`cell_xfs`].
pub fn xf_attr<'a>(xf: &'a [(String, String)], key: &str) -> Option<&'a str> {
    xf.iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}
