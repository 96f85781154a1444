//! Lecture column resolution: find or create the column for one session.

use super::{DATE_ROW, FIRST_STUDENT_ROW, LABEL_ROW};
use crate::excel::model::{date_from_serial, SESSION_DATE_FORMAT};
use crate::excel::{CellStyle, CellValue, Sheet};
use crate::types::LectureSession;
use chrono::{Datelike, NaiveDate, NaiveTime};
use tracing::{debug, info, warn};

pub const LECTURE_COLUMN_WIDTH: f64 = 12.0;

/// Text date layouts accepted in row 1.
const TEXT_DATE_FORMATS: &[&str] = &[
    "%m/%d/%Y",
    "%m/%d/%y",
    "%m-%d-%Y",
    "%Y-%m-%d",
    "%d-%b-%Y",
    "%b %d, %Y",
];

/// Outcome of resolving a session to a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LectureColumn {
    pub col: u16,
    pub created: bool,
    /// Set when several columns carry the label and none has the session
    /// date; holds every candidate column.
    pub ambiguous: Option<Vec<u16>>,
}

/// An existing lecture column as seen in rows 1 and 2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LectureHeader {
    pub col: u16,
    pub label: String,
    pub number: u32,
    pub date: Option<NaiveDate>,
}

/// Find or create the column for `session` and stamp its headers and
/// attendance formatting.
///
/// Resolution is idempotent: a second call with the same session lands on
/// the same column.
pub fn resolve_lecture_column(sheet: &mut Sheet, session: &LectureSession) -> LectureColumn {
    let label = session.label();
    let wanted = label.to_lowercase();

    let matches: Vec<u16> = sheet
        .row_cells(LABEL_ROW)
        .filter(|(_, cell)| cell.value.to_text().to_lowercase() == wanted)
        .map(|(col, _)| col)
        .collect();

    let resolved = match matches.as_slice() {
        [] => {
            // Past the last real header, not past stray formatting
            let col = sheet
                .last_value_col_in_rows(&[DATE_ROW, LABEL_ROW])
                .map(|c| c + 1)
                .unwrap_or(0);
            info!(%label, col, "creating lecture column");
            LectureColumn {
                col,
                created: true,
                ambiguous: None,
            }
        }
        [only] => LectureColumn {
            col: *only,
            created: false,
            ambiguous: None,
        },
        many => match many
            .iter()
            .find(|&&c| date_matches(sheet.value(DATE_ROW, c), session.date))
        {
            Some(&col) => LectureColumn {
                col,
                created: false,
                ambiguous: None,
            },
            None => {
                warn!(
                    %label,
                    candidates = ?many,
                    "several lecture columns share a label and none matches the date; using the first"
                );
                LectureColumn {
                    col: many[0],
                    created: false,
                    ambiguous: Some(many.to_vec()),
                }
            }
        },
    };

    stamp_column(sheet, resolved.col, session);
    debug!(col = resolved.col, created = resolved.created, "resolved lecture column");
    resolved
}

/// Write the date and canonical label and force integer formatting on every
/// student cell of `col`. Each cell keeps its own font, fill and border.
fn stamp_column(sheet: &mut Sheet, col: u16, session: &LectureSession) {
    sheet.set_value(
        DATE_ROW,
        col,
        CellValue::Date(session.date.and_time(NaiveTime::MIN)),
    );
    sheet.update_style(DATE_ROW, col, |style| {
        style.num_format = Some(SESSION_DATE_FORMAT.to_string())
    });
    sheet.set_value(LABEL_ROW, col, CellValue::Text(session.label()));
    sheet.set_column_width(col, LECTURE_COLUMN_WIDTH);

    if let Some(last_row) = sheet.last_row() {
        for row in FIRST_STUDENT_ROW..=last_row {
            sheet.update_style(row, col, CellStyle::apply_attendance);
        }
    }
}

/// Does a row-1 cell hold `target`?
pub fn date_matches(value: &CellValue, target: NaiveDate) -> bool {
    match value {
        CellValue::Date(dt) => dt.date() == target,
        CellValue::Number(serial) => date_from_serial(*serial) == Some(target),
        CellValue::Text(s) => text_date_matches(s.trim(), target),
        CellValue::Formula {
            cached: Some(cached),
            ..
        } => text_date_matches(cached.trim(), target),
        _ => false,
    }
}

fn text_date_matches(s: &str, target: NaiveDate) -> bool {
    if s.is_empty() {
        return false;
    }
    if TEXT_DATE_FORMATS
        .iter()
        .filter_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .any(|d| d == target)
    {
        return true;
    }
    // Day-month without a year ("23-Jan") matches on month and day only
    NaiveDate::parse_from_str(&format!("{}-{}", s, target.year()), "%d-%b-%Y")
        .map(|d| (d.month(), d.day()) == (target.month(), target.day()))
        .unwrap_or(false)
}

/// Every column whose row-2 label reads `Lecture <N>`, in column order.
pub fn lecture_columns(sheet: &Sheet) -> Vec<LectureHeader> {
    sheet
        .row_cells(LABEL_ROW)
        .filter_map(|(col, cell)| {
            let label = cell.value.to_text();
            let rest = label
                .get(..8)
                .filter(|prefix| prefix.eq_ignore_ascii_case("lecture "))
                .map(|_| label[8..].trim())?;
            let number = rest.parse::<u32>().ok()?;
            let date = header_date(sheet.value(DATE_ROW, col));
            Some(LectureHeader {
                col,
                label: label.clone(),
                number,
                date,
            })
        })
        .collect()
}

fn header_date(value: &CellValue) -> Option<NaiveDate> {
    match value {
        CellValue::Date(dt) => Some(dt.date()),
        CellValue::Number(serial) => date_from_serial(*serial),
        CellValue::Text(s) => TEXT_DATE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(s.trim(), fmt).ok()),
        _ => None,
    }
}
