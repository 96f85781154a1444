//! Roster merge: append unknown poll students, then reconcile attendance.
//!
//! Write rules for the lecture cell of each indexed student:
//! - present in the poll: always `1`, whatever was there before
//! - otherwise: `0` only into a blank cell; any existing mark stays
//!
//! Name backfill only ever fills blank name cells.

use super::{MasterRoster, FIRST_STUDENT_ROW};
use crate::excel::{CellStyle, CellValue};
use crate::poll::PollRoster;
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeCounts {
    pub present: usize,
    pub absent_written: usize,
    pub appended: usize,
    pub backfilled: usize,
}

/// Merge `poll` into the lecture column `col` of `roster`.
pub fn merge_poll(
    roster: &mut MasterRoster,
    poll: &PollRoster,
    col: u16,
    backfill_names: bool,
) -> MergeCounts {
    let mut counts = MergeCounts {
        appended: append_new_students(roster, poll, col),
        ..MergeCounts::default()
    };

    let columns = roster.columns;
    for (email, row) in roster.students() {
        let sheet = roster.sheet_mut();

        if poll.is_present(&email) {
            write_attendance(sheet, row, col, 1.0);
            counts.present += 1;
        } else if sheet.is_blank(row, col) {
            write_attendance(sheet, row, col, 0.0);
            counts.absent_written += 1;
        }

        if !backfill_names {
            continue;
        }
        let Some(student) = poll.get(&email) else {
            continue;
        };
        for (name_col, name) in [
            (columns.full_name, &student.full_name),
            (columns.sortable_name, &student.sortable_name),
        ] {
            if let Some(name_col) = name_col {
                if sheet.is_blank(row, name_col) && !name.trim().is_empty() {
                    sheet.set_value(row, name_col, CellValue::Text(name.clone()));
                    counts.backfilled += 1;
                }
            }
        }
    }

    info!(
        present = counts.present,
        absent_written = counts.absent_written,
        appended = counts.appended,
        backfilled = counts.backfilled,
        "merged poll into roster"
    );
    counts
}

/// Pass 1: one new row per poll email missing from the roster, styled after
/// the most recent student row and registered in the index.
fn append_new_students(roster: &mut MasterRoster, poll: &PollRoster, col: u16) -> usize {
    let columns = roster.columns;
    let style_row = roster.last_student_row().unwrap_or(FIRST_STUDENT_ROW);
    let mut next_row = roster.next_append_row();
    let mut appended = 0;

    for student in poll.iter() {
        if roster.contains(&student.email) {
            continue;
        }

        let sheet = roster.sheet_mut();
        let last_col = sheet.last_col().unwrap_or(col).max(col);
        sheet.copy_row_style(style_row, next_row, last_col);

        sheet.set_value(
            next_row,
            columns.email,
            CellValue::Text(student.email.clone()),
        );
        if let Some(c) = columns.full_name.filter(|_| !student.full_name.is_empty()) {
            sheet.set_value(next_row, c, CellValue::Text(student.full_name.clone()));
        }
        if let Some(c) = columns
            .sortable_name
            .filter(|_| !student.sortable_name.is_empty())
        {
            sheet.set_value(next_row, c, CellValue::Text(student.sortable_name.clone()));
        }
        let mark = if poll.is_present(&student.email) { 1.0 } else { 0.0 };
        write_attendance(sheet, next_row, col, mark);

        debug!(email = %student.email, row = next_row + 1, "appended student");
        roster.register(student.email.clone(), next_row);
        next_row += 1;
        appended += 1;
    }

    appended
}

fn write_attendance(sheet: &mut crate::excel::Sheet, row: u32, col: u16, mark: f64) {
    sheet.set_value(row, col, CellValue::Number(mark));
    sheet.update_style(row, col, CellStyle::apply_attendance);
}
