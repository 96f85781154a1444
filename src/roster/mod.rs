//! Master roster loading and indexing.
//!
//! Layout of the roster worksheet:
//! - row 1: session dates above lecture columns, identity headers elsewhere
//! - row 2: `Lecture <N>` labels
//! - row 3+: one student per row

pub mod lecture;
pub mod merge;

pub use lecture::{lecture_columns, resolve_lecture_column, LectureColumn, LectureHeader};
pub use merge::{merge_poll, MergeCounts};

use crate::config::{HeaderLabels, ReconcileOptions};
use crate::error::{RollCallError, RollCallResult};
use crate::excel::{ExcelImporter, Sheet, Workbook};
use crate::headers::HeaderIndex;
use crate::poll::normalize_email;
use std::collections::HashMap;
use tracing::{info, warn};

pub const DATE_ROW: u32 = 0;
pub const LABEL_ROW: u32 = 1;
pub const FIRST_STUDENT_ROW: u32 = 2;

/// Identity columns located in row 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RosterColumns {
    pub email: u16,
    pub full_name: Option<u16>,
    pub sortable_name: Option<u16>,
}

impl RosterColumns {
    pub fn locate(sheet: &Sheet, labels: &HeaderLabels) -> RollCallResult<Self> {
        let headers = HeaderIndex::new(
            sheet
                .row_cells(DATE_ROW)
                .map(|(col, cell)| (col as usize, cell.value.to_text())),
        );
        let find = |name: &str| headers.find(name).map(|c| c as u16);

        let email = find(&labels.email).ok_or_else(|| RollCallError::MissingEmailColumn {
            column: labels.email.clone(),
        })?;
        Ok(Self {
            email,
            full_name: find(&labels.full_name),
            sortable_name: find(&labels.sortable_name),
        })
    }
}

/// A loaded roster workbook with its student index.
#[derive(Debug, Clone)]
pub struct MasterRoster {
    workbook: Workbook,
    sheet_idx: usize,
    columns: RosterColumns,
    index: HashMap<String, u32>,
    duplicates: Vec<String>,
}

impl MasterRoster {
    /// Decode `bytes` and index the roster worksheet.
    pub fn load(bytes: &[u8], options: &ReconcileOptions) -> RollCallResult<Self> {
        let workbook = ExcelImporter::new(bytes).import()?;
        Self::from_workbook(workbook, options)
    }

    pub fn from_workbook(workbook: Workbook, options: &ReconcileOptions) -> RollCallResult<Self> {
        let sheet_idx = match &options.sheet {
            Some(name) => workbook.position(name).ok_or_else(|| {
                RollCallError::Config(format!(
                    "worksheet '{}' not found (available: {})",
                    name,
                    workbook.sheet_names().join(", ")
                ))
            })?,
            // The tab the workbook was saved on
            None => workbook.active.min(workbook.sheets.len().saturating_sub(1)),
        };
        let sheet = workbook
            .sheets
            .get(sheet_idx)
            .ok_or_else(|| RollCallError::MasterRead("workbook has no worksheets".to_string()))?;

        let columns = RosterColumns::locate(sheet, &options.labels)?;

        let mut index = HashMap::new();
        let mut duplicates = Vec::new();
        for row in FIRST_STUDENT_ROW..=sheet.last_row().unwrap_or(0) {
            if sheet.is_blank(row, columns.email) {
                continue;
            }
            let email = normalize_email(&sheet.text(row, columns.email));
            if let Some(previous) = index.insert(email.clone(), row) {
                warn!(%email, first_row = previous + 1, row = row + 1, "duplicate email in master");
                duplicates.push(email);
            }
        }

        info!(
            sheet = %sheet.name,
            students = index.len(),
            email_col = columns.email,
            "indexed master roster"
        );

        Ok(Self {
            workbook,
            sheet_idx,
            columns,
            index,
            duplicates,
        })
    }

    pub fn sheet(&self) -> &Sheet {
        &self.workbook.sheets[self.sheet_idx]
    }

    pub fn sheet_mut(&mut self) -> &mut Sheet {
        &mut self.workbook.sheets[self.sheet_idx]
    }

    pub fn workbook(&self) -> &Workbook {
        &self.workbook
    }

    pub fn columns(&self) -> RosterColumns {
        self.columns
    }

    pub fn row_of(&self, email: &str) -> Option<u32> {
        self.index.get(email).copied()
    }

    pub fn contains(&self, email: &str) -> bool {
        self.index.contains_key(email)
    }

    pub fn student_count(&self) -> usize {
        self.index.len()
    }

    /// Emails already duplicated in the master when it was loaded.
    pub fn duplicate_emails(&self) -> &[String] {
        &self.duplicates
    }

    /// Indexed students ordered by row.
    pub fn students(&self) -> Vec<(String, u32)> {
        let mut students: Vec<(String, u32)> = self
            .index
            .iter()
            .map(|(email, &row)| (email.clone(), row))
            .collect();
        students.sort_by_key(|&(_, row)| row);
        students
    }

    /// Last row carrying an email, if any student exists.
    pub fn last_student_row(&self) -> Option<u32> {
        self.index.values().max().copied()
    }

    /// First free row below everything populated in the student region.
    pub fn next_append_row(&self) -> u32 {
        match self.sheet().last_value_row() {
            Some(row) if row >= FIRST_STUDENT_ROW => row + 1,
            _ => FIRST_STUDENT_ROW,
        }
    }

    pub(crate) fn register(&mut self, email: String, row: u32) {
        self.index.insert(email, row);
    }
}
