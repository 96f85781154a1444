//! One-shot reconciliation: poll export + master roster in, updated roster
//! bytes and a summary out.
//!
//! Every input failure surfaces before the roster is touched, and all edits
//! happen on a model decoded from the caller's bytes, so a failed run never
//! yields a partial artifact.

use crate::config::ReconcileOptions;
use crate::error::RollCallResult;
use crate::excel::model::column_letter;
use crate::excel::ExcelExporter;
use crate::poll::{load_poll, PollExport};
use crate::roster::{merge_poll, resolve_lecture_column, MasterRoster, MergeCounts};
use crate::types::LectureSession;
use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use tracing::info;

/// Updated roster workbook plus what was done to it.
#[derive(Debug, Clone)]
pub struct Reconciled {
    pub artifact: Vec<u8>,
    pub summary: Summary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub lecture: String,
    pub date: NaiveDate,
    /// Spreadsheet letter of the lecture column, e.g. `F`.
    pub column: String,
    pub column_created: bool,
    pub presence: String,
    pub backfill_names: bool,
    #[serde(flatten)]
    pub counts: MergeCounts,
    pub warnings: Vec<String>,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Success. Used column '{}' dated {}. \
             Present=1 set for {} students ({}). \
             Absent=0 written for {} blank cells. \
             Added {} new students.",
            self.lecture,
            self.date.format("%b %d, %Y"),
            self.counts.present,
            self.presence,
            self.counts.absent_written,
            self.counts.appended,
        )?;
        if self.backfill_names {
            write!(f, " Backfilled {} name cells.", self.counts.backfilled)?;
        }
        for warning in &self.warnings {
            write!(f, "\nWarning: {}", warning)?;
        }
        Ok(())
    }
}

/// Merge `poll` into the roster workbook `master` for `session`.
pub fn reconcile(
    master: &[u8],
    poll: &PollExport<'_>,
    session: &LectureSession,
    options: &ReconcileOptions,
) -> RollCallResult<Reconciled> {
    let poll_roster = load_poll(poll, &options.presence, &options.labels)?;
    let mut roster = MasterRoster::load(master, options)?;

    let mut warnings: Vec<String> = roster
        .duplicate_emails()
        .iter()
        .map(|email| {
            format!(
                "'{}' appears on more than one row of the Master Sheet; only the last row was updated.",
                email
            )
        })
        .collect();

    let resolved = resolve_lecture_column(roster.sheet_mut(), session);
    if let Some(candidates) = &resolved.ambiguous {
        let letters: Vec<String> = candidates.iter().map(|&c| column_letter(c)).collect();
        warnings.push(format!(
            "several columns are labelled '{}' ({}) and none is dated {}; used column {}.",
            session.label(),
            letters.join(", "),
            session.date.format("%b %d, %Y"),
            column_letter(resolved.col)
        ));
    }

    let counts = merge_poll(
        &mut roster,
        &poll_roster,
        resolved.col,
        options.backfill_names,
    );

    let artifact = ExcelExporter::new(roster.workbook()).export()?;

    let summary = Summary {
        lecture: session.label(),
        date: session.date,
        column: column_letter(resolved.col),
        column_created: resolved.created,
        presence: options.presence.describe().to_string(),
        backfill_names: options.backfill_names,
        counts,
        warnings,
    };
    info!(lecture = %summary.lecture, column = %summary.column, bytes = artifact.len(), "reconciled");

    Ok(Reconciled { artifact, summary })
}
