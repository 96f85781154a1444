//! Poll ingestion: turns a poll export into a roster of students keyed by
//! normalized email, plus the set of those who count as present.

mod reader;

pub use reader::{read_poll_table, PollFormat, PollTable};

use crate::config::HeaderLabels;
use crate::error::{RollCallError, RollCallResult};
use crate::types::PresencePolicy;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// An uploaded poll export: its file name selects the decoder.
#[derive(Debug, Clone, Copy)]
pub struct PollExport<'a> {
    pub file_name: &'a str,
    pub bytes: &'a [u8],
}

impl<'a> PollExport<'a> {
    pub fn new(file_name: &'a str, bytes: &'a [u8]) -> Self {
        Self { file_name, bytes }
    }

    pub fn format(&self) -> PollFormat {
        PollFormat::from_file_name(self.file_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollStudent {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub sortable_name: String,
}

impl PollStudent {
    pub fn new(email: String, first_name: &str, last_name: &str) -> Self {
        let (full_name, sortable_name) = make_full_and_sortable(first_name, last_name);
        Self {
            email,
            first_name: first_name.trim().to_string(),
            last_name: last_name.trim().to_string(),
            full_name,
            sortable_name,
        }
    }
}

/// Students from one poll export, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct PollRoster {
    students: Vec<PollStudent>,
    positions: HashMap<String, usize>,
    present: HashSet<String>,
}

impl PollRoster {
    /// Insert or replace the record for `student.email`. A replaced record
    /// keeps its original position.
    pub fn insert(&mut self, student: PollStudent) {
        match self.positions.get(&student.email) {
            Some(&pos) => self.students[pos] = student,
            None => {
                self.positions
                    .insert(student.email.clone(), self.students.len());
                self.students.push(student);
            }
        }
    }

    pub fn mark_present(&mut self, email: &str) {
        self.present.insert(email.to_string());
    }

    pub fn get(&self, email: &str) -> Option<&PollStudent> {
        self.positions.get(email).map(|&pos| &self.students[pos])
    }

    pub fn contains(&self, email: &str) -> bool {
        self.positions.contains_key(email)
    }

    pub fn is_present(&self, email: &str) -> bool {
        self.present.contains(email)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PollStudent> {
        self.students.iter()
    }

    pub fn len(&self) -> usize {
        self.students.len()
    }

    pub fn is_empty(&self) -> bool {
        self.students.is_empty()
    }

    pub fn present_count(&self) -> usize {
        self.present.len()
    }
}

/// Decode and ingest a poll export in one step.
pub fn load_poll(
    export: &PollExport<'_>,
    policy: &PresencePolicy,
    labels: &HeaderLabels,
) -> RollCallResult<PollRoster> {
    let table = read_poll_table(export.bytes, export.format())?;
    ingest_poll(&table, policy, labels)
}

pub fn ingest_poll(
    table: &PollTable,
    policy: &PresencePolicy,
    labels: &HeaderLabels,
) -> RollCallResult<PollRoster> {
    let email_col = table
        .index
        .find(&labels.email)
        .ok_or_else(|| RollCallError::MissingColumn {
            column: labels.email.clone(),
        })?;
    let first_col = table.index.find(&labels.first_name);
    let last_col = table.index.find(&labels.last_name);

    let question_cols = match policy {
        PresencePolicy::Listed => Vec::new(),
        PresencePolicy::Answered { question_match } => {
            let cols = table.index.matching(question_match);
            if cols.is_empty() {
                return Err(RollCallError::NoMatchingColumns {
                    substring: question_match.clone(),
                });
            }
            let matched: Vec<&str> = cols.iter().map(|&c| table.headers[c].as_str()).collect();
            debug!(?matched, "question columns");
            cols
        }
    };

    let mut roster = PollRoster::default();
    let mut skipped = 0usize;
    for row in &table.rows {
        let email = normalize_email(table.cell(row, email_col));
        if !email.contains('@') {
            skipped += 1;
            continue;
        }

        let first = first_col.map(|c| table.cell(row, c)).unwrap_or("");
        let last = last_col.map(|c| table.cell(row, c)).unwrap_or("");

        let present = match policy {
            PresencePolicy::Listed => true,
            PresencePolicy::Answered { .. } => question_cols
                .iter()
                .any(|&c| !table.cell(row, c).trim().is_empty()),
        };
        if present {
            roster.mark_present(&email);
        }
        roster.insert(PollStudent::new(email, first, last));
    }

    if roster.is_empty() {
        return Err(RollCallError::EmptyRoster);
    }

    info!(
        students = roster.len(),
        present = roster.present_count(),
        skipped,
        "ingested poll export"
    );
    Ok(roster)
}

/// Trim and lower-case an email cell.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// `("first last", "last, first")`, falling back to whichever part exists.
pub fn make_full_and_sortable(first: &str, last: &str) -> (String, String) {
    let first = first.trim();
    let last = last.trim();
    let full = format!("{} {}", first, last).trim().to_string();
    let sortable = match (first.is_empty(), last.is_empty()) {
        (false, false) => format!("{}, {}", last, first),
        (true, false) => last.to_string(),
        _ => first.to_string(),
    };
    (full, sortable)
}
