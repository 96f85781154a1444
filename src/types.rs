use crate::error::{RollCallError, RollCallResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

//==============================================================================
// Lecture Session
//==============================================================================

/// The lecture a run writes into: label `Lecture <number>` stamped with `date`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LectureSession {
    pub number: u32,
    pub date: NaiveDate,
}

impl LectureSession {
    pub fn new(number: u32, date: NaiveDate) -> RollCallResult<Self> {
        if number == 0 {
            return Err(RollCallError::Config(
                "lecture number must be 1 or greater".to_string(),
            ));
        }
        Ok(Self { number, date })
    }

    /// Canonical row-2 label, always with a capital L.
    pub fn label(&self) -> String {
        format!("Lecture {}", self.number)
    }
}

impl fmt::Display for LectureSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label(), self.date.format("%b %d, %Y"))
    }
}

//==============================================================================
// Presence Policy
//==============================================================================

/// Rule deciding which poll students count as attending.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PresencePolicy {
    /// Every email listed in the export is present.
    #[default]
    Listed,
    /// Present only with a non-empty answer in a column whose header
    /// contains `question_match` (case-insensitive).
    Answered { question_match: String },
}

impl PresencePolicy {
    /// Phrase used in the human-readable summary.
    pub fn describe(&self) -> &'static str {
        match self {
            PresencePolicy::Listed => "listed in Poll report",
            PresencePolicy::Answered { .. } => "answered a matching Poll question",
        }
    }
}
