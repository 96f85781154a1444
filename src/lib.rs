//! RollCall - attendance reconciliation for lecture rosters
//!
//! Merges a live-poll export (CSV or spreadsheet) into a master roster
//! workbook: one column per lecture, one row per student keyed by email.
//!
//! # Guarantees
//!
//! - Poll presence always writes `1`, overriding any earlier mark
//! - Absence (`0`) is only written into blank cells
//! - Unknown students are appended, never duplicated
//! - Name cells are only filled when blank
//!
//! # Example
//!
//! ```no_run
//! use chrono::NaiveDate;
//! use rollcall::{reconcile, LectureSession, PollExport, ReconcileOptions};
//!
//! let master = std::fs::read("master.xlsx")?;
//! let poll = std::fs::read("poll.csv")?;
//! let session = LectureSession::new(3, NaiveDate::from_ymd_opt(2025, 1, 23).unwrap())?;
//!
//! let result = reconcile(
//!     &master,
//!     &PollExport::new("poll.csv", &poll),
//!     &session,
//!     &ReconcileOptions::default(),
//! )?;
//! println!("{}", result.summary);
//! std::fs::write("master_UPDATED.xlsx", result.artifact)?;
//! # Ok::<(), rollcall::error::RollCallError>(())
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod excel;
pub mod headers;
pub mod last_updated;
pub mod poll;
pub mod reconcile;
pub mod roster;
pub mod types;

// Re-export commonly used types
pub use config::{HeaderLabels, ReconcileOptions};
pub use error::{RollCallError, RollCallResult};
pub use poll::PollExport;
pub use reconcile::{reconcile, Reconciled, Summary};
pub use roster::MergeCounts;
pub use types::{LectureSession, PresencePolicy};
