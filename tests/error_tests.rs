//! Failure paths of `reconcile`: every error surfaces before any artifact
//! exists, with the message shown to the user.

mod common;

use chrono::NaiveDate;
use common::*;
use rollcall::{
    reconcile, LectureSession, PollExport, PresencePolicy, ReconcileOptions, RollCallError,
};
use rust_xlsxwriter::Workbook;

fn session() -> LectureSession {
    LectureSession::new(1, NaiveDate::from_ymd_opt(2025, 1, 21).unwrap()).unwrap()
}

fn run(master: &[u8], file_name: &str, poll: &[u8], options: &ReconcileOptions) -> RollCallError {
    reconcile(
        master,
        &PollExport::new(file_name, poll),
        &session(),
        options,
    )
    .unwrap_err()
}

fn master() -> Vec<u8> {
    master_xlsx(&[student("a@x.edu", Mark::Blank)])
}

#[test]
fn test_no_matching_question_columns() {
    let options = ReconcileOptions {
        presence: PresencePolicy::Answered {
            question_match: "Lecture 3".to_string(),
        },
        ..ReconcileOptions::default()
    };
    let err = run(&master(), "poll.csv", b"Email,Q1\na@x.edu,yes\n", &options);
    assert!(matches!(err, RollCallError::NoMatchingColumns { .. }));
    assert!(err.is_input_error());
}

#[test]
fn test_poll_without_email_column() {
    let err = run(
        &master(),
        "poll.csv",
        b"Name\nJane\n",
        &ReconcileOptions::default(),
    );
    assert_eq!(
        err.to_string(),
        "Poll report must contain a column named 'Email'."
    );
}

#[test]
fn test_poll_without_valid_emails() {
    let err = run(
        &master(),
        "poll.csv",
        b"Email\nnobody\n\n",
        &ReconcileOptions::default(),
    );
    assert!(matches!(err, RollCallError::EmptyRoster));
}

#[test]
fn test_master_without_email_column() {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(0, 0, "Student").unwrap();
    let master = workbook.save_to_buffer().unwrap();

    let err = run(
        &master,
        "poll.csv",
        b"Email\na@x.edu\n",
        &ReconcileOptions::default(),
    );
    assert_eq!(
        err.to_string(),
        "Column 'Email' not found in Master Sheet (row 1)."
    );
}

#[test]
fn test_undecodable_master() {
    let err = run(
        b"not a workbook",
        "poll.csv",
        b"Email\na@x.edu\n",
        &ReconcileOptions::default(),
    );
    assert!(matches!(err, RollCallError::MasterRead(_)));
}

#[test]
fn test_poll_is_checked_before_master() {
    let err = run(
        b"not a workbook",
        "poll.xlsx",
        b"not a spreadsheet either",
        &ReconcileOptions::default(),
    );
    assert!(matches!(err, RollCallError::Parse(_)));
    assert!(err.to_string().starts_with("Error reading Poll file"));
}

#[test]
fn test_unknown_roster_sheet() {
    let options = ReconcileOptions {
        sheet: Some("Spring".to_string()),
        ..ReconcileOptions::default()
    };
    let err = run(&master(), "poll.csv", b"Email\na@x.edu\n", &options);
    assert!(matches!(err, RollCallError::Config(_)));
    assert!(!err.is_input_error());
    assert!(err.to_string().contains("Roster"));
}

#[test]
fn test_roster_sheet_without_email_header() {
    let options = ReconcileOptions {
        sheet: Some("Notes".to_string()),
        ..ReconcileOptions::default()
    };
    let err = run(&master(), "poll.csv", b"Email\na@x.edu\n", &options);
    assert!(matches!(err, RollCallError::MissingEmailColumn { .. }));
}
