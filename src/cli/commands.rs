use crate::config::ReconcileOptions;
use crate::error::{RollCallError, RollCallResult};
use crate::excel::model::column_letter;
use crate::last_updated::last_updated;
use crate::poll::PollExport;
use crate::reconcile::{reconcile, Summary};
use crate::roster::{lecture_columns, MasterRoster};
use crate::types::{LectureSession, PresencePolicy};
use chrono::{Local, NaiveDate};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};

/// Inputs of the merge command after argument parsing.
#[derive(Debug, Clone, Default)]
pub struct MergeArgs {
    pub master: PathBuf,
    pub poll: PathBuf,
    pub lecture: u32,
    pub date: Option<NaiveDate>,
    pub output: Option<PathBuf>,
    pub answered: Option<String>,
    pub no_backfill: bool,
    pub sheet: Option<String>,
    pub config: Option<PathBuf>,
    pub json: bool,
    pub dry_run: bool,
}

/// Configuration file first, then command-line overrides.
pub fn resolve_options(args: &MergeArgs) -> RollCallResult<ReconcileOptions> {
    let mut options = match &args.config {
        Some(path) => ReconcileOptions::load(path).map_err(|e| {
            RollCallError::Config(format!("cannot load {}: {}", path.display(), e))
        })?,
        None => ReconcileOptions::default(),
    };
    if let Some(question_match) = &args.answered {
        options.presence = PresencePolicy::Answered {
            question_match: question_match.clone(),
        };
    }
    if args.no_backfill {
        options.backfill_names = false;
    }
    if args.sheet.is_some() {
        options.sheet = args.sheet.clone();
    }
    Ok(options)
}

/// `<master stem>_UPDATED.xlsx` next to the master.
pub fn default_output_path(master: &Path) -> PathBuf {
    let stem = master
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "master".to_string());
    master.with_file_name(format!("{}_UPDATED.xlsx", stem))
}

/// Execute the merge command
pub fn merge(args: MergeArgs) -> RollCallResult<()> {
    let options = resolve_options(&args)?;
    let date = args.date.unwrap_or_else(|| Local::now().date_naive());
    let session = LectureSession::new(args.lecture, date)?;

    let master_bytes = fs::read(&args.master)?;
    let poll_bytes = fs::read(&args.poll)?;
    let poll_name = args
        .poll
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let reconciled = reconcile(
        &master_bytes,
        &PollExport::new(&poll_name, &poll_bytes),
        &session,
        &options,
    )?;

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&args.master));
    if !args.dry_run {
        fs::write(&output, &reconciled.artifact)?;
    }

    if args.json {
        let json = serde_json::to_string_pretty(&reconciled.summary)
            .map_err(|e| RollCallError::Serialization(e.to_string()))?;
        println!("{}", json);
        return Ok(());
    }

    print_summary(&reconciled.summary);
    if args.dry_run {
        println!("{}", "📋 Dry run - no file written".yellow());
    } else {
        println!("   Updated roster: {}", output.display().to_string().bold());
    }
    Ok(())
}

fn print_summary(summary: &Summary) {
    let mut lines = summary.to_string().lines().map(str::to_string).collect::<Vec<_>>();
    if lines.is_empty() {
        return;
    }
    println!("{}", lines.remove(0).green());
    for line in lines {
        println!("{}", line.yellow());
    }
    if summary.column_created {
        println!(
            "   New column {} created for {}",
            summary.column.bright_blue(),
            summary.lecture.bold()
        );
    }
}

/// Execute the lectures command - list existing lecture columns
pub fn lectures(master: PathBuf, sheet: Option<String>) -> RollCallResult<()> {
    let options = ReconcileOptions {
        sheet,
        ..ReconcileOptions::default()
    };
    let bytes = fs::read(&master)?;
    let roster = MasterRoster::load(&bytes, &options)?;
    let headers = lecture_columns(roster.sheet());

    println!("{}", "📋 Lecture columns".bold().green());
    println!(
        "   Sheet: {} ({} students)\n",
        roster.sheet().name,
        roster.student_count()
    );
    if headers.is_empty() {
        println!("   {}", "No lecture columns yet".yellow());
        return Ok(());
    }
    for header in headers {
        let date = header
            .date
            .map(|d| d.format("%b %d, %Y").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "   {:>4}  {:<14} {}",
            column_letter(header.col).bright_blue(),
            header.label,
            date
        );
    }
    Ok(())
}

/// Execute the about command
pub fn about(repo: Option<String>) -> RollCallResult<()> {
    println!(
        "{} {}",
        "rollcall".bold().green(),
        env!("CARGO_PKG_VERSION")
    );
    println!("   {}", env!("CARGO_PKG_DESCRIPTION"));
    println!("   Last updated: {}", last_updated(repo.as_deref()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output_path(Path::new("/tmp/roster/Fall Master.xlsx")),
            PathBuf::from("/tmp/roster/Fall Master_UPDATED.xlsx")
        );
        assert_eq!(
            default_output_path(Path::new("master.xlsx")),
            PathBuf::from("master_UPDATED.xlsx")
        );
    }

    #[test]
    fn test_flags_override_config_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "backfill_names: true\nsheet: FromFile").unwrap();

        let args = MergeArgs {
            config: Some(file.path().to_path_buf()),
            answered: Some("Lecture 3".to_string()),
            no_backfill: true,
            ..MergeArgs::default()
        };
        let options = resolve_options(&args).unwrap();
        assert!(!options.backfill_names);
        assert_eq!(options.sheet.as_deref(), Some("FromFile"));
        assert_eq!(
            options.presence,
            PresencePolicy::Answered {
                question_match: "Lecture 3".to_string()
            }
        );
    }

    #[test]
    fn test_missing_config_file() {
        let args = MergeArgs {
            config: Some(PathBuf::from("/nonexistent/rollcall.yaml")),
            ..MergeArgs::default()
        };
        let err = resolve_options(&args).unwrap_err();
        assert!(matches!(err, RollCallError::Config(_)));
    }
}
