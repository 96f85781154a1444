use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use colored::Colorize;
use rollcall::cli::{self, MergeArgs};
use rollcall::error::RollCallResult;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rollcall")]
#[command(about = "Merge live-poll attendance exports into a master lecture roster.")]
#[command(long_about = "RollCall - attendance reconciliation for lecture rosters

Reads a poll export (CSV or XLSX) and a master roster workbook (XLSX), then
writes an updated copy of the roster:

  - finds or creates the 'Lecture N' column for the session
  - marks students in the poll present (1)
  - writes absent (0) only into blank cells, never over a manual mark
  - appends students who are not yet on the roster
  - fills blank name cells from the poll

COMMANDS:
  merge     - Merge one poll export into the roster
  lectures  - List lecture columns already in the roster
  about     - Version and last-updated information

EXAMPLES:
  rollcall merge master.xlsx poll.csv --lecture 3 --date 2025-01-23
  rollcall merge master.xlsx poll.xlsx -l 4 --answered \"Lecture 4\"
  rollcall lectures master.xlsx")]
#[command(version)]
struct Cli {
    /// Show debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(long_about = "Merge one poll export into the master roster.

The master file is never modified; the result is written to
<master>_UPDATED.xlsx next to it unless --output is given.

PRESENCE:
  By default every student listed in the poll export is present.
  With --answered SUBSTR, a student is present only when they answered at
  least one question whose column header contains SUBSTR.

CONFIG FILE (--config or ROLLCALL_CONFIG):
  presence:
    mode: answered
    question_match: Lecture 3
  backfill_names: true
  sheet: Roster
  labels:
    email: Email

Command-line flags override the config file.")]
    /// Merge a poll export into the master roster
    Merge {
        /// Master roster workbook (.xlsx)
        master: PathBuf,

        /// Poll export (.csv, or a spreadsheet such as .xlsx)
        poll: PathBuf,

        /// Lecture number (1 or greater)
        #[arg(short, long)]
        lecture: u32,

        /// Session date, YYYY-MM-DD (default: today)
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Output workbook path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Count only students who answered a question whose header contains this text
        #[arg(short, long)]
        answered: Option<String>,

        /// Do not fill blank name cells from the poll
        #[arg(long)]
        no_backfill: bool,

        /// Roster worksheet name (default: the active tab)
        #[arg(short, long)]
        sheet: Option<String>,

        /// YAML configuration file
        #[arg(short, long, env = "ROLLCALL_CONFIG")]
        config: Option<PathBuf>,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,

        /// Reconcile without writing the output file
        #[arg(short = 'n', long)]
        dry_run: bool,
    },

    /// List lecture columns in the master roster
    Lectures {
        /// Master roster workbook (.xlsx)
        master: PathBuf,

        /// Roster worksheet name (default: the active tab)
        #[arg(short, long)]
        sheet: Option<String>,
    },

    /// Show version and last-updated information
    About {
        /// GitHub repository to report on (owner/name)
        #[arg(long, env = "ROLLCALL_REPO")]
        repo: Option<String>,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "rollcall=debug" } else { "rollcall=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(command: Commands) -> RollCallResult<()> {
    match command {
        Commands::Merge {
            master,
            poll,
            lecture,
            date,
            output,
            answered,
            no_backfill,
            sheet,
            config,
            json,
            dry_run,
        } => cli::merge(MergeArgs {
            master,
            poll,
            lecture,
            date,
            output,
            answered,
            no_backfill,
            sheet,
            config,
            json,
            dry_run,
        }),

        Commands::Lectures { master, sheet } => cli::lectures(master, sheet),

        Commands::About { repo } => cli::about(repo),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            if e.is_input_error() {
                eprintln!(
                    "{}",
                    "No file was written. Fix the poll export or master roster and run again."
                        .dimmed()
                );
            }
            ExitCode::FAILURE
        }
    }
}
