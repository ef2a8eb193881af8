use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use stigkit::models::checklist::RuleStatus;

#[derive(Parser, Debug)]
#[command(name = "stigkit", version, about = "STIG checklist bootstrap and update tool")]
pub struct Cli {
    #[arg(long, global = true, help = "Output machine-readable JSON")]
    pub json: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a fresh checklist from an XCCDF benchmark.
    Parse { benchmark: PathBuf, output: PathBuf },
    /// Apply per-rule directives from a JSON array.
    UpdateRules {
        checklist: PathBuf,
        directives: PathBuf,
    },
    /// Apply per-severity directives from a JSON array.
    UpdateSeverity {
        checklist: PathBuf,
        directives: PathBuf,
    },
    /// Point target data at the database named by a connection string.
    SetTarget {
        checklist: PathBuf,
        connection: String,
    },
    /// Run the PostgreSQL checks against copies of a template.
    Assess {
        template: PathBuf,
        parameters: PathBuf,
        /// Target name for a bare parameter listing; defaults to the file stem.
        #[arg(long)]
        target: Option<String>,
        /// Give every medium rule this status before the checks run.
        #[arg(long, value_enum)]
        cat_ii_default: Option<StatusArg>,
        #[arg(long)]
        results_dir: Option<PathBuf>,
    },
    /// Export change records (a report or `--json` command output) or a
    /// checklist's statuses as CSV.
    ExportCsv { input: PathBuf, output: PathBuf },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum StatusArg {
    NotReviewed,
    NotApplicable,
    Open,
    NotAFinding,
}

impl From<StatusArg> for RuleStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::NotReviewed => Self::NotReviewed,
            StatusArg::NotApplicable => Self::NotApplicable,
            StatusArg::Open => Self::Open,
            StatusArg::NotAFinding => Self::NotAFinding,
        }
    }
}
