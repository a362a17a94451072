use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "qa-review",
    version,
    about = "Local manual review workflow for generated QA test cases"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Ingest(IngestArgs),
    Status(StatusArgs),
    Review(ReviewArgs),
    Export(ExportArgs),
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ingest(_) => "ingest",
            Self::Status(_) => "status",
            Self::Review(_) => "review",
            Self::Export(_) => "export",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct IngestArgs {
    #[arg(long, default_value = ".cache/qa-review")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// CSV export of generated test cases.
    #[arg(long)]
    pub csv: PathBuf,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    /// Url assigned to cases whose `url` column is blank.
    #[arg(long, default_value = "")]
    pub default_url: String,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = ".cache/qa-review")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ReviewArgs {
    #[arg(long, default_value = ".cache/qa-review")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[command(subcommand)]
    pub action: ReviewAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ReviewAction {
    /// Print the current case and step.
    Show {
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    Next,
    Prev,
    /// Jump to a step (1-based).
    Goto {
        #[arg(long)]
        step: usize,
    },
    /// Record a verdict for the current step.
    Mark {
        #[arg(value_enum)]
        verdict: VerdictArg,
    },
    /// Attach an already captured image to the current step.
    Screenshot {
        #[arg(long)]
        path: PathBuf,
    },
    Notes {
        #[arg(long)]
        text: String,
    },
    /// Approve or reject the current case and move to the next one.
    Decide {
        #[arg(value_enum)]
        decision: DecisionArg,
    },
    /// Make a case current (1-based position in the queue).
    Select {
        #[arg(long)]
        case: usize,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum VerdictArg {
    Pass,
    Fail,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum DecisionArg {
    Approve,
    Reject,
}

#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    #[arg(long, default_value = ".cache/qa-review")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = ExportFilter::Approved)]
    pub status: ExportFilter,

    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ExportFilter {
    Approved,
    Rejected,
    Pending,
    All,
}

impl ExportFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Pending => "pending",
            Self::All => "all",
        }
    }
}
