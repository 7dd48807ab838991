use crate::config::Overrides;
use crate::loader::ContactSource;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Set log level (overrides `[logging] level`)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Set log format, `text` or `json` (overrides `[logging] format`)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Increase verbosity
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize configuration file at `--config` or the default location
    Init {
        /// Don't prompt for input, use defaults
        #[arg(long)]
        no_prompt: bool,

        /// Force overwrite if config file exists
        #[arg(long)]
        force: bool,
    },

    /// Send the templated email to every contact in a list
    Send(SendArgs),

    /// Extract the recruiter table from a PDF into a CSV file
    Extract {
        /// PDF containing the recruiter table
        #[arg(long)]
        pdf: PathBuf,

        /// Where to write the extracted contacts
        #[arg(long, default_value = "recruiters_list.csv")]
        output: PathBuf,
    },
}

#[derive(Args, Debug, Clone)]
#[command(group(clap::ArgGroup::new("source").required(true).args(["csv", "pdf"])))]
pub struct SendArgs {
    /// CSV file with Name, Company and Email columns
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// PDF file containing a recruiter table
    #[arg(long)]
    pub pdf: Option<PathBuf>,

    /// Render and dispatch without connecting to an SMTP server
    #[arg(long)]
    pub dry_run: bool,

    /// Maximum concurrent sends
    #[arg(long)]
    pub max_workers: Option<usize>,

    /// Retries after the first failed attempt
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Sends allowed per rate-limit window
    #[arg(long)]
    pub calls_per_period: Option<u32>,

    /// Length of the rate-limit window in seconds
    #[arg(long)]
    pub period_seconds: Option<f64>,

    /// Delay before the first retry, doubled on each further retry
    #[arg(long)]
    pub base_delay_seconds: Option<f64>,

    /// Pause a worker for this long after each successful send
    #[arg(long)]
    pub post_send_pause_seconds: Option<f64>,

    /// Email template file
    #[arg(long)]
    pub template: Option<PathBuf>,

    /// Resume to attach
    #[arg(long)]
    pub resume: Option<PathBuf>,

    /// Subject line
    #[arg(long)]
    pub subject: Option<String>,

    /// Write failed contacts to this CSV for a later re-run
    #[arg(long)]
    pub failed_output: Option<PathBuf>,

    /// Where to save contacts extracted from a PDF source
    #[arg(long, default_value = "recruiters_list.csv")]
    pub extracted_output: PathBuf,

    /// Summary output format
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub report: ReportFormat,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Text,
    Json,
}

impl SendArgs {
    /// The contact source selected on the command line. Clap guarantees exactly one.
    #[must_use]
    pub fn source(&self) -> Option<ContactSource> {
        match (&self.csv, &self.pdf) {
            (Some(csv), _) => Some(ContactSource::Csv(csv.clone())),
            (None, Some(pdf)) => Some(ContactSource::Pdf(pdf.clone())),
            (None, None) => None,
        }
    }

    #[must_use]
    pub fn overrides(&self) -> Overrides {
        Overrides {
            max_workers: self.max_workers,
            max_retries: self.max_retries,
            calls_per_period: self.calls_per_period,
            period_seconds: self.period_seconds,
            base_delay_seconds: self.base_delay_seconds,
            post_send_pause_seconds: self.post_send_pause_seconds,
            template_path: self.template.clone(),
            resume_path: self.resume.clone(),
            subject: self.subject.clone(),
        }
    }
}
