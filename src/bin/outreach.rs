use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use outreach::cli::{Cli, Commands, ReportFormat, SendArgs};
use outreach::config::Config;
use outreach::loader::{self, pdf};
use outreach::{initialize_config, Campaign, CampaignOptions, InitOptions, Summary};

/// Exit status when the run finished but some emails were not delivered.
const PARTIAL_FAILURE: u8 = 2;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Handle init command early as it doesn't need config loading
    if let Commands::Init { no_prompt, force } = cli.command {
        init_logging(&cli, &Config::default());
        initialize_config(InitOptions {
            config_path: cli.config.clone(),
            no_prompt,
            force,
        })
        .await?;
        return Ok(ExitCode::SUCCESS);
    }

    let mut config = Config::load(cli.config.as_deref())?;
    init_logging(&cli, &config);

    match &cli.command {
        Commands::Send(args) => {
            config.merge(args.overrides());
            send(&config, args).await
        }
        Commands::Extract { pdf, output } => {
            extract(pdf, output)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Init { .. } => unreachable!(), // Already handled above
    }
}

fn init_logging(cli: &Cli, config: &Config) {
    // Setup logging based on CLI options, but only if not already initialized
    if std::env::var("RUST_LOG").is_err() {
        let level = cli.log_level.as_deref().unwrap_or(config.logging.level.as_str());
        let filter = if cli.verbose { "debug" } else { level };
        let format = cli.log_format.as_deref().unwrap_or(config.logging.format.as_str());

        let subscriber = fmt()
            .with_env_filter(EnvFilter::new(filter))
            .with_target(false)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);

        if format == "json" {
            let _ = subscriber.json().try_init();
        } else {
            let _ = subscriber.try_init();
        }
    } else {
        let _ = fmt().with_env_filter(EnvFilter::from_default_env()).try_init();
    }
}

async fn send(config: &Config, args: &SendArgs) -> Result<ExitCode> {
    let source = args
        .source()
        .context("either --csv or --pdf is required")?;

    let cancel = CancellationToken::new();
    let campaign = Campaign::new(config, args.dry_run)?.with_cancellation(cancel.clone());

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; finishing in-flight emails and skipping the rest");
            cancel.cancel();
        }
    });

    let summary = campaign
        .run(&CampaignOptions {
            source,
            extracted_output: Some(args.extracted_output.clone()),
            failed_output: args.failed_output.clone(),
        })
        .await?;

    println!("{}", render_report(&summary, args.report)?);
    Ok(if summary.all_succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(PARTIAL_FAILURE)
    })
}

fn render_report(summary: &Summary, format: ReportFormat) -> Result<String> {
    match format {
        ReportFormat::Text => Ok(summary.to_string()),
        ReportFormat::Json => Ok(serde_json::to_string_pretty(summary)?),
    }
}

fn extract(pdf_path: &Path, output: &Path) -> Result<()> {
    let records = pdf::load(pdf_path)
        .with_context(|| format!("Failed to extract contacts from {}", pdf_path.display()))?;
    loader::csv::write(output, &records)?;
    info!(count = records.len(), "Extraction complete");
    println!("Extracted {} contacts to {}", records.len(), output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use outreach::dispatcher::SendResult;
    use outreach::{ContactRecord, ErrorKind, SendError};
    use tempfile::tempdir;

    fn summary() -> Summary {
        let record = ContactRecord::new("Jane", "Acme", "jane@acme.io").unwrap();
        Summary::from_results(&[SendResult::failed(
            0,
            record,
            4,
            SendError::new(ErrorKind::Timeout, "timed out"),
        )])
    }

    #[test]
    fn test_render_report_text() {
        let text = render_report(&summary(), ReportFormat::Text).unwrap();
        assert!(text.starts_with("Outreach summary"));
        assert!(text.contains("timeout (1):"));
    }

    #[test]
    fn test_render_report_json() {
        let json = render_report(&summary(), ReportFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["failed"], 1);
        assert_eq!(value["failures"]["timeout"][0]["attempts"], 4);
    }

    #[test]
    fn test_extract_missing_pdf() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("out.csv");
        let err = extract(Path::new("/nonexistent/list.pdf"), &output).unwrap_err();
        assert!(err.to_string().contains("Failed to extract contacts"));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_send_dry_run() {
        let dir = tempdir().unwrap();
        let template = dir.path().join("template.md");
        std::fs::write(&template, "Hello {recruiter_name}").unwrap();
        let csv = dir.path().join("list.csv");
        std::fs::write(&csv, "Name,Company,Email\nJane,Acme,jane@acme.io\n").unwrap();

        let mut config = Config::default();
        config.message.template_path = template;
        let cli = Cli::parse_from([
            "outreach",
            "send",
            "--dry-run",
            "--csv",
            csv.to_str().unwrap(),
        ]);
        let Commands::Send(args) = cli.command else {
            panic!("expected send command");
        };

        let code = send(&config, &args).await.unwrap();
        assert_eq!(code, ExitCode::SUCCESS);
    }
}
