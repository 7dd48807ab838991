//! Wires configuration, contact loading, the template and a mailer into one
//! dispatch run.

use crate::config::Config;
use crate::contact::ContactRecord;
use crate::dispatcher::Dispatcher;
use crate::loader::{self, ContactSource};
use crate::mailer::{Mailer, MockMailer, SmtpMailer};
use crate::report::Summary;
use crate::template::Template;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Per-run inputs that do not belong in the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignOptions {
    pub source: ContactSource,
    /// Where contacts extracted from a PDF are saved; ignored for CSV sources.
    pub extracted_output: Option<PathBuf>,
    pub failed_output: Option<PathBuf>,
}

impl CampaignOptions {
    #[must_use]
    pub const fn new(source: ContactSource) -> Self {
        Self {
            source,
            extracted_output: None,
            failed_output: None,
        }
    }
}

#[derive(Debug)]
pub struct Campaign {
    template: Template,
    dispatcher: Dispatcher,
    mailer: Arc<dyn Mailer>,
}

impl Campaign {
    /// Build a campaign that sends over SMTP, or through the mock mailer when
    /// `dry_run` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the template cannot be
    /// loaded, or the SMTP transport cannot be configured.
    pub fn new(config: &Config, dry_run: bool) -> Result<Self> {
        config.validate(dry_run)?;
        let mailer: Arc<dyn Mailer> = if dry_run {
            info!("Dry run: messages are rendered but not sent");
            Arc::new(MockMailer::new())
        } else {
            Arc::new(SmtpMailer::new(&config.smtp, &config.message)?)
        };
        Self::with_mailer(config, mailer)
    }

    /// Build a campaign around an existing mailer.
    ///
    /// # Errors
    ///
    /// Returns an error if the dispatch settings are invalid or the template
    /// cannot be loaded.
    pub fn with_mailer(config: &Config, mailer: Arc<dyn Mailer>) -> Result<Self> {
        let template = Template::from_file(&config.message.template_path)?;
        let limiter = Arc::new(config.dispatch.rate_limiter()?);
        let retry = config.dispatch.retry_policy()?;
        let dispatcher = Dispatcher::new(config.dispatch.max_workers, limiter, retry)?
            .with_post_send_pause(config.dispatch.post_send_pause()?);
        Ok(Self {
            template,
            dispatcher,
            mailer,
        })
    }

    /// Stop starting new sends once `cancel` fires.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.dispatcher = self.dispatcher.with_cancellation(cancel);
        self
    }

    /// Load the contact list, saving the PDF extraction when asked to.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be loaded.
    pub fn load(&self, options: &CampaignOptions) -> Result<Vec<ContactRecord>> {
        let records = loader::load_contacts(&options.source)
            .with_context(|| format!("Failed to load contacts from {}", options.source.path().display()))?;

        if let (ContactSource::Pdf(_), Some(output)) = (&options.source, &options.extracted_output) {
            if let Err(e) = loader::csv::write(output, &records) {
                warn!("Could not save extracted contacts to {}: {e}", output.display());
            }
        }
        Ok(records)
    }

    /// Load, dispatch and summarize.
    ///
    /// # Errors
    ///
    /// Returns an error if loading fails. Send failures are reported in the
    /// summary instead.
    pub async fn run(&self, options: &CampaignOptions) -> Result<Summary> {
        let records = self.load(options)?;

        let template = self.template.clone();
        let results = self
            .dispatcher
            .run(
                records,
                move |record: &ContactRecord| Ok(template.render(record)),
                Arc::clone(&self.mailer),
            )
            .await;

        let summary = Summary::from_results(&results);
        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            attempts = summary.total_attempts,
            "Outreach run complete"
        );

        if let Some(path) = &options.failed_output {
            if summary.all_succeeded() {
                info!("No failures; not writing {}", path.display());
            } else {
                summary
                    .write_failed_csv(path)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
            }
        }
        Ok(summary)
    }
}
