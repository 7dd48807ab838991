//! Contact sources: CSV lists, PDF tables, and the CSV artifact writer.
//!
//! Loaders validate and normalize rows through [`ContactRecord::new`]; rows
//! that fail are logged and skipped so the dispatcher only ever sees valid
//! records.

use crate::contact::ContactRecord;
use crate::error::LoadError;
use std::path::{Path, PathBuf};
use tracing::info;

pub mod csv;
pub mod pdf;

/// Where the contact list comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactSource {
    Csv(PathBuf),
    Pdf(PathBuf),
}

impl ContactSource {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Csv(path) | Self::Pdf(path) => path,
        }
    }
}

/// Load every valid record from `source`.
///
/// # Errors
///
/// Returns an error if the source is missing, empty, lacks required columns,
/// or yields no valid records.
pub fn load_contacts(source: &ContactSource) -> Result<Vec<ContactRecord>, LoadError> {
    let records = match source {
        ContactSource::Csv(path) => {
            info!("Loading recruiters from CSV: {}", path.display());
            csv::load(path)?
        }
        ContactSource::Pdf(path) => {
            info!("Loading recruiters from PDF: {}", path.display());
            pdf::load(path)?
        }
    };
    info!(count = records.len(), "Loaded {} recruiter records.", records.len());
    Ok(records)
}
