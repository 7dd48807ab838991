use crate::contact::ContactRecord;
use crate::dispatcher::SendResult;
use crate::error::{ErrorKind, LoadError};
use crate::loader;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::path::Path;

/// One failed record as it appears in the summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub record: ContactRecord,
    pub attempts: u32,
    pub message: String,
}

/// End-of-run reduction over terminal [`SendResult`]s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_attempts: u64,
    pub failures: BTreeMap<ErrorKind, Vec<Failure>>,
}

impl Summary {
    /// Reduce results into counts and failures grouped by kind. Pure: the same
    /// input always yields the same summary.
    #[must_use]
    pub fn from_results(results: &[SendResult]) -> Self {
        let mut failures: BTreeMap<ErrorKind, Vec<Failure>> = BTreeMap::new();
        let mut succeeded = 0;
        let mut total_attempts = 0;

        for result in results {
            total_attempts += u64::from(result.attempts());
            if result.success() {
                succeeded += 1;
                continue;
            }
            let (kind, message) = result.final_error().map_or_else(
                || (ErrorKind::Unclassified, String::new()),
                |e| (e.kind, e.message.clone()),
            );
            failures.entry(kind).or_default().push(Failure {
                record: result.record().clone(),
                attempts: result.attempts(),
                message,
            });
        }

        Self {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            total_attempts,
            failures,
        }
    }

    /// Records worth sending again in a follow-up run.
    #[must_use]
    pub fn failed_records(&self) -> Vec<ContactRecord> {
        self.failures
            .values()
            .flatten()
            .map(|f| f.record.clone())
            .collect()
    }

    #[must_use]
    pub fn count(&self, kind: ErrorKind) -> usize {
        self.failures.get(&kind).map_or(0, Vec::len)
    }

    #[must_use]
    pub const fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    /// Write the failed subset as a contacts CSV for a targeted re-run.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_failed_csv(&self, path: &Path) -> Result<(), LoadError> {
        loader::csv::write(path, &self.failed_records())
    }
}

impl Display for Summary {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "Outreach summary")?;
        writeln!(f, "  attempted: {}", self.total)?;
        writeln!(f, "  succeeded: {}", self.succeeded)?;
        writeln!(f, "  failed:    {}", self.failed)?;
        for (kind, failures) in &self.failures {
            writeln!(f, "  {kind} ({}):", failures.len())?;
            for failure in failures {
                writeln!(
                    f,
                    "    {} <{}> [{} attempts] {}",
                    failure.record.name(),
                    failure.record.email(),
                    failure.attempts,
                    failure.message
                )?;
            }
        }
        Ok(())
    }
}
