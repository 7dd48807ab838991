#![allow(dead_code)]

use anyhow::Result;
use outreach::{ContactRecord, Dispatcher, RateLimiter, RetryPolicy, SendError};
use std::fs;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const TEMPLATE: &str = "Dear {recruiter_name},\n\nAre there openings at {company_name}?\n";

/// `n` distinct, valid contacts.
pub fn contacts(n: usize) -> Vec<ContactRecord> {
    (0..n)
        .map(|i| {
            ContactRecord::new(&format!("Recruiter{i} Smith"), "Acme", &format!("r{i}@acme.io"))
                .expect("fixture contact is valid")
        })
        .collect()
}

pub fn dispatcher(
    workers: usize,
    calls_per_period: u32,
    period: Duration,
    max_retries: u32,
) -> Dispatcher {
    let limiter = Arc::new(RateLimiter::new(
        NonZeroU32::new(calls_per_period).expect("calls_per_period > 0"),
        period,
    ));
    let retry = RetryPolicy::new(max_retries, Duration::from_secs(1)).expect("valid retry policy");
    Dispatcher::new(workers, limiter, retry).expect("valid dispatcher")
}

pub fn plain_body(record: &ContactRecord) -> Result<String, SendError> {
    Ok(format!("Hello {}", record.name()))
}

/// A temp directory holding a template and a resume, plus helpers for contact files.
pub struct Workspace {
    pub dir: TempDir,
    pub template: PathBuf,
    pub resume: PathBuf,
}

impl Workspace {
    pub fn new() -> Result<Self> {
        let dir = TempDir::new()?;
        let template = dir.path().join("email_template.md");
        fs::write(&template, TEMPLATE)?;
        let resume = dir.path().join("resume.pdf");
        fs::write(&resume, b"%PDF-1.4 fake resume")?;
        Ok(Self {
            dir,
            template,
            resume,
        })
    }

    pub fn write(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.dir.path().join(name);
        fs::write(&path, contents)?;
        Ok(path)
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}
