use anyhow::Result;
use std::env;
use std::path::{Path, PathBuf};

/// Every environment variable [`Config::apply_env`](crate::config::Config::apply_env) reads.
pub const CONFIG_ENV_VARS: &[&str] = &[
    "OUTREACH_SMTP_SERVER",
    "OUTREACH_SMTP_PORT",
    "OUTREACH_SMTP_SECURITY",
    "OUTREACH_SMTP_USERNAME",
    "OUTREACH_SMTP_PASSWORD",
    "OUTREACH_SMTP_TIMEOUT",
    "OUTREACH_FROM",
    "OUTREACH_SUBJECT",
    "OUTREACH_TEMPLATE_PATH",
    "OUTREACH_RESUME_PATH",
    "OUTREACH_MAX_WORKERS",
    "OUTREACH_MAX_RETRIES",
    "OUTREACH_CALLS_PER_PERIOD",
    "OUTREACH_PERIOD_SECONDS",
    "OUTREACH_BASE_DELAY_SECONDS",
    "OUTREACH_JITTER_FACTOR",
    "OUTREACH_POST_SEND_PAUSE_SECONDS",
    "OUTREACH_LOG_LEVEL",
    "OUTREACH_LOG_FORMAT",
    "SMTP_SERVER",
    "SMTP_PORT",
    "EMAIL_USER",
    "EMAIL_PASSWORD",
    "EMAIL_TEMPLATE_PATH",
    "RESUME_PATH",
    "MAX_EMAIL_THREADS",
    "MAX_EMAIL_RETRIES",
    "EMAIL_CALLS_PER_PERIOD",
    "EMAIL_PERIOD",
];

/// Restores the listed environment variables when dropped.
pub struct EnvGuard {
    vars: Vec<(&'static str, Option<String>)>,
}

impl EnvGuard {
    #[must_use]
    pub fn new(vars: &[&'static str]) -> Self {
        let vars = vars
            .iter()
            .map(|&var| (var, env::var(var).ok()))
            .collect();
        Self { vars }
    }

    /// Snapshot and clear every config variable so a test starts from defaults.
    #[must_use]
    pub fn clean() -> Self {
        let guard = Self::new(CONFIG_ENV_VARS);
        for var in CONFIG_ENV_VARS {
            env::remove_var(var);
        }
        guard
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (var, original_value) in &self.vars {
            match original_value {
                Some(value) => env::set_var(var, value),
                None => env::remove_var(var),
            }
        }
    }
}

/// Restores the working directory when dropped.
pub struct DirGuard {
    original_dir: PathBuf,
}

impl DirGuard {
    /// Switch to `dir`, remembering where we were.
    ///
    /// # Errors
    ///
    /// Returns an error if the current directory cannot be read or changed.
    pub fn enter(dir: &Path) -> Result<Self> {
        let original_dir = env::current_dir()?;
        env::set_current_dir(dir)?;
        Ok(Self { original_dir })
    }
}

impl Drop for DirGuard {
    fn drop(&mut self) {
        // Only try to restore the directory if it still exists
        if self.original_dir.exists() {
            if let Err(e) = env::set_current_dir(&self.original_dir) {
                eprintln!("Error restoring original directory: {e}");
            }
        }
    }
}
