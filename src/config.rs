use crate::error::ConfigError;
use crate::rate_limiter::RateLimiter;
use crate::retry::RetryPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{env, path::Path, path::PathBuf, time::Duration};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub message: MessageConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SmtpSecurity {
    /// Plain connection upgraded with STARTTLS (port 587)
    #[default]
    StartTls,
    /// Implicit TLS (port 465)
    Tls,
    /// No encryption, local test servers only
    None,
}

impl std::str::FromStr for SmtpSecurity {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "starttls" => Ok(Self::StartTls),
            "tls" => Ok(Self::Tls),
            "none" => Ok(Self::None),
            other => Err(ConfigError::Invalid {
                field: "smtp.security",
                reason: format!("'{other}' is not one of starttls, tls, none"),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SmtpConfig {
    #[serde(default = "default_smtp_server")]
    pub server: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub security: SmtpSecurity,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default = "default_smtp_timeout")]
    pub timeout_seconds: u64,
}

fn default_smtp_server() -> String {
    "smtp.gmail.com".to_string()
}
const fn default_smtp_port() -> u16 {
    587
}
const fn default_smtp_timeout() -> u64 {
    30
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            server: default_smtp_server(),
            port: default_smtp_port(),
            security: SmtpSecurity::default(),
            username: None,
            password: None,
            timeout_seconds: default_smtp_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageConfig {
    /// Sender address; defaults to the SMTP username
    pub from: Option<String>,
    #[serde(default = "default_subject")]
    pub subject: String,
    #[serde(default = "default_template_path")]
    pub template_path: PathBuf,
    pub resume_path: Option<PathBuf>,
}

fn default_subject() -> String {
    "Seeking Assistance for Suitable Job Opportunity & Referral".to_string()
}
fn default_template_path() -> PathBuf {
    PathBuf::from("email_template.md")
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            from: None,
            subject: default_subject(),
            template_path: default_template_path(),
            resume_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchConfig {
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_calls_per_period")]
    pub calls_per_period: u32,
    #[serde(default = "default_period_seconds")]
    pub period_seconds: f64,
    #[serde(default = "default_base_delay_seconds")]
    pub base_delay_seconds: f64,
    #[serde(default)]
    pub jitter_factor: f64,
    /// Seconds a worker waits after a successful send before taking the next record
    #[serde(default)]
    pub post_send_pause_seconds: f64,
}

const fn default_max_workers() -> usize {
    10
}
const fn default_max_retries() -> u32 {
    3
}
const fn default_calls_per_period() -> u32 {
    10
}
const fn default_period_seconds() -> f64 {
    60.0
}
const fn default_base_delay_seconds() -> f64 {
    1.0
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            max_retries: default_max_retries(),
            calls_per_period: default_calls_per_period(),
            period_seconds: default_period_seconds(),
            base_delay_seconds: default_base_delay_seconds(),
            jitter_factor: 0.0,
            post_send_pause_seconds: 0.0,
        }
    }
}

impl DispatchConfig {
    /// Check the run parameters before any dispatch starts.
    ///
    /// # Errors
    ///
    /// Returns the first invalid parameter found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::NotPositive {
                field: "max_workers",
            });
        }
        if self.calls_per_period == 0 {
            return Err(ConfigError::NotPositive {
                field: "calls_per_period",
            });
        }
        if !(self.period_seconds.is_finite() && self.period_seconds > 0.0) {
            return Err(ConfigError::NotPositive {
                field: "period_seconds",
            });
        }
        if !(self.base_delay_seconds.is_finite() && self.base_delay_seconds > 0.0) {
            return Err(ConfigError::NotPositive {
                field: "base_delay_seconds",
            });
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ConfigError::OutOfRange {
                field: "jitter_factor",
                value: self.jitter_factor.to_string(),
            });
        }
        if !(self.post_send_pause_seconds.is_finite() && self.post_send_pause_seconds >= 0.0) {
            return Err(ConfigError::Invalid {
                field: "post_send_pause_seconds",
                reason: format!("{} is not a non-negative number", self.post_send_pause_seconds),
            });
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the window parameters are invalid.
    pub fn rate_limiter(&self) -> Result<RateLimiter, ConfigError> {
        RateLimiter::from_config(self.calls_per_period, self.period_seconds)
    }

    /// # Errors
    ///
    /// Returns an error if the base delay or jitter factor is invalid.
    pub fn retry_policy(&self) -> Result<RetryPolicy, ConfigError> {
        let base_delay = Duration::try_from_secs_f64(self.base_delay_seconds).map_err(|e| {
            ConfigError::Invalid {
                field: "base_delay_seconds",
                reason: e.to_string(),
            }
        })?;
        RetryPolicy::new(self.max_retries, base_delay)?.with_jitter(self.jitter_factor)
    }

    /// # Errors
    ///
    /// Returns an error if the pause is negative or not a number.
    pub fn post_send_pause(&self) -> Result<Duration, ConfigError> {
        Duration::try_from_secs_f64(self.post_send_pause_seconds).map_err(|e| ConfigError::Invalid {
            field: "post_send_pause_seconds",
            reason: e.to_string(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Read the first of several environment variables that is set.
fn env_any(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| env::var(name).ok())
}

fn parse_env<T>(names: &[&str]) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    names
        .iter()
        .find_map(|name| env::var(name).ok().map(|value| (name, value)))
        .map(|(name, value)| {
            value
                .trim()
                .parse()
                .with_context(|| format!("Invalid value for {name}: {value}"))
        })
        .transpose()
}

impl Config {
    /// Load configuration from a TOML file at the specified path
    ///
    /// # Errors
    ///
    /// This function will return an error if:
    /// - The file cannot be read
    /// - The TOML content cannot be parsed into the Config structure
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Apply environment overrides on top of `self`.
    ///
    /// Each setting reads an `OUTREACH_*` variable first, then its legacy
    /// `.env` name (`EMAIL_USER`, `MAX_EMAIL_THREADS`, ...) where one exists.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric or enumerated variable does not parse.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(server) = env_any(&["OUTREACH_SMTP_SERVER", "SMTP_SERVER"]) {
            self.smtp.server = server;
        }
        if let Some(port) = parse_env(&["OUTREACH_SMTP_PORT", "SMTP_PORT"])? {
            self.smtp.port = port;
        }
        if let Some(security) = parse_env(&["OUTREACH_SMTP_SECURITY"])? {
            self.smtp.security = security;
        }
        if let Some(user) = env_any(&["OUTREACH_SMTP_USERNAME", "EMAIL_USER"]) {
            self.smtp.username = Some(user);
        }
        if let Some(password) = env_any(&["OUTREACH_SMTP_PASSWORD", "EMAIL_PASSWORD"]) {
            self.smtp.password = Some(password);
        }
        if let Some(timeout) = parse_env(&["OUTREACH_SMTP_TIMEOUT"])? {
            self.smtp.timeout_seconds = timeout;
        }

        if let Some(from) = env_any(&["OUTREACH_FROM"]) {
            self.message.from = Some(from);
        }
        if let Some(subject) = env_any(&["OUTREACH_SUBJECT"]) {
            self.message.subject = subject;
        }
        if let Some(template) = env_any(&["OUTREACH_TEMPLATE_PATH", "EMAIL_TEMPLATE_PATH"]) {
            self.message.template_path = PathBuf::from(template);
        }
        if let Some(resume) = env_any(&["OUTREACH_RESUME_PATH", "RESUME_PATH"]) {
            self.message.resume_path = Some(PathBuf::from(resume));
        }

        if let Some(workers) = parse_env(&["OUTREACH_MAX_WORKERS", "MAX_EMAIL_THREADS"])? {
            self.dispatch.max_workers = workers;
        }
        if let Some(retries) = parse_env(&["OUTREACH_MAX_RETRIES", "MAX_EMAIL_RETRIES"])? {
            self.dispatch.max_retries = retries;
        }
        if let Some(calls) = parse_env(&["OUTREACH_CALLS_PER_PERIOD", "EMAIL_CALLS_PER_PERIOD"])? {
            self.dispatch.calls_per_period = calls;
        }
        if let Some(period) = parse_env(&["OUTREACH_PERIOD_SECONDS", "EMAIL_PERIOD"])? {
            self.dispatch.period_seconds = period;
        }
        if let Some(delay) = parse_env(&["OUTREACH_BASE_DELAY_SECONDS"])? {
            self.dispatch.base_delay_seconds = delay;
        }
        if let Some(jitter) = parse_env(&["OUTREACH_JITTER_FACTOR"])? {
            self.dispatch.jitter_factor = jitter;
        }
        if let Some(pause) = parse_env(&["OUTREACH_POST_SEND_PAUSE_SECONDS"])? {
            self.dispatch.post_send_pause_seconds = pause;
        }

        if let Some(level) = env_any(&["OUTREACH_LOG_LEVEL"]) {
            self.logging.level = level;
        }
        if let Some(format) = env_any(&["OUTREACH_LOG_FORMAT"]) {
            self.logging.format = format;
        }
        Ok(())
    }

    /// Load configuration from environment variables alone
    ///
    /// # Errors
    ///
    /// This function will return an error if:
    /// - Environment variables contain invalid values
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Candidate config file locations, most specific first.
    #[must_use]
    pub fn search_paths(explicit: Option<&Path>) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(path) = explicit {
            paths.push(path.to_path_buf());
        }
        paths.push(PathBuf::from("outreach.toml"));
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("outreach/config.toml"));
        }
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".config/outreach/config.toml"));
        }
        paths.push(PathBuf::from("/etc/outreach/config.toml"));
        paths
    }

    /// Load configuration: defaults, then the first config file found, then
    /// `.env` and the process environment.
    ///
    /// # Errors
    ///
    /// This function will return an error if:
    /// - An explicitly requested config file is missing or invalid
    /// - Environment variables contain invalid values
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                anyhow::bail!("Config file not found at {}", path.display());
            }
        }

        match dotenvy::dotenv() {
            Ok(path) => info!("Loaded environment from {}", path.display()),
            Err(e) if e.not_found() => debug!("No .env file found"),
            Err(e) => warn!("Ignoring unreadable .env file: {e}"),
        }

        let mut config = None;
        for path in Self::search_paths(explicit) {
            debug!("Checking for config at: {}", path.display());
            if !path.exists() {
                continue;
            }
            match Self::from_file(&path) {
                Ok(file_config) => {
                    info!("Using config file {}", path.display());
                    config = Some(file_config);
                    break;
                }
                Err(e) if explicit == Some(path.as_path()) => return Err(e),
                Err(e) => warn!("Error loading config from {}: {e:#}", path.display()),
            }
        }

        let mut config = config.unwrap_or_else(|| {
            debug!("No config file found, using defaults");
            Self::default()
        });
        config.apply_env()?;
        Ok(config)
    }

    /// Merge CLI overrides into this configuration. Only values actually given win.
    pub fn merge(&mut self, overrides: Overrides) {
        if let Some(workers) = overrides.max_workers {
            self.dispatch.max_workers = workers;
        }
        if let Some(retries) = overrides.max_retries {
            self.dispatch.max_retries = retries;
        }
        if let Some(calls) = overrides.calls_per_period {
            self.dispatch.calls_per_period = calls;
        }
        if let Some(period) = overrides.period_seconds {
            self.dispatch.period_seconds = period;
        }
        if let Some(delay) = overrides.base_delay_seconds {
            self.dispatch.base_delay_seconds = delay;
        }
        if let Some(pause) = overrides.post_send_pause_seconds {
            self.dispatch.post_send_pause_seconds = pause;
        }
        if let Some(template) = overrides.template_path {
            self.message.template_path = template;
        }
        if let Some(resume) = overrides.resume_path {
            self.message.resume_path = Some(resume);
        }
        if let Some(subject) = overrides.subject {
            self.message.subject = subject;
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// This function will return an error if:
    /// - SMTP credentials are missing (unless `dry_run`)
    /// - The resume file is missing (unless `dry_run`)
    /// - Dispatch parameters are invalid
    pub fn validate(&self, dry_run: bool) -> Result<(), ConfigError> {
        self.dispatch.validate()?;

        if self.message.subject.trim().is_empty() {
            return Err(ConfigError::Missing("message.subject"));
        }
        if dry_run {
            return Ok(());
        }

        if self.smtp.username.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::Missing("smtp.username (EMAIL_USER)"));
        }
        if self.smtp.password.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::Missing("smtp.password (EMAIL_PASSWORD)"));
        }
        match &self.message.resume_path {
            None => return Err(ConfigError::Missing("message.resume_path (RESUME_PATH)")),
            Some(path) if !path.exists() => {
                return Err(ConfigError::FileNotFound {
                    field: "message.resume_path",
                    path: path.clone(),
                })
            }
            Some(_) => {}
        }
        Ok(())
    }
}

/// Values supplied on the command line for a single run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub max_workers: Option<usize>,
    pub max_retries: Option<u32>,
    pub calls_per_period: Option<u32>,
    pub period_seconds: Option<f64>,
    pub base_delay_seconds: Option<f64>,
    pub post_send_pause_seconds: Option<f64>,
    pub template_path: Option<PathBuf>,
    pub resume_path: Option<PathBuf>,
    pub subject: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::EnvGuard;
    use std::fs;
    use tempfile::{tempdir, NamedTempFile};

    fn complete_config() -> (Config, NamedTempFile) {
        let resume = NamedTempFile::new().unwrap();
        let mut config = Config::default();
        config.smtp.username = Some("me@example.com".to_string());
        config.smtp.password = Some("app-password".to_string());
        config.message.resume_path = Some(resume.path().to_path_buf());
        (config, resume)
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.smtp.server, "smtp.gmail.com");
        assert_eq!(config.smtp.port, 587);
        assert_eq!(config.smtp.security, SmtpSecurity::StartTls);
        assert_eq!(config.message.template_path, PathBuf::from("email_template.md"));
        assert_eq!(config.dispatch.max_workers, 10);
        assert_eq!(config.dispatch.max_retries, 3);
        assert_eq!(config.dispatch.calls_per_period, 10);
        assert!((config.dispatch.period_seconds - 60.0).abs() < f64::EPSILON);
        assert!((config.dispatch.base_delay_seconds - 1.0).abs() < f64::EPSILON);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_validation() {
        let (mut config, _resume) = complete_config();
        assert!(config.validate(false).is_ok());

        config.smtp.password = None;
        assert_eq!(
            config.validate(false),
            Err(ConfigError::Missing("smtp.password (EMAIL_PASSWORD)"))
        );
        // dry runs never touch the transport
        assert!(config.validate(true).is_ok());

        config.message.resume_path = Some(PathBuf::from("/nonexistent/resume.pdf"));
        config.smtp.password = Some("x".to_string());
        assert!(matches!(
            config.validate(false),
            Err(ConfigError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_dispatch_validation() {
        let mut dispatch = DispatchConfig::default();
        assert!(dispatch.validate().is_ok());

        dispatch.max_workers = 0;
        assert_eq!(
            dispatch.validate(),
            Err(ConfigError::NotPositive {
                field: "max_workers"
            })
        );

        dispatch = DispatchConfig {
            period_seconds: 0.0,
            ..DispatchConfig::default()
        };
        assert!(dispatch.validate().is_err());

        dispatch = DispatchConfig {
            jitter_factor: 2.0,
            ..DispatchConfig::default()
        };
        assert!(matches!(
            dispatch.validate(),
            Err(ConfigError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_dispatch_builders() {
        let dispatch = DispatchConfig {
            calls_per_period: 2,
            period_seconds: 1.0,
            max_retries: 3,
            base_delay_seconds: 0.5,
            ..DispatchConfig::default()
        };
        let limiter = dispatch.rate_limiter().unwrap();
        assert_eq!(limiter.calls_per_period(), 2);
        assert_eq!(limiter.period(), Duration::from_secs(1));

        let retry = dispatch.retry_policy().unwrap();
        assert_eq!(retry.max_attempts(), 4);
        assert_eq!(retry.backoff(2), Duration::from_secs(2));

        assert_eq!(dispatch.post_send_pause().unwrap(), Duration::ZERO);
        let paused = DispatchConfig {
            post_send_pause_seconds: 3.0,
            ..dispatch
        };
        assert_eq!(paused.post_send_pause().unwrap(), Duration::from_secs(3));

        let negative = DispatchConfig {
            post_send_pause_seconds: -1.0,
            ..DispatchConfig::default()
        };
        assert!(matches!(
            negative.validate(),
            Err(ConfigError::Invalid {
                field: "post_send_pause_seconds",
                ..
            })
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("outreach.toml");
        fs::write(
            &path,
            r#"
            [smtp]
            server = "mail.example.com"
            port = 465
            security = "tls"
            username = "me@example.com"

            [dispatch]
            max_workers = 4
            period_seconds = 1.5
            "#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.smtp.server, "mail.example.com");
        assert_eq!(config.smtp.port, 465);
        assert_eq!(config.smtp.security, SmtpSecurity::Tls);
        assert_eq!(config.dispatch.max_workers, 4);
        assert!((config.dispatch.period_seconds - 1.5).abs() < f64::EPSILON);
        // untouched sections keep their defaults
        assert_eq!(config.dispatch.max_retries, 3);
        assert_eq!(config.message, MessageConfig::default());
    }

    #[test]
    fn test_config_merge() {
        let mut config = Config::default();
        config.dispatch.max_retries = 5;

        config.merge(Overrides {
            max_workers: Some(2),
            period_seconds: Some(1.0),
            ..Overrides::default()
        });

        assert_eq!(config.dispatch.max_workers, 2);
        assert!((config.dispatch.period_seconds - 1.0).abs() < f64::EPSILON);
        assert_eq!(config.dispatch.max_retries, 5);
    }

    #[test]
    fn test_env_overrides() {
        let _guard = EnvGuard::clean();
        env::set_var("EMAIL_USER", "legacy@example.com");
        env::set_var("OUTREACH_SMTP_USERNAME", "new@example.com");
        env::set_var("EMAIL_PASSWORD", "secret");
        env::set_var("RESUME_PATH", "cv.pdf");
        env::set_var("EMAIL_CALLS_PER_PERIOD", "5");
        env::set_var("OUTREACH_PERIOD_SECONDS", "2.5");
        env::set_var("OUTREACH_SMTP_SECURITY", "TLS");

        let config = Config::from_env().unwrap();
        // OUTREACH_* wins over the legacy name
        assert_eq!(config.smtp.username.as_deref(), Some("new@example.com"));
        assert_eq!(config.smtp.password.as_deref(), Some("secret"));
        assert_eq!(config.smtp.security, SmtpSecurity::Tls);
        assert_eq!(config.message.resume_path, Some(PathBuf::from("cv.pdf")));
        assert_eq!(config.dispatch.calls_per_period, 5);
        assert!((config.dispatch.period_seconds - 2.5).abs() < f64::EPSILON);

        env::set_var("OUTREACH_SMTP_SECURITY", "ssl");
        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("OUTREACH_SMTP_SECURITY"));
        assert!(format!("{err:#}").contains("not one of starttls, tls, none"));
        env::set_var("OUTREACH_SMTP_SECURITY", "starttls");

        env::set_var("MAX_EMAIL_THREADS", "many");
        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("MAX_EMAIL_THREADS"));
    }

    #[test]
    fn test_security_from_str() {
        assert_eq!(" TLS ".parse::<SmtpSecurity>(), Ok(SmtpSecurity::Tls));
        assert_eq!("StartTLS".parse::<SmtpSecurity>(), Ok(SmtpSecurity::StartTls));
        assert_eq!("none".parse::<SmtpSecurity>(), Ok(SmtpSecurity::None));
        assert!(matches!(
            "ssl".parse::<SmtpSecurity>(),
            Err(ConfigError::Invalid {
                field: "smtp.security",
                ..
            })
        ));
    }

    #[test]
    fn test_toml_round_trip_keeps_defaults() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        assert!(text.contains("[dispatch]"));
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
