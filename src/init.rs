use anyhow::{anyhow, Result};
use dialoguer::{theme::ColorfulTheme, Confirm, Input, Password, Select};
use std::path::{Path, PathBuf};

use crate::config::{Config, SmtpSecurity};
use crate::mailer::SmtpMailer;

pub struct InitOptions {
    pub config_path: Option<PathBuf>,
    pub no_prompt: bool,
    pub force: bool,
}

/// Default location of the generated config file.
#[must_use]
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("outreach")
        .join("config.toml")
}

/// Write a starter config file, prompting for SMTP and message settings
/// unless `no_prompt` is set.
///
/// # Errors
///
/// Returns an error if:
/// - The file already exists and `force` is not set
/// - A prompt fails or an answer does not parse
/// - The SMTP login test fails
/// - The file cannot be written
pub async fn initialize_config(opts: InitOptions) -> Result<PathBuf> {
    let config_path = opts.config_path.unwrap_or_else(default_config_path);

    if config_path.exists() && !opts.force {
        return Err(anyhow!(
            "Config file already exists at {}. Use --force to overwrite.",
            config_path.display()
        ));
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut config = Config::default();
    if !opts.no_prompt {
        prompt_for_settings(&mut config).await?;
    }

    write_config(&config, &config_path)?;
    println!("\nConfiguration created at: {}", config_path.display());
    Ok(config_path)
}

fn write_config(config: &Config, path: &Path) -> Result<()> {
    let toml = toml::to_string_pretty(config)?;
    std::fs::write(path, toml)?;
    Ok(())
}

async fn prompt_for_settings(config: &mut Config) -> Result<()> {
    let theme = ColorfulTheme::default();
    println!("Initializing outreach configuration...\n");

    config.smtp.server = Input::with_theme(&theme)
        .with_prompt("SMTP server")
        .default(config.smtp.server.clone())
        .interact_text()?;

    let modes = ["starttls", "tls", "none"];
    config.smtp.security = match Select::with_theme(&theme)
        .with_prompt("Connection security")
        .items(&modes)
        .default(0)
        .interact()?
    {
        1 => SmtpSecurity::Tls,
        2 => SmtpSecurity::None,
        _ => SmtpSecurity::StartTls,
    };

    let default_port = if config.smtp.security == SmtpSecurity::Tls {
        465
    } else {
        config.smtp.port
    };
    config.smtp.port = Input::with_theme(&theme)
        .with_prompt("SMTP port")
        .default(default_port)
        .interact_text()?;

    let username: String = Input::with_theme(&theme)
        .with_prompt("Sender email address (leave empty to use EMAIL_USER)")
        .allow_empty(true)
        .interact_text()?;
    if !username.is_empty() {
        config.smtp.username = Some(username);
    }

    let store_password = Confirm::with_theme(&theme)
        .with_prompt("Store the SMTP password in the config file? (otherwise set EMAIL_PASSWORD)")
        .default(false)
        .interact()?;
    if store_password {
        config.smtp.password = Some(
            Password::with_theme(&theme)
                .with_prompt("SMTP password")
                .interact()?,
        );
    }

    let resume: String = Input::with_theme(&theme)
        .with_prompt("Path to resume attachment (leave empty to use RESUME_PATH)")
        .allow_empty(true)
        .interact_text()?;
    if !resume.is_empty() {
        config.message.resume_path = Some(PathBuf::from(resume));
    }

    config.message.template_path = PathBuf::from(
        Input::<String>::with_theme(&theme)
            .with_prompt("Email template path")
            .default(config.message.template_path.display().to_string())
            .interact_text()?,
    );

    config.dispatch.calls_per_period = Input::with_theme(&theme)
        .with_prompt("Emails allowed per period")
        .default(config.dispatch.calls_per_period)
        .interact_text()?;
    config.dispatch.period_seconds = Input::with_theme(&theme)
        .with_prompt("Period length in seconds")
        .default(config.dispatch.period_seconds)
        .interact_text()?;
    config.dispatch.validate()?;

    if config.smtp.username.is_some() && config.smtp.password.is_some() {
        print!("Testing SMTP login... ");
        let mailer = SmtpMailer::new(&config.smtp, &config.message)?;
        match mailer.test_connection().await {
            Ok(()) => println!("✓ Success"),
            Err(e) => {
                println!("✗ Failed");
                return Err(anyhow!("SMTP login failed: {e}"));
            }
        }
    }
    Ok(())
}
