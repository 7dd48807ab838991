use super::Mailer;
use crate::config::{MessageConfig, SmtpConfig, SmtpSecurity};
use crate::contact::ContactRecord;
use crate::error::{ErrorKind, SendError};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::Error as SmtpError;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone)]
struct ResumeAttachment {
    filename: String,
    content: Vec<u8>,
    content_type: ContentType,
}

/// Sends each message over SMTP, attaching the configured resume.
#[derive(Debug)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    subject: String,
    attachment: Option<ResumeAttachment>,
}

impl SmtpMailer {
    /// Build the transport and read the attachment once, up front.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The sender address is missing or malformed
    /// - The SMTP relay cannot be configured for the given host
    /// - The resume file cannot be read
    pub fn new(smtp: &SmtpConfig, message: &MessageConfig) -> Result<Self> {
        let sender = message
            .from
            .as_deref()
            .or(smtp.username.as_deref())
            .ok_or_else(|| anyhow!("a sender address (smtp.username or message.from) is required"))?;
        let from: Mailbox = sender
            .parse()
            .with_context(|| format!("Invalid sender address: {sender}"))?;

        let builder = match smtp.security {
            SmtpSecurity::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.server)
                .with_context(|| format!("Failed to configure STARTTLS relay {}", smtp.server))?,
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.server)
                .with_context(|| format!("Failed to configure TLS relay {}", smtp.server))?,
            SmtpSecurity::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp.server),
        };
        let mut builder = builder
            .port(smtp.port)
            .timeout(Some(Duration::from_secs(smtp.timeout_seconds)));
        if let (Some(user), Some(password)) = (&smtp.username, &smtp.password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }

        let attachment = message
            .resume_path
            .as_deref()
            .map(load_attachment)
            .transpose()?;

        info!(
            server = %smtp.server,
            port = smtp.port,
            security = ?smtp.security,
            "SMTP transport configured"
        );

        Ok(Self {
            transport: builder.build(),
            from,
            subject: message.subject.clone(),
            attachment,
        })
    }

    /// Open a connection and authenticate without sending anything.
    ///
    /// # Errors
    ///
    /// Returns the classified transport error if the server rejects us.
    pub async fn test_connection(&self) -> Result<(), SendError> {
        match self.transport.test_connection().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(SendError::new(
                ErrorKind::Connection,
                "SMTP server did not accept the connection",
            )),
            Err(e) => Err(SendError::new(classify(&e), e.to_string())),
        }
    }

    fn build_message(&self, record: &ContactRecord, body: &str) -> Result<Message, SendError> {
        let to: Mailbox = record.email().parse().map_err(|e| {
            SendError::new(
                ErrorKind::InvalidAddress,
                format!("{}: {e}", record.email()),
            )
        })?;

        let text = SinglePart::plain(body.to_string());
        let parts = match &self.attachment {
            Some(resume) => MultiPart::mixed().singlepart(text).singlepart(
                Attachment::new(resume.filename.clone())
                    .body(resume.content.clone(), resume.content_type.clone()),
            ),
            None => MultiPart::mixed().singlepart(text),
        };

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(self.subject.clone())
            .multipart(parts)
            .map_err(|e| SendError::new(ErrorKind::Message, e.to_string()))
    }
}

fn load_attachment(path: &Path) -> Result<ResumeAttachment> {
    let content = std::fs::read(path)
        .with_context(|| format!("Resume file not found at {}. Cannot attach.", path.display()))?;
    let filename = path
        .file_name()
        .map_or_else(|| "resume".to_string(), |n| n.to_string_lossy().into_owned());
    let content_type = ContentType::parse("application/octet-stream")
        .map_err(|e| anyhow!("Invalid attachment content type: {e}"))?;
    Ok(ResumeAttachment {
        filename,
        content,
        content_type,
    })
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, record: &ContactRecord, body: &str) -> Result<(), SendError> {
        let message = self.build_message(record, body)?;
        match self.transport.send(message).await {
            Ok(response) => {
                debug!(email = %record.email(), code = %response.code(), "SMTP accepted message");
                Ok(())
            }
            Err(e) => Err(SendError::new(classify(&e), e.to_string())),
        }
    }
}

/// Map an SMTP reply code onto the error taxonomy.
#[must_use]
pub const fn classify_reply(code: u16) -> ErrorKind {
    match code {
        400..=499 => ErrorKind::TemporaryRejection,
        530 | 534 | 535 | 538 => ErrorKind::Authentication,
        501 | 510 | 511 | 553 => ErrorKind::InvalidAddress,
        500..=599 => ErrorKind::PermanentRejection,
        _ => ErrorKind::Unclassified,
    }
}

/// Classify a transport error once, at the boundary.
#[must_use]
pub fn classify(err: &SmtpError) -> ErrorKind {
    if let Some(code) = err.status().and_then(|c| c.to_string().parse::<u16>().ok()) {
        return classify_reply(code);
    }
    if err.is_transient() {
        return ErrorKind::TemporaryRejection;
    }
    if err.is_permanent() {
        return ErrorKind::PermanentRejection;
    }
    if err.is_timeout() {
        return ErrorKind::Timeout;
    }
    if err.is_tls() {
        return ErrorKind::Connection;
    }

    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            return classify_io(io.kind());
        }
        source = cause.source();
    }
    ErrorKind::Unclassified
}

const fn classify_io(kind: std::io::ErrorKind) -> ErrorKind {
    match kind {
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => ErrorKind::Timeout,
        _ => ErrorKind::Connection,
    }
}
