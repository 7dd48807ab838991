use crate::contact::ContactRecord;
use crate::error::SendError;
use async_trait::async_trait;

pub mod mock;
pub mod smtp;

pub use mock::MockMailer;
pub use smtp::SmtpMailer;

/// The send primitive consumed by the dispatcher.
///
/// Implementations classify every failure into an
/// [`ErrorKind`](crate::error::ErrorKind) before returning it.
#[async_trait]
pub trait Mailer: std::fmt::Debug + Send + Sync {
    /// Deliver one rendered message to `record`.
    ///
    /// # Errors
    ///
    /// Returns a classified [`SendError`] when delivery fails.
    async fn send(&self, record: &ContactRecord, body: &str) -> Result<(), SendError>;
}
