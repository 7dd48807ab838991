pub mod campaign;
pub mod cli;
pub mod config;
pub mod contact;
pub mod dispatcher;
pub mod error;
pub mod init;
pub mod loader;
pub mod mailer;
pub mod rate_limiter;
pub mod report;
pub mod retry;
pub mod template;

// Re-export key types for convenience
pub use campaign::{Campaign, CampaignOptions};
pub use config::Config;
pub use contact::ContactRecord;
pub use dispatcher::{Dispatcher, SendResult};
pub use error::{ErrorKind, SendError};
pub use init::{initialize_config, InitOptions};
pub use loader::ContactSource;
pub use mailer::{Mailer, MockMailer, SmtpMailer};
pub use rate_limiter::RateLimiter;
pub use report::Summary;
pub use retry::RetryPolicy;

// Test utilities module - only compiled with test or testing feature
#[cfg(any(test, feature = "testing"))]
pub mod test_utils;
