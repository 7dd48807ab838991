use crate::error::RecordError;
use regex::Regex;
use serde::Serialize;
use std::fmt::{self, Display, Formatter};
use std::sync::OnceLock;

const DEFAULT_NAME: &str = "HR";
const DEFAULT_COMPANY: &str = "your company";

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").expect("email pattern is valid")
    })
}

/// Find the first address-shaped substring in a block of text.
#[must_use]
pub fn find_email(text: &str) -> Option<&str> {
    email_regex().find(text).map(|m| m.as_str())
}

/// Collapse runs of whitespace (including newlines) into single spaces.
#[must_use]
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A single recipient. Normalized and validated on construction, immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ContactRecord {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Company")]
    company: String,
    #[serde(rename = "Email")]
    email: String,
}

impl ContactRecord {
    /// Build a record from raw field values.
    ///
    /// The name and company are whitespace-collapsed; a blank company falls
    /// back to `your company`. The full name is kept, see [`Self::first_name`]
    /// for the greeting form.
    ///
    /// # Errors
    ///
    /// Returns an error if the email is empty or is not a plain `local@domain.tld` address.
    pub fn new(name: &str, company: &str, email: &str) -> Result<Self, RecordError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(RecordError::MissingEmail);
        }
        if find_email(email) != Some(email) {
            return Err(RecordError::InvalidEmail(email.to_string()));
        }

        let name = clean_text(name);
        let company = match clean_text(company) {
            c if c.is_empty() => DEFAULT_COMPANY.to_string(),
            c => c,
        };

        Ok(Self {
            name,
            company,
            email: email.to_string(),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// First word of the name, or `HR` when the name is blank.
    #[must_use]
    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or(DEFAULT_NAME)
    }

    #[must_use]
    pub fn company(&self) -> &str {
        &self.company
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }
}

impl Display for ContactRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = if self.name.is_empty() {
            DEFAULT_NAME
        } else {
            &self.name
        };
        write!(f, "{name} <{}> at {}", self.email, self.company)
    }
}
