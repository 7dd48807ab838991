use crate::contact::ContactRecord;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Email template file not found at {}", .0.display())]
    NotFound(PathBuf),
    #[error("Error loading email template: {0}")]
    Io(#[from] std::io::Error),
    #[error("Email template uses unknown placeholder '{{{0}}}'; expected {{recruiter_name}} or {{company_name}}")]
    UnknownPlaceholder(String),
    #[error("Email template has an unmatched '{brace}' at byte {offset}")]
    UnmatchedBrace { brace: char, offset: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    RecruiterName,
    CompanyName,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Field),
}

/// A parsed message body with `{recruiter_name}` / `{company_name}` placeholders.
///
/// Braces are escaped by doubling them. Parsing happens once, so rendering a
/// record can no longer fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// Parse template text.
    ///
    /// # Errors
    ///
    /// Returns an error on an unknown placeholder or a lone `{`/`}`.
    pub fn parse(text: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = text.char_indices().peekable();

        while let Some((offset, c)) = chars.next() {
            match c {
                '{' if chars.peek().map(|&(_, n)| n) == Some('{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek().map(|&(_, n)| n) == Some('}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, n) in chars.by_ref() {
                        if n == '}' {
                            closed = true;
                            break;
                        }
                        name.push(n);
                    }
                    if !closed {
                        return Err(TemplateError::UnmatchedBrace { brace: '{', offset });
                    }
                    let field = match name.trim() {
                        "recruiter_name" => Field::RecruiterName,
                        "company_name" => Field::CompanyName,
                        _ => return Err(TemplateError::UnknownPlaceholder(name)),
                    };
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(field));
                }
                '}' => return Err(TemplateError::UnmatchedBrace { brace: '}', offset }),
                _ => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { segments })
    }

    /// Read and parse a template file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unreadable, or does not parse.
    pub fn from_file(path: &Path) -> Result<Self, TemplateError> {
        let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => TemplateError::NotFound(path.to_path_buf()),
            _ => TemplateError::Io(e),
        })?;
        let template = Self::parse(&text)?;
        info!("Email template loaded from {}", path.display());
        Ok(template)
    }

    /// Fill in the placeholders; `{recruiter_name}` greets by first name.
    #[must_use]
    pub fn render(&self, record: &ContactRecord) -> String {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(text) => text.as_str(),
                Segment::Field(Field::RecruiterName) => record.first_name(),
                Segment::Field(Field::CompanyName) => record.company(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn record() -> ContactRecord {
        ContactRecord::new("Priya Nair", "Initech", "priya@initech.com").unwrap()
    }

    #[test]
    fn test_render_placeholders() {
        let template =
            Template::parse("Hi {recruiter_name},\nI would love to join {company_name}.").unwrap();
        assert_eq!(
            template.render(&record()),
            "Hi Priya,\nI would love to join Initech."
        );
    }

    #[test]
    fn test_escaped_braces() {
        let template = Template::parse("{{literal}} for {recruiter_name} }}").unwrap();
        assert_eq!(template.render(&record()), "{literal} for Priya }");
    }

    #[test]
    fn test_unknown_placeholder() {
        let err = Template::parse("Dear {first_name}").unwrap_err();
        assert!(matches!(err, TemplateError::UnknownPlaceholder(ref p) if p == "first_name"));
    }

    #[test]
    fn test_unmatched_braces() {
        assert!(matches!(
            Template::parse("Dear {recruiter_name"),
            Err(TemplateError::UnmatchedBrace { brace: '{', offset: 5 })
        ));
        assert!(matches!(
            Template::parse("oops }"),
            Err(TemplateError::UnmatchedBrace { brace: '}', .. })
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "Hello {{recruiter_name}}").unwrap();
        // the file holds "Hello {recruiter_name}" after write! unescapes
        let template = Template::from_file(file.path()).unwrap();
        assert_eq!(template.render(&record()), "Hello Priya");

        let missing = Template::from_file(Path::new("/nonexistent/template.md"));
        assert!(matches!(missing, Err(TemplateError::NotFound(_))));
    }
}
