use crate::contact::ContactRecord;
use crate::error::LoadError;
use ::csv::{ReaderBuilder, StringRecord, Trim, Writer};
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

/// Column positions of the three required fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Columns {
    name: usize,
    company: usize,
    email: usize,
}

impl Columns {
    /// Accepts `Name,Company,Email` and the `recruiter_name,company_name,recruiter_email`
    /// export format, case-insensitively, in any order.
    fn from_headers(headers: &StringRecord) -> Result<Self, LoadError> {
        let find = |aliases: [&str; 2]| {
            headers.iter().position(|h| {
                let h = h.trim().to_ascii_lowercase();
                aliases.iter().any(|a| *a == h)
            })
        };

        let name = find(["name", "recruiter_name"]);
        let company = find(["company", "company_name"]);
        let email = find(["email", "recruiter_email"]);

        match (name, company, email) {
            (Some(name), Some(company), Some(email)) => Ok(Self {
                name,
                company,
                email,
            }),
            _ => {
                let missing = [("Name", name), ("Company", company), ("Email", email)]
                    .into_iter()
                    .filter(|(_, idx)| idx.is_none())
                    .map(|(label, _)| label)
                    .collect();
                Err(LoadError::MissingColumns { missing })
            }
        }
    }
}

/// Load contacts from a CSV file.
///
/// # Errors
///
/// Returns an error if the file is missing or empty, lacks a required column,
/// or contains no valid rows.
pub fn load(path: &Path) -> Result<Vec<ContactRecord>, LoadError> {
    let file = std::fs::File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => LoadError::NotFound(path.to_path_buf()),
        _ => LoadError::Io(e),
    })?;
    parse(file, path)
}

/// Parse contacts from any CSV reader.
///
/// # Errors
///
/// See [`load`].
pub fn read<R: Read>(input: R) -> Result<Vec<ContactRecord>, LoadError> {
    parse(input, Path::new("<input>"))
}

fn parse<R: Read>(input: R, origin: &Path) -> Result<Vec<ContactRecord>, LoadError> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_reader(input);

    let headers = reader.headers()?.clone();
    if headers.iter().all(str::is_empty) {
        return Err(LoadError::Empty(origin.to_path_buf()));
    }
    let columns = Columns::from_headers(&headers)?;

    let mut records = Vec::new();
    for (line, row) in reader.records().enumerate() {
        let row = row?;
        let field = |idx: usize| row.get(idx).unwrap_or_default();
        match ContactRecord::new(field(columns.name), field(columns.company), field(columns.email)) {
            Ok(record) => records.push(record),
            Err(e) => warn!(row = line + 1, "Skipping invalid contact row: {e}"),
        }
    }

    if records.is_empty() {
        return Err(LoadError::NoRecords(origin.to_path_buf()));
    }
    Ok(records)
}

/// Write contacts in the `Name,Company,Email` shape [`load`] reads back.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn write(path: &Path, records: &[ContactRecord]) -> Result<(), LoadError> {
    let mut writer = Writer::from_path(path)?;
    if records.is_empty() {
        writer.write_record(["Name", "Company", "Email"])?;
    }
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    info!(count = records.len(), "Contacts saved to {}", path.display());
    Ok(())
}
