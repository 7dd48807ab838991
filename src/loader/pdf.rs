use crate::contact::{clean_text, find_email, ContactRecord};
use crate::error::LoadError;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId};
use std::path::Path;
use tracing::{error, warn};

/// Columns in the recruiter table: index, name, email (plus title text), title, company.
const TABLE_WIDTH: usize = 5;
const NAME_CELL: usize = 1;
const EMAIL_CELL: usize = 2;
const COMPANY_CELL: usize = 4;

/// Baselines closer than this many points belong to the same row.
const ROW_TOLERANCE: f64 = 2.0;
/// A `TJ` adjustment wider than this (thousandths of an em) reads as a word gap.
const TJ_WORD_GAP: f64 = 200.0;

/// Load recruiter rows from the table on each page of a PDF.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or parsed, or no page yields a valid row.
pub fn load(path: &Path) -> Result<Vec<ContactRecord>, LoadError> {
    if !path.exists() {
        return Err(LoadError::NotFound(path.to_path_buf()));
    }
    let document = Document::load(path)?;

    let mut records = Vec::new();
    for (index, (_, page_id)) in document.get_pages().into_iter().enumerate() {
        match page_table(&document, page_id) {
            Ok(table) => records.extend(records_from_table(index, &table)),
            Err(e) => error!(page = index + 1, "Error processing page {}: {e}", index + 1),
        }
    }

    if records.is_empty() {
        error!("No valid recruiter data extracted from PDF.");
        return Err(LoadError::NoRecords(path.to_path_buf()));
    }
    Ok(records)
}

fn page_table(document: &Document, page_id: ObjectId) -> Result<Vec<Vec<String>>, lopdf::Error> {
    let content = Content::decode(&document.get_page_content(page_id)?)?;
    Ok(extract_table(&content.operations))
}

/// A run of text drawn at one position.
#[derive(Debug, Clone, PartialEq)]
struct Cell {
    x: f64,
    y: f64,
    text: String,
}

/// Start of the current text line, in text space.
#[derive(Debug, Default, Clone, Copy)]
struct TextCursor {
    x: f64,
    y: f64,
    leading: f64,
}

impl TextCursor {
    fn move_by(&mut self, tx: f64, ty: f64) {
        self.x += tx;
        self.y += ty;
    }

    fn next_line(&mut self) {
        self.y -= self.leading;
    }
}

/// Rebuild the table drawn by a page's content stream.
///
/// Every positioned text run is one cell. Cells whose baselines line up form
/// a row, read top to bottom; cells within a row are ordered left to right.
#[must_use]
pub fn extract_table(operations: &[Operation]) -> Vec<Vec<String>> {
    let mut cursor = TextCursor::default();
    let mut cells: Vec<Cell> = Vec::new();
    // whether the next shown string continues the last cell
    let mut continuing = false;

    for operation in operations {
        let operands = operation.operands.as_slice();
        let shown = match (operation.operator.as_str(), operands) {
            ("BT", _) => {
                cursor = TextCursor {
                    leading: cursor.leading,
                    ..TextCursor::default()
                };
                continuing = false;
                None
            }
            ("Td", [tx, ty]) => {
                cursor.move_by(number(tx), number(ty));
                continuing = false;
                None
            }
            ("TD", [tx, ty]) => {
                cursor.leading = -number(ty);
                cursor.move_by(number(tx), number(ty));
                continuing = false;
                None
            }
            ("Tm", [_, _, _, _, e, f]) => {
                cursor.x = number(e);
                cursor.y = number(f);
                continuing = false;
                None
            }
            ("TL", [leading]) => {
                cursor.leading = number(leading);
                None
            }
            ("T*", _) => {
                cursor.next_line();
                continuing = false;
                None
            }
            ("Tj" | "TJ", [text]) => Some(shown_text(text)),
            ("'", [text]) | ("\"", [_, _, text]) => {
                cursor.next_line();
                continuing = false;
                Some(shown_text(text))
            }
            _ => None,
        };

        let Some(text) = shown else { continue };
        if continuing {
            if let Some(cell) = cells.last_mut() {
                cell.text.push_str(&text);
                continue;
            }
        }
        if text.trim().is_empty() {
            continue;
        }
        cells.push(Cell {
            x: cursor.x,
            y: cursor.y,
            text,
        });
        continuing = true;
    }

    group_rows(cells)
}

fn group_rows(mut cells: Vec<Cell>) -> Vec<Vec<String>> {
    // PDF y grows upwards, so the top row has the largest y.
    cells.sort_by(|a, b| b.y.total_cmp(&a.y));

    let mut rows: Vec<(f64, Vec<Cell>)> = Vec::new();
    for cell in cells {
        match rows.last_mut() {
            Some((y, row)) if (*y - cell.y).abs() <= ROW_TOLERANCE => row.push(cell),
            _ => rows.push((cell.y, vec![cell])),
        }
    }

    rows.into_iter()
        .map(|(_, mut row)| {
            row.sort_by(|a, b| a.x.total_cmp(&b.x));
            row.iter().map(|cell| clean_text(&cell.text)).collect()
        })
        .collect()
}

#[allow(clippy::cast_precision_loss)]
fn number(object: &Object) -> f64 {
    match object {
        Object::Integer(value) => *value as f64,
        Object::Real(value) => f64::from(*value),
        _ => 0.0,
    }
}

fn shown_text(object: &Object) -> String {
    match object {
        Object::String(bytes, _) => decode_text(bytes),
        Object::Array(items) => items
            .iter()
            .map(|item| match item {
                Object::String(bytes, _) => decode_text(bytes),
                other if number(other) < -TJ_WORD_GAP => " ".to_string(),
                _ => String::new(),
            })
            .collect(),
        _ => String::new(),
    }
}

/// Decode a PDF string: UTF-16BE when it carries a byte order mark, otherwise
/// one byte per character.
fn decode_text(bytes: &[u8]) -> String {
    match bytes {
        [0xFE, 0xFF, rest @ ..] => {
            let units: Vec<u16> = rest
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        _ => bytes.iter().copied().map(char::from).collect(),
    }
}

/// Turn one page's table into records.
///
/// `page_index` is zero-based; every page after the first repeats the table
/// header, which is dropped.
#[must_use]
pub fn records_from_table(page_index: usize, table: &[Vec<String>]) -> Vec<ContactRecord> {
    let page = page_index + 1;
    if table.is_empty() {
        warn!(page, "No table found on page {page}.");
        return Vec::new();
    }

    let rows = if page_index > 0 { &table[1..] } else { table };
    rows.iter()
        .filter_map(|row| {
            if row.len() != TABLE_WIDTH {
                warn!(page, "Skipping row with incorrect column count on page {page}: {row:?}");
                return None;
            }
            let Some(email) = find_email(&row[EMAIL_CELL]) else {
                warn!(page, "No valid email found in row on page {page}. Skipping. Data: {row:?}");
                return None;
            };
            match ContactRecord::new(&row[NAME_CELL], &row[COMPANY_CELL], email) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(page, "Skipping row on page {page}: {e}");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn op(operator: &str, operands: Vec<Object>) -> Operation {
        Operation::new(operator, operands)
    }

    /// One row in its own text block, cells placed with relative `Td` moves.
    fn row(y: i64, cells: &[&str]) -> Vec<Operation> {
        let mut ops = vec![
            op("BT", vec![]),
            op("Tf", vec!["F1".into(), Object::Integer(10)]),
        ];
        for (i, cell) in cells.iter().enumerate() {
            let (tx, ty) = if i == 0 { (40, y) } else { (110, 0) };
            ops.push(op("Td", vec![Object::Integer(tx), Object::Integer(ty)]));
            ops.push(op("Tj", vec![Object::string_literal(*cell)]));
        }
        ops.push(op("ET", vec![]));
        ops
    }

    fn strings(table: &[Vec<String>]) -> Vec<Vec<&str>> {
        table
            .iter()
            .map(|row| row.iter().map(String::as_str).collect())
            .collect()
    }

    #[test]
    fn test_extract_table_from_relative_moves() {
        let mut ops = row(700, &["SNo", "Name", "Email", "Title", "Company"]);
        ops.extend(row(680, &["1", "Asha Rao", "asha.rao@acme.io", "Talent Lead", "Acme Corp"]));

        let table = extract_table(&ops);
        assert_eq!(
            strings(&table),
            vec![
                vec!["SNo", "Name", "Email", "Title", "Company"],
                vec!["1", "Asha Rao", "asha.rao@acme.io", "Talent Lead", "Acme Corp"],
            ]
        );
    }

    #[test]
    fn test_extract_table_from_absolute_cells_out_of_order() {
        // one text block per cell, drawn column by column
        let cell = |x: i64, y: i64, text: &str| {
            vec![
                op("BT", vec![]),
                op(
                    "Tm",
                    [1, 0, 0, 1, x, y].into_iter().map(Object::Integer).collect(),
                ),
                op("Tj", vec![Object::string_literal(text)]),
                op("ET", vec![]),
            ]
        };
        let mut ops = Vec::new();
        ops.extend(cell(200, 650, "Ben"));
        ops.extend(cell(200, 700, "Asha"));
        ops.extend(cell(40, 701, "1"));
        ops.extend(cell(40, 649, "2"));

        assert_eq!(
            strings(&extract_table(&ops)),
            vec![vec!["1", "Asha"], vec!["2", "Ben"]]
        );
    }

    #[test]
    fn test_adjacent_strings_join_one_cell() {
        let ops = vec![
            op("BT", vec![]),
            op("Td", vec![Object::Integer(40), Object::Integer(700)]),
            op("Tj", vec![Object::string_literal("Asha")]),
            op(
                "TJ",
                vec![Object::Array(vec![
                    Object::Integer(-300),
                    Object::string_literal("R"),
                    Object::Integer(-20),
                    Object::string_literal("ao"),
                ])],
            ),
            op("ET", vec![]),
        ];
        assert_eq!(strings(&extract_table(&ops)), vec![vec!["Asha Rao"]]);
    }

    #[test]
    fn test_next_line_operators_start_new_rows() {
        let ops = vec![
            op("BT", vec![]),
            op("TD", vec![Object::Integer(40), Object::Integer(-14)]),
            op("Tj", vec![Object::string_literal("first")]),
            op("T*", vec![]),
            op("Tj", vec![Object::string_literal("second")]),
            op("'", vec![Object::string_literal("third")]),
            op("ET", vec![]),
        ];
        assert_eq!(
            strings(&extract_table(&ops)),
            vec![vec!["first"], vec!["second"], vec!["third"]]
        );
    }

    #[test]
    fn test_decode_utf16_strings() {
        assert_eq!(decode_text(&[0xFE, 0xFF, 0x00, 0x4A, 0x00, 0xF6]), "Jö");
        assert_eq!(decode_text(b"plain"), "plain");
    }

    fn table(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|row| row.iter().map(|cell| (*cell).to_string()).collect())
            .collect()
    }

    #[test]
    fn test_first_page_keeps_rows_and_drops_header_without_email() {
        let page = table(&[
            &["SNo", "Name", "Email", "Title", "Company"],
            &["1", "Asha Rao", "asha.rao@acme.io", "Talent Lead", "Acme Corp"],
            &["2", "Ben Ortiz", "ben@globex.com Recruiter", "Recruiter", "Globex"],
        ]);
        let records = records_from_table(0, &page);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name(), "Asha Rao");
        assert_eq!(records[0].email(), "asha.rao@acme.io");
        assert_eq!(records[0].company(), "Acme Corp");
        assert_eq!(records[1].email(), "ben@globex.com");
    }

    #[test]
    fn test_later_pages_skip_repeated_header() {
        let page = table(&[
            &["3", "Cara Diaz", "cara@initech.com", "Sourcer", "Initech"],
            &["4", "Dev Patel", "dev@hooli.com", "HR", "Hooli"],
        ]);
        let records = records_from_table(1, &page);
        // first row is treated as the repeated header
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].email(), "dev@hooli.com");
    }

    #[test]
    fn test_skips_malformed_rows() {
        let page = table(&[
            &["1", "Ann", "ann@x.io", "HR"],
            &["2", "Bo", "no email here", "HR", "Y"],
            &["3", "Cy", "cy@z.io", "HR", "Z"],
        ]);
        let records = records_from_table(0, &page);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].email(), "cy@z.io");
    }

    #[test]
    fn test_blank_page() {
        assert!(extract_table(&[]).is_empty());
        assert!(records_from_table(0, &[]).is_empty());
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            load(Path::new("/nonexistent/recruiters.pdf")),
            Err(LoadError::NotFound(_))
        ));
    }
}
