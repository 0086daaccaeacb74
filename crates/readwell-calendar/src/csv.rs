//! CSV reading-plan import.
//!
//! Layout: a header row, then `date, reading` rows. Extra columns are
//! ignored, including on rows wider than the header; a row is only checked
//! for having at least two fields. The import is all-or-nothing: the first bad row rejects the file.
//!
//! The record reader is deliberately small: RFC 4180 quoting (`""` escapes,
//! embedded commas and newlines), CRLF or LF endings, leading whitespace
//! trimmed per field, blank lines skipped. No csv crate dependency.

use chrono::NaiveDate;
use readwell_core::config::ImportConfig;
use readwell_core::{Granularity, ScheduledItem};
use serde::Serialize;
use thiserror::Error;

use crate::parser::{DateParser, ParseError};

/// Leading characters that spreadsheet apps may evaluate as a formula.
pub const FORMULA_PREFIXES: [char; 6] = ['=', '+', '-', '@', '\t', '\r'];

/// Size limits applied during import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportLimits {
    /// Maximum data rows (header excluded).
    pub max_rows: usize,
    /// Maximum reading length, in characters.
    pub max_content_length: usize,
}

impl Default for ImportLimits {
    fn default() -> Self {
        Self::from(&ImportConfig::default())
    }
}

impl From<&ImportConfig> for ImportLimits {
    fn from(config: &ImportConfig) -> Self {
        Self {
            max_rows: config.max_rows,
            max_content_length: config.max_content_length,
        }
    }
}

/// Why a single row was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowError {
    #[error("insufficient columns")]
    InsufficientColumns,

    #[error("date and reading content are required")]
    MissingField,

    #[error("content exceeds maximum length of {max} characters")]
    ContentTooLong { max: usize },

    #[error("content cannot start with formula characters (=, +, -, @)")]
    FormulaInjection,

    #[error(transparent)]
    Date(#[from] ParseError),
}

/// Why an import was rejected. Nothing is accepted when this is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImportError {
    #[error("reading CSV (ensure proper quoting): line {line}: {reason}")]
    Malformed { line: usize, reason: &'static str },

    #[error("CSV must have at least a header and one data row")]
    TooFewRecords,

    #[error("CSV must have at least 2 columns: date and reading")]
    HeaderTooNarrow,

    #[error("CSV exceeds maximum of {max} rows")]
    TooManyRows { max: usize },

    #[error("row {row}: {reason}")]
    Row { row: usize, reason: RowError },
}

/// A validated row, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemDraft {
    pub date: NaiveDate,
    pub granularity: Granularity,
    pub content: String,
}

impl ItemDraft {
    /// The pending item this row becomes once stored under `parent_id`.
    pub fn into_item(self, id: i64, parent_id: i64) -> ScheduledItem {
        ScheduledItem::pending(id, parent_id, self.date, self.granularity, self.content)
    }
}

pub fn is_formula_injection(content: &str) -> bool {
    content.starts_with(FORMULA_PREFIXES)
}

/// Parse a whole CSV document into drafts.
///
/// Row numbers in errors are 1-indexed with the header as row 1.
pub fn parse_csv(
    input: &str,
    parser: &DateParser,
    limits: &ImportLimits,
) -> Result<Vec<ItemDraft>, ImportError> {
    let records = read_records(input)?;

    if records.len() < 2 {
        return Err(ImportError::TooFewRecords);
    }
    if records.len() > limits.max_rows + 1 {
        return Err(ImportError::TooManyRows { max: limits.max_rows });
    }
    if records[0].len() < 2 {
        return Err(ImportError::HeaderTooNarrow);
    }

    let drafts = records
        .iter()
        .enumerate()
        .skip(1)
        .map(|(i, record)| {
            parse_row(record, parser, limits).map_err(|reason| ImportError::Row { row: i + 1, reason })
        })
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!("📥 Parsed {} readings from CSV", drafts.len());
    Ok(drafts)
}

fn parse_row(
    record: &[String],
    parser: &DateParser,
    limits: &ImportLimits,
) -> Result<ItemDraft, RowError> {
    if record.len() < 2 {
        return Err(RowError::InsufficientColumns);
    }

    let raw_date = record[0].trim();
    let content = record[1].trim();
    if raw_date.is_empty() || content.is_empty() {
        return Err(RowError::MissingField);
    }
    check_content(content, limits)?;

    let (date, granularity) = parser.parse(raw_date)?;
    Ok(ItemDraft {
        date,
        granularity,
        content: content.to_string(),
    })
}

/// Length and formula-prefix checks shared by import and in-place edits.
pub fn check_content(content: &str, limits: &ImportLimits) -> Result<(), RowError> {
    if content.chars().count() > limits.max_content_length {
        return Err(RowError::ContentTooLong { max: limits.max_content_length });
    }
    if is_formula_injection(content) {
        return Err(RowError::FormulaInjection);
    }
    Ok(())
}

fn read_records(input: &str) -> Result<Vec<Vec<String>>, ImportError> {
    let mut records = Vec::new();
    let mut chars = input.chars().peekable();
    let mut line = 1;

    while let Some(&first) = chars.peek() {
        // Blank line.
        if first == '\n' || first == '\r' {
            chars.next();
            if first == '\r' && chars.peek() == Some(&'\n') {
                chars.next();
            }
            line += 1;
            continue;
        }

        let mut record = Vec::new();
        loop {
            while matches!(chars.peek(), Some(' ') | Some('\t')) {
                chars.next();
            }

            let mut field = String::new();
            if chars.peek() == Some(&'"') {
                chars.next();
                loop {
                    match chars.next() {
                        None => {
                            return Err(ImportError::Malformed {
                                line,
                                reason: "unterminated quoted field",
                            });
                        }
                        Some('"') if chars.peek() == Some(&'"') => {
                            chars.next();
                            field.push('"');
                        }
                        Some('"') => break,
                        Some(c) => {
                            if c == '\n' {
                                line += 1;
                            }
                            field.push(c);
                        }
                    }
                }
                if !matches!(chars.peek(), None | Some(',') | Some('\n') | Some('\r')) {
                    return Err(ImportError::Malformed {
                        line,
                        reason: "unexpected character after closing quote",
                    });
                }
            } else {
                while let Some(&c) = chars.peek() {
                    match c {
                        ',' | '\n' | '\r' => break,
                        '"' => {
                            return Err(ImportError::Malformed {
                                line,
                                reason: "bare quote in unquoted field",
                            });
                        }
                        _ => {
                            field.push(c);
                            chars.next();
                        }
                    }
                }
            }
            record.push(field);

            match chars.next() {
                Some(',') => continue,
                Some('\r') => {
                    if chars.peek() == Some(&'\n') {
                        chars.next();
                    }
                    line += 1;
                    break;
                }
                Some('\n') => {
                    line += 1;
                    break;
                }
                _ => break,
            }
        }
        records.push(record);
    }

    Ok(records)
}
