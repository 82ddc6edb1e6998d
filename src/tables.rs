//! Durable pending and output tables.
//!
//! Both tables are small CSV files: the pending table holds not-yet-processed
//! (URL, key-signature) rows, the output table maps artifact paths to labels.
//! Each is read fully at batch start and rewritten fully at commit. Rewrites
//! go through a `.tmp` sibling followed by a rename so a crash mid-write never
//! leaves a half-written table; the previous file stays intact until the
//! rename lands.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Header row of the pending table.
pub const PENDING_HEADER: &str = "URL,ksig";
/// Header row of the output table.
pub const OUTPUT_HEADER: &str = "path,ksig";

/// One not-yet-processed row of the pending table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    /// Opaque media locator, typically a URL.
    pub reference: String,
    /// Key-signature label supplied by the producer.
    pub label: String,
}

/// One committed row of the output table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetRow {
    /// Path of the persisted spectrogram artifact.
    pub artifact_path: String,
    /// Key-signature label carried over from the pending entry.
    pub label: String,
}

/// Errors that may occur while reading or writing a table. All of them are
/// fatal to the batch.
#[derive(Debug, Error)]
pub enum TableError {
    /// The table file could not be read.
    #[error("Failed to read table {path}: {source}")]
    Read {
        /// Offending path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The table file could not be written or renamed into place.
    #[error("Failed to write table {path}: {source}")]
    Write {
        /// Offending path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// A data row did not have exactly two fields.
    #[error("Malformed row {line} in {path}: expected 2 fields, got {fields}")]
    MalformedRow {
        /// Offending path.
        path: PathBuf,
        /// 1-based record number; quoted fields may span physical lines.
        line: usize,
        /// Number of fields found.
        fields: usize,
    },
}

/// Load the pending table. A missing file is an empty table.
pub fn load_pending(path: &Path) -> Result<Vec<PendingEntry>, TableError> {
    let rows = read_rows(path)?;
    Ok(rows
        .into_iter()
        .map(|(reference, label)| PendingEntry { reference, label })
        .collect())
}

/// Load the output table. A missing file is an empty table.
pub fn load_output(path: &Path) -> Result<Vec<DatasetRow>, TableError> {
    let rows = read_rows(path)?;
    Ok(rows
        .into_iter()
        .map(|(artifact_path, label)| DatasetRow {
            artifact_path,
            label,
        })
        .collect())
}

/// Atomically rewrite the pending table.
pub fn save_pending(path: &Path, entries: &[PendingEntry]) -> Result<(), TableError> {
    write_rows(
        path,
        PENDING_HEADER,
        entries.iter().map(|e| (e.reference.as_str(), e.label.as_str())),
    )
}

/// Atomically rewrite the output table.
pub fn save_output(path: &Path, rows: &[DatasetRow]) -> Result<(), TableError> {
    write_rows(
        path,
        OUTPUT_HEADER,
        rows.iter().map(|r| (r.artifact_path.as_str(), r.label.as_str())),
    )
}

fn read_rows(path: &Path) -> Result<Vec<(String, String)>, TableError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = fs::read_to_string(path).map_err(|source| TableError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut rows = Vec::new();
    for (idx, record) in parse_records(&text).into_iter().enumerate() {
        // First record is the header.
        if idx == 0 {
            continue;
        }
        if record.len() != 2 {
            return Err(TableError::MalformedRow {
                path: path.to_path_buf(),
                line: idx + 1,
                fields: record.len(),
            });
        }
        let mut fields = record.into_iter();
        let first = fields.next().unwrap_or_default();
        let second = fields.next().unwrap_or_default();
        rows.push((first, second));
    }
    Ok(rows)
}

fn write_rows<'a>(
    path: &Path,
    header: &str,
    rows: impl Iterator<Item = (&'a str, &'a str)>,
) -> Result<(), TableError> {
    let write_err = |source| TableError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    let tmp = path.with_extension("tmp");
    {
        let file = fs::File::create(&tmp).map_err(write_err)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{header}").map_err(write_err)?;
        for (first, second) in rows {
            writeln!(writer, "{},{}", escape_field(first), escape_field(second))
                .map_err(write_err)?;
        }
        writer.flush().map_err(write_err)?;
    }
    fs::rename(&tmp, path).map_err(write_err)
}

/// Parse CSV text into records of fields, honoring double-quoted fields
/// with doubled-quote escapes. A newline inside quotes belongs to the
/// field, so a record may span physical lines; the write path quotes such
/// fields and this parser must take them back. Blank lines are skipped.
fn parse_records(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' if current.is_empty() => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            '\r' if !in_quotes && chars.peek() == Some(&'\n') => {}
            '\n' if !in_quotes => {
                if !fields.is_empty() || !current.is_empty() {
                    fields.push(std::mem::take(&mut current));
                    records.push(std::mem::take(&mut fields));
                }
            }
            _ => current.push(c),
        }
    }
    if !fields.is_empty() || !current.is_empty() {
        fields.push(current);
        records.push(fields);
    }
    records
}

fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
