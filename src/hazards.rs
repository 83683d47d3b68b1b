//! Spreadsheet hazard extraction: parses an uploaded table into
//! de-duplicated records and renders one as a prompt.
//!
//! The first row is the header. Every later row becomes a [`HazardRecord`]
//! whose cells are already converted to display strings, so duplicate
//! detection and rendering agree on what a value looks like.

use std::collections::HashSet;
use std::io::Cursor;

use calamine::{Data, DataType, Reader, open_workbook_auto_from_rs};
use serde::Serialize;
use tracing::debug;

use crate::error::ExtractError;

/// Display form of an empty cell.
const MISSING_VALUE: &str = "nan";

/// Workbook formats calamine recognises by extension.
const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "xla", "ods"];

/// How the uploaded bytes should be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpreadsheetFormat {
    /// Excel / OpenDocument workbook; only the first sheet is read.
    Workbook,
    /// Comma-separated values.
    Csv,
}

impl SpreadsheetFormat {
    /// Pick a format from the file name, falling back to sniffing the bytes.
    pub fn detect(file_name: Option<&str>, bytes: &[u8]) -> Self {
        let ext = file_name
            .and_then(|n| n.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase());

        match ext.as_deref() {
            Some("csv") | Some("txt") => Self::Csv,
            Some(e) if WORKBOOK_EXTENSIONS.contains(&e) => Self::Workbook,
            _ if bytes.starts_with(b"PK\x03\x04") || bytes.starts_with(&[0xD0, 0xCF, 0x11, 0xE0]) => {
                Self::Workbook
            }
            _ => Self::Csv,
        }
    }
}

/// One de-duplicated data row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct HazardRecord {
    /// Cell display strings, one per column, in column order.
    pub values: Vec<String>,
}

/// The parsed upload: column names plus unique records, re-indexed from 0.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HazardTable {
    pub columns: Vec<String>,
    pub records: Vec<HazardRecord>,
    /// Data rows before de-duplication.
    pub raw_row_count: usize,
}

impl HazardTable {
    /// Build a table from a header and raw rows, dropping exact duplicate
    /// rows while keeping the first occurrence.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = columns.len();
        let raw_row_count = rows.len();
        let mut seen = HashSet::new();
        let mut records = Vec::with_capacity(rows.len());

        for mut values in rows {
            values.resize(width, MISSING_VALUE.to_string());
            let record = HazardRecord { values };
            if seen.insert(record.clone()) {
                records.push(record);
            }
        }

        debug!(
            columns = width,
            raw_rows = raw_row_count,
            unique = records.len(),
            "Hazard table built"
        );

        Self {
            columns,
            records,
            raw_row_count,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Render record `index` as a prompt:
    ///
    /// ```text
    /// Hazard {index+1}:
    /// {column}: {value}
    /// ...
    /// ```
    pub fn render(&self, index: usize) -> Result<String, ExtractError> {
        let record = self.records.get(index).ok_or(ExtractError::Index {
            index,
            len: self.records.len(),
        })?;

        let mut text = format!("Hazard {}:\n", index + 1);
        for (column, value) in self.columns.iter().zip(&record.values) {
            text.push_str(column);
            text.push_str(": ");
            text.push_str(value);
            text.push('\n');
        }
        Ok(text)
    }
}

/// Parse uploaded bytes into a de-duplicated hazard table.
pub fn extract(bytes: &[u8], format: SpreadsheetFormat) -> Result<HazardTable, ExtractError> {
    let (mut header, rows) = match format {
        SpreadsheetFormat::Workbook => read_workbook(bytes)?,
        SpreadsheetFormat::Csv => read_csv(bytes)?,
    };

    if header.is_empty() {
        return Err(ExtractError::Parse {
            reason: "no header row found".to_string(),
        });
    }

    // Rows wider than the header keep their extra cells under generated names.
    let width = rows.iter().map(Vec::len).max().unwrap_or(0).max(header.len());
    header.resize(width, String::new());

    let columns = header
        .into_iter()
        .enumerate()
        .map(|(i, name)| {
            if name.trim().is_empty() || name == MISSING_VALUE {
                format!("Unnamed: {i}")
            } else {
                name
            }
        })
        .collect();

    Ok(HazardTable::from_rows(columns, rows))
}

type RawTable = (Vec<String>, Vec<Vec<String>>);

fn read_workbook(bytes: &[u8]) -> Result<RawTable, ExtractError> {
    let mut workbook =
        open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())).map_err(|e| ExtractError::Parse {
            reason: e.to_string(),
        })?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ExtractError::Parse {
            reason: "workbook has no sheets".to_string(),
        })?
        .map_err(|e| ExtractError::Parse {
            reason: e.to_string(),
        })?;

    let mut rows = range
        .rows()
        .map(|row| row.iter().map(cell_display).collect::<Vec<_>>());
    let header = rows.next().unwrap_or_default();
    Ok((header, rows.collect()))
}

fn read_csv(bytes: &[u8]) -> Result<RawTable, ExtractError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let header = reader
        .headers()
        .map_err(|e| ExtractError::Parse {
            reason: e.to_string(),
        })?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ExtractError::Parse {
            reason: e.to_string(),
        })?;
        rows.push(
            record
                .iter()
                .map(|field| {
                    if field.is_empty() {
                        MISSING_VALUE.to_string()
                    } else {
                        field.to_string()
                    }
                })
                .collect(),
        );
    }
    Ok((header, rows))
}

/// Display string for a workbook cell.
fn cell_display(cell: &Data) -> String {
    match cell {
        Data::Empty => MISSING_VALUE.to_string(),
        Data::String(s) => s.clone(),
        Data::Float(f) => format_float(*f),
        Data::Int(i) => i.to_string(),
        Data::Bool(true) => "True".to_string(),
        Data::Bool(false) => "False".to_string(),
        Data::Error(e) => e.to_string(),
        Data::DateTime(_) => cell
            .as_datetime()
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| cell.to_string()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
    }
}

fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}
