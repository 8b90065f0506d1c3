//! Minimal delimited-text parser for published spreadsheet exports.
//!
//! Only what the datasets need:
//! - `\r` is dropped, rows are split on `\n`, blank rows are skipped
//! - `"` toggles quoting; a `,` inside quotes is part of the field
//! - quote characters themselves are dropped (`""` is not an escaped quote)
//! - every field is trimmed

use std::collections::HashMap;

/// Field delimiter.
const DELIMITER: char = ',';

/// Parse a whole document into rows of trimmed fields.
pub fn parse_delimited(content: &str) -> Vec<Vec<String>> {
    content
        .split('\n')
        .map(|line| line.replace('\r', ""))
        .filter(|line| !line.trim().is_empty())
        .map(|line| parse_row(&line))
        .collect()
}

/// Parse a single line into trimmed fields.
pub fn parse_row(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in line.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            DELIMITER if !in_quotes => {
                fields.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    fields.push(current.trim().to_string());
    fields
}

/// Serialize fields back into a row, quoting fields that contain the delimiter.
pub fn serialize_row<S: AsRef<str>>(fields: &[S]) -> String {
    fields
        .iter()
        .map(|f| {
            let f = f.as_ref();
            if f.contains(DELIMITER) {
                format!("\"{f}\"")
            } else {
                f.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

// ---------------------------------------------------------------------------
// HeaderMap
// ---------------------------------------------------------------------------

/// Column-name → index map built from a header row.
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    columns: HashMap<String, usize>,
}

impl HeaderMap {
    /// Build from a header row. Blank header cells are ignored; the last
    /// duplicate wins.
    pub fn from_row(row: &[String]) -> Self {
        let columns = row
            .iter()
            .enumerate()
            .filter_map(|(i, cell)| {
                let key = cell.trim();
                (!key.is_empty()).then(|| (key.to_string(), i))
            })
            .collect();
        Self { columns }
    }

    /// Index of `column`, if the header has it.
    pub fn index(&self, column: &str) -> Option<usize> {
        self.columns.get(column).copied()
    }

    /// Value of `column` in `row`; empty when the column or the cell is absent.
    pub fn get<'r>(&self, row: &'r [String], column: &str) -> &'r str {
        self.index(column)
            .and_then(|i| row.get(i))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Number of named columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
