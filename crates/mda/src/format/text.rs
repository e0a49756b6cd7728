//! Delimited text arrays (`.txt`, `.csv`).
//!
//! Each non-empty line that does not start with `#` is one row. Fields are
//! separated by commas or whitespace. Row `r`, column `c` becomes entry
//! `(r, c)`, so the array is `rows x columns`. Short rows are zero padded.

use crate::error::{MdaError, Result};
use crate::mda::Mda;
use std::path::Path;

/// Returns true when the path names a text array.
pub fn is_text_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("txt") || ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false)
}

/// Reads and parses a text array.
///
/// # Errors
///
/// Returns an error if the file cannot be read or a field is not a number.
pub fn read_text(path: &Path) -> Result<Mda> {
    let contents = std::fs::read_to_string(path)?;
    parse_text(&contents)
}

/// Parses a text array from a string.
///
/// # Errors
///
/// Returns `MdaError::Parse` naming the line and field that failed.
pub fn parse_text(contents: &str) -> Result<Mda> {
    let mut rows: Vec<Vec<f64>> = Vec::new();
    for (line_no, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let row = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|field| !field.is_empty())
            .map(|field| {
                field.parse::<f64>().map_err(|_| {
                    MdaError::Parse(format!("line {}: invalid number {:?}", line_no + 1, field))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        rows.push(row);
    }

    let n1 = rows.len();
    let n2 = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut out = Mda::zeros(&[n1, n2])?;
    for (r, row) in rows.iter().enumerate() {
        for (c, &value) in row.iter().enumerate() {
            out.set_value2(value, r as i64, c as i64);
        }
    }
    Ok(out)
}
