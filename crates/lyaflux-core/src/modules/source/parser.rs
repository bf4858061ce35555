use crate::domain::FluxError;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum TableParseError {
    #[error("failed to read table '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("table '{}' line {line}: cannot parse '{token}' as a number", path.display())]
    InvalidNumber {
        path: PathBuf,
        line: usize,
        token: String,
    },
    #[error("table '{}' line {line}: expected at least {expected} columns, got {actual}", path.display())]
    MissingColumns {
        path: PathBuf,
        line: usize,
        expected: usize,
        actual: usize,
    },
    #[error("table '{}' has no data rows", path.display())]
    Empty { path: PathBuf },
}

impl From<TableParseError> for FluxError {
    fn from(error: TableParseError) -> Self {
        match error {
            TableParseError::Read { .. } => FluxError::io("IO.TABLE_READ", error.to_string()),
            TableParseError::InvalidNumber { .. }
            | TableParseError::MissingColumns { .. }
            | TableParseError::Empty { .. } => {
                FluxError::io("IO.TABLE_PARSE", error.to_string())
            }
        }
    }
}

/// Read a whitespace-delimited numeric table with at least `min_columns`
/// columns per row. Blank lines and `#` comments are skipped.
pub fn read_numeric_table(
    path: &Path,
    min_columns: usize,
) -> Result<Vec<Vec<f64>>, TableParseError> {
    let source = fs::read_to_string(path).map_err(|source| TableParseError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_numeric_table(&source, path, min_columns)
}

pub fn parse_numeric_table(
    source: &str,
    path: &Path,
    min_columns: usize,
) -> Result<Vec<Vec<f64>>, TableParseError> {
    let mut rows = Vec::new();
    for (index, line) in source.lines().enumerate() {
        let content = line.split('#').next().unwrap_or_default().trim();
        if content.is_empty() {
            continue;
        }

        let row = content
            .split_whitespace()
            .map(|token| {
                parse_numeric_token(token).ok_or_else(|| TableParseError::InvalidNumber {
                    path: path.to_path_buf(),
                    line: index + 1,
                    token: token.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if row.len() < min_columns {
            return Err(TableParseError::MissingColumns {
                path: path.to_path_buf(),
                line: index + 1,
                expected: min_columns,
                actual: row.len(),
            });
        }
        rows.push(row);
    }

    if rows.is_empty() {
        return Err(TableParseError::Empty {
            path: path.to_path_buf(),
        });
    }
    Ok(rows)
}

fn parse_numeric_token(token: &str) -> Option<f64> {
    if let Ok(value) = token.parse::<f64>() {
        return Some(value);
    }
    // Fortran writers emit exponents as `1.0D+00`.
    token.replace(['D', 'd'], "E").parse::<f64>().ok()
}
