use std::fs;
use std::path::Path;

use crate::data::model::Array2;
use crate::error::ImportError;

/// Whitespace-separated numeric table, as written by HAWCStab2.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    rows: Vec<Vec<f64>>,
    cols: usize,
}

impl Table {
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.cols
    }

    pub fn value(&self, row: usize, col: usize) -> f64 {
        self.rows[row][col]
    }

    pub fn row(&self, row: usize) -> &[f64] {
        &self.rows[row]
    }

    /// Columns `first..first + count` of every row as a matrix.
    pub fn block(&self, first: usize, count: usize) -> Array2 {
        let mut out = Array2::filled([self.rows.len(), count], 0.0);
        for (r, row) in self.rows.iter().enumerate() {
            for c in 0..count {
                out.set(r, c, row[first + c]);
            }
        }
        out
    }
}

pub fn read_table(path: &Path, skip_lines: usize) -> Result<Table, ImportError> {
    let text = fs::read_to_string(path).map_err(|source| ImportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_table(&text, skip_lines, path)
}

/// Parse `text` after skipping `skip_lines` header lines. Blank lines are
/// ignored; every data row must have the same number of columns.
pub fn parse_table(text: &str, skip_lines: usize, path: &Path) -> Result<Table, ImportError> {
    let mut rows: Vec<Vec<f64>> = Vec::new();
    let mut cols = 0;

    for (i, line) in text.lines().enumerate().skip(skip_lines) {
        let line_no = i + 1;
        if line.trim().is_empty() {
            continue;
        }
        let row = line
            .split_whitespace()
            .map(|tok| {
                tok.parse::<f64>().map_err(|_| ImportError::Parse {
                    path: path.to_path_buf(),
                    line: line_no,
                    message: format!("'{tok}' is not a number"),
                })
            })
            .collect::<Result<Vec<f64>, _>>()?;

        if rows.is_empty() {
            cols = row.len();
        } else if row.len() != cols {
            return Err(ImportError::Parse {
                path: path.to_path_buf(),
                line: line_no,
                message: format!("expected {cols} columns, found {}", row.len()),
            });
        }
        rows.push(row);
    }

    Ok(Table { rows, cols })
}
