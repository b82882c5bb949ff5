use indexmap::IndexSet;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{PluginError, PluginResult};

/// Raw tokens treated as absent values.
const MISSING_MARKERS: &[&str] = &[
    "", "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "-nan", "null", "NULL", "None", "#N/A", "<NA>",
];

/// Returns `true` when a raw field denotes a missing value.
#[must_use]
pub fn is_missing_marker(raw: &str) -> bool {
    MISSING_MARKERS.contains(&raw.trim())
}

/// Single table cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    /// Absent value.
    Missing,
    /// Numeric value.
    Number(f64),
    /// Free text.
    Text(String),
}

impl Cell {
    /// Numeric payload, if any.
    #[must_use]
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    /// `true` for [`Cell::Missing`].
    #[must_use]
    pub const fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// Label form used when the cell is a classification target.
    #[must_use]
    pub fn label(&self) -> Option<String> {
        match self {
            Self::Missing => None,
            Self::Number(value) => Some(value.to_string()),
            Self::Text(text) => Some(text.clone()),
        }
    }
}

/// Inferred type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    /// Every present value is a number.
    Numeric,
    /// At least one present value is text.
    Text,
}

/// Column header with its inferred kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Header name.
    pub name: String,
    /// Inferred kind.
    pub kind: ColumnKind,
}

/// Transient table with ordered columns and typed rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    columns: Vec<Column>,
    rows: Vec<Vec<Cell>>,
}

impl Dataset {
    /// Builds a table from raw text fields, inferring a kind per column.
    ///
    /// `None` fields and missing markers become [`Cell::Missing`]. A column is
    /// numeric when every present field parses as `f64`; otherwise all of its
    /// present fields are kept as text.
    pub fn from_raw(headers: Vec<String>, records: Vec<Vec<Option<String>>>) -> PluginResult<Self> {
        check_headers(&headers)?;
        let width = headers.len();
        if let Some((idx, record)) = records
            .iter()
            .enumerate()
            .find(|(_, record)| record.len() != width)
        {
            return Err(PluginError::parse(format!(
                "row {} has {} fields, expected {width}",
                idx + 1,
                record.len()
            )));
        }

        let numeric: Vec<bool> = (0..width)
            .map(|col| {
                records.iter().all(|record| match &record[col] {
                    Some(raw) if !is_missing_marker(raw) => raw.trim().parse::<f64>().is_ok(),
                    _ => true,
                })
            })
            .collect();

        let rows = records
            .into_iter()
            .map(|record| {
                record
                    .into_iter()
                    .zip(&numeric)
                    .map(|(field, is_numeric)| match field {
                        Some(raw) if !is_missing_marker(&raw) => {
                            if *is_numeric {
                                raw.trim()
                                    .parse::<f64>()
                                    .ok()
                                    .filter(|value| !value.is_nan())
                                    .map_or(Cell::Missing, Cell::Number)
                            } else {
                                Cell::Text(raw)
                            }
                        }
                        _ => Cell::Missing,
                    })
                    .collect()
            })
            .collect();

        let columns = headers
            .into_iter()
            .zip(numeric)
            .map(|(name, is_numeric)| Column {
                name,
                kind: if is_numeric {
                    ColumnKind::Numeric
                } else {
                    ColumnKind::Text
                },
            })
            .collect();
        Ok(Self { columns, rows })
    }

    /// Builds a table from already typed cells; kinds follow the cells.
    pub fn from_cells(headers: Vec<String>, rows: Vec<Vec<Cell>>) -> PluginResult<Self> {
        check_headers(&headers)?;
        let width = headers.len();
        if let Some(idx) = rows.iter().position(|row| row.len() != width) {
            return Err(PluginError::validation(format!(
                "row {} has {} values, expected {width}",
                idx + 1,
                rows[idx].len()
            )));
        }
        let columns = headers
            .into_iter()
            .enumerate()
            .map(|(col, name)| {
                let has_text = rows.iter().any(|row| matches!(row[col], Cell::Text(_)));
                Column {
                    name,
                    kind: if has_text {
                        ColumnKind::Text
                    } else {
                        ColumnKind::Numeric
                    },
                }
            })
            .collect();
        Ok(Self { columns, rows })
    }

    /// Number of rows.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns.
    #[must_use]
    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    /// Columns in file order.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column names in file order.
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|col| col.name.clone()).collect()
    }

    /// Position of a column by name.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|col| col.name == name)
    }

    /// Column metadata by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|col| col.name == name)
    }

    /// All rows.
    #[must_use]
    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    /// Cells of one column, top to bottom.
    pub fn column_cells(&self, col: usize) -> impl Iterator<Item = &Cell> + '_ {
        self.rows.iter().map(move |row| &row[col])
    }

    /// Collects the named numeric columns for the given rows into a matrix.
    ///
    /// Fails when a column is absent or textual, or a selected cell is missing.
    pub fn feature_matrix(&self, features: &[String], rows: &[usize]) -> PluginResult<Array2<f64>> {
        let indices = features
            .iter()
            .map(|name| {
                let idx = self.column_index(name).ok_or_else(|| {
                    PluginError::validation(format!("feature column `{name}` is missing"))
                })?;
                if self.columns[idx].kind == ColumnKind::Text {
                    return Err(PluginError::validation(format!(
                        "feature column `{name}` is not numeric"
                    )));
                }
                Ok(idx)
            })
            .collect::<PluginResult<Vec<_>>>()?;

        let mut matrix = Array2::zeros((rows.len(), indices.len()));
        for (out_row, &row) in rows.iter().enumerate() {
            for (out_col, &col) in indices.iter().enumerate() {
                matrix[[out_row, out_col]] = self.rows[row][col].as_number().ok_or_else(|| {
                    PluginError::validation(format!(
                        "row {} has no value for feature `{}`",
                        row + 1,
                        features[out_col]
                    ))
                })?;
            }
        }
        Ok(matrix)
    }
}

fn check_headers(headers: &[String]) -> PluginResult<()> {
    let mut seen = IndexSet::with_capacity(headers.len());
    for name in headers {
        if !seen.insert(name.as_str()) {
            return Err(PluginError::parse(format!("duplicate column `{name}`")));
        }
    }
    Ok(())
}
