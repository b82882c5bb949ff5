use indexmap::IndexSet;
use serde_json::Value;

use super::table::{is_missing_marker, Cell, Dataset};
use crate::error::{PluginError, PluginResult};

impl Dataset {
    /// Builds a table from caller-supplied JSON rows.
    ///
    /// Accepts an array of objects (`{"column": value}`) or an array of
    /// arrays. Positional rows take their column names from
    /// `positional_columns` and must have exactly that many values.
    pub fn from_json_rows(rows: &Value, positional_columns: &[String]) -> PluginResult<Self> {
        let Some(rows) = rows.as_array() else {
            return Err(PluginError::validation(
                "`data` must be an array of rows (objects or arrays)",
            ));
        };
        match rows.first() {
            None => Self::from_cells(positional_columns.to_vec(), Vec::new()),
            Some(Value::Object(_)) => object_rows(rows),
            Some(Value::Array(_)) => array_rows(rows, positional_columns),
            Some(other) => Err(PluginError::validation(format!(
                "row 1 must be an object or an array, got {}",
                type_name(other)
            ))),
        }
    }
}

fn object_rows(rows: &[Value]) -> PluginResult<Dataset> {
    let mut headers: IndexSet<String> = IndexSet::new();
    for (idx, row) in rows.iter().enumerate() {
        let obj = row.as_object().ok_or_else(|| {
            PluginError::validation(format!("row {} is not an object like row 1", idx + 1))
        })?;
        headers.extend(obj.keys().cloned());
    }
    let cells = rows
        .iter()
        .enumerate()
        .map(|(idx, row)| {
            headers
                .iter()
                .map(|name| row.get(name).map_or(Ok(Cell::Missing), |v| to_cell(v, idx)))
                .collect::<PluginResult<Vec<_>>>()
        })
        .collect::<PluginResult<Vec<_>>>()?;
    Dataset::from_cells(headers.into_iter().collect(), cells)
}

fn array_rows(rows: &[Value], columns: &[String]) -> PluginResult<Dataset> {
    let cells = rows
        .iter()
        .enumerate()
        .map(|(idx, row)| {
            let values = row.as_array().ok_or_else(|| {
                PluginError::validation(format!("row {} is not an array like row 1", idx + 1))
            })?;
            if values.len() != columns.len() {
                return Err(PluginError::validation(format!(
                    "row {} has {} values, expected {} ({})",
                    idx + 1,
                    values.len(),
                    columns.len(),
                    columns.join(", ")
                )));
            }
            values
                .iter()
                .map(|v| to_cell(v, idx))
                .collect::<PluginResult<Vec<_>>>()
        })
        .collect::<PluginResult<Vec<_>>>()?;
    Dataset::from_cells(columns.to_vec(), cells)
}

fn to_cell(value: &Value, row: usize) -> PluginResult<Cell> {
    match value {
        Value::Null => Ok(Cell::Missing),
        Value::Bool(flag) => Ok(Cell::Number(if *flag { 1.0 } else { 0.0 })),
        Value::Number(num) => Ok(num.as_f64().map_or(Cell::Missing, Cell::Number)),
        Value::String(raw) if is_missing_marker(raw) => Ok(Cell::Missing),
        Value::String(raw) => Ok(raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|parsed| !parsed.is_nan())
            .map_or_else(|| Cell::Text(raw.clone()), Cell::Number)),
        nested => Err(PluginError::validation(format!(
            "row {} holds a nested {} value",
            row + 1,
            type_name(nested)
        ))),
    }
}

const fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
