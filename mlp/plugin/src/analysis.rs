//! Descriptive statistics for a loaded table.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::dataset::{Cell, ColumnKind, Dataset};

/// Summary of the non-missing values of one numeric column.
///
/// Every statistic is `None` when the column has no values; `std` is also
/// `None` for a single value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSummary {
    /// Non-missing values.
    pub count: usize,
    /// Arithmetic mean.
    pub mean: Option<f64>,
    /// Sample standard deviation (n - 1).
    pub std: Option<f64>,
    /// Smallest value.
    pub min: Option<f64>,
    /// First quartile.
    #[serde(rename = "25%")]
    pub q1: Option<f64>,
    /// Median.
    #[serde(rename = "50%")]
    pub median: Option<f64>,
    /// Third quartile.
    #[serde(rename = "75%")]
    pub q3: Option<f64>,
    /// Largest value.
    pub max: Option<f64>,
}

impl ColumnSummary {
    fn from_values(mut values: Vec<f64>) -> Self {
        let count = values.len();
        if count == 0 {
            return Self {
                count,
                mean: None,
                std: None,
                min: None,
                q1: None,
                median: None,
                q3: None,
                max: None,
            };
        }
        values.sort_by(f64::total_cmp);
        #[allow(clippy::cast_precision_loss)]
        let n = count as f64;
        let mean = values.iter().sum::<f64>() / n;
        let std = (count > 1).then(|| {
            let ss = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
            (ss / (n - 1.0)).sqrt()
        });
        Self {
            count,
            mean: Some(mean),
            std,
            min: values.first().copied(),
            q1: Some(quantile(&values, 0.25)),
            median: Some(quantile(&values, 0.5)),
            q3: Some(quantile(&values, 0.75)),
            max: values.last().copied(),
        }
    }
}

/// Linear interpolation between closest ranks over sorted, non-empty input.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Exploratory report over a table.
///
/// Text columns appear in `columns` and `missing` but are left out of
/// `statistics`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// `[rows, columns]`.
    pub shape: [usize; 2],
    /// Column names in file order.
    pub columns: Vec<String>,
    /// Missing cells per column.
    pub missing: IndexMap<String, usize>,
    /// Summaries of numeric columns.
    pub statistics: IndexMap<String, ColumnSummary>,
}

/// Builds [`AnalysisReport`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataAnalyzer;

impl DataAnalyzer {
    /// Analyzes a table without modifying it.
    #[must_use]
    pub fn analyze(&self, dataset: &Dataset) -> AnalysisReport {
        let mut missing = IndexMap::with_capacity(dataset.n_cols());
        let mut statistics = IndexMap::new();
        for (idx, column) in dataset.columns().iter().enumerate() {
            let absent = dataset.column_cells(idx).filter(|c| c.is_missing()).count();
            missing.insert(column.name.clone(), absent);
            if column.kind == ColumnKind::Numeric {
                let values = dataset
                    .column_cells(idx)
                    .filter_map(Cell::as_number)
                    .collect();
                statistics.insert(column.name.clone(), ColumnSummary::from_values(values));
            }
        }
        AnalysisReport {
            shape: [dataset.n_rows(), dataset.n_cols()],
            columns: dataset.column_names(),
            missing,
            statistics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetLoader;

    fn load(text: &str) -> Dataset {
        DatasetLoader::default().from_reader(text.as_bytes()).unwrap()
    }

    #[test]
    fn describes_numeric_columns() {
        let report = DataAnalyzer.analyze(&load("v\n1\n2\n3\n4\n"));
        let stats = &report.statistics["v"];
        assert_eq!(stats.count, 4);
        assert_eq!(stats.mean, Some(2.5));
        assert_eq!(stats.min, Some(1.0));
        assert_eq!(stats.q1, Some(1.75));
        assert_eq!(stats.median, Some(2.5));
        assert_eq!(stats.q3, Some(3.25));
        assert_eq!(stats.max, Some(4.0));
        let std = stats.std.unwrap();
        assert!((std - 1.290_994_448_735_805_6).abs() < 1e-12);
    }

    #[test]
    fn text_columns_have_no_statistics() {
        let report = DataAnalyzer.analyze(&load("name,n\nann,1\n,2\nbo,\n"));
        assert_eq!(report.shape, [3, 2]);
        assert!(!report.statistics.contains_key("name"));
        assert_eq!(report.missing["name"], 1);
        assert_eq!(report.missing["n"], 1);
        assert_eq!(report.statistics["n"].std, Some(std::f64::consts::FRAC_1_SQRT_2));
    }

    #[test]
    fn single_and_empty_numeric_columns() {
        let report = DataAnalyzer.analyze(&load("a,b\n5,\n"));
        assert_eq!(report.statistics["a"].std, None);
        assert_eq!(report.statistics["a"].median, Some(5.0));
        assert_eq!(report.statistics["b"].count, 0);
        assert_eq!(report.statistics["b"].mean, None);
    }

    #[test]
    fn report_serializes_quartile_keys() {
        let report = DataAnalyzer.analyze(&load("v\n1\n3\n"));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["shape"], serde_json::json!([2, 1]));
        assert_eq!(json["statistics"]["v"]["50%"], 2.0);
    }

    #[test]
    fn analysis_is_deterministic() {
        let dataset = load("x,y\n3,a\n1,b\n2,\n");
        assert_eq!(DataAnalyzer.analyze(&dataset), DataAnalyzer.analyze(&dataset));
    }
}
