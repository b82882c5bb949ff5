use std::collections::BTreeMap;

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use super::{FeatureMatrix, Model, Prediction, Standardizer, Task};
use crate::error::{PluginError, PluginResult};

/// Assigns each row the label whose standardized class mean is closest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NearestCentroidClassifier {
    scaler: Standardizer,
    labels: Vec<String>,
    centroids: Array2<f64>,
}

impl NearestCentroidClassifier {
    /// Fits one centroid per distinct label. Labels are kept in sorted order,
    /// which also breaks distance ties.
    pub fn fit(features: &Array2<f64>, labels: &[String]) -> PluginResult<Self> {
        if features.nrows() == 0 || features.nrows() != labels.len() {
            return Err(PluginError::training(format!(
                "cannot fit {} labels against {} feature rows",
                labels.len(),
                features.nrows()
            )));
        }
        let scaler = Standardizer::fit(features);
        let scaled = scaler.transform(features);

        let mut members: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (row, label) in labels.iter().enumerate() {
            members.entry(label.as_str()).or_default().push(row);
        }

        let mut centroids = Array2::zeros((members.len(), scaled.ncols()));
        for (mut centroid, rows) in centroids.outer_iter_mut().zip(members.values()) {
            let mean = scaled
                .select(Axis(0), rows)
                .mean_axis(Axis(0))
                .ok_or_else(|| PluginError::training("empty class while fitting centroids"))?;
            centroid.assign(&mean);
        }
        if !(scaler.is_finite() && centroids.iter().all(|v| v.is_finite())) {
            return Err(PluginError::training("centroids contain non-finite values"));
        }

        Ok(Self {
            scaler,
            labels: members.keys().map(|label| (*label).to_string()).collect(),
            centroids,
        })
    }

    /// Distinct labels known to the model.
    #[must_use]
    pub fn classes(&self) -> &[String] {
        &self.labels
    }

    fn nearest(&self, row: &Array1<f64>) -> usize {
        self.centroids
            .outer_iter()
            .map(|centroid| (&centroid - row).mapv(|d| d * d).sum())
            .enumerate()
            .fold((0, f64::INFINITY), |best, (idx, dist)| {
                if dist < best.1 {
                    (idx, dist)
                } else {
                    best
                }
            })
            .0
    }
}

impl Model for NearestCentroidClassifier {
    fn kind(&self) -> &'static str {
        "nearest_centroid"
    }

    fn task(&self) -> Task {
        Task::Classification
    }

    fn n_features(&self) -> usize {
        self.centroids.ncols()
    }

    fn predict(&self, features: &FeatureMatrix) -> Vec<Prediction> {
        self.scaler
            .transform(features)
            .outer_iter()
            .map(|row| Prediction::Label(self.labels[self.nearest(&row.to_owned())].clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn labels(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|l| (*l).to_string()).collect()
    }

    #[test]
    fn separates_two_clusters() {
        let features = array![[0.0, 0.1], [0.2, 0.0], [5.0, 5.1], [5.2, 4.9]];
        let model =
            NearestCentroidClassifier::fit(&features, &labels(&["low", "low", "high", "high"]))
                .unwrap();
        assert_eq!(model.classes(), ["high".to_string(), "low".to_string()]);
        let predictions = model.predict(&array![[0.1, 0.1], [4.8, 5.0]]);
        assert_eq!(
            predictions,
            vec![Prediction::Label("low".into()), Prediction::Label("high".into())]
        );
    }

    #[test]
    fn rejects_mismatched_inputs() {
        let err = NearestCentroidClassifier::fit(&array![[1.0]], &labels(&["a", "b"])).unwrap_err();
        assert!(matches!(err, PluginError::TrainingFailure(_)));
    }
}
