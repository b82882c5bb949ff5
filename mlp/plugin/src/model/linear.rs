use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use super::{FeatureMatrix, Model, Prediction, Standardizer, Task};
use crate::error::{PluginError, PluginResult};

/// Linear regression with bias, fitted by batch gradient descent on
/// standardized features.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRegressionModel {
    scaler: Standardizer,
    weights: Array1<f64>,
    bias: f64,
}

impl LinearRegressionModel {
    /// Fits the model; fails when the optimisation leaves non-finite
    /// parameters.
    pub fn fit(
        features: &Array2<f64>,
        labels: &Array1<f64>,
        learning_rate: f64,
        epochs: usize,
    ) -> PluginResult<Self> {
        if features.nrows() == 0 || features.nrows() != labels.len() {
            return Err(PluginError::training(format!(
                "cannot fit {} labels against {} feature rows",
                labels.len(),
                features.nrows()
            )));
        }
        let scaler = Standardizer::fit(features);
        let scaled = scaler.transform(features);
        #[allow(clippy::cast_precision_loss)]
        let n = scaled.nrows() as f64;

        let mut weights = Array1::<f64>::zeros(scaled.ncols());
        let mut bias = labels.mean().unwrap_or(0.0);
        for _ in 0..epochs {
            let error = scaled.dot(&weights) + bias - labels;
            let grad = scaled.t().dot(&error) / n;
            let bias_grad = error.sum() / n;
            weights = weights - &grad * learning_rate;
            bias -= learning_rate * bias_grad;
            if grad.iter().all(|g| g.abs() < 1e-12) && bias_grad.abs() < 1e-12 {
                break;
            }
        }

        if !(bias.is_finite() && weights.iter().all(|w| w.is_finite()) && scaler.is_finite()) {
            return Err(PluginError::training(
                "gradient descent diverged; lower training.learning_rate",
            ));
        }
        Ok(Self {
            scaler,
            weights,
            bias,
        })
    }

    /// Raw numeric outputs.
    #[must_use]
    pub fn predict_values(&self, features: &FeatureMatrix) -> Array1<f64> {
        self.scaler.transform(features).dot(&self.weights) + self.bias
    }
}

impl Model for LinearRegressionModel {
    fn kind(&self) -> &'static str {
        "linear_regression"
    }

    fn task(&self) -> Task {
        Task::Regression
    }

    fn n_features(&self) -> usize {
        self.weights.len()
    }

    fn predict(&self, features: &FeatureMatrix) -> Vec<Prediction> {
        self.predict_values(features)
            .into_iter()
            .map(Prediction::Value)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn recovers_a_linear_relation() {
        let features = array![[0.0, 1.0], [1.0, 0.0], [2.0, 3.0], [3.0, 1.0], [4.0, 2.0]];
        let labels = features.column(0).mapv(|x| 2.0 * x) - features.column(1).to_owned() + 1.0;
        let model = LinearRegressionModel::fit(&features, &labels, 0.1, 2_000).unwrap();
        let predicted = model.predict_values(&array![[5.0, 0.0]]);
        assert!((predicted[0] - 11.0).abs() < 1e-6, "{predicted}");
    }

    #[test]
    fn divergence_is_a_training_failure() {
        let features = array![[0.0], [1.0], [2.0]];
        let labels = array![1.0, 2.0, 3.0];
        let err = LinearRegressionModel::fit(&features, &labels, 1e6, 2_000).unwrap_err();
        assert!(matches!(err, PluginError::TrainingFailure(_)));
    }

    #[test]
    fn predicts_one_value_per_row() {
        let model =
            LinearRegressionModel::fit(&array![[1.0], [2.0]], &array![1.0, 2.0], 0.1, 10).unwrap();
        assert_eq!(model.predict(&array![[1.0], [2.0], [3.0]]).len(), 3);
        assert_eq!(model.task(), Task::Regression);
    }
}
