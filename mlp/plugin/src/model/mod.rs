//! Fitted models and the capability they share.

/// Nearest-centroid classifier.
pub mod centroid;
/// Gradient-descent linear regression.
pub mod linear;
/// Feature standardization.
pub mod scaler;

use std::fmt::Debug;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

pub use centroid::NearestCentroidClassifier;
pub use linear::LinearRegressionModel;
pub use scaler::Standardizer;

/// Rows × features, in the feature order the model was trained on.
pub type FeatureMatrix = Array2<f64>;

/// Learning task a model solves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    /// Numeric target.
    Regression,
    /// Label target.
    Classification,
}

impl Task {
    /// Name of the held-out metric reported for this task.
    #[must_use]
    pub const fn metric(self) -> &'static str {
        match self {
            Self::Regression => "r2",
            Self::Classification => "accuracy",
        }
    }
}

/// One model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Prediction {
    /// Regression output.
    Value(f64),
    /// Classification output.
    Label(String),
}

/// Prediction capability every registered model exposes.
pub trait Model: Debug + Send + Sync {
    /// Short algorithm name.
    fn kind(&self) -> &'static str;

    /// Task the model was fitted for.
    fn task(&self) -> Task;

    /// Number of features expected per row.
    fn n_features(&self) -> usize;

    /// One prediction per input row, in row order.
    fn predict(&self, features: &FeatureMatrix) -> Vec<Prediction>;
}
