use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Per-feature z-score transform learned from training rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standardizer {
    means: Array1<f64>,
    scales: Array1<f64>,
}

impl Standardizer {
    /// Learns means and population standard deviations column by column.
    /// Constant columns get a unit scale.
    #[must_use]
    pub fn fit(features: &Array2<f64>) -> Self {
        let n_features = features.ncols();
        let means = features
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(n_features));
        let scales = features.std_axis(Axis(0), 0.0).mapv(|std| {
            if std.is_finite() && std > 1e-12 {
                std
            } else {
                1.0
            }
        });
        Self { means, scales }
    }

    /// Applies the learned transform.
    #[must_use]
    pub fn transform(&self, features: &Array2<f64>) -> Array2<f64> {
        (features - &self.means) / &self.scales
    }

    /// Number of features the transform was fitted on.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.means.len()
    }

    /// `true` when every learned parameter is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.means.iter().chain(self.scales.iter()).all(|v| v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn standardizes_columns() {
        let features = array![[1.0, 10.0], [3.0, 10.0]];
        let scaler = Standardizer::fit(&features);
        let scaled = scaler.transform(&features);
        assert_eq!(scaled, array![[-1.0, 0.0], [1.0, 0.0]]);
        assert_eq!(scaler.n_features(), 2);
    }
}
