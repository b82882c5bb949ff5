use serde_json::Value;

use crate::{
    dataset::Dataset,
    error::{PluginError, PluginResult},
    model::Prediction,
    registry::ModelRegistry,
};

/// Applies registered models to caller-supplied rows.
#[derive(Debug, Clone)]
pub struct Predictor {
    registry: ModelRegistry,
}

impl Predictor {
    /// Creates a predictor reading from `registry`.
    #[must_use]
    pub const fn new(registry: ModelRegistry) -> Self {
        Self { registry }
    }

    /// Predicts one value per row of `data`.
    ///
    /// The model is resolved before the rows are inspected, so an unknown
    /// identifier is reported as not found whatever the input looks like.
    /// Object rows are matched to features by name; array rows are positional.
    pub fn predict(&self, model_id: &str, data: &Value) -> PluginResult<Vec<Prediction>> {
        let entry = self.registry.get(model_id)?;
        if entry.model.n_features() != entry.features.len() {
            return Err(PluginError::internal(format!(
                "model `{model_id}` expects {} features but lists {}",
                entry.model.n_features(),
                entry.features.len()
            )));
        }
        let rows = Dataset::from_json_rows(data, &entry.features)?;
        if rows.n_rows() == 0 {
            return Ok(Vec::new());
        }
        let all: Vec<usize> = (0..rows.n_rows()).collect();
        let matrix = rows.feature_matrix(&entry.features, &all)?;
        Ok(entry.model.predict(&matrix))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ndarray::array;
    use serde_json::json;

    use super::*;
    use crate::{
        model::LinearRegressionModel,
        registry::TrainedModel,
    };

    fn registry_with_model() -> (ModelRegistry, String) {
        let registry = ModelRegistry::new();
        let model = LinearRegressionModel::fit(
            &array![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]],
            &array![1.0, 3.0, 0.0, 2.0],
            0.1,
            3_000,
        )
        .unwrap();
        let id = registry.insert(TrainedModel {
            model: Arc::new(model),
            accuracy: 1.0,
            target: "y".into(),
            features: vec!["a".into(), "b".into()],
            train_rows: 4,
            test_rows: 2,
        });
        (registry, id)
    }

    fn value(prediction: &Prediction) -> f64 {
        match prediction {
            Prediction::Value(v) => *v,
            Prediction::Label(label) => panic!("unexpected label {label}"),
        }
    }

    #[test]
    fn object_and_array_rows_agree() {
        let (registry, id) = registry_with_model();
        let predictor = Predictor::new(registry);
        let by_name = predictor
            .predict(&id, &json!([{"b": 1, "a": 1, "extra": "ignored"}]))
            .unwrap();
        let by_position = predictor.predict(&id, &json!([[1, 1]])).unwrap();
        assert!((value(&by_name[0]) - 2.0).abs() < 1e-6);
        assert!((value(&by_name[0]) - value(&by_position[0])).abs() < 1e-12);
    }

    #[test]
    fn unknown_model_wins_over_bad_rows() {
        let predictor = Predictor::new(ModelRegistry::new());
        for data in [json!([[1, 2]]), json!("garbage"), json!(null)] {
            let err = predictor.predict("model_7", &data).unwrap_err();
            assert!(matches!(err, PluginError::NotFound(_)), "{data}");
        }
    }

    #[test]
    fn empty_input_gives_empty_output() {
        let (registry, id) = registry_with_model();
        assert!(Predictor::new(registry).predict(&id, &json!([])).unwrap().is_empty());
    }

    #[test]
    fn shape_errors_are_validation_errors() {
        let (registry, id) = registry_with_model();
        let predictor = Predictor::new(registry);
        for data in [
            json!([[1]]),
            json!([{"a": 1}]),
            json!([{"a": 1, "b": "high"}]),
            json!([{"a": 1, "b": null}]),
        ] {
            let err = predictor.predict(&id, &data).unwrap_err();
            assert!(matches!(err, PluginError::Validation(_)), "{data}");
        }
    }

    #[test]
    fn feature_list_must_match_model_width() {
        let registry = ModelRegistry::new();
        let model = LinearRegressionModel::fit(
            &array![[0.0, 0.0], [1.0, 1.0], [2.0, 0.0]],
            &array![0.0, 2.0, 2.0],
            0.1,
            100,
        )
        .unwrap();
        let id = registry.insert(TrainedModel {
            model: Arc::new(model),
            accuracy: 1.0,
            target: "y".into(),
            features: vec!["a".into()],
            train_rows: 3,
            test_rows: 1,
        });
        let err = Predictor::new(registry)
            .predict(&id, &json!([[1]]))
            .unwrap_err();
        assert!(matches!(err, PluginError::Internal(_)));
    }
}
