//! Fits a model on a seeded split, scores it on the held-out rows and
//! registers it.

use std::sync::Arc;

use ndarray::{Array1, Array2};
use rand::{rngs::SmallRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    config::TrainingConfig,
    dataset::{ColumnKind, Dataset},
    error::{PluginError, PluginResult},
    model::{LinearRegressionModel, Model, NearestCentroidClassifier, Prediction, Task},
    registry::{ModelRegistry, TrainedModel},
};

/// What to learn from a dataset. Unset fields fall back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetSpec {
    /// Target column; the last column when unset.
    #[serde(default)]
    pub target: Option<String>,
    /// Feature columns; every other numeric column when unset.
    #[serde(default)]
    pub features: Option<Vec<String>>,
    /// Held-out fraction; config default when unset.
    #[serde(default)]
    pub test_size: Option<f64>,
    /// Shuffle seed; config default when unset.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Forces a task; inferred from the target column kind when unset.
    #[serde(default)]
    pub task: Option<Task>,
}

/// Result of a successful training run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingOutcome {
    /// Registry identifier.
    pub model_id: String,
    /// Held-out metric in `[0, 1]`.
    pub accuracy: f64,
    /// Metric name (`accuracy` or `r2`).
    pub metric: &'static str,
    /// Task solved.
    pub task: Task,
    /// Target column.
    pub target: String,
    /// Feature columns in model order.
    pub features: Vec<String>,
    /// Rows used for fitting.
    pub train_rows: usize,
    /// Rows used for evaluation.
    pub test_rows: usize,
}

#[derive(Debug, Clone)]
enum Targets {
    Values(Array1<f64>),
    Labels(Vec<String>),
}

/// Validated, split training input. Building one never touches the registry.
#[derive(Debug, Clone)]
pub struct TrainingPlan {
    task: Task,
    target: String,
    features: Vec<String>,
    train_x: Array2<f64>,
    train_y: Targets,
    test_x: Array2<f64>,
    test_y: Targets,
}

impl TrainingPlan {
    /// Task the plan trains for.
    #[must_use]
    pub const fn task(&self) -> Task {
        self.task
    }

    /// Rows on each side of the split.
    #[must_use]
    pub fn split_sizes(&self) -> (usize, usize) {
        (self.train_x.nrows(), self.test_x.nrows())
    }

    /// Features in model order.
    #[must_use]
    pub fn features(&self) -> &[String] {
        &self.features
    }
}

/// Shuffles `0..n` with a seeded generator and holds out `ceil(n * test_size)`
/// indices. Returns `(train, test)`.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn split_indices(n: usize, test_size: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = SmallRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);
    let test_n = ((n as f64) * test_size).ceil() as usize;
    let test = indices.split_off(n - test_n.min(n));
    (indices, test)
}

/// Fraction of predictions equal to the expected label.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn classification_accuracy(predictions: &[Prediction], expected: &[String]) -> f64 {
    if predictions.is_empty() || predictions.len() != expected.len() {
        return 0.0;
    }
    let hits = predictions
        .iter()
        .zip(expected)
        .filter(|(pred, label)| matches!(pred, Prediction::Label(p) if p == *label))
        .count();
    hits as f64 / expected.len() as f64
}

/// Coefficient of determination clamped to `[0, 1]`.
#[must_use]
pub fn r2_score(predictions: &Array1<f64>, expected: &Array1<f64>) -> f64 {
    if predictions.is_empty() || predictions.len() != expected.len() {
        return 0.0;
    }
    let mean = expected.mean().unwrap_or(0.0);
    let ss_res = (expected - predictions).mapv(|r| r * r).sum();
    let ss_tot = expected.mapv(|y| (y - mean).powi(2)).sum();
    if ss_tot <= f64::EPSILON {
        let exact = predictions
            .iter()
            .zip(expected)
            .all(|(p, y)| (p - y).abs() <= 1e-9);
        return if exact { 1.0 } else { 0.0 };
    }
    (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
}

/// Fits models and registers them.
#[derive(Debug, Clone)]
pub struct ModelTrainer {
    config: TrainingConfig,
    registry: ModelRegistry,
}

impl ModelTrainer {
    /// Creates a trainer writing into `registry`.
    #[must_use]
    pub const fn new(config: TrainingConfig, registry: ModelRegistry) -> Self {
        Self { config, registry }
    }

    /// Validates the request, drops incomplete rows and splits the data.
    pub fn prepare(&self, dataset: &Dataset, spec: &TargetSpec) -> PluginResult<TrainingPlan> {
        let target = match &spec.target {
            Some(target) => target.clone(),
            None => dataset
                .columns()
                .last()
                .map(|col| col.name.clone())
                .ok_or_else(|| PluginError::validation("dataset has no columns"))?,
        };
        let target_col = dataset
            .column(&target)
            .ok_or_else(|| PluginError::validation(format!("target column `{target}` is missing")))?;
        let task = match (spec.task, target_col.kind) {
            (Some(Task::Regression), ColumnKind::Text) => {
                return Err(PluginError::validation(format!(
                    "target column `{target}` is not numeric; regression needs a numeric target"
                )))
            }
            (Some(task), _) => task,
            (None, ColumnKind::Numeric) => Task::Regression,
            (None, ColumnKind::Text) => Task::Classification,
        };

        let features = self.resolve_features(dataset, &target, spec.features.as_deref())?;
        let test_size = spec.test_size.unwrap_or(self.config.test_size);
        if !(test_size > 0.0 && test_size < 1.0) {
            return Err(PluginError::validation(format!(
                "test_size must be in (0, 1), got {test_size}"
            )));
        }

        let target_idx = dataset.column_index(&target).unwrap_or_default();
        let feature_idx: Vec<usize> = features
            .iter()
            .filter_map(|name| dataset.column_index(name))
            .collect();
        let usable: Vec<usize> = dataset
            .rows()
            .iter()
            .enumerate()
            .filter(|(_, row)| {
                !row[target_idx].is_missing() && feature_idx.iter().all(|&i| !row[i].is_missing())
            })
            .map(|(idx, _)| idx)
            .collect();

        let (train_pos, test_pos) =
            split_indices(usable.len(), test_size, spec.seed.unwrap_or(self.config.seed));
        let min = self.config.min_rows_per_split;
        if train_pos.len() < min || test_pos.len() < min {
            return Err(PluginError::validation(format!(
                "{} complete rows give a {}/{} split; each side needs at least {min} rows",
                usable.len(),
                train_pos.len(),
                test_pos.len()
            )));
        }
        let train_rows: Vec<usize> = train_pos.iter().map(|&p| usable[p]).collect();
        let test_rows: Vec<usize> = test_pos.iter().map(|&p| usable[p]).collect();

        let targets = |rows: &[usize]| -> Targets {
            let cells = rows.iter().map(|&r| &dataset.rows()[r][target_idx]);
            match task {
                Task::Regression => {
                    Targets::Values(cells.map(|c| c.as_number().unwrap_or_default()).collect())
                }
                Task::Classification => {
                    Targets::Labels(cells.map(|c| c.label().unwrap_or_default()).collect())
                }
            }
        };
        let train_y = targets(&train_rows);
        if let Targets::Labels(labels) = &train_y {
            let first = labels.first();
            if labels.iter().all(|label| Some(label) == first) {
                return Err(PluginError::validation(format!(
                    "classification needs at least two classes of `{target}` in the training rows"
                )));
            }
        }

        Ok(TrainingPlan {
            task,
            target,
            train_x: dataset.feature_matrix(&features, &train_rows)?,
            test_x: dataset.feature_matrix(&features, &test_rows)?,
            features,
            train_y,
            test_y: targets(&test_rows),
        })
    }

    fn resolve_features(
        &self,
        dataset: &Dataset,
        target: &str,
        requested: Option<&[String]>,
    ) -> PluginResult<Vec<String>> {
        let features: Vec<String> = match requested {
            Some(requested) => {
                for (idx, name) in requested.iter().enumerate() {
                    if name == target {
                        return Err(PluginError::validation(format!(
                            "`{name}` is the target and cannot also be a feature"
                        )));
                    }
                    if requested[..idx].contains(name) {
                        return Err(PluginError::validation(format!(
                            "feature `{name}` is listed twice"
                        )));
                    }
                    match dataset.column(name) {
                        None => {
                            return Err(PluginError::validation(format!(
                                "feature column `{name}` is missing"
                            )))
                        }
                        Some(col) if col.kind == ColumnKind::Text => {
                            return Err(PluginError::validation(format!(
                                "feature column `{name}` is not numeric"
                            )))
                        }
                        Some(_) => {}
                    }
                }
                requested.to_vec()
            }
            None => dataset
                .columns()
                .iter()
                .filter(|col| col.name != target && col.kind == ColumnKind::Numeric)
                .map(|col| col.name.clone())
                .collect(),
        };
        if features.is_empty() {
            return Err(PluginError::validation(format!(
                "no numeric feature columns besides target `{target}`"
            )));
        }
        Ok(features)
    }

    /// CPU-bound fit and held-out evaluation.
    pub fn fit(plan: TrainingPlan, config: &TrainingConfig) -> PluginResult<TrainedModel> {
        let train_rows = plan.train_x.nrows();
        let test_rows = plan.test_x.nrows();
        let (model, accuracy): (Arc<dyn Model>, f64) = match (&plan.train_y, &plan.test_y) {
            (Targets::Values(train_y), Targets::Values(test_y)) => {
                let model = LinearRegressionModel::fit(
                    &plan.train_x,
                    train_y,
                    config.learning_rate,
                    config.epochs,
                )?;
                let predicted = model.predict_values(&plan.test_x);
                if predicted.iter().any(|v| !v.is_finite()) {
                    return Err(PluginError::training(
                        "model produced non-finite predictions on held-out rows",
                    ));
                }
                let score = r2_score(&predicted, test_y);
                (Arc::new(model), score)
            }
            (Targets::Labels(train_y), Targets::Labels(test_y)) => {
                let model = NearestCentroidClassifier::fit(&plan.train_x, train_y)?;
                let score = classification_accuracy(&model.predict(&plan.test_x), test_y);
                (Arc::new(model), score)
            }
            _ => return Err(PluginError::internal("training and test targets disagree")),
        };
        Ok(TrainedModel {
            model,
            accuracy,
            target: plan.target,
            features: plan.features,
            train_rows,
            test_rows,
        })
    }

    /// Validates, fits on the blocking pool and registers the result.
    ///
    /// Registration happens only after a successful fit, so a failed,
    /// panicking or cancelled fit leaves the registry untouched.
    pub async fn train(&self, dataset: &Dataset, spec: &TargetSpec) -> PluginResult<TrainingOutcome> {
        let plan = self.prepare(dataset, spec)?;
        let task = plan.task();
        let config = self.config.clone();
        let trained = tokio::task::spawn_blocking(move || Self::fit(plan, &config))
            .await
            .map_err(|err| {
                if err.is_panic() {
                    PluginError::training("fitting procedure panicked")
                } else {
                    PluginError::training("fitting task was cancelled")
                }
            })??;
        let outcome = TrainingOutcome {
            model_id: String::new(),
            accuracy: trained.accuracy,
            metric: task.metric(),
            task,
            target: trained.target.clone(),
            features: trained.features.clone(),
            train_rows: trained.train_rows,
            test_rows: trained.test_rows,
        };
        let model_id = self.registry.insert(trained);
        Ok(TrainingOutcome { model_id, ..outcome })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetLoader;

    fn regression_csv(rows: usize) -> Dataset {
        let mut text = String::from("x1,x2,y\n");
        for i in 0..rows {
            let x1 = i as f64;
            let x2 = (i % 3) as f64;
            text.push_str(&format!("{x1},{x2},{}\n", 3.0 * x1 - 2.0 * x2 + 1.0));
        }
        DatasetLoader::default().from_reader(text.as_bytes()).unwrap()
    }

    fn trainer() -> ModelTrainer {
        ModelTrainer::new(TrainingConfig::default(), ModelRegistry::new())
    }

    #[test]
    fn split_is_reproducible_and_sized() {
        let (train, test) = split_indices(10, 0.25, 42);
        assert_eq!((train.len(), test.len()), (7, 3));
        assert_eq!(split_indices(10, 0.25, 42), (train.clone(), test.clone()));
        let mut all: Vec<_> = train.into_iter().chain(test).collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn r2_handles_constant_targets() {
        let y = Array1::from(vec![2.0, 2.0]);
        assert_eq!(r2_score(&y, &y), 1.0);
        assert_eq!(r2_score(&Array1::from(vec![1.0, 3.0]), &y), 0.0);
    }

    #[test]
    fn accuracy_counts_matches() {
        let preds = vec![Prediction::Label("a".into()), Prediction::Label("b".into())];
        let expected = vec!["a".to_string(), "a".to_string()];
        assert!((classification_accuracy(&preds, &expected) - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn defaults_to_last_column_and_numeric_features() {
        let plan = trainer()
            .prepare(&regression_csv(12), &TargetSpec::default())
            .unwrap();
        assert_eq!(plan.task(), Task::Regression);
        assert_eq!(plan.features(), ["x1".to_string(), "x2".to_string()]);
        assert_eq!(plan.split_sizes(), (9, 3));
    }

    #[test]
    fn rejects_invalid_specs() {
        let dataset = regression_csv(12);
        let cases = [
            TargetSpec {
                target: Some("nope".into()),
                ..TargetSpec::default()
            },
            TargetSpec {
                features: Some(vec!["y".into()]),
                ..TargetSpec::default()
            },
            TargetSpec {
                features: Some(vec!["x1".into(), "x1".into()]),
                ..TargetSpec::default()
            },
            TargetSpec {
                test_size: Some(1.5),
                ..TargetSpec::default()
            },
        ];
        for spec in cases {
            let err = trainer().prepare(&dataset, &spec).unwrap_err();
            assert!(matches!(err, PluginError::Validation(_)), "{spec:?}");
        }
    }

    #[test]
    fn too_few_rows_is_validation_error() {
        let err = trainer()
            .prepare(&regression_csv(3), &TargetSpec::default())
            .unwrap_err();
        assert!(matches!(err, PluginError::Validation(_)));
    }

    #[test]
    fn single_class_is_validation_error() {
        let dataset = DatasetLoader::default()
            .from_reader("x,label\n1,a\n2,a\n3,a\n4,a\n5,a\n".as_bytes())
            .unwrap();
        let err = trainer()
            .prepare(&dataset, &TargetSpec::default())
            .unwrap_err();
        assert!(matches!(err, PluginError::Validation(_)));
    }

    #[tokio::test]
    async fn trains_and_registers_regression() {
        let trainer = trainer();
        let outcome = trainer
            .train(&regression_csv(40), &TargetSpec::default())
            .await
            .unwrap();
        assert_eq!(outcome.model_id, "model_0");
        assert_eq!(outcome.metric, "r2");
        assert!(outcome.accuracy > 0.99, "r2 = {}", outcome.accuracy);
        assert_eq!(outcome.train_rows + outcome.test_rows, 40);
    }

    #[tokio::test]
    async fn failed_fit_leaves_registry_empty() {
        let registry = ModelRegistry::new();
        let config = TrainingConfig {
            learning_rate: 1e9,
            ..TrainingConfig::default()
        };
        let trainer = ModelTrainer::new(config, registry.clone());
        let err = trainer
            .train(&regression_csv(20), &TargetSpec::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::TrainingFailure(_)));
        assert!(registry.is_empty());
    }
}
