//! Process-lifetime store of trained models.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::Serialize;

use crate::{
    error::{PluginError, PluginResult},
    model::{Model, Task},
};

/// Fully fitted model waiting for an identifier.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    /// Fitted predictor.
    pub model: Arc<dyn Model>,
    /// Held-out metric in `[0, 1]`.
    pub accuracy: f64,
    /// Target column.
    pub target: String,
    /// Feature columns, in the order the model consumes them.
    pub features: Vec<String>,
    /// Rows used for fitting.
    pub train_rows: usize,
    /// Rows used for evaluation.
    pub test_rows: usize,
}

/// Registry entry. Immutable once inserted.
#[derive(Debug, Clone)]
pub struct RegisteredModel {
    /// `model_<n>` identifier.
    pub id: String,
    /// Fitted predictor.
    pub model: Arc<dyn Model>,
    /// Held-out metric in `[0, 1]`.
    pub accuracy: f64,
    /// Target column.
    pub target: String,
    /// Feature columns, in the order the model consumes them.
    pub features: Vec<String>,
    /// Rows used for fitting.
    pub train_rows: usize,
    /// Rows used for evaluation.
    pub test_rows: usize,
    /// Registration time.
    pub created_at: DateTime<Utc>,
}

impl RegisteredModel {
    /// Task of the underlying model.
    #[must_use]
    pub fn task(&self) -> Task {
        self.model.task()
    }

    /// Serializable description.
    #[must_use]
    pub fn summary(&self) -> ModelSummary {
        ModelSummary {
            id: self.id.clone(),
            kind: self.model.kind(),
            task: self.task(),
            metric: self.task().metric(),
            accuracy: self.accuracy,
            target: self.target.clone(),
            features: self.features.clone(),
            train_rows: self.train_rows,
            test_rows: self.test_rows,
            created_at: self.created_at,
        }
    }
}

/// Serializable view of a registry entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSummary {
    /// Identifier.
    pub id: String,
    /// Algorithm name.
    pub kind: &'static str,
    /// Task.
    pub task: Task,
    /// Metric name.
    pub metric: &'static str,
    /// Held-out metric value.
    pub accuracy: f64,
    /// Target column.
    pub target: String,
    /// Feature columns.
    pub features: Vec<String>,
    /// Training rows.
    pub train_rows: usize,
    /// Evaluation rows.
    pub test_rows: usize,
    /// Registration time.
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct RegistryState {
    inserted: usize,
    models: IndexMap<String, Arc<RegisteredModel>>,
}

/// Shared, lock-protected map of identifier to model. Clones share state.
///
/// Identifiers are `model_<n>` where `n` counts earlier insertions; entries
/// are never replaced or evicted.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    inner: Arc<RwLock<RegistryState>>,
}

impl ModelRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a model under a fresh identifier and returns it.
    pub fn insert(&self, trained: TrainedModel) -> String {
        let created_at = Utc::now();
        let mut state = self.inner.write();
        let id = format!("model_{}", state.inserted);
        state.inserted += 1;
        let entry = Arc::new(RegisteredModel {
            id: id.clone(),
            model: trained.model,
            accuracy: trained.accuracy,
            target: trained.target,
            features: trained.features,
            train_rows: trained.train_rows,
            test_rows: trained.test_rows,
            created_at,
        });
        state.models.insert(id.clone(), entry);
        id
    }

    /// Looks up a model.
    pub fn get(&self, id: &str) -> PluginResult<Arc<RegisteredModel>> {
        self.inner
            .read()
            .models
            .get(id)
            .cloned()
            .ok_or_else(|| PluginError::not_found(format!("model `{id}` is not registered")))
    }

    /// Number of registered models.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().models.len()
    }

    /// `true` before the first insertion.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Summaries in insertion order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ModelSummary> {
        self.inner
            .read()
            .models
            .values()
            .map(|entry| entry.summary())
            .collect()
    }
}
