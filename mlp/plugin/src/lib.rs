#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Data-science tool plugin: dataset analysis, model training and prediction
//! behind a JSON-RPC tool surface.

/// Dataset statistics.
pub mod analysis;
/// Configuration layer (TOML + environment).
pub mod config;
/// Tabular data model and loaders.
pub mod dataset;
/// Error taxonomy.
pub mod error;
/// Fitted models.
pub mod model;
/// Prediction against registered models.
pub mod predictor;
/// Model registry.
pub mod registry;
/// Stdio JSON-RPC server.
pub mod server;
/// Telemetry helpers for logging/event emission.
pub mod telemetry;
/// Tool descriptors and dispatch.
pub mod tools;
/// Model training.
pub mod trainer;

pub use analysis::{AnalysisReport, ColumnSummary, DataAnalyzer};
pub use config::{DataConfig, PluginConfig, TelemetryConfig, TrainingConfig};
pub use dataset::{Cell, Column, ColumnKind, Dataset, DatasetLoader};
pub use error::{ErrorKind, PluginError, PluginResult};
pub use model::{Model, Prediction, Task};
pub use predictor::Predictor;
pub use registry::{ModelRegistry, ModelSummary, RegisteredModel, TrainedModel};
pub use server::{serve, serve_stdio};
pub use telemetry::{PluginTelemetry, PluginTelemetryBuilder};
pub use tools::{tool_descriptors, MlPlugin, ToolDescriptor, ToolName, ToolOutcome};
pub use trainer::{ModelTrainer, TargetSpec, TrainingOutcome, TrainingPlan};
