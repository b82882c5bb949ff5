//! Tool surface: descriptors, argument decoding and dispatch.

use std::{
    path::{Path, PathBuf},
    str::FromStr,
    time::Instant,
};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use shared_logging::LogLevel;

use crate::{
    analysis::{AnalysisReport, DataAnalyzer},
    config::PluginConfig,
    dataset::DatasetLoader,
    error::{PluginError, PluginResult},
    model::Prediction,
    predictor::Predictor,
    registry::ModelRegistry,
    telemetry::{PluginTelemetry, ANALYSIS_COMPLETED, MODEL_REGISTERED, TOOL_FAILED},
    trainer::{ModelTrainer, TargetSpec, TrainingOutcome},
};

/// Tools the plugin answers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolName {
    /// Summarize a data file.
    AnalyzeData,
    /// Train and register a model.
    TrainModel,
    /// Apply a registered model.
    Predict,
}

impl ToolName {
    /// Every tool, in listing order.
    pub const ALL: [Self; 3] = [Self::AnalyzeData, Self::TrainModel, Self::Predict];

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AnalyzeData => "analyze_data",
            Self::TrainModel => "train_model",
            Self::Predict => "predict",
        }
    }
}

impl FromStr for ToolName {
    type Err = PluginError;

    fn from_str(raw: &str) -> PluginResult<Self> {
        Self::ALL
            .into_iter()
            .find(|tool| tool.as_str() == raw)
            .ok_or_else(|| PluginError::not_found(format!("unknown tool `{raw}`")))
    }
}

/// Listing entry for one tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    /// Wire name.
    pub name: &'static str,
    /// Human-readable summary.
    pub description: &'static str,
    /// JSON schema of the arguments object.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Descriptors for every tool.
#[must_use]
pub fn tool_descriptors() -> Vec<ToolDescriptor> {
    ToolName::ALL.into_iter().map(descriptor).collect()
}

fn descriptor(tool: ToolName) -> ToolDescriptor {
    let (description, input_schema) = match tool {
        ToolName::AnalyzeData => (
            "Load a delimited data file and report its shape, column names, missing-value counts and per-column statistics.",
            json!({
                "type": "object",
                "properties": {
                    "file_path": { "type": "string", "description": "Path to a CSV file with a header row" }
                },
                "required": ["file_path"]
            }),
        ),
        ToolName::TrainModel => (
            "Train a model on a data file, score it on a held-out split and register it.",
            json!({
                "type": "object",
                "properties": {
                    "data_path": { "type": "string", "description": "Path to a CSV file with a header row" },
                    "target": { "type": "string", "description": "Target column; defaults to the last column" },
                    "features": { "type": "array", "items": { "type": "string" }, "description": "Feature columns; defaults to every other numeric column" },
                    "test_size": { "type": "number", "exclusiveMinimum": 0, "exclusiveMaximum": 1 },
                    "seed": { "type": "integer", "minimum": 0 },
                    "task": { "type": "string", "enum": ["regression", "classification"] }
                },
                "required": ["data_path"]
            }),
        ),
        ToolName::Predict => (
            "Predict one value per input row with a registered model.",
            json!({
                "type": "object",
                "properties": {
                    "model_id": { "type": "string" },
                    "data": {
                        "type": "array",
                        "description": "Rows as objects keyed by feature name, or arrays in training feature order",
                        "items": { "type": ["object", "array"] }
                    }
                },
                "required": ["model_id", "data"]
            }),
        ),
    };
    ToolDescriptor {
        name: tool.as_str(),
        description,
        input_schema,
    }
}

#[derive(Debug, Deserialize)]
struct AnalyzeArgs {
    file_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct TrainArgs {
    data_path: PathBuf,
    #[serde(flatten)]
    spec: TargetSpec,
}

#[derive(Debug, Deserialize)]
struct PredictArgs {
    model_id: String,
    // Absent rows still resolve the model first.
    #[serde(default)]
    data: Value,
}

fn decode_args<T: DeserializeOwned>(tool: ToolName, args: Value) -> PluginResult<T> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args).map_err(|err| {
        PluginError::validation(format!("invalid arguments for `{}`: {err}", tool.as_str()))
    })
}

/// Result of one dispatched call.
#[derive(Debug, Clone, Serialize)]
pub struct ToolOutcome {
    /// Requested tool name.
    pub tool: String,
    /// `false` when `payload` is an error payload.
    pub success: bool,
    /// Result or `{ "error": { kind, message } }`.
    pub payload: Value,
    /// Wall time spent in the handler.
    pub execution_ms: u64,
}

/// The plugin: owns the registry handle and every component.
#[derive(Debug, Clone)]
pub struct MlPlugin {
    loader: DatasetLoader,
    analyzer: DataAnalyzer,
    trainer: ModelTrainer,
    predictor: Predictor,
    registry: ModelRegistry,
    telemetry: PluginTelemetry,
}

impl MlPlugin {
    /// Wires components around an injected registry.
    #[must_use]
    pub fn new(config: &PluginConfig, registry: ModelRegistry, telemetry: PluginTelemetry) -> Self {
        Self {
            loader: DatasetLoader::new(config.delimiter_byte()),
            analyzer: DataAnalyzer,
            trainer: ModelTrainer::new(config.training.clone(), registry.clone()),
            predictor: Predictor::new(registry.clone()),
            registry,
            telemetry,
        }
    }

    /// Registry shared by trainer and predictor.
    #[must_use]
    pub const fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Telemetry handle.
    #[must_use]
    pub const fn telemetry(&self) -> &PluginTelemetry {
        &self.telemetry
    }

    /// Loads and analyzes a file.
    pub async fn analyze_file(&self, path: &Path) -> PluginResult<AnalysisReport> {
        let dataset = self.loader.load_async(path.to_path_buf()).await?;
        let report = self.analyzer.analyze(&dataset);
        self.telemetry
            .event(
                ANALYSIS_COMPLETED,
                json!({
                    "file_path": path.display().to_string(),
                    "shape": report.shape,
                }),
            )
            .await;
        Ok(report)
    }

    /// Loads a file, trains on it and registers the model.
    pub async fn train_file(&self, path: &Path, spec: &TargetSpec) -> PluginResult<TrainingOutcome> {
        let dataset = self.loader.load_async(path.to_path_buf()).await?;
        let outcome = self.trainer.train(&dataset, spec).await?;
        self.telemetry.log(
            LogLevel::Info,
            "model registered",
            &json!({
                "model_id": outcome.model_id,
                "metric": outcome.metric,
                "accuracy": outcome.accuracy,
                "train_rows": outcome.train_rows,
                "test_rows": outcome.test_rows,
            }),
        );
        self.telemetry
            .event(
                MODEL_REGISTERED,
                json!({
                    "model_id": outcome.model_id,
                    "task": outcome.task,
                    "target": outcome.target,
                    "accuracy": outcome.accuracy,
                }),
            )
            .await;
        Ok(outcome)
    }

    /// Applies a registered model to JSON rows.
    pub fn predict_rows(&self, model_id: &str, data: &Value) -> PluginResult<Vec<Prediction>> {
        self.predictor.predict(model_id, data)
    }

    /// `analyze_data` handler.
    pub async fn analyze_data(&self, args: Value) -> PluginResult<Value> {
        let args: AnalyzeArgs = decode_args(ToolName::AnalyzeData, args)?;
        let report = self.analyze_file(&args.file_path).await?;
        Ok(json!({ "analysis": report }))
    }

    /// `train_model` handler.
    pub async fn train_model(&self, args: Value) -> PluginResult<Value> {
        let args: TrainArgs = decode_args(ToolName::TrainModel, args)?;
        let outcome = self.train_file(&args.data_path, &args.spec).await?;
        serde_json::to_value(outcome)
            .map_err(|err| PluginError::internal(format!("encoding training outcome: {err}")))
    }

    /// `predict` handler.
    pub async fn predict(&self, args: Value) -> PluginResult<Value> {
        let args: PredictArgs = decode_args(ToolName::Predict, args)?;
        let predictions = self.predict_rows(&args.model_id, &args.data)?;
        Ok(json!({ "predictions": predictions }))
    }

    async fn dispatch(&self, name: &str, args: Value) -> PluginResult<Value> {
        match name.parse::<ToolName>()? {
            ToolName::AnalyzeData => self.analyze_data(args).await,
            ToolName::TrainModel => self.train_model(args).await,
            ToolName::Predict => self.predict(args).await,
        }
    }

    /// Dispatches a call by name. Errors come back as payloads, never as
    /// `Err`, and are logged and published as `plugin.tool.failed`.
    pub async fn call(&self, name: &str, args: Value) -> ToolOutcome {
        let started = Instant::now();
        let result = self.dispatch(name, args).await;
        let execution_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match result {
            Ok(payload) => {
                self.telemetry.log(
                    LogLevel::Debug,
                    "tool call succeeded",
                    &json!({ "tool": name, "execution_ms": execution_ms }),
                );
                ToolOutcome {
                    tool: name.to_string(),
                    success: true,
                    payload,
                    execution_ms,
                }
            }
            Err(err) => {
                let details = json!({
                    "tool": name,
                    "kind": err.kind(),
                    "message": err.message(),
                    "execution_ms": execution_ms,
                });
                self.telemetry.log(LogLevel::Warn, "tool call failed", &details);
                self.telemetry.event(TOOL_FAILED, details).await;
                ToolOutcome {
                    tool: name.to_string(),
                    success: false,
                    payload: err.to_payload(),
                    execution_ms,
                }
            }
        }
    }
}
