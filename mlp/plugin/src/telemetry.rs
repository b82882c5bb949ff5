use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use serde_json::Value;
use shared_event_bus::{EventPublisher, EventRecord, FileEventPublisher};
use shared_logging::{JsonLogger, LogLevel, LogRecord};

use crate::config::TelemetryConfig;

/// Emitted after a model is registered.
pub const MODEL_REGISTERED: &str = "plugin.model.registered";
/// Emitted when a tool call ends in an error.
pub const TOOL_FAILED: &str = "plugin.tool.failed";
/// Emitted after a dataset analysis.
pub const ANALYSIS_COMPLETED: &str = "plugin.analysis.completed";

#[derive(Debug, Clone)]
enum LogSink {
    Disabled,
    Stderr,
    File(PathBuf),
}

/// Builder configuring plugin telemetry.
pub struct PluginTelemetryBuilder {
    module: String,
    sink: LogSink,
    min_level: LogLevel,
    event_publisher: Option<Arc<dyn EventPublisher>>,
}

impl PluginTelemetryBuilder {
    /// Creates a builder that logs nothing and publishes nothing.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            sink: LogSink::Disabled,
            min_level: LogLevel::Info,
            event_publisher: None,
        }
    }

    /// Appends JSON log lines to `path`.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.sink = LogSink::File(path.into());
        self
    }

    /// Writes JSON log lines to stderr.
    #[must_use]
    pub fn log_to_stderr(mut self) -> Self {
        self.sink = LogSink::Stderr;
        self
    }

    /// Drops log records below `level`.
    #[must_use]
    pub const fn min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Assigns the event publisher.
    #[must_use]
    pub fn event_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.event_publisher = Some(publisher);
        self
    }

    /// Finalizes the builder.
    pub fn build(self) -> Result<PluginTelemetry> {
        let logger = match self.sink {
            LogSink::Disabled => None,
            LogSink::Stderr => Some(JsonLogger::stderr()),
            LogSink::File(path) => Some(JsonLogger::new(path)?),
        }
        .map(|logger| logger.with_min_level(self.min_level));
        Ok(PluginTelemetry {
            inner: Arc::new(TelemetryInner {
                module: self.module,
                logger,
                publisher: self.event_publisher,
            }),
        })
    }
}

/// Structured logging and event emission for the plugin. Clones share sinks.
#[derive(Clone)]
pub struct PluginTelemetry {
    inner: Arc<TelemetryInner>,
}

struct TelemetryInner {
    module: String,
    logger: Option<JsonLogger>,
    publisher: Option<Arc<dyn EventPublisher>>,
}

impl fmt::Debug for PluginTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginTelemetry")
            .field("module", &self.inner.module)
            .field("logger", &self.inner.logger)
            .field("events", &self.inner.publisher.is_some())
            .finish()
    }
}

impl PluginTelemetry {
    /// Returns a builder for this telemetry helper.
    #[must_use]
    pub fn builder(module: impl Into<String>) -> PluginTelemetryBuilder {
        PluginTelemetryBuilder::new(module)
    }

    /// Telemetry that discards everything.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            inner: Arc::new(TelemetryInner {
                module: "mlp.plugin".into(),
                logger: None,
                publisher: None,
            }),
        }
    }

    /// Builds telemetry from the `[telemetry]` config section. Logs go to the
    /// configured file, or stderr when none is set; events go to the
    /// configured event log, or `publisher` when given.
    pub fn from_config(
        config: &TelemetryConfig,
        publisher: Option<Arc<dyn EventPublisher>>,
    ) -> Result<Self> {
        let mut builder = Self::builder("mlp.plugin").min_level(config.level()?);
        builder = match &config.log_path {
            Some(path) => builder.log_path(path),
            None => builder.log_to_stderr(),
        };
        let publisher = match (publisher, &config.event_log) {
            (Some(publisher), _) => Some(publisher),
            (None, Some(path)) => {
                Some(Arc::new(FileEventPublisher::new(path)?) as Arc<dyn EventPublisher>)
            }
            (None, None) => None,
        };
        if let Some(publisher) = publisher {
            builder = builder.event_publisher(publisher);
        }
        builder.build()
    }

    /// Logs a structured record. Sink failures are swallowed; a broken log
    /// never fails a tool call.
    pub fn log(&self, level: LogLevel, message: &str, metadata: &Value) {
        if let Some(logger) = &self.inner.logger {
            if !logger.enabled(level) {
                return;
            }
            let record = LogRecord::new(&self.inner.module, level, message).with_metadata(metadata);
            if let Err(err) = logger.log(&record) {
                eprintln!("telemetry log write failed: {err:?}");
            }
        }
    }

    /// Publishes an event when a publisher is configured.
    pub async fn event(&self, event_type: &str, payload: Value) {
        if let Some(publisher) = &self.inner.publisher {
            let record = EventRecord::new(&self.inner.module, event_type, payload);
            if let Err(err) = publisher.publish(record).await {
                self.log(
                    LogLevel::Warn,
                    "event publish failed",
                    &serde_json::json!({ "event_type": event_type, "error": err.to_string() }),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use shared_event_bus::MemoryEventBus;
    use tempfile::tempdir;
    use tokio::runtime::Runtime;

    use super::*;

    #[test]
    fn writes_filtered_log_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs/plugin.jsonl");
        let telemetry = PluginTelemetry::builder("mlp.test")
            .log_path(&path)
            .min_level(LogLevel::Warn)
            .build()
            .unwrap();
        telemetry.log(LogLevel::Info, "hidden", &json!({}));
        telemetry.log(LogLevel::Error, "shown", &json!({"tool": "predict"}));
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<Value> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["message"], "shown");
        assert_eq!(lines[0]["metadata"]["tool"], "predict");
    }

    #[test]
    fn publishes_events() {
        let bus = Arc::new(MemoryEventBus::new(16));
        let telemetry = PluginTelemetry::builder("mlp.test")
            .event_publisher(bus.clone())
            .build()
            .unwrap();
        Runtime::new().unwrap().block_on(async {
            telemetry
                .event(MODEL_REGISTERED, json!({"model_id": "model_0"}))
                .await;
        });
        let events = bus.of_type(MODEL_REGISTERED);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source, "mlp.test");
        assert_eq!(events[0].payload["model_id"], "model_0");
    }

    #[test]
    fn disabled_is_silent() {
        let telemetry = PluginTelemetry::disabled();
        telemetry.log(LogLevel::Error, "nothing", &json!({}));
        Runtime::new()
            .unwrap()
            .block_on(telemetry.event(TOOL_FAILED, json!({})));
    }
}
