use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mlp_plugin::{
    serve_stdio, tool_descriptors, MlPlugin, ModelRegistry, PluginConfig, PluginTelemetry,
    TargetSpec, Task,
};
use serde_json::json;
use shared_logging::LogLevel;
use tokio::runtime::Runtime;

#[derive(Parser, Debug)]
#[command(name = "mlp", version, about = "Dataset analysis, training and prediction tools")]
struct Cli {
    /// TOML configuration file; environment overrides still apply.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serves the tools as JSON-RPC over stdin/stdout (default).
    Serve,
    /// Prints the analysis report for a data file.
    Analyze {
        /// Delimited file with a header row.
        file: PathBuf,
    },
    /// Trains a model on a data file and prints the outcome.
    Train {
        /// Delimited file with a header row.
        file: PathBuf,
        /// Target column; defaults to the last column.
        #[arg(long)]
        target: Option<String>,
        /// Comma-separated feature columns.
        #[arg(long, value_delimiter = ',')]
        features: Option<Vec<String>>,
        /// Held-out fraction in (0, 1).
        #[arg(long)]
        test_size: Option<f64>,
        /// Shuffle seed.
        #[arg(long)]
        seed: Option<u64>,
        /// `regression` or `classification`; inferred when omitted.
        #[arg(long, value_parser = parse_task)]
        task: Option<Task>,
    },
    /// Prints the tool descriptors.
    Tools,
}

fn parse_task(raw: &str) -> Result<Task, String> {
    match raw.to_ascii_lowercase().as_str() {
        "regression" => Ok(Task::Regression),
        "classification" => Ok(Task::Classification),
        other => Err(format!("unknown task `{other}`")),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = PluginConfig::load_or_default(cli.config.as_deref())?;
    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => handle_serve(&config),
        Commands::Analyze { file } => handle_analyze(&config, &file),
        Commands::Train {
            file,
            target,
            features,
            test_size,
            seed,
            task,
        } => {
            let spec = TargetSpec {
                target,
                features,
                test_size,
                seed,
                task,
            };
            handle_train(&config, &file, &spec)
        }
        Commands::Tools => {
            println!("{}", serde_json::to_string_pretty(&tool_descriptors())?);
            Ok(())
        }
    }
}

fn build_plugin(config: &PluginConfig) -> Result<MlPlugin> {
    let telemetry = PluginTelemetry::from_config(&config.telemetry, None)
        .context("failed to initialise telemetry")?;
    Ok(MlPlugin::new(config, ModelRegistry::new(), telemetry))
}

fn handle_serve(config: &PluginConfig) -> Result<()> {
    run_until_closed(Runtime::new()?, async {
        let plugin = build_plugin(config)?;
        plugin.telemetry().log(
            LogLevel::Info,
            "starting stdio tool server",
            &json!({
                "test_size": config.training.test_size,
                "seed": config.training.seed,
            }),
        );
        serve_stdio(plugin).await
    })
}

/// Drives `task` to completion, then drops the runtime without waiting on the
/// blocking pool. A cancelled fit keeps running there and must not hold the
/// process open after the server has finished.
fn run_until_closed<F>(runtime: Runtime, task: F) -> Result<()>
where
    F: std::future::Future<Output = Result<()>>,
{
    let result = runtime.block_on(task);
    runtime.shutdown_background();
    result
}

fn handle_analyze(config: &PluginConfig, file: &Path) -> Result<()> {
    let runtime = Runtime::new()?;
    let report = runtime.block_on(async {
        let plugin = build_plugin(config)?;
        plugin
            .analyze_file(file)
            .await
            .with_context(|| format!("failed to analyze {}", file.display()))
    })?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn handle_train(config: &PluginConfig, file: &Path, spec: &TargetSpec) -> Result<()> {
    let runtime = Runtime::new()?;
    let (outcome, summary) = runtime.block_on(async {
        let plugin = build_plugin(config)?;
        let outcome = plugin
            .train_file(file, spec)
            .await
            .with_context(|| format!("failed to train on {}", file.display()))?;
        let summary = plugin.registry().get(&outcome.model_id)?.summary();
        anyhow::Ok((outcome, summary))
    })?;
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({ "outcome": outcome, "model": summary }))?
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    #[test]
    fn parses_train_flags() {
        let cli = Cli::parse_from([
            "mlp",
            "--config",
            "mlp.toml",
            "train",
            "data.csv",
            "--features",
            "a,b",
            "--test-size",
            "0.3",
            "--task",
            "Classification",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("mlp.toml")));
        match cli.command {
            Some(Commands::Train {
                features,
                test_size,
                task,
                ..
            }) => {
                assert_eq!(features, Some(vec!["a".to_string(), "b".to_string()]));
                assert_eq!(test_size, Some(0.3));
                assert_eq!(task, Some(Task::Classification));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn serve_is_the_default() {
        let cli = Cli::parse_from(["mlp"]);
        assert!(cli.command.is_none());
        assert!(parse_task("forecast").is_err());
    }

    #[test]
    fn exit_does_not_wait_for_abandoned_blocking_work() {
        let started = Instant::now();
        let result = run_until_closed(Runtime::new().unwrap(), async {
            let fit = tokio::task::spawn_blocking(|| std::thread::sleep(Duration::from_secs(30)));
            fit.abort();
            Ok(())
        });
        assert!(result.is_ok());
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
