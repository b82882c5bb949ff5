//! Line-delimited JSON-RPC 2.0 server exposing the plugin's tools.
//!
//! Each `tools/call` runs on its own task; every response goes through one
//! writer task so lines never interleave. The loop ends when the input stream
//! closes, after in-flight calls have answered.

use std::{collections::HashMap, sync::Arc};

use anyhow::Result;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared_logging::LogLevel;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    sync::mpsc,
    task::{AbortHandle, JoinSet},
};

use crate::tools::{tool_descriptors, MlPlugin};

const PROTOCOL_VERSION: &str = "2024-11-05";

const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[serde(default)]
    jsonrpc: String,
    #[serde(default)]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

impl JsonRpcResponse {
    const fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

type InFlight = Arc<Mutex<HashMap<String, AbortHandle>>>;

/// Serves JSON-RPC over stdin/stdout until stdin closes.
pub async fn serve_stdio(plugin: MlPlugin) -> Result<()> {
    serve(
        plugin,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await
}

/// Serves JSON-RPC requests read line by line from `reader`, writing one
/// response per line to `writer`.
pub async fn serve<R, W>(plugin: MlPlugin, reader: R, writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel::<JsonRpcResponse>();
    let writer_task = tokio::spawn(write_responses(writer, rx));
    let in_flight: InFlight = Arc::default();
    let mut calls = JoinSet::new();
    let mut segments = reader.split(b'\n');
    let mut read_error = None;

    plugin
        .telemetry()
        .log(LogLevel::Info, "tool server started", &json!({}));

    loop {
        tokio::select! {
            segment = segments.next_segment() => {
                let line = match segment {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(err) => {
                        read_error = Some(err);
                        break;
                    }
                };
                let line = line.trim_ascii();
                if line.is_empty() {
                    continue;
                }
                handle_line(&plugin, line, &tx, &in_flight, &mut calls);
            }
            Some(joined) = calls.join_next(), if !calls.is_empty() => {
                if let Err(err) = joined {
                    if err.is_panic() {
                        plugin.telemetry().log(
                            LogLevel::Error,
                            "tool call task panicked",
                            &json!({ "error": err.to_string() }),
                        );
                    }
                }
            }
        }
    }

    // Calls already accepted still answer, whatever ended the input.
    while calls.join_next().await.is_some() {}
    drop(tx);
    writer_task.await??;
    if let Some(err) = read_error {
        plugin.telemetry().log(
            LogLevel::Error,
            "reading requests failed, tool server stopped",
            &json!({ "error": err.to_string() }),
        );
        return Err(err.into());
    }
    plugin
        .telemetry()
        .log(LogLevel::Info, "input closed, tool server stopped", &json!({}));
    Ok(())
}

async fn write_responses<W>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<JsonRpcResponse>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let mut line = serde_json::to_vec(&response)?;
        line.push(b'\n');
        writer.write_all(&line).await?;
        writer.flush().await?;
    }
    Ok(())
}

fn handle_line(
    plugin: &MlPlugin,
    line: &[u8],
    tx: &mpsc::UnboundedSender<JsonRpcResponse>,
    in_flight: &InFlight,
    calls: &mut JoinSet<()>,
) {
    let message: Value = match serde_json::from_slice(line) {
        Ok(message) => message,
        Err(err) => {
            let _ = tx.send(JsonRpcResponse::error(
                Value::Null,
                PARSE_ERROR,
                format!("invalid JSON: {err}"),
            ));
            return;
        }
    };
    let id = message.get("id").cloned().unwrap_or(Value::Null);
    let request: JsonRpcRequest = match serde_json::from_value(message) {
        Ok(request) => request,
        Err(err) => {
            let _ = tx.send(JsonRpcResponse::error(
                id,
                INVALID_REQUEST,
                format!("invalid request: {err}"),
            ));
            return;
        }
    };

    if request.jsonrpc != "2.0" {
        if let Some(id) = request.id {
            let _ = tx.send(JsonRpcResponse::error(
                id,
                INVALID_REQUEST,
                "invalid JSON-RPC version",
            ));
        }
        return;
    }

    let response = match (request.method.as_str(), request.id) {
        ("initialized" | "notifications/initialized", _) => None,
        ("notifications/cancelled", _) => {
            cancel(plugin, &request.params, in_flight);
            None
        }
        ("tools/call", Some(id)) => {
            spawn_call(plugin, id, &request.params, tx, in_flight, calls);
            None
        }
        ("initialize", Some(id)) => Some(JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": { "listChanged": false } },
                "serverInfo": { "name": "mlp", "version": env!("CARGO_PKG_VERSION") },
            }),
        )),
        ("ping", Some(id)) => Some(JsonRpcResponse::success(id, json!({}))),
        ("tools/list", Some(id)) => Some(JsonRpcResponse::success(
            id,
            json!({ "tools": tool_descriptors() }),
        )),
        (method, Some(id)) => Some(JsonRpcResponse::error(
            id,
            METHOD_NOT_FOUND,
            format!("unknown method `{method}`"),
        )),
        (_, None) => None,
    };
    if let Some(response) = response {
        let _ = tx.send(response);
    }
}

fn spawn_call(
    plugin: &MlPlugin,
    id: Value,
    params: &Value,
    tx: &mpsc::UnboundedSender<JsonRpcResponse>,
    in_flight: &InFlight,
    calls: &mut JoinSet<()>,
) {
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    if name.is_empty() {
        let _ = tx.send(JsonRpcResponse::error(
            id,
            INVALID_PARAMS,
            "missing tool name in params",
        ));
        return;
    }
    let args = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

    let key = id.to_string();
    let plugin = plugin.clone();
    let tx = tx.clone();
    let handle = calls.spawn(async move {
        let outcome = plugin.call(&name, args).await;
        let result = json!({
            "content": [{ "type": "text", "text": outcome.payload.to_string() }],
            "structuredContent": outcome.payload,
            "isError": !outcome.success,
        });
        let _ = tx.send(JsonRpcResponse::success(id, result));
    });

    let mut in_flight = in_flight.lock();
    in_flight.retain(|_, running| !running.is_finished());
    in_flight.insert(key, handle);
}

fn cancel(plugin: &MlPlugin, params: &Value, in_flight: &InFlight) {
    let Some(request_id) = params.get("requestId") else {
        return;
    };
    let handle = in_flight.lock().remove(&request_id.to_string());
    let aborted = handle.is_some();
    if let Some(handle) = handle {
        handle.abort();
    }
    plugin.telemetry().log(
        LogLevel::Info,
        "request cancelled",
        &json!({ "request_id": request_id, "aborted": aborted, "reason": params.get("reason") }),
    );
}

#[cfg(test)]
mod tests {
    use tokio::{io::duplex, runtime::Runtime};

    use super::*;
    use crate::{config::PluginConfig, registry::ModelRegistry, telemetry::PluginTelemetry};

    fn run(input: impl AsRef<[u8]>) -> Vec<Value> {
        Runtime::new().unwrap().block_on(async {
            let plugin = MlPlugin::new(
                &PluginConfig::default(),
                ModelRegistry::new(),
                PluginTelemetry::disabled(),
            );
            let (out_writer, mut out_reader) = duplex(64 * 1024);
            let input: &[u8] = input.as_ref();
            serve(plugin, input, out_writer).await.unwrap();
            let mut output = String::new();
            tokio::io::AsyncReadExt::read_to_string(&mut out_reader, &mut output)
                .await
                .unwrap();
            output
                .lines()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect()
        })
    }

    #[test]
    fn reports_protocol_errors() {
        let responses = run(concat!(
            "not json\n",
            "{\"jsonrpc\":\"1.0\",\"id\":1,\"method\":\"ping\"}\n",
            "{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"shutdown\"}\n",
            "{\"jsonrpc\":\"2.0\",\"id\":3,\"method\":\"tools/call\",\"params\":{}}\n",
        ));
        let codes: Vec<_> = responses
            .iter()
            .map(|r| r["error"]["code"].as_i64().unwrap())
            .collect();
        assert_eq!(codes, [PARSE_ERROR, INVALID_REQUEST, METHOD_NOT_FOUND, INVALID_PARAMS]);
    }

    #[test]
    fn notifications_get_no_reply() {
        let responses = run(concat!(
            "{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n",
            "\n",
            "{\"jsonrpc\":\"2.0\",\"id\":\"a\",\"method\":\"ping\"}\n",
        ));
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["id"], "a");
        assert_eq!(responses[0]["result"], json!({}));
    }

    #[test]
    fn tool_errors_are_results() {
        let responses = run(
            "{\"jsonrpc\":\"2.0\",\"id\":9,\"method\":\"tools/call\",\"params\":{\"name\":\"predict\",\"arguments\":{\"model_id\":\"model_3\",\"data\":[]}}}\n",
        );
        let result = &responses[0]["result"];
        assert_eq!(result["isError"], true);
        assert_eq!(result["structuredContent"]["error"]["kind"], "not_found");
        let text: Value =
            serde_json::from_str(result["content"][0]["text"].as_str().unwrap()).unwrap();
        assert_eq!(text, result["structuredContent"]);
    }

    #[test]
    fn well_formed_json_that_is_not_a_request_is_invalid() {
        let responses = run(concat!(
            "{\"jsonrpc\":\"2.0\",\"id\":4}\n",
            "[{\"jsonrpc\":\"2.0\",\"id\":5,\"method\":\"ping\"}]\n",
            "{\"jsonrpc\":\"2.0\",\"id\":6,\"method\":7}\n",
        ));
        let errors: Vec<_> = responses
            .iter()
            .map(|r| (r["id"].clone(), r["error"]["code"].as_i64().unwrap()))
            .collect();
        assert_eq!(
            errors,
            [
                (json!(4), INVALID_REQUEST),
                (Value::Null, INVALID_REQUEST),
                (json!(6), INVALID_REQUEST),
            ]
        );
    }

    #[test]
    fn undecodable_bytes_do_not_stop_the_server() {
        let mut input = b"\xff\xfe garbage\r\n".to_vec();
        input.extend_from_slice(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\r\n");
        let responses = run(input);
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["error"]["code"], PARSE_ERROR);
        assert_eq!(responses[1]["id"], 1);
        assert_eq!(responses[1]["result"], json!({}));
    }
}
