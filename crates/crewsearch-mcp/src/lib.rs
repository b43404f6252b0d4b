//! Tool server exposing the research crew as a single `crew_search` tool.
//!
//! Speaks newline-delimited JSON-RPC 2.0: one request per input line, one
//! response per output line. Notifications (requests without an id) are
//! processed but never answered.

use std::sync::Arc;

use async_trait::async_trait;
use crewsearch_agents::ResearchService;
use crewsearch_core::redaction::is_error_text;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, instrument, warn};

pub const TOOL_NAME: &str = "crew_search";
pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;

const TOOL_DESCRIPTION: &str = "Research a question with a crew of agents (web searcher, \
                                research analyst, technical writer) and return a markdown \
                                answer with source links.";

/// Anything that can turn a query into the research reply text.
#[async_trait]
pub trait Researcher: Send + Sync {
    /// Final answer, or `"Error: <message>"`.
    async fn research(&self, query: &str) -> String;
}

#[async_trait]
impl Researcher for ResearchService {
    async fn research(&self, query: &str) -> String {
        ResearchService::research(self, query).await
    }
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(rename = "jsonrpc", default)]
    _jsonrpc: String,
    #[serde(default)]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    code: i32,
    message: String,
}

impl JsonRpcResponse {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Value, code: i32, message: impl Into<String>) -> Self {
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

#[derive(Debug, Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct CrewSearchArguments {
    query: String,
}

pub struct McpServer<R> {
    researcher: Arc<R>,
    version: &'static str,
}

impl<R: Researcher> McpServer<R> {
    pub fn new(researcher: Arc<R>) -> Self {
        Self {
            researcher,
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    pub fn tool_definition() -> Value {
        json!({
            "name": TOOL_NAME,
            "description": TOOL_DESCRIPTION,
            "inputSchema": {
                "type": "object",
                "required": ["query"],
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The question to research"
                    }
                }
            }
        })
    }

    /// Handle one raw input line; `None` means nothing should be written back.
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let value = match serde_json::from_str::<Value>(line) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "unparseable request");
                return encode(&JsonRpcResponse::error(
                    Value::Null,
                    PARSE_ERROR,
                    format!("Parse error: {err}"),
                ));
            }
        };

        // echo the id of a malformed request when one can be read
        let id = value.get("id").cloned().unwrap_or(Value::Null);
        let response = match serde_json::from_value::<JsonRpcRequest>(value) {
            Ok(request) => self.handle_request(request).await?,
            Err(err) => {
                warn!(error = %err, "invalid request");
                JsonRpcResponse::error(id, INVALID_REQUEST, format!("Invalid Request: {err}"))
            }
        };
        encode(&response)
    }

    #[instrument(skip_all, fields(method = %request.method))]
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let Some(id) = request.id else {
            debug!("notification received");
            return None;
        };

        let response = match request.method.as_str() {
            "initialize" => JsonRpcResponse::success(
                id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "serverInfo": { "name": TOOL_NAME, "version": self.version },
                    "capabilities": { "tools": {} }
                }),
            ),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => {
                JsonRpcResponse::success(id, json!({ "tools": [Self::tool_definition()] }))
            }
            "tools/call" => self.call_tool(id, request.params).await,
            other => {
                JsonRpcResponse::error(id, METHOD_NOT_FOUND, format!("Unknown method: {other}"))
            }
        };
        Some(response)
    }

    async fn call_tool(&self, id: Value, params: Value) -> JsonRpcResponse {
        let call: CallParams = match serde_json::from_value(params) {
            Ok(call) => call,
            Err(err) => {
                return JsonRpcResponse::error(id, INVALID_PARAMS, format!("Invalid params: {err}"));
            }
        };
        if call.name != TOOL_NAME {
            return JsonRpcResponse::error(
                id,
                INVALID_PARAMS,
                format!("Unknown tool: {}", call.name),
            );
        }
        let arguments: CrewSearchArguments = match serde_json::from_value(call.arguments) {
            Ok(arguments) => arguments,
            Err(err) => {
                return JsonRpcResponse::error(
                    id,
                    INVALID_PARAMS,
                    format!("Invalid arguments: {err}"),
                );
            }
        };

        info!(query_len = arguments.query.len(), "crew_search called");
        let text = self.researcher.research(&arguments.query).await;
        let is_error = is_error_text(&text);

        JsonRpcResponse::success(
            id,
            json!({
                "content": [{ "type": "text", "text": text }],
                "isError": is_error
            }),
        )
    }

    /// Serve until `reader` reaches end of input.
    pub async fn serve<I, O>(&self, reader: I, mut writer: O) -> anyhow::Result<()>
    where
        I: AsyncBufRead + Unpin,
        O: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            if let Some(frame) = self.handle_line(&line).await {
                writer.write_all(frame.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }
        info!("input closed; shutting down");
        Ok(())
    }
}

fn encode(response: &JsonRpcResponse) -> Option<String> {
    match serde_json::to_string(response) {
        Ok(frame) => Some(frame),
        Err(err) => {
            warn!(error = %err, "failed to serialize response");
            None
        }
    }
}
