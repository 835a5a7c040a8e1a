use serde_json::{Map, Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::Instrument;
use uuid::Uuid;

use crate::tools::{ToolHandlers, tool_definitions};
use crate::util::to_pretty_json;

pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
pub const MCP_SERVER_NAME: &str = "apibridge-mcp";
/// Largest `Content-Length` body the reader will buffer.
pub const MAX_MESSAGE_BYTES: usize = 8 * 1024 * 1024;

/// How a message arrived; the response goes back the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// One JSON document per line (MCP stdio transport).
    Line,
    /// `Content-Length` headers, blank line, then the body.
    Header,
}

#[derive(Debug)]
pub enum Incoming {
    Message(Value, Framing),
    Malformed(String, Framing),
}

pub struct McpServer {
    tools: ToolHandlers,
    session_id: String,
}

impl McpServer {
    pub fn new(tools: ToolHandlers) -> Self {
        Self {
            tools,
            session_id: format!("stdio-{}", Uuid::now_v7()),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn serve_stdio(&self) -> Result<(), String> {
        let reader = tokio::io::BufReader::new(tokio::io::stdin());
        self.serve(reader, tokio::io::stdout()).await
    }

    /// Reads messages until EOF, answering each in its own framing.
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> Result<(), String>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let span = tracing::info_span!("mcp_session", session_id = %self.session_id);
        async move {
            tracing::info!(server = MCP_SERVER_NAME, "MCP server ready on stdio");
            loop {
                let incoming = read_message(&mut reader)
                    .await
                    .map_err(|e| format!("Failed to read MCP message: {e}"))?;
                let (responses, framing) = match incoming {
                    None => break,
                    Some(Incoming::Message(value, framing)) => {
                        (self.handle_incoming_message(value).await, framing)
                    }
                    Some(Incoming::Malformed(reason, framing)) => {
                        tracing::warn!(%reason, "Discarding malformed MCP message");
                        (
                            vec![error_response(Value::Null, RpcError::parse_error(reason))],
                            framing,
                        )
                    }
                };
                for response in responses {
                    write_message(&mut writer, &response, framing)
                        .await
                        .map_err(|e| format!("Failed to write MCP response: {e}"))?;
                }
            }
            tracing::info!("MCP client closed stdin");
            Ok::<(), String>(())
        }
        .instrument(span)
        .await
    }

    pub async fn handle_incoming_message(&self, incoming: Value) -> Vec<Value> {
        let mut responses = Vec::new();

        if let Some(batch) = incoming.as_array() {
            if batch.is_empty() {
                responses.push(error_response(
                    Value::Null,
                    RpcError::invalid_request("Batch request must not be empty"),
                ));
                return responses;
            }
            for item in batch {
                if let Some(response) = self.handle_single_message(item.clone()).await {
                    responses.push(response);
                }
            }
            return responses;
        }

        if let Some(response) = self.handle_single_message(incoming).await {
            responses.push(response);
        }
        responses
    }

    async fn handle_single_message(&self, incoming: Value) -> Option<Value> {
        let Some(obj) = incoming.as_object() else {
            return Some(error_response(
                Value::Null,
                RpcError::invalid_request("Request must be a JSON object"),
            ));
        };

        if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            let id = obj.get("id").cloned().unwrap_or(Value::Null);
            return Some(error_response(
                id,
                RpcError::invalid_request("jsonrpc must be '2.0'"),
            ));
        }

        let Some(method) = obj.get("method").and_then(Value::as_str) else {
            // A client response; this server never sends requests of its own.
            return None;
        };

        let params = obj.get("params").cloned().unwrap_or(Value::Null);
        if let Some(id) = obj.get("id").cloned() {
            let result = self.handle_request(method, params).await;
            Some(match result {
                Ok(payload) => success_response(id, payload),
                Err(err) => error_response(id, err),
            })
        } else {
            tracing::debug!(method, "Ignoring notification");
            None
        }
    }

    async fn handle_request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(initialize_payload()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(tools_list_payload()),
            "tools/call" => self.handle_tools_call(params).await,
            "resources/list" => Ok(json!({ "resources": [] })),
            "prompts/list" => Ok(json!({ "prompts": [] })),
            _ => Err(RpcError::method_not_found(method)),
        }
    }

    async fn handle_tools_call(&self, params: Value) -> Result<Value, RpcError> {
        let params = params
            .as_object()
            .ok_or_else(|| RpcError::invalid_params("tools/call params must be an object"))?;

        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("tools/call requires string field 'name'"))?;
        if !tool_definitions().iter().any(|tool| tool.name == name) {
            return Err(RpcError::invalid_params(format!("Unknown tool: {name}")));
        }

        let args = match params.get("arguments") {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(_) => {
                return Err(RpcError::invalid_params(
                    "tools/call 'arguments' must be an object",
                ));
            }
        };

        tracing::info!(tool = name, "Tool call");
        match self.tools.call(name, &args).await {
            Ok(text) => Ok(json!({
                "content": [{ "type": "text", "text": text }],
                "isError": false
            })),
            Err(err) => {
                tracing::warn!(tool = name, code = %err.code, reason = %err.message, "Tool call rejected");
                Ok(json!({
                    "content": [{ "type": "text", "text": format!("Error: {}", err.message) }],
                    "isError": true,
                    "structuredContent": err.to_value()
                }))
            }
        }
    }
}

fn initialize_payload() -> Value {
    json!({
        "protocolVersion": MCP_PROTOCOL_VERSION,
        "capabilities": {
            "tools": {
                "listChanged": false
            }
        },
        "serverInfo": {
            "name": MCP_SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION")
        },
        "instructions": "Tools wrap the remote item API: look up users, search/create/update/delete items, and check API health. Responses are plain text; GET results are cached briefly and outbound calls are rate limited."
    })
}

fn tools_list_payload() -> Value {
    let tools: Vec<Value> = tool_definitions()
        .into_iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "inputSchema": tool.input_schema,
            })
        })
        .collect();
    json!({ "tools": tools })
}

#[derive(Debug)]
pub struct RpcError {
    code: i64,
    message: String,
}

impl RpcError {
    fn parse_error(message: impl Into<String>) -> Self {
        Self {
            code: -32700,
            message: message.into(),
        }
    }

    fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: -32600,
            message: message.into(),
        }
    }

    fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method not found: {method}"),
        }
    }

    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: -32602,
            message: message.into(),
        }
    }
}

fn success_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

fn error_response(id: Value, error: RpcError) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": error.code,
            "message": error.message
        }
    })
}

/// Next message from `reader`, or `None` at a clean EOF. Blank lines between
/// messages are skipped.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<Incoming>, std::io::Error>
where
    R: AsyncBufRead + Unpin,
{
    let first = loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        if !line.trim().is_empty() {
            break line;
        }
    };

    let trimmed = first.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Ok(Some(match serde_json::from_str(trimmed) {
            Ok(value) => Incoming::Message(value, Framing::Line),
            Err(e) => Incoming::Malformed(format!("Invalid JSON payload: {e}"), Framing::Line),
        }));
    }

    // Only a Content-Length line opens a header block; anything else is a
    // stray line from a line-framed client.
    let Some(mut content_length) = parse_content_length(trimmed)? else {
        return Ok(Some(Incoming::Malformed(
            format!("Expected a JSON message, got: {}", preview(trimmed)),
            Framing::Line,
        )));
    };
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "Unexpected EOF while reading MCP headers",
            ));
        }
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            break;
        }
        if let Some(parsed) = parse_content_length(line)? {
            content_length = parsed;
        }
    }

    if content_length > MAX_MESSAGE_BYTES {
        // Drain the body without buffering it so the stream stays in sync.
        let mut body = (&mut *reader).take(content_length as u64);
        tokio::io::copy(&mut body, &mut tokio::io::sink()).await?;
        return Ok(Some(Incoming::Malformed(
            format!("Message of {content_length} bytes exceeds the {MAX_MESSAGE_BYTES} byte limit"),
            Framing::Header,
        )));
    }

    let mut payload = vec![0_u8; content_length];
    reader.read_exact(&mut payload).await?;

    Ok(Some(match serde_json::from_slice(&payload) {
        Ok(value) => Incoming::Message(value, Framing::Header),
        Err(e) => Incoming::Malformed(format!("Invalid JSON payload: {e}"), Framing::Header),
    }))
}

fn preview(line: &str) -> String {
    const LIMIT: usize = 64;
    match line.char_indices().nth(LIMIT) {
        Some((cut, _)) => format!("{}...", &line[..cut]),
        None => line.to_string(),
    }
}

fn parse_content_length(line: &str) -> Result<Option<usize>, std::io::Error> {
    let Some((name, value)) = line.split_once(':') else {
        return Ok(None);
    };
    if !name.trim().eq_ignore_ascii_case("content-length") {
        return Ok(None);
    }
    value.trim().parse::<usize>().map(Some).map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "Invalid Content-Length header",
        )
    })
}

pub async fn write_message<W>(
    writer: &mut W,
    value: &Value,
    framing: Framing,
) -> Result<(), std::io::Error>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(value).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Failed to serialize JSON: {e}"),
        )
    })?;
    match framing {
        Framing::Line => {
            writer.write_all(&body).await?;
            writer.write_all(b"\n").await?;
        }
        Framing::Header => {
            let header = format!(
                "Content-Length: {}\r\nContent-Type: application/json\r\n\r\n",
                body.len()
            );
            writer.write_all(header.as_bytes()).await?;
            writer.write_all(&body).await?;
        }
    }
    writer.flush().await?;
    Ok(())
}

/// Pretty JSON for messages printed to stderr.
pub fn render_error(error: &str, message: &str) -> String {
    to_pretty_json(&json!({ "error": error, "message": message }))
}
