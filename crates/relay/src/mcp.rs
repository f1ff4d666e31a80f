//! A tool host that talks to an MCP server over stdio.
//!
//! Messages are newline-delimited JSON-RPC 2.0. The server is launched as a
//! child process and killed when the host is dropped.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use relay_core::tool::{Error as ToolError, ToolDescriptor, ToolHost, ToolResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;

/// How long to wait for one response line by default.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

const PROTOCOL_VERSION: &str = "2024-11-05";

/// Errors while starting a tool server.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The script is neither `.py` nor `.js`.
    #[error("unsupported server script {}, expected a .py or .js file", .0.display())]
    UnsupportedScript(PathBuf),
    /// The interpreter could not be started.
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        /// The interpreter.
        command: String,
        /// The underlying I/O error.
        source: io::Error,
    },
    /// The server did not complete the `initialize` exchange.
    #[error("handshake with the tool server failed: {0}")]
    Handshake(ToolError),
}

/// Returns the interpreter that runs `script`.
pub fn interpreter_for(script: &Path) -> Result<&'static str, LaunchError> {
    match script.extension().and_then(|ext| ext.to_str()) {
        Some("py") => Ok("python"),
        Some("js") => Ok("node"),
        _ => Err(LaunchError::UnsupportedScript(script.to_owned())),
    }
}

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListToolsResult {
    #[serde(default)]
    tools: Vec<McpTool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct McpTool {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    input_schema: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallToolResult {
    #[serde(default)]
    content: Vec<Value>,
    #[serde(default)]
    is_error: bool,
}

type BoxedReader = BufReader<Box<dyn AsyncRead + Send + Unpin>>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

struct Transport {
    reader: BoxedReader,
    writer: BoxedWriter,
}

impl Transport {
    async fn send(&mut self, request: &JsonRpcRequest<'_>) -> Result<(), ToolError> {
        let mut msg = serde_json::to_string(request).map_err(|err| {
            ToolError::invalid_input().with_reason(err.to_string())
        })?;
        trace!("-> {msg}");
        msg.push('\n');
        self.writer
            .write_all(msg.as_bytes())
            .await
            .map_err(io_error)?;
        self.writer.flush().await.map_err(io_error)
    }

    async fn receive(
        &mut self,
        id: u64,
        read_timeout: Duration,
    ) -> Result<JsonRpcResponse, ToolError> {
        let mut line = String::new();
        loop {
            line.clear();
            let bytes_read = timeout(read_timeout, self.reader.read_line(&mut line))
                .await
                .map_err(|_| {
                    ToolError::timeout().with_reason(format!(
                        "no response from the tool server within {}s",
                        read_timeout.as_secs_f64()
                    ))
                })?
                .map_err(io_error)?;
            if bytes_read == 0 {
                return Err(ToolError::connection()
                    .with_reason("the tool server closed its stdout"));
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            trace!("<- {trimmed}");
            // Servers may print logs to stdout, and notifications or stale
            // responses can arrive before ours.
            match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                Ok(response) if response.id == Some(id) => return Ok(response),
                Ok(response) => {
                    debug!("skipping message with id {:?}", response.id);
                }
                Err(_) => debug!("skipping non JSON-RPC line: {trimmed}"),
            }
        }
    }
}

fn io_error(err: io::Error) -> ToolError {
    ToolError::connection().with_reason(err.to_string())
}

/// A [`ToolHost`] backed by an MCP server.
///
/// Requests are serialized over the single stdio channel, so the host can be
/// shared by concurrent queries.
pub struct McpToolHost {
    transport: Mutex<Transport>,
    request_id: AtomicU64,
    read_timeout: Duration,
    server_info: Value,
    // Killed on drop.
    _child: Option<Child>,
}

impl McpToolHost {
    /// Launches `script` and performs the handshake.
    ///
    /// `.py` scripts run with `python` and unbuffered output, `.js` scripts
    /// run with `node`. The server inherits the environment and stderr.
    pub async fn launch(script: &Path) -> Result<Self, LaunchError> {
        let command = interpreter_for(script)?;
        let mut child = Command::new(command)
            .arg(script)
            .env("PYTHONUNBUFFERED", "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                command: command.to_owned(),
                source,
            })?;
        info!("started tool server: {command} {}", script.display());

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take())
        else {
            return Err(LaunchError::Handshake(
                ToolError::connection().with_reason("stdio is not piped"),
            ));
        };
        Self::connect(stdout, stdin, Some(child), DEFAULT_READ_TIMEOUT)
            .await
            .map_err(LaunchError::Handshake)
    }

    /// Performs the handshake over an existing pair of streams.
    pub async fn connect<R, W>(
        reader: R,
        writer: W,
        child: Option<Child>,
        read_timeout: Duration,
    ) -> Result<Self, ToolError>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let transport = Transport {
            reader: BufReader::new(Box::new(reader)),
            writer: Box::new(writer),
        };
        let mut host = Self {
            transport: Mutex::new(transport),
            request_id: AtomicU64::new(1),
            read_timeout,
            server_info: Value::Null,
            _child: child,
        };

        let result = host
            .request(
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": env!("CARGO_PKG_NAME"),
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                }),
            )
            .await?;
        host.server_info = result.get("serverInfo").cloned().unwrap_or_default();
        host.notify("notifications/initialized", json!({})).await?;
        debug!("tool server initialized: {}", host.server_info);
        Ok(host)
    }

    /// Returns the `serverInfo` the server announced.
    #[inline]
    pub fn server_info(&self) -> &Value {
        &self.server_info
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, ToolError> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: Some(id),
            method,
            params,
        };

        let mut transport = self.transport.lock().await;
        transport.send(&request).await?;
        let response = transport.receive(id, self.read_timeout).await?;
        drop(transport);

        if let Some(error) = response.error {
            return Err(ToolError::execution_error()
                .with_reason(format!("[{}] {}", error.code, error.message)));
        }
        Ok(response.result.unwrap_or_default())
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), ToolError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: None,
            method,
            params,
        };
        self.transport.lock().await.send(&request).await
    }
}

#[async_trait]
impl ToolHost for McpToolHost {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolError> {
        let result = self.request("tools/list", json!({})).await?;
        let result: ListToolsResult =
            serde_json::from_value(result).map_err(|err| {
                ToolError::execution_error()
                    .with_reason(format!("malformed tools/list result: {err}"))
            })?;
        Ok(result
            .tools
            .into_iter()
            .map(|tool| ToolDescriptor {
                name: tool.name,
                description: tool.description.unwrap_or_default(),
                input_schema: tool
                    .input_schema
                    .unwrap_or_else(|| json!({ "type": "object" })),
            })
            .collect())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> ToolResult {
        let result = self
            .request(
                "tools/call",
                json!({ "name": name, "arguments": arguments }),
            )
            .await?;
        let result: CallToolResult =
            serde_json::from_value(result).map_err(|err| {
                ToolError::execution_error()
                    .with_reason(format!("malformed tools/call result: {err}"))
            })?;

        let text = result
            .content
            .first()
            .and_then(|item| item.get("text"))
            .and_then(Value::as_str)
            .map(str::to_owned);
        match (result.is_error, text) {
            (false, Some(text)) => Ok(text),
            (true, text) => Err(ToolError::execution_error().with_reason(
                text.unwrap_or_else(|| format!("tool `{name}` reported an error")),
            )),
            (false, None) => Err(ToolError::execution_error()
                .with_reason(format!("tool `{name}` returned no text content"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use relay_core::tool::ErrorKind;
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf, duplex, split};

    use super::*;

    /// The server end of an in-memory connection.
    struct FakeServer {
        lines: tokio::io::Lines<BufReader<ReadHalf<DuplexStream>>>,
        writer: WriteHalf<DuplexStream>,
    }

    impl FakeServer {
        async fn expect(&mut self, method: &str) -> Value {
            let line = self.lines.next_line().await.unwrap().unwrap();
            let message: Value = serde_json::from_str(&line).unwrap();
            assert_eq!(message["jsonrpc"], "2.0");
            assert_eq!(message["method"], method);
            message
        }

        async fn reply(&mut self, request: &Value, result: Value) {
            self.write_line(
                &json!({ "jsonrpc": "2.0", "id": request["id"], "result": result })
                    .to_string(),
            )
            .await;
        }

        async fn write_line(&mut self, line: &str) {
            self.writer.write_all(line.as_bytes()).await.unwrap();
            self.writer.write_all(b"\n").await.unwrap();
            self.writer.flush().await.unwrap();
        }

        async fn handshake(&mut self) {
            let init = self.expect("initialize").await;
            assert_eq!(init["params"]["protocolVersion"], PROTOCOL_VERSION);
            self.write_line("server starting...").await;
            self.reply(&init, json!({ "serverInfo": { "name": "fake" } }))
                .await;
            let initialized = self.expect("notifications/initialized").await;
            assert!(initialized.get("id").is_none());
        }
    }

    fn pipe() -> (FakeServer, ReadHalf<DuplexStream>, WriteHalf<DuplexStream>) {
        let (client, server) = duplex(64 * 1024);
        let (client_reader, client_writer) = split(client);
        let (server_reader, server_writer) = split(server);
        let server = FakeServer {
            lines: BufReader::new(server_reader).lines(),
            writer: server_writer,
        };
        (server, client_reader, client_writer)
    }

    #[test]
    fn test_interpreter_for() {
        assert_eq!(interpreter_for(Path::new("server.py")).unwrap(), "python");
        assert_eq!(interpreter_for(Path::new("dist/server.js")).unwrap(), "node");
        assert!(matches!(
            interpreter_for(Path::new("server.sh")),
            Err(LaunchError::UnsupportedScript(_))
        ));
        assert!(interpreter_for(Path::new("server")).is_err());
    }

    #[tokio::test]
    async fn test_list_and_call() {
        let (mut server, reader, writer) = pipe();
        let server_task = tokio::spawn(async move {
            server.handshake().await;

            let list = server.expect("tools/list").await;
            server
                .reply(
                    &list,
                    json!({ "tools": [
                        {
                            "name": "search_google",
                            "description": "Searches the web",
                            "inputSchema": { "type": "object", "properties": { "query": { "type": "string" } } }
                        },
                        { "name": "send_email_with_attachment" }
                    ] }),
                )
                .await;

            let call = server.expect("tools/call").await;
            assert_eq!(call["params"]["name"], "search_google");
            assert_eq!(call["params"]["arguments"], json!({ "query": "流感" }));
            // A notification before the response is skipped.
            server
                .write_line(r#"{"jsonrpc":"2.0","method":"notifications/message","params":{}}"#)
                .await;
            server
                .reply(
                    &call,
                    json!({ "content": [
                        { "type": "text", "text": "first" },
                        { "type": "text", "text": "second" }
                    ] }),
                )
                .await;

            let call = server.expect("tools/call").await;
            server
                .reply(
                    &call,
                    json!({ "content": [{ "type": "text", "text": "smtp refused" }], "isError": true }),
                )
                .await;

            let call = server.expect("tools/call").await;
            server
                .write_line(
                    &json!({
                        "jsonrpc": "2.0",
                        "id": call["id"],
                        "error": { "code": -32602, "message": "unknown tool" }
                    })
                    .to_string(),
                )
                .await;
        });

        let host = McpToolHost::connect(reader, writer, None, DEFAULT_READ_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(host.server_info()["name"], "fake");

        let tools = host.list_tools().await.unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "search_google");
        assert_eq!(tools[0].description, "Searches the web");
        assert_eq!(tools[0].input_schema["properties"]["query"]["type"], "string");
        assert_eq!(tools[1].description, "");
        assert_eq!(tools[1].input_schema, json!({ "type": "object" }));

        let mut arguments = Map::new();
        arguments.insert("query".to_owned(), json!("流感"));
        let output = host.call_tool("search_google", arguments).await.unwrap();
        assert_eq!(output, "first");

        let err = host
            .call_tool("send_email_with_attachment", Map::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExecutionError);
        assert_eq!(err.reason(), "smtp refused");

        let err = host.call_tool("nope", Map::new()).await.unwrap_err();
        assert_eq!(err.reason(), "[-32602] unknown tool");

        server_task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_timeout() {
        let (mut server, reader, writer) = pipe();
        let server_task = tokio::spawn(async move {
            server.handshake().await;
            server.expect("tools/list").await;
            // Never answers, but keeps the connection open.
            server
        });

        let host = McpToolHost::connect(reader, writer, None, Duration::from_secs(60))
            .await
            .unwrap();
        let err = host.list_tools().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        drop(server_task.await.unwrap());
    }

    #[tokio::test]
    async fn test_server_exit() {
        let (server, reader, writer) = pipe();
        drop(server);

        let Err(err) =
            McpToolHost::connect(reader, writer, None, DEFAULT_READ_TIMEOUT).await
        else {
            panic!("expected a handshake failure");
        };
        assert_eq!(err.kind(), ErrorKind::Connection);
    }
}
