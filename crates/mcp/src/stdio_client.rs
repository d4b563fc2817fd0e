use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{Result, TransportError};
use crate::pending::PendingRequests;
use crate::protocol::{
    CallToolResult, InitializeParams, InitializeResult, JsonRpcNotification, JsonRpcRequest,
    ListToolsResult,
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(15_000);

#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub executable: String,
    pub args: Vec<String>,
    /// Overlaid on the parent environment.
    pub env: HashMap<String, String>,
    /// Per-call response deadline.
    pub timeout: Duration,
}

impl TransportOptions {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            env: HashMap::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

struct Connection {
    child: Child,
    pending: PendingRequests,
    reader: JoinHandle<()>,
}

/// JSON-RPC client for one subprocess, one message per line.
///
/// Calls may be issued concurrently; responses are matched to callers by id
/// regardless of arrival order. Writes go through their own lock so a peer
/// that stops reading never blocks `close`.
pub struct StdioTransport {
    options: TransportOptions,
    connection: Mutex<Option<Connection>>,
    stdin: Mutex<Option<ChildStdin>>,
}

impl StdioTransport {
    pub fn new(options: TransportOptions) -> Self {
        Self {
            options,
            connection: Mutex::new(None),
            stdin: Mutex::new(None),
        }
    }

    /// Spawn the subprocess. A no-op when already open.
    pub async fn open(&self) -> Result<()> {
        let mut guard = self.connection.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        let mut child = Command::new(&self.options.executable)
            .args(&self.options.args)
            .envs(&self.options.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TransportError::Spawn {
                executable: self.options.executable.clone(),
                source,
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.start_kill();
            return Err(TransportError::NotOpen);
        };
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain_stderr(stderr, self.options.executable.clone()));
        }

        let pending = PendingRequests::default();
        let reader = tokio::spawn(read_responses(stdout, pending.clone()));

        tracing::debug!(
            executable = %self.options.executable,
            args = ?self.options.args,
            pid = ?child.id(),
            "MCP process started"
        );

        *self.stdin.lock().await = Some(stdin);
        *guard = Some(Connection {
            child,
            pending,
            reader,
        });
        Ok(())
    }

    pub async fn is_open(&self) -> bool {
        self.connection.lock().await.is_some()
    }

    /// Send a request and wait for the response bearing the same id.
    ///
    /// One deadline covers both the write and the wait for the answer.
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = uuid::Uuid::new_v4().to_string();
        let request = JsonRpcRequest::new(id.clone(), method, params);
        let deadline = Instant::now() + self.options.timeout;

        let pending = self.pending().await?;
        let receiver = pending.register(&id)?;

        if let Err(e) = self.write_before(deadline, method, &request).await {
            pending.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout_at(deadline, receiver).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(error))) => Err(TransportError::Rpc {
                code: error.code,
                message: error.message,
            }),
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => {
                pending.remove(&id);
                Err(self.timeout_error(method))
            }
        }
    }

    /// Fire-and-forget message with no id.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        self.pending().await?;
        let notification = JsonRpcNotification::new(method, params);
        let deadline = Instant::now() + self.options.timeout;
        self.write_before(deadline, method, &notification).await
    }

    /// Kill the subprocess and fail anything still waiting. Idempotent.
    pub async fn close(&self) {
        let Some(mut connection) = self.connection.lock().await.take() else {
            return;
        };
        connection.pending.close_all();
        connection.reader.abort();
        if let Err(e) = connection.child.kill().await {
            tracing::debug!(error = %e, "MCP process already exited");
        }
        // A writer stuck on a full pipe fails with EPIPE once the child is gone.
        self.stdin.lock().await.take();
    }

    async fn pending(&self) -> Result<PendingRequests> {
        self.connection
            .lock()
            .await
            .as_ref()
            .map(|c| c.pending.clone())
            .ok_or(TransportError::NotOpen)
    }

    /// Write one line, giving up at `deadline`. A write cut off midway leaves
    /// a torn line on the pipe, so stdin is dropped and later writes fail.
    async fn write_before<T: Serialize>(
        &self,
        deadline: Instant,
        method: &str,
        message: &T,
    ) -> Result<()> {
        let mut guard = tokio::time::timeout_at(deadline, self.stdin.lock())
            .await
            .map_err(|_| self.timeout_error(method))?;
        let stdin = guard.as_mut().ok_or(TransportError::Closed)?;

        let written = tokio::time::timeout_at(deadline, write_message(stdin, message)).await;
        match written {
            Ok(written) => written,
            Err(_) => {
                tracing::warn!(method, "MCP write timed out, discarding stdin");
                guard.take();
                Err(self.timeout_error(method))
            }
        }
    }

    fn timeout_error(&self, method: &str) -> TransportError {
        TransportError::Timeout {
            method: method.to_string(),
            timeout_ms: self.options.timeout.as_millis() as u64,
        }
    }

    /// MCP handshake: `initialize` followed by `notifications/initialized`.
    pub async fn initialize(&self, params: &InitializeParams) -> Result<InitializeResult> {
        let result = self
            .call("initialize", Some(serde_json::to_value(params)?))
            .await?;
        self.notify("notifications/initialized", Some(json!({})))
            .await?;
        decode(result)
    }

    pub async fn list_tools(&self) -> Result<ListToolsResult> {
        let result = self.call("tools/list", Some(json!({}))).await?;
        decode(result)
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        let result = self
            .call(
                "tools/call",
                Some(json!({ "name": name, "arguments": arguments })),
            )
            .await?;
        decode(result)
    }

    #[cfg(test)]
    async fn pending_count(&self) -> usize {
        self.connection
            .lock()
            .await
            .as_ref()
            .map_or(0, |c| c.pending.len())
    }
}

impl std::fmt::Debug for StdioTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioTransport")
            .field("executable", &self.options.executable)
            .field("args", &self.options.args)
            .finish()
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    Ok(serde_json::from_value(value)?)
}

async fn write_message<T: Serialize>(stdin: &mut ChildStdin, message: &T) -> Result<()> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    stdin.write_all(line.as_bytes()).await?;
    stdin.flush().await?;
    Ok(())
}

async fn read_responses(stdout: ChildStdout, pending: PendingRequests) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                pending.dispatch_line(&line);
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e, "MCP stdout read failed");
                break;
            }
        }
    }
    tracing::debug!(outstanding = pending.len(), "MCP process stdout closed");
    pending.close_all();
}

async fn drain_stderr(stderr: ChildStderr, executable: String) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(executable = %executable, "{}", line);
    }
}
