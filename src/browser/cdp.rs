//! DevTools protocol WebSocket client.
//!
//! Chrome exposes each tab as a JSON-RPC endpoint. Commands carry
//! auto-incrementing ids; a background read loop correlates responses back
//! to the waiting caller through oneshot channels.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, warn};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::BrowserError;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, BrowserError>>>>>;

pub struct CdpClient {
    writer: Arc<tokio::sync::Mutex<WsSink>>,
    next_id: AtomicU64,
    pending: Pending,
    read_task: tokio::task::JoinHandle<()>,
}

impl CdpClient {
    /// Connect to a page's `webSocketDebuggerUrl`.
    pub async fn connect(ws_url: &str) -> Result<Self, BrowserError> {
        debug!("Connecting to DevTools socket {ws_url}");
        let (stream, _) = tokio_tungstenite::connect_async(ws_url).await?;
        let (writer, reader) = stream.split();

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let read_task = {
            let pending = pending.clone();
            tokio::spawn(async move {
                Self::read_loop(reader, pending).await;
            })
        };

        Ok(Self {
            writer: Arc::new(tokio::sync::Mutex::new(writer)),
            next_id: AtomicU64::new(1),
            pending,
            read_task,
        })
    }

    /// Send a command and wait for the correlated response's `result`.
    pub async fn send_command(&self, method: &str, params: Value) -> Result<Value, BrowserError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let json = serde_json::to_string(&build_command(id, method, params))?;

        // Register before sending so a fast response cannot slip past.
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        {
            let mut writer = self.writer.lock().await;
            if let Err(e) = writer.send(Message::Text(json.into())).await {
                self.pending.lock().remove(&id);
                return Err(e.into());
            }
        }

        match tokio::time::timeout(COMMAND_TIMEOUT, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(BrowserError::ChannelClosed),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(BrowserError::Timeout(method.to_string()))
            }
        }
    }

    /// Evaluate a JavaScript expression in the page and return its value.
    ///
    /// `returnByValue` serializes the result across the wire, so expressions
    /// should produce JSON-representable values.
    pub async fn evaluate(&self, expression: &str) -> Result<Value, BrowserError> {
        let result = self
            .send_command("Runtime.evaluate", build_evaluate_params(expression))
            .await?;

        if let Some(details) = result.get("exceptionDetails") {
            return Err(BrowserError::JsException(exception_text(details)));
        }

        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn read_loop(mut reader: WsSource, pending: Pending) {
        while let Some(message) = reader.next().await {
            let text = match message {
                Ok(Message::Text(text)) => text.to_string(),
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    warn!("DevTools socket read error: {e}");
                    break;
                }
            };

            let json: Value = match serde_json::from_str(&text) {
                Ok(value) => value,
                Err(e) => {
                    warn!("Unparseable DevTools message: {e}");
                    continue;
                }
            };

            // Events carry a method instead of an id. Nothing subscribes to
            // them here, so only id-bearing responses are dispatched.
            let Some(id) = json.get("id").and_then(Value::as_u64) else {
                continue;
            };

            let sender = pending.lock().remove(&id);
            if let Some(tx) = sender {
                let _ = tx.send(command_outcome(&json));
            }
        }

        // Connection is gone. Fail anything still waiting.
        let waiting: Vec<_> = {
            let mut pending = pending.lock();
            pending.drain().collect()
        };
        for (_, tx) in waiting {
            let _ = tx.send(Err(BrowserError::ChannelClosed));
        }
    }
}

impl Drop for CdpClient {
    fn drop(&mut self) {
        self.read_task.abort();
    }
}

fn build_command(id: u64, method: &str, params: Value) -> Value {
    serde_json::json!({
        "id": id,
        "method": method,
        "params": params,
    })
}

fn build_evaluate_params(expression: &str) -> Value {
    serde_json::json!({
        "expression": expression,
        "returnByValue": true,
        "awaitPromise": true,
    })
}

fn command_outcome(json: &Value) -> Result<Value, BrowserError> {
    if let Some(error) = json.get("error") {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(-1);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Err(BrowserError::Protocol { code, message });
    }
    Ok(json.get("result").cloned().unwrap_or(Value::Null))
}

fn exception_text(details: &Value) -> String {
    details
        .get("exception")
        .and_then(|e| e.get("description"))
        .and_then(Value::as_str)
        .or_else(|| details.get("text").and_then(Value::as_str))
        .unwrap_or("unknown exception")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_command_shape() {
        let msg = build_command(
            42,
            "Runtime.evaluate",
            serde_json::json!({ "expression": "1 + 1" }),
        );
        assert_eq!(msg["id"], 42);
        assert_eq!(msg["method"], "Runtime.evaluate");
        assert_eq!(msg["params"]["expression"], "1 + 1");
    }

    #[test]
    fn test_build_evaluate_params_returns_by_value() {
        let params = build_evaluate_params("document.title");
        assert_eq!(params["expression"], "document.title");
        assert_eq!(params["returnByValue"], true);
        assert_eq!(params["awaitPromise"], true);
    }

    #[test]
    fn test_command_outcome_success() {
        let json = serde_json::json!({
            "id": 1,
            "result": { "result": { "type": "string", "value": "hello" } }
        });
        let result = command_outcome(&json).unwrap();
        assert_eq!(result["result"]["value"], "hello");
    }

    #[test]
    fn test_command_outcome_protocol_error() {
        let json = serde_json::json!({
            "id": 2,
            "error": { "code": -32601, "message": "Method not found" }
        });
        let err = command_outcome(&json).unwrap_err();
        match err {
            BrowserError::Protocol { code, message } => {
                assert_eq!(code, -32601);
                assert_eq!(message, "Method not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_command_outcome_missing_result_is_null() {
        let json = serde_json::json!({ "id": 3 });
        assert_eq!(command_outcome(&json).unwrap(), Value::Null);
    }

    #[test]
    fn test_exception_text_prefers_description() {
        let details = serde_json::json!({
            "text": "Uncaught",
            "exception": { "description": "ReferenceError: nope is not defined" }
        });
        assert_eq!(
            exception_text(&details),
            "ReferenceError: nope is not defined"
        );
    }

    #[test]
    fn test_exception_text_falls_back_to_text() {
        let details = serde_json::json!({ "text": "Uncaught SyntaxError" });
        assert_eq!(exception_text(&details), "Uncaught SyntaxError");
    }
}
