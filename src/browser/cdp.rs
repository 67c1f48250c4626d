//! Chrome DevTools Protocol client
//!
//! JSON-RPC style messaging over a plain `ws://` connection to a local
//! browser:
//! - Auto-incrementing command ids, responses correlated by id
//! - Flattened target sessions (`sessionId` on each message)
//! - Events forwarded to an unbounded channel in arrival order

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, String>>>>>;

/// A protocol event (a message without an `id`).
#[derive(Debug, Clone, PartialEq)]
pub struct CdpEvent {
    pub method: String,
    pub params: Value,
    /// Target session the event belongs to; `None` for browser-level events.
    pub session_id: Option<String>,
}

/// Connection to a browser's DevTools endpoint.
pub struct CdpConnection {
    sink: tokio::sync::Mutex<SplitSink<WsStream, Message>>,
    pending: Pending,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
}

impl CdpConnection {
    /// Connect to a `ws://` DevTools URL.
    ///
    /// Returns the connection plus the receiver for protocol events. The
    /// receiver yields `None` once the browser side goes away.
    pub async fn connect(url: &str) -> Result<(Self, mpsc::UnboundedReceiver<CdpEvent>)> {
        let (stream, response) = connect_async(url)
            .await
            .with_context(|| format!("DevTools connection to {url} failed"))?;
        debug!(status = ?response.status(), "DevTools connected");

        let (sink, stream) = stream.split();
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let reader = tokio::spawn(read_loop(stream, Arc::clone(&pending), events_tx));

        Ok((
            Self {
                sink: tokio::sync::Mutex::new(sink),
                pending,
                next_id: AtomicU64::new(0),
                reader,
            },
            events_rx,
        ))
    }

    /// Send a command and wait for its result.
    ///
    /// `session_id` routes the command to an attached target. Protocol
    /// errors (`{"error": ...}`) and timeouts are returned as errors.
    pub async fn call(
        &self,
        method: &str,
        params: Value,
        session_id: Option<&str>,
        timeout: Duration,
    ) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;

        let mut request = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        if let Some(session_id) = session_id {
            request["sessionId"] = json!(session_id);
        }

        let (tx, rx) = oneshot::channel();
        self.pending_map().insert(id, tx);

        let sent = self
            .sink
            .lock()
            .await
            .send(Message::Text(request.to_string()))
            .await;
        if let Err(e) = sent {
            self.pending_map().remove(&id);
            return Err(anyhow::Error::new(e).context(format!("Failed to send '{method}'")));
        }
        trace!(id, method, "Sent DevTools command");

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(error))) => Err(anyhow!("DevTools error for '{method}': {error}")),
            Ok(Err(_)) => Err(anyhow!("DevTools connection closed during '{method}'")),
            Err(_) => {
                self.pending_map().remove(&id);
                Err(anyhow!("Timeout ({timeout:?}) waiting for '{method}'"))
            }
        }
    }

    /// Close the WebSocket. Outstanding calls fail with "connection closed".
    pub async fn close(&self) -> Result<()> {
        self.sink
            .lock()
            .await
            .close()
            .await
            .context("Failed to close DevTools connection")
    }

    fn pending_map(&self) -> std::sync::MutexGuard<'_, HashMap<u64, oneshot::Sender<Result<Value, String>>>> {
        // A poisoned map only means another caller panicked mid-insert;
        // the map itself is still consistent.
        self.pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Drop for CdpConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(
    mut stream: futures::stream::SplitStream<WsStream>,
    pending: Pending,
    events: mpsc::UnboundedSender<CdpEvent>,
) {
    while let Some(message) = stream.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(frame)) => {
                debug!(?frame, "DevTools connection closed");
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                debug!(error = %e, "DevTools receive failed");
                break;
            }
        };

        let Ok(message) = serde_json::from_str::<Value>(&text) else {
            debug!(bytes = text.len(), "Ignoring non-JSON DevTools message");
            continue;
        };
        dispatch(message, &pending, &events);
    }

    // Dropping the senders wakes every waiting call with "closed".
    pending
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .clear();
}

fn dispatch(message: Value, pending: &Pending, events: &mpsc::UnboundedSender<CdpEvent>) {
    if let Some(id) = message.get("id").and_then(Value::as_u64) {
        let waiter = pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&id);
        if let Some(waiter) = waiter {
            let outcome = match message.get("error") {
                Some(error) => Err(error
                    .get("message")
                    .and_then(Value::as_str)
                    .map_or_else(|| error.to_string(), str::to_string)),
                None => Ok(message.get("result").cloned().unwrap_or(Value::Null)),
            };
            let _ = waiter.send(outcome);
        }
        return;
    }

    if let Some(method) = message.get("method").and_then(Value::as_str) {
        let event = CdpEvent {
            method: method.to_string(),
            params: message.get("params").cloned().unwrap_or(Value::Null),
            session_id: message
                .get("sessionId")
                .and_then(Value::as_str)
                .map(str::to_string),
        };
        // Receiver gone means the session was closed; nothing to do.
        let _ = events.send(event);
    }
}
