//! DevTools connection - the communication layer
//!
//! Design:
//! 1. One WebSocket per session-owned connection
//! 2. Command/reply matching via id, events fanned out to subscribers
//! 3. Fail fast - no retries, no queuing; the capability decides what a
//!    failure means

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::protocol::{CdpCommand, CdpEvent, CdpMessage, CdpResponse, CommandId, SessionId};
use crate::error::BrowserError;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

#[derive(Debug, Error)]
pub enum CdpError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("protocol error {code}: {message}")]
    Protocol { code: i64, message: String },

    #[error("connection closed")]
    Closed,
}

impl From<CdpError> for BrowserError {
    fn from(err: CdpError) -> Self {
        BrowserError::Capability(err.to_string())
    }
}

/// Event subscriber callback. Invoked on the reader task; keep it cheap and
/// spawn for anything that suspends.
pub type EventCallback = Arc<dyn Fn(CdpEvent) + Send + Sync>;

/// One WebSocket connection to a DevTools endpoint.
pub struct CdpConnection {
    next_id: AtomicU64,

    /// Commands awaiting a reply, keyed by command id.
    pending: DashMap<CommandId, oneshot::Sender<CdpResponse>>,

    /// Event subscribers keyed by method name.
    subscribers: DashMap<String, Vec<EventCallback>>,

    /// Write half; the lock is held per frame only.
    sink: RwLock<WsSink>,
}

impl CdpConnection {
    pub async fn connect(endpoint: &str) -> Result<Arc<Self>, CdpError> {
        let (stream, _) = connect_async(endpoint).await?;
        let (sink, mut source) = stream.split();

        let connection = Arc::new(Self {
            next_id: AtomicU64::new(1),
            pending: DashMap::new(),
            subscribers: DashMap::new(),
            sink: RwLock::new(sink),
        });

        let reader = Arc::clone(&connection);
        tokio::spawn(async move {
            while let Some(message) = source.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        if let Err(err) = reader.dispatch(&text) {
                            tracing::error!("undispatchable devtools message: {err}");
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        tracing::error!("devtools socket error: {err}");
                        break;
                    }
                }
            }
            // Dropping the senders wakes every waiter with `Closed`.
            reader.pending.clear();
        });

        Ok(connection)
    }

    /// Send a command and wait for its reply.
    pub async fn send(
        &self,
        method: impl Into<String>,
        params: Option<Value>,
        session_id: Option<SessionId>,
    ) -> Result<Value, CdpError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let command = CdpCommand {
            id,
            method: method.into(),
            params,
            session_id,
        };

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        let frame = serde_json::to_string(&command)?;
        {
            let mut sink = self.sink.write().await;
            if let Err(err) = sink.send(Message::Text(frame)).await {
                self.pending.remove(&id);
                return Err(CdpError::WebSocket(err));
            }
        }

        let response = rx.await.map_err(|_| CdpError::Closed)?;
        if let Some(error) = response.error {
            return Err(CdpError::Protocol {
                code: error.code,
                message: error.message,
            });
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    /// Register an event callback for a method name.
    pub fn subscribe(&self, method: impl Into<String>, callback: EventCallback) {
        self.subscribers
            .entry(method.into())
            .or_insert_with(Vec::new)
            .push(callback);
    }

    fn dispatch(&self, text: &str) -> Result<(), CdpError> {
        match serde_json::from_str::<CdpMessage>(text)? {
            CdpMessage::Response(response) => {
                if let Some((_, tx)) = self.pending.remove(&response.id) {
                    let _ = tx.send(response); // Receiver may have given up; fine.
                } else {
                    tracing::warn!(id = response.id, "reply for unknown command");
                }
            }
            CdpMessage::Event(event) => {
                if let Some(callbacks) = self.subscribers.get(&event.method) {
                    for callback in callbacks.value() {
                        callback(event.clone());
                    }
                }
            }
        }
        Ok(())
    }

    pub async fn close(&self) -> Result<(), CdpError> {
        let mut sink = self.sink.write().await;
        sink.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Needs a Chromium with an open DevTools port.
    #[tokio::test]
    #[ignore]
    async fn connect_and_query_version() {
        let connection = CdpConnection::connect("ws://localhost:9222/devtools/browser")
            .await
            .unwrap();

        let version = connection
            .send("Browser.getVersion", None, None)
            .await
            .unwrap();
        assert!(version["product"].as_str().is_some());
    }
}
