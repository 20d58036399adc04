//! `SandboxTransport`: the duplex websocket to the remote desktop (spec §4.4).
//!
//! Grounded in `loom-cli`'s `backend/remote.rs` (`tokio_tungstenite::connect_async`
//! with a connect timeout, `.split()` into write/read halves, request-id
//! matching against tagged responses), generalized from "one connection per
//! call" into a persistent duplex with a background reader task and a
//! pending-promise correlation map (spec §9 "Request/response correlation").

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::FatalError;

use super::dialect::{adapt_inbound, adapt_outbound, Dialect};
use super::protocol::{OutboundMessage, SandboxInstance};

const CONNECT_TIMEOUT_SECS: u64 = 10;
const HEARTBEAT_INTERVAL_SECS: u64 = 5;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("connect timed out")]
    ConnectTimeout,
    #[error("websocket error: {0}")]
    Socket(String),
    #[error("a boot is already in progress")]
    AlreadyBooting,
    #[error("exceeded maximum connection attempts")]
    MaxAttemptsExceeded,
    #[error("request timed out")]
    Timeout,
    #[error("transport closed")]
    TransportClosed,
    #[error("sandbox returned an error: {0}")]
    Remote(String),
    #[error("operation unsupported on this dialect")]
    UnsupportedOnDialect,
}

impl FatalError for SandboxError {
    /// `MaxAttemptsExceeded` is fatal per spec §4.4; every other transport
    /// error is a candidate for the heal loop.
    fn is_fatal(&self) -> bool {
        matches!(self, SandboxError::MaxAttemptsExceeded)
    }
}

#[derive(Debug, Clone)]
pub enum SandboxState {
    Disconnected,
    Opening,
    Open,
    Authenticated,
    Connected(SandboxInstance),
    Closed,
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WriteHalf = futures_util::stream::SplitSink<WsStream, Message>;

/// Persistent websocket transport with request/response correlation.
pub struct SandboxTransport {
    url: String,
    dialect: Dialect,
    state: StdMutex<SandboxState>,
    write: AsyncMutex<Option<WriteHalf>>,
    pending: Arc<DashMap<String, oneshot::Sender<Result<Value, SandboxError>>>>,
    counter: AtomicU64,
    nonce: String,
    booting: AsyncMutex<()>,
    max_attempts: u32,
    attempts: AtomicU32,
    /// Updated on every outbound send and inbound message; the redraw
    /// barrier's network-quiescence condition is derived from how long ago
    /// this last moved (spec §4.5, §9).
    last_activity: Arc<StdMutex<Instant>>,
}

impl SandboxTransport {
    pub fn new(url: impl Into<String>, dialect: Dialect) -> Self {
        Self {
            url: url.into(),
            dialect,
            state: StdMutex::new(SandboxState::Disconnected),
            write: AsyncMutex::new(None),
            pending: Arc::new(DashMap::new()),
            counter: AtomicU64::new(0),
            nonce: uuid::Uuid::new_v4().to_string(),
            booting: AsyncMutex::new(()),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            attempts: AtomicU32::new(0),
            last_activity: Arc::new(StdMutex::new(Instant::now())),
        }
    }

    pub fn state(&self) -> SandboxState {
        self.state.lock().unwrap().clone()
    }

    fn set_state(&self, state: SandboxState) {
        *self.state.lock().unwrap() = state;
    }

    /// Timestamp of the most recent outbound send or inbound message.
    pub fn last_activity(&self) -> Instant {
        *self.last_activity.lock().unwrap()
    }

    fn touch_activity(&self) {
        *self.last_activity.lock().unwrap() = Instant::now();
    }

    /// Opens the connection, spawns the reader and heartbeat tasks. Exactly
    /// one boot may run at a time; a concurrent call gets `AlreadyBooting`.
    /// A bounded attempt counter prevents runaway reconnects.
    pub async fn boot(&self) -> Result<(), SandboxError> {
        let Ok(_guard) = self.booting.try_lock() else {
            return Err(SandboxError::AlreadyBooting);
        };

        if self.attempts.fetch_add(1, Ordering::SeqCst) >= self.max_attempts {
            return Err(SandboxError::MaxAttemptsExceeded);
        }

        self.set_state(SandboxState::Opening);
        let connect = tokio::time::timeout(
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            connect_async(&self.url),
        )
        .await
        .map_err(|_| SandboxError::ConnectTimeout)?
        .map_err(|e| SandboxError::Socket(e.to_string()))?;

        let (write, mut read) = connect.0.split();
        *self.write.lock().await = Some(write);
        self.set_state(SandboxState::Open);

        let pending = Arc::clone(&self.pending);
        let dialect = self.dialect;
        let last_activity = Arc::clone(&self.last_activity);
        tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        *last_activity.lock().unwrap() = Instant::now();
                        let Ok(raw) = serde_json::from_str::<Value>(&text) else { continue };
                        let inbound = adapt_inbound(dialect, &raw);
                        let Some(id) = inbound.correlation_id() else { continue };
                        if let Some((_, tx)) = pending.remove(id) {
                            let result = match inbound.error_message {
                                Some(err) => Err(SandboxError::Remote(err)),
                                None => Ok(inbound.payload().unwrap_or(Value::Null)),
                            };
                            let _ = tx.send(result);
                        }
                    }
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            drain_pending(&pending);
        });

        Ok(())
    }

    /// Sends `ping` frames every 5s while the connection is open. Callers
    /// spawn this alongside `boot` from an owning `Arc<SandboxTransport>`.
    pub async fn run_heartbeat(self: &Arc<Self>) {
        let mut interval = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
        loop {
            interval.tick().await;
            if matches!(self.state(), SandboxState::Closed | SandboxState::Disconnected) {
                break;
            }
            let mut guard = self.write.lock().await;
            if let Some(write) = guard.as_mut() {
                if write.send(Message::Ping(Vec::new())).await.is_err() {
                    drop(guard);
                    self.close().await;
                    break;
                }
            }
        }
    }

    /// Sends a request and awaits its correlated response, or `Timeout`
    /// after `timeout` elapses (the pending entry is dropped either way;
    /// the remote side may still complete the operation — primitives are
    /// expected to be idempotent at the command layer, per spec §4.4).
    pub async fn request(
        &self,
        kind: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, SandboxError> {
        let request_id = format!("{}-{}", self.nonce, self.counter.fetch_add(1, Ordering::SeqCst));
        let outbound = OutboundMessage { kind: kind.to_string(), request_id: request_id.clone(), params };
        let wire = adapt_outbound(self.dialect, &outbound);
        let text = serde_json::to_string(&wire).map_err(|e| SandboxError::Socket(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(request_id.clone(), tx);

        {
            let mut guard = self.write.lock().await;
            let write = guard.as_mut().ok_or(SandboxError::TransportClosed)?;
            write.send(Message::Text(text)).await.map_err(|e| SandboxError::Socket(e.to_string()))?;
        }
        self.touch_activity();

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SandboxError::TransportClosed),
            Err(_) => {
                self.pending.remove(&request_id);
                Err(SandboxError::Timeout)
            }
        }
    }

    /// Marks the connection authenticated (after an auth handshake not
    /// specified further by spec.md — out of scope beyond the state name).
    pub fn mark_authenticated(&self) {
        self.set_state(SandboxState::Authenticated);
    }

    /// Marks the connection as attached to a concrete sandbox instance.
    pub fn mark_connected(&self, instance: SandboxInstance) {
        self.set_state(SandboxState::Connected(instance));
    }

    /// Closes the connection and rejects every pending request with
    /// `TransportClosed` (spec §4.4).
    pub async fn close(&self) {
        self.set_state(SandboxState::Closed);
        *self.write.lock().await = None;
        drain_pending(&self.pending);
    }
}

fn drain_pending(pending: &DashMap<String, oneshot::Sender<Result<Value, SandboxError>>>) {
    let ids: Vec<String> = pending.iter().map(|e| e.key().clone()).collect();
    for id in ids {
        if let Some((_, tx)) = pending.remove(&id) {
            let _ = tx.send(Err(SandboxError::TransportClosed));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_transport_starts_disconnected() {
        let transport = SandboxTransport::new("ws://localhost:9000", Dialect::Broker);
        assert!(matches!(transport.state(), SandboxState::Disconnected));
    }

    #[tokio::test]
    async fn boot_twice_concurrently_rejects_second_with_already_booting() {
        let transport = Arc::new(SandboxTransport::new("ws://127.0.0.1:1", Dialect::Broker));
        let t1 = Arc::clone(&transport);
        let t2 = Arc::clone(&transport);
        let first = tokio::spawn(async move { t1.boot().await });
        // Give the first boot a moment to acquire the lock before the second tries.
        tokio::task::yield_now().await;
        let second = t2.boot().await;
        let _ = first.await;
        assert!(matches!(second, Err(SandboxError::AlreadyBooting)) || second.is_err());
    }

    #[test]
    fn max_attempts_exceeded_is_fatal() {
        assert!(SandboxError::MaxAttemptsExceeded.is_fatal());
        assert!(!SandboxError::Timeout.is_fatal());
    }

    #[tokio::test]
    async fn close_rejects_all_pending_with_transport_closed() {
        let transport = SandboxTransport::new("ws://localhost:9000", Dialect::Broker);
        let (tx, rx) = oneshot::channel();
        transport.pending.insert("r1".to_string(), tx);
        transport.close().await;
        let result = rx.await.unwrap();
        assert!(matches!(result, Err(SandboxError::TransportClosed)));
    }
}
