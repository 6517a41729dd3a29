//! WebSocket communication with the browser-automation sidecar.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    futures::{SinkExt, StreamExt},
    tokio::sync::{Mutex, mpsc, oneshot},
    tokio_tungstenite::{connect_async, tungstenite::Message},
    tracing::{debug, error, info, warn},
};

use crate::{
    error::{DriverError, Result},
    types::{Command, Envelope, Reply, SidecarMessage},
};

/// Default sidecar WebSocket URL.
pub const DEFAULT_SIDECAR_URL: &str = "ws://127.0.0.1:9876";

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<Reply>>>>;

enum Outgoing {
    Frame(Envelope),
    Close,
}

/// Request/response channel to the sidecar for a single client session.
///
/// Replies are matched to requests by `requestId`. When the socket closes,
/// every pending request fails with [`DriverError::Disconnected`] and so does
/// every later one.
pub struct SidecarConnection {
    tx: mpsc::Sender<Outgoing>,
    pending: PendingMap,
    connected: Arc<AtomicBool>,
}

impl SidecarConnection {
    /// Connect to the sidecar and spawn reader/writer tasks.
    pub async fn connect(url: &str) -> Result<Self> {
        info!(url = %url, "connecting to sidecar");

        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| DriverError::Connect {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let (mut write, mut read) = ws_stream.split();

        let (tx, mut rx) = mpsc::channel::<Outgoing>(32);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(true));

        let pending_reader = Arc::clone(&pending);
        let connected_reader = Arc::clone(&connected);
        tokio::spawn(async move {
            while let Some(msg_result) = read.next().await {
                match msg_result {
                    Ok(Message::Text(text)) => match serde_json::from_str::<SidecarMessage>(&text) {
                        Ok(SidecarMessage::Reply(reply)) => {
                            let waiter = pending_reader.lock().await.remove(&reply.request_id);
                            match waiter {
                                Some(waiter) => {
                                    let _ = waiter.send(reply);
                                },
                                None => {
                                    debug!(request_id = %reply.request_id, "reply for unknown request");
                                },
                            }
                        },
                        Ok(SidecarMessage::Event { event, detail }) => {
                            debug!(event = %event, ?detail, "sidecar event");
                        },
                        Err(e) => {
                            warn!(error = %e, text = %text.as_str(), "failed to parse sidecar message");
                        },
                    },
                    Ok(Message::Close(_)) => {
                        info!("sidecar connection closed");
                        break;
                    },
                    Ok(_) => {},
                    Err(e) => {
                        error!(error = %e, "WebSocket read error");
                        break;
                    },
                }
            }

            connected_reader.store(false, Ordering::SeqCst);
            // Dropping the senders wakes every waiter with a disconnect.
            pending_reader.lock().await.clear();
        });

        let connected_writer = Arc::clone(&connected);
        tokio::spawn(async move {
            while let Some(out) = rx.recv().await {
                match out {
                    Outgoing::Frame(envelope) => match serde_json::to_string(&envelope) {
                        Ok(json) => {
                            if let Err(e) = write.send(Message::Text(json.into())).await {
                                error!(error = %e, "failed to send message to sidecar");
                                break;
                            }
                        },
                        Err(e) => {
                            error!(error = %e, "failed to serialize message");
                        },
                    },
                    Outgoing::Close => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    },
                }
            }

            connected_writer.store(false, Ordering::SeqCst);
        });

        Ok(Self {
            tx,
            pending,
            connected,
        })
    }

    /// Try to connect to the sidecar with retries.
    pub async fn connect_with_retry(url: &str, max_retries: u32, backoff: Duration) -> Result<Self> {
        let mut attempt = 0;
        loop {
            match Self::connect(url).await {
                Ok(conn) => return Ok(conn),
                Err(e) => {
                    attempt += 1;
                    if attempt >= max_retries {
                        return Err(e);
                    }
                    warn!(
                        attempt,
                        max_retries,
                        error = %e,
                        "failed to connect to sidecar, retrying..."
                    );
                    tokio::time::sleep(backoff).await;
                },
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Send a command and wait up to `timeout` for its reply payload.
    pub async fn request(
        &self,
        command: Command,
        timeout: Duration,
    ) -> Result<Option<serde_json::Value>> {
        if !self.is_connected() {
            return Err(DriverError::Disconnected);
        }

        let name = command.name();
        let request_id = uuid::Uuid::new_v4().to_string();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending
            .lock()
            .await
            .insert(request_id.clone(), reply_tx);
        if !self.is_connected() {
            self.pending.lock().await.remove(&request_id);
            return Err(DriverError::Disconnected);
        }

        let envelope = Envelope {
            request_id: request_id.clone(),
            command,
        };
        if self.tx.send(Outgoing::Frame(envelope)).await.is_err() {
            self.pending.lock().await.remove(&request_id);
            return Err(DriverError::Disconnected);
        }
        debug!(command = name, request_id = %request_id, "sent command to sidecar");

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(reply)) if reply.ok => Ok(reply.data),
            Ok(Ok(reply)) => Err(DriverError::Rejected {
                command: name,
                message: reply.error.unwrap_or_else(|| "unspecified error".into()),
            }),
            Ok(Err(_)) => Err(DriverError::Disconnected),
            Err(_) => {
                self.pending.lock().await.remove(&request_id);
                Err(DriverError::Timeout {
                    command: name,
                    timeout_ms: timeout.as_millis(),
                })
            },
        }
    }

    /// Close the socket. Pending requests fail once the sidecar acknowledges.
    pub async fn close(&self) {
        let _ = self.tx.send(Outgoing::Close).await;
    }
}
