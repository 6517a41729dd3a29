//! Sidecar-backed [`Driver`] implementation.

use std::{path::Path, sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    base64::{Engine as _, engine::general_purpose::STANDARD},
    tracing::{debug, info, warn},
};

use crate::{
    config::LaunchOptions,
    driver::{Driver, DriverFactory, DriverStatus},
    error::{DriverError, Result},
    message::MessageGroup,
    sidecar::{DEFAULT_SIDECAR_URL, SidecarConnection},
    types::{Command, ImageData},
};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_LAUNCH_TIMEOUT: Duration = Duration::from_secs(90);
const DEFAULT_CONNECT_RETRIES: u32 = 3;

/// One client's browser session, driven through its own sidecar connection.
pub struct SidecarDriver {
    client_id: String,
    conn: SidecarConnection,
    request_timeout: Duration,
}

impl SidecarDriver {
    async fn request(&self, command: Command) -> Result<Option<serde_json::Value>> {
        self.conn.request(command, self.request_timeout).await
    }

    async fn write_image(&self, command: Command, path: &Path) -> Result<()> {
        let name = command.name();
        let data = self.request(command).await?.ok_or(DriverError::Protocol {
            command: name,
            reason: "missing image data".into(),
        })?;
        let image: ImageData = serde_json::from_value(data)?;
        let encoded = image
            .png
            .split_once(',')
            .map_or(image.png.as_str(), |(_, b64)| b64);
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| DriverError::Protocol {
                command: name,
                reason: e.to_string(),
            })?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes).await?;
        debug!(client_id = %self.client_id, path = %path.display(), command = name, "wrote image");
        Ok(())
    }
}

#[async_trait]
impl Driver for SidecarDriver {
    async fn status(&self) -> DriverStatus {
        match self.request(Command::Status).await {
            Ok(Some(serde_json::Value::String(raw))) => DriverStatus::parse(&raw),
            Ok(other) => {
                warn!(client_id = %self.client_id, ?other, "unexpected status payload");
                DriverStatus::Unknown
            },
            Err(e) => {
                debug!(client_id = %self.client_id, error = %e, "status query failed");
                DriverStatus::Unknown
            },
        }
    }

    async fn get_qr(&self, path: &Path) -> Result<()> {
        self.write_image(Command::Qr, path).await
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        self.write_image(Command::Screenshot, path).await
    }

    async fn send_text(&self, recipient: &str, content: &str) -> Result<()> {
        self.request(Command::SendText {
            to: recipient.to_string(),
            text: content.to_string(),
        })
        .await
        .map(|_| ())
    }

    async fn send_media(&self, path: &Path, recipient: &str, caption: Option<&str>) -> Result<()> {
        self.request(Command::SendMedia {
            to: recipient.to_string(),
            path: path.display().to_string(),
            caption: caption.map(String::from),
        })
        .await
        .map(|_| ())
    }

    async fn get_unread(&self) -> Result<Vec<MessageGroup>> {
        match self.request(Command::GetUnread).await? {
            Some(data) => Ok(serde_json::from_value(data)?),
            None => Ok(Vec::new()),
        }
    }

    async fn mark_seen(&self, group: &MessageGroup) -> Result<()> {
        self.request(Command::MarkSeen {
            chat_id: group.chat_id.clone(),
        })
        .await
        .map(|_| ())
    }

    async fn close(&self) {
        if let Err(e) = self.request(Command::Quit).await {
            debug!(client_id = %self.client_id, error = %e, "quit failed");
        }
        self.conn.close().await;
        info!(client_id = %self.client_id, "driver closed");
    }
}

/// Creates a [`SidecarDriver`] per client by opening a sidecar connection and
/// launching a browser with the client's profile directory.
#[derive(Debug, Clone)]
pub struct SidecarDriverFactory {
    url: String,
    request_timeout: Duration,
    launch_timeout: Duration,
    connect_retries: u32,
}

impl SidecarDriverFactory {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            launch_timeout: DEFAULT_LAUNCH_TIMEOUT,
            connect_retries: DEFAULT_CONNECT_RETRIES,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_launch_timeout(mut self, timeout: Duration) -> Self {
        self.launch_timeout = timeout;
        self
    }

    pub fn with_connect_retries(mut self, retries: u32) -> Self {
        self.connect_retries = retries.max(1);
        self
    }
}

impl Default for SidecarDriverFactory {
    fn default() -> Self {
        Self::new(DEFAULT_SIDECAR_URL)
    }
}

#[async_trait]
impl DriverFactory for SidecarDriverFactory {
    async fn create(
        &self,
        client_id: &str,
        cache_path: &Path,
        options: &LaunchOptions,
    ) -> Result<Arc<dyn Driver>> {
        let conn = SidecarConnection::connect_with_retry(
            &self.url,
            self.connect_retries,
            Duration::from_secs(2),
        )
        .await?;

        conn.request(
            Command::Launch {
                client_id: client_id.to_string(),
                profile_dir: cache_path.display().to_string(),
                options: options.clone(),
                args: options.chrome_args(),
            },
            self.launch_timeout,
        )
        .await?;

        info!(client_id, profile = %cache_path.display(), "launched browser session");

        Ok(Arc::new(SidecarDriver {
            client_id: client_id.to_string(),
            conn,
            request_timeout: self.request_timeout,
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {
        axum::{
            Router,
            extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
            routing::get,
        },
        serde_json::{Value, json},
        tokio::net::TcpListener,
    };

    use super::*;

    /// Minimal sidecar: logged in, one unread chat, rejects sends to `bad@c.us`.
    async fn serve(mut socket: WebSocket) {
        while let Some(Ok(msg)) = socket.recv().await {
            let WsMessage::Text(text) = msg else {
                continue;
            };
            let frame: Value = serde_json::from_str(&text).unwrap();
            let id = frame["requestId"].clone();
            let reply = match frame["type"].as_str().unwrap() {
                "status" => json!({"type": "result", "requestId": id, "ok": true, "data": "LoggedIn"}),
                "get_unread" => json!({
                    "type": "result", "requestId": id, "ok": true,
                    "data": [{"chatId": "1@c.us", "messages": [
                        {"id": "m1", "type": "chat", "sender": "1@c.us", "content": "hey", "timestamp": 1700000000}
                    ]}]
                }),
                "qr" => json!({
                    "type": "result", "requestId": id, "ok": true,
                    "data": {"png": format!("data:image/png;base64,{}", STANDARD.encode(b"PNGDATA"))}
                }),
                "send_text" if frame["to"] == "bad@c.us" => {
                    json!({"type": "result", "requestId": id, "ok": false, "error": "no such chat"})
                },
                "quit" => {
                    let _ = socket.send(WsMessage::Close(None)).await;
                    return;
                },
                _ => json!({"type": "result", "requestId": id, "ok": true}),
            };
            socket
                .send(WsMessage::Text(reply.to_string().into()))
                .await
                .unwrap();
        }
    }

    async fn spawn_sidecar() -> String {
        let app = Router::new().route(
            "/",
            get(|ws: WebSocketUpgrade| async move { ws.on_upgrade(serve) }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("ws://{addr}/")
    }

    #[tokio::test]
    async fn drives_a_session_through_the_sidecar() {
        let url = spawn_sidecar().await;
        let dir = tempfile::tempdir().unwrap();
        let factory = SidecarDriverFactory::new(url)
            .with_request_timeout(Duration::from_secs(5))
            .with_launch_timeout(Duration::from_secs(5));

        let driver = factory
            .create("admin", &dir.path().join("admin"), &LaunchOptions::default())
            .await
            .unwrap();

        assert_eq!(driver.status().await, DriverStatus::LoggedIn);
        assert!(driver.is_logged_in().await);

        let unread = driver.get_unread().await.unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].messages[0].content, "hey");
        driver.mark_seen(&unread[0]).await.unwrap();

        driver.send_text("1@c.us", "hello").await.unwrap();
        let err = driver.send_text("bad@c.us", "hello").await.unwrap_err();
        assert!(matches!(err, DriverError::Rejected { command: "send_text", .. }));

        let qr = dir.path().join("static").join("qr.png");
        driver.get_qr(&qr).await.unwrap();
        assert_eq!(std::fs::read(&qr).unwrap(), b"PNGDATA");
    }

    #[tokio::test]
    async fn closed_driver_reports_unknown() {
        let url = spawn_sidecar().await;
        let dir = tempfile::tempdir().unwrap();
        let driver = SidecarDriverFactory::new(url)
            .with_request_timeout(Duration::from_secs(2))
            .create("admin", dir.path(), &LaunchOptions::default())
            .await
            .unwrap();

        driver.close().await;
        assert_eq!(driver.status().await, DriverStatus::Unknown);
        assert!(driver.send_text("1@c.us", "hi").await.is_err());
    }

    #[tokio::test]
    async fn connect_failure_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = SidecarDriverFactory::new(format!("ws://{addr}/"))
            .with_connect_retries(1)
            .create("admin", Path::new("/tmp"), &LaunchOptions::default())
            .await;
        let Err(err) = result else {
            panic!("expected connect error");
        };
        assert!(err.is_disconnect());
    }
}
