//! Background delivery: inbound messages to client webhooks, outbound
//! messages to the driver.

use std::{future::Future, path::PathBuf, sync::Arc, time::Duration};

use {
    serde::Serialize,
    tokio::task::JoinHandle,
    tokio_util::task::TaskTracker,
    tracing::{debug, info, warn},
    wabridge_config::ConfigStore,
    wabridge_driver::{Driver, Message, MessageGroup, message::normalize_recipient},
};

/// Upper bound on one webhook POST, connect to response.
pub const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Form body POSTed to a client's webhook for each inbound chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookForm {
    pub sender: String,
    pub content: String,
    /// `HH:MM:SS`, UTC.
    pub time: String,
    /// `DD/MM/YYYY`, UTC.
    pub date: String,
}

impl From<&Message> for WebhookForm {
    fn from(message: &Message) -> Self {
        Self {
            sender: message.sender.clone(),
            content: message.content.clone(),
            time: message.timestamp.format("%H:%M:%S").to_string(),
            date: message.timestamp.format("%d/%m/%Y").to_string(),
        }
    }
}

/// Posts inbound chat messages to the client's configured webhook.
#[derive(Clone)]
pub struct WebhookForwarder {
    http: reqwest::Client,
    store: Arc<dyn ConfigStore>,
    timeout: Duration,
}

impl WebhookForwarder {
    pub fn new(http: reqwest::Client, store: Arc<dyn ConfigStore>) -> Self {
        Self {
            http,
            store,
            timeout: DEFAULT_WEBHOOK_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Deliver every chat message in `groups`. Returns the number of
    /// successful deliveries. Failed deliveries are logged, not retried.
    pub async fn forward(&self, client_id: &str, groups: &[MessageGroup]) -> usize {
        let config = match self.store.get(client_id).await {
            Ok(Some(config)) => config,
            Ok(None) => {
                debug!(client_id, "no config for client, dropping inbound messages");
                return 0;
            },
            Err(e) => {
                warn!(client_id, error = %e, "failed to load client config");
                return 0;
            },
        };
        let Some(url) = config.webhook_target() else {
            debug!(client_id, "webhook disabled, dropping inbound messages");
            return 0;
        };

        let mut delivered = 0;
        for message in groups
            .iter()
            .flat_map(|group| &group.messages)
            .filter(|message| message.is_chat())
        {
            let form = WebhookForm::from(message);
            match self
                .http
                .post(url)
                .timeout(self.timeout)
                .form(&form)
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => delivered += 1,
                Ok(resp) => {
                    warn!(client_id, url, status = %resp.status(), "webhook rejected message");
                },
                Err(e) => {
                    warn!(client_id, url, error = %e, "webhook delivery failed");
                },
            }
        }
        delivered
    }
}

/// A message queued for sending through a client's driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub recipient: String,
    pub content: String,
    /// File to send, with `content` as its caption.
    pub media: Option<PathBuf>,
}

impl OutboundMessage {
    pub fn text(recipient: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            content: content.into(),
            media: None,
        }
    }

    pub fn media(
        recipient: impl Into<String>,
        caption: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            content: caption.into(),
            media: Some(path.into()),
        }
    }
}

/// Sends one [`OutboundMessage`] through a driver.
pub struct OutboundSender {
    driver: Arc<dyn Driver>,
}

impl OutboundSender {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self { driver }
    }

    /// Returns whether the driver accepted the message.
    pub async fn send(&self, message: &OutboundMessage) -> bool {
        let to = normalize_recipient(&message.recipient);
        let result = match &message.media {
            Some(path) => {
                let caption = (!message.content.is_empty()).then_some(message.content.as_str());
                self.driver.send_media(path, &to, caption).await
            },
            None => self.driver.send_text(&to, &message.content).await,
        };
        match result {
            Ok(()) => {
                debug!(to = %to, media = message.media.is_some(), "message sent");
                true
            },
            Err(e) => {
                warn!(to = %to, error = %e, "failed to send message");
                false
            },
        }
    }
}

/// Owner of every background delivery task.
pub struct Dispatcher {
    tracker: TaskTracker,
    forwarder: WebhookForwarder,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_WEBHOOK_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self::with_http_client(store, http)
    }

    pub fn with_http_client(store: Arc<dyn ConfigStore>, http: reqwest::Client) -> Self {
        Self {
            tracker: TaskTracker::new(),
            forwarder: WebhookForwarder::new(http, store),
        }
    }

    /// Bound every webhook POST by `timeout`.
    pub fn with_webhook_timeout(mut self, timeout: Duration) -> Self {
        self.forwarder = self.forwarder.with_timeout(timeout);
        self
    }

    /// Run `task` in the background, tracked for [`Dispatcher::close_and_wait`].
    pub fn spawn<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tracker.spawn(task)
    }

    /// Forward `groups` to the client's webhook in the background.
    pub fn forward_inbound(&self, client_id: &str, groups: Vec<MessageGroup>) -> JoinHandle<usize> {
        let forwarder = self.forwarder.clone();
        let client_id = client_id.to_string();
        self.spawn(async move {
            let delivered = forwarder.forward(&client_id, &groups).await;
            info!(client_id = %client_id, chats = groups.len(), delivered, "inbound messages forwarded");
            delivered
        })
    }

    /// Number of tasks still running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Stop accepting tasks and wait for the running ones.
    pub async fn close_and_wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {
        super::*,
        axum::{Form, Router, extract::State, http::StatusCode, routing::post},
        chrono::{TimeZone, Utc},
        std::collections::HashMap,
        tokio::sync::Mutex,
        wabridge_config::{ApiConfig, MemoryConfigStore},
        wabridge_driver::{
            DriverStatus,
            fake::{FakeDriver, SentMessage},
        },
    };

    type Captured = Arc<Mutex<Vec<HashMap<String, String>>>>;

    async fn capture_server() -> (String, Captured) {
        let captured: Captured = Arc::default();
        let app = Router::new()
            .route(
                "/hook",
                post(
                    |State(captured): State<Captured>, Form(form): Form<HashMap<String, String>>| async move {
                        captured.lock().await.push(form);
                        StatusCode::OK
                    },
                ),
            )
            .with_state(Arc::clone(&captured));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/hook"), captured)
    }

    fn message(kind: &str, content: &str) -> Message {
        Message {
            id: format!("id-{content}"),
            kind: kind.into(),
            sender: "5511999999999@c.us".into(),
            content: content.into(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap(),
        }
    }

    fn groups() -> Vec<MessageGroup> {
        vec![MessageGroup {
            chat_id: "5511999999999@c.us".into(),
            messages: vec![message("chat", "hello"), message("image", "")],
        }]
    }

    fn forwarder(config: ApiConfig) -> WebhookForwarder {
        WebhookForwarder::new(
            reqwest::Client::new(),
            Arc::new(MemoryConfigStore::with_records([config])),
        )
    }

    #[test]
    fn form_formats_timestamp() {
        let form = WebhookForm::from(&message("chat", "hi"));
        assert_eq!(form.time, "14:07:09");
        assert_eq!(form.date, "05/03/2024");
    }

    #[tokio::test]
    async fn disabled_webhook_posts_nothing() {
        let (url, captured) = capture_server().await;
        let mut config = ApiConfig::new("admin", "tok").with_webhook(url);
        config.webhook_enabled = false;

        assert_eq!(forwarder(config).forward("admin", &groups()).await, 0);
        assert!(captured.lock().await.is_empty());
    }

    #[tokio::test]
    async fn enabled_webhook_receives_each_chat_message_once() {
        let (url, captured) = capture_server().await;
        let config = ApiConfig::new("admin", "tok").with_webhook(url);

        assert_eq!(forwarder(config).forward("admin", &groups()).await, 1);

        let captured = captured.lock().await;
        assert_eq!(captured.len(), 1);
        let form = &captured[0];
        assert_eq!(form["sender"], "5511999999999@c.us");
        assert_eq!(form["content"], "hello");
        assert_eq!(form["time"], "14:07:09");
        assert_eq!(form["date"], "05/03/2024");
    }

    #[tokio::test]
    async fn unknown_client_forwards_nothing() {
        let (url, captured) = capture_server().await;
        let config = ApiConfig::new("admin", "tok").with_webhook(url);
        assert_eq!(forwarder(config).forward("other", &groups()).await, 0);
        assert!(captured.lock().await.is_empty());
    }

    #[tokio::test]
    async fn dispatcher_tracks_inbound_tasks() {
        let (url, captured) = capture_server().await;
        let store = Arc::new(MemoryConfigStore::with_records([
            ApiConfig::new("admin", "tok").with_webhook(url),
        ]));
        let dispatcher = Dispatcher::new(store);

        let handle = dispatcher.forward_inbound("admin", groups());
        dispatcher.close_and_wait().await;
        assert_eq!(dispatcher.in_flight(), 0);
        assert_eq!(handle.await.unwrap(), 1);
        assert_eq!(captured.lock().await.len(), 1);
    }

    /// Accepts connections and never answers.
    async fn silent_server() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        format!("http://{addr}/hook")
    }

    #[tokio::test]
    async fn stalled_webhook_times_out_and_shutdown_drains() {
        let url = silent_server().await;
        let store = Arc::new(MemoryConfigStore::with_records([
            ApiConfig::new("admin", "tok").with_webhook(url),
        ]));
        let dispatcher = Dispatcher::new(store).with_webhook_timeout(Duration::from_millis(200));

        let handle = dispatcher.forward_inbound("admin", groups());
        let drained =
            tokio::time::timeout(Duration::from_secs(5), dispatcher.close_and_wait()).await;
        assert!(drained.is_ok());
        assert_eq!(handle.await.unwrap(), 0);
    }

    #[tokio::test]
    async fn outbound_text_normalizes_recipient() {
        let driver = Arc::new(FakeDriver::new(DriverStatus::LoggedIn));
        let sender = OutboundSender::new(driver.clone());

        assert!(sender.send(&OutboundMessage::text("5511999999999", "hi")).await);
        assert_eq!(driver.sent(), vec![SentMessage::Text {
            to: "5511999999999@c.us".into(),
            content: "hi".into(),
        }]);
    }

    #[tokio::test]
    async fn outbound_media_carries_caption() {
        let driver = Arc::new(FakeDriver::new(DriverStatus::LoggedIn));
        let sender = OutboundSender::new(driver.clone());

        let message = OutboundMessage::media("123@c.us", "look", "/tmp/a.png");
        assert!(sender.send(&message).await);
        assert_eq!(driver.sent(), vec![SentMessage::Media {
            to: "123@c.us".into(),
            path: PathBuf::from("/tmp/a.png"),
            caption: Some("look".into()),
        }]);
    }

    #[tokio::test]
    async fn outbound_failure_reports_false() {
        let driver = Arc::new(FakeDriver::new(DriverStatus::LoggedIn));
        driver.fail_send(true);
        let sender = OutboundSender::new(driver.clone());
        assert!(!sender.send(&OutboundMessage::text("1", "x")).await);
        assert!(driver.sent().is_empty());
    }
}
