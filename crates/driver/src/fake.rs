//! In-memory [`Driver`] for tests of the session layer and the gateway.

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    config::LaunchOptions,
    driver::{Driver, DriverFactory, DriverStatus},
    error::{DriverError, Result},
    message::MessageGroup,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An outbound message recorded by a [`FakeDriver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentMessage {
    Text {
        to: String,
        content: String,
    },
    Media {
        to: String,
        path: PathBuf,
        caption: Option<String>,
    },
}

/// Scriptable driver. Unread groups queued with [`FakeDriver::push_unread`]
/// are returned (and drained) by the next `get_unread`.
#[derive(Default)]
pub struct FakeDriver {
    generation: u64,
    cache_path: PathBuf,
    status: Mutex<DriverStatus>,
    unread: Mutex<Vec<MessageGroup>>,
    unread_delay: Mutex<Duration>,
    fail_unread: AtomicBool,
    fail_send: AtomicBool,
    sent: Mutex<Vec<SentMessage>>,
    seen: Mutex<Vec<String>>,
    unread_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    closed: AtomicBool,
}

impl FakeDriver {
    pub fn new(status: DriverStatus) -> Self {
        Self {
            status: Mutex::new(status),
            ..Default::default()
        }
    }

    /// Creation order within its factory, starting at 1.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    pub fn set_status(&self, status: DriverStatus) {
        *lock(&self.status) = status;
    }

    pub fn push_unread(&self, group: MessageGroup) {
        lock(&self.unread).push(group);
    }

    /// Delay every `get_unread` call, to hold a driver call open in tests.
    pub fn set_unread_delay(&self, delay: Duration) {
        *lock(&self.unread_delay) = delay;
    }

    pub fn fail_unread(&self, fail: bool) {
        self.fail_unread.store(fail, Ordering::SeqCst);
    }

    pub fn fail_send(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        lock(&self.sent).clone()
    }

    pub fn seen(&self) -> Vec<String> {
        lock(&self.seen).clone()
    }

    pub fn unread_calls(&self) -> usize {
        self.unread_calls.load(Ordering::SeqCst)
    }

    /// Highest number of driver calls observed running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlight(self)
    }

    fn check_send(&self, command: &'static str) -> Result<()> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(DriverError::Rejected {
                command,
                message: "send failed".into(),
            });
        }
        Ok(())
    }
}

struct InFlight<'a>(&'a FakeDriver);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Driver for FakeDriver {
    async fn status(&self) -> DriverStatus {
        if self.is_closed() {
            return DriverStatus::Unknown;
        }
        *lock(&self.status)
    }

    async fn get_qr(&self, path: &Path) -> Result<()> {
        if self.status().await.is_logged_in() {
            return Err(DriverError::Rejected {
                command: "qr",
                message: "already logged in".into(),
            });
        }
        tokio::fs::write(path, b"QR").await?;
        Ok(())
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        tokio::fs::write(path, b"SCREEN").await?;
        Ok(())
    }

    async fn send_text(&self, recipient: &str, content: &str) -> Result<()> {
        let _guard = self.enter();
        self.check_send("send_text")?;
        lock(&self.sent).push(SentMessage::Text {
            to: recipient.to_string(),
            content: content.to_string(),
        });
        Ok(())
    }

    async fn send_media(&self, path: &Path, recipient: &str, caption: Option<&str>) -> Result<()> {
        let _guard = self.enter();
        self.check_send("send_media")?;
        lock(&self.sent).push(SentMessage::Media {
            to: recipient.to_string(),
            path: path.to_path_buf(),
            caption: caption.map(String::from),
        });
        Ok(())
    }

    async fn get_unread(&self) -> Result<Vec<MessageGroup>> {
        let _guard = self.enter();
        self.unread_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.unread_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_unread.load(Ordering::SeqCst) {
            return Err(DriverError::Disconnected);
        }
        Ok(std::mem::take(&mut *lock(&self.unread)))
    }

    async fn mark_seen(&self, group: &MessageGroup) -> Result<()> {
        lock(&self.seen).push(group.chat_id.clone());
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Factory handing out [`FakeDriver`]s and remembering every one it created.
#[derive(Default)]
pub struct FakeDriverFactory {
    initial_status: Mutex<DriverStatus>,
    fail: AtomicBool,
    next_generation: AtomicU64,
    created: Mutex<Vec<Arc<FakeDriver>>>,
}

impl FakeDriverFactory {
    pub fn new(initial_status: DriverStatus) -> Self {
        Self {
            initial_status: Mutex::new(initial_status),
            ..Default::default()
        }
    }

    /// Status of drivers created from now on.
    pub fn set_initial_status(&self, status: DriverStatus) {
        *lock(&self.initial_status) = status;
    }

    /// Make subsequent `create` calls fail.
    pub fn fail_create(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn created(&self) -> Vec<Arc<FakeDriver>> {
        lock(&self.created).clone()
    }

    pub fn created_count(&self) -> usize {
        lock(&self.created).len()
    }

    pub fn last(&self) -> Option<Arc<FakeDriver>> {
        lock(&self.created).last().cloned()
    }
}

#[async_trait]
impl DriverFactory for FakeDriverFactory {
    async fn create(
        &self,
        client_id: &str,
        cache_path: &Path,
        _options: &LaunchOptions,
    ) -> Result<Arc<dyn Driver>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DriverError::Connect {
                url: format!("fake://{client_id}"),
                reason: "browser failed to start".into(),
            });
        }
        let driver = Arc::new(FakeDriver {
            generation: self.next_generation.fetch_add(1, Ordering::SeqCst) + 1,
            cache_path: cache_path.to_path_buf(),
            status: Mutex::new(*lock(&self.initial_status)),
            ..Default::default()
        });
        lock(&self.created).push(Arc::clone(&driver));
        Ok(driver)
    }
}
