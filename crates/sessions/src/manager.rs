//! Owns every client's driver handle and polling timer.

use std::{
    path::PathBuf,
    sync::{Arc, Weak},
    time::Duration,
};

use {
    dashmap::DashMap,
    serde::Serialize,
    tokio::{sync::Mutex as AsyncMutex, task::JoinHandle},
    tracing::{debug, info, trace, warn},
    wabridge_config::ConfigStore,
    wabridge_driver::{Driver, DriverError, DriverFactory, DriverStatus, LaunchOptions},
};

use crate::{
    dispatch::{DEFAULT_WEBHOOK_TIMEOUT, Dispatcher, OutboundMessage, OutboundSender},
    error::{Result, SessionError},
    poller,
    semaphore::{ClientPermit, SemaphoreRegistry},
    timer::{PollingTimer, TickCallback},
};

/// Tuning for [`SessionManager`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Root of the per-client browser profile directories.
    pub cache_dir: PathBuf,
    pub launch: LaunchOptions,
    pub poll_interval: Duration,
    pub semaphore_timeout: Duration,
    /// Upper bound on each webhook POST.
    pub webhook_timeout: Duration,
}

impl SessionOptions {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            launch: LaunchOptions::default(),
            poll_interval: Duration::from_secs(2),
            semaphore_timeout: Duration::from_secs(10),
            webhook_timeout: DEFAULT_WEBHOOK_TIMEOUT,
        }
    }

    pub fn with_launch(mut self, launch: LaunchOptions) -> Self {
        self.launch = launch;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_semaphore_timeout(mut self, timeout: Duration) -> Self {
        self.semaphore_timeout = timeout;
        self
    }

    pub fn with_webhook_timeout(mut self, timeout: Duration) -> Self {
        self.webhook_timeout = timeout;
        self
    }
}

/// Liveness summary of one client, as reported by `/info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClientInfo {
    pub is_alive: bool,
    pub is_logged_in: bool,
    pub is_timer: bool,
}

/// Client ids name profile directories, so they are restricted to a
/// filesystem-safe alphabet.
pub fn is_valid_client_id(client_id: &str) -> bool {
    !client_id.is_empty()
        && client_id.len() <= 64
        && client_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

pub struct SessionManager {
    factory: Arc<dyn DriverFactory>,
    store: Arc<dyn ConfigStore>,
    dispatcher: Dispatcher,
    semaphores: SemaphoreRegistry,
    drivers: DashMap<String, Arc<dyn Driver>>,
    timers: DashMap<String, Arc<PollingTimer>>,
    lifecycle: DashMap<String, Arc<AsyncMutex<()>>>,
    options: SessionOptions,
    this: Weak<SessionManager>,
}

impl SessionManager {
    pub fn new(
        factory: Arc<dyn DriverFactory>,
        store: Arc<dyn ConfigStore>,
        options: SessionOptions,
    ) -> Arc<Self> {
        let dispatcher = Dispatcher::new(Arc::clone(&store))
            .with_webhook_timeout(options.webhook_timeout);
        Self::with_dispatcher(factory, store, dispatcher, options)
    }

    pub fn with_dispatcher(
        factory: Arc<dyn DriverFactory>,
        store: Arc<dyn ConfigStore>,
        dispatcher: Dispatcher,
        options: SessionOptions,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            factory,
            store,
            dispatcher,
            semaphores: SemaphoreRegistry::new(),
            drivers: DashMap::new(),
            timers: DashMap::new(),
            lifecycle: DashMap::new(),
            options,
            this: this.clone(),
        })
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn semaphores(&self) -> &SemaphoreRegistry {
        &self.semaphores
    }

    /// Profile directory of a client.
    pub fn cache_path(&self, client_id: &str) -> PathBuf {
        self.options.cache_dir.join(client_id)
    }

    // ── Locking ─────────────────────────────────────────────────────────

    /// Wait for the client's permit, up to the configured timeout.
    pub async fn acquire(&self, client_id: &str) -> Result<ClientPermit> {
        let timeout = self.options.semaphore_timeout;
        self.semaphores
            .acquire(client_id, timeout)
            .await
            .ok_or_else(|| SessionError::SemaphoreTimeout {
                client_id: client_id.to_string(),
                timeout_ms: timeout.as_millis(),
            })
    }

    /// Take the client's permit only if it is free right now.
    pub async fn try_acquire(&self, client_id: &str) -> Option<ClientPermit> {
        self.semaphores.acquire(client_id, Duration::ZERO).await
    }

    // ── Drivers ─────────────────────────────────────────────────────────

    /// The client's current driver handle.
    pub fn driver(&self, client_id: &str) -> Option<Arc<dyn Driver>> {
        self.drivers.get(client_id).map(|d| Arc::clone(d.value()))
    }

    pub fn session_count(&self) -> usize {
        self.drivers.len()
    }

    fn lifecycle_lock(&self, client_id: &str) -> Arc<AsyncMutex<()>> {
        Arc::clone(
            self.lifecycle
                .entry(client_id.to_string())
                .or_default()
                .value(),
        )
    }

    fn validate(client_id: &str) -> Result<()> {
        if is_valid_client_id(client_id) {
            Ok(())
        } else {
            Err(SessionError::InvalidClient(client_id.to_string()))
        }
    }

    /// Return the client's driver, launching one on first use.
    pub async fn get_or_create(&self, client_id: &str) -> Result<Arc<dyn Driver>> {
        Self::validate(client_id)?;
        if let Some(driver) = self.driver(client_id) {
            return Ok(driver);
        }
        let lock = self.lifecycle_lock(client_id);
        let _guard = lock.lock().await;
        if let Some(driver) = self.driver(client_id) {
            return Ok(driver);
        }
        Ok(self.launch(client_id).await?)
    }

    async fn launch(&self, client_id: &str) -> std::result::Result<Arc<dyn Driver>, DriverError> {
        let cache_path = self.cache_path(client_id);
        tokio::fs::create_dir_all(&cache_path).await?;
        let driver = self
            .factory
            .create(client_id, &cache_path, &self.options.launch)
            .await?;
        self.drivers
            .insert(client_id.to_string(), Arc::clone(&driver));
        info!(client_id, cache = %cache_path.display(), "driver launched");
        Ok(driver)
    }

    /// Login state of the client's driver; `Unknown` when there is none.
    pub async fn status(&self, client_id: &str) -> DriverStatus {
        match self.driver(client_id) {
            Some(driver) => driver.status().await,
            None => DriverStatus::Unknown,
        }
    }

    /// Make sure the client has a live driver and return its status.
    ///
    /// | status        | action                                    |
    /// |---------------|-------------------------------------------|
    /// | `Unknown`     | close and discard the handle, launch anew |
    /// | `NotLoggedIn` | none                                      |
    /// | `LoggedIn`    | none                                      |
    pub async fn ensure_healthy(&self, client_id: &str) -> Result<DriverStatus> {
        Self::validate(client_id)?;
        let lock = self.lifecycle_lock(client_id);
        let _guard = lock.lock().await;

        let current = self.driver(client_id);
        let status = match &current {
            Some(driver) => driver.status().await,
            None => DriverStatus::Unknown,
        };
        match status {
            DriverStatus::NotLoggedIn | DriverStatus::LoggedIn => return Ok(status),
            DriverStatus::Unknown => {},
        }

        if let Some(stale) = current {
            warn!(client_id, "driver unresponsive, recreating");
            self.drivers.remove(client_id);
            stale.close().await;
        }
        let fresh = self
            .launch(client_id)
            .await
            .map_err(|source| SessionError::Recreate {
                client_id: client_id.to_string(),
                source,
            })?;
        let status = fresh.status().await;
        debug!(client_id, ?status, "driver ready");
        Ok(status)
    }

    pub async fn client_info(&self, client_id: &str) -> Option<ClientInfo> {
        let driver = self.driver(client_id)?;
        let status = driver.status().await;
        Some(ClientInfo {
            is_alive: status.is_alive(),
            is_logged_in: status.is_logged_in(),
            is_timer: self.is_timer_running(client_id),
        })
    }

    // ── Polling ─────────────────────────────────────────────────────────

    fn poll_callback(&self, client_id: &str) -> TickCallback {
        let manager = self.this.clone();
        let client_id = client_id.to_string();
        Arc::new(move || {
            let manager = manager.clone();
            let client_id = client_id.clone();
            Box::pin(async move {
                if let Some(manager) = manager.upgrade() {
                    let outcome = poller::poll_once(&manager, &client_id).await;
                    trace!(client_id = %client_id, ?outcome, "poll finished");
                }
            })
        })
    }

    /// Arm the client's polling timer, creating it on first use.
    pub fn ensure_timer(&self, client_id: &str) {
        let timer = Arc::clone(
            self.timers
                .entry(client_id.to_string())
                .or_insert_with(|| {
                    Arc::new(PollingTimer::new(
                        self.options.poll_interval,
                        self.poll_callback(client_id),
                    ))
                })
                .value(),
        );
        if !timer.is_running() {
            timer.start();
            debug!(client_id, "polling timer armed");
        }
    }

    pub fn stop_timer(&self, client_id: &str) {
        if let Some(timer) = self.timers.get(client_id).map(|t| Arc::clone(t.value())) {
            timer.stop();
            debug!(client_id, "polling timer stopped");
        }
    }

    pub fn is_timer_running(&self, client_id: &str) -> bool {
        self.timers
            .get(client_id)
            .is_some_and(|timer| timer.is_running())
    }

    // ── Outbound ────────────────────────────────────────────────────────

    /// Send `message` in the background once the client's permit is free.
    pub fn queue_outbound(&self, client_id: &str, message: OutboundMessage) -> JoinHandle<bool> {
        let manager = self.this.clone();
        let client_id = client_id.to_string();
        self.dispatcher.spawn(async move {
            let Some(manager) = manager.upgrade() else {
                return false;
            };
            let _permit = match manager.acquire(&client_id).await {
                Ok(permit) => permit,
                Err(e) => {
                    warn!(client_id = %client_id, error = %e, "outbound message dropped");
                    return false;
                },
            };
            let Some(driver) = manager.driver(&client_id) else {
                warn!(client_id = %client_id, "outbound message dropped, no driver");
                return false;
            };
            OutboundSender::new(driver).send(&message).await
        })
    }

    // ── Teardown ────────────────────────────────────────────────────────

    /// Stop the client's timer, close its driver, discard its lock and
    /// optionally remove its profile directory. Returns whether the client
    /// had a session.
    ///
    /// Waits for the client's permit first, so a request in flight keeps its
    /// driver until it finishes.
    pub async fn delete(&self, client_id: &str, purge_cache: bool) -> Result<bool> {
        Self::validate(client_id)?;
        let permit = self.acquire(client_id).await?;

        let timer = self.timers.remove(client_id).map(|(_, timer)| timer);
        if let Some(timer) = &timer {
            timer.stop();
        }
        let driver = self.drivers.remove(client_id).map(|(_, driver)| driver);
        if let Some(driver) = &driver {
            driver.close().await;
        }
        self.semaphores.remove(client_id);
        drop(permit);
        self.lifecycle.remove(client_id);

        if purge_cache {
            match tokio::fs::remove_dir_all(self.cache_path(client_id)).await {
                Ok(()) => {},
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
                Err(e) => return Err(e.into()),
            }
        }

        let existed = timer.is_some() || driver.is_some();
        if existed {
            info!(client_id, purge_cache, "client session deleted");
        }
        Ok(existed)
    }

    /// Stop every timer, close every driver and drain background tasks.
    pub async fn shutdown(&self) {
        for entry in self.timers.iter() {
            entry.value().stop();
        }
        let drivers: Vec<(String, Arc<dyn Driver>)> = self
            .drivers
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();
        self.drivers.clear();
        for (client_id, driver) in drivers {
            driver.close().await;
            debug!(client_id = %client_id, "driver closed");
        }
        self.dispatcher.close_and_wait().await;
        info!("sessions shut down");
    }
}
