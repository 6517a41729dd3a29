//! Client session lifecycle for the wabridge gateway.
//!
//! - [`semaphore::SemaphoreRegistry`]: one binary lock per client guarding its driver.
//! - [`manager::SessionManager`]: driver creation, health checks and recreation.
//! - [`timer::PollingTimer`]: cancellable, sequential ticks per client.
//! - [`poller`]: the timer callback that fetches unread messages.
//! - [`dispatch::Dispatcher`]: tracked background tasks for webhooks and outbound sends.

pub mod dispatch;
pub mod error;
pub mod manager;
pub mod poller;
pub mod semaphore;
pub mod timer;

pub use {
    dispatch::{Dispatcher, OutboundMessage, OutboundSender, WebhookForwarder},
    error::{Result, SessionError},
    manager::{ClientInfo, SessionManager, SessionOptions, is_valid_client_id},
    poller::PollOutcome,
    semaphore::{ClientPermit, SemaphoreRegistry},
    timer::{PollingTimer, TimerState},
};
