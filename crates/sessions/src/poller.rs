//! One tick of a client's unread-message poll.

use {
    tracing::{debug, warn},
    wabridge_driver::{Driver, DriverError, MessageGroup},
};

use crate::manager::SessionManager;

/// What a poll tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// No driver, or the driver is not logged in; the timer was stopped.
    Stopped,
    /// The client's driver was busy.
    Skipped,
    /// Nothing unread.
    Empty,
    /// This many chats were handed to the webhook forwarder.
    Dispatched(usize),
    /// Fetching unread messages failed.
    Failed,
}

/// Fetch the client's unread messages and forward them in the background.
///
/// Never waits for the client's lock: if an HTTP request holds it, the tick
/// is skipped. The lock is released as soon as the fetch completes, before
/// anything is forwarded.
pub async fn poll_once(manager: &SessionManager, client_id: &str) -> PollOutcome {
    let Some(mut permit) = manager.try_acquire(client_id).await else {
        debug!(client_id, "driver busy, skipping poll");
        return PollOutcome::Skipped;
    };

    // Read under the permit: recreation swaps the handle while holding it.
    let Some(driver) = manager.driver(client_id) else {
        permit.release();
        manager.stop_timer(client_id);
        return PollOutcome::Stopped;
    };

    if !driver.is_logged_in().await {
        permit.release();
        manager.stop_timer(client_id);
        debug!(client_id, "client not logged in, polling stopped");
        return PollOutcome::Stopped;
    }

    let fetched = fetch_unread(client_id, driver.as_ref()).await;
    permit.release();

    match fetched {
        Ok(groups) if groups.is_empty() => PollOutcome::Empty,
        Ok(groups) => {
            let chats = groups.len();
            manager.dispatcher().forward_inbound(client_id, groups);
            PollOutcome::Dispatched(chats)
        },
        Err(e) => {
            // Recovery of a dead driver happens on the next request's health check.
            warn!(
                client_id,
                error = %e,
                disconnected = e.is_disconnect(),
                "unread poll failed"
            );
            PollOutcome::Failed
        },
    }
}

async fn fetch_unread(
    client_id: &str,
    driver: &dyn Driver,
) -> Result<Vec<MessageGroup>, DriverError> {
    let groups = driver.get_unread().await?;
    for group in &groups {
        if let Err(e) = driver.mark_seen(group).await {
            warn!(client_id, chat_id = %group.chat_id, error = %e, "failed to mark chat seen");
        }
    }
    Ok(groups)
}
