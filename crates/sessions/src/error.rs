use wabridge_driver::DriverError;

pub type Result<T, E = SessionError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid client id: {0:?}")]
    InvalidClient(String),

    #[error("client {client_id} is busy (waited {timeout_ms} ms for its driver)")]
    SemaphoreTimeout { client_id: String, timeout_ms: u128 },

    #[error("browser for client {client_id} has closed and could not be restarted: {source}")]
    Recreate {
        client_id: String,
        #[source]
        source: DriverError,
    },

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// The request may succeed if retried later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SemaphoreTimeout { .. })
    }
}
