use crate::db::worker::{self, ConnectionHandle};
use crate::error::ConnectionError;
use async_trait::async_trait;

/// Builds ready connections. Implementations do not retry; a failed construction is reported
/// as-is and the caller decides whether to try again.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    type Connection: Clone + Send + Sync + 'static;

    async fn create(&self) -> Result<Self::Connection, ConnectionError>;

    /// Whether a previously built connection can still serve requests.
    fn is_alive(&self, _conn: &Self::Connection) -> bool {
        true
    }

    /// Releases a connection the session has discarded.
    fn retire(&self, _conn: Self::Connection) {}
}

/// Starts a [`worker::DbWorker`] on the configured database and waits until its storage is open.
#[derive(Debug, Clone)]
pub struct WorkerFactory {
    database_url: String,
}

impl WorkerFactory {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
        }
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }
}

#[async_trait]
impl ConnectionFactory for WorkerFactory {
    type Connection = ConnectionHandle;

    async fn create(&self) -> Result<ConnectionHandle, ConnectionError> {
        worker::spawn(&self.database_url)
            .await
            .map_err(|e| ConnectionError::new(e.to_string()))
    }

    fn is_alive(&self, conn: &ConnectionHandle) -> bool {
        conn.is_ready()
    }

    fn retire(&self, conn: ConnectionHandle) {
        conn.shutdown();
    }
}
