use crate::db::schema::SQLITE_INIT;
use crate::db::worker::ConnectionHandle;
use crate::error::SessionError;
use crate::retry::RetryPolicy;
use tracing::debug;

/// Creates the storage structure if it is missing. Safe to call from every context on every
/// startup; schema creation races with leader migration like any other write, so it runs under
/// the retry policy.
pub async fn ensure_schema(
    conn: &ConnectionHandle,
    policy: &RetryPolicy,
) -> Result<(), SessionError> {
    policy.run(|| conn.exec_batch(SQLITE_INIT)).await?;
    debug!(database_url = %conn.database_url(), "Schema ensured");
    Ok(())
}
