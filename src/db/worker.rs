use crate::db::value::{Row, bind_params, row_to_json};
use crate::error::SessionError;
use ractor::{Actor, ActorId, ActorProcessingErr, ActorRef, ActorStatus, RpcReplyPort};
use serde_json::Value;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use std::{str::FromStr, sync::Arc, time::Duration};
use tracing::{debug, info};

/// Result of a statement that does not return rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecOutcome {
    pub rows_affected: u64,
    pub last_insert_id: i64,
}

#[derive(Debug)]
pub enum DbWorkerMessage {
    /// Run a row-returning statement with bound parameters.
    Query(String, Vec<Value>, RpcReplyPort<Result<Vec<Row>, SessionError>>),

    /// Run a mutation with bound parameters.
    Execute(String, Vec<Value>, RpcReplyPort<Result<ExecOutcome, SessionError>>),

    /// Run `;`-separated statements without parameters inside one transaction.
    ExecBatch(String, RpcReplyPort<Result<(), SessionError>>),
}

/// A ready, single-writer database session served by a [`DbWorker`].
///
/// Cloning is cheap and every clone talks to the same worker.
#[derive(Clone)]
pub struct ConnectionHandle {
    worker: ActorRef<DbWorkerMessage>,
    database_url: Arc<str>,
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("worker", &self.worker.get_id())
            .field("database_url", &self.database_url)
            .finish()
    }
}

impl ConnectionHandle {
    pub async fn query(&self, sql: &str, params: Vec<Value>) -> Result<Vec<Row>, SessionError> {
        ractor::call!(self.worker, DbWorkerMessage::Query, sql.to_string(), params)
            .map_err(|e| SessionError::RactorError(format!("DbWorker Query RPC failed: {e}")))?
    }

    pub async fn execute(
        &self,
        sql: &str,
        params: Vec<Value>,
    ) -> Result<ExecOutcome, SessionError> {
        ractor::call!(self.worker, DbWorkerMessage::Execute, sql.to_string(), params)
            .map_err(|e| SessionError::RactorError(format!("DbWorker Execute RPC failed: {e}")))?
    }

    pub async fn exec_batch(&self, sql: &str) -> Result<(), SessionError> {
        ractor::call!(self.worker, DbWorkerMessage::ExecBatch, sql.to_string())
            .map_err(|e| SessionError::RactorError(format!("DbWorker ExecBatch RPC failed: {e}")))?
    }

    /// Whether the worker behind this handle can still serve requests.
    ///
    /// A worker still finishing its startup counts as ready; one that is draining or stopping
    /// does not.
    pub fn is_ready(&self) -> bool {
        !matches!(
            self.worker.get_status(),
            ActorStatus::Draining | ActorStatus::Stopping | ActorStatus::Stopped
        )
    }

    pub fn id(&self) -> ActorId {
        self.worker.get_id()
    }

    /// True when both handles talk to the same worker.
    pub fn same_session(&self, other: &ConnectionHandle) -> bool {
        self.id() == other.id()
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Stops the worker. Only used to simulate context teardown.
    pub fn shutdown(&self) {
        self.worker.stop(Some("teardown".to_string()));
    }
}

/// State owned by a running [`DbWorker`].
pub struct DbWorkerState {
    pool: SqlitePool,
}

/// Actor that exclusively owns the SQLite pool for one context.
pub struct DbWorker;

#[ractor::async_trait]
impl Actor for DbWorker {
    type Msg = DbWorkerMessage;
    type State = DbWorkerState;
    type Arguments = String;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        database_url: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let connect_opts = SqliteConnectOptions::from_str(database_url.as_str())
            .map_err(|e| ActorProcessingErr::from(format!("invalid database url: {e}")))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5))
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        // One connection: this worker is the single writer for its context.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect_opts)
            .await
            .map_err(|e| ActorProcessingErr::from(format!("db connect failed: {e}")))?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|e| ActorProcessingErr::from(format!("db open check failed: {e}")))?;

        info!(database_url = %database_url, "DbWorker initialized");
        Ok(DbWorkerState { pool })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            DbWorkerMessage::Query(sql, params, reply) => {
                let res = self.query(&state.pool, &sql, params).await;
                let _ = reply.send(res);
            }
            DbWorkerMessage::Execute(sql, params, reply) => {
                let res = self.execute(&state.pool, &sql, params).await;
                let _ = reply.send(res);
            }
            DbWorkerMessage::ExecBatch(sql, reply) => {
                let res = self.exec_batch(&state.pool, &sql).await;
                let _ = reply.send(res);
            }
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.pool.close().await;
        debug!("DbWorker stopped");
        Ok(())
    }
}

impl DbWorker {
    async fn query(
        &self,
        pool: &SqlitePool,
        sql: &str,
        params: Vec<Value>,
    ) -> Result<Vec<Row>, SessionError> {
        let rows = bind_params(sqlx::query(sql), params)
            .fetch_all(pool)
            .await?;

        rows.iter()
            .map(|row| row_to_json(row).map_err(SessionError::from))
            .collect()
    }

    async fn execute(
        &self,
        pool: &SqlitePool,
        sql: &str,
        params: Vec<Value>,
    ) -> Result<ExecOutcome, SessionError> {
        let done = bind_params(sqlx::query(sql), params).execute(pool).await?;

        Ok(ExecOutcome {
            rows_affected: done.rows_affected(),
            last_insert_id: done.last_insert_rowid(),
        })
    }

    async fn exec_batch(&self, pool: &SqlitePool, sql: &str) -> Result<(), SessionError> {
        let mut tx = pool.begin().await?;
        for stmt in sql.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            sqlx::query(s).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

/// Spawn a database worker and return a handle once its storage is open.
pub async fn spawn(database_url: &str) -> Result<ConnectionHandle, ActorProcessingErr> {
    let (worker, _jh) = Actor::spawn(None, DbWorker, database_url.to_string())
        .await
        .map_err(|e| ActorProcessingErr::from(format!("DbWorker spawn failed: {e}")))?;

    Ok(ConnectionHandle {
        worker,
        database_url: Arc::from(database_url),
    })
}
