//! Per-context connection holder.
//!
//! A [`Session`] owns at most one live connection. Acquisition goes through three states:
//!
//! - `Empty`: nothing built yet, or the last construction failed.
//! - `Pending`: one construction is in flight; every caller awaits the same ticket.
//! - `Ready`: the connection is cached and handed out without suspending.
//!
//! Construction runs on its own task, and that task settles the state whether or not anyone is
//! still waiting. A caller dropping its `acquire()` future therefore neither stalls the ticket nor
//! leaves a finished failure behind. The state is settled before any waiter observes the result,
//! so a caller that sees a failure and immediately retries always starts a fresh construction.
//! A cached connection that is no longer alive is retired and rebuilt.

use crate::config::CONFIG;
use crate::db::factory::{ConnectionFactory, WorkerFactory};
use crate::db::worker::ConnectionHandle;
use crate::error::ConnectionError;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use tracing::{info, warn};

type Ticket<C> = Shared<BoxFuture<'static, Result<C, ConnectionError>>>;

enum Slot<C> {
    Empty,
    Pending { ticket_id: u64, ticket: Ticket<C> },
    Ready(C),
}

pub struct Session<F: ConnectionFactory> {
    factory: Arc<F>,
    slot: Arc<Mutex<Slot<F::Connection>>>,
    next_ticket: AtomicU64,
    constructions: Arc<AtomicU64>,
}

impl<F: ConnectionFactory> Session<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory: Arc::new(factory),
            slot: Arc::new(Mutex::new(Slot::Empty)),
            next_ticket: AtomicU64::new(0),
            constructions: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Returns the context's connection, building it if needed.
    ///
    /// Concurrent callers share one construction; a failed construction is not cached.
    pub async fn acquire(&self) -> Result<F::Connection, ConnectionError> {
        let ticket = {
            let mut slot = lock(&self.slot);
            let in_flight = match &*slot {
                Slot::Ready(conn) if self.factory.is_alive(conn) => return Ok(conn.clone()),
                Slot::Pending { ticket, .. } => Some(ticket.clone()),
                Slot::Ready(_) | Slot::Empty => None,
            };
            match in_flight {
                Some(ticket) => ticket,
                None => {
                    if let Slot::Ready(dead) = std::mem::replace(&mut *slot, Slot::Empty) {
                        warn!("Cached connection is no longer alive; rebuilding");
                        self.factory.retire(dead);
                    }
                    self.start_construction(&mut slot)
                }
            }
        };
        ticket.await
    }

    /// Cached connection, if one is ready. Never starts a construction.
    pub fn current(&self) -> Option<F::Connection> {
        match &*lock(&self.slot) {
            Slot::Ready(conn) => Some(conn.clone()),
            Slot::Empty | Slot::Pending { .. } => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(&*lock(&self.slot), Slot::Pending { .. })
    }

    /// Number of constructions started over this session's lifetime.
    pub fn constructions(&self) -> u64 {
        self.constructions.load(Ordering::SeqCst)
    }

    // Called with the slot locked, so the task cannot settle before `Pending` is installed.
    fn start_construction(&self, slot: &mut Slot<F::Connection>) -> Ticket<F::Connection> {
        let ticket_id = self.next_ticket.fetch_add(1, Ordering::SeqCst);
        let first = self.constructions.fetch_add(1, Ordering::SeqCst) == 0;

        let factory = Arc::clone(&self.factory);
        let state = Arc::clone(&self.slot);
        let task = tokio::spawn(async move {
            let result = match AssertUnwindSafe(factory.create()).catch_unwind().await {
                Ok(result) => result,
                Err(_) => Err(ConnectionError::new("connection construction panicked")),
            };
            settle(&state, &*factory, ticket_id, &result);

            match &result {
                Ok(_) if first => info!("Database session established"),
                Ok(_) => info!(ticket_id, "Database session re-established"),
                Err(e) => warn!(ticket_id, error = %e, "Database session construction failed"),
            }
            result
        });

        let factory = Arc::clone(&self.factory);
        let state = Arc::clone(&self.slot);
        let ticket = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    // The task was cancelled before it could settle the slot.
                    let result = Err(ConnectionError::new(format!(
                        "connection construction task failed: {e}"
                    )));
                    settle(&state, &*factory, ticket_id, &result);
                    result
                }
            }
        }
        .boxed()
        .shared();

        *slot = Slot::Pending {
            ticket_id,
            ticket: ticket.clone(),
        };
        ticket
    }
}

/// Moves the slot out of `Pending` for `ticket_id`: to `Ready` on success, back to `Empty` on
/// failure. A connection nobody can receive any more is retired.
fn settle<F: ConnectionFactory>(
    state: &Mutex<Slot<F::Connection>>,
    factory: &F,
    ticket_id: u64,
    result: &Result<F::Connection, ConnectionError>,
) {
    let mut slot = lock(state);
    let current = matches!(&*slot, Slot::Pending { ticket_id: id, .. } if *id == ticket_id);
    match result {
        Ok(conn) if current => *slot = Slot::Ready(conn.clone()),
        Ok(conn) => factory.retire(conn.clone()),
        Err(_) if current => *slot = Slot::Empty,
        Err(_) => {}
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

static SESSION: OnceLock<Session<WorkerFactory>> = OnceLock::new();

/// Process-wide session for the configured database.
pub fn global() -> &'static Session<WorkerFactory> {
    SESSION.get_or_init(|| Session::new(WorkerFactory::new(CONFIG.basic.database_url.clone())))
}

/// Acquires the process-wide connection.
pub async fn acquire() -> Result<ConnectionHandle, ConnectionError> {
    global().acquire().await
}
