use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tabshare::db::ConnectionFactory;
use tabshare::{ConnectionError, Session};

/// Stand-in connection: identity is the allocation.
#[derive(Debug)]
struct FakeConn {
    serial: usize,
    alive: AtomicBool,
}

struct CountingFactory {
    calls: Arc<AtomicUsize>,
    retired: Arc<AtomicUsize>,
    delay: Duration,
    /// Constructions with these serials (1-based) fail.
    failing: Vec<usize>,
}

impl CountingFactory {
    fn new(delay: Duration) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            retired: Arc::new(AtomicUsize::new(0)),
            delay,
            failing: Vec::new(),
        }
    }

    fn failing_on(mut self, serials: &[usize]) -> Self {
        self.failing = serials.to_vec();
        self
    }
}

#[async_trait]
impl ConnectionFactory for CountingFactory {
    type Connection = Arc<FakeConn>;

    async fn create(&self) -> Result<Arc<FakeConn>, ConnectionError> {
        let serial = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.delay).await;
        if self.failing.contains(&serial) {
            return Err(ConnectionError::new(format!(
                "storage quota exceeded (attempt {serial})"
            )));
        }
        Ok(Arc::new(FakeConn {
            serial,
            alive: AtomicBool::new(true),
        }))
    }

    fn is_alive(&self, conn: &Arc<FakeConn>) -> bool {
        conn.alive.load(Ordering::SeqCst)
    }

    fn retire(&self, _conn: Arc<FakeConn>) {
        self.retired.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_concurrent_acquire_constructs_once() {
    let factory = CountingFactory::new(Duration::from_millis(50));
    let calls = Arc::clone(&factory.calls);
    let session = Session::new(factory);

    let results = join_all((0..5).map(|_| session.acquire())).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1, "factory must run exactly once");
    let handles: Vec<_> = results.into_iter().map(Result::unwrap).collect();
    assert!(handles.iter().all(|h| Arc::ptr_eq(h, &handles[0])));
    assert_eq!(session.constructions(), 1);
}

#[tokio::test]
async fn test_ready_handle_is_reused_without_construction() {
    let factory = CountingFactory::new(Duration::from_millis(5));
    let calls = Arc::clone(&factory.calls);
    let session = Session::new(factory);

    let first = session.acquire().await.unwrap();
    assert!(!session.is_pending());
    assert!(Arc::ptr_eq(&session.current().unwrap(), &first));

    for _ in 0..3 {
        let again = session.acquire().await.unwrap();
        assert!(Arc::ptr_eq(&again, &first));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_construction_is_not_cached() {
    let factory = CountingFactory::new(Duration::from_millis(5)).failing_on(&[1]);
    let calls = Arc::clone(&factory.calls);
    let session = Session::new(factory);

    let err = session.acquire().await.unwrap_err();
    assert!(err.message().contains("attempt 1"));
    assert!(session.current().is_none());
    assert!(!session.is_pending());

    let conn = session.acquire().await.unwrap();
    assert_eq!(conn.serial, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_waiters_share_the_same_failure() {
    let factory = CountingFactory::new(Duration::from_millis(30)).failing_on(&[1]);
    let calls = Arc::clone(&factory.calls);
    let session = Session::new(factory);

    let results = join_all((0..4).map(|_| session.acquire())).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let errors: Vec<_> = results.into_iter().map(Result::unwrap_err).collect();
    assert!(errors.iter().all(|e| *e == errors[0]));

    // The next caller starts over.
    assert!(session.acquire().await.is_ok());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_dead_handle_is_rebuilt() {
    let factory = CountingFactory::new(Duration::from_millis(5));
    let calls = Arc::clone(&factory.calls);
    let retired = Arc::clone(&factory.retired);
    let session = Session::new(factory);

    let first = session.acquire().await.unwrap();
    assert_eq!(retired.load(Ordering::SeqCst), 0);
    first.alive.store(false, Ordering::SeqCst);

    let second = session.acquire().await.unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(second.serial, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(retired.load(Ordering::SeqCst), 1, "the dead handle must be released");
}

#[tokio::test]
async fn test_dropped_acquire_does_not_stall_construction() {
    let factory = CountingFactory::new(Duration::from_millis(40));
    let calls = Arc::clone(&factory.calls);
    let session = Session::new(factory);

    // Start a construction and abandon the caller before it settles.
    let abandoned = tokio::time::timeout(Duration::from_millis(5), session.acquire()).await;
    assert!(abandoned.is_err());
    assert!(session.is_pending());

    let conn = session.acquire().await.unwrap();
    assert_eq!(conn.serial, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_abandoned_failed_construction_is_not_replayed() {
    let factory = CountingFactory::new(Duration::from_millis(20)).failing_on(&[1]);
    let calls = Arc::clone(&factory.calls);
    let session = Session::new(factory);

    // Nobody is waiting when the construction fails.
    let abandoned = tokio::time::timeout(Duration::from_millis(5), session.acquire()).await;
    assert!(abandoned.is_err());
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!session.is_pending(), "failed construction must clear the ticket");
    assert!(session.current().is_none());

    let conn = session.acquire().await.unwrap();
    assert_eq!(conn.serial, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_abandoned_successful_construction_is_cached() {
    let factory = CountingFactory::new(Duration::from_millis(20));
    let calls = Arc::clone(&factory.calls);
    let session = Session::new(factory);

    let abandoned = tokio::time::timeout(Duration::from_millis(5), session.acquire()).await;
    assert!(abandoned.is_err());
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(!session.is_pending());
    let cached = session.current().expect("construction settled without a waiter");
    assert_eq!(cached.serial, 1);
    assert!(Arc::ptr_eq(&session.acquire().await.unwrap(), &cached));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
