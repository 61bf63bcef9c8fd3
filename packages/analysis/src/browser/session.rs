//! Pooled browser sessions with lifecycle and metrics.
//!
//! The pool hands out at most `max_sessions` concurrent sessions (hard cap
//! 5). A worker owns exactly one session for its page's lifetime; crashed
//! sessions are disposed and replaced rather than returned to the pool.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::backend::{BrowserBackend, BrowserHandle, PageHandle};
use super::{BrowserEngine, BrowserError, BrowserResult};
use crate::config::MAX_SESSIONS_CAP;

/// Counters exposed for status calls.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PoolMetrics {
    pub created: u64,
    pub recycled: u64,
    pub crashed: u64,
    pub pages_processed: u64,
    pub total_load_ms: u64,
}

/// A leased browser session.
pub struct Session {
    pub id: Uuid,
    handle: Box<dyn BrowserHandle>,
    engine: BrowserEngine,
    acquired_at: Instant,
    pages_processed: u64,
    load_ms: u64,
    // Held for the session's lifetime to bound pool concurrency.
    _permit: OwnedSemaphorePermit,
}

impl Session {
    /// Open a fresh page in this session.
    pub async fn new_page(&self) -> BrowserResult<Box<dyn PageHandle>> {
        if !self.handle.is_healthy() {
            return Err(BrowserError::Crashed("session is unhealthy".into()));
        }
        self.handle.new_page().await
    }

    /// Record a processed page and its load time.
    pub fn record_page(&mut self, load_ms: u64) {
        self.pages_processed += 1;
        self.load_ms += load_ms;
    }

    pub fn engine(&self) -> BrowserEngine {
        self.engine
    }

    pub fn is_healthy(&self) -> bool {
        self.handle.is_healthy()
    }
}

/// Browser session pool.
pub struct SessionPool {
    backend: Arc<dyn BrowserBackend>,
    default_engine: BrowserEngine,
    headless: bool,
    semaphore: Arc<Semaphore>,
    idle: Mutex<Vec<(BrowserEngine, Box<dyn BrowserHandle>)>>,
    metrics: Mutex<PoolMetrics>,
}

impl SessionPool {
    /// Create a pool bounded at `max_sessions` (clamped to [1, 5]).
    pub fn new(backend: Arc<dyn BrowserBackend>, max_sessions: usize, headless: bool) -> Self {
        let max_sessions = max_sessions.clamp(1, MAX_SESSIONS_CAP);
        Self {
            backend,
            default_engine: BrowserEngine::default(),
            headless,
            semaphore: Arc::new(Semaphore::new(max_sessions)),
            idle: Mutex::new(Vec::new()),
            metrics: Mutex::new(PoolMetrics::default()),
        }
    }

    /// Set the engine used when `acquire` gets no explicit one.
    pub fn with_default_engine(mut self, engine: BrowserEngine) -> Self {
        self.default_engine = engine;
        self
    }

    /// Acquire a session, waiting for a free slot if the pool is full.
    pub async fn acquire(&self, engine: Option<BrowserEngine>) -> BrowserResult<Session> {
        let engine = engine.unwrap_or(self.default_engine);
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| BrowserError::Crashed("session pool closed".into()))?;

        // Reuse an idle browser of the same engine when one is healthy.
        let reused = {
            let mut idle = self.idle.lock().await;
            idle.iter()
                .position(|(e, handle)| *e == engine && handle.is_healthy())
                .map(|i| idle.swap_remove(i).1)
        };

        let handle = match reused {
            Some(handle) => {
                self.metrics.lock().await.recycled += 1;
                handle
            }
            None => {
                let handle = self.backend.launch(engine, self.headless).await?;
                self.metrics.lock().await.created += 1;
                handle
            }
        };

        let session = Session {
            id: Uuid::new_v4(),
            handle,
            engine,
            acquired_at: Instant::now(),
            pages_processed: 0,
            load_ms: 0,
            _permit: permit,
        };
        debug!(session_id = %session.id, engine = %engine, "session acquired");
        Ok(session)
    }

    /// Return a session to the pool.
    ///
    /// Healthy sessions go back to the idle list; crashed ones are closed
    /// and dropped, surfacing as a replacement launch on the next acquire.
    pub async fn release(&self, mut session: Session) {
        let healthy = session.handle.is_healthy();
        let held_for = session.acquired_at.elapsed();

        {
            let mut metrics = self.metrics.lock().await;
            metrics.pages_processed += session.pages_processed;
            metrics.total_load_ms += session.load_ms;
            if !healthy {
                metrics.crashed += 1;
            }
        }

        if healthy {
            debug!(
                session_id = %session.id,
                pages = session.pages_processed,
                held_ms = held_for.as_millis() as u64,
                "session released"
            );
            self.idle
                .lock()
                .await
                .push((session.engine, session.handle));
        } else {
            warn!(session_id = %session.id, "disposing crashed session");
            let _ = session.handle.close().await;
        }
        // Permit drops here, freeing the slot either way.
    }

    /// Current pool counters.
    pub async fn metrics(&self) -> PoolMetrics {
        *self.metrics.lock().await
    }

    /// Close every idle browser. Leased sessions close on release.
    pub async fn shutdown(&self) {
        let mut idle = self.idle.lock().await;
        info!(idle = idle.len(), "shutting down session pool");
        for (_, mut handle) in idle.drain(..) {
            let _ = handle.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockBackend;

    #[tokio::test]
    async fn test_acquire_release_reuses_browser() {
        let backend = Arc::new(MockBackend::healthy());
        let pool = SessionPool::new(backend.clone(), 2, true);

        let session = pool.acquire(None).await.unwrap();
        pool.release(session).await;
        let _again = pool.acquire(None).await.unwrap();

        let metrics = pool.metrics().await;
        assert_eq!(metrics.created, 1);
        assert_eq!(metrics.recycled, 1);
    }

    #[tokio::test]
    async fn test_pool_bounds_concurrency() {
        let backend = Arc::new(MockBackend::healthy());
        let pool = Arc::new(SessionPool::new(backend, 1, true));

        let first = pool.acquire(None).await.unwrap();

        // Second acquire must block until the first is released.
        let pool2 = pool.clone();
        let waiter = tokio::spawn(async move { pool2.acquire(None).await.map(|_| ()) });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        pool.release(first).await;
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_crashed_session_is_not_reused() {
        let backend = Arc::new(MockBackend::crashing_after_launch());
        let pool = SessionPool::new(backend, 1, true);

        let session = pool.acquire(None).await.unwrap();
        pool.release(session).await;

        let metrics = pool.metrics().await;
        assert_eq!(metrics.crashed, 1);

        // Next acquire launches a new browser rather than reusing.
        let _fresh = pool.acquire(None).await.unwrap();
        assert_eq!(pool.metrics().await.created, 2);
    }

    #[tokio::test]
    async fn test_session_records_metrics() {
        let backend = Arc::new(MockBackend::healthy());
        let pool = SessionPool::new(backend, 1, true);

        let mut session = pool.acquire(None).await.unwrap();
        session.record_page(120);
        session.record_page(80);
        pool.release(session).await;

        let metrics = pool.metrics().await;
        assert_eq!(metrics.pages_processed, 2);
        assert_eq!(metrics.total_load_ms, 200);
    }
}
