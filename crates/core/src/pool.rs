//! Browser pool - bounded registry of live sessions
//!
//! Design:
//! 1. One async mutex serializes every mutation (create/close/sweep), so the
//!    capacity bound holds under concurrent create calls and no session is
//!    ever closed twice
//! 2. The map itself sits behind a read-write lock; lookups take the read
//!    side only and never trigger a sweep
//! 3. Expiry is swept opportunistically at create time - no background
//!    reaper. Idle sessions linger until the next create or shutdown; that
//!    latency is the accepted cost of not running a timer task

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::capability::{CapabilityLauncher, LaunchOptions};
use crate::error::{BrowserError, Result};
use crate::session::{BrowserSession, SessionOptions};

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_sessions: usize,
    pub session_timeout: Duration,
    /// Launch defaults applied where `SessionOptions` leaves a field unset.
    pub defaults: LaunchOptions,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_sessions: 10,
            session_timeout: Duration::from_secs(3600),
            defaults: LaunchOptions::default(),
        }
    }
}

pub struct BrowserPool {
    launcher: Arc<dyn CapabilityLauncher>,
    config: PoolConfig,
    sessions: RwLock<HashMap<String, Arc<BrowserSession>>>,
    /// Guards every mutation of `sessions`. Held across session
    /// initialization so a create in flight counts against capacity.
    mutation: Mutex<()>,
}

impl BrowserPool {
    pub fn new(launcher: Arc<dyn CapabilityLauncher>, config: PoolConfig) -> Self {
        Self {
            launcher,
            config,
            sessions: RwLock::new(HashMap::new()),
            mutation: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Create and register a new session, sweeping expired sessions first so
    /// eviction can free room before the capacity check. The identifier is
    /// published only after initialization fully succeeds.
    pub async fn create_session(&self, options: SessionOptions) -> Result<String> {
        let _guard = self.mutation.lock().await;

        self.cleanup_expired().await;

        {
            let sessions = self.sessions.read().await;
            if sessions.len() >= self.config.max_sessions {
                return Err(BrowserError::PoolExhausted {
                    active: sessions.len(),
                    max: self.config.max_sessions,
                });
            }
        }

        let id = Uuid::now_v7().to_string();
        let session = Arc::new(BrowserSession::new(id.clone()));
        let launch = options.resolve(&self.config.defaults);

        if let Err(err) = session.initialize(self.launcher.as_ref(), &launch).await {
            tracing::error!(session_id = %id, "session creation failed: {err}");
            session.close().await;
            return Err(err);
        }

        let active = {
            let mut sessions = self.sessions.write().await;
            sessions.insert(id.clone(), session);
            sessions.len()
        };
        tracing::info!(session_id = %id, active, "session created");
        Ok(id)
    }

    /// Read-only lookup. Never sweeps, never mutates.
    pub async fn get_session(&self, id: &str) -> Option<Arc<BrowserSession>> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn active_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Remove and close a session. Returns whether it was present; a second
    /// call on the same id is a no-op returning `false`.
    pub async fn close_session(&self, id: &str) -> bool {
        let _guard = self.mutation.lock().await;

        let removed = self.sessions.write().await.remove(id);
        match removed {
            Some(session) => {
                session.close().await;
                let active = self.sessions.read().await.len();
                tracing::info!(session_id = %id, active, "session removed");
                true
            }
            None => false,
        }
    }

    /// Close everything; used at process shutdown.
    pub async fn close_all(&self) {
        let _guard = self.mutation.lock().await;

        let drained: Vec<(String, Arc<BrowserSession>)> =
            self.sessions.write().await.drain().collect();
        for (_, session) in &drained {
            session.close().await;
        }
        if !drained.is_empty() {
            tracing::info!(count = drained.len(), "all sessions closed");
        }
    }

    /// Evict sessions idle past the timeout. Only ever called with the
    /// mutation mutex already held.
    async fn cleanup_expired(&self) {
        let timeout = self.config.session_timeout;

        let mut expired = Vec::new();
        {
            let sessions = self.sessions.read().await;
            for (id, session) in sessions.iter() {
                if session.idle_for().await > timeout {
                    expired.push(id.clone());
                }
            }
        }

        for id in expired {
            let removed = self.sessions.write().await.remove(&id);
            if let Some(session) = removed {
                session.close().await;
                tracing::info!(session_id = %id, "expired session evicted");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeLauncher;

    fn pool_with(launcher: Arc<FakeLauncher>, max: usize, timeout: Duration) -> BrowserPool {
        BrowserPool::new(
            launcher,
            PoolConfig {
                max_sessions: max,
                session_timeout: timeout,
                defaults: LaunchOptions::default(),
            },
        )
    }

    #[tokio::test]
    async fn capacity_frees_up_when_a_session_closes() {
        let launcher = Arc::new(FakeLauncher::new());
        let pool = pool_with(Arc::clone(&launcher), 1, Duration::from_secs(3600));

        let a = pool.create_session(SessionOptions::default()).await.expect("session a");

        let err = pool
            .create_session(SessionOptions::default())
            .await
            .expect_err("pool is full");
        assert!(matches!(err, BrowserError::PoolExhausted { active: 1, max: 1 }));

        assert!(pool.close_session(&a).await);
        pool.create_session(SessionOptions::default()).await.expect("session b");
        assert_eq!(pool.active_sessions().await, 1);
    }

    #[tokio::test]
    async fn close_session_is_idempotent_in_effect() {
        let launcher = Arc::new(FakeLauncher::new());
        let pool = pool_with(Arc::clone(&launcher), 2, Duration::from_secs(3600));

        let id = pool.create_session(SessionOptions::default()).await.expect("session");
        assert!(pool.close_session(&id).await);
        assert!(!pool.close_session(&id).await);
        assert_eq!(launcher.last_capability().close_calls(), 1);
    }

    #[tokio::test]
    async fn lookup_of_unknown_id_is_none() {
        let launcher = Arc::new(FakeLauncher::new());
        let pool = pool_with(launcher, 2, Duration::from_secs(3600));
        assert!(pool.get_session("nope").await.is_none());
    }

    #[tokio::test]
    async fn expired_sessions_are_evicted_before_the_capacity_check() {
        let launcher = Arc::new(FakeLauncher::new());
        let pool = pool_with(Arc::clone(&launcher), 1, Duration::from_millis(50));

        let a = pool.create_session(SessionOptions::default()).await.expect("session a");
        tokio::time::sleep(Duration::from_millis(80)).await;

        // Pool is nominally full, but the sweep runs first and frees the slot.
        let b = pool.create_session(SessionOptions::default()).await.expect("session b");
        assert_ne!(a, b);
        assert!(pool.get_session(&a).await.is_none());
        assert!(pool.get_session(&b).await.is_some());
        assert_eq!(pool.active_sessions().await, 1);
    }

    #[tokio::test]
    async fn failed_initialization_registers_nothing() {
        let launcher = Arc::new(FakeLauncher::new());
        launcher.fail_init_scripts(true);
        let pool = pool_with(Arc::clone(&launcher), 2, Duration::from_secs(3600));

        pool.create_session(SessionOptions::default())
            .await
            .expect_err("initialization failure surfaces");
        assert_eq!(pool.active_sessions().await, 0);
        assert!(launcher.last_capability().is_closed());
    }

    #[tokio::test]
    async fn concurrent_creates_never_exceed_capacity() {
        let launcher = Arc::new(FakeLauncher::new());
        let pool = Arc::new(pool_with(launcher, 2, Duration::from_secs(3600)));

        let attempts: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                tokio::spawn(async move { pool.create_session(SessionOptions::default()).await })
            })
            .collect();

        let mut created = 0;
        for attempt in attempts {
            if attempt.await.expect("task completes").is_ok() {
                created += 1;
            }
        }

        assert_eq!(created, 2);
        assert_eq!(pool.active_sessions().await, 2);
    }

    #[tokio::test]
    async fn per_session_options_override_pool_defaults() {
        let launcher = Arc::new(FakeLauncher::new());
        let pool = pool_with(Arc::clone(&launcher), 2, Duration::from_secs(3600));

        pool.create_session(SessionOptions {
            user_agent: Some("custom-agent".to_string()),
            ..SessionOptions::default()
        })
        .await
        .expect("session");

        let options = launcher.last_options().expect("options recorded");
        assert_eq!(options.user_agent.as_deref(), Some("custom-agent"));
        assert!(options.headless);
        assert_eq!(options.viewport.width, 1920);
    }
}
