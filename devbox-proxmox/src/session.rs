//! Ticket cache with single-flight refresh.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Result;

/// Authentication ticket plus its anti-forgery token.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub ticket: String,
    pub csrf_token: String,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

/// Holds the current session. The mutex is held across a login, so at most
/// one login is in flight and concurrent callers reuse its result.
#[derive(Debug, Default)]
pub struct SessionCache {
    current: Mutex<Option<Arc<Session>>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached session, or the result of `login` when none is cached.
    pub async fn get_or_login<F, Fut>(&self, login: F) -> Result<Arc<Session>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Session>>,
    {
        let mut current = self.current.lock().await;
        if let Some(session) = current.as_ref() {
            return Ok(Arc::clone(session));
        }

        let session = Arc::new(login().await?);
        *current = Some(Arc::clone(&session));
        Ok(session)
    }

    /// Drop `stale` if it is still the cached session. A session that was
    /// already replaced by another caller's refresh is left alone.
    pub async fn invalidate(&self, stale: &Arc<Session>) {
        let mut current = self.current.lock().await;
        if current
            .as_ref()
            .is_some_and(|session| Arc::ptr_eq(session, stale))
        {
            debug!("Invalidating expired session ticket");
            *current = None;
        }
    }

    /// Replace `stale` with a fresh session, reusing one that another caller
    /// already obtained.
    pub async fn refresh<F, Fut>(&self, stale: &Arc<Session>, login: F) -> Result<Arc<Session>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Session>>,
    {
        self.invalidate(stale).await;
        self.get_or_login(login).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ControlPlaneError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn session(n: usize) -> Session {
        Session {
            ticket: format!("ticket-{n}"),
            csrf_token: format!("csrf-{n}"),
        }
    }

    #[tokio::test]
    async fn test_session_is_cached() {
        let cache = SessionCache::new();
        let logins = AtomicUsize::new(0);

        for _ in 0..3 {
            let s = cache
                .get_or_login(|| async {
                    let n = logins.fetch_add(1, Ordering::SeqCst);
                    Ok(session(n))
                })
                .await
                .unwrap();
            assert_eq!(s.ticket, "ticket-0");
        }
        assert_eq!(logins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_refresh_logs_in_once() {
        let cache = Arc::new(SessionCache::new());
        let logins = Arc::new(AtomicUsize::new(0));

        let stale = cache
            .get_or_login(|| async { Ok(session(100)) })
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let logins = Arc::clone(&logins);
            let stale = Arc::clone(&stale);
            handles.push(tokio::spawn(async move {
                cache
                    .refresh(&stale, || async move {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        let n = logins.fetch_add(1, Ordering::SeqCst);
                        Ok(session(n))
                    })
                    .await
                    .unwrap()
            }));
        }

        for handle in handles {
            let fresh = handle.await.unwrap();
            assert_eq!(fresh.ticket, "ticket-0");
        }
        assert_eq!(logins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_login_is_not_cached() {
        let cache = SessionCache::new();

        let err = cache
            .get_or_login(|| async { Err(ControlPlaneError::Auth("bad password".into())) })
            .await;
        assert!(matches!(err, Err(ControlPlaneError::Auth(_))));

        let s = cache.get_or_login(|| async { Ok(session(1)) }).await.unwrap();
        assert_eq!(s.ticket, "ticket-1");
    }
}
