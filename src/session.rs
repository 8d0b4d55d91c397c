//! Session and per-query context.
//!
//! A [`Session`] carries what every cursor needs to know about the caller:
//! the repository pool, whether git errors are skipped and the blob content
//! rules. It is passed explicitly, never looked up globally. A [`Context`]
//! wraps a session for one query and adds cancellation and a deadline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{get_bool_env, BlobsConfig, SKIP_GIT_ERRORS_KEY};
use crate::executor::{ExecuteError, ExecuteResult};
use crate::storage::RepositoryPool;

#[derive(Debug, Clone)]
pub struct Session {
    pool: Arc<RepositoryPool>,
    skip_git_errors: bool,
    blobs: BlobsConfig,
}

impl Session {
    pub fn new(pool: Arc<RepositoryPool>) -> Self {
        Self {
            pool,
            skip_git_errors: false,
            blobs: BlobsConfig::default(),
        }
    }

    /// Session configured from the `GITBASE_*` environment variables.
    pub fn from_env(pool: Arc<RepositoryPool>) -> Self {
        Self::new(pool)
            .with_skip_git_errors(get_bool_env(SKIP_GIT_ERRORS_KEY, false))
            .with_blobs(BlobsConfig::from_env())
    }

    pub fn with_skip_git_errors(mut self, skip: bool) -> Self {
        self.skip_git_errors = skip;
        self
    }

    pub fn with_blobs(mut self, blobs: BlobsConfig) -> Self {
        self.blobs = blobs;
        self
    }

    pub fn pool(&self) -> &Arc<RepositoryPool> {
        &self.pool
    }

    pub fn skip_git_errors(&self) -> bool {
        self.skip_git_errors
    }

    pub fn blobs(&self) -> &BlobsConfig {
        &self.blobs
    }
}

/// Cancellation flag shared between a context and whoever may cancel it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-query context. Clones share the same cancel token.
#[derive(Debug, Clone)]
pub struct Context {
    session: Arc<Session>,
    cancel: CancelToken,
    deadline: Option<Instant>,
}

impl Context {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            cancel: CancelToken::new(),
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_done(&self) -> bool {
        self.cancel.is_canceled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fail with [`ExecuteError::Canceled`] once the context was canceled
    /// or its deadline passed.
    pub fn check(&self) -> ExecuteResult<()> {
        if self.is_done() {
            return Err(ExecuteError::Canceled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Arc<Session> {
        Arc::new(Session::new(Arc::new(RepositoryPool::new())))
    }

    #[test]
    fn test_session_builder() {
        let s = Session::new(Arc::new(RepositoryPool::new()))
            .with_skip_git_errors(true)
            .with_blobs(BlobsConfig::default().max_size(1));
        assert!(s.skip_git_errors());
        assert_eq!(s.blobs().max_size, 1);
        assert!(s.pool().is_empty());
    }

    #[test]
    fn test_cancel_is_shared() {
        let ctx = Context::new(session());
        let other = ctx.clone();
        let token = ctx.cancel_token();
        assert!(other.check().is_ok());

        token.cancel();
        assert!(matches!(other.check(), Err(ExecuteError::Canceled)));
        assert!(ctx.is_done());
    }

    #[test]
    fn test_deadline() {
        let ctx = Context::new(session()).with_deadline(Instant::now());
        assert!(matches!(ctx.check(), Err(ExecuteError::Canceled)));

        let ctx = Context::new(session()).with_timeout(Duration::from_secs(3600));
        assert!(ctx.check().is_ok());
    }
}
