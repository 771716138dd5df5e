use std::ops::Deref;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, warn};

use vidtube_db::Database;

use crate::error::ApiError;
use crate::media::MediaHost;
use crate::tokens::TokenService;

/// Extra wait after the deadline so a write that passed its deadline check
/// can still report its result.
const WRITE_GRACE: Duration = Duration::from_secs(1);

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub tokens: TokenService,
    pub media: Arc<dyn MediaHost>,
    /// Where received files wait while they are handed to the media host.
    pub upload_dir: PathBuf,
    /// Upper bound on any single store or media host call.
    pub collaborator_timeout: Duration,
}

/// Point after which blocking work must not start a write. The caller has
/// already answered with a timeout by then.
#[derive(Debug, Clone, Copy)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub const UNBOUNDED: Deadline = Deadline(None);

    pub fn after(timeout: Duration) -> Self {
        Deadline(Instant::now().checked_add(timeout))
    }

    pub fn check(self) -> Result<(), ApiError> {
        match self.0 {
            Some(at) if Instant::now() >= at => {
                warn!("Skipping store write, deadline passed");
                Err(timed_out())
            }
            _ => Ok(()),
        }
    }
}

fn timed_out() -> ApiError {
    ApiError::Internal("Store did not respond in time".to_string())
}

/// What a [`run_blocking`] job sees: the shared state plus its deadline.
pub struct Blocking<'a> {
    inner: &'a AppStateInner,
    pub deadline: Deadline,
}

impl Deref for Blocking<'_> {
    type Target = AppStateInner;

    fn deref(&self) -> &AppStateInner {
        self.inner
    }
}

/// Runs blocking store work (SQLite, password hashing) off the async
/// runtime, bounded by the collaborator timeout. Jobs call
/// `deadline.check()` right before writing so a timed-out request leaves
/// no state behind.
pub async fn run_blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Blocking<'_>) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let inner = state.clone();
    let deadline = Deadline::after(state.collaborator_timeout);
    let task = tokio::task::spawn_blocking(move || {
        deadline.check()?;
        f(&Blocking {
            inner: &inner,
            deadline,
        })
    });

    match tokio::time::timeout(state.collaborator_timeout + WRITE_GRACE, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            error!("spawn_blocking join error: {}", e);
            Err(ApiError::Internal("Something went wrong".to_string()))
        }
        Err(_) => {
            error!(
                "Store call exceeded {:?} timeout",
                state.collaborator_timeout
            );
            Err(timed_out())
        }
    }
}
