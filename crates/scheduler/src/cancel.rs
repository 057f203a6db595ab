//! Cancellation token system for preload stages
//!
//! Provides cancellation tokens that allow in-flight loads to be cancelled
//! cooperatively. Loaders either poll `is_cancelled()` or await `cancelled()`
//! alongside their native load.

use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};

use tokio::sync::Notify;

struct TokenState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cancellation token for cooperative load cancellation
///
/// Multiple tokens can share the same underlying cancellation state via Arc.
///
/// # Example
///
/// ```
/// use media_preload_scheduler::CancellationToken;
///
/// let token = CancellationToken::new();
/// let loader_token = token.clone();
///
/// token.cancel();
/// assert!(loader_token.is_cancelled());
/// ```
#[derive(Clone)]
pub struct CancellationToken {
    state: Arc<TokenState>,
}

impl CancellationToken {
    /// Create a new cancellation token
    ///
    /// The token starts in a non-cancelled state.
    pub fn new() -> Self {
        Self {
            state: Arc::new(TokenState {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Cancel this token
    ///
    /// All clones observe the cancellation and every task awaiting
    /// [`cancelled`](Self::cancelled) is woken. Calling it twice is a no-op.
    pub fn cancel(&self) {
        if !self.state.cancelled.swap(true, Ordering::AcqRel) {
            self.state.notify.notify_waiters();
        }
    }

    /// Whether `other` shares this token's cancellation state
    pub fn same_as(&self, other: &CancellationToken) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    /// Check if this token has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    /// Wait until the token is cancelled
    ///
    /// Resolves immediately for a token that is already cancelled.
    pub async fn cancelled(&self) {
        loop {
            let mut notified = std::pin::pin!(self.state.notify.notified());
            // Register before checking the flag so a concurrent cancel cannot be missed
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Cancellation token registry keyed by stage name
///
/// The scheduler registers one token per running stage so a stage, or every
/// stage, can be aborted from outside the `run_stage` future.
#[derive(Clone, Default)]
pub struct CancellationRegistry {
    tokens: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl CancellationRegistry {
    /// Create a new empty cancellation registry
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CancellationToken>> {
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a stage and return its fresh cancellation token
    ///
    /// Re-registering a stage replaces the previous token without cancelling it.
    pub fn register(&self, stage: &str) -> CancellationToken {
        let token = CancellationToken::new();
        self.lock().insert(stage.to_string(), token.clone());
        token
    }

    /// Cancel a stage by name
    ///
    /// Returns `true` if the stage was registered.
    pub fn cancel(&self, stage: &str) -> bool {
        match self.lock().get(stage) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel all registered stages
    ///
    /// Returns the number of stages cancelled.
    pub fn cancel_all(&self) -> usize {
        let tokens = self.lock();
        for token in tokens.values() {
            token.cancel();
        }
        tokens.len()
    }

    /// Unregister a stage if it is still bound to `token`
    ///
    /// A stage that was re-run in the meantime keeps its newer token.
    pub fn unregister(&self, stage: &str, token: &CancellationToken) -> bool {
        let mut tokens = self.lock();
        match tokens.get(stage) {
            Some(current) if current.same_as(token) => {
                tokens.remove(stage);
                true
            }
            _ => false,
        }
    }

    /// Whether `token` is the one currently registered for `stage`
    pub fn is_current(&self, stage: &str, token: &CancellationToken) -> bool {
        self.lock()
            .get(stage)
            .is_some_and(|current| current.same_as(token))
    }

    /// Get the cancellation token for a stage
    pub fn get(&self, stage: &str) -> Option<CancellationToken> {
        self.lock().get(stage).cloned()
    }

    /// Get the number of registered stages
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
