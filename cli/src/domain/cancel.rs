//! Ordered cancellation tokens and the per-workload registry that issues them.
//!
//! A token is canceled either explicitly through its registry or when the
//! registry's ambient signal fires (session shutdown, controller disposal).
//! Both flags only ever go from `false` to `true`.

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio_util::sync::CancellationToken;

use crate::domain::error::LifecycleError;

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct TokenState {
    registry: u64,
    seq: u64,
    canceled: AtomicBool,
}

/// Handle an operation polls to learn it has been abandoned.
///
/// Tokens compare by creation order within their registry.
#[derive(Debug, Clone)]
pub struct CancelToken {
    state: Arc<TokenState>,
    ambient: CancellationToken,
}

impl CancelToken {
    /// Creation sequence number within the issuing registry.
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.state.seq
    }

    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.state.canceled.load(Ordering::Acquire) || self.ambient.is_cancelled()
    }

    /// `Err(Canceled)` once the token has been canceled.
    pub fn check(&self) -> Result<(), LifecycleError> {
        if self.is_canceled() {
            return Err(LifecycleError::Canceled);
        }
        Ok(())
    }

    /// Cancel just this token, leaving its siblings alone.
    pub fn cancel_self(&self) {
        self.state.canceled.store(true, Ordering::Release);
    }
}

impl PartialEq for CancelToken {
    fn eq(&self, other: &Self) -> bool {
        self.state.registry == other.state.registry && self.state.seq == other.state.seq
    }
}

impl Eq for CancelToken {}

impl PartialOrd for CancelToken {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for CancelToken {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (self.state.registry, self.state.seq).cmp(&(other.state.registry, other.state.seq))
    }
}

/// Issues monotonically ordered tokens for one workload.
#[derive(Debug)]
pub struct CancellationRegistry {
    id: u64,
    next_seq: AtomicU64,
    outstanding: Mutex<Vec<Weak<TokenState>>>,
    ambient: CancellationToken,
}

impl Default for CancellationRegistry {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

impl CancellationRegistry {
    /// Registry whose tokens also report canceled once `ambient` fires.
    #[must_use]
    pub fn new(ambient: CancellationToken) -> Self {
        Self {
            id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            next_seq: AtomicU64::new(0),
            outstanding: Mutex::new(Vec::new()),
            ambient,
        }
    }

    /// Issue a fresh token ordered after every token created so far.
    pub fn create(&self) -> CancelToken {
        let mut outstanding = self.lock();
        // Sequence is taken under the lock so list order matches creation order.
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let state = Arc::new(TokenState {
            registry: self.id,
            seq,
            canceled: AtomicBool::new(false),
        });
        outstanding.retain(|weak| weak.strong_count() > 0);
        outstanding.push(Arc::downgrade(&state));
        CancelToken {
            state,
            ambient: self.ambient.clone(),
        }
    }

    /// Cancel every outstanding token.
    pub fn cancel_all(&self) {
        let drained: Vec<_> = self.lock().drain(..).collect();
        for state in drained.iter().filter_map(Weak::upgrade) {
            state.canceled.store(true, Ordering::Release);
        }
    }

    /// Cancel every outstanding token created before `token`.
    ///
    /// Returns how many tokens were canceled. `token` itself and anything
    /// newer are left untouched.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if `token` was issued by a different registry.
    pub fn cancel_all_before(&self, token: &CancelToken) -> Result<usize, LifecycleError> {
        if token.state.registry != self.id {
            return Err(LifecycleError::Internal(format!(
                "token #{} was not issued by cancellation registry {}",
                token.state.seq, self.id
            )));
        }
        let mut canceled = 0;
        self.lock().retain(|weak| {
            let Some(state) = weak.upgrade() else {
                return false;
            };
            if state.seq < token.state.seq {
                if !state.canceled.swap(true, Ordering::AcqRel) {
                    canceled += 1;
                }
                return false;
            }
            true
        });
        Ok(canceled)
    }

    /// Number of live tokens that can still be canceled through this registry.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.lock()
            .iter()
            .filter(|weak| {
                weak.upgrade()
                    .is_some_and(|state| !state.canceled.load(Ordering::Acquire))
            })
            .count()
    }

    /// The ambient signal shared by every token of this registry.
    #[must_use]
    pub fn ambient(&self) -> &CancellationToken {
        &self.ambient
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Weak<TokenState>>> {
        self.outstanding.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
