//! Explicit dependency graph of value cells.
//!
//! [`Var`] cells hold values written from outside. [`Derived`] cells hold a
//! value computed from a declared list of dependencies and recompute
//! synchronously whenever one of them changes. Reads also revalidate against
//! dependency versions, so a derived value is never observably stale, even
//! in the middle of a [`batch`].
//!
//! Listener notifications raised inside [`batch`] are deferred until the
//! outermost batch ends and deduplicated, so a derived cell fed by several
//! inputs that change together recomputes and notifies once.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

pub type ListenerId = u64;

type Listener = Arc<dyn Fn() + Send + Sync>;

/// Anything a [`Derived`] cell can depend on.
pub trait Source: Send + Sync {
    /// Monotonic counter bumped on every observable value change.
    fn version(&self) -> u64;
    fn subscribe(&self, listener: Arc<dyn Fn() + Send + Sync>) -> ListenerId;
    fn unsubscribe(&self, id: ListenerId);
}

thread_local! {
    static PENDING: RefCell<Option<Vec<Listener>>> = const { RefCell::new(None) };
}

fn same_listener(a: &Listener, b: &Listener) -> bool {
    std::ptr::eq(Arc::as_ptr(a).cast::<()>(), Arc::as_ptr(b).cast::<()>())
}

fn dispatch(listeners: Vec<Listener>) {
    let deferred = PENDING.with(|pending| {
        let mut pending = pending.borrow_mut();
        let Some(queue) = pending.as_mut() else {
            return false;
        };
        for listener in &listeners {
            if !queue.iter().any(|queued| same_listener(queued, listener)) {
                queue.push(Arc::clone(listener));
            }
        }
        true
    });
    if !deferred {
        for listener in listeners {
            listener();
        }
    }
}

struct BatchGuard {
    outermost: bool,
}

impl BatchGuard {
    fn enter() -> Self {
        let outermost = PENDING.with(|pending| {
            let mut pending = pending.borrow_mut();
            if pending.is_some() {
                return false;
            }
            *pending = Some(Vec::new());
            true
        });
        Self { outermost }
    }

    fn take(&self) -> Vec<Listener> {
        if !self.outermost {
            return Vec::new();
        }
        PENDING
            .with(|pending| pending.borrow_mut().take())
            .unwrap_or_default()
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        // Only reached with a live queue when the batch body panicked.
        drop(self.take());
    }
}

/// Run `f` as one logical update: notifications are delivered once, after
/// `f` returns. Batches nest; only the outermost one flushes.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    let guard = BatchGuard::enter();
    let result = f();
    let queued = guard.take();
    drop(guard);
    for listener in queued {
        listener();
    }
    result
}

#[derive(Default)]
struct Listeners {
    next_id: AtomicU64,
    entries: Mutex<Vec<(ListenerId, Listener)>>,
}

impl Listeners {
    fn lock(&self) -> MutexGuard<'_, Vec<(ListenerId, Listener)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn add(&self, listener: Listener) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().push((id, listener));
        id
    }

    fn remove(&self, id: ListenerId) {
        self.lock().retain(|(entry, _)| *entry != id);
    }

    fn current(&self) -> Vec<Listener> {
        self.lock().iter().map(|(_, l)| Arc::clone(l)).collect()
    }

    fn clear(&self) {
        self.lock().clear();
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}

// ── Input cells ───────────────────────────────────────────────────────────────

struct VarInner<T> {
    value: Mutex<T>,
    version: AtomicU64,
    listeners: Listeners,
}

impl<T: Send> Source for VarInner<T> {
    fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    fn subscribe(&self, listener: Listener) -> ListenerId {
        self.listeners.add(listener)
    }

    fn unsubscribe(&self, id: ListenerId) {
        self.listeners.remove(id);
    }
}

/// Writable input cell. Clones are handles to the same cell.
pub struct Var<T> {
    inner: Arc<VarInner<T>>,
}

impl<T> Clone for Var<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + PartialEq + Send + 'static> Var<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(VarInner {
                value: Mutex::new(value),
                version: AtomicU64::new(0),
                listeners: Listeners::default(),
            }),
        }
    }

    #[must_use]
    pub fn get(&self) -> T {
        self.lock().clone()
    }

    /// Replace the value. Returns `false`, and notifies nobody, when the new
    /// value equals the current one.
    pub fn set(&self, value: T) -> bool {
        self.update(|_| value)
    }

    /// Replace the value with `f(current)` atomically with respect to other
    /// writers of this cell.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> bool {
        let listeners = {
            let mut current = self.lock();
            let next = f(&current);
            if next == *current {
                return false;
            }
            *current = next;
            self.inner.version.fetch_add(1, Ordering::AcqRel);
            self.inner.listeners.current()
        };
        dispatch(listeners);
        true
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.version()
    }

    pub fn on_change(&self, listener: impl Fn() + Send + Sync + 'static) -> ListenerId {
        self.inner.listeners.add(Arc::new(listener))
    }

    pub fn remove_listener(&self, id: ListenerId) {
        self.inner.listeners.remove(id);
    }

    /// Type-erased handle for use as a [`Derived`] dependency.
    #[must_use]
    pub fn source(&self) -> Arc<dyn Source> {
        Arc::clone(&self.inner) as Arc<dyn Source>
    }

    fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.value.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Derived cells ─────────────────────────────────────────────────────────────

struct Cached<T> {
    seen: Vec<u64>,
    value: T,
    /// Last `version` the listeners were told about.
    notified: u64,
}

struct DerivedInner<T> {
    deps: Vec<Arc<dyn Source>>,
    compute: Box<dyn Fn() -> T + Send + Sync>,
    cache: Mutex<Cached<T>>,
    version: AtomicU64,
    listeners: Listeners,
    subscriptions: Mutex<Vec<ListenerId>>,
}

impl<T: Clone + PartialEq + Send> DerivedInner<T> {
    fn dep_versions(&self) -> Vec<u64> {
        self.deps.iter().map(|dep| dep.version()).collect()
    }

    fn lock_cache(&self) -> MutexGuard<'_, Cached<T>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Revalidate the cache, bumping `version` when the value changed.
    /// Only called with the cache lock held.
    fn refresh(&self, cache: &mut Cached<T>) {
        let seen = self.dep_versions();
        if seen == cache.seen {
            return;
        }
        let value = (self.compute)();
        cache.seen = seen;
        if value != cache.value {
            cache.value = value;
            self.version.fetch_add(1, Ordering::AcqRel);
        }
    }

    fn get(&self) -> T {
        let mut cache = self.lock_cache();
        self.refresh(&mut cache);
        cache.value.clone()
    }

    /// Every dependency write ends up here, so comparing against `notified`
    /// also covers changes a concurrent or in-batch read already pulled into
    /// the cache.
    fn on_dependency_changed(&self) {
        let pending = {
            let mut cache = self.lock_cache();
            self.refresh(&mut cache);
            let version = self.version.load(Ordering::Acquire);
            let pending = version > cache.notified;
            cache.notified = version;
            pending
        };
        if pending {
            dispatch(self.listeners.current());
        }
    }

    fn detach(&self) {
        let ids: Vec<_> = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for (dep, id) in self.deps.iter().zip(ids) {
            dep.unsubscribe(id);
        }
        self.listeners.clear();
    }
}

impl<T: Clone + PartialEq + Send> Source for DerivedInner<T> {
    fn version(&self) -> u64 {
        let mut cache = self.lock_cache();
        self.refresh(&mut cache);
        self.version.load(Ordering::Acquire)
    }

    fn subscribe(&self, listener: Listener) -> ListenerId {
        self.listeners.add(listener)
    }

    fn unsubscribe(&self, id: ListenerId) {
        self.listeners.remove(id);
    }
}

impl<T> Drop for DerivedInner<T> {
    fn drop(&mut self) {
        let ids = std::mem::take(
            self.subscriptions
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for (dep, id) in self.deps.iter().zip(ids) {
            dep.unsubscribe(id);
        }
    }
}

/// Cell whose value is `compute()` over the current values of `deps`.
pub struct Derived<T> {
    inner: Arc<DerivedInner<T>>,
}

impl<T> Clone for Derived<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + PartialEq + Send + 'static> Derived<T> {
    /// Build a derived cell. `compute` must only read cells listed in `deps`.
    pub fn new(
        deps: Vec<Arc<dyn Source>>,
        compute: impl Fn() -> T + Send + Sync + 'static,
    ) -> Self {
        let seen = deps.iter().map(|dep| dep.version()).collect();
        let value = compute();
        let inner = Arc::new(DerivedInner {
            deps,
            compute: Box::new(compute),
            cache: Mutex::new(Cached {
                seen,
                value,
                notified: 0,
            }),
            version: AtomicU64::new(0),
            listeners: Listeners::default(),
            subscriptions: Mutex::new(Vec::new()),
        });

        let weak: Weak<DerivedInner<T>> = Arc::downgrade(&inner);
        let on_dep: Listener = Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.on_dependency_changed();
            }
        });
        let ids = inner
            .deps
            .iter()
            .map(|dep| dep.subscribe(Arc::clone(&on_dep)))
            .collect();
        *inner
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = ids;

        Self { inner }
    }

    #[must_use]
    pub fn get(&self) -> T {
        self.inner.get()
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        Source::version(self.inner.as_ref())
    }

    /// Register `listener`; it runs after every change of this cell's value.
    pub fn on_change(&self, listener: impl Fn() + Send + Sync + 'static) -> ListenerId {
        self.inner.listeners.add(Arc::new(listener))
    }

    pub fn remove_listener(&self, id: ListenerId) {
        self.inner.listeners.remove(id);
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    #[must_use]
    pub fn source(&self) -> Arc<dyn Source> {
        Arc::clone(&self.inner) as Arc<dyn Source>
    }

    /// Unhook from every dependency and drop all listeners. The cell keeps
    /// answering `get()` by recomputing on demand.
    pub fn dispose(&self) {
        self.inner.detach();
    }
}
