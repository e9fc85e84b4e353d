//! Execution contexts and the scope-local data they own.
//!
//! A [`Context`] maps provider identity to that provider's scope-local data
//! and releases everything it holds when closed. The active context of a call
//! chain is ambient: see [`ambient`].

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;

use crate::error::{DiError, DiResult};
use crate::lock::Lock;
use crate::provider::ProviderId;

pub mod ambient;
mod data;

pub use data::{ScopedSlot, TransientList};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Scope-local data owned by a [`Context`] on behalf of one provider.
#[async_trait]
pub trait ContextData: Send + Sync + 'static {
    /// Releases every wrapper held by this entry on the blocking path.
    fn close(&self) -> DiResult<()>;

    /// Releases every wrapper held by this entry on the async path.
    async fn aclose(&self) -> DiResult<()>;

    /// Returns whether every wrapper held by this entry is released.
    fn is_released(&self) -> bool;

    /// Returns whether some wrapper held by this entry can only be released
    /// on the async path.
    fn needs_async(&self) -> bool;

    /// Upcasts for typed recovery of the entry.
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Execution context: per-provider scope-local data for one call chain.
///
/// Structural access goes through the context's [`Lock`]; the create-if-absent
/// helpers hold it across the read and the insert and release it before the
/// caller creates the slot's value.
///
/// # Examples
///
/// ```rust
/// use ferrous_inject::{Container, Context, Factory, Provider, ambient};
/// use std::sync::Arc;
///
/// let container = Container::new();
/// let request_id = container
///     .add_scoped("request_id", Factory::value(|| Ok(Arc::new(42u64))), false)
///     .unwrap();
///
/// let ctx = Arc::new(Context::new());
/// {
///     let _entered = ambient::enter(Some(ctx.clone()));
///     let a = request_id.provide().unwrap();
///     let b = request_id.provide().unwrap();
///     assert!(Arc::ptr_eq(&a, &b));
/// }
/// assert!(ctx.contains(request_id.id()));
/// ctx.close().unwrap();
/// ```
pub struct Context {
    id: u64,
    lock: Lock,
    data: Mutex<HashMap<ProviderId, Arc<dyn ContextData>>>,
    closed: AtomicBool,
}

impl Context {
    /// Creates an empty context.
    pub fn new() -> Self {
        let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(context = id, "execution context opened");
        Self {
            id,
            lock: Lock::new(),
            data: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Process-unique identifier of this context.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The lock guarding structural mutation of this context.
    pub fn lock(&self) -> &Lock {
        &self.lock
    }

    /// Returns the entry stored for `provider`, if any.
    pub fn get(&self, provider: ProviderId) -> Option<Arc<dyn ContextData>> {
        self.data.lock().get(&provider).cloned()
    }

    /// Stores `data` for `provider`, replacing any previous entry.
    pub fn set(&self, provider: ProviderId, data: Arc<dyn ContextData>) {
        self.data.lock().insert(provider, data);
    }

    /// Returns whether an entry exists for `provider`.
    pub fn contains(&self, provider: ProviderId) -> bool {
        self.data.lock().contains_key(&provider)
    }

    /// Number of providers with data in this context.
    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    /// Returns whether no provider has data in this context.
    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }

    /// Returns the entry for `provider`, creating it with `make` if absent.
    ///
    /// Fails with [`DiError::Closed`] once the context has been closed.
    /// Blocks on the context lock.
    pub fn get_or_insert_with<D, F>(&self, provider: ProviderId, make: F) -> DiResult<Arc<D>>
    where
        D: ContextData,
        F: FnOnce() -> D,
    {
        let _guard = self.lock.lock();
        self.entry(provider, make)
    }

    /// Returns the entry for `provider`, creating it with `make` if absent.
    ///
    /// Suspends on the context lock.
    pub async fn aget_or_insert_with<D, F>(&self, provider: ProviderId, make: F) -> DiResult<Arc<D>>
    where
        D: ContextData,
        F: FnOnce() -> D,
    {
        let _guard = self.lock.lock_async().await;
        self.entry(provider, make)
    }

    fn entry<D, F>(&self, provider: ProviderId, make: F) -> DiResult<Arc<D>>
    where
        D: ContextData,
        F: FnOnce() -> D,
    {
        let entry = {
            let mut data = self.data.lock();
            if self.is_closed() {
                return Err(DiError::Closed);
            }
            data.entry(provider)
                .or_insert_with(|| Arc::new(make()) as Arc<dyn ContextData>)
                .clone()
        };
        entry
            .as_any()
            .downcast::<D>()
            .map_err(|_| DiError::TypeMismatch(std::any::type_name::<D>()))
    }

    fn entries(&self) -> Vec<Arc<dyn ContextData>> {
        self.data.lock().values().cloned().collect()
    }

    /// Releases every entry on the blocking path.
    ///
    /// Every entry is attempted; the first failure is returned.
    pub fn close(&self) -> DiResult<()> {
        self.closed.store(true, Ordering::Release);
        let mut first_error = None;
        for entry in self.entries() {
            if let Err(err) = entry.close() {
                first_error.get_or_insert(err);
            }
        }
        tracing::debug!(context = self.id, "execution context closed");
        first_error.map_or(Ok(()), Err)
    }

    /// Releases every entry on the async path, concurrently.
    ///
    /// Every entry is attempted; the first failure is returned.
    pub async fn aclose(&self) -> DiResult<()> {
        self.closed.store(true, Ordering::Release);
        let entries = self.entries();
        let results = join_all(entries.iter().map(|entry| entry.aclose())).await;
        tracing::debug!(context = self.id, "execution context closed");
        results.into_iter().collect::<DiResult<Vec<()>>>().map(|_| ())
    }

    /// Returns whether some entry can only be released by [`aclose`](Self::aclose).
    pub fn needs_async(&self) -> bool {
        self.entries().iter().any(|entry| entry.needs_async())
    }

    /// Returns whether `close` or `aclose` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("entries", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        let leaked = self.data.get_mut().values().filter(|entry| !entry.is_released()).count();
        if leaked > 0 {
            tracing::warn!(
                context = self.id,
                leaked,
                "execution context dropped with unreleased objects"
            );
        }
    }
}
