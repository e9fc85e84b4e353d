//! Scope-local data records: single-slot and append-only list.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;

use super::ContextData;
use crate::error::DiResult;
use crate::lock::Lock;
use crate::object::Object;

/// Single-slot cache used by scoped providers.
///
/// The slot's own [`Lock`] serializes "create if absent" so that at most one
/// value is created per context.
pub struct ScopedSlot<T> {
    lock: Lock,
    object: Mutex<Option<Arc<Object<T>>>>,
}

impl<T> ScopedSlot<T> {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self {
            lock: Lock::new(),
            object: Mutex::new(None),
        }
    }

    /// The lock guarding creation of the slot's value.
    pub fn lock(&self) -> &Lock {
        &self.lock
    }

    /// The wrapper stored in the slot, if created.
    pub fn get(&self) -> Option<Arc<Object<T>>> {
        self.object.lock().clone()
    }

    /// Stores the wrapper.
    pub fn set(&self, object: Arc<Object<T>>) {
        *self.object.lock() = Some(object);
    }
}

impl<T> Default for ScopedSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for ScopedSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedSlot")
            .field("filled", &self.object.lock().is_some())
            .finish()
    }
}

#[async_trait]
impl<T> ContextData for ScopedSlot<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn close(&self) -> DiResult<()> {
        match self.get() {
            Some(object) => object.close(),
            None => Ok(()),
        }
    }

    async fn aclose(&self) -> DiResult<()> {
        match self.get() {
            Some(object) => object.aclose().await,
            None => Ok(()),
        }
    }

    fn is_released(&self) -> bool {
        self.get().map_or(true, |object| object.is_closed())
    }

    fn needs_async(&self) -> bool {
        self.get().map_or(false, |object| object.is_async())
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Append-only list used by transient providers.
///
/// Every resolution inside the context appends a fresh wrapper; the list
/// exists only so that all of them are released when the context closes.
pub struct TransientList<T> {
    objects: Mutex<Vec<Arc<Object<T>>>>,
}

impl<T> TransientList<T> {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(Vec::new()),
        }
    }

    /// Tracks another wrapper.
    pub fn push(&self, object: Arc<Object<T>>) {
        self.objects.lock().push(object);
    }

    /// Number of tracked wrappers.
    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    /// Returns whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.objects.lock().is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<Object<T>>> {
        self.objects.lock().clone()
    }
}

impl<T> Default for TransientList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for TransientList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransientList").field("len", &self.len()).finish()
    }
}

#[async_trait]
impl<T> ContextData for TransientList<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn close(&self) -> DiResult<()> {
        let mut first_error = None;
        for object in self.snapshot() {
            if let Err(err) = object.close() {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn aclose(&self) -> DiResult<()> {
        let objects = self.snapshot();
        let results = join_all(objects.iter().map(|object| object.aclose())).await;
        results.into_iter().collect::<DiResult<Vec<()>>>().map(|_| ())
    }

    fn is_released(&self) -> bool {
        self.objects.lock().iter().all(|object| object.is_closed())
    }

    fn needs_async(&self) -> bool {
        self.objects.lock().iter().any(|object| object.is_async())
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
