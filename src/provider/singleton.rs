//! Singleton policy: one value per provider, until reset.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Provider, ProviderCore, ProviderId, Status};
use crate::context::{ambient, Context};
use crate::error::{DiError, DiResult};
use crate::factory::Factory;
use crate::lifetime::Lifetime;
use crate::lock::Lock;
use crate::object::Object;

struct Instance<T> {
    object: Arc<Object<T>>,
    context: Arc<Context>,
}

/// Provider creating its value once and returning it until reset.
///
/// The factory runs with a private [`Context`] active, so any scoped or
/// transient dependency it resolves lives in that context. The context is
/// retained next to the value and closed on reset, which makes such
/// dependencies live exactly as long as the singleton does.
///
/// Concurrent first resolutions are serialized by the provider's own lock;
/// the factory runs once.
///
/// # Examples
///
/// ```rust
/// use ferrous_inject::{Factory, Provider, Resource, Singleton};
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// let closed = Arc::new(AtomicBool::new(false));
/// let flag = closed.clone();
/// let pool = Singleton::new(Factory::resource(move || {
///     let flag = flag.clone();
///     Ok(Resource::new(Arc::new(String::from("pool")), move || {
///         flag.store(true, Ordering::SeqCst);
///         Ok(())
///     }))
/// }));
///
/// let a = pool.provide().unwrap();
/// let b = pool.provide().unwrap();
/// assert!(Arc::ptr_eq(&a, &b));
///
/// pool.reset().unwrap();
/// assert!(closed.load(Ordering::SeqCst));
/// ```
pub struct Singleton<T> {
    core: ProviderCore<T>,
    lock: Lock,
    instance: Mutex<Option<Instance<T>>>,
}

impl<T> Singleton<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Wraps `factory` with the singleton policy.
    pub fn new(factory: Factory<T>) -> Self {
        Self {
            core: ProviderCore::new(factory),
            lock: Lock::new(),
            instance: Mutex::new(None),
        }
    }

    /// Returns whether a value is currently held.
    pub fn is_initialized(&self) -> bool {
        self.instance.lock().is_some()
    }

    /// The private context the current value was constructed in.
    pub fn context(&self) -> Option<Arc<Context>> {
        self.instance.lock().as_ref().map(|instance| instance.context.clone())
    }

    fn object(&self) -> Option<Arc<Object<T>>> {
        self.instance.lock().as_ref().map(|instance| instance.object.clone())
    }

    fn store(&self, object: Object<T>, context: Arc<Context>) -> Arc<Object<T>> {
        let object = Arc::new(object);
        *self.instance.lock() = Some(Instance {
            object: object.clone(),
            context,
        });
        self.core.status.mark_running();
        tracing::debug!(provider = %self.core.id, name = self.core.name(), "singleton constructed");
        object
    }

    fn construct(&self) -> DiResult<Arc<Object<T>>> {
        let context = Arc::new(Context::new());
        let created = {
            let _entered = ambient::enter(Some(context.clone()));
            self.core.create()
        };
        match created {
            Ok(object) => Ok(self.store(object, context)),
            Err(err) => {
                if let Err(close_err) = context.close() {
                    tracing::warn!(error = %close_err, "failed to release a singleton's construction context");
                }
                Err(err)
            }
        }
    }

    async fn aconstruct(&self) -> DiResult<Arc<Object<T>>> {
        let context = Arc::new(Context::new());
        let created = ambient::scope(context.clone(), self.core.acreate()).await;
        match created {
            Ok(object) => Ok(self.store(object, context)),
            Err(err) => {
                if let Err(close_err) = context.aclose().await {
                    tracing::warn!(error = %close_err, "failed to release a singleton's construction context");
                }
                Err(err)
            }
        }
    }
}

#[async_trait]
impl<T> Provider for Singleton<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Output = T;

    fn id(&self) -> ProviderId {
        self.core.id
    }

    fn name(&self) -> &str {
        self.core.name()
    }

    fn lifetime(&self) -> Lifetime {
        Lifetime::Singleton
    }

    fn status(&self) -> Status {
        self.core.status.get()
    }

    fn provide(&self) -> DiResult<T> {
        let object = {
            let _guard = self.lock.lock();
            match self.object() {
                Some(object) => object,
                None => self.construct()?,
            }
        };
        object.get()
    }

    async fn aprovide(&self) -> DiResult<T> {
        let object = {
            let _guard = self.lock.lock_async().await;
            match self.object() {
                Some(object) => object,
                None => self.aconstruct().await?,
            }
        };
        object.get()
    }

    fn reset(&self) -> DiResult<()> {
        let _guard = self.lock.lock();
        let pending_async = self
            .instance
            .lock()
            .as_ref()
            .map_or(false, |instance| instance.object.is_async() || instance.context.needs_async());
        if pending_async {
            // Nothing is released; `areset` still owns the whole instance
            return Err(DiError::AsyncMode("reset asynchronously; use `areset()`"));
        }
        let taken = self.instance.lock().take();
        if let Some(instance) = taken {
            instance.object.close()?;
            instance.context.close()?;
        }
        self.core.status.mark_idle();
        tracing::debug!(provider = %self.core.id, name = self.core.name(), "singleton reset");
        Ok(())
    }

    async fn areset(&self) -> DiResult<()> {
        let _guard = self.lock.lock_async().await;
        let taken = self.instance.lock().take();
        if let Some(instance) = taken {
            instance.object.aclose().await?;
            instance.context.aclose().await?;
        }
        self.core.status.mark_idle();
        tracing::debug!(provider = %self.core.id, name = self.core.name(), "singleton reset");
        Ok(())
    }
}

impl<T> fmt::Debug for Singleton<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Singleton")
            .field("id", &self.core.id)
            .field("name", &self.core.factory.name())
            .field("status", &self.core.status.get())
            .finish()
    }
}

impl<T> Drop for Singleton<T> {
    fn drop(&mut self) {
        if self.instance.get_mut().is_some() {
            tracing::warn!(
                provider = %self.core.id,
                name = self.core.factory.name(),
                "singleton dropped while still running; call reset() to release it"
            );
        }
    }
}
