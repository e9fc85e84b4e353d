//! Scoped policy: one value per execution context.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::{Provider, ProviderCore, ProviderId, Status};
use crate::context::{ambient, ScopedSlot};
use crate::error::DiResult;
use crate::factory::Factory;
use crate::lifetime::Lifetime;

/// Provider creating at most one value per active [`Context`](crate::Context).
///
/// The value is cached in a [`ScopedSlot`] owned by the context and released
/// when the context closes. With no active context, a plain factory is
/// invoked directly and its result is not cached; a paired-lifecycle factory
/// is refused with [`DiError::ScopeRequired`](crate::DiError::ScopeRequired).
///
/// # Examples
///
/// ```rust
/// use ferrous_inject::{ambient, Context, Factory, Provider, Scoped};
/// use std::sync::Arc;
///
/// let session = Scoped::new(Factory::value(|| Ok(Arc::new(String::from("session")))));
///
/// let first = Arc::new(Context::new());
/// let second = Arc::new(Context::new());
///
/// let (a, b) = {
///     let _entered = ambient::enter(Some(first.clone()));
///     (session.provide().unwrap(), session.provide().unwrap())
/// };
/// let c = {
///     let _entered = ambient::enter(Some(second.clone()));
///     session.provide().unwrap()
/// };
///
/// assert!(Arc::ptr_eq(&a, &b));
/// assert!(!Arc::ptr_eq(&a, &c));
/// first.close().unwrap();
/// second.close().unwrap();
/// ```
pub struct Scoped<T> {
    core: ProviderCore<T>,
}

impl<T> Scoped<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Wraps `factory` with the scoped policy.
    pub fn new(factory: Factory<T>) -> Self {
        Self {
            core: ProviderCore::new(factory),
        }
    }
}

#[async_trait]
impl<T> Provider for Scoped<T>
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
        Lifetime::Scoped
    }

    fn status(&self) -> Status {
        self.core.status.get()
    }

    fn provide(&self) -> DiResult<T> {
        let Some(context) = ambient::current() else {
            return self.core.provide_detached();
        };

        let slot = context.get_or_insert_with(self.core.id, ScopedSlot::<T>::new)?;
        let object = {
            let _guard = slot.lock().lock();
            match slot.get() {
                Some(object) => object,
                None => {
                    let object = Arc::new(self.core.create()?);
                    slot.set(object.clone());
                    object
                }
            }
        };

        self.core.status.mark_running();
        object.get()
    }

    async fn aprovide(&self) -> DiResult<T> {
        let Some(context) = ambient::current() else {
            return self.core.aprovide_detached().await;
        };

        let slot = context
            .aget_or_insert_with(self.core.id, ScopedSlot::<T>::new)
            .await?;
        let object = {
            let _guard = slot.lock().lock_async().await;
            match slot.get() {
                Some(object) => object,
                None => {
                    let object = Arc::new(self.core.acreate().await?);
                    slot.set(object.clone());
                    object
                }
            }
        };

        self.core.status.mark_running();
        object.get()
    }

    fn reset(&self) -> DiResult<()> {
        self.core.status.mark_idle();
        Ok(())
    }

    async fn areset(&self) -> DiResult<()> {
        self.core.status.mark_idle();
        Ok(())
    }
}

impl<T> fmt::Debug for Scoped<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scoped")
            .field("id", &self.core.id)
            .field("name", &self.core.factory.name())
            .field("status", &self.core.status.get())
            .finish()
    }
}
