//! Transient policy: a fresh value on every resolution.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::{Provider, ProviderCore, ProviderId, Status};
use crate::context::{ambient, TransientList};
use crate::error::DiResult;
use crate::factory::Factory;
use crate::lifetime::Lifetime;

/// Provider invoking its factory on every resolution.
///
/// Inside an active [`Context`](crate::Context) each created value is
/// appended to the context's [`TransientList`] for this provider, so every
/// one of them is released when the context closes. The no-context rule is
/// the same as for [`Scoped`](crate::Scoped).
pub struct Transient<T> {
    core: ProviderCore<T>,
}

impl<T> Transient<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Wraps `factory` with the transient policy.
    pub fn new(factory: Factory<T>) -> Self {
        Self {
            core: ProviderCore::new(factory),
        }
    }
}

#[async_trait]
impl<T> Provider for Transient<T>
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
        Lifetime::Transient
    }

    fn status(&self) -> Status {
        self.core.status.get()
    }

    fn provide(&self) -> DiResult<T> {
        let Some(context) = ambient::current() else {
            return self.core.provide_detached();
        };

        let list = context.get_or_insert_with(self.core.id, TransientList::<T>::new)?;
        let object = Arc::new(self.core.create()?);
        list.push(object.clone());

        self.core.status.mark_running();
        object.get()
    }

    async fn aprovide(&self) -> DiResult<T> {
        let Some(context) = ambient::current() else {
            return self.core.aprovide_detached().await;
        };

        let list = context
            .aget_or_insert_with(self.core.id, TransientList::<T>::new)
            .await?;
        let object = Arc::new(self.core.acreate().await?);
        list.push(object.clone());

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

impl<T> fmt::Debug for Transient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transient")
            .field("id", &self.core.id)
            .field("name", &self.core.factory.name())
            .field("status", &self.core.status.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::error::DiError;
    use crate::object::{AsyncResource, Resource};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn every_value_is_tracked_and_released() {
        let closed = Arc::new(AtomicUsize::new(0));
        let counter = closed.clone();
        let provider = Transient::new(Factory::resource(move || {
            let counter = counter.clone();
            Ok(Resource::new(Arc::new(()), move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
        }));

        let ctx = Arc::new(Context::new());
        {
            let _entered = ambient::enter(Some(ctx.clone()));
            let a = provider.provide().unwrap();
            let b = provider.provide().unwrap();
            let c = provider.provide().unwrap();
            assert!(!Arc::ptr_eq(&a, &b) && !Arc::ptr_eq(&b, &c));
        }

        ctx.close().unwrap();
        assert_eq!(closed.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn failure_corrupts_the_provider() {
        let provider = Transient::<u8>::new(Factory::value(|| Err("broken".into())));
        let ctx = Arc::new(Context::new());
        let _entered = ambient::enter(Some(ctx.clone()));

        assert!(matches!(provider.provide(), Err(DiError::Construction { .. })));
        assert_eq!(provider.status(), Status::Corrupted);
    }

    #[tokio::test]
    async fn async_resource_without_context_is_refused() {
        let provider = Transient::new(Factory::async_resource(|| async {
            Ok(AsyncResource::new(1u8, || async { Ok(()) }))
        }));
        let err = provider.aprovide().await.unwrap_err();
        assert!(matches!(err, DiError::ScopeRequired { .. }));
    }

    #[tokio::test]
    async fn async_values_are_released_by_aclose() {
        let closed = Arc::new(AtomicUsize::new(0));
        let counter = closed.clone();
        let provider = Transient::new(Factory::async_resource(move || {
            let counter = counter.clone();
            async move {
                Ok(AsyncResource::new(1u8, move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }))
            }
        }));

        let ctx = Arc::new(Context::new());
        ambient::scope(ctx.clone(), async {
            provider.aprovide().await.unwrap();
            provider.aprovide().await.unwrap();
        })
        .await;

        assert!(matches!(ctx.close(), Err(DiError::AsyncMode(_))));
        ctx.aclose().await.unwrap();
        assert_eq!(closed.load(Ordering::SeqCst), 2);
    }
}
