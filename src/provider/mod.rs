//! Providers: a factory plus a sharing policy.
//!
//! Every provider implements [`Provider`] for its concrete output type. The
//! registry stores providers type-erased as [`AnyProvider`], which every
//! [`Provider`] implements through a blanket impl.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{DiError, DiResult};
use crate::factory::Factory;
use crate::lifetime::Lifetime;
use crate::object::{Object, Produced};

pub mod scoped;
pub mod singleton;
pub mod transient;

pub use scoped::Scoped;
pub use singleton::Singleton;
pub use transient::Transient;

/// Type-erased resolved value.
pub type AnyValue = Arc<dyn Any + Send + Sync>;

static NEXT_PROVIDER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a provider.
///
/// Execution contexts key their scope-local data by this identity, so two
/// providers wrapping the same factory never share data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProviderId(u64);

impl ProviderId {
    /// Allocates a fresh identity.
    pub fn next() -> Self {
        ProviderId(NEXT_PROVIDER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:06x}", self.0)
    }
}

/// Observable lifecycle state of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Status {
    /// Never resolved, or reset since
    Idle = 0,
    /// Resolved successfully at least once
    Running = 1,
    /// A resolution failed; cleared only by a reset
    Corrupted = 2,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Idle => "idle",
            Status::Running => "running",
            Status::Corrupted => "corrupted",
        };
        f.write_str(name)
    }
}

pub(crate) struct StatusCell(AtomicU8);

impl StatusCell {
    fn new() -> Self {
        StatusCell(AtomicU8::new(Status::Idle as u8))
    }

    pub(crate) fn get(&self) -> Status {
        match self.0.load(Ordering::Acquire) {
            0 => Status::Idle,
            1 => Status::Running,
            _ => Status::Corrupted,
        }
    }

    /// `Idle -> Running`; any other state is left alone.
    pub(crate) fn mark_running(&self) {
        let _ = self.0.compare_exchange(
            Status::Idle as u8,
            Status::Running as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub(crate) fn mark_corrupted(&self) {
        self.0.store(Status::Corrupted as u8, Ordering::Release);
    }

    pub(crate) fn mark_idle(&self) {
        self.0.store(Status::Idle as u8, Ordering::Release);
    }
}

/// A factory wrapped with a sharing policy.
///
/// `provide` is the blocking resolution path and `aprovide` the non-blocking
/// one. Both read the active [`Context`](crate::Context) ambiently; see
/// [`ambient`](crate::ambient).
///
/// # Examples
///
/// ```rust
/// use ferrous_inject::{Factory, Provider, Singleton, Status};
///
/// let settings = Singleton::new(Factory::value(|| Ok(String::from("debug=true"))));
/// assert_eq!(settings.status(), Status::Idle);
///
/// assert_eq!(settings.provide().unwrap(), "debug=true");
/// assert_eq!(settings.status(), Status::Running);
///
/// settings.reset().unwrap();
/// assert_eq!(settings.status(), Status::Idle);
/// ```
#[async_trait]
pub trait Provider: Send + Sync + 'static {
    /// The resolved value type.
    type Output: Clone + Send + Sync + 'static;

    /// Identity used to key scope-local data.
    fn id(&self) -> ProviderId;

    /// Display name, taken from the factory.
    fn name(&self) -> &str;

    /// Sharing policy.
    fn lifetime(&self) -> Lifetime;

    /// Current lifecycle state.
    fn status(&self) -> Status;

    /// Resolves on the blocking path.
    fn provide(&self) -> DiResult<Self::Output>;

    /// Resolves on the non-blocking path.
    async fn aprovide(&self) -> DiResult<Self::Output>;

    /// Releases held values on the blocking path and returns to [`Status::Idle`].
    fn reset(&self) -> DiResult<()>;

    /// Releases held values on the non-blocking path and returns to [`Status::Idle`].
    async fn areset(&self) -> DiResult<()>;
}

/// Object-safe, type-erased view of a [`Provider`].
///
/// Method names carry a `provider_` or `_any` affix so they never clash with
/// [`Provider`] methods when both traits are in scope.
#[async_trait]
pub trait AnyProvider: Send + Sync + 'static {
    /// See [`Provider::id`].
    fn provider_id(&self) -> ProviderId;

    /// See [`Provider::name`].
    fn provider_name(&self) -> &str;

    /// See [`Provider::lifetime`].
    fn provider_lifetime(&self) -> Lifetime;

    /// See [`Provider::status`].
    fn provider_status(&self) -> Status;

    /// Resolves on the blocking path, type-erased.
    fn provide_any(&self) -> DiResult<AnyValue>;

    /// Resolves on the non-blocking path, type-erased.
    async fn aprovide_any(&self) -> DiResult<AnyValue>;

    /// See [`Provider::reset`].
    fn reset_any(&self) -> DiResult<()>;

    /// See [`Provider::areset`].
    async fn areset_any(&self) -> DiResult<()>;

    /// Upcasts for recovery of the concrete provider.
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

#[async_trait]
impl<P: Provider> AnyProvider for P {
    fn provider_id(&self) -> ProviderId {
        Provider::id(self)
    }

    fn provider_name(&self) -> &str {
        Provider::name(self)
    }

    fn provider_lifetime(&self) -> Lifetime {
        Provider::lifetime(self)
    }

    fn provider_status(&self) -> Status {
        Provider::status(self)
    }

    fn provide_any(&self) -> DiResult<AnyValue> {
        let value = Provider::provide(self)?;
        Ok(Arc::new(value))
    }

    async fn aprovide_any(&self) -> DiResult<AnyValue> {
        let value = Provider::aprovide(self).await?;
        Ok(Arc::new(value))
    }

    fn reset_any(&self) -> DiResult<()> {
        Provider::reset(self)
    }

    async fn areset_any(&self) -> DiResult<()> {
        Provider::areset(self).await
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl fmt::Debug for dyn AnyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}]({})",
            self.provider_lifetime(),
            self.provider_id(),
            self.provider_name()
        )
    }
}

/// State shared by every policy: identity, factory and status.
pub(crate) struct ProviderCore<T> {
    pub(crate) id: ProviderId,
    pub(crate) factory: Factory<T>,
    pub(crate) status: StatusCell,
}

impl<T> ProviderCore<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(factory: Factory<T>) -> Self {
        Self {
            id: ProviderId::next(),
            factory,
            status: StatusCell::new(),
        }
    }

    pub(crate) fn name(&self) -> &str {
        self.factory.name()
    }

    /// Marks the provider corrupted if `result` failed.
    pub(crate) fn track<R>(&self, result: DiResult<R>) -> DiResult<R> {
        if result.is_err() {
            self.status.mark_corrupted();
        }
        result
    }

    /// Invokes the factory and normalizes the result on the blocking path.
    pub(crate) fn create(&self) -> DiResult<Object<T>> {
        let produced = self.track(self.factory.produce())?;
        self.track(Object::create(produced))
    }

    /// Invokes the factory and normalizes the result on the non-blocking path.
    pub(crate) async fn acreate(&self) -> DiResult<Object<T>> {
        let produced = self.track(self.factory.produce())?;
        self.track(Object::acreate(produced).await)
    }

    fn scope_required(&self) -> DiError {
        self.status.mark_corrupted();
        DiError::ScopeRequired {
            provider: self.name().to_string(),
        }
    }

    /// Resolution of a scoped or transient provider with no active context.
    ///
    /// Paired-lifecycle factories are refused without being invoked; plain
    /// factories are invoked directly and nothing is tracked.
    pub(crate) fn provide_detached(&self) -> DiResult<T> {
        if self.factory.is_resource() {
            return Err(self.scope_required());
        }
        if self.factory.is_async() {
            return Err(DiError::AsyncMode("resolved asynchronously; use `aprovide()`"));
        }
        match self.track(self.factory.produce())? {
            Produced::Value(value) => {
                self.status.mark_running();
                Ok(value)
            }
            _ => Err(DiError::AsyncMode("resolved asynchronously; use `aprovide()`")),
        }
    }

    /// Non-blocking counterpart of [`provide_detached`](Self::provide_detached).
    pub(crate) async fn aprovide_detached(&self) -> DiResult<T> {
        if self.factory.is_resource() {
            return Err(self.scope_required());
        }
        let value = match self.track(self.factory.produce())? {
            Produced::Value(value) => value,
            Produced::Future(future) => self.track(future.await)?,
            Produced::Resource(_) | Produced::AsyncResource(_) => return Err(self.scope_required()),
        };
        self.status.mark_running();
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = ProviderId::next();
        let b = ProviderId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn corrupted_is_sticky_until_idle() {
        let status = StatusCell::new();
        assert_eq!(status.get(), Status::Idle);

        status.mark_running();
        assert_eq!(status.get(), Status::Running);

        status.mark_corrupted();
        status.mark_running();
        assert_eq!(status.get(), Status::Corrupted);

        status.mark_idle();
        assert_eq!(status.get(), Status::Idle);
    }

    #[test]
    fn detached_resource_is_never_invoked() {
        let calls = Arc::new(AtomicU64::new(0));
        let counter = calls.clone();
        let core = ProviderCore::new(Factory::resource(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(crate::object::Resource::new(1u8, || Ok(())))
        }));

        let err = core.provide_detached().unwrap_err();
        assert!(matches!(err, DiError::ScopeRequired { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(core.status.get(), Status::Corrupted);
    }

    #[tokio::test]
    async fn detached_future_is_awaited() {
        let core = ProviderCore::new(Factory::future(|| async { Ok(7u8) }));
        assert!(matches!(core.provide_detached(), Err(DiError::AsyncMode(_))));
        assert_eq!(core.aprovide_detached().await.unwrap(), 7);
        assert_eq!(core.status.get(), Status::Running);
    }
}
