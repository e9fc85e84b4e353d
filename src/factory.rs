//! Producer kinds fixed at registration.

use std::fmt;
use std::future::Future;

use futures::future::BoxFuture;

use crate::error::{BoxError, DiError, DiResult};
use crate::object::{AsyncResource, Produced, Resource};

type ValueFn<T> = Box<dyn Fn() -> Result<T, BoxError> + Send + Sync>;
type ResourceFn<T> = Box<dyn Fn() -> Result<Resource<T>, BoxError> + Send + Sync>;
type FutureFn<T> = Box<dyn Fn() -> BoxFuture<'static, Result<T, BoxError>> + Send + Sync>;
type AsyncResourceFn<T> =
    Box<dyn Fn() -> BoxFuture<'static, Result<AsyncResource<T>, BoxError>> + Send + Sync>;

enum Kind<T> {
    Value(ValueFn<T>),
    Resource(ResourceFn<T>),
    Future(FutureFn<T>),
    AsyncResource(AsyncResourceFn<T>),
}

/// Zero-argument callable wrapped by a provider.
///
/// The kind of a factory (plain, paired-lifecycle, asynchronous, or both) is
/// chosen by its constructor and never changes afterwards. Factory closures
/// report failures as [`BoxError`]; [`produce`](Factory::produce) turns them
/// into [`DiError::Construction`] naming the factory.
///
/// Dependencies of a factory are resolved from inside the closure, usually
/// through the [`Container`](crate::Container) or a captured provider. Such
/// resolutions see whatever context is active while the factory runs.
///
/// # Examples
///
/// ```rust
/// use ferrous_inject::{Factory, Resource};
///
/// struct Pool;
///
/// let plain = Factory::value(|| Ok(42u32));
/// assert!(!plain.is_resource() && !plain.is_async());
///
/// let pooled = Factory::resource(|| {
///     Ok(Resource::new(std::sync::Arc::new(Pool), || Ok(())))
/// })
/// .named("pool");
/// assert!(pooled.is_resource());
/// assert_eq!(pooled.name(), "pool");
/// ```
pub struct Factory<T> {
    name: String,
    kind: Kind<T>,
}

impl<T> Factory<T> {
    /// Overrides the display name used in errors and logs.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Display name of the factory.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the factory yields a paired-lifecycle resource.
    pub fn is_resource(&self) -> bool {
        matches!(self.kind, Kind::Resource(_) | Kind::AsyncResource(_))
    }

    /// Whether the factory yields an asynchronous value.
    pub fn is_async(&self) -> bool {
        matches!(self.kind, Kind::Future(_) | Kind::AsyncResource(_))
    }
}

impl<T: 'static> Factory<T> {
    fn with_kind(kind: Kind<T>) -> Self {
        Self {
            name: std::any::type_name::<T>().to_string(),
            kind,
        }
    }

    /// Factory returning a plain value.
    pub fn value<F>(factory: F) -> Self
    where
        F: Fn() -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Self::with_kind(Kind::Value(Box::new(factory)))
    }

    /// Factory returning a one-shot paired-lifecycle resource.
    pub fn resource<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Resource<T>, BoxError> + Send + Sync + 'static,
    {
        Self::with_kind(Kind::Resource(Box::new(factory)))
    }

    /// Factory returning an asynchronous value.
    pub fn future<F, Fut>(factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        Self::with_kind(Kind::Future(Box::new(move || Box::pin(factory()))))
    }

    /// Factory returning an asynchronous paired-lifecycle resource.
    pub fn async_resource<F, Fut>(factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<AsyncResource<T>, BoxError>> + Send + 'static,
    {
        Self::with_kind(Kind::AsyncResource(Box::new(move || Box::pin(factory()))))
    }

    /// Invokes the factory.
    ///
    /// Asynchronous kinds return immediately; their failure surfaces when
    /// the returned future is awaited.
    pub fn produce(&self) -> DiResult<Produced<T>> {
        let name = self.name.as_str();
        match &self.kind {
            Kind::Value(factory) => factory()
                .map(Produced::Value)
                .map_err(|err| DiError::construction(name, err)),
            Kind::Resource(factory) => factory()
                .map(Produced::Resource)
                .map_err(|err| DiError::construction(name, err)),
            Kind::Future(factory) => {
                let future = factory();
                let name = self.name.clone();
                Ok(Produced::Future(Box::pin(async move {
                    future.await.map_err(|err| DiError::construction(&name, err))
                })))
            }
            Kind::AsyncResource(factory) => {
                let future = factory();
                let name = self.name.clone();
                Ok(Produced::AsyncResource(Box::pin(async move {
                    future.await.map_err(|err| DiError::construction(&name, err))
                })))
            }
        }
    }
}

impl<T> fmt::Debug for Factory<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            Kind::Value(_) => "value",
            Kind::Resource(_) => "resource",
            Kind::Future(_) => "future",
            Kind::AsyncResource(_) => "async_resource",
        };
        f.debug_struct("Factory")
            .field("name", &self.name)
            .field("kind", &kind)
            .finish()
    }
}
