//! Resource wrapper normalizing plain values, paired-lifecycle resources and
//! asynchronous values behind one `get / close` contract.

use std::fmt;
use std::future::Future;

use futures::future::BoxFuture;
use parking_lot::Mutex;

use crate::error::{BoxError, DiError, DiResult};

/// Blocking teardown phase of a [`Resource`].
pub type Teardown = Box<dyn FnOnce() -> Result<(), BoxError> + Send>;

/// Asynchronous teardown phase of an [`AsyncResource`].
pub type AsyncTeardown = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), BoxError>> + Send>;

/// A value whose setup already ran and whose teardown must run exactly once.
///
/// # Examples
///
/// ```rust
/// use ferrous_inject::Resource;
///
/// struct Connection;
///
/// let resource = Resource::new(Connection, || {
///     // close the connection
///     Ok(())
/// });
/// let _connection: &Connection = resource.value();
/// ```
pub struct Resource<T> {
    value: T,
    teardown: Teardown,
}

impl<T> Resource<T> {
    /// Pairs a value with its teardown phase.
    pub fn new<F>(value: T, teardown: F) -> Self
    where
        F: FnOnce() -> Result<(), BoxError> + Send + 'static,
    {
        Self {
            value,
            teardown: Box::new(teardown),
        }
    }

    /// The value produced by the setup phase.
    pub fn value(&self) -> &T {
        &self.value
    }

    pub(crate) fn into_parts(self) -> (T, Teardown) {
        (self.value, self.teardown)
    }
}

/// A value paired with an asynchronous teardown phase.
pub struct AsyncResource<T> {
    value: T,
    teardown: AsyncTeardown,
}

impl<T> AsyncResource<T> {
    /// Pairs a value with its asynchronous teardown phase.
    pub fn new<F, Fut>(value: T, teardown: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        Self {
            value,
            teardown: Box::new(move || Box::pin(teardown())),
        }
    }

    /// The value produced by the setup phase.
    pub fn value(&self) -> &T {
        &self.value
    }
}

/// Raw output of a factory, before normalization.
pub enum Produced<T> {
    /// Plain value
    Value(T),
    /// One-shot paired-lifecycle resource
    Resource(Resource<T>),
    /// Asynchronous value
    Future(BoxFuture<'static, DiResult<T>>),
    /// Asynchronous paired-lifecycle resource
    AsyncResource(BoxFuture<'static, DiResult<AsyncResource<T>>>),
}

impl<T> fmt::Debug for Produced<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape = match self {
            Produced::Value(_) => "Value",
            Produced::Resource(_) => "Resource",
            Produced::Future(_) => "Future",
            Produced::AsyncResource(_) => "AsyncResource",
        };
        f.debug_tuple("Produced").field(&shape).finish()
    }
}

enum Release {
    Nothing,
    Blocking(Teardown),
    Async(AsyncTeardown),
}

struct ObjectState<T> {
    instance: Option<T>,
    release: Release,
}

/// Normalized handle over a produced value.
///
/// `get()` returns a clone of the materialized instance until the object is
/// released; afterwards it fails with [`DiError::Closed`]. The teardown of a
/// paired-lifecycle resource runs exactly once, and a failing teardown is
/// logged and swallowed because the value was already delivered.
///
/// # Examples
///
/// ```rust
/// use ferrous_inject::{DiError, Object, Produced, Resource};
///
/// let object = Object::create(Produced::Resource(Resource::new(7u32, || Ok(())))).unwrap();
/// assert_eq!(object.get().unwrap(), 7);
///
/// object.close().unwrap();
/// object.close().unwrap(); // no-op
/// assert!(matches!(object.get(), Err(DiError::Closed)));
/// ```
pub struct Object<T> {
    state: Mutex<ObjectState<T>>,
}

impl<T> Object<T>
where
    T: Clone + Send + 'static,
{
    fn with_parts(instance: T, release: Release) -> Self {
        Self {
            state: Mutex::new(ObjectState {
                instance: Some(instance),
                release,
            }),
        }
    }

    /// Normalizes `produced` on the blocking path.
    ///
    /// Asynchronous shapes are rejected with [`DiError::AsyncMode`].
    pub fn create(produced: Produced<T>) -> DiResult<Self> {
        match produced {
            Produced::Value(value) => Ok(Self::with_parts(value, Release::Nothing)),
            Produced::Resource(resource) => {
                let (value, teardown) = resource.into_parts();
                Ok(Self::with_parts(value, Release::Blocking(teardown)))
            }
            Produced::Future(_) | Produced::AsyncResource(_) => Err(DiError::AsyncMode(
                "created asynchronously; use `acreate()`",
            )),
        }
    }

    /// Normalizes `produced` on the async path, awaiting whichever setup applies.
    pub async fn acreate(produced: Produced<T>) -> DiResult<Self> {
        match produced {
            Produced::Future(future) => Ok(Self::with_parts(future.await?, Release::Nothing)),
            Produced::AsyncResource(setup) => {
                let resource = setup.await?;
                Ok(Self::with_parts(resource.value, Release::Async(resource.teardown)))
            }
            other => Self::create(other),
        }
    }

    /// Returns the materialized instance.
    pub fn get(&self) -> DiResult<T> {
        self.state.lock().instance.clone().ok_or(DiError::Closed)
    }

    /// Returns whether the instance has been released.
    pub fn is_closed(&self) -> bool {
        self.state.lock().instance.is_none()
    }

    /// Returns whether releasing this object requires the async path.
    pub fn is_async(&self) -> bool {
        matches!(self.state.lock().release, Release::Async(_))
    }

    /// Runs the teardown phase on the blocking path and releases the instance.
    pub fn close(&self) -> DiResult<()> {
        let release = {
            let mut state = self.state.lock();
            if matches!(state.release, Release::Async(_)) {
                return Err(DiError::AsyncMode("closed asynchronously; use `aclose()`"));
            }
            state.instance = None;
            std::mem::replace(&mut state.release, Release::Nothing)
        };

        if let Release::Blocking(teardown) = release {
            if let Err(err) = teardown() {
                tracing::warn!(error = %err, "Object closed with error");
            }
        }
        Ok(())
    }

    /// Runs the teardown phase on the async path and releases the instance.
    pub async fn aclose(&self) -> DiResult<()> {
        let release = {
            let mut state = self.state.lock();
            state.instance = None;
            std::mem::replace(&mut state.release, Release::Nothing)
        };

        let outcome = match release {
            Release::Nothing => Ok(()),
            Release::Blocking(teardown) => teardown(),
            Release::Async(teardown) => teardown().await,
        };
        if let Err(err) = outcome {
            tracing::warn!(error = %err, "Object closed with error");
        }
        Ok(())
    }
}

impl<T> fmt::Debug for Object<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        let release = match state.release {
            Release::Nothing => "none",
            Release::Blocking(_) => "blocking",
            Release::Async(_) => "async",
        };
        f.debug_struct("Object")
            .field("closed", &state.instance.is_none())
            .field("teardown", &release)
            .finish()
    }
}
