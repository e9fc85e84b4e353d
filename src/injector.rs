//! Resolution engine: wraps target callables so their dependencies are
//! resolved from a [`Container`] inside an execution context.
//!
//! A target declares its parameters with a [`Signature`]. When the wrapped
//! target is called, explicitly supplied arguments are kept, parameters with
//! defaults take their default, and every other parameter is resolved from
//! the provider bound under its key. The call then runs inside an execution
//! context: the active one when context reuse is enabled, a fresh one that is
//! closed when the call finishes otherwise.
//!
//! Four call shapes are supported:
//!
//! | Shape | Wrapper | Result of `call` |
//! |---|---|---|
//! | plain | [`InjectedFn`] | the target's value |
//! | paired-lifecycle | [`InjectedResource`] | a [`Managed`] value released by `close` or drop |
//! | asynchronous | [`InjectedAsync`] | a future of the target's value |
//! | asynchronous sequence | [`InjectedStream`] | a stream of the target's items |

use std::any::type_name;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{ready, Context as TaskContext, Poll};

use futures::future::{self, join_all, BoxFuture};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use parking_lot::Mutex;

use crate::config::InjectorConfig;
use crate::container::Container;
use crate::context::{ambient, Context};
use crate::error::{DiError, DiResult};
use crate::key::{key_of_type, Key};
use crate::object::{Object, Produced, Resource};
use crate::provider::{AnyProvider, AnyValue};

#[derive(Clone)]
enum Source {
    Key(Key),
    Default(AnyValue),
}

#[derive(Clone)]
struct Param {
    name: String,
    source: Source,
}

/// Declared parameters of an injection target.
///
/// Clones share their injection state: a signature (or any clone of it) can
/// be handed to an `inject*` method once.
///
/// # Examples
///
/// ```rust
/// use ferrous_inject::Signature;
///
/// struct Database;
///
/// let signature = Signature::new("create_user")
///     .param::<Database>("db")
///     .param_keyed("clock", "utc_clock")
///     .param_default("retries", 3u32);
///
/// assert_eq!(signature.target(), "create_user");
/// assert_eq!(signature.params().collect::<Vec<_>>(), ["db", "clock", "retries"]);
/// ```
#[derive(Clone)]
pub struct Signature {
    target: Arc<str>,
    params: Arc<Vec<Param>>,
    injected: Arc<AtomicBool>,
}

impl Signature {
    /// Starts a signature for the target named `target`.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: Arc::from(target.into()),
            params: Arc::new(Vec::new()),
            injected: Arc::new(AtomicBool::new(false)),
        }
    }

    fn push(mut self, name: impl Into<String>, source: Source) -> Self {
        Arc::make_mut(&mut self.params).push(Param {
            name: name.into(),
            source,
        });
        self
    }

    /// Declares a parameter resolved by the type key of `T`.
    pub fn param<T: ?Sized + 'static>(self, name: impl Into<String>) -> Self {
        self.push(name, Source::Key(key_of_type::<T>()))
    }

    /// Declares a parameter resolved by an explicit key.
    pub fn param_keyed(self, name: impl Into<String>, key: impl Into<Key>) -> Self {
        self.push(name, Source::Key(key.into()))
    }

    /// Declares a parameter with a default value; it is never resolved.
    pub fn param_default<T: Send + Sync + 'static>(self, name: impl Into<String>, value: T) -> Self {
        self.push(name, Source::Default(Arc::new(value)))
    }

    /// Name of the target, used in error messages.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Declared parameter names, in declaration order.
    pub fn params(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|param| param.name.as_str())
    }

    /// Returns whether this signature has been handed to an `inject*` method.
    pub fn is_injected(&self) -> bool {
        self.injected.load(Ordering::Acquire)
    }

    fn declares(&self, name: &str) -> bool {
        self.params.iter().any(|param| param.name == name)
    }

    fn claim(&self) -> DiResult<()> {
        if self.injected.swap(true, Ordering::AcqRel) {
            return Err(DiError::AlreadyInjected(self.target.to_string()));
        }
        Ok(())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signature")
            .field("target", &self.target)
            .field("params", &self.params().collect::<Vec<_>>())
            .finish()
    }
}

/// Argument bag passed to an injection target.
///
/// Values are stored type-erased and recovered by name with [`get`](Args::get).
#[derive(Clone, Default)]
pub struct Args {
    target: Option<Arc<str>>,
    values: HashMap<String, AnyValue>,
}

impl Args {
    /// Creates an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an argument, builder style.
    pub fn with<T: Send + Sync + 'static>(mut self, name: impl Into<String>, value: T) -> Self {
        self.insert(name, value);
        self
    }

    /// Adds or replaces an argument.
    pub fn insert<T: Send + Sync + 'static>(&mut self, name: impl Into<String>, value: T) {
        self.values.insert(name.into(), Arc::new(value));
    }

    fn insert_any(&mut self, name: String, value: AnyValue) {
        self.values.insert(name, value);
    }

    /// Returns a clone of the argument named `name`.
    pub fn get<T: Clone + 'static>(&self, name: &str) -> DiResult<T> {
        let value = self.values.get(name).ok_or_else(|| DiError::MissingArgument {
            target: self.target.as_deref().unwrap_or("arguments").to_string(),
            param: name.to_string(),
        })?;
        value
            .downcast_ref::<T>()
            .cloned()
            .ok_or(DiError::TypeMismatch(type_name::<T>()))
    }

    /// Returns whether an argument named `name` is present.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Number of arguments.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns whether the bag is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Argument names, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("Args")
            .field("target", &self.target)
            .field("names", &names)
            .finish()
    }
}

type Pending = Vec<(String, Arc<dyn AnyProvider>)>;

fn resolve_blocking(args: &mut Args, pending: &Pending) -> DiResult<()> {
    for (name, provider) in pending {
        args.insert_any(name.clone(), provider.provide_any()?);
    }
    Ok(())
}

async fn resolve_concurrently(args: &mut Args, pending: &Pending) -> DiResult<()> {
    let values = join_all(pending.iter().map(|(_, provider)| provider.aprovide_any())).await;
    for ((name, _), value) in pending.iter().zip(values) {
        args.insert_any(name.clone(), value?);
    }
    Ok(())
}

/// Closes `owned` after a call finished with `result`.
///
/// The call's error wins over a close error, which is then only logged.
fn close_after<R, E: From<DiError>>(owned: Option<Arc<Context>>, result: Result<R, E>) -> Result<R, E> {
    let Some(context) = owned else {
        return result;
    };
    settle(result, context.close())
}

async fn aclose_after<R, E: From<DiError>>(
    owned: Option<Arc<Context>>,
    result: Result<R, E>,
) -> Result<R, E> {
    let Some(context) = owned else {
        return result;
    };
    settle(result, context.aclose().await)
}

/// Releases a call context whose owner went away before closing it.
///
/// Entries that need the async path are released on the current tokio
/// runtime, when there is one; everything else is closed in place.
fn release_abandoned(context: Arc<Context>, message: &'static str) {
    if context.is_closed() {
        return;
    }
    if context.needs_async() {
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let scoped = context.clone();
            runtime.spawn(ambient::scope(scoped, async move {
                if let Err(err) = context.aclose().await {
                    tracing::warn!(error = %err, "{}", message);
                }
            }));
            return;
        }
    }
    let _entered = ambient::enter(Some(context.clone()));
    if let Err(err) = context.close() {
        tracing::warn!(error = %err, "{}", message);
    }
}

/// Owns a call's context until the call closes it itself.
struct CallContext(Option<Arc<Context>>);

impl CallContext {
    fn disarm(mut self) -> Option<Arc<Context>> {
        self.0.take()
    }
}

impl Drop for CallContext {
    fn drop(&mut self) {
        if let Some(context) = self.0.take() {
            release_abandoned(context, "call cancelled; context released with error");
        }
    }
}

fn settle<R, E: From<DiError>>(result: Result<R, E>, closed: DiResult<()>) -> Result<R, E> {
    match (result, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(close_err)) => Err(E::from(close_err)),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(close_err)) => {
            tracing::warn!(error = %close_err, "context close failed after a failed call");
            Err(err)
        }
    }
}

/// Resolution engine bound to a [`Container`].
///
/// # Examples
///
/// ```rust
/// use ferrous_inject::{Args, Container, DiError, Factory, Injector, Signature};
/// use std::sync::Arc;
///
/// let container = Arc::new(Container::new());
/// container
///     .add_scoped("greeting", Factory::value(|| Ok(String::from("hello"))), false)
///     .unwrap();
///
/// let injector = Injector::new(container);
/// let greet = injector
///     .inject(
///         Signature::new("greet")
///             .param_keyed("greeting", "greeting")
///             .param_default("name", String::from("world")),
///         |args: Args| -> Result<String, DiError> {
///             let greeting: String = args.get("greeting")?;
///             let name: String = args.get("name")?;
///             Ok(format!("{greeting}, {name}"))
///         },
///     )
///     .unwrap();
///
/// assert_eq!(greet.call(Args::new()).unwrap(), "hello, world");
/// assert_eq!(
///     greet.call(Args::new().with("name", String::from("rust"))).unwrap(),
///     "hello, rust"
/// );
/// ```
#[derive(Clone)]
pub struct Injector {
    container: Arc<Container>,
    config: InjectorConfig,
}

impl Injector {
    /// Creates an injector over `container` with the default configuration.
    pub fn new(container: Arc<Container>) -> Self {
        Self::with_config(container, InjectorConfig::default())
    }

    /// Creates an injector over `container` with `config`.
    pub fn with_config(container: Arc<Container>, config: InjectorConfig) -> Self {
        Self { container, config }
    }

    /// Creates an injector over [`Container::global`].
    pub fn global() -> Self {
        Self::new(Container::global())
    }

    /// Sets whether an already active context is joined instead of a fresh one opened.
    pub fn reuse_context(mut self, reuse: bool) -> Self {
        self.config.reuse_context = reuse;
        self
    }

    /// The container dependencies are resolved from.
    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    /// The active configuration.
    pub fn config(&self) -> InjectorConfig {
        self.config
    }

    /// Fills `args` with defaults and collects the providers still to resolve.
    fn prepare(&self, signature: &Signature, mut args: Args) -> DiResult<(Args, Pending)> {
        if let Some(unexpected) = args.names().find(|name| !signature.declares(name)) {
            return Err(DiError::UnexpectedArgument {
                target: signature.target().to_string(),
                param: unexpected.to_string(),
            });
        }
        args.target = Some(signature.target.clone());

        let mut pending = Vec::new();
        for param in signature.params.iter() {
            if args.contains(&param.name) {
                continue;
            }
            match &param.source {
                Source::Default(value) => args.insert_any(param.name.clone(), value.clone()),
                Source::Key(key) => match self.container.try_get(key) {
                    Some(provider) => pending.push((param.name.clone(), provider)),
                    None => {
                        return Err(DiError::MissingArgument {
                            target: signature.target().to_string(),
                            param: param.name.clone(),
                        })
                    }
                },
            }
        }
        Ok((args, pending))
    }

    /// Opens a context for a call, unless an active one is reused.
    ///
    /// Returns the context the call owns and must close.
    fn open(&self) -> Option<Arc<Context>> {
        if self.config.reuse_context && ambient::current().is_some() {
            None
        } else {
            Some(Arc::new(Context::new()))
        }
    }

    /// Runs `f` inside a context block on the blocking path.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ferrous_inject::{Container, Factory, Injector, Provider};
    /// use std::sync::Arc;
    ///
    /// let container = Arc::new(Container::new());
    /// let conn = container
    ///     .add_scoped("conn", Factory::value(|| Ok(Arc::new(0u8))), false)
    ///     .unwrap();
    ///
    /// let same = Injector::new(container)
    ///     .within(|| Arc::ptr_eq(&conn.provide().unwrap(), &conn.provide().unwrap()))
    ///     .unwrap();
    /// assert!(same);
    /// ```
    pub fn within<R>(&self, f: impl FnOnce() -> R) -> DiResult<R> {
        let owned = self.open();
        let _entered = owned.clone().map(|context| ambient::enter(Some(context)));
        close_after(owned, Ok(f()))
    }

    /// Runs `future` inside a context block on the non-blocking path.
    ///
    /// If the returned future is dropped before completion, the context it
    /// opened is still released.
    pub async fn within_async<F: Future>(&self, future: F) -> DiResult<F::Output> {
        match self.open() {
            Some(context) => {
                let guard = CallContext(Some(context.clone()));
                let output = ambient::scope(context, future).await;
                aclose_after(guard.disarm(), Ok(output)).await
            }
            None => Ok(future.await),
        }
    }

    /// Wraps a plain target.
    pub fn inject<F>(&self, signature: Signature, f: F) -> DiResult<InjectedFn<F>> {
        signature.claim()?;
        Ok(InjectedFn {
            injector: self.clone(),
            signature,
            f,
        })
    }

    /// Wraps a target whose result is a paired-lifecycle resource.
    pub fn inject_resource<F>(&self, signature: Signature, f: F) -> DiResult<InjectedResource<F>> {
        signature.claim()?;
        Ok(InjectedResource {
            injector: self.clone(),
            signature,
            f,
        })
    }

    /// Wraps an asynchronous target.
    pub fn inject_async<F>(&self, signature: Signature, f: F) -> DiResult<InjectedAsync<F>> {
        signature.claim()?;
        Ok(InjectedAsync {
            injector: self.clone(),
            signature,
            f,
        })
    }

    /// Wraps a target producing an asynchronous sequence.
    pub fn inject_stream<F>(&self, signature: Signature, f: F) -> DiResult<InjectedStream<F>> {
        signature.claim()?;
        Ok(InjectedStream {
            injector: self.clone(),
            signature,
            f: Arc::new(f),
        })
    }
}

impl fmt::Debug for Injector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Injector")
            .field("container", &self.container)
            .field("config", &self.config)
            .finish()
    }
}

/// Plain target wrapped by [`Injector::inject`].
pub struct InjectedFn<F> {
    injector: Injector,
    signature: Signature,
    f: F,
}

impl<F> InjectedFn<F> {
    /// Signature the target was wrapped with.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Calls the target, resolving missing arguments on the blocking path.
    pub fn call<R, E>(&self, args: Args) -> Result<R, E>
    where
        F: Fn(Args) -> Result<R, E>,
        E: From<DiError>,
    {
        let (mut args, pending) = self.injector.prepare(&self.signature, args)?;
        let owned = self.injector.open();
        let _entered = owned.clone().map(|context| ambient::enter(Some(context)));

        let result = resolve_blocking(&mut args, &pending)
            .map_err(E::from)
            .and_then(|()| (self.f)(args));
        close_after(owned, result)
    }
}

/// Paired-lifecycle target wrapped by [`Injector::inject_resource`].
pub struct InjectedResource<F> {
    injector: Injector,
    signature: Signature,
    f: F,
}

impl<F> InjectedResource<F> {
    /// Signature the target was wrapped with.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Calls the target's setup phase and hands back the managed value.
    ///
    /// The context the call runs in stays open until the returned
    /// [`Managed`] is closed or dropped.
    pub fn call<R, E>(&self, args: Args) -> Result<Managed<R>, E>
    where
        F: Fn(Args) -> Result<Resource<R>, E>,
        R: Clone + Send + 'static,
        E: From<DiError>,
    {
        let (mut args, pending) = self.injector.prepare(&self.signature, args)?;
        let owned = self.injector.open();
        let context = owned.clone().or_else(ambient::current);
        let _entered = owned.clone().map(|context| ambient::enter(Some(context)));

        let created = resolve_blocking(&mut args, &pending)
            .map_err(E::from)
            .and_then(|()| (self.f)(args))
            .and_then(|resource| Object::create(Produced::Resource(resource)).map_err(E::from));
        match created {
            Ok(object) => Ok(Managed {
                object,
                context,
                owned: Mutex::new(owned),
            }),
            Err(err) => close_after(owned, Err(err)),
        }
    }
}

/// Value produced by an [`InjectedResource`] call.
///
/// Closing runs the teardown phase with the call's context active, then
/// closes the context if the call opened it. Dropping an unclosed value
/// closes it and logs a failure instead of returning it.
pub struct Managed<R: Clone + Send + 'static> {
    object: Object<R>,
    context: Option<Arc<Context>>,
    owned: Mutex<Option<Arc<Context>>>,
}

impl<R: Clone + Send + 'static> Managed<R> {
    /// Returns the value produced by the setup phase.
    pub fn get(&self) -> DiResult<R> {
        self.object.get()
    }

    /// Returns whether the value has been released.
    pub fn is_closed(&self) -> bool {
        self.object.is_closed() && self.owned.lock().is_none()
    }

    /// Runs the teardown phase and releases the call's context.
    pub fn close(&self) -> DiResult<()> {
        let _entered = ambient::enter(self.context.clone());
        self.object.close()?;
        let owned = self.owned.lock().take();
        match owned {
            Some(context) => context.close(),
            None => Ok(()),
        }
    }
}

impl<R: Clone + Send + 'static> fmt::Debug for Managed<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Managed")
            .field("object", &self.object)
            .field("context", &self.context.as_ref().map(|context| context.id()))
            .finish()
    }
}

impl<R: Clone + Send + 'static> Drop for Managed<R> {
    fn drop(&mut self) {
        if self.is_closed() {
            return;
        }
        if let Err(err) = self.close() {
            tracing::warn!(error = %err, "managed value released with error");
        }
    }
}

/// Asynchronous target wrapped by [`Injector::inject_async`].
pub struct InjectedAsync<F> {
    injector: Injector,
    signature: Signature,
    f: F,
}

impl<F> InjectedAsync<F> {
    /// Signature the target was wrapped with.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Calls the target, resolving missing arguments concurrently.
    ///
    /// Dropping the returned future before it completes still releases the
    /// context the call opened.
    pub async fn call<R, E, Fut>(&self, args: Args) -> Result<R, E>
    where
        F: Fn(Args) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: From<DiError>,
    {
        let (mut args, pending) = self.injector.prepare(&self.signature, args)?;
        let owned = self.injector.open();
        let guard = CallContext(owned.clone());

        let body = async move {
            let result = match resolve_concurrently(&mut args, &pending).await {
                Ok(()) => (self.f)(args).await,
                Err(err) => Err(E::from(err)),
            };
            aclose_after(guard.disarm(), result).await
        };

        match owned {
            Some(context) => ambient::scope(context, body).await,
            None => body.await,
        }
    }
}

/// Asynchronous-sequence target wrapped by [`Injector::inject_stream`].
pub struct InjectedStream<F> {
    injector: Injector,
    signature: Signature,
    f: Arc<F>,
}

impl<F> InjectedStream<F> {
    /// Signature the target was wrapped with.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Prepares the call and returns the target's items.
    ///
    /// Dependencies are resolved when the stream is first polled; every item
    /// is produced with the call's context active. A context opened by the
    /// call is closed once the target's stream is exhausted, and a close
    /// failure is yielded as a final error item.
    pub fn call<S, T, E>(&self, args: Args) -> Result<ContextStream<T, E>, E>
    where
        F: Fn(Args) -> S + Send + Sync + 'static,
        S: Stream<Item = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: From<DiError> + Send + 'static,
    {
        let (mut args, pending) = self.injector.prepare(&self.signature, args)?;
        let owned = self.injector.open();
        let f = self.f.clone();

        let setup = async move {
            resolve_concurrently(&mut args, &pending).await?;
            Ok::<_, DiError>(args)
        };
        let items = stream::once(setup).flat_map(move |prepared| match prepared {
            Ok(args) => (*f)(args).left_stream(),
            Err(err) => stream::once(future::ready(Err(E::from(err)))).right_stream(),
        });

        let inner: BoxStream<'static, Result<T, E>> = match owned.clone().or_else(ambient::current) {
            Some(context) => ambient::scope(context, items).boxed(),
            None => items.boxed(),
        };
        Ok(ContextStream {
            inner,
            owned,
            closing: None,
            done: false,
        })
    }
}

/// Stream returned by [`InjectedStream::call`].
///
/// Dropping the stream before it is exhausted releases the call's context;
/// a failure is logged.
pub struct ContextStream<T, E> {
    inner: BoxStream<'static, Result<T, E>>,
    owned: Option<Arc<Context>>,
    closing: Option<BoxFuture<'static, DiResult<()>>>,
    done: bool,
}

impl<T, E: From<DiError>> Stream for ContextStream<T, E> {
    type Item = Result<T, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.done {
            return Poll::Ready(None);
        }

        if this.closing.is_none() {
            match ready!(this.inner.poll_next_unpin(cx)) {
                Some(item) => return Poll::Ready(Some(item)),
                None => match this.owned.take() {
                    Some(context) => {
                        let closing: BoxFuture<'static, DiResult<()>> =
                            Box::pin(ambient::scope(context.clone(), async move { context.aclose().await }));
                        this.closing = Some(closing);
                    }
                    None => {
                        this.done = true;
                        return Poll::Ready(None);
                    }
                },
            }
        }

        match this.closing.as_mut() {
            Some(closing) => {
                let closed = ready!(closing.as_mut().poll(cx));
                this.closing = None;
                this.done = true;
                Poll::Ready(closed.err().map(|err| Err(E::from(err))))
            }
            None => Poll::Ready(None),
        }
    }
}

impl<T, E> Drop for ContextStream<T, E> {
    fn drop(&mut self) {
        if let Some(context) = self.owned.take() {
            release_abandoned(context, "stream dropped before exhaustion; context released with error");
        }
    }
}

impl<T, E> fmt::Debug for ContextStream<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextStream")
            .field("owned", &self.owned.as_ref().map(|context| context.id()))
            .field("done", &self.done)
            .finish()
    }
}
