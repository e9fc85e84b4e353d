//! Ambient propagation of the active [`Context`].
//!
//! The active context is never passed as a parameter. Blocking call chains
//! install it with [`enter`], which restores the previous value when the guard
//! drops. Async call chains wrap their future with [`scope`], which installs
//! the context around every poll and restores the previous value after it, so
//! concurrently polled tasks stay isolated even when they migrate threads.

use std::cell::RefCell;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use futures::Stream;

use super::Context;

thread_local! {
    static CURRENT: RefCell<Option<Arc<Context>>> = const { RefCell::new(None) };
}

/// Returns the context active for the current call chain.
pub fn current() -> Option<Arc<Context>> {
    CURRENT.with(|current| current.borrow().clone())
}

/// Makes `context` the active context until the returned guard drops.
///
/// Passing `None` hides any outer context for the guard's duration.
pub fn enter(context: Option<Arc<Context>>) -> AmbientGuard {
    let previous = CURRENT.with(|current| current.replace(context));
    AmbientGuard {
        previous,
        _not_send: PhantomData,
    }
}

/// Restores the previously active context on drop.
///
/// The guard is `!Send`; it cannot be held across an await point of a
/// `Send` future. Use [`scope`] for async code.
#[must_use = "the previous context is restored as soon as the guard is dropped"]
pub struct AmbientGuard {
    previous: Option<Arc<Context>>,
    _not_send: PhantomData<*const ()>,
}

impl Drop for AmbientGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|current| *current.borrow_mut() = previous);
    }
}

/// Runs `future` with `context` active during each of its polls.
///
/// The returned [`WithContext`] is also a [`Stream`] when `inner` is one.
///
/// # Examples
///
/// ```rust
/// use ferrous_inject::{Context, ambient};
/// use std::sync::Arc;
///
/// # #[tokio::main] async fn main() {
/// let ctx = Arc::new(Context::new());
/// let seen = ambient::scope(ctx.clone(), async {
///     tokio::task::yield_now().await;
///     ambient::current().map(|c| c.id())
/// })
/// .await;
///
/// assert_eq!(seen, Some(ctx.id()));
/// assert!(ambient::current().is_none());
/// # }
/// ```
pub fn scope<F>(context: Arc<Context>, inner: F) -> WithContext<F> {
    WithContext {
        context,
        inner: Box::pin(inner),
    }
}

/// Future or stream returned by [`scope`].
pub struct WithContext<F> {
    context: Arc<Context>,
    inner: Pin<Box<F>>,
}

impl<F: Future> Future for WithContext<F> {
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        let _entered = enter(Some(this.context.clone()));
        this.inner.as_mut().poll(cx)
    }
}

impl<S: Stream> Stream for WithContext<S> {
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        let _entered = enter(Some(this.context.clone()));
        this.inner.as_mut().poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}
