use ferrous_inject::{
    ambient, AsyncResource, Container, Context, ErrorKind, Factory, Provider, Resource, Singleton, Status,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Pool {
    id: usize,
}

#[test]
fn test_singleton_is_independent_of_contexts() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let pool = Singleton::new(Factory::value(move || {
        Ok(Arc::new(Pool {
            id: counter.fetch_add(1, Ordering::SeqCst),
        }))
    }));

    let first = Arc::new(Context::new());
    let a = {
        let _entered = ambient::enter(Some(first.clone()));
        pool.provide().unwrap()
    };
    first.close().unwrap();

    let b = pool.provide().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.id, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    pool.reset().unwrap();
}

#[test]
fn test_scoped_dependency_lives_as_long_as_the_singleton() {
    let closed = Arc::new(AtomicUsize::new(0));
    let counter = closed.clone();
    let container = Arc::new(Container::new());
    container
        .add_scoped(
            "connection",
            Factory::resource(move || {
                let counter = counter.clone();
                Ok(Resource::new(Arc::new(7u32), move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }))
            }),
            false,
        )
        .unwrap();

    let lookup = container.clone();
    let service = container
        .add_singleton(
            "service",
            Factory::value(move || {
                let connection: Arc<u32> = lookup.resolve("connection")?;
                Ok(Arc::new(Pool { id: *connection as usize }))
            }),
            false,
        )
        .unwrap();

    // No outer context: the connection is created in the singleton's private one
    assert_eq!(service.provide().unwrap().id, 7);
    assert_eq!(closed.load(Ordering::SeqCst), 0);

    let private = service.context().unwrap();
    assert_eq!(private.len(), 1);

    service.reset().unwrap();
    assert_eq!(closed.load(Ordering::SeqCst), 1);
    assert!(private.is_closed());
    assert_eq!(service.status(), Status::Idle);
    container.unbind_all();
}

#[test]
fn test_reset_allows_reconstruction() {
    let closes = Arc::new(AtomicUsize::new(0));
    let counter = closes.clone();
    let pool = Singleton::new(Factory::resource(move || {
        let counter = counter.clone();
        Ok(Resource::new(Arc::new(Pool { id: 0 }), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
    }));

    let a = pool.provide().unwrap();
    pool.reset().unwrap();
    pool.reset().unwrap();
    assert_eq!(closes.load(Ordering::SeqCst), 1);

    let b = pool.provide().unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    pool.reset().unwrap();
    assert_eq!(closes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_async_singleton_constructs_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let pool = Arc::new(Singleton::new(Factory::future(move || {
        let counter = counter.clone();
        async move {
            tokio::task::yield_now().await;
            Ok(Arc::new(Pool {
                id: counter.fetch_add(1, Ordering::SeqCst),
            }))
        }
    })));

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let pool = pool.clone();
        tasks.push(tokio::spawn(async move { pool.aprovide().await.unwrap() }));
    }
    let mut values = Vec::new();
    for task in tasks {
        values.push(task.await.unwrap());
    }

    assert!(values.iter().all(|v| Arc::ptr_eq(v, &values[0])));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    pool.areset().await.unwrap();
    assert_eq!(pool.status(), Status::Idle);
}

#[tokio::test]
async fn test_async_factory_sees_private_context() {
    let pool = Singleton::new(Factory::future(|| async {
        tokio::task::yield_now().await;
        Ok(ambient::current().map(|ctx| ctx.id()))
    }));

    let seen = pool.aprovide().await.unwrap();
    assert_eq!(seen, pool.context().map(|ctx| ctx.id()));
    assert!(seen.is_some());
    assert!(ambient::current().is_none());
    pool.areset().await.unwrap();
}

#[tokio::test]
async fn test_blocking_reset_keeps_async_scoped_dependencies() {
    let closed = Arc::new(AtomicUsize::new(0));
    let counter = closed.clone();
    let container = Arc::new(Container::new());
    container
        .add_scoped(
            "db",
            Factory::async_resource(move || {
                let counter = counter.clone();
                async move {
                    Ok(AsyncResource::new(Arc::new(11usize), move || async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }))
                }
            }),
            false,
        )
        .unwrap();

    let lookup = container.clone();
    let pool = Singleton::new(Factory::future(move || {
        let lookup = lookup.clone();
        async move {
            let db: Arc<usize> = lookup.aresolve("db").await?;
            Ok(Arc::new(Pool { id: *db }))
        }
    }));

    assert_eq!(pool.aprovide().await.unwrap().id, 11);
    let err = pool.reset().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AsyncMode);
    assert!(pool.is_initialized());
    assert_eq!(closed.load(Ordering::SeqCst), 0);

    pool.areset().await.unwrap();
    assert_eq!(closed.load(Ordering::SeqCst), 1);
    assert!(!pool.is_initialized());
    container.unbind_all();
}
