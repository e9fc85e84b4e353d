/// Concurrent access tests
///
/// Providers are shared between threads and tasks; these tests check that
/// singletons construct once, that scoped values follow the context of the
/// thread that resolves them and that contexts close exactly once.
use ferrous_inject::{ambient, Args, Container, Context, DiError, Factory, Injector, Provider, Resource, Signature};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

#[derive(Debug)]
struct Counter {
    id: usize,
    created_on: String,
}

impl Counter {
    fn new(id: usize) -> Self {
        Self {
            id,
            created_on: format!("{:?}", thread::current().id()),
        }
    }
}

#[test]
fn test_singleton_constructs_once_across_threads() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let container = Arc::new(Container::new());
    container
        .add_singleton(
            "counter",
            Factory::value(move || {
                thread::sleep(std::time::Duration::from_millis(10));
                Ok(Arc::new(Counter::new(counter.fetch_add(1, Ordering::SeqCst))))
            }),
            false,
        )
        .unwrap();

    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let container = container.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                container.resolve::<Arc<Counter>>("counter").unwrap()
            })
        })
        .collect();

    let values: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(values.iter().all(|v| Arc::ptr_eq(v, &values[0])));
    assert_eq!(values[0].id, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    container.reset().unwrap();
}

#[test]
fn test_scoped_values_follow_each_threads_context() {
    let closed = Arc::new(AtomicUsize::new(0));
    let next_id = Arc::new(AtomicUsize::new(0));
    let container = Arc::new(Container::new());
    let (ids, closes) = (next_id.clone(), closed.clone());
    container
        .add_scoped(
            "request",
            Factory::resource(move || {
                let closes = closes.clone();
                Ok(Resource::new(Arc::new(Counter::new(ids.fetch_add(1, Ordering::SeqCst))), move || {
                    closes.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }))
            }),
            false,
        )
        .unwrap();

    let barrier = Arc::new(Barrier::new(6));
    let handles: Vec<_> = (0..6)
        .map(|_| {
            let container = container.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let ctx = Arc::new(Context::new());
                let _entered = ambient::enter(Some(ctx.clone()));
                barrier.wait();
                let first: Arc<Counter> = container.resolve("request").unwrap();
                for _ in 0..20 {
                    let again: Arc<Counter> = container.resolve("request").unwrap();
                    assert!(Arc::ptr_eq(&first, &again));
                }
                assert_eq!(first.created_on, format!("{:?}", thread::current().id()));
                ctx.close().unwrap();
                first.id
            })
        })
        .collect();

    let mut ids: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 6);
    assert_eq!(next_id.load(Ordering::SeqCst), 6);
    assert_eq!(closed.load(Ordering::SeqCst), 6);
}

#[test]
fn test_shared_context_creates_one_scoped_value() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let container = Arc::new(Container::new());
    let scoped = container
        .add_scoped(
            "shared",
            Factory::value(move || {
                thread::sleep(std::time::Duration::from_millis(5));
                Ok(Arc::new(Counter::new(counter.fetch_add(1, Ordering::SeqCst))))
            }),
            false,
        )
        .unwrap();

    let ctx = Arc::new(Context::new());
    let barrier = Arc::new(Barrier::new(4));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let ctx = ctx.clone();
            let scoped = scoped.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let _entered = ambient::enter(Some(ctx));
                barrier.wait();
                scoped.provide().unwrap()
            })
        })
        .collect();

    let values: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(values.iter().all(|v| Arc::ptr_eq(v, &values[0])));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    ctx.close().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_blocking_and_async_callers_share_a_singleton() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let container = Arc::new(Container::new());
    let singleton = container
        .add_singleton(
            "counter",
            Factory::value(move || Ok(Arc::new(Counter::new(counter.fetch_add(1, Ordering::SeqCst))))),
            false,
        )
        .unwrap();

    let mut tasks = Vec::new();
    for i in 0..8 {
        let singleton = singleton.clone();
        if i % 2 == 0 {
            tasks.push(tokio::task::spawn_blocking(move || singleton.provide().unwrap()));
        } else {
            tasks.push(tokio::spawn(async move { singleton.aprovide().await.unwrap() }));
        }
    }
    let mut values = Vec::new();
    for task in tasks {
        values.push(task.await.unwrap());
    }

    assert!(values.iter().all(|v| Arc::ptr_eq(v, &values[0])));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    container.areset().await.unwrap();
}

#[test]
fn test_injected_calls_on_many_threads_are_isolated() {
    let opened = Arc::new(AtomicUsize::new(0));
    let closed = Arc::new(AtomicUsize::new(0));
    let container = Arc::new(Container::new());
    let (opens, closes) = (opened.clone(), closed.clone());
    container
        .add_scoped(
            "session",
            Factory::resource(move || {
                let id = opens.fetch_add(1, Ordering::SeqCst);
                let closes = closes.clone();
                Ok(Resource::new(id, move || {
                    closes.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }))
            }),
            false,
        )
        .unwrap();

    let handler = Arc::new(
        Injector::new(container)
            .inject(Signature::new("handler").param_keyed("session", "session"), |args: Args| {
                let a: usize = args.get("session")?;
                let b: usize = ambient::current()
                    .ok_or(DiError::Closed)
                    .and_then(|_| args.get("session"))?;
                Ok::<_, DiError>((a, b))
            })
            .unwrap(),
    );

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let handler = handler.clone();
            thread::spawn(move || {
                (0..10)
                    .map(|_| handler.call::<(usize, usize), DiError>(Args::new()).unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut sessions = Vec::new();
    for handle in handles {
        for (a, b) in handle.join().unwrap() {
            assert_eq!(a, b);
            sessions.push(a);
        }
    }
    sessions.sort_unstable();
    sessions.dedup();
    assert_eq!(sessions.len(), 50);
    assert_eq!(opened.load(Ordering::SeqCst), 50);
    assert_eq!(closed.load(Ordering::SeqCst), 50);
}
