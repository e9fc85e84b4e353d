use ferrous_inject::{
    key_of_type, AsyncResource, Container, DiError, ErrorKind, Factory, Lifetime, Object, Produced, Provider,
    Resource, Status,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct Config {
    port: u16,
}

#[derive(Debug)]
struct Server {
    config: Arc<Config>,
    name: String,
}

#[test]
fn test_resolve_by_type_key() {
    let container = Container::new();
    container
        .add_transient(key_of_type::<Config>(), Factory::value(|| Ok(Arc::new(Config { port: 8080 }))), false)
        .unwrap();

    let config: Arc<Config> = container.resolve(key_of_type::<Config>()).unwrap();
    assert_eq!(config.port, 8080);
}

#[test]
fn test_factory_with_dependencies() {
    let container = Arc::new(Container::new());
    container
        .add_singleton(key_of_type::<Config>(), Factory::value(|| Ok(Arc::new(Config { port: 8080 }))), false)
        .unwrap();

    let lookup = container.clone();
    container
        .add_singleton(
            key_of_type::<Server>(),
            Factory::value(move || {
                Ok(Arc::new(Server {
                    config: lookup.resolve(key_of_type::<Config>())?,
                    name: "MyServer".to_string(),
                }))
            }),
            false,
        )
        .unwrap();

    let server: Arc<Server> = container.resolve(key_of_type::<Server>()).unwrap();
    assert_eq!(server.config.port, 8080);
    assert_eq!(server.name, "MyServer");

    container.reset().unwrap();
    container.unbind_all();
}

#[test]
fn test_lifetimes_are_reported() {
    let container = Container::new();
    let a = container.add_singleton("a", Factory::value(|| Ok(1u8)), false).unwrap();
    let b = container.add_scoped("b", Factory::value(|| Ok(1u8)), false).unwrap();
    let c = container.add_transient("c", Factory::value(|| Ok(1u8)), false).unwrap();

    assert_eq!(a.lifetime(), Lifetime::Singleton);
    assert_eq!(b.lifetime(), Lifetime::Scoped);
    assert_eq!(c.lifetime(), Lifetime::Transient);
    assert_eq!(Lifetime::Scoped.to_string(), "Scoped");
}

#[test]
fn test_status_transitions() {
    let provider = Container::new()
        .add_transient("flaky", Factory::<u8>::value(|| Err("down".into())), false)
        .unwrap();
    assert_eq!(provider.status(), Status::Idle);

    let err = provider.provide().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Construction);
    assert_eq!(provider.status(), Status::Corrupted);

    provider.reset().unwrap();
    assert_eq!(provider.status(), Status::Idle);
}

#[test]
fn test_construction_error_is_not_retried() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let container = Container::new();
    let provider = container
        .add_singleton(
            "once",
            Factory::<u8>::value(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("refused".into())
            }),
            false,
        )
        .unwrap();

    assert!(provider.provide().is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(provider.status(), Status::Corrupted);
}

#[test]
fn test_resource_round_trip() {
    let closes = Arc::new(AtomicUsize::new(0));
    let counter = closes.clone();
    let object = Object::create(Produced::Resource(Resource::new(String::from("conn"), move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })))
    .unwrap();

    assert_eq!(object.get().unwrap(), "conn");
    object.close().unwrap();
    object.close().unwrap();

    assert_eq!(closes.load(Ordering::SeqCst), 1);
    let err = object.get().unwrap_err();
    assert!(matches!(err, DiError::Closed));
    assert_eq!(err.kind(), ErrorKind::Lifecycle);
}

#[tokio::test]
async fn test_async_resource_mode_is_enforced() {
    let object = Object::acreate(Produced::AsyncResource(Box::pin(async {
        Ok(AsyncResource::new(1u8, || async { Ok(()) }))
    })))
    .await
    .unwrap();

    let err = object.close().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AsyncMode);
    assert_eq!(err.to_string(), "Object has to be closed asynchronously; use `aclose()`");

    object.aclose().await.unwrap();
    assert!(object.is_closed());
}

#[test]
fn test_error_messages() {
    let container = Container::new();
    container.add_transient("port", Factory::value(|| Ok(1u16)), false).unwrap();

    let err = container.add_transient("port", Factory::value(|| Ok(2u16)), false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Binding);
    assert_eq!(err.to_string(), "Cannot bind to 'port' because it is already bound");

    let err = container.get("host").unwrap_err();
    assert_eq!(err.to_string(), "There is nothing bound with 'host'");
}
