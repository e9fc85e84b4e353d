//! # ferrous-inject
//!
//! Provider lifecycle engine for Rust: singleton, scoped and transient
//! providers, ambient execution contexts, and paired-lifecycle resources.
//!
//! ## Features
//!
//! - **Three sharing policies**: Singleton, Scoped, and Transient providers
//! - **Ambient execution contexts**: the active context follows the call chain, blocking or async
//! - **Paired-lifecycle resources**: setup now, teardown exactly once when the context closes
//! - **Blocking and async paths**: every operation exists in both flavors over one dual-mode lock
//! - **Declarative injection**: targets declare parameters; the injector fills them from a container
//!
//! ## Quick Start
//!
//! ```rust
//! use ferrous_inject::{key_of_type, Args, Container, DiError, Factory, Injector, Resource, Signature};
//! use std::sync::Arc;
//!
//! struct Database {
//!     url: String,
//! }
//!
//! struct Session {
//!     db: Arc<Database>,
//! }
//!
//! let container = Arc::new(Container::new());
//! container
//!     .add_singleton(
//!         key_of_type::<Database>(),
//!         Factory::value(|| Ok(Arc::new(Database { url: "postgres://localhost".into() }))),
//!         false,
//!     )
//!     .unwrap();
//!
//! let lookup = container.clone();
//! container
//!     .add_scoped(
//!         key_of_type::<Session>(),
//!         Factory::resource(move || {
//!             let db: Arc<Database> = lookup.resolve(key_of_type::<Database>())?;
//!             Ok(Resource::new(Arc::new(Session { db }), || Ok(())))
//!         }),
//!         false,
//!     )
//!     .unwrap();
//!
//! let injector = Injector::new(container.clone());
//! let handler = injector
//!     .inject(
//!         Signature::new("handler").param::<Session>("session"),
//!         |args: Args| -> Result<String, DiError> {
//!             let session: Arc<Session> = args.get("session")?;
//!             Ok(session.db.url.clone())
//!         },
//!     )
//!     .unwrap();
//!
//! assert_eq!(handler.call(Args::new()).unwrap(), "postgres://localhost");
//! container.reset().unwrap();
//! ```
//!
//! ## Provider Lifetimes
//!
//! - **Singleton**: created once per provider and kept until reset
//! - **Scoped**: created once per execution context and released when it closes
//! - **Transient**: created on every resolution; inside a context, each one is released when it closes
//!
//! ## Execution Contexts
//!
//! Scoped and transient providers keep their values in the active
//! [`Context`]. Contexts are opened by the [`Injector`] around each call, or
//! explicitly with [`ambient::enter`] and [`ambient::scope`]:
//!
//! ```rust
//! use ferrous_inject::{ambient, Context, Factory, Provider, Scoped};
//! use std::sync::Arc;
//!
//! # #[tokio::main] async fn main() {
//! let request = Scoped::new(Factory::future(|| async { Ok(Arc::new(7u64)) }));
//! let ctx = Arc::new(Context::new());
//!
//! let (a, b) = ambient::scope(ctx.clone(), async {
//!     (request.aprovide().await.unwrap(), request.aprovide().await.unwrap())
//! })
//! .await;
//! assert!(Arc::ptr_eq(&a, &b));
//!
//! ctx.aclose().await.unwrap();
//! # }
//! ```

pub mod config;
pub mod container;
pub mod context;
pub mod error;
pub mod factory;
pub mod injector;
pub mod key;
pub mod lifetime;
pub mod lock;
pub mod object;
pub mod provider;

pub use config::InjectorConfig;
pub use container::Container;
pub use context::{ambient, Context, ContextData, ScopedSlot, TransientList};
pub use error::{BoxError, DiError, DiResult, ErrorKind};
pub use factory::Factory;
pub use injector::{
    Args, ContextStream, InjectedAsync, InjectedFn, InjectedResource, InjectedStream, Injector, Managed, Signature,
};
pub use key::{key_of_type, Key};
pub use lifetime::Lifetime;
pub use lock::{Lock, LockGuard};
pub use object::{AsyncResource, Object, Produced, Resource};
pub use provider::{AnyProvider, AnyValue, Provider, ProviderId, Scoped, Singleton, Status, Transient};
