//! Sharing policy definitions.

/// Provider lifetimes controlling how produced values are shared
///
/// # Lifetime Characteristics
///
/// - **Singleton**: one creation per provider, independent of any context
/// - **Scoped**: one creation per execution context
/// - **Transient**: a fresh creation on every resolution, tracked for cleanup
///
/// # Examples
///
/// ```rust
/// use ferrous_inject::{Container, Factory, Lifetime, Provider};
///
/// let container = Container::new();
/// let counter = container
///     .add_transient("counter", Factory::value(|| Ok(1u32)), false)
///     .unwrap();
///
/// assert_eq!(counter.lifetime(), Lifetime::Transient);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifetime {
    /// Single instance per provider, cached until reset
    ///
    /// The factory runs once, inside a private context that is retained with
    /// the instance so the factory's own scoped dependencies live as long as
    /// the singleton does.
    Singleton,
    /// Single instance per execution context
    ///
    /// Repeated resolutions inside the same context return the same value;
    /// different contexts create independently. The instance is released when
    /// its context closes.
    Scoped,
    /// New instance per resolution
    ///
    /// Every resolution re-invokes the factory. Inside a context every
    /// created instance is tracked and released when the context closes.
    Transient,
}

impl std::fmt::Display for Lifetime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Lifetime::Singleton => "Singleton",
            Lifetime::Scoped => "Scoped",
            Lifetime::Transient => "Transient",
        };
        f.write_str(name)
    }
}
