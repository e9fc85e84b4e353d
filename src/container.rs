//! Registry mapping binding identities to providers.

use std::any::type_name;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::error::{DiError, DiResult};
use crate::factory::Factory;
use crate::key::Key;
use crate::provider::{AnyProvider, Provider, Scoped, Singleton, Transient};

static GLOBAL: Lazy<Arc<Container>> = Lazy::new(|| Arc::new(Container::new()));

/// Registry of providers keyed by binding identity.
///
/// Several identities may be bound to the same provider. Bindings are
/// validated only for duplicates; nothing checks at bind time that a
/// provider's own dependencies are bound.
///
/// # Examples
///
/// ```rust
/// use ferrous_inject::{key_of_type, Container, DiError, Factory};
/// use std::sync::Arc;
///
/// struct Settings {
///     verbose: bool,
/// }
///
/// let container = Container::new();
/// container
///     .add_singleton(key_of_type::<Settings>(), Factory::value(|| Ok(Arc::new(Settings { verbose: true }))), false)
///     .unwrap();
/// container.bind_alias(key_of_type::<Settings>(), "settings", false).unwrap();
///
/// let settings: Arc<Settings> = container.resolve("settings").unwrap();
/// assert!(settings.verbose);
///
/// let again = container.add_singleton("settings", Factory::value(|| Ok(Arc::new(Settings { verbose: false }))), false);
/// assert!(matches!(again, Err(DiError::AlreadyBound(_))));
/// # container.reset().unwrap();
/// ```
pub struct Container {
    registry: RwLock<HashMap<Key, Arc<dyn AnyProvider>>>,
}

impl Container {
    /// Creates an empty container.
    pub fn new() -> Self {
        Self {
            registry: RwLock::new(HashMap::new()),
        }
    }

    /// The process-wide default container.
    pub fn global() -> Arc<Container> {
        GLOBAL.clone()
    }

    /// Binds `key` to `provider`.
    ///
    /// Fails with [`DiError::AlreadyBound`] if `key` is taken and `replace` is false.
    pub fn bind(
        &self,
        key: impl Into<Key>,
        provider: Arc<dyn AnyProvider>,
        replace: bool,
    ) -> DiResult<()> {
        let key = key.into();
        let mut registry = self.registry.write();
        if !replace && registry.contains_key(&key) {
            return Err(DiError::AlreadyBound(key));
        }
        tracing::debug!(key = %key, provider = %provider.provider_id(), "bound provider");
        registry.insert(key, provider);
        Ok(())
    }

    /// Binds `to` to the provider already bound under `from`.
    pub fn bind_alias(&self, from: impl Into<Key>, to: impl Into<Key>, replace: bool) -> DiResult<()> {
        let from = from.into();
        let to = to.into();
        let mut registry = self.registry.write();
        let provider = registry
            .get(&from)
            .cloned()
            .ok_or_else(|| DiError::NotBound(from.clone()))?;
        if !replace && registry.contains_key(&to) {
            return Err(DiError::AlreadyBound(to));
        }
        tracing::debug!(key = %to, alias_of = %from, "bound alias");
        registry.insert(to, provider);
        Ok(())
    }

    /// Removes the binding for `key`, returning the provider it pointed to.
    pub fn unbind(&self, key: impl Into<Key>) -> Option<Arc<dyn AnyProvider>> {
        let key = key.into();
        let removed = self.registry.write().remove(&key);
        if removed.is_some() {
            tracing::debug!(key = %key, "unbound provider");
        }
        removed
    }

    /// Removes every binding.
    pub fn unbind_all(&self) {
        let mut registry = self.registry.write();
        tracing::debug!(count = registry.len(), "unbound all providers");
        registry.clear();
    }

    /// Looks up the provider bound under `key`.
    pub fn get(&self, key: impl Into<Key>) -> DiResult<Arc<dyn AnyProvider>> {
        let key = key.into();
        self.try_get(&key).ok_or(DiError::NotBound(key))
    }

    /// Looks up the provider bound under `key`, falling back to `default`.
    pub fn get_or(&self, key: impl Into<Key>, default: Arc<dyn AnyProvider>) -> Arc<dyn AnyProvider> {
        self.try_get(key).unwrap_or(default)
    }

    /// Looks up the provider bound under `key`, if any.
    pub fn try_get(&self, key: impl Into<Key>) -> Option<Arc<dyn AnyProvider>> {
        self.registry.read().get(&key.into()).cloned()
    }

    /// Looks up the provider bound under `key` as its concrete type.
    pub fn get_provider<P: Provider>(&self, key: impl Into<Key>) -> DiResult<Arc<P>> {
        self.get(key)?
            .as_any()
            .downcast::<P>()
            .map_err(|_| DiError::TypeMismatch(type_name::<P>()))
    }

    /// Resolves `key` on the blocking path.
    pub fn resolve<T>(&self, key: impl Into<Key>) -> DiResult<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let value = self.get(key)?.provide_any()?;
        value
            .downcast_ref::<T>()
            .cloned()
            .ok_or(DiError::TypeMismatch(type_name::<T>()))
    }

    /// Resolves `key` on the non-blocking path.
    pub async fn aresolve<T>(&self, key: impl Into<Key>) -> DiResult<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let provider = self.get(key)?;
        let value = provider.aprovide_any().await?;
        value
            .downcast_ref::<T>()
            .cloned()
            .ok_or(DiError::TypeMismatch(type_name::<T>()))
    }

    /// Creates a [`Singleton`] over `factory` and binds it under `key`.
    pub fn add_singleton<T>(
        &self,
        key: impl Into<Key>,
        factory: Factory<T>,
        replace: bool,
    ) -> DiResult<Arc<Singleton<T>>>
    where
        T: Clone + Send + Sync + 'static,
    {
        let provider = Arc::new(Singleton::new(factory));
        self.bind(key, provider.clone(), replace)?;
        Ok(provider)
    }

    /// Creates a [`Scoped`] provider over `factory` and binds it under `key`.
    pub fn add_scoped<T>(
        &self,
        key: impl Into<Key>,
        factory: Factory<T>,
        replace: bool,
    ) -> DiResult<Arc<Scoped<T>>>
    where
        T: Clone + Send + Sync + 'static,
    {
        let provider = Arc::new(Scoped::new(factory));
        self.bind(key, provider.clone(), replace)?;
        Ok(provider)
    }

    /// Creates a [`Transient`] provider over `factory` and binds it under `key`.
    pub fn add_transient<T>(
        &self,
        key: impl Into<Key>,
        factory: Factory<T>,
        replace: bool,
    ) -> DiResult<Arc<Transient<T>>>
    where
        T: Clone + Send + Sync + 'static,
    {
        let provider = Arc::new(Transient::new(factory));
        self.bind(key, provider.clone(), replace)?;
        Ok(provider)
    }

    fn providers(&self) -> Vec<Arc<dyn AnyProvider>> {
        self.registry.read().values().cloned().collect()
    }

    /// Resets every bound provider on the blocking path.
    ///
    /// Every provider is attempted; the first failure is returned.
    pub fn reset(&self) -> DiResult<()> {
        let mut first_error = None;
        for provider in self.providers() {
            if let Err(err) = provider.reset_any() {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Resets every bound provider on the non-blocking path, concurrently.
    pub async fn areset(&self) -> DiResult<()> {
        let providers = self.providers();
        let results = join_all(providers.iter().map(|provider| provider.areset_any())).await;
        results.into_iter().collect::<DiResult<Vec<()>>>().map(|_| ())
    }

    /// Snapshot of every binding.
    pub fn registry(&self) -> HashMap<Key, Arc<dyn AnyProvider>> {
        self.registry.read().clone()
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.registry.read().len()
    }

    /// Returns whether nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.registry.read().is_empty()
    }

    /// Returns whether `key` is bound.
    pub fn contains(&self, key: impl Into<Key>) -> bool {
        self.registry.read().contains_key(&key.into())
    }

    /// Human-readable dump of every binding, sorted by key.
    #[cfg(feature = "diagnostics")]
    pub fn to_debug_string(&self) -> String {
        let registry = self.registry.read();
        let mut lines: Vec<String> = registry
            .iter()
            .map(|(key, provider)| {
                format!(
                    "{} -> {} {} '{}' ({})",
                    key,
                    provider.provider_lifetime(),
                    provider.provider_id(),
                    provider.provider_name(),
                    provider.provider_status()
                )
            })
            .collect();
        lines.sort();

        let mut out = format!("Container: {} binding(s)\n", lines.len());
        for line in lines {
            out.push_str("  ");
            out.push_str(&line);
            out.push('\n');
        }
        out
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.read();
        f.write_str("Container(")?;
        f.debug_map()
            .entries(registry.iter().map(|(key, provider)| (key.to_string(), provider)))
            .finish()?;
        f.write_str(")")
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container").field("bindings", &self.len()).finish()
    }
}
