//! Binding identity types for the provider registry.

use std::any::TypeId;
use std::borrow::Cow;
use std::fmt;

/// Binding identity used both to register and to request a dependency.
///
/// A key is either a type-like identifier or an opaque string. The same key
/// that binds a provider in a [`Container`](crate::Container) is the one a
/// target's [`Signature`](crate::Signature) declares for a parameter.
///
/// # Examples
///
/// ```rust
/// use ferrous_inject::{Key, key_of_type};
///
/// struct Database;
///
/// let by_type = key_of_type::<Database>();
/// let by_name = Key::named("primary_database");
///
/// assert_eq!(by_type, key_of_type::<Database>());
/// assert_ne!(by_type, by_name);
/// assert_eq!(by_name.to_string(), "primary_database");
/// ```
#[derive(Debug, Clone)]
pub enum Key {
    /// Type key with TypeId and name for diagnostics
    ///
    /// Equality and hashing use the `TypeId` only; the name is carried for
    /// error messages.
    Type(TypeId, &'static str),
    /// Opaque string key
    Named(Cow<'static, str>),
}

impl Key {
    /// Creates a string key.
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Key::Named(name.into())
    }

    /// Get the type name or string for display
    ///
    /// ```rust
    /// use ferrous_inject::Key;
    /// use std::any::TypeId;
    ///
    /// let type_key = Key::Type(TypeId::of::<String>(), "alloc::string::String");
    /// assert_eq!(type_key.display_name(), "alloc::string::String");
    /// assert_eq!(Key::named("port").display_name(), "port");
    /// ```
    pub fn display_name(&self) -> &str {
        match self {
            Key::Type(_, name) => name,
            Key::Named(name) => name,
        }
    }
}

impl PartialEq for Key {
    #[inline(always)]
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            // TypeId comparison only, the name is diagnostic
            (Key::Type(a, _), Key::Type(b, _)) => a == b,
            (Key::Named(a), Key::Named(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Key {}

impl std::hash::Hash for Key {
    #[inline(always)]
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            Key::Type(id, _) => {
                0u8.hash(state);
                id.hash(state);
            }
            Key::Named(name) => {
                1u8.hash(state);
                name.hash(state);
            }
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl From<&'static str> for Key {
    fn from(name: &'static str) -> Self {
        Key::Named(Cow::Borrowed(name))
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Named(Cow::Owned(name))
    }
}

impl From<&Key> for Key {
    fn from(key: &Key) -> Self {
        key.clone()
    }
}

/// Creates the type key for `T`.
#[inline(always)]
pub fn key_of_type<T: ?Sized + 'static>() -> Key {
    Key::Type(TypeId::of::<T>(), std::any::type_name::<T>())
}
