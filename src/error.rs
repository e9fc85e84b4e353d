//! Error types for the provider lifecycle engine.

use thiserror::Error;

use crate::key::Key;

/// Boxed error returned by user factories and teardown closures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Dependency injection errors
///
/// Represents the error conditions that can occur while binding providers,
/// resolving dependencies, or managing the lifetime of produced objects.
/// Everything except [`DiError::Construction`] is a configuration error and
/// is never recovered locally.
///
/// # Examples
///
/// ```rust
/// use ferrous_inject::{Container, DiError, ErrorKind, Key};
///
/// let container = Container::new();
/// match container.get(&Key::named("database")) {
///     Err(err @ DiError::NotBound(_)) => {
///         assert_eq!(err.kind(), ErrorKind::Binding);
///         assert_eq!(err.to_string(), "There is nothing bound with 'database'");
///     }
///     _ => unreachable!(),
/// }
/// ```
#[derive(Debug, Error)]
pub enum DiError {
    /// Identity already bound and no override was requested
    #[error("Cannot bind to '{0}' because it is already bound")]
    AlreadyBound(Key),
    /// Nothing bound under the identity
    #[error("There is nothing bound with '{0}'")]
    NotBound(Key),
    /// A parameter has no supplied value, no default and no binding
    #[error("{target} missing a required argument: '{param}'")]
    MissingArgument {
        /// Target whose parameter could not be filled
        target: String,
        /// Name of the parameter
        param: String,
    },
    /// An argument was supplied that the target does not declare
    #[error("{target} got an unexpected argument: '{param}'")]
    UnexpectedArgument {
        /// Target that received the argument
        target: String,
        /// Name of the argument
        param: String,
    },
    /// A paired-lifecycle scoped or transient provider was resolved with no active context
    #[error("{provider} produces a paired-lifecycle resource and has to be resolved in a context block")]
    ScopeRequired {
        /// Display name of the provider
        provider: String,
    },
    /// Value accessed after its wrapper was released
    #[error("Object has been already closed")]
    Closed,
    /// The injection wrapper was applied twice to the same target
    #[error("Overlapped injection: '{0}' is already injected")]
    AlreadyInjected(String),
    /// Blocking and non-blocking paths mixed on an async-only object
    #[error("Object has to be {0}")]
    AsyncMode(&'static str),
    /// The wrapped factory itself failed
    #[error("{provider} failed to construct its value: {source}")]
    Construction {
        /// Display name of the failing factory
        provider: String,
        /// The factory's own error
        #[source]
        source: BoxError,
    },
    /// Downcast of a resolved value failed
    #[error("Type mismatch for: {0}")]
    TypeMismatch(&'static str),
}

/// Abstract error categories.
///
/// Groups [`DiError`] variants by what went wrong, independent of the
/// concrete variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Duplicate bind, or lookup of an unbound identity
    Binding,
    /// A dependency could not be resolved
    Resolution,
    /// Use of a released value or a misapplied wrapper
    Lifecycle,
    /// Blocking/non-blocking path mismatch
    AsyncMode,
    /// The factory failed
    Construction,
    /// A resolved value had an unexpected type
    TypeMismatch,
}

impl DiError {
    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DiError::AlreadyBound(_) | DiError::NotBound(_) => ErrorKind::Binding,
            DiError::MissingArgument { .. }
            | DiError::UnexpectedArgument { .. }
            | DiError::ScopeRequired { .. } => ErrorKind::Resolution,
            DiError::Closed | DiError::AlreadyInjected(_) => ErrorKind::Lifecycle,
            DiError::AsyncMode(_) => ErrorKind::AsyncMode,
            DiError::Construction { .. } => ErrorKind::Construction,
            DiError::TypeMismatch(_) => ErrorKind::TypeMismatch,
        }
    }

    pub(crate) fn construction(provider: &str, source: BoxError) -> Self {
        DiError::Construction {
            provider: provider.to_string(),
            source,
        }
    }
}

/// Result type for DI operations
///
/// A convenience alias for `Result<T, DiError>` used throughout ferrous-inject.
pub type DiResult<T> = Result<T, DiError>;
