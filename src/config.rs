//! Injector configuration.
//!
//! Configuration can be built in code, read from the environment, or (with the
//! `config` feature) deserialized with serde.

use std::env;

#[cfg(feature = "config")]
use serde::{Deserialize, Serialize};

use crate::error::{DiError, DiResult};

/// Environment variable read by [`InjectorConfig::from_env`].
pub const REUSE_CONTEXT_ENV: &str = "FERROUS_INJECT_REUSE_CONTEXT";

/// Behaviour switches of an [`Injector`](crate::Injector).
///
/// # Examples
///
/// ```rust
/// use ferrous_inject::InjectorConfig;
///
/// let config = InjectorConfig::default();
/// assert!(config.reuse_context);
///
/// let isolated = InjectorConfig::new().reuse_context(false);
/// assert!(!isolated.reuse_context);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct InjectorConfig {
    /// Join the already active context instead of opening a fresh one per call
    pub reuse_context: bool,
}

impl InjectorConfig {
    /// Default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets [`reuse_context`](Self::reuse_context).
    pub fn reuse_context(mut self, reuse: bool) -> Self {
        self.reuse_context = reuse;
        self
    }

    /// Reads the configuration from the environment.
    ///
    /// Unset variables keep their default. Accepted values are
    /// `true/false`, `1/0`, `yes/no` and `on/off`, case-insensitively.
    pub fn from_env() -> DiResult<Self> {
        let mut config = Self::default();
        if let Ok(raw) = env::var(REUSE_CONTEXT_ENV) {
            config.reuse_context = parse_bool(&raw)?;
        }
        Ok(config)
    }
}

impl Default for InjectorConfig {
    fn default() -> Self {
        Self {
            reuse_context: true,
        }
    }
}

fn parse_bool(raw: &str) -> DiResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(DiError::TypeMismatch("expected a boolean flag")),
    }
}
