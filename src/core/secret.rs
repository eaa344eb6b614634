//! Named secrets resolved at execution time

use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Default prefix checked first by [`EnvSecretStore`]
pub const DEFAULT_SECRET_PREFIX: &str = "SHIPLINE_SECRET_";

/// Text written in place of a secret value
pub const MASK: &str = "***";

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("Secret '{0}' is not defined")]
    Missing(String),
}

/// A secret value. Never printed, never serialized.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the raw value; only for handing to a capability
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretValue({})", MASK)
    }
}

impl fmt::Display for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(MASK)
    }
}

/// External store that secrets are looked up in
pub trait SecretStore: Send + Sync {
    fn resolve(&self, name: &str) -> Option<SecretValue>;
}

/// Reads secrets from the process environment: `<prefix><NAME>` first, then `<NAME>`
#[derive(Debug, Clone)]
pub struct EnvSecretStore {
    prefix: String,
}

impl EnvSecretStore {
    pub fn new() -> Self {
        Self::with_prefix(DEFAULT_SECRET_PREFIX)
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for EnvSecretStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretStore for EnvSecretStore {
    fn resolve(&self, name: &str) -> Option<SecretValue> {
        std::env::var(format!("{}{}", self.prefix, name))
            .or_else(|_| std::env::var(name))
            .ok()
            .map(SecretValue::new)
    }
}

/// Fixed in-memory secrets
#[derive(Debug, Clone, Default)]
pub struct StaticSecretStore {
    values: HashMap<String, SecretValue>,
}

impl StaticSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), SecretValue::new(value));
        self
    }
}

impl SecretStore for StaticSecretStore {
    fn resolve(&self, name: &str) -> Option<SecretValue> {
        self.values.get(name).cloned()
    }
}

/// Secrets resolved for one step invocation
#[derive(Debug, Clone, Default)]
pub struct ResolvedSecrets {
    values: HashMap<String, SecretValue>,
}

impl ResolvedSecrets {
    /// Resolve every name or fail on the first missing one
    pub fn resolve<'a, I>(store: &dyn SecretStore, names: I) -> Result<Self, SecretError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut values = HashMap::new();
        for name in names {
            let value = store
                .resolve(name)
                .ok_or_else(|| SecretError::Missing(name.to_string()))?;
            values.insert(name.to_string(), value);
        }
        Ok(Self { values })
    }

    pub fn get(&self, name: &str) -> Option<&SecretValue> {
        self.values.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Replace every secret value occurring in `text` with the mask
    pub fn mask(&self, text: &str) -> String {
        let mut values: Vec<&str> = self
            .values
            .values()
            .map(|v| v.expose())
            .filter(|v| !v.is_empty())
            .collect();
        // Longest first so a secret containing another is masked whole
        values.sort_by_key(|v| std::cmp::Reverse(v.len()));

        values
            .into_iter()
            .fold(text.to_string(), |acc, value| acc.replace(value, MASK))
    }
}
