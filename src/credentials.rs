//! Chat collaborator credential loading.
//!
//! The bearer credential lives in the process environment. It is read once
//! when the server starts; a missing value is an operator misconfiguration
//! that fails every chat request, not a per-request condition.

use std::collections::HashMap;
use std::fmt;

/// A resolved API key. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a raw key.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The plaintext key, for building the `Authorization` header.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(redact(&self.0))
    }
}

fn redact(s: &str) -> &str {
    if s.is_empty() { "" } else { "[REDACTED]" }
}

/// Source of named secrets.
pub trait CredentialSource: Send + Sync {
    /// Look up a secret by name. `None` when unset.
    fn lookup(&self, name: &str) -> Option<String>;
}

/// Reads secrets from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl CredentialSource for ProcessEnv {
    fn lookup(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Fixed in-memory secrets, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials(HashMap<String, String>);

impl StaticCredentials {
    /// Empty source: every lookup misses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one entry.
    pub fn with_entry(mut self, name: &str, value: &str) -> Self {
        self.0.insert(name.to_owned(), value.to_owned());
        self
    }
}

impl CredentialSource for StaticCredentials {
    fn lookup(&self, name: &str) -> Option<String> {
        self.0.get(name).cloned()
    }
}

/// Resolve the chat credential named `name`.
///
/// Blank values count as absent.
pub fn resolve_api_key(source: &dyn CredentialSource, name: &str) -> Option<ApiKey> {
    let raw = source.lookup(name)?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        tracing::warn!(variable = name, "chat credential is set but empty");
        return None;
    }
    Some(ApiKey::new(trimmed))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn debug_redacts_value() {
        let key = ApiKey::new("app-secret");
        assert_eq!(format!("{key:?}"), "[REDACTED]");
        assert_eq!(key.expose(), "app-secret");
    }

    #[test]
    fn resolve_present_key() {
        let source = StaticCredentials::new().with_entry("DIFY_KEY", " app-123 ");
        let key = resolve_api_key(&source, "DIFY_KEY").unwrap();
        assert_eq!(key.expose(), "app-123");
    }

    #[test]
    fn resolve_missing_key_is_none() {
        let source = StaticCredentials::new();
        assert!(resolve_api_key(&source, "DIFY_KEY").is_none());
    }

    #[test]
    fn resolve_blank_key_is_none() {
        let source = StaticCredentials::new().with_entry("DIFY_KEY", "   ");
        assert!(resolve_api_key(&source, "DIFY_KEY").is_none());
    }
}
