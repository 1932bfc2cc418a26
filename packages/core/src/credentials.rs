//! Provider credential lookup used by stages that call external APIs.

use std::collections::HashMap;

use crate::{BoxFuture, PipelineError};

/// A secret value that never prints in full.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn mask(&self) -> String {
        mask_secret(&self.0)
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret({})", self.mask())
    }
}

/// Mask a secret for display, keeping a short prefix (and suffix for long keys).
pub fn mask_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    match chars.len() {
        n if n < 8 => "***".to_string(),
        n if n <= 14 => format!("{}***", chars[..n / 2].iter().collect::<String>()),
        n => format!(
            "{}...{}",
            chars[..10].iter().collect::<String>(),
            chars[n - 4..].iter().collect::<String>()
        ),
    }
}

/// Opaque lookup of a user's credential for a provider.
pub trait CredentialStore: Send + Sync + 'static {
    fn get_credential<'a>(
        &'a self,
        user_id: &'a str,
        provider: &'a str,
    ) -> BoxFuture<'a, Result<Option<Secret>, PipelineError>>;
}

/// Fixed in-memory credentials, keyed by `(user_id, provider)`.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    entries: HashMap<(String, String), Secret>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(
        mut self,
        user_id: impl Into<String>,
        provider: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        self.entries
            .insert((user_id.into(), provider.into()), Secret::new(secret));
        self
    }
}

impl CredentialStore for StaticCredentials {
    fn get_credential<'a>(
        &'a self,
        user_id: &'a str,
        provider: &'a str,
    ) -> BoxFuture<'a, Result<Option<Secret>, PipelineError>> {
        let found = self
            .entries
            .get(&(user_id.to_string(), provider.to_string()))
            .cloned();
        Box::pin(async move { Ok(found) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masking_depends_on_length() {
        assert_eq!(mask_secret("abc"), "***");
        assert_eq!(mask_secret("abcdefghij"), "abcde***");
        assert_eq!(mask_secret("sk-0123456789abcdefXYZW"), "sk-0123456...XYZW");
    }

    #[test]
    fn debug_output_is_masked() {
        let secret = Secret::new("sk-0123456789abcdefXYZW");
        assert_eq!(format!("{:?}", secret), "Secret(sk-0123456...XYZW)");
    }

    #[tokio::test]
    async fn static_lookup_misses_are_none() {
        let creds = StaticCredentials::new().with("u1", "semantic_scholar", "key-123456");
        let hit = creds.get_credential("u1", "semantic_scholar").await.unwrap();
        assert_eq!(hit.map(|s| s.expose().to_string()), Some("key-123456".into()));
        assert!(creds.get_credential("u2", "semantic_scholar").await.unwrap().is_none());
    }
}
