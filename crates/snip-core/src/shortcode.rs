use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// A short, URL-safe token standing in for a long URL.
///
/// Tokens contain only `[a-zA-Z0-9_-]`, the alphabet of URL-safe base64,
/// and are at most 64 characters long.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShortToken(String);

const MAX_LENGTH: usize = 64;

impl ShortToken {
    /// Creates a new `ShortToken` after validating the input.
    pub fn new(token: impl Into<String>) -> std::result::Result<Self, CoreError> {
        let token = token.into();
        Self::validate(&token)?;
        Ok(Self(token))
    }

    /// Creates a `ShortToken` without validation.
    ///
    /// Use this only for tokens produced by trusted internal sources
    /// (the digest generator, rows read back from storage).
    pub fn new_unchecked(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Generates the full shortened URL based on the provided base URL.
    pub fn to_url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.0)
    }

    /// Returns the token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    fn validate(token: &str) -> std::result::Result<(), CoreError> {
        if token.is_empty() || token.len() > MAX_LENGTH {
            return Err(CoreError::InvalidShortToken(format!(
                "length must be between 1 and {}, got {}",
                MAX_LENGTH,
                token.len()
            )));
        }

        if !token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(CoreError::InvalidShortToken(format!(
                "must contain only alphanumeric characters, hyphens, or underscores: '{}'",
                token
            )));
        }

        Ok(())
    }
}

impl Display for ShortToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ShortToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_tokens() {
        assert!(ShortToken::new("a").is_ok());
        assert!(ShortToken::new("Abc-123_xyz").is_ok());
        assert!(ShortToken::new("a".repeat(64)).is_ok());
    }

    #[test]
    fn empty_or_too_long() {
        assert!(ShortToken::new("").is_err());
        assert!(ShortToken::new("a".repeat(65)).is_err());
    }

    #[test]
    fn invalid_characters() {
        assert!(ShortToken::new("abc def").is_err());
        assert!(ShortToken::new("abc/def").is_err());
        assert!(ShortToken::new("abc+def").is_err());
        assert!(ShortToken::new("abc=").is_err());
    }

    #[test]
    fn display_matches_inner() {
        let token = ShortToken::new("my-token").unwrap();
        assert_eq!(token.to_string(), "my-token");
        assert_eq!(token.as_str(), "my-token");
    }

    #[test]
    fn to_url_joins_with_single_slash() {
        let token = ShortToken::new("abc123").unwrap();
        assert_eq!(
            token.to_url("http://localhost:8080"),
            "http://localhost:8080/abc123"
        );
        assert_eq!(
            token.to_url("http://localhost:8080/"),
            "http://localhost:8080/abc123"
        );
    }

    #[test]
    fn serializes_as_plain_string() {
        let token = ShortToken::new_unchecked("abc123");
        assert_eq!(serde_json::to_string(&token).unwrap(), "\"abc123\"");
    }
}
