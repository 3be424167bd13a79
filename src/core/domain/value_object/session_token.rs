use crate::core::domain::error::ValidationError;
use std::time::SystemTime;

const COOKIE_NAME: &str = "session_token";

/// A Komari session token, sent back to the backend as a cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    value: String,
    created_at: SystemTime,
}

impl SessionToken {
    /// Creates a validated token.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        validate_session_token(&value)?;
        Ok(Self::new_unchecked(value))
    }

    /// Creates a new token without validation.
    pub(crate) fn new_unchecked(value: String) -> Self {
        Self {
            value,
            created_at: SystemTime::now(),
        }
    }

    /// Returns the token value as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Returns the creation time.
    #[must_use]
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Formats the token as a `Cookie` header value.
    #[must_use]
    pub fn as_cookie_header(&self) -> String {
        format!("{}={}", COOKIE_NAME, self.value)
    }
}

/// Validates the format of a session token string.
pub(crate) fn validate_session_token(token: &str) -> Result<(), ValidationError> {
    if token.is_empty() {
        return Err(ValidationError::field("session_token", "Session token cannot be empty"));
    }
    // Must be usable verbatim inside a Cookie header.
    if !token
        .chars()
        .all(|c| c.is_ascii_graphic() && !matches!(c, ';' | ',' | '"' | '\\'))
    {
        return Err(ValidationError::Format(
            "Session token contains characters not allowed in a cookie".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_header() {
        let token = SessionToken::new("abc123").unwrap();
        assert_eq!(token.as_cookie_header(), "session_token=abc123");
    }

    #[test]
    fn test_invalid_tokens() {
        assert!(SessionToken::new("").is_err());
        assert!(SessionToken::new("a;b").is_err());
        assert!(SessionToken::new("a b").is_err());
    }
}
