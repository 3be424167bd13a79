use crate::core::domain::error::ValidationError;

/// A validated Komari username.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KomariUsername(String);

impl KomariUsername {
    pub fn new(username: impl Into<String>) -> Result<Self, ValidationError> {
        let username = username.into();
        validate_username(&username)?;
        Ok(Self(username))
    }

    /// Returns the username as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A Komari password (plaintext, only held until the login request is sent).
#[derive(Clone)]
pub struct KomariPassword(String);

impl KomariPassword {
    pub fn new(password: impl Into<String>) -> Result<Self, ValidationError> {
        let password = password.into();
        validate_password(&password)?;
        Ok(Self(password))
    }

    /// Returns the password as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for KomariPassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KomariPassword(***)")
    }
}

/// A one-time second factor code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwoFactorCode(String);

impl TwoFactorCode {
    pub fn new(code: impl Into<String>) -> Result<Self, ValidationError> {
        let code = code.into();
        validate_two_factor_code(&code)?;
        Ok(Self(code))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub(crate) fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username.trim().is_empty() {
        return Err(ValidationError::field("username", "Username cannot be empty"));
    }
    if username.len() > 64 {
        return Err(ValidationError::Format(format!(
            "Username cannot exceed 64 characters (got {})",
            username.len()
        )));
    }
    if username.chars().any(char::is_control) {
        return Err(ValidationError::Format(
            "Username contains control characters".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::field("password", "Password cannot be empty"));
    }
    if password.len() > 128 {
        return Err(ValidationError::Format(
            "Password cannot exceed 128 characters".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn validate_two_factor_code(code: &str) -> Result<(), ValidationError> {
    if code.len() != 6 || !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::Format(
            "Two-factor code must be exactly 6 digits".to_string(),
        ));
    }
    Ok(())
}
