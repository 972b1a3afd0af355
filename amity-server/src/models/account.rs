//! Account credentials: username, email, password

use once_cell::sync::Lazy;
use regex::Regex;

use super::ValidationError;

const MIN_USERNAME_LEN: usize = 3;
const MAX_USERNAME_LEN: usize = 30;
const MAX_EMAIL_LEN: usize = 254;
const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 128;

/// Lowercase letters, digits, underscores
static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9_]+$").expect("invalid username regex"));

/// Deliberately loose: something@something.tld, no whitespace
static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("invalid email regex")
});

/// Validated username (lowercased)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Username(String);

impl Username {
    /// Create a username.
    ///
    /// # Rules
    /// - 3 to 30 characters
    /// - Lowercase alphanumeric and underscores (input is lowercased first)
    ///
    /// # Example
    /// ```
    /// use amity_server::models::Username;
    ///
    /// assert_eq!(Username::new("Sam_92").unwrap().as_str(), "sam_92");
    /// assert!(Username::new("sam smith").is_err());
    /// ```
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        let name = s.trim().to_lowercase();

        if name.is_empty() {
            return Err(ValidationError::Empty { field: "username" });
        }
        if name.chars().count() < MIN_USERNAME_LEN {
            return Err(ValidationError::TooShort {
                field: "username",
                min: MIN_USERNAME_LEN,
            });
        }
        if name.chars().count() > MAX_USERNAME_LEN {
            return Err(ValidationError::TooLong {
                field: "username",
                max: MAX_USERNAME_LEN,
            });
        }
        if !USERNAME_RE.is_match(&name) {
            return Err(ValidationError::InvalidFormat {
                field: "username",
                reason: "only letters, digits and underscores are allowed",
            });
        }

        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Validated email address (lowercased)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Email(String);

impl Email {
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        let email = s.trim().to_lowercase();

        if email.is_empty() {
            return Err(ValidationError::Empty { field: "email" });
        }
        if email.len() > MAX_EMAIL_LEN {
            return Err(ValidationError::TooLong {
                field: "email",
                max: MAX_EMAIL_LEN,
            });
        }
        if !EMAIL_RE.is_match(&email) {
            return Err(ValidationError::InvalidFormat {
                field: "email",
                reason: "not a valid email address",
            });
        }

        Ok(Self(email))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Plaintext password that passed length checks. Never logged.
#[derive(Clone, PartialEq, Eq)]
pub struct Password(String);

impl Password {
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        if s.is_empty() {
            return Err(ValidationError::Empty { field: "password" });
        }
        if s.chars().count() < MIN_PASSWORD_LEN {
            return Err(ValidationError::TooShort {
                field: "password",
                min: MIN_PASSWORD_LEN,
            });
        }
        if s.chars().count() > MAX_PASSWORD_LEN {
            return Err(ValidationError::TooLong {
                field: "password",
                max: MAX_PASSWORD_LEN,
            });
        }

        Ok(Self(s.to_owned()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(***)")
    }
}
