//! Chat message content validation

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::ValidationError;

/// Maximum length for message content
const MAX_CONTENT_LEN: usize = 8192;

/// Validated chat message body.
///
/// The server never decrypts. When `encrypted` is set the body is an
/// opaque base64 envelope produced by the client; otherwise it is
/// plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContent {
    body: String,
    encrypted: bool,
}

impl MessageContent {
    /// Create new message content.
    ///
    /// # Rules
    /// - Max 8KB (8192 bytes)
    /// - Plaintext must not be blank
    /// - Encrypted bodies must be valid base64
    ///
    /// # Example
    /// ```
    /// use amity_server::models::MessageContent;
    ///
    /// assert!(MessageContent::new("Hello there", false).is_ok());
    /// assert!(MessageContent::new("   ", false).is_err());
    /// assert!(MessageContent::new("aGk=", true).is_ok());
    /// ```
    pub fn new(s: &str, encrypted: bool) -> Result<Self, ValidationError> {
        if s.trim().is_empty() {
            return Err(ValidationError::Empty { field: "content" });
        }

        if s.len() > MAX_CONTENT_LEN {
            return Err(ValidationError::TooLong {
                field: "content",
                max: MAX_CONTENT_LEN,
            });
        }

        if encrypted && STANDARD.decode(s.trim()).is_err() {
            return Err(ValidationError::InvalidFormat {
                field: "content",
                reason: "encrypted content must be base64",
            });
        }

        let body = if encrypted { s.trim().to_owned() } else { s.to_owned() };
        Ok(Self { body, encrypted })
    }

    /// Get the content as a string slice.
    pub fn as_str(&self) -> &str {
        &self.body
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    /// Short preview for notifications. Encrypted bodies are never previewed.
    pub fn preview(&self, max_chars: usize) -> String {
        if self.encrypted {
            return "Sent you an encrypted message".to_string();
        }

        let text = self.body.trim();
        match text.char_indices().nth(max_chars) {
            Some((idx, _)) => format!("{}…", &text[..idx]),
            None => text.to_string(),
        }
    }
}
