//! Label documents submitted by publishers.

use std::fmt;

use super::error::DomainError;

/// A ZPL label description accepted for rendering.
///
/// The text is kept verbatim (including surrounding whitespace) but is
/// guaranteed to contain at least one non-whitespace character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document(String);

impl Document {
    /// Validate raw text, rejecting empty or whitespace-only input.
    pub fn parse(text: impl Into<String>) -> Result<Self, DomainError> {
        let text = text.into();
        if is_blank(&text) {
            return Err(DomainError::validation("document is empty"));
        }
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// True when `text` has nothing but whitespace.
pub fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}
