//! Concurrency tokens for optimistic conflict detection.
//!
//! A [`ConcurrencyToken`] is stamped on a resource by the store on every
//! successful write. The engine never orders or interprets tokens; two tokens
//! are either equal or they are not.
//!
//! ```rust
//! use resource_engine::resource::ConcurrencyToken;
//!
//! // Provider-specific versioning (row version, sequence number, ...)
//! let stored = ConcurrencyToken::from_opaque("xmin-1842");
//!
//! // Client echoes back what it read
//! let submitted: ConcurrencyToken = "xmin-1842".parse().unwrap();
//! assert_eq!(stored, submitted);
//! ```

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Opaque version marker compared by equality only.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConcurrencyToken {
    opaque: String,
}

impl ConcurrencyToken {
    /// Derive a token from write content.
    ///
    /// Stores that want a fresh token on every write should mix a write
    /// sequence number into `content`, since identical content hashes
    /// identically.
    pub fn from_content(content: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content);
        let hash = hasher.finalize();

        Self {
            opaque: BASE64.encode(&hash[..8]),
        }
    }

    /// Wrap a store-native version value (row version, sequence number, ...).
    pub fn from_opaque(value: impl AsRef<str>) -> Self {
        Self {
            opaque: value.as_ref().to_string(),
        }
    }

    /// Read a client-submitted token from a JSON attribute value.
    ///
    /// Numbers are accepted because many stores expose numeric row versions.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(Self::from_opaque(s.trim())),
            Value::Number(n) => Some(Self::from_opaque(n.to_string())),
            _ => None,
        }
    }

    /// JSON representation of the token.
    pub fn to_json(&self) -> Value {
        Value::String(self.opaque.clone())
    }

    /// The opaque token string. Only meaningful for equality comparisons.
    pub fn as_str(&self) -> &str {
        &self.opaque
    }
}

impl fmt::Display for ConcurrencyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opaque)
    }
}

impl FromStr for ConcurrencyToken {
    type Err = TokenError;

    fn from_str(token_str: &str) -> Result<Self, Self::Err> {
        let trimmed = token_str.trim();

        if trimmed.is_empty() {
            return Err(TokenError::Empty);
        }

        Ok(Self::from_opaque(trimmed))
    }
}

impl Serialize for ConcurrencyToken {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.opaque.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ConcurrencyToken {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opaque = String::deserialize(deserializer)?;
        Ok(Self { opaque })
    }
}

/// Errors that can occur while parsing a token.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TokenError {
    /// Empty or whitespace-only token string
    #[error("Concurrency token cannot be empty")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_token_from_content() {
        let token1 = ConcurrencyToken::from_content(b"disk:1:seq:1");
        let token2 = ConcurrencyToken::from_content(b"disk:1:seq:1");
        let token3 = ConcurrencyToken::from_content(b"disk:1:seq:2");

        assert_eq!(token1, token2);
        assert_ne!(token1, token3);
    }

    #[test]
    fn test_token_parse() {
        let token: ConcurrencyToken = " abc123 ".parse().unwrap();
        assert_eq!(token.as_str(), "abc123");

        assert_eq!("".parse::<ConcurrencyToken>(), Err(TokenError::Empty));
        assert_eq!("   ".parse::<ConcurrencyToken>(), Err(TokenError::Empty));
    }

    #[test]
    fn test_token_from_json() {
        assert_eq!(
            ConcurrencyToken::from_json(&json!(98765432)),
            Some(ConcurrencyToken::from_opaque("98765432"))
        );
        assert_eq!(
            ConcurrencyToken::from_json(&json!("v1")),
            Some(ConcurrencyToken::from_opaque("v1"))
        );
        assert_eq!(ConcurrencyToken::from_json(&json!("")), None);
        assert_eq!(ConcurrencyToken::from_json(&json!(null)), None);
    }

    #[test]
    fn test_token_serialization() {
        let token = ConcurrencyToken::from_opaque("test123");
        let json = serde_json::to_string(&token).unwrap();
        assert_eq!(json, "\"test123\"");

        let deserialized: ConcurrencyToken = serde_json::from_str(&json).unwrap();
        assert_eq!(token, deserialized);
    }
}
