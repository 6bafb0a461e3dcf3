//! DID (Decentralized Identifier) types.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// A [Decentralized Identifier][spec] string.
///
/// Wraps a raw DID string like `did:key:z6Mk...` or `did:mailto:example.com:alice`.
/// Values are only constructed through [`FromStr`], so every `Did` has a
/// non-empty lowercase alphanumeric method and a non-empty identifier.
///
/// [spec]: https://www.w3.org/TR/did-core/
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Did(String);

const PREFIX: &str = "did:";

impl Did {
    /// Get the raw DID string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the DID method name (e.g. `"key"` for `did:key:...`).
    #[must_use]
    pub fn method(&self) -> &str {
        self.split().0
    }

    /// Returns the method-specific identifier (everything after the method).
    #[must_use]
    pub fn identifier(&self) -> &str {
        self.split().1
    }

    /// Returns `true` for `did:key` DIDs, which embed their public key.
    #[must_use]
    pub fn is_key(&self) -> bool {
        self.method() == "key"
    }

    fn split(&self) -> (&str, &str) {
        let rest = &self.0[PREFIX.len()..];
        rest.split_once(':').unwrap_or((rest, ""))
    }

    /// Wrap a string produced by this crate's own key encoders.
    pub(crate) fn from_trusted(value: String) -> Self {
        Did(value)
    }
}

impl AsRef<str> for Did {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&Did> for Did {
    fn from(did: &Did) -> Self {
        did.clone()
    }
}

impl fmt::Debug for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Error when parsing a DID string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid DID: {0}")]
pub struct DidParseError(pub String);

impl FromStr for Did {
    type Err = DidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix(PREFIX)
            .ok_or_else(|| DidParseError(format!("expected did: prefix, got: {s}")))?;
        let (method, identifier) = rest
            .split_once(':')
            .ok_or_else(|| DidParseError(format!("expected did:method:identifier, got: {s}")))?;

        if method.is_empty()
            || !method
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        {
            return Err(DidParseError(format!("invalid method {method:?} in {s}")));
        }
        if identifier.is_empty() || identifier.chars().any(char::is_whitespace) {
            return Err(DidParseError(format!("invalid identifier in {s}")));
        }

        Ok(Did(s.to_string()))
    }
}

impl TryFrom<String> for Did {
    type Error = DidParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl Serialize for Did {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Did {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Creates a [`Did`] from a string literal, validated at compile time.
///
/// The `"did:"` prefix is added automatically; pass `"method:identifier"`.
///
/// ```
/// use tollgate_credentials::did;
///
/// let d = did!("mailto:example.com:alice");
/// assert_eq!(d.method(), "mailto");
/// ```
#[macro_export]
macro_rules! did {
    ($s:literal) => {{
        const _: () = {
            let b = $s.as_bytes();
            let mut i = 0;
            let mut found_colon = false;
            while i < b.len() {
                if b[i] == b':' {
                    assert!(i > 0, "DID method must not be empty");
                    assert!(i + 1 < b.len(), "DID identifier must not be empty");
                    found_colon = true;
                    break;
                }
                i += 1;
            }
            assert!(found_colon, "expected \"method:identifier\"");
        };
        #[allow(clippy::expect_used)]
        format!("did:{}", $s)
            .parse::<$crate::did::Did>()
            .expect("literal validated at compile time")
    }};
}
