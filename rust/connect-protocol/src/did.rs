use crate::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// A decentralized identifier in `did:<method>:<method-specific-id>` form.
///
/// Only the generic syntax is checked: a lowercase alphanumeric method and
/// a non-empty identifier. Method-specific resolution belongs to the agent.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Did(String);

impl Did {
    /// The DID method, e.g. `key` for `did:key:z6Mk...`.
    pub fn method(&self) -> &str {
        self.0
            .split(':')
            .nth(1)
            .unwrap_or_default()
    }

    /// The full DID string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Did {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let scheme = parts.next();
        let method = parts.next();
        let id = parts.next();

        match (scheme, method, id) {
            (Some("did"), Some(method), Some(id))
                if !method.is_empty()
                    && method
                        .chars()
                        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
                    && !id.is_empty()
                    && !id.chars().any(char::is_whitespace) =>
            {
                Ok(Self(s.to_string()))
            }
            _ => Err(ProtocolError::InvalidDid(s.to_string())),
        }
    }
}

impl TryFrom<String> for Did {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl TryFrom<&str> for Did {
    type Error = ProtocolError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Did> for String {
    fn from(did: Did) -> Self {
        did.0
    }
}

impl AsRef<str> for Did {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for Did {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_parses_generic_dids() {
        let did: Did = "did:example:abc".parse().unwrap();
        assert_eq!(did.method(), "example");
        assert_eq!(did.to_string(), "did:example:abc");

        let key: Did = "did:key:z6MkhaXgBZDvotDkL5257faiztiGiC2QtKLGpbnnEGta2doK"
            .parse()
            .unwrap();
        assert_eq!(key.method(), "key");
    }

    #[test]
    fn it_keeps_colons_in_the_identifier() {
        let did: Did = "did:web:example.com:users:alice".parse().unwrap();
        assert_eq!(did.method(), "web");
    }

    #[test]
    fn it_rejects_malformed_dids() {
        for input in ["", "did", "did:", "did:example", "did:example:", "did:Ex:abc", "urn:example:abc", "did:example:a b"] {
            assert_eq!(
                input.parse::<Did>(),
                Err(ProtocolError::InvalidDid(input.to_string())),
                "{input} should be rejected"
            );
        }
    }

    #[test]
    fn it_deserializes_only_valid_dids() {
        let did: Did = serde_json::from_str("\"did:example:abc\"").unwrap();
        assert_eq!(did.as_str(), "did:example:abc");
        assert!(serde_json::from_str::<Did>("\"not-a-did\"").is_err());
    }
}
