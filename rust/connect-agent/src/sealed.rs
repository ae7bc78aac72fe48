//! Sealed out-of-band requests.
//!
//! A requester publishes its [`ConnectionRequest`] as an XChaCha20-Poly1305
//! sealed JSON document and puts the symmetric key in the QR code next to
//! the payload location. The sealed form is
//! `base64url(nonce) "." base64url(ciphertext)`.

use crate::AgentError;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use connect_protocol::ConnectionRequest;
use std::fmt::{self, Debug, Formatter};
use std::str::FromStr;

const NONCE_LENGTH: usize = 24;

/// Symmetric key protecting one sealed request.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    /// Generate a random key.
    pub fn generate() -> Result<Self, AgentError> {
        let mut key = [0u8; 32];
        getrandom::getrandom(&mut key).map_err(|error| AgentError::Invalid(error.to_string()))?;
        Ok(Self(key))
    }

    /// Transport encoding used in request URIs.
    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }
}

impl From<[u8; 32]> for EncryptionKey {
    fn from(key: [u8; 32]) -> Self {
        Self(key)
    }
}

impl FromStr for EncryptionKey {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = URL_SAFE_NO_PAD
            .decode(s.trim_end_matches('='))
            .map_err(|error| AgentError::Invalid(format!("encryption key: {error}")))?;
        let key: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            AgentError::Invalid(format!("encryption key must be 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(key))
    }
}

impl Debug for EncryptionKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// Seal `request` under `key`.
pub fn seal_request(request: &ConnectionRequest, key: &EncryptionKey) -> Result<String, AgentError> {
    let plaintext =
        serde_json::to_vec(request).map_err(|error| AgentError::Invalid(error.to_string()))?;

    let mut nonce = [0u8; NONCE_LENGTH];
    getrandom::getrandom(&mut nonce).map_err(|error| AgentError::Invalid(error.to_string()))?;

    let cipher = XChaCha20Poly1305::new((&key.0).into());
    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext.as_slice())
        .map_err(|_| AgentError::Invalid("request could not be sealed".into()))?;

    Ok(format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(nonce),
        URL_SAFE_NO_PAD.encode(ciphertext)
    ))
}

/// Open a sealed request with `key`.
pub fn open_request(sealed: &str, key: &EncryptionKey) -> Result<ConnectionRequest, AgentError> {
    let (nonce, ciphertext) = sealed
        .trim()
        .split_once('.')
        .ok_or_else(|| AgentError::Invalid("sealed request is missing its nonce".into()))?;

    let nonce = URL_SAFE_NO_PAD
        .decode(nonce)
        .map_err(|error| AgentError::Invalid(format!("nonce: {error}")))?;
    if nonce.len() != NONCE_LENGTH {
        return Err(AgentError::Invalid(format!(
            "nonce must be {NONCE_LENGTH} bytes, got {}",
            nonce.len()
        )));
    }
    let ciphertext = URL_SAFE_NO_PAD
        .decode(ciphertext)
        .map_err(|error| AgentError::Invalid(format!("ciphertext: {error}")))?;

    let cipher = XChaCha20Poly1305::new((&key.0).into());
    let plaintext = cipher
        .decrypt(XNonce::from_slice(&nonce), ciphertext.as_slice())
        .map_err(|_| AgentError::Invalid("request could not be decrypted".into()))?;

    serde_json::from_slice(&plaintext).map_err(|error| AgentError::Invalid(error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use connect_protocol::{Permission, PermissionRequest, ProtocolDefinition};
    use testresult::TestResult;

    fn request() -> ConnectionRequest {
        let definition = ProtocolDefinition::new("https://x/invoice".parse().unwrap());
        ConnectionRequest::new(
            "https://app.example",
            None,
            vec![PermissionRequest::for_protocol(definition, &[Permission::Write])],
        )
    }

    #[test]
    fn it_opens_what_it_seals() -> TestResult {
        let key = EncryptionKey::generate()?;
        let sealed = seal_request(&request(), &key)?;
        assert_eq!(open_request(&sealed, &key)?, request());
        Ok(())
    }

    #[test]
    fn it_refuses_the_wrong_key() -> TestResult {
        let sealed = seal_request(&request(), &EncryptionKey::from([1; 32]))?;
        assert_eq!(
            open_request(&sealed, &EncryptionKey::from([2; 32])),
            Err(AgentError::Invalid("request could not be decrypted".into()))
        );
        Ok(())
    }

    #[test]
    fn it_parses_transport_encoded_keys() -> TestResult {
        let key = EncryptionKey::from([3; 32]);
        assert_eq!(key.encode().parse::<EncryptionKey>()?, key);
        assert!("c2hvcnQ".parse::<EncryptionKey>().is_err());
        assert!("not base64!".parse::<EncryptionKey>().is_err());
        Ok(())
    }

    #[test]
    fn it_rejects_truncated_payloads() {
        let key = EncryptionKey::from([4; 32]);
        assert!(open_request("no-separator", &key).is_err());
        assert!(open_request("AAAA.AAAA", &key).is_err());
    }
}
