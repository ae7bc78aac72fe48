//! Ed25519 `did:key` principal.

use crate::DidKeyError;
use base58::{FromBase58, ToBase58};
use connect_protocol::Did;
use ed25519_dalek::{Signature, SignatureError, VerifyingKey};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Multicodec prefix of an Ed25519 public key.
const ED25519_MULTICODEC: [u8; 2] = [0xed, 0x01];

/// The public half of a delegate identity, rendered as a `did:key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelegateVerifier(pub VerifyingKey);

impl DelegateVerifier {
    /// The DID of this key.
    pub fn did(&self) -> Did {
        self.to_string().parse().expect("valid DID string")
    }

    /// Check `signature` over `message`.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), SignatureError> {
        use ed25519_dalek::Verifier;
        self.0.verify(message, signature)
    }
}

impl From<VerifyingKey> for DelegateVerifier {
    fn from(key: VerifyingKey) -> Self {
        Self(key)
    }
}

impl Display for DelegateVerifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut raw = Vec::with_capacity(34);
        raw.extend_from_slice(&ED25519_MULTICODEC);
        raw.extend_from_slice(self.0.as_bytes());
        write!(f, "did:key:z{}", raw.to_base58())
    }
}

impl FromStr for DelegateVerifier {
    type Err = DidKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let encoded = s
            .strip_prefix("did:key:")
            .ok_or(DidKeyError::InvalidDidHeader)?
            .strip_prefix('z')
            .ok_or(DidKeyError::MissingBase58Prefix)?;
        let raw = encoded.from_base58().map_err(|_| DidKeyError::InvalidKey)?;
        let raw = <[u8; 34]>::try_from(raw.as_slice()).map_err(|_| DidKeyError::InvalidKey)?;
        if raw[..2] != ED25519_MULTICODEC {
            return Err(DidKeyError::InvalidKey);
        }
        let key: [u8; 32] = raw[2..].try_into().map_err(|_| DidKeyError::InvalidKey)?;
        let key = VerifyingKey::from_bytes(&key).map_err(|_| DidKeyError::InvalidKey)?;
        Ok(Self(key))
    }
}

impl TryFrom<&Did> for DelegateVerifier {
    type Error = DidKeyError;

    fn try_from(did: &Did) -> Result<Self, Self::Error> {
        did.as_str().parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;

    #[test]
    fn it_round_trips_through_did_strings() {
        let key = SigningKey::from_bytes(&[7; 32]).verifying_key();
        let verifier = DelegateVerifier::from(key);
        let did = verifier.did();

        assert_eq!(did.method(), "key");
        assert!(did.as_str().starts_with("did:key:z6Mk"));
        assert_eq!(DelegateVerifier::try_from(&did).unwrap(), verifier);
    }

    #[test]
    fn it_rejects_foreign_dids() {
        assert_eq!(
            "did:example:abc".parse::<DelegateVerifier>(),
            Err(DidKeyError::InvalidDidHeader)
        );
        assert_eq!(
            "did:key:6Mk".parse::<DelegateVerifier>(),
            Err(DidKeyError::MissingBase58Prefix)
        );
        assert_eq!(
            "did:key:z111".parse::<DelegateVerifier>(),
            Err(DidKeyError::InvalidKey)
        );
    }
}
