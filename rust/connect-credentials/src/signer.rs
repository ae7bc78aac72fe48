//! Ed25519 delegate signer.

use crate::{CredentialError, DelegateVerifier};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use connect_protocol::{Did, Jwk, PortableIdentity};
use ed25519_dalek::{Signature, SigningKey};
use std::fmt::{self, Debug, Display, Formatter};

/// A freshly minted, single-purpose `did:key` identity.
///
/// Created once per handshake and exported to the requester. It is never
/// persisted by the wallet.
#[derive(Clone)]
pub struct DelegateSigner {
    verifier: DelegateVerifier,
    key: SigningKey,
}

impl DelegateSigner {
    /// Generate a new keypair from the operating system's RNG.
    pub fn generate() -> Result<Self, CredentialError> {
        let mut seed = [0u8; 32];
        getrandom::getrandom(&mut seed)?;
        Ok(SigningKey::from_bytes(&seed).into())
    }

    /// Import a keypair from its 32 byte seed.
    pub fn import(seed: &[u8]) -> Result<Self, CredentialError> {
        let seed: [u8; 32] = seed
            .try_into()
            .map_err(|_| CredentialError::InvalidSeedLength(seed.len()))?;
        Ok(SigningKey::from_bytes(&seed).into())
    }

    /// The delegate's DID.
    pub fn did(&self) -> Did {
        self.verifier.did()
    }

    /// The public half of this identity.
    pub fn verifier(&self) -> &DelegateVerifier {
        &self.verifier
    }

    /// Sign `message` with the delegate key.
    pub fn sign(&self, message: &[u8]) -> Signature {
        use ed25519_dalek::Signer;
        self.key.sign(message)
    }

    /// Export as a portable credential bundle carrying the private key.
    pub fn export(&self) -> PortableIdentity {
        let did = self.did();
        let fragment = did
            .as_str()
            .strip_prefix("did:key:")
            .unwrap_or(did.as_str())
            .to_string();
        PortableIdentity {
            private_keys: vec![Jwk {
                kty: "OKP".into(),
                crv: "Ed25519".into(),
                x: URL_SAFE_NO_PAD.encode(self.verifier.0.as_bytes()),
                d: Some(URL_SAFE_NO_PAD.encode(self.key.to_bytes())),
                kid: Some(format!("{did}#{fragment}")),
            }],
            uri: did,
        }
    }

    /// Restore a signer from an exported bundle.
    ///
    /// The bundle's DID must match the key it carries.
    pub fn from_portable(identity: &PortableIdentity) -> Result<Self, CredentialError> {
        let jwk = identity
            .private_keys
            .iter()
            .find(|jwk| jwk.kty == "OKP" && jwk.crv == "Ed25519")
            .ok_or_else(|| CredentialError::UnsupportedKey("no Ed25519 key in bundle".into()))?;
        let d = jwk
            .d
            .as_ref()
            .ok_or_else(|| CredentialError::UnsupportedKey("key has no private part".into()))?;
        let seed = URL_SAFE_NO_PAD
            .decode(d)
            .map_err(|error| CredentialError::Encoding(error.to_string()))?;
        let signer = Self::import(&seed)?;
        if signer.did() != identity.uri {
            return Err(CredentialError::UnsupportedKey(format!(
                "key does not control {}",
                identity.uri
            )));
        }
        Ok(signer)
    }
}

impl From<SigningKey> for DelegateSigner {
    fn from(key: SigningKey) -> Self {
        let verifier = DelegateVerifier::from(key.verifying_key());
        Self { verifier, key }
    }
}

impl Debug for DelegateSigner {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegateSigner")
            .field("did", &self.verifier.to_string())
            .finish_non_exhaustive()
    }
}

impl Display for DelegateSigner {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.verifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testresult::TestResult;

    #[test]
    fn it_generates_distinct_identities() -> TestResult {
        let first = DelegateSigner::generate()?;
        let second = DelegateSigner::generate()?;
        assert_ne!(first.did(), second.did());
        Ok(())
    }

    #[test]
    fn it_round_trips_through_portable_bundles() -> TestResult {
        let signer = DelegateSigner::import(&[42; 32])?;
        let bundle = signer.export();

        assert_eq!(bundle.uri, signer.did());
        let jwk = &bundle.private_keys[0];
        assert_eq!(jwk.crv, "Ed25519");
        assert!(jwk.kid.as_deref().unwrap_or_default().starts_with(bundle.uri.as_str()));

        let restored = DelegateSigner::from_portable(&bundle)?;
        assert_eq!(restored.did(), signer.did());

        let signature = restored.sign(b"grant");
        signer.verifier().verify(b"grant", &signature)?;
        Ok(())
    }

    #[test]
    fn it_rejects_bundles_for_other_dids() -> TestResult {
        let mut bundle = DelegateSigner::import(&[1; 32])?.export();
        bundle.uri = DelegateSigner::import(&[2; 32])?.did();
        assert!(matches!(
            DelegateSigner::from_portable(&bundle),
            Err(CredentialError::UnsupportedKey(_))
        ));
        Ok(())
    }

    #[test]
    fn it_rejects_short_seeds() {
        assert!(matches!(
            DelegateSigner::import(&[0; 16]),
            Err(CredentialError::InvalidSeedLength(16))
        ));
    }

    #[test]
    fn it_keeps_the_seed_out_of_debug_output() -> TestResult {
        let signer = DelegateSigner::import(&[9; 32])?;
        let rendered = format!("{signer:?}");
        assert!(rendered.contains("did:key:z"));
        assert!(!rendered.contains(&URL_SAFE_NO_PAD.encode([9u8; 32])));
        Ok(())
    }
}
