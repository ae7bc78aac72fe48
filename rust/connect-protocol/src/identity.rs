use crate::Did;
use serde::{Deserialize, Serialize};

/// A JSON Web Key describing one key of a portable identity.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type, `OKP` for Edwards curves.
    pub kty: String,
    /// Curve name, e.g. `Ed25519`.
    pub crv: String,
    /// Base64url encoded public key.
    pub x: String,
    /// Base64url encoded private key, present only in exported bundles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
    /// Key identifier, usually the DID URL of the verification method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

impl Jwk {
    /// A copy of this key with the private component removed.
    pub fn public(&self) -> Self {
        Self {
            d: None,
            ..self.clone()
        }
    }
}

// Private key material must never end up in logs.
impl std::fmt::Debug for Jwk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Jwk")
            .field("kty", &self.kty)
            .field("crv", &self.crv)
            .field("x", &self.x)
            .field("d", &self.d.as_ref().map(|_| "<redacted>"))
            .field("kid", &self.kid)
            .finish()
    }
}

/// Credential bundle for a delegate identity, handed to the requester so it
/// can act under the grants issued to that identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortableIdentity {
    /// The delegate's DID.
    pub uri: Did,
    /// Private keys controlling the DID.
    pub private_keys: Vec<Jwk>,
}

impl PortableIdentity {
    /// The delegate's DID.
    pub fn did(&self) -> &Did {
        &self.uri
    }
}
