//! Collaborator traits.

use crate::AgentError;
use async_trait::async_trait;
use connect_common::ConditionalSync;
use connect_credentials::DelegateSigner;
use connect_protocol::{
    ConnectionRequest, Did, PermissionGrant, PermissionScope, PortableIdentity,
    ProtocolDefinition, ProtocolUri,
};

/// A delegate identity minted for exactly one handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegateIdentity {
    did: Did,
    bundle: PortableIdentity,
}

impl DelegateIdentity {
    /// Wrap an exported credential bundle.
    pub fn new(bundle: PortableIdentity) -> Self {
        Self {
            did: bundle.uri.clone(),
            bundle,
        }
    }

    /// The delegate's DID, used as grantee of every grant in the handshake.
    pub fn did(&self) -> &Did {
        &self.did
    }

    /// The credential bundle handed to the requester.
    pub fn export(&self) -> PortableIdentity {
        self.bundle.clone()
    }
}

impl From<DelegateSigner> for DelegateIdentity {
    fn from(signer: DelegateSigner) -> Self {
        Self::new(signer.export())
    }
}

/// Fetches and decrypts out-of-band connection requests.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait RequestSource: ConditionalSync {
    /// Fetch the sealed request behind `request_uri` and open it with
    /// `encryption_key`.
    ///
    /// Returns [`AgentError::Unreachable`] when the payload cannot be
    /// fetched and [`AgentError::Invalid`] when it cannot be opened.
    async fn decrypt_request(
        &self,
        request_uri: &str,
        encryption_key: &str,
    ) -> Result<ConnectionRequest, AgentError>;
}

/// Protocol configuration on an identity's remote data store.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait ProtocolStore: ConditionalSync {
    /// Look up the definition configured for `protocol` on `did`'s store.
    async fn query_protocol(
        &self,
        did: &Did,
        protocol: &ProtocolUri,
    ) -> Result<Option<ProtocolDefinition>, AgentError>;

    /// Configure `definition` on `did`'s store.
    ///
    /// Returns [`AgentError::Conflict`] when the protocol is already
    /// configured.
    async fn configure_protocol(
        &self,
        did: &Did,
        definition: &ProtocolDefinition,
    ) -> Result<(), AgentError>;
}

/// Delegate minting and grant issuance.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait Delegator: ConditionalSync {
    /// Mint a fresh, single-purpose delegate identity.
    async fn create_ephemeral_identity(&self) -> Result<DelegateIdentity, AgentError>;

    /// Issue a grant of `scope` over `grantor`'s data to `delegate`.
    async fn issue_grant(
        &self,
        grantor: &Did,
        delegate: &Did,
        scope: &PermissionScope,
    ) -> Result<PermissionGrant, AgentError>;

    /// Revoke a previously issued grant.
    async fn revoke_grant(&self, grantor: &Did, grant: &PermissionGrant) -> Result<(), AgentError>;
}

/// The wallet's own long-term identities.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait IdentityVault: ConditionalSync {
    /// Identities the user can authorize as.
    async fn identities(&self) -> Result<Vec<Did>, AgentError>;
}

/// Everything the handshake needs from the identity agent.
pub trait Agent: RequestSource + ProtocolStore + Delegator + IdentityVault {}

impl<T> Agent for T where T: RequestSource + ProtocolStore + Delegator + IdentityVault {}
