//! In-memory agent for embedding and testing

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use connect_common::timestamp;
use connect_credentials::DelegateSigner;
use connect_protocol::{
    ConnectionRequest, Did, PermissionGrant, PermissionScope, ProtocolDefinition, ProtocolUri,
    ScopeKind,
};
use tokio::sync::RwLock;

use crate::{
    AgentError, DelegateIdentity, Delegator, EncryptionKey, IdentityVault, ProtocolStore,
    RequestSource, open_request,
};

/// A failure the [`MemoryAgent`] reports instead of doing its work.
///
/// Faults stay in effect until [`MemoryAgent::clear_faults`] is called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// `query_protocol` answers "not configured" even when a definition
    /// exists, as if another writer raced the caller.
    HideProtocols,
    /// `query_protocol` fails.
    QueryProtocol(AgentError),
    /// `configure_protocol` fails.
    ConfigureProtocol(AgentError),
    /// `create_ephemeral_identity` fails.
    CreateIdentity(AgentError),
    /// `issue_grant` fails for scopes of this kind.
    IssueGrant(ScopeKind, AgentError),
    /// `revoke_grant` fails.
    RevokeGrant(AgentError),
}

/// How often each agent operation has been invoked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// `decrypt_request` calls
    pub decrypt: usize,
    /// `query_protocol` calls
    pub query: usize,
    /// `configure_protocol` calls
    pub configure: usize,
    /// `create_ephemeral_identity` calls
    pub create_identity: usize,
    /// `issue_grant` calls
    pub issue: usize,
    /// `revoke_grant` calls
    pub revoke: usize,
}

impl CallCounts {
    /// Total number of remote calls with side effects or lookups against a
    /// grantor's store.
    pub fn store_calls(&self) -> usize {
        self.query + self.configure + self.create_identity + self.issue + self.revoke
    }
}

#[derive(Default)]
struct MemoryState {
    identities: Vec<Did>,
    protocols: HashMap<(Did, ProtocolUri), ProtocolDefinition>,
    published: HashMap<String, String>,
    grants: Vec<PermissionGrant>,
    revoked: Vec<PermissionGrant>,
    delegates: Vec<Did>,
    faults: Vec<Fault>,
    calls: CallCounts,
    next_grant: u64,
}

impl MemoryState {
    fn fault(&self, matches: impl Fn(&Fault) -> Option<&AgentError>) -> Result<(), AgentError> {
        match self.faults.iter().find_map(matches) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

/// In-memory implementation of the whole agent interface.
///
/// Clones share state, so a test can hand one clone to the handshake and
/// inspect the other.
///
/// # Examples
///
/// ```
/// use connect_agent::{IdentityVault, MemoryAgent};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let agent = MemoryAgent::new();
/// agent.add_identity("did:example:abc".parse()?).await;
///
/// assert_eq!(agent.identities().await?.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct MemoryAgent {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryAgent {
    /// Create an agent with no identities, protocols or grants
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a long-term identity to the wallet
    pub async fn add_identity(&self, did: Did) {
        let mut state = self.state.write().await;
        if !state.identities.contains(&did) {
            state.identities.push(did);
        }
    }

    /// Make a sealed request retrievable under `request_uri`
    pub async fn publish_request(&self, request_uri: impl Into<String>, sealed: impl Into<String>) {
        let mut state = self.state.write().await;
        state.published.insert(request_uri.into(), sealed.into());
    }

    /// Configure a definition directly, bypassing faults and counters
    pub async fn install_protocol(&self, did: &Did, definition: ProtocolDefinition) {
        let mut state = self.state.write().await;
        state
            .protocols
            .insert((did.clone(), definition.protocol.clone()), definition);
    }

    /// The definition configured for `protocol` on `did`'s store
    pub async fn protocol(&self, did: &Did, protocol: &ProtocolUri) -> Option<ProtocolDefinition> {
        let state = self.state.read().await;
        state.protocols.get(&(did.clone(), protocol.clone())).cloned()
    }

    /// Inject a fault
    pub async fn inject(&self, fault: Fault) {
        self.state.write().await.faults.push(fault);
    }

    /// Remove every injected fault
    pub async fn clear_faults(&self) {
        self.state.write().await.faults.clear();
    }

    /// Grants issued and not revoked, in issuance order
    pub async fn grants(&self) -> Vec<PermissionGrant> {
        self.state.read().await.grants.clone()
    }

    /// Grants that were revoked, in revocation order
    pub async fn revoked(&self) -> Vec<PermissionGrant> {
        self.state.read().await.revoked.clone()
    }

    /// Every delegate identity minted so far
    pub async fn delegates(&self) -> Vec<Did> {
        self.state.read().await.delegates.clone()
    }

    /// Invocation counts per operation
    pub async fn calls(&self) -> CallCounts {
        self.state.read().await.calls
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl RequestSource for MemoryAgent {
    async fn decrypt_request(
        &self,
        request_uri: &str,
        encryption_key: &str,
    ) -> Result<ConnectionRequest, AgentError> {
        let sealed = {
            let mut state = self.state.write().await;
            state.calls.decrypt += 1;
            state
                .published
                .get(request_uri)
                .cloned()
                .ok_or_else(|| AgentError::Unreachable {
                    location: request_uri.to_string(),
                    reason: "nothing published".to_string(),
                })?
        };

        let key: EncryptionKey = encryption_key.parse()?;
        open_request(&sealed, &key)
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl ProtocolStore for MemoryAgent {
    async fn query_protocol(
        &self,
        did: &Did,
        protocol: &ProtocolUri,
    ) -> Result<Option<ProtocolDefinition>, AgentError> {
        let mut state = self.state.write().await;
        state.calls.query += 1;
        state.fault(|fault| match fault {
            Fault::QueryProtocol(error) => Some(error),
            _ => None,
        })?;

        if state.faults.contains(&Fault::HideProtocols) {
            return Ok(None);
        }

        Ok(state.protocols.get(&(did.clone(), protocol.clone())).cloned())
    }

    async fn configure_protocol(
        &self,
        did: &Did,
        definition: &ProtocolDefinition,
    ) -> Result<(), AgentError> {
        let mut state = self.state.write().await;
        state.calls.configure += 1;
        state.fault(|fault| match fault {
            Fault::ConfigureProtocol(error) => Some(error),
            _ => None,
        })?;

        let key = (did.clone(), definition.protocol.clone());
        if state.protocols.contains_key(&key) {
            return Err(AgentError::Conflict {
                detail: format!("{} is already configured", definition.protocol),
            });
        }

        state.protocols.insert(key, definition.clone());
        Ok(())
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl Delegator for MemoryAgent {
    async fn create_ephemeral_identity(&self) -> Result<DelegateIdentity, AgentError> {
        let mut state = self.state.write().await;
        state.calls.create_identity += 1;
        state.fault(|fault| match fault {
            Fault::CreateIdentity(error) => Some(error),
            _ => None,
        })?;

        let signer =
            DelegateSigner::generate().map_err(|error| AgentError::failure(500, error.to_string()))?;
        let identity = DelegateIdentity::from(signer);
        state.delegates.push(identity.did().clone());

        Ok(identity)
    }

    async fn issue_grant(
        &self,
        grantor: &Did,
        delegate: &Did,
        scope: &PermissionScope,
    ) -> Result<PermissionGrant, AgentError> {
        let mut state = self.state.write().await;
        state.calls.issue += 1;
        state.fault(|fault| match fault {
            Fault::IssueGrant(kind, error) if *kind == scope.kind() => Some(error),
            _ => None,
        })?;

        state.next_grant += 1;
        let grant = PermissionGrant {
            id: format!("grant-{}", state.next_grant),
            grantor: grantor.clone(),
            grantee: delegate.clone(),
            scope: scope.clone(),
            issued_at: timestamp(),
        };
        state.grants.push(grant.clone());

        Ok(grant)
    }

    async fn revoke_grant(&self, grantor: &Did, grant: &PermissionGrant) -> Result<(), AgentError> {
        let mut state = self.state.write().await;
        state.calls.revoke += 1;
        state.fault(|fault| match fault {
            Fault::RevokeGrant(error) => Some(error),
            _ => None,
        })?;

        let position = state
            .grants
            .iter()
            .position(|issued| issued.id == grant.id && &issued.grantor == grantor)
            .ok_or_else(|| AgentError::failure(404, format!("no grant {}", grant.id)))?;
        let revoked = state.grants.remove(position);
        state.revoked.push(revoked);

        Ok(())
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl IdentityVault for MemoryAgent {
    async fn identities(&self) -> Result<Vec<Did>, AgentError> {
        Ok(self.state.read().await.identities.clone())
    }
}
