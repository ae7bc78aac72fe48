//! Connection and permission requests.

use crate::{
    Did, Permission, PermissionScope, ProtocolDefinition, ProtocolError, ProtocolUri,
};
use serde::{Deserialize, Serialize};

/// Schema version of [`ConnectionRequest`] this crate speaks.
pub const CONNECTION_REQUEST_VERSION: u32 = 1;

fn current_version() -> u32 {
    CONNECTION_REQUEST_VERSION
}

/// Scopes requested against a single protocol definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRequest {
    /// Definition the scopes are bound to. It is provisioned on the
    /// grantor's store before any grant is minted.
    pub protocol_definition: ProtocolDefinition,

    /// Requested scopes, in the order the requester listed them.
    pub scopes: Vec<PermissionScope>,
}

impl PermissionRequest {
    /// Create a request for explicit scopes.
    pub fn new(protocol_definition: ProtocolDefinition, scopes: Vec<PermissionScope>) -> Self {
        Self {
            protocol_definition,
            scopes,
        }
    }

    /// Build a request from high level permissions, every scope narrowed to
    /// the definition's protocol. Duplicate permissions collapse.
    pub fn for_protocol(
        protocol_definition: ProtocolDefinition,
        permissions: &[Permission],
    ) -> Self {
        let protocol = protocol_definition.protocol.clone();
        let mut scopes: Vec<PermissionScope> = Vec::new();
        for kind in permissions.iter().flat_map(|p| p.scope_kinds()) {
            let scope = PermissionScope::new(*kind).bind(&protocol);
            if !scopes.contains(&scope) {
                scopes.push(scope);
            }
        }
        Self::new(protocol_definition, scopes)
    }

    /// The protocol these scopes are requested for.
    pub fn protocol(&self) -> &ProtocolUri {
        &self.protocol_definition.protocol
    }

    /// Check that every protocol-scoped scope references this request's
    /// protocol.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        let expected = self.protocol();
        for scope in &self.scopes {
            if let Some(found) = scope.protocol() {
                if found != expected {
                    return Err(ProtocolError::ScopeProtocolMismatch {
                        expected: expected.to_string(),
                        found: found.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Scopes as they are granted: every scope that may carry a protocol is
    /// narrowed to this request's protocol.
    pub fn bound_scopes(&self) -> impl Iterator<Item = PermissionScope> + '_ {
        let protocol = self.protocol();
        self.scopes.iter().cloned().map(move |scope| scope.bind(protocol))
    }
}

/// A request from a third-party application, decoded from either transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRequest {
    /// Schema version of this request.
    #[serde(default = "current_version")]
    pub version: u32,

    /// Requester identity: the popup opener's origin or the client id
    /// carried inside an out-of-band request.
    #[serde(alias = "client_id", alias = "origin")]
    pub origin_or_client_id: String,

    /// The grantor identity the requester asks for, if it names one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_did: Option<Did>,

    /// Requested permissions, one entry per protocol.
    pub permission_requests: Vec<PermissionRequest>,
}

impl ConnectionRequest {
    /// Create a request at the current schema version.
    pub fn new(
        origin_or_client_id: impl Into<String>,
        requested_did: Option<Did>,
        permission_requests: Vec<PermissionRequest>,
    ) -> Self {
        Self {
            version: CONNECTION_REQUEST_VERSION,
            origin_or_client_id: origin_or_client_id.into(),
            requested_did,
            permission_requests,
        }
    }

    /// Check the schema version and that the request asks for something.
    ///
    /// Scope/protocol binding is checked separately, right before issuance,
    /// so that a mismatch fails the handshake rather than the decode.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.version != CONNECTION_REQUEST_VERSION {
            return Err(ProtocolError::UnsupportedVersion(self.version));
        }
        if self.permission_requests.is_empty() {
            return Err(ProtocolError::EmptyRequest);
        }
        Ok(())
    }
}
