//! Permission grants.

use crate::{Did, PermissionScope, ProtocolUri, is_sync};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A permission granted by `grantor` to `grantee`.
///
/// Grants are immutable once minted. There is no update, only issuance and
/// revocation (by `id`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    /// Identifier assigned by the store that recorded the grant.
    pub id: String,
    /// Identity whose data the grant covers.
    pub grantor: Did,
    /// Delegate identity the grant is issued to.
    pub grantee: Did,
    /// What the grantee may do.
    pub scope: PermissionScope,
    /// When the grant was minted.
    pub issued_at: DateTime<Utc>,
}

/// Presentation view over a set of grants, grouped by protocol.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantSummary {
    protocols: BTreeMap<Option<ProtocolUri>, Vec<PermissionScope>>,
}

impl GrantSummary {
    /// Summarize `grants`.
    pub fn new<'a>(grants: impl IntoIterator<Item = &'a PermissionGrant>) -> Self {
        let mut protocols: BTreeMap<Option<ProtocolUri>, Vec<PermissionScope>> = BTreeMap::new();
        for grant in grants {
            protocols
                .entry(grant.scope.protocol().cloned())
                .or_default()
                .push(grant.scope.clone());
        }
        Self { protocols }
    }

    /// Protocols covered by at least one grant. Grants with no protocol
    /// are not listed.
    pub fn protocols(&self) -> impl Iterator<Item = &ProtocolUri> {
        self.protocols.keys().flatten()
    }

    /// Scopes granted for `protocol`.
    pub fn scopes(&self, protocol: &ProtocolUri) -> &[PermissionScope] {
        self.protocols
            .get(&Some(protocol.clone()))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Whether the grants for `protocol` amount to sync access.
    pub fn sync(&self, protocol: &ProtocolUri) -> bool {
        is_sync(self.scopes(protocol))
    }
}
