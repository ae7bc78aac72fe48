//! Permission scopes.
//!
//! A scope is an `{interface, method}` pair, optionally narrowed to a single
//! protocol. Only the pairs enumerated by [`ScopeKind`] can be granted; any
//! other combination is rejected when the scope is decoded.

use crate::{ProtocolError, ProtocolUri};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Interface of the decentralized data store a scope applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Interface {
    /// Record level operations.
    Records,
    /// Raw message log operations, used for sync.
    Messages,
    /// Protocol configuration lookups.
    Protocols,
}

impl Display for Interface {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Interface::Records => "Records",
            Interface::Messages => "Messages",
            Interface::Protocols => "Protocols",
        })
    }
}

/// Method within an [`Interface`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Method {
    #[allow(missing_docs)]
    Read,
    #[allow(missing_docs)]
    Write,
    #[allow(missing_docs)]
    Delete,
    #[allow(missing_docs)]
    Query,
    #[allow(missing_docs)]
    Subscribe,
    #[allow(missing_docs)]
    Configure,
}

impl Display for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Read => "Read",
            Method::Write => "Write",
            Method::Delete => "Delete",
            Method::Query => "Query",
            Method::Subscribe => "Subscribe",
            Method::Configure => "Configure",
        })
    }
}

/// The closed set of grantable `{interface, method}` pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScopeKind {
    #[allow(missing_docs)]
    RecordsRead,
    #[allow(missing_docs)]
    RecordsWrite,
    #[allow(missing_docs)]
    RecordsDelete,
    #[allow(missing_docs)]
    RecordsQuery,
    #[allow(missing_docs)]
    RecordsSubscribe,
    #[allow(missing_docs)]
    MessagesRead,
    #[allow(missing_docs)]
    MessagesQuery,
    #[allow(missing_docs)]
    MessagesSubscribe,
    #[allow(missing_docs)]
    ProtocolsQuery,
}

impl ScopeKind {
    /// Resolve an `{interface, method}` pair.
    pub fn from_parts(interface: Interface, method: Method) -> Result<Self, ProtocolError> {
        use Interface::*;
        use Method::*;

        Ok(match (interface, method) {
            (Records, Read) => ScopeKind::RecordsRead,
            (Records, Write) => ScopeKind::RecordsWrite,
            (Records, Delete) => ScopeKind::RecordsDelete,
            (Records, Query) => ScopeKind::RecordsQuery,
            (Records, Subscribe) => ScopeKind::RecordsSubscribe,
            (Messages, Read) => ScopeKind::MessagesRead,
            (Messages, Query) => ScopeKind::MessagesQuery,
            (Messages, Subscribe) => ScopeKind::MessagesSubscribe,
            (Protocols, Query) => ScopeKind::ProtocolsQuery,
            (interface, method) => return Err(ProtocolError::UnsupportedScope { interface, method }),
        })
    }

    /// The interface this kind belongs to.
    pub fn interface(&self) -> Interface {
        match self {
            ScopeKind::RecordsRead
            | ScopeKind::RecordsWrite
            | ScopeKind::RecordsDelete
            | ScopeKind::RecordsQuery
            | ScopeKind::RecordsSubscribe => Interface::Records,
            ScopeKind::MessagesRead | ScopeKind::MessagesQuery | ScopeKind::MessagesSubscribe => {
                Interface::Messages
            }
            ScopeKind::ProtocolsQuery => Interface::Protocols,
        }
    }

    /// The method this kind performs.
    pub fn method(&self) -> Method {
        match self {
            ScopeKind::RecordsRead | ScopeKind::MessagesRead => Method::Read,
            ScopeKind::RecordsWrite => Method::Write,
            ScopeKind::RecordsDelete => Method::Delete,
            ScopeKind::RecordsQuery | ScopeKind::MessagesQuery | ScopeKind::ProtocolsQuery => {
                Method::Query
            }
            ScopeKind::RecordsSubscribe | ScopeKind::MessagesSubscribe => Method::Subscribe,
        }
    }

    /// Whether scopes of this kind can be narrowed to a protocol.
    ///
    /// Protocol lookups are global to the store and never carry one.
    pub fn accepts_protocol(&self) -> bool {
        !matches!(self, ScopeKind::ProtocolsQuery)
    }
}

impl Display for ScopeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            self.interface().to_string().to_lowercase(),
            self.method().to_string().to_lowercase()
        )
    }
}

/// Serialized form of a scope as it travels on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScopeWire {
    interface: Interface,
    method: Method,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    protocol: Option<ProtocolUri>,
}

/// A single grantable permission.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "ScopeWire", into = "ScopeWire")]
pub struct PermissionScope {
    kind: ScopeKind,
    protocol: Option<ProtocolUri>,
}

impl PermissionScope {
    /// A scope not narrowed to any protocol.
    pub fn new(kind: ScopeKind) -> Self {
        Self {
            kind,
            protocol: None,
        }
    }

    /// A scope narrowed to `protocol`.
    pub fn for_protocol(kind: ScopeKind, protocol: ProtocolUri) -> Result<Self, ProtocolError> {
        if !kind.accepts_protocol() {
            return Err(ProtocolError::UnsupportedScope {
                interface: kind.interface(),
                method: kind.method(),
            });
        }
        Ok(Self {
            kind,
            protocol: Some(protocol),
        })
    }

    /// Which `{interface, method}` pair this scope grants.
    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    /// The protocol this scope is narrowed to, if any.
    pub fn protocol(&self) -> Option<&ProtocolUri> {
        self.protocol.as_ref()
    }

    /// Narrow this scope to `protocol` when it may carry one and does not
    /// already. Existing references are left untouched.
    pub fn bind(mut self, protocol: &ProtocolUri) -> Self {
        if self.kind.accepts_protocol() && self.protocol.is_none() {
            self.protocol = Some(protocol.clone());
        }
        self
    }
}

impl TryFrom<ScopeWire> for PermissionScope {
    type Error = ProtocolError;

    fn try_from(wire: ScopeWire) -> Result<Self, Self::Error> {
        let kind = ScopeKind::from_parts(wire.interface, wire.method)?;
        match wire.protocol {
            Some(protocol) => Self::for_protocol(kind, protocol),
            None => Ok(Self::new(kind)),
        }
    }
}

impl From<PermissionScope> for ScopeWire {
    fn from(scope: PermissionScope) -> Self {
        Self {
            interface: scope.kind.interface(),
            method: scope.kind.method(),
            protocol: scope.protocol,
        }
    }
}

impl Display for PermissionScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.protocol {
            Some(protocol) => write!(f, "{}/{}", self.kind, protocol),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// High level permission a requester can ask for on a protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    #[allow(missing_docs)]
    Read,
    #[allow(missing_docs)]
    Write,
    #[allow(missing_docs)]
    Delete,
    #[allow(missing_docs)]
    Query,
    #[allow(missing_docs)]
    Subscribe,
    /// Replicate the protocol's message log (read, query and subscribe).
    Sync,
}

impl Permission {
    /// Scope kinds this permission expands to.
    pub fn scope_kinds(&self) -> &'static [ScopeKind] {
        match self {
            Permission::Read => &[ScopeKind::RecordsRead],
            Permission::Write => &[ScopeKind::RecordsWrite],
            Permission::Delete => &[ScopeKind::RecordsDelete],
            Permission::Query => &[ScopeKind::RecordsQuery],
            Permission::Subscribe => &[ScopeKind::RecordsSubscribe],
            Permission::Sync => &[
                ScopeKind::MessagesRead,
                ScopeKind::MessagesQuery,
                ScopeKind::MessagesSubscribe,
            ],
        }
    }
}

/// Whether a set of scopes amounts to sync access: a messages read plus a
/// messages query or subscribe. Derived for presentation, never stored.
pub fn is_sync<'a>(scopes: impl IntoIterator<Item = &'a PermissionScope>) -> bool {
    let mut read = false;
    let mut listen = false;
    for scope in scopes {
        match scope.kind() {
            ScopeKind::MessagesRead => read = true,
            ScopeKind::MessagesQuery | ScopeKind::MessagesSubscribe => listen = true,
            _ => {}
        }
    }
    read && listen
}
