use crate::{Interface, Method};

/// Errors raised while validating connect handshake data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// A string could not be parsed as a `did:<method>:<id>` identifier.
    #[error("Invalid DID '{0}'")]
    InvalidDid(String),

    /// The protocol reference is not an absolute URI.
    #[error("Invalid protocol URI '{0}'")]
    InvalidProtocolUri(String),

    /// The `{interface, method}` pair does not name a grantable scope.
    #[error("Unsupported permission scope {interface}/{method}")]
    UnsupportedScope {
        /// Requested interface.
        interface: Interface,
        /// Requested method.
        method: Method,
    },

    /// The request was produced for a schema version this wallet does not speak.
    #[error("Unsupported connection request version {0}")]
    UnsupportedVersion(u32),

    /// The request asks for nothing.
    #[error("Connection request carries no permission requests")]
    EmptyRequest,

    /// A scope references a protocol other than the one it is requested for.
    #[error("Scope references protocol '{found}' but was requested for '{expected}'")]
    ScopeProtocolMismatch {
        /// Protocol of the enclosing definition.
        expected: String,
        /// Protocol named by the scope.
        found: String,
    },

    /// A window message carried a `type` tag outside the accepted set.
    #[error("Unexpected message type '{0}'")]
    UnexpectedMessage(String),

    /// A message could not be decoded into its declared shape.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// A protocol definition could not be rendered canonically.
    #[error("Could not canonicalize protocol definition: {0}")]
    Canonicalization(String),
}
