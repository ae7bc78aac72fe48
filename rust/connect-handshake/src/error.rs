use crate::State;
use connect_agent::AgentError;
use connect_protocol::{Did, ProtocolError, ProtocolUri};
use thiserror::Error;

/// A transport payload could not be turned into a connection request.
///
/// Decoding happens before any side effect, so every variant is safe to
/// retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// A required query parameter is absent or empty.
    #[error("Missing query parameter '{0}'")]
    MissingParameter(&'static str),

    /// The sealed request could not be fetched.
    #[error("Connection request is unreachable: {0}")]
    Unreachable(String),

    /// The payload could not be parsed, opened or validated.
    #[error("Invalid connection request: {0}")]
    Invalid(String),
}

impl From<AgentError> for DecodeError {
    fn from(error: AgentError) -> Self {
        match error {
            AgentError::Unreachable { .. }
            | AgentError::Failure { .. }
            | AgentError::Configuration(_) => {
                DecodeError::Unreachable(error.to_string())
            }
            AgentError::Conflict { .. } | AgentError::Invalid(_) => {
                DecodeError::Invalid(error.to_string())
            }
        }
    }
}

/// Errors of the wallet surface a handshake runs on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The window that opened the popup is gone.
    #[error("Opener window has closed")]
    OpenerClosed,

    /// The other end of the channel was dropped.
    #[error("Channel is closed")]
    Closed,

    /// The channel is at capacity.
    #[error("Channel is full")]
    Full,

    /// The foreground resource backing the surface is held elsewhere.
    #[error("Surface is busy")]
    SurfaceBusy,

    /// An outbound message could not be encoded.
    #[error("Could not encode message: {0}")]
    Encoding(String),
}

/// Errors raised by the authorization handshake.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    /// The request could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The grantor's store already holds a different definition under the
    /// requested protocol URI.
    #[error("Protocol {protocol} is already configured with a different definition")]
    ProtocolConflict {
        /// The contested protocol.
        protocol: ProtocolUri,
    },

    /// A scope names a protocol other than the one it is requested for.
    #[error("Scope references protocol '{found}' but was requested for '{expected}'")]
    ScopeProtocolMismatch {
        /// Protocol of the enclosing definition.
        expected: String,
        /// Protocol named by the scope.
        found: String,
    },

    /// The agent reported a non-success, non-conflict status.
    #[error("Could not authorize: {operation} failed: {source}")]
    Remote {
        /// Agent operation that failed.
        operation: &'static str,
        /// Status reported by the agent.
        source: AgentError,
    },

    /// A handshake is already in progress on this surface.
    #[error("A handshake session is already active")]
    SessionActive,

    /// The requested action is not valid in the current state.
    #[error("Cannot {action} while {state}")]
    InvalidTransition {
        /// State the machine was in.
        state: State,
        /// Attempted action.
        action: &'static str,
    },

    /// The identity is not one of the wallet's own.
    #[error("{0} is not an identity of this wallet")]
    UnknownGrantor(Did),

    /// Approval named a grantor other than the one the request resolved to.
    #[error("Approval by {found} does not match the selected grantor {expected}")]
    GrantorMismatch {
        /// Grantor the session resolved.
        expected: Did,
        /// Grantor carried by the approval.
        found: Did,
    },

    /// The wallet surface failed.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Handshake data broke a protocol invariant.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl HandshakeError {
    pub(crate) fn remote(operation: &'static str) -> impl FnOnce(AgentError) -> Self {
        move |source| HandshakeError::Remote { operation, source }
    }
}
