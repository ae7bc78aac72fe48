//! Window messages exchanged between a requester page and the wallet popup.
//!
//! Every message is a JSON object tagged by `type`. The wallet accepts a
//! single inbound tag and emits two outbound ones:
//!
//! ```text
//! requester ──authorization-request──▶ wallet
//! requester ◀──────────loaded───────── wallet   (on mount)
//! requester ◀──authorization-response── wallet   (then the popup closes)
//! ```

use crate::{Did, PermissionGrant, PermissionRequest, PortableIdentity, ProtocolError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{self, Display, Formatter};

/// Tag of an inbound authorization request.
pub const AUTHORIZATION_REQUEST: &str = "authorization-request";
/// Tag of the signal sent when the wallet surface has mounted.
pub const LOADED: &str = "loaded";
/// Tag of the wallet's answer.
pub const AUTHORIZATION_RESPONSE: &str = "authorization-response";

/// Read the `type` tag of a raw window message.
pub fn message_type(message: &Value) -> Option<&str> {
    message.get("type").and_then(Value::as_str)
}

/// Messages the wallet accepts from the requester page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum InboundMessage {
    /// Ask the wallet to authorize a set of permissions.
    AuthorizationRequest {
        /// Grantor the requester would like, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        did: Option<Did>,
        /// Requested permissions.
        permissions: Vec<PermissionRequest>,
    },
}

impl InboundMessage {
    /// Decode a raw window message, rejecting any tag outside the accepted
    /// set before looking at the payload.
    pub fn from_value(message: Value) -> Result<Self, ProtocolError> {
        match message_type(&message) {
            Some(AUTHORIZATION_REQUEST) => serde_json::from_value(message)
                .map_err(|error| ProtocolError::MalformedMessage(error.to_string())),
            Some(other) => Err(ProtocolError::UnexpectedMessage(other.to_string())),
            None => Err(ProtocolError::MalformedMessage(
                "message has no type tag".into(),
            )),
        }
    }
}

/// Why a response carries no delegate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Refusal {
    /// The user declined the request; retrying will prompt them again.
    Denied,
    /// The wallet could not complete the authorization.
    Failed,
}

impl Display for Refusal {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Refusal::Denied => "denied",
            Refusal::Failed => "failed",
        })
    }
}

/// Outcome of a handshake as seen by the requester.
///
/// Absence of `delegate_did` means no access was granted, whatever the
/// reason.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationResponse {
    /// Credentials of the delegate the grants were issued to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegate_did: Option<PortableIdentity>,

    /// Grants issued to the delegate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grants: Option<Vec<PermissionGrant>>,

    /// Why no delegate was returned, when the wallet discloses it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<Refusal>,
}

impl AuthorizationResponse {
    /// A successful response.
    pub fn granted(delegate: PortableIdentity, grants: Vec<PermissionGrant>) -> Self {
        Self {
            delegate_did: Some(delegate),
            grants: Some(grants),
            reason: None,
        }
    }

    /// An empty response, optionally explaining why.
    pub fn refused(reason: Option<Refusal>) -> Self {
        Self {
            delegate_did: None,
            grants: None,
            reason,
        }
    }

    /// Whether the requester received a delegate.
    pub fn is_granted(&self) -> bool {
        self.delegate_did.is_some()
    }
}

/// Messages the wallet posts back to the requester page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OutboundMessage {
    /// The wallet surface mounted and is ready for a request.
    Loaded,
    /// The handshake outcome.
    AuthorizationResponse(AuthorizationResponse),
}
