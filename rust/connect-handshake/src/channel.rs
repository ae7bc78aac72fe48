//! Popup transport and the response channel abstraction.
//!
//! The popup and its opener exchange JSON messages. [`popup`] creates both
//! ends of a bounded channel bound to the opener's origin. The wallet end,
//! [`PopupChannel`], only accepts a declared set of message tags from that
//! origin and only while the opener is still open.

use std::sync::Arc;

use async_trait::async_trait;
use connect_common::ConditionalSend;
use connect_protocol::{
    AUTHORIZATION_REQUEST, AuthorizationResponse, ConnectionRequest, InboundMessage,
    OutboundMessage, PermissionGrant, PortableIdentity, Refusal, message_type,
};
use serde_json::Value;
use tokio::sync::{mpsc, watch};

use crate::{
    ChannelError, ConfirmationCode, DecodeError, HandshakeConfig, HandshakeError, decode_popup,
};

/// Tags the wallet accepts from a popup opener.
pub const ACCEPTED_TAGS: &[&str] = &[AUTHORIZATION_REQUEST];

/// What the requester is told at the end of a handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Access was granted.
    Granted {
        /// Credentials of the delegate the grants were issued to
        delegate: PortableIdentity,
        /// Grants issued to the delegate
        grants: Vec<PermissionGrant>,
        /// Code the user reads out to the requester, on the QR transport
        confirmation: Option<ConfirmationCode>,
    },
    /// No access was granted.
    Refused(Refusal),
}

/// Delivers a handshake outcome over the transport the request arrived on
/// and owns the wallet surface the handshake runs on.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait ResponseChannel: ConditionalSend {
    /// Whether the requester can no longer receive a response.
    fn is_orphaned(&self) -> bool {
        false
    }

    /// Deliver `outcome` to the requester.
    async fn deliver(&mut self, outcome: &Outcome) -> Result<(), ChannelError>;

    /// Tear the surface down. Invoked on every terminal transition.
    async fn close(&mut self);
}

/// A window message together with the origin it was posted from or to.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Sender origin for inbound messages, target origin for outbound ones
    pub origin: String,
    /// The JSON message
    pub message: Value,
}

/// Create a popup channel bound to `opener_origin`.
pub fn popup(opener_origin: impl Into<String>, capacity: usize) -> (PopupChannel, PopupOpener) {
    let capacity = capacity.max(1);
    let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
    let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
    let (opener_tx, opener_rx) = watch::channel(true);
    let (window_tx, window_rx) = watch::channel(true);

    let channel = PopupChannel {
        origin: opener_origin.into(),
        accepted: ACCEPTED_TAGS,
        inbound: inbound_rx,
        outbound: outbound_tx,
        opener: opener_rx,
        window: Arc::new(window_tx),
    };

    let opener = PopupOpener {
        inbound: inbound_tx,
        outbound: outbound_rx,
        alive: opener_tx,
        window: window_rx,
    };

    (channel, opener)
}

fn opener_alive(opener: &watch::Receiver<bool>) -> bool {
    opener.has_changed().is_ok() && *opener.borrow()
}

/// The wallet end of a popup channel.
pub struct PopupChannel {
    origin: String,
    accepted: &'static [&'static str],
    inbound: mpsc::Receiver<Envelope>,
    outbound: mpsc::Sender<Envelope>,
    opener: watch::Receiver<bool>,
    window: Arc<watch::Sender<bool>>,
}

impl PopupChannel {
    /// Origin of the window that opened the popup
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Whether the opener window is still open
    pub fn is_opener_alive(&self) -> bool {
        opener_alive(&self.opener)
    }

    /// Whether the popup window is still open
    pub fn is_open(&self) -> bool {
        *self.window.borrow()
    }

    /// Tell the opener the wallet surface has mounted.
    pub fn loaded(&self) -> Result<(), ChannelError> {
        let message = serde_json::to_value(OutboundMessage::Loaded)
            .map_err(|error| ChannelError::Encoding(error.to_string()))?;
        post(&self.outbound, &self.origin, message)
    }

    /// Wait for the next actionable authorization request.
    ///
    /// Messages from other origins or with unaccepted tags are ignored. A
    /// request that arrives after the opener closed is orphaned: the popup
    /// closes itself and reports [`ChannelError::OpenerClosed`].
    pub async fn next_request(&mut self) -> Result<ConnectionRequest, HandshakeError> {
        loop {
            let envelope = self.inbound.recv().await.ok_or(ChannelError::Closed)?;

            if envelope.origin != self.origin {
                tracing::warn!(
                    origin = %envelope.origin,
                    expected = %self.origin,
                    "Ignoring message from unexpected origin"
                );
                continue;
            }

            match message_type(&envelope.message) {
                Some(tag) if self.accepted.contains(&tag) => {}
                tag => {
                    tracing::warn!(?tag, "Ignoring message with unaccepted type");
                    continue;
                }
            }

            if !self.is_opener_alive() {
                tracing::warn!(origin = %self.origin, "Ignoring orphaned request, closing popup");
                self.close();
                return Err(ChannelError::OpenerClosed.into());
            }

            let message = InboundMessage::from_value(envelope.message)
                .map_err(|error| DecodeError::Invalid(error.to_string()))?;
            return Ok(decode_popup(&self.origin, message)?);
        }
    }

    /// A response channel that answers the opener and closes this popup.
    pub fn responder(&self, config: &HandshakeConfig) -> PopupResponder {
        PopupResponder {
            origin: self.origin.clone(),
            outbound: self.outbound.clone(),
            opener: self.opener.clone(),
            window: Arc::clone(&self.window),
            disclose_outcome: config.disclose_outcome,
        }
    }

    /// Close the popup window.
    pub fn close(&self) {
        self.window.send_replace(false);
    }
}

fn post(outbound: &mpsc::Sender<Envelope>, origin: &str, message: Value) -> Result<(), ChannelError> {
    outbound
        .try_send(Envelope {
            origin: origin.to_string(),
            message,
        })
        .map_err(|error| match error {
            mpsc::error::TrySendError::Full(_) => ChannelError::Full,
            mpsc::error::TrySendError::Closed(_) => ChannelError::Closed,
        })
}

/// Answers a popup opener and closes the popup.
pub struct PopupResponder {
    origin: String,
    outbound: mpsc::Sender<Envelope>,
    opener: watch::Receiver<bool>,
    window: Arc<watch::Sender<bool>>,
    disclose_outcome: bool,
}

impl PopupResponder {
    fn response(&self, outcome: &Outcome) -> AuthorizationResponse {
        match outcome {
            Outcome::Granted {
                delegate, grants, ..
            } => AuthorizationResponse::granted(delegate.clone(), grants.clone()),
            Outcome::Refused(reason) => {
                AuthorizationResponse::refused(self.disclose_outcome.then_some(*reason))
            }
        }
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl ResponseChannel for PopupResponder {
    fn is_orphaned(&self) -> bool {
        !opener_alive(&self.opener)
    }

    async fn deliver(&mut self, outcome: &Outcome) -> Result<(), ChannelError> {
        if self.is_orphaned() {
            return Err(ChannelError::OpenerClosed);
        }

        let message = serde_json::to_value(OutboundMessage::AuthorizationResponse(
            self.response(outcome),
        ))
        .map_err(|error| ChannelError::Encoding(error.to_string()))?;

        post(&self.outbound, &self.origin, message)
    }

    async fn close(&mut self) {
        self.window.send_replace(false);
    }
}

/// The opener end of a popup channel, held by the page that opened the
/// wallet (or by a test standing in for it).
pub struct PopupOpener {
    inbound: mpsc::Sender<Envelope>,
    outbound: mpsc::Receiver<Envelope>,
    alive: watch::Sender<bool>,
    window: watch::Receiver<bool>,
}

impl PopupOpener {
    /// Post `message` to the popup as if sent from `origin`.
    pub fn post(&self, origin: impl Into<String>, message: Value) -> Result<(), ChannelError> {
        self.inbound
            .try_send(Envelope {
                origin: origin.into(),
                message,
            })
            .map_err(|error| match error {
                mpsc::error::TrySendError::Full(_) => ChannelError::Full,
                mpsc::error::TrySendError::Closed(_) => ChannelError::Closed,
            })
    }

    /// Next message posted by the popup.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.outbound.recv().await
    }

    /// Next message posted by the popup, if one is waiting.
    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.outbound.try_recv().ok()
    }

    /// The opener window goes away.
    pub fn close(&self) {
        self.alive.send_replace(false);
    }

    /// Whether the popup window is still open.
    pub fn is_popup_open(&self) -> bool {
        *self.window.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use connect_protocol::LOADED;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use testresult::TestResult;

    const ORIGIN: &str = "https://app.example";

    fn authorization_request() -> Value {
        json!({
            "type": "authorization-request",
            "did": "did:example:abc",
            "permissions": [{
                "protocol_definition": {
                    "protocol": "https://x/invoice",
                    "published": false,
                    "types": {},
                    "structure": {}
                },
                "scopes": [{
                    "interface": "Records",
                    "method": "Write",
                    "protocol": "https://x/invoice"
                }]
            }]
        })
    }

    #[tokio::test]
    async fn it_announces_itself_to_the_opener() -> TestResult {
        let (channel, mut opener) = popup(ORIGIN, 4);
        channel.loaded()?;

        let envelope = opener.try_recv().ok_or("no message")?;
        assert_eq!(envelope.origin, ORIGIN);
        assert_eq!(message_type(&envelope.message), Some(LOADED));
        Ok(())
    }

    #[tokio::test]
    async fn it_ignores_foreign_origins_and_tags() -> TestResult {
        let (mut channel, opener) = popup(ORIGIN, 4);
        opener.post("https://evil.example", authorization_request())?;
        opener.post(ORIGIN, json!({ "type": "something-else" }))?;
        opener.post(ORIGIN, authorization_request())?;

        let request = channel.next_request().await?;

        assert_eq!(request.origin_or_client_id, ORIGIN);
        assert_eq!(request.requested_did, Some("did:example:abc".parse()?));
        Ok(())
    }

    #[tokio::test]
    async fn it_self_closes_on_orphaned_requests() -> TestResult {
        let (mut channel, opener) = popup(ORIGIN, 4);
        opener.post(ORIGIN, authorization_request())?;
        opener.close();

        let result = channel.next_request().await;

        assert_eq!(result, Err(HandshakeError::Channel(ChannelError::OpenerClosed)));
        assert!(!opener.is_popup_open());
        Ok(())
    }

    #[tokio::test]
    async fn it_rejects_malformed_requests_from_the_opener() -> TestResult {
        let (mut channel, opener) = popup(ORIGIN, 4);
        opener.post(ORIGIN, json!({ "type": "authorization-request" }))?;

        assert!(matches!(
            channel.next_request().await,
            Err(HandshakeError::Decode(DecodeError::Invalid(_)))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn it_is_bounded() -> TestResult {
        let (_channel, opener) = popup(ORIGIN, 1);
        opener.post(ORIGIN, authorization_request())?;

        assert_eq!(
            opener.post(ORIGIN, authorization_request()),
            Err(ChannelError::Full)
        );
        Ok(())
    }

    #[tokio::test]
    async fn it_answers_the_exact_origin_and_closes() -> TestResult {
        let (channel, mut opener) = popup(ORIGIN, 4);
        let mut responder = channel.responder(&HandshakeConfig::default());

        responder.deliver(&Outcome::Refused(Refusal::Denied)).await?;
        responder.close().await;

        let envelope = opener.try_recv().ok_or("no response")?;
        assert_eq!(envelope.origin, ORIGIN);
        assert_eq!(
            envelope.message,
            json!({ "type": "authorization-response", "reason": "denied" })
        );
        assert!(!opener.is_popup_open());
        Ok(())
    }

    #[tokio::test]
    async fn it_withholds_the_reason_when_not_disclosing() -> TestResult {
        let (channel, mut opener) = popup(ORIGIN, 4);
        let config = HandshakeConfig::default().with_disclose_outcome(false);
        let mut responder = channel.responder(&config);

        responder.deliver(&Outcome::Refused(Refusal::Failed)).await?;

        let envelope = opener.try_recv().ok_or("no response")?;
        assert_eq!(envelope.message, json!({ "type": "authorization-response" }));
        Ok(())
    }

    #[tokio::test]
    async fn it_does_not_wait_on_an_undrained_opener() -> TestResult {
        let (channel, _opener) = popup(ORIGIN, 1);
        channel.loaded()?;
        let mut responder = channel.responder(&HandshakeConfig::default());

        assert_eq!(
            responder.deliver(&Outcome::Refused(Refusal::Denied)).await,
            Err(ChannelError::Full)
        );
        Ok(())
    }

    #[tokio::test]
    async fn it_does_not_answer_a_closed_opener() -> TestResult {
        let (channel, opener) = popup(ORIGIN, 4);
        let mut responder = channel.responder(&HandshakeConfig::default());
        opener.close();

        assert!(responder.is_orphaned());
        assert_eq!(
            responder.deliver(&Outcome::Refused(Refusal::Denied)).await,
            Err(ChannelError::OpenerClosed)
        );
        Ok(())
    }
}
