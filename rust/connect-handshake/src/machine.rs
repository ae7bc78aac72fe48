//! The authorization state machine.

use std::fmt::{self, Debug, Display, Formatter};

use connect_agent::Agent;
use connect_protocol::{ConnectionRequest, Did, PermissionGrant, Refusal};
use tracing::Instrument;

use crate::{
    ChannelError, ConfirmationCode, DecodeError, Failure, GrantIssuer, HandshakeConfig,
    HandshakeError, Outcome, PopupChannel, ResponseChannel, decode_qr,
};

/// Where a handshake state machine is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// No session
    Idle,
    /// A request was decoded; no grantor has been resolved yet
    RequestReceived,
    /// Waiting for the user to approve or deny
    AwaitingApproval,
    /// Making sure the requested protocols exist on the grantor's store
    Provisioning,
    /// Minting the delegate and its grants
    Issuing,
    /// Delivering the outcome
    Responding,
    /// The user denied the request
    Denied,
    /// The handshake failed
    Failed,
    /// The handshake finished and its surface is gone
    Closed,
}

impl State {
    /// Whether a session exists in this state.
    pub fn is_active(&self) -> bool {
        !matches!(self, State::Idle | State::Failed | State::Closed)
    }
}

impl Display for State {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            State::Idle => "idle",
            State::RequestReceived => "request-received",
            State::AwaitingApproval => "awaiting-approval",
            State::Provisioning => "provisioning",
            State::Issuing => "issuing",
            State::Responding => "responding",
            State::Denied => "denied",
            State::Failed => "failed",
            State::Closed => "closed",
        })
    }
}

/// The transport a request arrived on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    /// In-page popup opened by `origin`
    Popup {
        /// Origin of the opener window
        origin: String,
    },
    /// Out-of-band QR scan
    Qr,
}

/// Memory-resident state of one handshake. Dropped when the handshake
/// reaches a terminal state.
pub struct HandshakeSession {
    request: ConnectionRequest,
    transport: Transport,
    grantor: Option<Did>,
    delegate: Option<Did>,
    grants: Vec<PermissionGrant>,
    confirmation: Option<ConfirmationCode>,
    channel: Box<dyn ResponseChannel>,
}

impl HandshakeSession {
    /// The decoded request
    pub fn request(&self) -> &ConnectionRequest {
        &self.request
    }

    /// The transport the request arrived on
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// The resolved grantor candidate
    pub fn grantor(&self) -> Option<&Did> {
        self.grantor.as_ref()
    }

    /// The delegate minted for this handshake
    pub fn delegate(&self) -> Option<&Did> {
        self.delegate.as_ref()
    }

    /// Grants issued so far
    pub fn grants(&self) -> &[PermissionGrant] {
        &self.grants
    }

    /// Confirmation code shown on the QR transport
    pub fn confirmation(&self) -> Option<&ConfirmationCode> {
        self.confirmation.as_ref()
    }
}

impl Debug for HandshakeSession {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandshakeSession")
            .field("request", &self.request)
            .field("transport", &self.transport)
            .field("grantor", &self.grantor)
            .field("delegate", &self.delegate)
            .field("grants", &self.grants.len())
            .finish_non_exhaustive()
    }
}

/// Drives one wallet surface through connect handshakes, one at a time.
pub struct AuthorizationMachine<A> {
    agent: A,
    config: HandshakeConfig,
    state: State,
    session: Option<HandshakeSession>,
    failure: Option<Failure>,
}

impl<A> AuthorizationMachine<A>
where
    A: Agent,
{
    /// A machine with default configuration
    pub fn new(agent: A) -> Self {
        Self::with_config(agent, HandshakeConfig::default())
    }

    /// A machine with the given configuration
    pub fn with_config(agent: A, config: HandshakeConfig) -> Self {
        Self {
            agent,
            config,
            state: State::Idle,
            session: None,
            failure: None,
        }
    }

    /// Current state
    pub fn state(&self) -> State {
        self.state
    }

    /// The active session, if any
    pub fn session(&self) -> Option<&HandshakeSession> {
        self.session.as_ref()
    }

    /// How the most recent handshake failed, if it did
    pub fn failure(&self) -> Option<&Failure> {
        self.failure.as_ref()
    }

    /// The agent handshakes are run against
    pub fn agent(&self) -> &A {
        &self.agent
    }

    /// The configuration
    pub fn config(&self) -> &HandshakeConfig {
        &self.config
    }

    /// Start a handshake from a scanned QR URI. The outcome will be shown
    /// on `channel`.
    pub async fn receive_qr<C>(&mut self, uri: &str, channel: C) -> Result<State, HandshakeError>
    where
        C: ResponseChannel + 'static,
    {
        self.ensure_available()?;

        let request = match decode_qr(&self.agent, uri).await {
            Ok(request) => request,
            Err(error) => return Err(self.reject(error)),
        };

        self.receive(request, Transport::Qr, Box::new(channel))
            .await
    }

    /// Start a handshake from the next request posted to `popup`.
    pub async fn receive_popup(&mut self, popup: &mut PopupChannel) -> Result<State, HandshakeError> {
        self.ensure_available()?;

        let request = match popup.next_request().await {
            Ok(request) => request,
            Err(HandshakeError::Decode(error)) => return Err(self.reject(error)),
            Err(error) => return Err(error),
        };

        let transport = Transport::Popup {
            origin: popup.origin().to_string(),
        };
        let responder = popup.responder(&self.config);
        self.receive(request, transport, Box::new(responder)).await
    }

    /// Start a handshake from a request decoded elsewhere.
    ///
    /// When the request names a grantor the machine resolves it right away
    /// and moves to [`State::AwaitingApproval`]; otherwise it waits in
    /// [`State::RequestReceived`] for [`select_grantor`](Self::select_grantor).
    pub async fn receive(
        &mut self,
        request: ConnectionRequest,
        transport: Transport,
        channel: Box<dyn ResponseChannel>,
    ) -> Result<State, HandshakeError> {
        self.ensure_available()?;

        if let Err(error) = request.validate() {
            return Err(self.reject(DecodeError::Invalid(error.to_string())));
        }

        tracing::info!(
            requester = %request.origin_or_client_id,
            ?transport,
            "Received connection request"
        );

        let requested = request.requested_did.clone();
        self.session = Some(HandshakeSession {
            request,
            transport,
            grantor: None,
            delegate: None,
            grants: Vec::new(),
            confirmation: None,
            channel,
        });
        self.failure = None;
        self.transition(State::RequestReceived);

        match requested {
            Some(did) => match self.owns(&did).await {
                Ok(true) => {
                    self.resolve(did);
                    Ok(self.state)
                }
                Ok(false) => Err(self.fail(HandshakeError::UnknownGrantor(did)).await),
                Err(error) => Err(self.fail(error).await),
            },
            None => Ok(self.state),
        }
    }

    /// Pick the identity to authorize as, when the request did not name
    /// one.
    ///
    /// An identity the wallet does not own is rejected and the machine
    /// stays in [`State::RequestReceived`].
    pub async fn select_grantor(&mut self, did: Did) -> Result<State, HandshakeError> {
        self.expect(&[State::RequestReceived], "select a grantor")?;

        match self.owns(&did).await {
            Ok(true) => {
                self.resolve(did);
                Ok(self.state)
            }
            Ok(false) => Err(HandshakeError::UnknownGrantor(did)),
            Err(error) => Err(self.fail(error).await),
        }
    }

    /// Approve the pending request as `grantor`.
    ///
    /// Provisions every requested protocol, mints the delegate and its
    /// grants and delivers them. Once provisioning starts the handshake
    /// runs to [`State::Closed`] or [`State::Failed`].
    pub async fn approve(&mut self, grantor: &Did) -> Result<Outcome, HandshakeError> {
        self.expect(&[State::AwaitingApproval], "approve")?;

        let state = self.state;
        let session = self.session.as_ref().ok_or(HandshakeError::InvalidTransition {
            state,
            action: "approve",
        })?;
        let requester = session.request.origin_or_client_id.clone();
        match &session.grantor {
            Some(expected) if expected == grantor => {}
            Some(expected) => {
                return Err(HandshakeError::GrantorMismatch {
                    expected: expected.clone(),
                    found: grantor.clone(),
                });
            }
            None => {
                return Err(HandshakeError::InvalidTransition {
                    state,
                    action: "approve",
                });
            }
        }

        if session.channel.is_orphaned() {
            tracing::warn!(%requester, "Requester went away, closing without authorizing");
            self.close().await;
            return Err(ChannelError::OpenerClosed.into());
        }

        let span = tracing::info_span!("approve", %grantor, %requester);
        self.authorize(grantor.clone()).instrument(span).await
    }

    /// Deny the pending request. Nothing is provisioned or issued; the
    /// requester gets an empty response.
    pub async fn deny(&mut self) -> Result<(), HandshakeError> {
        self.expect(&[State::RequestReceived, State::AwaitingApproval], "deny")?;

        self.transition(State::Denied);
        if let Some(session) = self.session.as_mut() {
            if let Err(error) = session
                .channel
                .deliver(&Outcome::Refused(Refusal::Denied))
                .await
            {
                tracing::warn!(%error, "Failed to deliver denial");
            }
        }
        tracing::info!("Connection request denied");
        self.close().await;
        Ok(())
    }

    async fn authorize(&mut self, grantor: Did) -> Result<Outcome, HandshakeError> {
        let (requests, transport) = {
            let session = self.session_mut("approve")?;
            (
                session.request.permission_requests.clone(),
                session.transport.clone(),
            )
        };

        if let Err(error) = GrantIssuer::<A>::validate(&requests) {
            return Err(self.fail(error).await);
        }

        self.transition(State::Provisioning);
        let provisioned = GrantIssuer::new(&self.agent, &self.config)
            .provision(&grantor, &requests)
            .await;
        if let Some(error) = provisioned.first_error() {
            let error = error.clone();
            return Err(self.fail(error).await);
        }

        self.transition(State::Issuing);
        let issued = match GrantIssuer::new(&self.agent, &self.config)
            .issue(&grantor, &requests)
            .await
        {
            Ok(issued) => issued,
            Err(failure) => return Err(self.fail(failure).await),
        };

        self.transition(State::Responding);
        let confirmation = match transport {
            Transport::Qr => Some(ConfirmationCode::generate(self.config.confirmation_digits)),
            Transport::Popup { .. } => None,
        };
        let outcome = Outcome::Granted {
            delegate: issued.delegate.export(),
            grants: issued.grants.clone(),
            confirmation: confirmation.clone(),
        };

        let session = self.session_mut("respond")?;
        session.delegate = Some(issued.delegate.did().clone());
        session.grants = issued.grants.clone();
        session.confirmation = confirmation;

        let delivered = session.channel.deliver(&outcome).await;
        if let Err(error) = delivered {
            tracing::warn!(%error, "Failed to deliver authorization");
            let rollback = GrantIssuer::new(&self.agent, &self.config)
                .roll_back(&grantor, &issued.grants)
                .await;
            return Err(self
                .fail(Failure {
                    error: error.into(),
                    rollback,
                })
                .await);
        }

        tracing::info!(
            delegate = %issued.delegate.did(),
            grants = issued.grants.len(),
            "Connection authorized"
        );
        self.close().await;
        Ok(outcome)
    }

    async fn owns(&self, did: &Did) -> Result<bool, HandshakeError> {
        let identities = self
            .agent
            .identities()
            .await
            .map_err(HandshakeError::remote("identities"))?;
        Ok(identities.contains(did))
    }

    fn resolve(&mut self, grantor: Did) {
        if let Some(session) = self.session.as_mut() {
            session.grantor = Some(grantor);
        }
        self.transition(State::AwaitingApproval);
    }

    /// End the handshake in [`State::Failed`]: tell the requester, best
    /// effort, and tear the surface down.
    async fn fail(&mut self, failure: impl Into<Failure>) -> HandshakeError {
        let failure = failure.into();
        self.transition(State::Failed);

        if let Some(mut session) = self.session.take() {
            if let Err(error) = session
                .channel
                .deliver(&Outcome::Refused(Refusal::Failed))
                .await
            {
                tracing::warn!(%error, "Failed to notify requester of failure");
            }
            session.channel.close().await;
        }

        if !failure.rollback.is_clean() {
            tracing::warn!(
                unrevoked = ?failure.rollback.unrevoked,
                "Grants of a failed handshake remain live"
            );
        }
        tracing::info!(error = %failure.error, "Connection handshake failed");

        let error = failure.error.clone();
        self.failure = Some(failure);
        error
    }

    async fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.channel.close().await;
        }
        self.transition(State::Closed);
    }

    fn reject(&mut self, error: DecodeError) -> HandshakeError {
        tracing::debug!(%error, "Rejected connection request");
        self.state = State::Idle;
        error.into()
    }

    fn ensure_available(&self) -> Result<(), HandshakeError> {
        if self.session.is_some() || self.state.is_active() {
            return Err(HandshakeError::SessionActive);
        }
        Ok(())
    }

    fn expect(&self, states: &[State], action: &'static str) -> Result<(), HandshakeError> {
        if states.contains(&self.state) {
            Ok(())
        } else {
            Err(HandshakeError::InvalidTransition {
                state: self.state,
                action,
            })
        }
    }

    fn session_mut(&mut self, action: &'static str) -> Result<&mut HandshakeSession, HandshakeError> {
        let state = self.state;
        self.session
            .as_mut()
            .ok_or(HandshakeError::InvalidTransition { state, action })
    }

    fn transition(&mut self, next: State) {
        tracing::debug!(from = %self.state, to = %next, "Handshake transition");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::popup;
    use connect_agent::MemoryAgent;
    use connect_protocol::{Permission, PermissionRequest, ProtocolDefinition};
    use pretty_assertions::assert_eq;
    use testresult::TestResult;

    struct Recorder {
        delivered: std::sync::Arc<std::sync::Mutex<Vec<Outcome>>>,
    }

    #[async_trait::async_trait]
    impl ResponseChannel for Recorder {
        async fn deliver(&mut self, outcome: &Outcome) -> Result<(), ChannelError> {
            self.delivered.lock().unwrap().push(outcome.clone());
            Ok(())
        }

        async fn close(&mut self) {}
    }

    fn request(did: Option<&str>) -> ConnectionRequest {
        ConnectionRequest::new(
            "https://app.example",
            did.map(|did| did.parse().unwrap()),
            vec![PermissionRequest::for_protocol(
                ProtocolDefinition::new("https://x/invoice".parse().unwrap()),
                &[Permission::Write],
            )],
        )
    }

    async fn machine() -> AuthorizationMachine<MemoryAgent> {
        let agent = MemoryAgent::new();
        agent.add_identity("did:example:abc".parse().unwrap()).await;
        AuthorizationMachine::new(agent)
    }

    fn recorder() -> (Box<dyn ResponseChannel>, std::sync::Arc<std::sync::Mutex<Vec<Outcome>>>) {
        let delivered = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        (
            Box::new(Recorder {
                delivered: delivered.clone(),
            }),
            delivered,
        )
    }

    #[tokio::test]
    async fn it_waits_for_a_grantor_when_none_is_requested() -> TestResult {
        let mut machine = machine().await;
        let (channel, _) = recorder();

        let state = machine.receive(request(None), Transport::Qr, channel).await?;
        assert_eq!(state, State::RequestReceived);

        let state = machine.select_grantor("did:example:abc".parse()?).await?;
        assert_eq!(state, State::AwaitingApproval);
        Ok(())
    }

    #[tokio::test]
    async fn it_keeps_waiting_after_selecting_a_foreign_identity() -> TestResult {
        let mut machine = machine().await;
        let (channel, _) = recorder();
        machine.receive(request(None), Transport::Qr, channel).await?;

        let result = machine.select_grantor("did:example:xyz".parse()?).await;

        assert_eq!(
            result,
            Err(HandshakeError::UnknownGrantor("did:example:xyz".parse()?))
        );
        assert_eq!(machine.state(), State::RequestReceived);
        Ok(())
    }

    #[tokio::test]
    async fn it_fails_when_the_requested_identity_is_not_owned() -> TestResult {
        let mut machine = machine().await;
        let (channel, delivered) = recorder();

        let result = machine
            .receive(request(Some("did:example:xyz")), Transport::Qr, channel)
            .await;

        assert_eq!(
            result,
            Err(HandshakeError::UnknownGrantor("did:example:xyz".parse()?))
        );
        assert_eq!(machine.state(), State::Failed);
        assert!(machine.session().is_none());
        assert_eq!(
            *delivered.lock().unwrap(),
            vec![Outcome::Refused(Refusal::Failed)]
        );
        Ok(())
    }

    #[tokio::test]
    async fn it_rejects_a_second_session() -> TestResult {
        let mut machine = machine().await;
        let (first, _) = recorder();
        let (second, _) = recorder();
        machine
            .receive(request(Some("did:example:abc")), Transport::Qr, first)
            .await?;

        assert_eq!(
            machine.receive(request(None), Transport::Qr, second).await,
            Err(HandshakeError::SessionActive)
        );
        assert_eq!(machine.state(), State::AwaitingApproval);
        Ok(())
    }

    #[tokio::test]
    async fn it_rejects_approval_by_another_grantor() -> TestResult {
        let mut machine = machine().await;
        machine.agent().add_identity("did:example:xyz".parse()?).await;
        let (channel, _) = recorder();
        machine
            .receive(request(Some("did:example:abc")), Transport::Qr, channel)
            .await?;

        let result = machine.approve(&"did:example:xyz".parse()?).await;

        assert_eq!(
            result,
            Err(HandshakeError::GrantorMismatch {
                expected: "did:example:abc".parse()?,
                found: "did:example:xyz".parse()?,
            })
        );
        assert_eq!(machine.state(), State::AwaitingApproval);
        Ok(())
    }

    #[tokio::test]
    async fn it_refuses_actions_out_of_order() -> TestResult {
        let mut machine = machine().await;

        assert_eq!(
            machine.approve(&"did:example:abc".parse()?).await,
            Err(HandshakeError::InvalidTransition {
                state: State::Idle,
                action: "approve",
            })
        );
        assert!(machine.deny().await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn it_shows_a_confirmation_code_on_the_qr_transport() -> TestResult {
        let mut machine = AuthorizationMachine::with_config(
            machine().await.agent().clone(),
            HandshakeConfig::default().with_confirmation_digits(6),
        );
        let (channel, _) = recorder();
        machine
            .receive(request(Some("did:example:abc")), Transport::Qr, channel)
            .await?;

        let outcome = machine.approve(&"did:example:abc".parse()?).await?;

        let Outcome::Granted { confirmation, .. } = outcome else {
            panic!("expected a grant");
        };
        assert_eq!(confirmation.map(|code| code.as_str().len()), Some(6));
        assert_eq!(machine.state(), State::Closed);
        Ok(())
    }

    #[tokio::test]
    async fn it_closes_an_orphaned_popup_without_authorizing() -> TestResult {
        let mut machine = machine().await;
        let (mut channel, opener) = popup("https://app.example", 4);
        opener.post(
            "https://app.example",
            serde_json::json!({
                "type": "authorization-request",
                "did": "did:example:abc",
                "permissions": serde_json::to_value(&request(None).permission_requests)?,
            }),
        )?;
        machine.receive_popup(&mut channel).await?;
        opener.close();

        let result = machine.approve(&"did:example:abc".parse()?).await;

        assert_eq!(result, Err(HandshakeError::Channel(ChannelError::OpenerClosed)));
        assert_eq!(machine.state(), State::Closed);
        assert!(!opener.is_popup_open());
        assert_eq!(machine.agent().calls().await.store_calls(), 0);
        Ok(())
    }

    #[test]
    fn it_names_states() {
        assert_eq!(State::AwaitingApproval.to_string(), "awaiting-approval");
        assert!(State::Denied.is_active());
        assert!(!State::Closed.is_active());
    }
}
