use connect_agent::{EncryptionKey, MemoryAgent, seal_request};
use connect_handshake::{
    AuthorizationMachine, ChannelError, DecodeError, HandshakeError, PinDisplay, PinResponder,
    Scanner, State,
};
use connect_protocol::{
    ConnectionRequest, Did, Permission, PermissionRequest, ProtocolDefinition, Refusal,
};
use pretty_assertions::assert_eq;
use testresult::TestResult;

const RELAY: &str = "https://relay.example/r/1";

fn grantor() -> Did {
    "did:example:abc".parse().unwrap()
}

fn scan_uri(key: &EncryptionKey) -> String {
    format!(
        "web5://connect?request_uri=https%3A%2F%2Frelay.example%2Fr%2F1&encryption_key={}",
        key.encode()
    )
}

async fn published(requested: Option<Did>) -> TestResult<(MemoryAgent, EncryptionKey)> {
    let agent = MemoryAgent::new();
    agent.add_identity(grantor()).await;

    let key = EncryptionKey::generate()?;
    let request = ConnectionRequest::new(
        "client-123",
        requested,
        vec![PermissionRequest::for_protocol(
            ProtocolDefinition::new("https://x/invoice".parse()?),
            &[Permission::Write, Permission::Sync],
        )],
    );
    agent.publish_request(RELAY, seal_request(&request, &key)?).await;

    Ok((agent, key))
}

#[tokio::test]
async fn it_confirms_an_out_of_band_authorization() -> TestResult {
    let (agent, key) = published(None).await?;
    let scanner = Scanner::new();
    let (responder, display) = PinResponder::new(scanner.acquire()?);
    let mut machine = AuthorizationMachine::new(agent.clone());

    assert_eq!(
        machine.receive_qr(&scan_uri(&key), responder).await?,
        State::RequestReceived
    );
    assert_eq!(machine.select_grantor(grantor()).await?, State::AwaitingApproval);
    machine.approve(&grantor()).await?;

    let PinDisplay::Confirm(code) = display.borrow().clone() else {
        panic!("expected a confirmation code");
    };
    assert_eq!(code.as_str().len(), 4);
    assert_eq!(machine.state(), State::Closed);
    assert!(!scanner.is_busy());
    assert_eq!(agent.grants().await.len(), 4);
    Ok(())
}

#[tokio::test]
async fn it_stays_idle_on_a_malformed_scan() -> TestResult {
    let (agent, _) = published(None).await?;
    let scanner = Scanner::new();
    let (responder, _display) = PinResponder::new(scanner.acquire()?);
    let mut machine = AuthorizationMachine::new(agent.clone());

    let result = machine
        .receive_qr(
            "web5://connect?request_uri=https%3A%2F%2Frelay.example%2Fr%2F1",
            responder,
        )
        .await;

    assert_eq!(
        result,
        Err(HandshakeError::Decode(DecodeError::MissingParameter(
            "encryption_key"
        )))
    );
    assert_eq!(machine.state(), State::Idle);
    assert!(machine.session().is_none());
    assert_eq!(agent.calls().await.decrypt, 0);
    Ok(())
}

#[tokio::test]
async fn it_stays_idle_when_the_request_is_unreachable() -> TestResult {
    let (agent, key) = published(None).await?;
    let scanner = Scanner::new();
    let (responder, _display) = PinResponder::new(scanner.acquire()?);
    let mut machine = AuthorizationMachine::new(agent);

    let uri = scan_uri(&key).replace("r%2F1", "r%2F2");
    let result = machine.receive_qr(&uri, responder).await;

    assert!(matches!(
        result,
        Err(HandshakeError::Decode(DecodeError::Unreachable(_)))
    ));
    assert_eq!(machine.state(), State::Idle);
    Ok(())
}

#[tokio::test]
async fn it_holds_the_scanner_for_the_whole_session() -> TestResult {
    let (agent, key) = published(Some(grantor())).await?;
    let scanner = Scanner::new();
    let (responder, display) = PinResponder::new(scanner.acquire()?);
    let mut machine = AuthorizationMachine::new(agent);

    assert_eq!(
        machine.receive_qr(&scan_uri(&key), responder).await?,
        State::AwaitingApproval
    );
    assert_eq!(scanner.acquire().err(), Some(ChannelError::SurfaceBusy));

    machine.deny().await?;

    assert_eq!(*display.borrow(), PinDisplay::Refused(Refusal::Denied));
    assert_eq!(machine.state(), State::Closed);
    assert!(!scanner.is_busy());
    Ok(())
}

#[tokio::test]
async fn it_releases_the_scanner_when_authorization_fails() -> TestResult {
    let (agent, key) = published(Some(grantor())).await?;
    let invoice = ProtocolDefinition::new("https://x/invoice".parse()?);
    agent.install_protocol(&grantor(), invoice.clone().published(true)).await;
    let scanner = Scanner::new();
    let (responder, display) = PinResponder::new(scanner.acquire()?);
    let mut machine = AuthorizationMachine::new(agent.clone());

    machine.receive_qr(&scan_uri(&key), responder).await?;
    let result = machine.approve(&grantor()).await;

    assert_eq!(
        result,
        Err(HandshakeError::ProtocolConflict {
            protocol: invoice.protocol
        })
    );
    assert_eq!(machine.state(), State::Failed);
    assert_eq!(*display.borrow(), PinDisplay::Refused(Refusal::Failed));
    assert!(!scanner.is_busy());
    assert!(agent.grants().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn it_releases_the_scanner_for_an_unknown_grantor() -> TestResult {
    let stranger: Did = "did:example:stranger".parse()?;
    let (agent, key) = published(Some(stranger.clone())).await?;
    let scanner = Scanner::new();
    let (responder, display) = PinResponder::new(scanner.acquire()?);
    let mut machine = AuthorizationMachine::new(agent.clone());

    let result = machine.receive_qr(&scan_uri(&key), responder).await;

    assert_eq!(result, Err(HandshakeError::UnknownGrantor(stranger)));
    assert_eq!(machine.state(), State::Failed);
    assert_eq!(*display.borrow(), PinDisplay::Refused(Refusal::Failed));
    assert!(!scanner.is_busy());
    assert_eq!(agent.calls().await.create_identity, 0);
    Ok(())
}
