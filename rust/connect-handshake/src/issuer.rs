//! Delegate minting and grant issuance.

use std::collections::BTreeMap;

use connect_agent::{Agent, DelegateIdentity};
use connect_protocol::{Did, PermissionGrant, PermissionRequest, ProtocolError};
use futures::future::join_all;

use crate::{HandshakeConfig, HandshakeError, ProtocolProvisioner, Provisioned};

/// Results of work done per permission request, keyed by the request's
/// position in the connection request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestResults<T> {
    entries: BTreeMap<usize, T>,
}

impl<T> RequestResults<T> {
    /// The result for the request at `index`
    pub fn get(&self, index: usize) -> Option<&T> {
        self.entries.get(&index)
    }

    /// Number of requests with a result
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no request has a result
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Results in request order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.entries.iter().map(|(index, result)| (*index, result))
    }
}

impl<T> FromIterator<(usize, T)> for RequestResults<T> {
    fn from_iter<I: IntoIterator<Item = (usize, T)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<T> RequestResults<Result<T, HandshakeError>> {
    /// Error of the first failed request, in request order
    pub fn first_error(&self) -> Option<&HandshakeError> {
        self.entries.values().find_map(|result| result.as_ref().err())
    }
}

impl RequestResults<RequestIssuance> {
    /// Error of the first request that did not get all its grants
    pub fn first_failure(&self) -> Option<&HandshakeError> {
        self.entries.values().find_map(|issuance| issuance.error.as_ref())
    }

    /// Every grant minted, in request order then scope order
    pub fn grants(&self) -> Vec<PermissionGrant> {
        self.entries
            .values()
            .flat_map(|issuance| issuance.grants.iter().cloned())
            .collect()
    }
}

/// Grants minted for one permission request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestIssuance {
    /// Grants minted before `error`, or all of them
    pub grants: Vec<PermissionGrant>,
    /// Why minting stopped early
    pub error: Option<HandshakeError>,
}

/// Outcome of revoking the grants of a failed handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rollback {
    /// Ids of grants that were revoked
    pub revoked: Vec<String>,
    /// Ids of grants that are still live
    pub unrevoked: Vec<String>,
}

impl Rollback {
    /// Whether no issued grant is left behind
    pub fn is_clean(&self) -> bool {
        self.unrevoked.is_empty()
    }
}

/// A failed handshake together with what was done about grants already
/// issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// Why the handshake failed
    pub error: HandshakeError,
    /// Cleanup of grants issued before the failure
    pub rollback: Rollback,
}

impl From<HandshakeError> for Failure {
    fn from(error: HandshakeError) -> Self {
        Self {
            error,
            rollback: Rollback::default(),
        }
    }
}

/// Delegate identity and grants handed to the requester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issued {
    /// The single delegate minted for the handshake
    pub delegate: DelegateIdentity,
    /// Grants to the delegate, in request order then scope order
    pub grants: Vec<PermissionGrant>,
}

/// Mints one delegate per handshake and the grants bound to it.
pub struct GrantIssuer<'a, A: ?Sized> {
    agent: &'a A,
    revoke_on_failure: bool,
}

impl<'a, A> GrantIssuer<'a, A>
where
    A: Agent + ?Sized,
{
    /// Issue through `agent`
    pub fn new(agent: &'a A, config: &HandshakeConfig) -> Self {
        Self {
            agent,
            revoke_on_failure: config.revoke_on_failure,
        }
    }

    /// Check every scope of every request against its definition's
    /// protocol. Nothing is sent to the agent.
    pub fn validate(requests: &[PermissionRequest]) -> Result<(), HandshakeError> {
        for request in requests {
            request.validate().map_err(|error| match error {
                ProtocolError::ScopeProtocolMismatch { expected, found } => {
                    HandshakeError::ScopeProtocolMismatch { expected, found }
                }
                other => HandshakeError::Decode(crate::DecodeError::Invalid(other.to_string())),
            })?;
        }
        Ok(())
    }

    /// Provision every requested protocol on `grantor`'s store, all
    /// requests concurrently.
    pub async fn provision(
        &self,
        grantor: &Did,
        requests: &[PermissionRequest],
    ) -> RequestResults<Result<Provisioned, HandshakeError>> {
        let provisioner = ProtocolProvisioner::new(self.agent);
        let provisioner = &provisioner;

        join_all(requests.iter().enumerate().map(|(index, request)| async move {
            let result = provisioner
                .ensure(grantor, &request.protocol_definition)
                .await;
            (index, result)
        }))
        .await
        .into_iter()
        .collect()
    }

    /// Mint the delegate, then one grant per scope of every request, all
    /// requests concurrently.
    ///
    /// When any grant cannot be minted the grants that were are revoked,
    /// if so configured, and the handshake fails with the first request's
    /// error.
    pub async fn issue(
        &self,
        grantor: &Did,
        requests: &[PermissionRequest],
    ) -> Result<Issued, Failure> {
        let delegate = self
            .agent
            .create_ephemeral_identity()
            .await
            .map_err(HandshakeError::remote("create_ephemeral_identity"))?;
        tracing::debug!(delegate = %delegate.did(), "Minted delegate identity");

        let grantee = delegate.did();
        let results: RequestResults<RequestIssuance> =
            join_all(requests.iter().enumerate().map(|(index, request)| async move {
                (index, self.mint(grantor, grantee, request).await)
            }))
            .await
            .into_iter()
            .collect();

        match results.first_failure() {
            None => Ok(Issued {
                grants: results.grants(),
                delegate,
            }),
            Some(error) => {
                let error = error.clone();
                let rollback = self.roll_back(grantor, &results.grants()).await;
                Err(Failure { error, rollback })
            }
        }
    }

    /// Validate, provision and issue in one go.
    pub async fn authorize(
        &self,
        grantor: &Did,
        requests: &[PermissionRequest],
    ) -> Result<Issued, Failure> {
        Self::validate(requests)?;

        if let Some(error) = self.provision(grantor, requests).await.first_error() {
            return Err(error.clone().into());
        }

        self.issue(grantor, requests).await
    }

    /// Revoke `grants` if configured to, otherwise report them as left
    /// behind. Revocation is best effort: failures are logged, never
    /// raised.
    pub async fn roll_back(&self, grantor: &Did, grants: &[PermissionGrant]) -> Rollback {
        let mut rollback = Rollback::default();

        if !self.revoke_on_failure {
            rollback.unrevoked = grants.iter().map(|grant| grant.id.clone()).collect();
            return rollback;
        }

        let outcomes = join_all(grants.iter().map(|grant| async move {
            (grant, self.agent.revoke_grant(grantor, grant).await)
        }))
        .await;

        for (grant, outcome) in outcomes {
            match outcome {
                Ok(()) => rollback.revoked.push(grant.id.clone()),
                Err(error) => {
                    tracing::warn!(grant = %grant.id, %error, "Failed to revoke grant");
                    rollback.unrevoked.push(grant.id.clone());
                }
            }
        }

        rollback
    }

    async fn mint(
        &self,
        grantor: &Did,
        grantee: &Did,
        request: &PermissionRequest,
    ) -> RequestIssuance {
        let mut issuance = RequestIssuance::default();

        for scope in request.bound_scopes() {
            match self.agent.issue_grant(grantor, grantee, &scope).await {
                Ok(grant) => issuance.grants.push(grant),
                Err(error) => {
                    tracing::warn!(%scope, %error, "Failed to issue grant");
                    issuance.error = Some(HandshakeError::remote("issue_grant")(error));
                    break;
                }
            }
        }

        issuance
    }
}
