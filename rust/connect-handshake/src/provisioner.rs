//! Makes sure a protocol exists, identically, on a grantor's store.

use connect_agent::ProtocolStore;
use connect_protocol::{Did, ProtocolDefinition};

use crate::HandshakeError;

/// What provisioning did to the grantor's store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    /// The definition was configured by this call.
    Configured,
    /// An identical definition was already in place.
    Unchanged,
}

/// Read-compare-write provisioning of protocol definitions.
///
/// No lock is held on the store. Concurrent writers are tolerated by
/// treating the store's "already configured" answer as success once the
/// stored definition is confirmed to match.
pub struct ProtocolProvisioner<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S> ProtocolProvisioner<'a, S>
where
    S: ProtocolStore + ?Sized,
{
    /// Provision through `store`
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Ensure `definition` is configured on `grantor`'s store.
    ///
    /// Fails with [`HandshakeError::ProtocolConflict`] when a canonically
    /// different definition is stored under the same URI, and with
    /// [`HandshakeError::Remote`] on any other non-success status.
    pub async fn ensure(
        &self,
        grantor: &Did,
        definition: &ProtocolDefinition,
    ) -> Result<Provisioned, HandshakeError> {
        let protocol = &definition.protocol;

        if let Some(existing) = self
            .store
            .query_protocol(grantor, protocol)
            .await
            .map_err(HandshakeError::remote("query_protocol"))?
        {
            return Self::compare(definition, &existing);
        }

        match self.store.configure_protocol(grantor, definition).await {
            Ok(()) => {
                tracing::debug!(%grantor, %protocol, "Configured protocol");
                Ok(Provisioned::Configured)
            }
            Err(error) if error.is_conflict() => {
                tracing::debug!(%grantor, %protocol, "Protocol configured concurrently");
                match self
                    .store
                    .query_protocol(grantor, protocol)
                    .await
                    .map_err(HandshakeError::remote("query_protocol"))?
                {
                    Some(existing) => Self::compare(definition, &existing),
                    None => Ok(Provisioned::Unchanged),
                }
            }
            Err(error) => Err(HandshakeError::remote("configure_protocol")(error)),
        }
    }

    fn compare(
        requested: &ProtocolDefinition,
        existing: &ProtocolDefinition,
    ) -> Result<Provisioned, HandshakeError> {
        if requested.canonical()? == existing.canonical()? {
            Ok(Provisioned::Unchanged)
        } else {
            tracing::warn!(protocol = %requested.protocol, "Stored protocol definition differs");
            Err(HandshakeError::ProtocolConflict {
                protocol: requested.protocol.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use connect_agent::{AgentError, Fault, MemoryAgent};
    use connect_protocol::{ProtocolRuleSet, ProtocolType};
    use pretty_assertions::assert_eq;
    use testresult::TestResult;

    fn grantor() -> Did {
        "did:example:abc".parse().unwrap()
    }

    fn definition(format: &str) -> ProtocolDefinition {
        ProtocolDefinition::new("https://x/invoice".parse().unwrap())
            .with_type(
                "invoice",
                ProtocolType {
                    schema: Some("https://x/invoice.json".into()),
                    data_formats: [format.to_string()].into(),
                },
            )
            .with_structure("invoice", ProtocolRuleSet::default())
    }

    #[tokio::test]
    async fn it_configures_missing_protocols() -> TestResult {
        let agent = MemoryAgent::new();
        let provisioner = ProtocolProvisioner::new(&agent);

        assert_eq!(
            provisioner.ensure(&grantor(), &definition("application/json")).await?,
            Provisioned::Configured
        );
        assert_eq!(
            agent.protocol(&grantor(), &definition("application/json").protocol).await,
            Some(definition("application/json"))
        );
        Ok(())
    }

    #[tokio::test]
    async fn it_is_idempotent() -> TestResult {
        let agent = MemoryAgent::new();
        let provisioner = ProtocolProvisioner::new(&agent);

        provisioner.ensure(&grantor(), &definition("application/json")).await?;
        assert_eq!(
            provisioner.ensure(&grantor(), &definition("application/json")).await?,
            Provisioned::Unchanged
        );
        assert_eq!(agent.calls().await.configure, 1);
        Ok(())
    }

    #[tokio::test]
    async fn it_detects_conflicting_definitions() -> TestResult {
        let agent = MemoryAgent::new();
        let provisioner = ProtocolProvisioner::new(&agent);

        provisioner.ensure(&grantor(), &definition("application/json")).await?;
        let result = provisioner.ensure(&grantor(), &definition("text/plain")).await;

        assert_eq!(
            result,
            Err(HandshakeError::ProtocolConflict {
                protocol: "https://x/invoice".parse()?
            })
        );
        Ok(())
    }

    #[tokio::test]
    async fn it_accepts_a_concurrent_identical_configuration() -> TestResult {
        let agent = MemoryAgent::new();
        agent
            .install_protocol(&grantor(), definition("application/json"))
            .await;
        agent.inject(Fault::HideProtocols).await;

        let provisioner = ProtocolProvisioner::new(&agent);
        assert_eq!(
            provisioner.ensure(&grantor(), &definition("application/json")).await?,
            Provisioned::Unchanged
        );
        assert_eq!(agent.calls().await.configure, 1);
        Ok(())
    }

    #[tokio::test]
    async fn it_surfaces_other_failures_as_remote_errors() -> TestResult {
        let agent = MemoryAgent::new();
        agent
            .inject(Fault::ConfigureProtocol(AgentError::failure(401, "unauthorized")))
            .await;

        let result = ProtocolProvisioner::new(&agent)
            .ensure(&grantor(), &definition("application/json"))
            .await;

        assert_eq!(
            result,
            Err(HandshakeError::Remote {
                operation: "configure_protocol",
                source: AgentError::failure(401, "unauthorized"),
            })
        );
        Ok(())
    }
}
