use thiserror::Error;

/// Status of a remote call that did not succeed.
///
/// Together with `Ok(_)` this forms the success / conflict / failure
/// trichotomy every agent operation reports.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    /// The remote already holds conflicting or identical state, e.g. a
    /// protocol that is already configured.
    #[error("Remote reported a conflict: {detail}")]
    Conflict {
        /// Remote explanation.
        detail: String,
    },

    /// The remote rejected the call.
    #[error("Remote call failed with status {status}: {detail}")]
    Failure {
        /// Status code reported by the remote.
        status: u16,
        /// Remote explanation.
        detail: String,
    },

    /// The remote could not be reached.
    #[error("Could not reach {location}: {reason}")]
    Unreachable {
        /// What was being contacted.
        location: String,
        /// Transport level reason.
        reason: String,
    },

    /// The remote answered with something that could not be understood.
    #[error("Invalid payload: {0}")]
    Invalid(String),

    /// The client for the remote could not be set up.
    #[error("Invalid client configuration: {0}")]
    Configuration(String),
}

impl AgentError {
    /// Whether this is the "already configured" / conflict status.
    pub fn is_conflict(&self) -> bool {
        matches!(self, AgentError::Conflict { .. })
    }

    /// Shorthand for a failure with a status code.
    pub fn failure(status: u16, detail: impl Into<String>) -> Self {
        AgentError::Failure {
            status,
            detail: detail.into(),
        }
    }
}
