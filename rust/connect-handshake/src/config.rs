use serde::{Deserialize, Serialize};

/// Tunables of an [`AuthorizationMachine`](crate::AuthorizationMachine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeConfig {
    /// Number of digits of the QR confirmation code (default: 4)
    pub confirmation_digits: usize,

    /// Revoke grants that were already issued when a handshake fails
    /// part way through (default: true)
    pub revoke_on_failure: bool,

    /// Tell popup requesters whether an empty response was a denial or a
    /// failure (default: true)
    pub disclose_outcome: bool,

    /// Capacity of the popup message channel (default: 16)
    pub channel_capacity: usize,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            confirmation_digits: 4,
            revoke_on_failure: true,
            disclose_outcome: true,
            channel_capacity: 16,
        }
    }
}

impl HandshakeConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the confirmation code length
    pub fn with_confirmation_digits(mut self, digits: usize) -> Self {
        self.confirmation_digits = digits;
        self
    }

    /// Enable or disable revocation of already issued grants on failure
    pub fn with_revoke_on_failure(mut self, revoke: bool) -> Self {
        self.revoke_on_failure = revoke;
        self
    }

    /// Enable or disable the `reason` field of empty popup responses
    pub fn with_disclose_outcome(mut self, disclose: bool) -> Self {
        self.disclose_outcome = disclose;
        self
    }

    /// Set the popup channel capacity
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }
}
