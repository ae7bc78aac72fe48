//! Interface to the identity agent the wallet delegates all cryptography,
//! storage and networking to.
//!
//! The handshake core never touches a data store directly. It consumes the
//! narrow [`Agent`] interface:
//!
//! | Trait | Operations |
//! |-------|------------|
//! | [`RequestSource`] | `decrypt_request` |
//! | [`ProtocolStore`] | `query_protocol`, `configure_protocol` |
//! | [`Delegator`] | `create_ephemeral_identity`, `issue_grant`, `revoke_grant` |
//! | [`IdentityVault`] | `identities` |
//!
//! Every call is a fallible remote call whose outcome is one of success,
//! [`AgentError::Conflict`], or another [`AgentError`].
//!
//! Two implementations ship with the crate:
//!
//! - [`HttpRequestSource`] fetches sealed out-of-band requests over HTTP.
//! - [`MemoryAgent`] implements the whole interface in memory, with fault
//!   injection for exercising failure paths.

mod error;
pub use error::*;

mod agent;
pub use agent::*;

mod sealed;
pub use sealed::*;

mod http;
pub use http::*;

mod memory;
pub use memory::*;
