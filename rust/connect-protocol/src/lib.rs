//! Data model for the wallet connect handshake.
//!
//! A third-party application asks a wallet for narrowly scoped access to the
//! user's decentralized data store. The request names one or more data
//! schemas ("protocols") and, for each, the operations it wants to perform.
//! The wallet answers with a freshly minted delegate identity and one
//! [`PermissionGrant`] per requested [`PermissionScope`].
//!
//! ```text
//! ConnectionRequest (origin, requested did?)
//!   └── PermissionRequest
//!         ├── ProtocolDefinition (protocol uri, types, structure)
//!         └── PermissionScope* (interface + method, protocol?)
//! ```
//!
//! # Key Types
//!
//! | Type | Role |
//! |------|------|
//! | [`Did`] | Decentralized identifier of a grantor, grantee or requester |
//! | [`ProtocolDefinition`] | Data schema, compared by canonical form |
//! | [`PermissionScope`] | Closed set of `{interface, method}` pairs |
//! | [`PermissionRequest`] | Scopes bound to one protocol definition |
//! | [`ConnectionRequest`] | Versioned request decoded from either transport |
//! | [`PermissionGrant`] | Immutable grant minted for a delegate |
//! | [`PortableIdentity`] | Exported delegate credential bundle |
//! | [`InboundMessage`] / [`OutboundMessage`] | Popup wire messages |

mod error;
pub use error::*;

mod did;
pub use did::*;

mod canonical;
pub use canonical::*;

mod protocol;
pub use protocol::*;

mod scope;
pub use scope::*;

mod request;
pub use request::*;

mod identity;
pub use identity::*;

mod grant;
pub use grant::*;

mod message;
pub use message::*;
