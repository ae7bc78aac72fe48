//! Key material for connect delegates.
//!
//! Every handshake mints a single-purpose Ed25519 `did:key` identity. The
//! wallet never hands out its own long-term keys; instead it issues grants
//! to the delegate and exports the delegate's key as a
//! [`PortableIdentity`](connect_protocol::PortableIdentity) for the
//! requester to keep.

mod error;
pub use error::*;

mod verifier;
pub use verifier::*;

mod signer;
pub use signer::*;
