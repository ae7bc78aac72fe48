//! The connect authorization handshake.
//!
//! A third-party application asks the wallet for scoped access to the
//! user's data store, either by showing a QR code that points at a sealed
//! request or by opening the wallet in a popup and posting the request to
//! it. Both transports converge on one [`AuthorizationMachine`]:
//!
//! ```text
//! decode ──▶ RequestReceived ──▶ AwaitingApproval ──approve──▶ Provisioning
//!                                      │                          │
//!                                    deny                      Issuing
//!                                      ▼                          ▼
//!                                   Denied ──▶ Closed ◀──── Responding
//! ```
//!
//! Any failure after a request was received ends in `Failed`. Every
//! terminal transition tears the wallet surface down through its
//! [`ResponseChannel`].
//!
//! On approval the machine:
//!
//! 1. checks every scope against its protocol definition,
//! 2. provisions each requested protocol on the grantor's store
//!    ([`ProtocolProvisioner`]),
//! 3. mints a single delegate identity and one grant per scope
//!    ([`GrantIssuer`]),
//! 4. delivers the delegate and grants over the originating transport.
//!
//! The popup transport is an explicit bounded [`PopupChannel`]; the QR
//! transport shows a [`ConfirmationCode`] on a [`PinResponder`] while holding
//! a [`ScannerLease`].

mod error;
pub use error::*;

mod config;
pub use config::*;

mod decoder;
pub use decoder::*;

mod provisioner;
pub use provisioner::*;

mod issuer;
pub use issuer::*;

mod channel;
pub use channel::*;

mod qr;
pub use qr::*;

mod machine;
pub use machine::*;
