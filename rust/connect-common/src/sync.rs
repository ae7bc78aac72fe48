//! Cross-target bound compatibility traits.
//!
//! The wallet runs both natively and inside a browser tab. Async
//! collaborators on native targets may be shared across threads, so they
//! must be `Send`; on `wasm32` nothing is ever sent across threads and
//! browser handles (windows, camera streams) are not `Send` at all.
//!
//! On `wasm32` these traits add no bound. Elsewhere they mean `Send` or
//! `Send + Sync`.

#[allow(missing_docs)]
#[cfg(not(target_arch = "wasm32"))]
pub trait ConditionalSend: Send {}

#[cfg(not(target_arch = "wasm32"))]
impl<S> ConditionalSend for S where S: Send {}

#[allow(missing_docs)]
#[cfg(not(target_arch = "wasm32"))]
pub trait ConditionalSync: Send + Sync {}

#[cfg(not(target_arch = "wasm32"))]
impl<S> ConditionalSync for S where S: Send + Sync {}

#[allow(missing_docs)]
#[cfg(target_arch = "wasm32")]
pub trait ConditionalSend {}

#[cfg(target_arch = "wasm32")]
impl<S> ConditionalSend for S {}

#[allow(missing_docs)]
#[cfg(target_arch = "wasm32")]
pub trait ConditionalSync {}

#[cfg(target_arch = "wasm32")]
impl<S> ConditionalSync for S {}
