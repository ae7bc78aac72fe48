#![warn(missing_docs)]

//! Light weight helpers shared by every connect crate: cross-target
//! `Send`/`Sync` bounds for async collaborator traits, and a wall clock
//! that works in the browser as well as on native targets.

mod sync;
pub use sync::*;

mod time;
pub use time::*;
