//! An out-of-the-box streaming chat client for a turn-execution service.
//!
//! The crate includes a CLI tool for chatting in the terminal. And you
//! can also use it as a library to bring the session loop into your own
//! host apps.

#![deny(missing_docs)]

#[allow(unused_imports)]
#[macro_use]
extern crate tracing;

mod session;
pub mod tools;

pub use session::{Session, SessionBuilder};

/// Re-exports of [`chatloop_core`] crate.
pub mod core {
    pub use chatloop_core::*;
}
