//! The wire protocol shared between the client and its transports.
//!
//! This crate establishes the shapes exchanged with the turn-execution
//! service: the outbound turn request, the typed stream events decoded
//! from inbound frames, and the traits a transport implementation should
//! adhere to.
//!
//! Types in this crate don't define any behavior beyond decoding, instead
//! they are the constraints that the implementors should adhere to.

#![deny(missing_docs)]

mod error;
mod event;
mod request;
mod transport;

pub use error::*;
pub use event::*;
pub use request::*;
pub use transport::*;
