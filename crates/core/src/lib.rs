//! Core logic including the event framer, transcript reconstruction,
//! follow-up extraction, tool orchestration, and the turn driver.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

pub mod conversation;
pub mod tool;

mod driver;
mod followup;
mod partial_json;
mod reconstruct;
mod sse;
mod transcript;

pub use driver::{DriverBuilder, TurnDriver};
pub use followup::FOLLOW_UP_MARKER;
pub use transcript::*;
