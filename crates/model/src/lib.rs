//! Narrow contracts between the agent and the services it depends on.
//!
//! The agent never talks to a concrete model API. It sees a [`Generator`]
//! that turns a request into a stream of [`GenerationEvent`]s, and an
//! [`Embedder`] that turns text into a fixed-length vector. Concrete
//! backends live in their own crates and only have to honor the types
//! defined here.

#![deny(missing_docs)]

mod embed;
mod error;
mod event;
mod generator;
mod request;

pub use embed::*;
pub use error::*;
pub use event::*;
pub use generator::*;
pub use request::*;
