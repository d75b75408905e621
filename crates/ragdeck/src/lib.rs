//! Ready-made chat agents assembled from the ragdeck crates.
//!
//! Two profiles are provided: a finance analyst with web search and market
//! data tools, and a question answering agent backed by a knowledge base.
//! The crate includes a CLI for using them in the terminal, and the pieces
//! can be used as a library as well.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

pub mod bootstrap;
pub mod profile;
mod session;
pub mod tools;

pub use bootstrap::{BootstrapError, Stage, bootstrap};
pub use profile::{FinanceConfig, Profile, RagConfig};
pub use session::{KnowledgeSource, Session, ValidationError};

/// Re-exports of [`ragdeck_core`] crate.
pub mod core {
    pub use ragdeck_core::*;
}
