//! Core logic including the answer loop, tool execution and knowledge
//! search.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

mod agent;
mod knowledge;
mod model_client;
pub mod tool;

pub use agent::{
    Agent, AgentBuilder, AgentError, AgentErrorKind, Answer, AnswerEvent,
    ToolInvocation,
};
pub use knowledge::{KnowledgeSearchTool, SearchInput};
