use ragdeck_core::{Agent, Answer};
use ragdeck_knowledge::{IngestionHandle, KnowledgeBase, SourceStatus};
use thiserror::Error;

/// Input rejected before it reaches the agent or the knowledge base.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The source identifier is blank.
    #[error("Please enter a URL")]
    EmptySource,
    /// The question is blank.
    #[error("Please enter a question")]
    EmptyQuery,
    /// Sources were added to a session without a knowledge base.
    #[error("This agent has no knowledge base to add sources to")]
    NoKnowledgeBase,
}

/// A source added to the session.
#[derive(Clone, Debug)]
pub struct KnowledgeSource {
    identifier: String,
    ingestion: IngestionHandle,
}

impl KnowledgeSource {
    /// Returns the identifier as it was entered.
    #[inline]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Returns the current ingestion status.
    #[inline]
    pub fn status(&self) -> SourceStatus {
        self.ingestion.status()
    }
}

/// A chat session, like a window that lists the added sources and has an
/// input box.
///
/// The session holds the only agent of the process and reuses it for every
/// question. Sources are kept in the order they were added and are never
/// removed.
#[derive(Debug)]
pub struct Session {
    agent: Agent,
    knowledge: Option<KnowledgeBase>,
    sources: Vec<KnowledgeSource>,
}

impl Session {
    /// Creates a session around `agent`. Sources can only be added when a
    /// knowledge base is given.
    pub fn new(agent: Agent, knowledge: Option<KnowledgeBase>) -> Self {
        Self {
            agent,
            knowledge,
            sources: vec![],
        }
    }

    /// Returns the agent answering the questions.
    #[inline]
    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    /// Whether sources can be added.
    #[inline]
    pub fn has_knowledge(&self) -> bool {
        self.knowledge.is_some()
    }

    /// Returns the sources in the order they were added.
    #[inline]
    pub fn sources(&self) -> &[KnowledgeSource] {
        &self.sources
    }

    /// Appends a source and starts ingesting it in the background.
    ///
    /// Adding the same identifier twice adds two entries. Must be called
    /// within a tokio runtime.
    pub fn add_source(
        &mut self,
        identifier: &str,
    ) -> Result<&KnowledgeSource, ValidationError> {
        if identifier.trim().is_empty() {
            return Err(ValidationError::EmptySource);
        }
        let Some(knowledge) = &self.knowledge else {
            return Err(ValidationError::NoKnowledgeBase);
        };

        info!("adding source {identifier}");
        let ingestion = knowledge.add_content(identifier);
        let index = self.sources.len();
        self.sources.push(KnowledgeSource {
            identifier: identifier.to_owned(),
            ingestion,
        });
        Ok(&self.sources[index])
    }

    /// Asks the agent a question.
    pub fn ask(&self, query: &str) -> Result<Answer, ValidationError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ValidationError::EmptyQuery);
        }
        Ok(self.agent.answer(query))
    }
}
